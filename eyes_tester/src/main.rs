mod capture;
mod display;

use std::io;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tetris_eyes::config::Calibration;
use tetris_eyes::control::signal_channel;
use tetris_eyes::core_modules::identifier::TemplateLibrary;
use tetris_eyes::renderer::NullSink;
use tetris_eyes::{ControlLoop, ControlSignal, ControlState, EyesConfig, spawn_renderer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::capture::{OpenCvSource, WarpExtractor};
use crate::display::OpenCvSink;

/// Watches Tetris footage and prints game-state events to stdout.
///
/// Commands are read from stdin while paused: `play` starts a session,
/// `exit` quits. Ctrl-C or a key press in the debug window pauses a session;
/// Ctrl-C while paused quits.
#[derive(Parser, Debug)]
#[command(name = "eyes_tester", version)]
struct Args {
    /// Video file to read. The camera is used when omitted.
    #[arg(long)]
    video: Option<PathBuf>,

    /// Camera index used when no video is given.
    #[arg(long, default_value_t = 0)]
    camera: i32,

    /// JSON configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Twelve-point corner click file; overrides the configured calibration.
    #[arg(long)]
    clicks: Option<PathBuf>,

    /// Directory holding `<color>_b.png` and `<color>_l.png`.
    #[arg(long, default_value = "template_images")]
    templates: PathBuf,

    /// Do not open the debug window.
    #[arg(long)]
    no_display: bool,
}

fn main() -> Result<()> {
    // stdout carries the event protocol, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tetris_eyes=info,eyes_tester=info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    // --- 1. Configuration ---
    let mut config = match &args.config {
        Some(path) => EyesConfig::load(path).with_context(|| format!("failed to load config {}", path.display()))?,
        None => EyesConfig::default(),
    };
    if let Some(path) = &args.clicks {
        config.calibration = Calibration::load_clicks(path)
            .with_context(|| format!("failed to load click file {}", path.display()))?;
    }
    if args.no_display {
        config.renderer.display = false;
    }
    config.validate().context("invalid configuration")?;

    // --- 2. Templates ---
    let templates = TemplateLibrary::load(&args.templates)
        .with_context(|| format!("failed to load templates from {}", args.templates.display()))?;
    templates
        .check_fits(&config.region_sizes)
        .context("templates do not fit the configured region sizes")?;

    // --- 3. Capture ---
    let source = match &args.video {
        Some(path) => OpenCvSource::open_file(path).with_context(|| format!("failed to open {}", path.display()))?,
        None => OpenCvSource::open_camera(args.camera).with_context(|| format!("failed to open camera {}", args.camera))?,
    };
    let extractor =
        WarpExtractor::new(&config.calibration, config.region_sizes).context("failed to prepare region warps")?;

    // --- 4. Renderer ---
    let (signals_tx, signals) = signal_channel();
    let ctrlc_tx = signals_tx.clone();
    let debug_output = &config.renderer;
    let renderer = if debug_output.display || debug_output.record_overlay || debug_output.record_raw {
        spawn_renderer(OpenCvSink::new(debug_output, signals_tx), debug_output)
    } else {
        spawn_renderer(NullSink, debug_output)
    }
    .context("failed to start the debug renderer")?;

    // --- 5. Control Loop ---
    let control = ControlLoop::new(
        Arc::new(config),
        Arc::new(templates),
        source,
        extractor,
        io::stdin().lock(),
        io::stdout().lock(),
        signals,
        renderer,
    );

    // --- 6. Interrupts ---
    // A paused loop is blocked on stdin with no session to interrupt, so
    // Ctrl-C there ends the process.
    let state = control.watch_state();
    ctrlc::set_handler(move || {
        if *state.borrow() == ControlState::Paused {
            warn!("interrupted while paused, exiting");
            process::exit(130);
        }
        let _ = ctrlc_tx.send(ControlSignal::Interrupt);
    })
    .context("failed to install the Ctrl-C handler")?;

    info!("ready, waiting for commands");
    let reason = control.run().context("control loop failed")?;
    info!(?reason, "finished");
    Ok(())
}
