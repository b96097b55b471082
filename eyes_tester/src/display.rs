// OpenCV debug sink: shows the overlay in a window and records overlay and
// raw footage per session. Runs on the renderer thread.

use std::fs;
use std::path::PathBuf;

use image::RgbImage;
use opencv::{
    core::{Mat, Size},
    highgui, imgproc,
    prelude::*,
    videoio::VideoWriter,
};
use tetris_eyes::config::RendererConfig;
use tetris_eyes::{ControlSignal, DebugSink, DebugSnapshot, Result};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

use crate::capture::{backend, image_to_mat};

const WINDOW: &str = "tetris eyes";

/// A lazily opened `.mp4` writer; the frame size is taken from the first frame.
struct Recording {
    path: PathBuf,
    fps: f64,
    writer: Option<VideoWriter>,
}

impl Recording {
    fn new(path: PathBuf, fps: f64) -> Self {
        Self { path, fps, writer: None }
    }

    fn write(&mut self, bgr: &Mat) -> Result<()> {
        if self.writer.is_none() {
            let fourcc = VideoWriter::fourcc('m', 'p', '4', 'v').map_err(backend)?;
            let size = Size::new(bgr.cols(), bgr.rows());
            let writer =
                VideoWriter::new(&self.path.to_string_lossy(), fourcc, self.fps, size, true).map_err(backend)?;
            info!(path = %self.path.display(), "recording started");
            self.writer = Some(writer);
        }
        if let Some(writer) = self.writer.as_mut() {
            writer.write(bgr).map_err(backend)?;
        }
        Ok(())
    }

    fn finish(mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.release().map_err(backend)?;
            info!(path = %self.path.display(), "recording saved");
        }
        Ok(())
    }
}

pub struct OpenCvSink {
    display: bool,
    record_overlay: bool,
    record_raw: bool,
    output_dir: PathBuf,
    fps: f64,
    signals: UnboundedSender<ControlSignal>,
    overlay: Option<Recording>,
    raw: Option<Recording>,
    window_open: bool,
}

impl OpenCvSink {
    pub fn new(config: &RendererConfig, signals: UnboundedSender<ControlSignal>) -> Self {
        Self {
            display: config.display,
            record_overlay: config.record_overlay,
            record_raw: config.record_raw,
            output_dir: PathBuf::from(&config.output_dir),
            fps: config.fps,
            signals,
            overlay: None,
            raw: None,
            window_open: false,
        }
    }
}

fn to_bgr(image: &RgbImage) -> Result<Mat> {
    let rgb = image_to_mat(image)?;
    let mut bgr = Mat::default();
    imgproc::cvt_color(&rgb, &mut bgr, imgproc::COLOR_RGB2BGR, 0).map_err(backend)?;
    Ok(bgr)
}

impl DebugSink for OpenCvSink {
    fn begin_session(&mut self, label: &str) -> Result<()> {
        if self.record_overlay || self.record_raw {
            fs::create_dir_all(&self.output_dir)?;
        }
        if self.record_overlay {
            let path = self.output_dir.join(format!("{label}_overlay.mp4"));
            self.overlay = Some(Recording::new(path, self.fps));
        }
        if self.record_raw {
            let path = self.output_dir.join(format!("{label}_raw.mp4"));
            self.raw = Some(Recording::new(path, self.fps));
        }
        Ok(())
    }

    fn present(&mut self, snapshot: &DebugSnapshot, overlay: &RgbImage) -> Result<()> {
        if self.display || self.overlay.is_some() {
            let bgr = to_bgr(overlay)?;
            if self.display {
                highgui::imshow(WINDOW, &bgr).map_err(backend)?;
                self.window_open = true;
                // Any key interrupts, the same as Ctrl-C.
                if highgui::wait_key(1).map_err(backend)? >= 0 {
                    debug!(frame = snapshot.frame_index, "key pressed in debug window");
                    let _ = self.signals.send(ControlSignal::Interrupt);
                }
            }
            if let Some(recording) = self.overlay.as_mut() {
                recording.write(&bgr)?;
            }
        }
        if let Some(recording) = self.raw.as_mut() {
            recording.write(&to_bgr(&snapshot.frame)?)?;
        }
        Ok(())
    }

    fn end_session(&mut self) -> Result<()> {
        let overlay = self.overlay.take().map_or(Ok(()), Recording::finish);
        let raw = self.raw.take().map_or(Ok(()), Recording::finish);
        overlay.and(raw)
    }

    fn close(&mut self) -> Result<()> {
        let finished = self.end_session();
        if self.window_open {
            highgui::destroy_all_windows().map_err(backend)?;
            self.window_open = false;
        }
        finished
    }
}
