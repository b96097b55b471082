// THEORY:
// The `ControlLoop` is the session state machine around the perception
// pipeline. It owns every collaborator of a run (frame source, region
// extractor, command input, protocol output, interrupt channel, renderer)
// and the `GameSession` of the current game.
//
// Key rules:
// 1.  **Two states**: `Paused` reads one command line at a time; `Playing`
//     processes one frame per iteration.
// 2.  **Fresh sessions**: every `play` builds a brand new `GameSession`, so
//     nothing learned in one game leaks into the next.
// 3.  **Polled interrupts**: Ctrl-C and debug-window key presses arrive as
//     `ControlSignal`s on a channel. They are only looked at between
//     iterations, never in the middle of a tick. Signals that arrived while
//     paused are stale and are drained on `play`. The current state is
//     published on a `watch` channel so a signal handler can tell a playing
//     loop from one blocked on command input.
// 4.  **Guaranteed cleanup**: however the loop ends (command, end of input,
//     exhausted source, fatal error) the source is released and the
//     renderer is shut down and joined before `run` returns.

use std::io::{BufRead, Write};
use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::TryRecvError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::EyesConfig;
use crate::core_modules::emitter::StateEmitter;
use crate::core_modules::identifier::TemplateLibrary;
use crate::core_modules::region::{Frame, RegionExtractor};
use crate::error::Result;
use crate::pipeline::{GameSession, Report};
use crate::renderer::{DebugSnapshot, RendererHandle};

/// Where frames come from: a video file, a camera, or a scripted list.
pub trait FrameSource {
    /// The next frame, or `None` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Releases the underlying device. Called exactly once, on termination.
    fn release(&mut self) {}
}

/// One line of command input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Play,
    Exit,
    /// Anything else is echoed back.
    PassThrough(String),
}

impl Command {
    /// Parses a command line. Blank lines are `None`. Keywords are matched
    /// ignoring surrounding whitespace; anything else is kept verbatim apart
    /// from the line terminator.
    pub fn parse(line: &str) -> Option<Command> {
        match line.trim() {
            "" => None,
            "play" => Some(Command::Play),
            "exit" => Some(Command::Exit),
            _ => Some(Command::PassThrough(line.trim_end_matches(['\r', '\n']).to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    Interrupt,
}

/// The unbounded channel interrupts travel on.
pub fn signal_channel() -> (UnboundedSender<ControlSignal>, UnboundedReceiver<ControlSignal>) {
    mpsc::unbounded_channel()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    Paused,
    Playing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// `exit` was entered.
    Exit,
    /// Command input reached end of file.
    InputClosed,
    /// The frame source ran out or failed.
    SourceExhausted,
}

pub struct ControlLoop<S, E, R, W>
where
    S: FrameSource,
    E: RegionExtractor,
    R: BufRead,
    W: Write,
{
    config: Arc<EyesConfig>,
    templates: Arc<TemplateLibrary>,
    source: S,
    extractor: E,
    commands: R,
    emitter: StateEmitter<W>,
    signals: UnboundedReceiver<ControlSignal>,
    renderer: Option<RendererHandle>,
    state: ControlState,
    status: watch::Sender<ControlState>,
    session: Option<GameSession>,
}

impl<S, E, R, W> ControlLoop<S, E, R, W>
where
    S: FrameSource,
    E: RegionExtractor,
    R: BufRead,
    W: Write,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<EyesConfig>,
        templates: Arc<TemplateLibrary>,
        source: S,
        extractor: E,
        commands: R,
        output: W,
        signals: UnboundedReceiver<ControlSignal>,
        renderer: RendererHandle,
    ) -> Self {
        Self {
            config,
            templates,
            source,
            extractor,
            commands,
            emitter: StateEmitter::new(output),
            signals,
            renderer: Some(renderer),
            state: ControlState::Paused,
            status: watch::Sender::new(ControlState::Paused),
            session: None,
        }
    }

    pub fn state(&self) -> ControlState {
        self.state
    }

    /// Follows the Paused/Playing state from another thread. The last state
    /// stays readable after the loop has finished.
    pub fn watch_state(&self) -> watch::Receiver<ControlState> {
        self.status.subscribe()
    }

    fn set_state(&mut self, state: ControlState) {
        self.state = state;
        self.status.send_replace(state);
    }

    /// Runs until termination. Cleanup happens on every path out.
    pub fn run(mut self) -> Result<ExitReason> {
        let outcome = self.drive();
        let cleanup = self.terminate();
        match outcome {
            Ok(reason) => {
                cleanup?;
                info!(?reason, "control loop finished");
                Ok(reason)
            }
            Err(err) => {
                if let Err(cleanup_err) = cleanup {
                    warn!(error = %cleanup_err, "cleanup after failure also failed");
                }
                Err(err)
            }
        }
    }

    fn drive(&mut self) -> Result<ExitReason> {
        loop {
            match self.state {
                ControlState::Paused => match self.next_command()? {
                    None => return Ok(ExitReason::InputClosed),
                    Some(Command::Exit) => return Ok(ExitReason::Exit),
                    Some(Command::Play) => self.play()?,
                    Some(Command::PassThrough(token)) => self.emitter.echo(&token)?,
                },
                ControlState::Playing => {
                    if self.interrupted() {
                        self.pause()?;
                        continue;
                    }
                    match self.source.next_frame() {
                        Ok(Some(frame)) => self.tick(frame)?,
                        Ok(None) => {
                            info!("frame source exhausted");
                            self.pause()?;
                            return Ok(ExitReason::SourceExhausted);
                        }
                        Err(err) => {
                            warn!(error = %err, "frame source failed");
                            self.pause()?;
                            return Ok(ExitReason::SourceExhausted);
                        }
                    }
                }
            }
        }
    }

    /// Reads lines until a non-blank one or end of input.
    fn next_command(&mut self) -> Result<Option<Command>> {
        let mut line = String::new();
        loop {
            line.clear();
            if self.commands.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            if let Some(command) = Command::parse(&line) {
                debug!(?command, "command received");
                return Ok(Some(command));
            }
        }
    }

    fn play(&mut self) -> Result<()> {
        // Interrupts raised while paused refer to a session that is already over.
        while self.signals.try_recv().is_ok() {}

        let label = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
        self.session = Some(GameSession::new(self.config.clone(), self.templates.clone()));
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.begin_session(&label)?;
        }
        self.set_state(ControlState::Playing);
        info!(%label, "playing");
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        let frames = self.session.take().map_or(0, |s| s.frame_count());
        self.set_state(ControlState::Paused);
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.end_session()?;
        }
        info!(frames, "paused");
        Ok(())
    }

    /// Drains pending signals and reports whether any was an interrupt.
    fn interrupted(&mut self) -> bool {
        let mut interrupted = false;
        loop {
            match self.signals.try_recv() {
                Ok(ControlSignal::Interrupt) => interrupted = true,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return interrupted,
            }
        }
    }

    fn tick(&mut self, frame: Frame) -> Result<()> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        let tick = session.process(&frame, &self.extractor)?;
        if let Report::StateChanged(change) = &tick.report {
            self.emitter.emit(change)?;
        }
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.submit(DebugSnapshot {
                frame_index: session.frame_count(),
                obscured: tick.analysis.obscured(),
                frame,
                board: tick.analysis.board,
                queue: tick.analysis.queue,
                hold: tick.analysis.hold,
            })?;
        }
        Ok(())
    }

    fn terminate(&mut self) -> Result<()> {
        self.source.release();
        self.session = None;
        match self.renderer.take() {
            Some(renderer) => renderer.shutdown().map(|_| ()),
            None => Ok(()),
        }
    }
}
