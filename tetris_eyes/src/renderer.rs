// THEORY:
// Debug output (window display, video recording) is far slower than
// perception and must never hold up the capture loop more than the overflow
// policy allows. The renderer is therefore a consumer on its own thread:
//
// 1.  **Bounded FIFO**: the loop pushes `RenderMessage`s into a bounded
//     channel in capture order and the renderer handles them in that order.
// 2.  **Overflow policy**: with `Block` the producer waits for room and
//     nothing is lost; with `Drop` a snapshot that does not fit is discarded
//     and counted. Session control messages always wait.
// 3.  **Sink seam**: composing the overlay is plain `image` work done here;
//     showing and recording it is delegated to a `DebugSink`, so the heavy
//     video backend lives outside the library.
// 4.  **Best effort**: a failing sink is logged and skipped. Only `Shutdown`
//     ends the thread, and `RendererHandle::shutdown` joins it.

use std::thread::{self, JoinHandle};

use image::{Rgb, RgbImage};
use tokio::sync::mpsc::{self, Receiver, Sender, error::TrySendError};
use tracing::{debug, info, warn};

use crate::config::{OverflowPolicy, RendererConfig};
use crate::core_modules::board::{BOARD_COLS, BOARD_ROWS, BoardGrid};
use crate::core_modules::piece::Piece;
use crate::core_modules::region::Frame;
use crate::core_modules::tracker::{QUEUE_LEN, QueueState};
use crate::error::{EyesError, Result};

/// Everything the debug view shows for one tick.
#[derive(Debug, Clone)]
pub struct DebugSnapshot {
    pub frame_index: u64,
    pub frame: Frame,
    pub board: BoardGrid,
    pub queue: Option<QueueState>,
    pub hold: Option<Piece>,
    /// The pictures were not stable on this tick.
    pub obscured: bool,
}

#[derive(Debug)]
pub enum RenderMessage {
    /// A Playing session started; `label` names its recordings.
    BeginSession { label: String },
    Snapshot(Box<DebugSnapshot>),
    /// The session paused; recordings are finalized.
    EndSession,
    Shutdown,
}

/// Displays and records composed overlays.
pub trait DebugSink: Send + 'static {
    fn begin_session(&mut self, label: &str) -> Result<()>;
    fn present(&mut self, snapshot: &DebugSnapshot, overlay: &RgbImage) -> Result<()>;
    fn end_session(&mut self) -> Result<()>;
    /// Called once before the renderer thread exits.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Sink that discards everything, for headless runs.
#[derive(Debug, Default)]
pub struct NullSink;

impl DebugSink for NullSink {
    fn begin_session(&mut self, _label: &str) -> Result<()> {
        Ok(())
    }

    fn present(&mut self, _snapshot: &DebugSnapshot, _overlay: &RgbImage) -> Result<()> {
        Ok(())
    }

    fn end_session(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Counters reported when the renderer shuts down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RendererStats {
    pub rendered: u64,
    pub dropped: u64,
    pub sink_errors: u64,
}

/// Producer side of the renderer.
pub struct RendererHandle {
    sender: Sender<RenderMessage>,
    overflow: OverflowPolicy,
    dropped: u64,
    worker: Option<JoinHandle<RendererStats>>,
}

pub fn spawn_renderer<S: DebugSink>(sink: S, config: &RendererConfig) -> Result<RendererHandle> {
    let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
    let worker = thread::Builder::new()
        .name("debug-renderer".to_string())
        .spawn(move || render_loop(sink, receiver))?;
    info!(capacity = config.queue_capacity, overflow = ?config.overflow, "debug renderer started");
    Ok(RendererHandle {
        sender,
        overflow: config.overflow,
        dropped: 0,
        worker: Some(worker),
    })
}

impl RendererHandle {
    pub fn begin_session(&mut self, label: &str) -> Result<()> {
        self.send_blocking(RenderMessage::BeginSession {
            label: label.to_string(),
        })
    }

    pub fn end_session(&mut self) -> Result<()> {
        self.send_blocking(RenderMessage::EndSession)
    }

    /// Queues a snapshot according to the overflow policy.
    pub fn submit(&mut self, snapshot: DebugSnapshot) -> Result<()> {
        let message = RenderMessage::Snapshot(Box::new(snapshot));
        match self.overflow {
            OverflowPolicy::Block => self.send_blocking(message),
            OverflowPolicy::Drop => match self.sender.try_send(message) {
                Ok(()) => Ok(()),
                Err(TrySendError::Full(_)) => {
                    self.dropped += 1;
                    warn!(dropped = self.dropped, "renderer queue full, snapshot dropped");
                    Ok(())
                }
                Err(TrySendError::Closed(_)) => Err(EyesError::RendererDisconnected),
            },
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Sends the shutdown sentinel after everything already queued and
    /// waits for the thread to finish.
    pub fn shutdown(mut self) -> Result<RendererStats> {
        let sent = self.send_blocking(RenderMessage::Shutdown);
        let worker = self.worker.take().ok_or(EyesError::RendererDisconnected)?;
        let mut stats = worker.join().map_err(|_| EyesError::RendererDisconnected)?;
        sent?;
        stats.dropped = self.dropped;
        info!(
            rendered = stats.rendered,
            dropped = stats.dropped,
            sink_errors = stats.sink_errors,
            "debug renderer stopped"
        );
        Ok(stats)
    }

    fn send_blocking(&self, message: RenderMessage) -> Result<()> {
        self.sender
            .blocking_send(message)
            .map_err(|_| EyesError::RendererDisconnected)
    }
}

fn render_loop<S: DebugSink>(mut sink: S, mut receiver: Receiver<RenderMessage>) -> RendererStats {
    let mut stats = RendererStats::default();
    while let Some(message) = receiver.blocking_recv() {
        match message {
            RenderMessage::BeginSession { label } => {
                debug!(%label, "render session begins");
                note(&mut stats, "begin a session", sink.begin_session(&label));
            }
            RenderMessage::Snapshot(snapshot) => {
                let overlay = compose_overlay(&snapshot);
                note(&mut stats, "present a snapshot", sink.present(&snapshot, &overlay));
                stats.rendered += 1;
            }
            RenderMessage::EndSession => {
                note(&mut stats, "end a session", sink.end_session());
            }
            RenderMessage::Shutdown => break,
        }
    }
    note(&mut stats, "close", sink.close());
    stats
}

fn note(stats: &mut RendererStats, what: &str, result: Result<()>) {
    if let Err(err) = result {
        stats.sink_errors += 1;
        warn!(error = %err, "debug sink failed to {what}");
    }
}

const CELL: u32 = 12;
const MARGIN: u32 = 8;
const BORDER: u32 = 3;
const PANEL_WIDTH: u32 = CELL * BOARD_COLS as u32 + 2 * MARGIN;
const PANEL_HEIGHT: u32 = MARGIN + 2 * CELL + MARGIN + CELL * BOARD_ROWS as u32 + MARGIN;

const BACKGROUND: Rgb<u8> = Rgb([30, 30, 30]);
const EMPTY_CELL: Rgb<u8> = Rgb([60, 60, 60]);
const FILLED_CELL: Rgb<u8> = Rgb([200, 200, 200]);
const OBSCURED: Rgb<u8> = Rgb([255, 0, 0]);

fn fill_rect(image: &mut RgbImage, x: u32, y: u32, width: u32, height: u32, color: Rgb<u8>) {
    let x_end = (x + width).min(image.width());
    let y_end = (y + height).min(image.height());
    for py in y..y_end {
        for px in x..x_end {
            image.put_pixel(px, py, color);
        }
    }
}

fn piece_color(piece: Option<Piece>) -> Rgb<u8> {
    piece.map_or(EMPTY_CELL, |p| Rgb(p.rgb()))
}

/// The frame with a side panel showing the board, queue and hold.
pub fn compose_overlay(snapshot: &DebugSnapshot) -> RgbImage {
    let frame = &snapshot.frame;
    let width = frame.width() + PANEL_WIDTH;
    let height = frame.height().max(PANEL_HEIGHT);
    let mut overlay = RgbImage::from_pixel(width, height, BACKGROUND);
    image::imageops::replace(&mut overlay, frame, 0, 0);

    if snapshot.obscured {
        let (w, h) = frame.dimensions();
        fill_rect(&mut overlay, 0, 0, w, BORDER, OBSCURED);
        fill_rect(&mut overlay, 0, h.saturating_sub(BORDER), w, BORDER, OBSCURED);
        fill_rect(&mut overlay, 0, 0, BORDER, h, OBSCURED);
        fill_rect(&mut overlay, w.saturating_sub(BORDER), 0, BORDER, h, OBSCURED);
    }

    let left = frame.width() + MARGIN;

    // Hold swatch, then the queue left to right.
    fill_rect(&mut overlay, left, MARGIN, 2 * CELL, 2 * CELL, piece_color(snapshot.hold));
    for slot in 0..QUEUE_LEN {
        let piece = snapshot.queue.as_ref().and_then(|q| q.slots()[slot].piece);
        let x = left + 3 * CELL + slot as u32 * (CELL + 2);
        fill_rect(&mut overlay, x, MARGIN, CELL, CELL, piece_color(piece));
    }

    let top = MARGIN + 2 * CELL + MARGIN;
    for (row, cells) in snapshot.board.rows().iter().enumerate() {
        for (col, &filled) in cells.iter().enumerate() {
            let color = if filled { FILLED_CELL } else { EMPTY_CELL };
            // One pixel of gutter between cells.
            fill_rect(
                &mut overlay,
                left + col as u32 * CELL,
                top + row as u32 * CELL,
                CELL - 1,
                CELL - 1,
                color,
            );
        }
    }
    overlay
}
