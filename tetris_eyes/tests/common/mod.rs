#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use image::{Rgb, RgbImage};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::watch;

use tetris_eyes::config::{
    Calibration, ClassifierConfig, EyesConfig, IdentifierConfig, PixelRect, RegionGeometry, RegionSizes,
    StabilityConfig,
};
use tetris_eyes::core_modules::identifier::TemplateLibrary;
use tetris_eyes::core_modules::piece::Piece;
use tetris_eyes::core_modules::region::Frame;
use tetris_eyes::{ControlSignal, ControlState, DebugSink, DebugSnapshot, FrameSource, Result};

pub const BLOCK: u32 = 4;
pub const SLOT: u32 = 24;
pub const HOLD_X: u32 = 0;
pub const QUEUE_X: u32 = 30;
pub const BOARD_X: u32 = 60;
/// Board pixels per cell, on both axes.
pub const CELL: u32 = 5;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// Block layout of each piece, in `Piece::ALL` order.
fn shape(piece: Piece) -> [&'static str; 2] {
    match piece {
        Piece::Red => ["####", "...."],
        Piece::Orange => ["##..", "##.."],
        Piece::Yellow => [".#..", "###."],
        Piece::Green => [".##.", "##.."],
        Piece::Cyan => ["##..", ".##."],
        Piece::Blue => ["#...", "###."],
        Piece::Purple => ["..#.", "###."],
    }
}

fn paint_piece(image: &mut RgbImage, piece: Piece, x0: u32, y0: u32) {
    for (row, line) in shape(piece).iter().enumerate() {
        for (col, c) in line.chars().enumerate() {
            if c != '#' {
                continue;
            }
            for dy in 0..BLOCK {
                for dx in 0..BLOCK {
                    image.put_pixel(x0 + col as u32 * BLOCK + dx, y0 + row as u32 * BLOCK + dy, WHITE);
                }
            }
        }
    }
}

pub fn templates() -> TemplateLibrary {
    let images: Vec<RgbImage> = Piece::ALL
        .iter()
        .map(|&piece| {
            let mut image = RgbImage::new(4 * BLOCK, 2 * BLOCK);
            paint_piece(&mut image, piece, 0, 0);
            image
        })
        .collect();
    TemplateLibrary::from_images(images.clone(), images).expect("seven templates")
}

/// A small layout: hold at the left, then queue, then a 10x20 board.
pub fn config() -> EyesConfig {
    let rect = |x, width, height| RegionGeometry::Rect(PixelRect { x, y: 0, width, height });
    EyesConfig {
        calibration: Calibration {
            hold: rect(HOLD_X, SLOT, SLOT),
            board: rect(BOARD_X, 10 * CELL, 20 * CELL),
            queue: rect(QUEUE_X, SLOT, 6 * SLOT),
        },
        region_sizes: RegionSizes {
            hold: [SLOT, SLOT],
            board: [10 * CELL, 20 * CELL],
            queue: [SLOT, 6 * SLOT],
        },
        classifier: ClassifierConfig::Threshold { cutoff: 128.0 },
        identifier: IdentifierConfig {
            emptiness_threshold: 0.05,
            erosion_kernel: 1,
            locked_in_ratio: 0.95,
        },
        stability: StabilityConfig {
            history_len: 3,
            ..StabilityConfig::default()
        },
        ..EyesConfig::default()
    }
}

/// One synthetic frame of the game.
pub struct Scene {
    pub hold: Option<Piece>,
    pub queue: [Piece; 6],
    /// Occupied board cells as (row, col).
    pub board: Vec<(u32, u32)>,
}

impl Scene {
    pub fn render(&self) -> Frame {
        self.render_on(0)
    }

    /// Renders over a flat gray background of luminance `background`.
    pub fn render_on(&self, background: u8) -> Frame {
        let mut frame = RgbImage::from_pixel(120, 150, Rgb([background; 3]));
        if let Some(piece) = self.hold {
            paint_piece(&mut frame, piece, HOLD_X + BLOCK, 2 * BLOCK);
        }
        for (slot, &piece) in self.queue.iter().enumerate() {
            paint_piece(&mut frame, piece, QUEUE_X + BLOCK, slot as u32 * SLOT + 2 * BLOCK);
        }
        for &(row, col) in &self.board {
            for dy in 0..CELL {
                for dx in 0..CELL {
                    frame.put_pixel(BOARD_X + col * CELL + dx, row * CELL + dy, WHITE);
                }
            }
        }
        frame
    }
}

/// Plays back a fixed list of frames and can raise an interrupt once a
/// given number of frames has been served. When `observer` is set, the
/// control state is recorded each time a frame is requested.
pub struct ScriptedSource {
    frames: VecDeque<Frame>,
    interrupt: Option<(usize, UnboundedSender<ControlSignal>)>,
    pub served: Arc<AtomicUsize>,
    pub released: Arc<AtomicBool>,
    pub observer: Arc<Mutex<Option<watch::Receiver<ControlState>>>>,
    pub seen_states: Arc<Mutex<Vec<ControlState>>>,
}

impl ScriptedSource {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames: frames.into(),
            interrupt: None,
            served: Arc::new(AtomicUsize::new(0)),
            released: Arc::new(AtomicBool::new(false)),
            observer: Arc::default(),
            seen_states: Arc::default(),
        }
    }

    pub fn interrupt_after(mut self, frames: usize, signals: UnboundedSender<ControlSignal>) -> Self {
        self.interrupt = Some((frames, signals));
        self
    }
}

impl FrameSource for ScriptedSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if let Some(state) = self.observer.lock().unwrap().as_ref() {
            self.seen_states.lock().unwrap().push(*state.borrow());
        }
        let frame = self.frames.pop_front();
        if frame.is_some() {
            let served = self.served.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some((after, signals)) = &self.interrupt {
                if served == *after {
                    let _ = signals.send(ControlSignal::Interrupt);
                }
            }
        }
        Ok(frame)
    }

    fn release(&mut self) {
        assert!(!self.released.swap(true, Ordering::SeqCst), "released twice");
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Begin,
    Present { frame_index: u64, obscured: bool },
    End,
    Close,
}

#[derive(Clone, Default)]
pub struct RecordingSink {
    pub events: Arc<Mutex<Vec<SinkEvent>>>,
}

impl DebugSink for RecordingSink {
    fn begin_session(&mut self, _label: &str) -> Result<()> {
        self.events.lock().unwrap().push(SinkEvent::Begin);
        Ok(())
    }

    fn present(&mut self, snapshot: &DebugSnapshot, _overlay: &RgbImage) -> Result<()> {
        self.events.lock().unwrap().push(SinkEvent::Present {
            frame_index: snapshot.frame_index,
            obscured: snapshot.obscured,
        });
        Ok(())
    }

    fn end_session(&mut self) -> Result<()> {
        self.events.lock().unwrap().push(SinkEvent::End);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.events.lock().unwrap().push(SinkEvent::Close);
        Ok(())
    }
}

/// The ten-rows-of-dots board line.
pub const EMPTY_ROW: &str = "..........";
