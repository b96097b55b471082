// THEORY:
// This file is the main entry point for the `tetris_eyes` library crate. The
// crate watches Tetris gameplay video and reports the game's symbolic state
// (upcoming queue, hold piece, settled board) whenever it changes.
//
// The public API is layered:
// 1.  **`config` / `error`**: the tunables of a run and the one error type.
// 2.  **`core_modules`**: the stateless and per-game building blocks
//     (classification, identification, stabilization, tracking, board
//     reconstruction, protocol output).
// 3.  **`pipeline`**: `GameSession`, which turns one frame into a `Report`.
// 4.  **`renderer`** and **`control`**: the debug consumer thread and the
//     play/pause state machine that drive a whole run.
//
// Video capture and window display are backend concerns and live in the
// binary crate behind the `FrameSource`, `RegionExtractor` and `DebugSink`
// traits.

pub mod config;
pub mod control;
pub mod core_modules;
pub mod error;
pub mod pipeline;
pub mod renderer;

pub use config::EyesConfig;
pub use control::{Command, ControlLoop, ControlSignal, ControlState, ExitReason, FrameSource};
pub use error::{EyesError, Result};
pub use pipeline::{FrameAnalysis, GameSession, Report, Tick};
pub use renderer::{DebugSink, DebugSnapshot, RenderMessage, RendererHandle, spawn_renderer};
