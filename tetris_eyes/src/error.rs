// Errors surfaced by the library. Everything here is either a startup
// precondition (calibration, templates, region geometry) or a failure of an
// external collaborator (capture backend, renderer thread). Ambiguous
// readings are never errors; they travel through the pipeline as empty
// `PieceReading`s.

use std::path::PathBuf;

use crate::core_modules::region::RegionKind;

#[derive(Debug, thiserror::Error)]
pub enum EyesError {
    #[error("calibration expects {expected} corner points, found {found}")]
    PointCount { expected: usize, found: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("missing or unreadable template image {path}")]
    MissingTemplate {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("template {name} is {template_width}x{template_height}, larger than its {slot_width}x{slot_height} slot")]
    TemplateTooLarge {
        name: String,
        template_width: u32,
        template_height: u32,
        slot_width: u32,
        slot_height: u32,
    },

    #[error("{region:?} region is {found_width}x{found_height}, expected {expected_width}x{expected_height}")]
    RegionSize {
        region: RegionKind,
        expected_width: u32,
        expected_height: u32,
        found_width: u32,
        found_height: u32,
    },

    #[error("{region:?} rectangle does not fit inside the {frame_width}x{frame_height} frame")]
    RegionOutOfFrame {
        region: RegionKind,
        frame_width: u32,
        frame_height: u32,
    },

    #[error("{region:?} region uses a perspective quad, which this extractor cannot warp")]
    UnsupportedGeometry { region: RegionKind },

    #[error("image backend failure: {0}")]
    Backend(String),

    #[error("debug renderer thread is no longer running")]
    RendererDisconnected,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EyesError>;
