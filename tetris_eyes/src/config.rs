// THEORY:
// Every tunable of the perception pipeline lives in `EyesConfig`. The values
// are loaded once at startup (JSON), validated once, and then shared
// read-only behind an `Arc` for the rest of the process. A missing section
// falls back to the defaults below, which are the thresholds tuned against
// real footage.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core_modules::board::{BOARD_COLS, BOARD_ROWS};
use crate::core_modules::tracker::QUEUE_LEN;
use crate::error::{EyesError, Result};

/// A pixel rectangle in frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// How one region is located in the raw frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionGeometry {
    /// Axis-aligned crop, resized to the region size.
    Rect(PixelRect),
    /// Four corners (upper-left, upper-right, lower-right, lower-left) that
    /// are perspective-warped onto the region size.
    Quad([[f32; 2]; 4]),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Calibration {
    pub hold: RegionGeometry,
    pub board: RegionGeometry,
    pub queue: RegionGeometry,
}

impl Default for Calibration {
    fn default() -> Self {
        // Pre-cropped footage laid out hold | board | queue at native size.
        Self {
            hold: RegionGeometry::Rect(PixelRect { x: 0, y: 0, width: 125, height: 140 }),
            board: RegionGeometry::Rect(PixelRect { x: 125, y: 0, width: 500, height: 1000 }),
            queue: RegionGeometry::Rect(PixelRect { x: 625, y: 0, width: 125, height: 450 }),
        }
    }
}

/// Number of points in a corner-click file: four corners for each of the
/// hold, board and queue regions.
pub const CLICK_POINT_COUNT: usize = 12;

impl Calibration {
    /// Builds a perspective calibration from the corner-click file format:
    /// hold corners, then board corners, then queue corners, each in the
    /// order upper-left, upper-right, lower-right, lower-left.
    pub fn from_clicks(points: &[[f32; 2]]) -> Result<Self> {
        if points.len() != CLICK_POINT_COUNT {
            return Err(EyesError::PointCount {
                expected: CLICK_POINT_COUNT,
                found: points.len(),
            });
        }
        let quad = |offset: usize| {
            RegionGeometry::Quad([
                points[offset],
                points[offset + 1],
                points[offset + 2],
                points[offset + 3],
            ])
        };
        Ok(Self {
            hold: quad(0),
            board: quad(4),
            queue: quad(8),
        })
    }

    /// Reads a click file (a JSON array of `[x, y]` pairs).
    pub fn load_clicks(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let points: Vec<[f32; 2]> = serde_json::from_str(&contents)?;
        Self::from_clicks(&points)
    }
}

/// Output size (width, height) of each extracted region. Templates are
/// captured at these sizes, so changing them means recapturing templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionSizes {
    pub hold: [u32; 2],
    pub board: [u32; 2],
    pub queue: [u32; 2],
}

impl Default for RegionSizes {
    fn default() -> Self {
        Self {
            hold: [125, 140],
            board: [500, 1000],
            queue: [125, 450],
        }
    }
}

impl RegionSizes {
    /// Size of one queue slot: the queue region split into equal rows.
    pub fn queue_slot(&self) -> [u32; 2] {
        [self.queue[0], self.queue[1] / QUEUE_LEN as u32]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum ClassifierConfig {
    /// Occupied when luminance is above `cutoff`.
    Threshold { cutoff: f64 },
    /// Two-means over the queue luminance, re-sampled every `resample_interval` frames.
    TwoCluster {
        resample_interval: u64,
        max_iterations: usize,
    },
    /// Occupied when the nearest RGB centroid is one of `full`.
    NearestCentroid { empty: [u8; 3], full: Vec<[u8; 3]> },
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        ClassifierConfig::TwoCluster {
            resample_interval: 10,
            max_iterations: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentifierConfig {
    /// Slots whose occupied fraction is below this read as empty.
    pub emptiness_threshold: f64,
    /// Side of the square erosion kernel applied before matching.
    pub erosion_kernel: u32,
    /// Pixel agreement (fraction of slot area) needed for a locked-in reading.
    pub locked_in_ratio: f64,
}

impl Default for IdentifierConfig {
    fn default() -> Self {
        Self {
            emptiness_threshold: 0.05,
            erosion_kernel: 8,
            locked_in_ratio: 0.95,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilityConfig {
    pub history_len: usize,
    pub hold_ratio: f64,
    pub board_ratio: f64,
    pub queue_ratio: f64,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            history_len: 30,
            hold_ratio: 2.0,
            board_ratio: 1.0,
            queue_ratio: 1.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Minimum number of differing queue slots that counts as a queue shift.
    pub shift_threshold: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self { shift_threshold: 4 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    /// A cell is occupied when more than this fraction of its pixels are.
    pub cell_fill_threshold: f64,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            cell_fill_threshold: 0.8,
        }
    }
}

/// What the producer does when the renderer queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    Block,
    Drop,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    pub queue_capacity: usize,
    pub overflow: OverflowPolicy,
    pub display: bool,
    pub record_overlay: bool,
    pub record_raw: bool,
    pub output_dir: String,
    pub fps: f64,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1000,
            overflow: OverflowPolicy::Block,
            display: true,
            record_overlay: false,
            record_raw: false,
            output_dir: "runs".to_string(),
            fps: 30.0,
        }
    }
}

/// The complete, validated configuration of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EyesConfig {
    pub calibration: Calibration,
    pub region_sizes: RegionSizes,
    pub classifier: ClassifierConfig,
    pub identifier: IdentifierConfig,
    pub stability: StabilityConfig,
    pub tracker: TrackerConfig,
    pub board: BoardConfig,
    pub renderer: RendererConfig,
}

impl EyesConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: EyesConfig = serde_json::from_str(&contents)?;
        Ok(config)
    }

    /// Checks every startup precondition that does not depend on the frame
    /// or the template images.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(EyesError::InvalidConfig(msg));

        let sizes = &self.region_sizes;
        for (name, [w, h]) in [("hold", sizes.hold), ("board", sizes.board), ("queue", sizes.queue)] {
            if w == 0 || h == 0 {
                return invalid(format!("{name} region size must be non-zero, got {w}x{h}"));
            }
        }
        if sizes.board[0] % BOARD_COLS as u32 != 0 || sizes.board[1] % BOARD_ROWS as u32 != 0 {
            return invalid(format!(
                "board region {}x{} does not split into {BOARD_COLS}x{BOARD_ROWS} cells",
                sizes.board[0], sizes.board[1]
            ));
        }
        if sizes.queue[1] % QUEUE_LEN as u32 != 0 {
            return invalid(format!(
                "queue region height {} does not split into {QUEUE_LEN} slots",
                sizes.queue[1]
            ));
        }
        for (name, geometry) in [
            ("hold", &self.calibration.hold),
            ("board", &self.calibration.board),
            ("queue", &self.calibration.queue),
        ] {
            if let RegionGeometry::Rect(rect) = geometry {
                if rect.width == 0 || rect.height == 0 {
                    return invalid(format!("{name} rectangle must be non-empty"));
                }
            }
        }

        match &self.classifier {
            ClassifierConfig::Threshold { cutoff } if !(0.0..=255.0).contains(cutoff) => {
                return invalid(format!("threshold cutoff {cutoff} outside 0..=255"));
            }
            ClassifierConfig::TwoCluster { resample_interval, max_iterations }
                if *resample_interval == 0 || *max_iterations == 0 =>
            {
                return invalid("two_cluster needs a non-zero resample interval and iteration count".into());
            }
            ClassifierConfig::NearestCentroid { full, .. } if full.is_empty() => {
                return invalid("nearest_centroid needs at least one full centroid".into());
            }
            _ => {}
        }

        let id = &self.identifier;
        if !(0.0..1.0).contains(&id.emptiness_threshold) {
            return invalid(format!("emptiness threshold {} outside [0, 1)", id.emptiness_threshold));
        }
        if id.erosion_kernel == 0 {
            return invalid("erosion kernel must be at least 1".into());
        }
        if !(id.locked_in_ratio > 0.0 && id.locked_in_ratio <= 1.0) {
            return invalid(format!("locked-in ratio {} outside (0, 1]", id.locked_in_ratio));
        }

        let st = &self.stability;
        if st.history_len == 0 {
            return invalid("stability history must hold at least one reading".into());
        }
        if [st.hold_ratio, st.board_ratio, st.queue_ratio].iter().any(|r| !(*r > 0.0)) {
            return invalid("stability ratios must be positive".into());
        }

        if self.tracker.shift_threshold == 0 || self.tracker.shift_threshold > QUEUE_LEN {
            return invalid(format!(
                "shift threshold {} outside 1..={QUEUE_LEN}",
                self.tracker.shift_threshold
            ));
        }

        let fill = self.board.cell_fill_threshold;
        if !(0.0..1.0).contains(&fill) {
            return invalid(format!("cell fill threshold {fill} outside [0, 1)"));
        }

        if self.renderer.queue_capacity == 0 {
            return invalid("renderer queue capacity must be non-zero".into());
        }
        if !(self.renderer.fps > 0.0) {
            return invalid(format!("renderer fps {} must be positive", self.renderer.fps));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        EyesConfig::default().validate().expect("defaults must validate");
    }

    #[test]
    fn click_file_needs_twelve_points() {
        let points = vec![[0.0, 0.0]; 11];
        match Calibration::from_clicks(&points) {
            Err(EyesError::PointCount { expected: 12, found: 11 }) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn clicks_split_into_three_quads() {
        let points: Vec<[f32; 2]> = (0..12).map(|i| [i as f32, 0.0]).collect();
        let calibration = Calibration::from_clicks(&points).unwrap();
        assert_eq!(
            calibration.board,
            RegionGeometry::Quad([[4.0, 0.0], [5.0, 0.0], [6.0, 0.0], [7.0, 0.0]])
        );
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let json = r#"{
            "tracker": { "shift_threshold": 3 },
            "classifier": { "strategy": "threshold", "cutoff": 90.0 },
            "calibration": { "hold": { "rect": { "x": 1, "y": 2, "width": 3, "height": 4 } } }
        }"#;
        let config: EyesConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.tracker.shift_threshold, 3);
        assert_eq!(config.classifier, ClassifierConfig::Threshold { cutoff: 90.0 });
        assert_eq!(
            config.calibration.hold,
            RegionGeometry::Rect(PixelRect { x: 1, y: 2, width: 3, height: 4 })
        );
        assert_eq!(config.calibration.board, Calibration::default().board);
        assert_eq!(config.stability, StabilityConfig::default());
    }

    #[test]
    fn rejects_board_that_does_not_split_into_cells() {
        let mut config = EyesConfig::default();
        config.region_sizes.board = [505, 1000];
        assert!(matches!(config.validate(), Err(EyesError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_shift_threshold_beyond_queue() {
        let mut config = EyesConfig::default();
        config.tracker.shift_threshold = 7;
        assert!(config.validate().is_err());
    }
}
