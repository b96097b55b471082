// THEORY:
// The `PieceIdentifier` names the piece shown in one hold or queue slot by
// comparing the slot's occupancy mask with a reference mask for every color.
//
// Key steps:
// 1.  **Emptiness gate**: a slot with too few occupied pixels reads as empty
//     before any template is consulted.
// 2.  **Erosion**: the slot mask is eroded to strip the anti-aliased rim that
//     the classifier picks up around every block.
// 3.  **Centroid alignment**: each template is placed so its median occupied
//     pixel sits on the mask's, clamped so it stays inside the slot.
// 4.  **Mismatch**: occupied pixels outside the placed template plus pixels
//     inside it where mask and template disagree. The lowest count wins and
//     the first color wins a tie.
// 5.  **Confidence**: the reading is locked in when the winner agrees with
//     the slot on nearly all of its area.
//
// Templates come in two roles. The hold slot and the first queue slot draw
// pieces large; the remaining queue slots draw them small.

use std::path::Path;

use image::RgbImage;

use crate::config::{IdentifierConfig, RegionSizes};
use crate::core_modules::classifier::CellClassifier;
use crate::core_modules::mask::OccupancyMask;
use crate::core_modules::piece::{Piece, PieceReading};
use crate::error::{EyesError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotRole {
    /// Hold slot and first queue slot.
    Large,
    /// Queue slots after the first.
    Small,
}

impl SlotRole {
    fn file_suffix(self) -> &'static str {
        match self {
            SlotRole::Large => "b",
            SlotRole::Small => "l",
        }
    }
}

/// Reference images for every piece, indexed in `Piece::ALL` order.
#[derive(Debug, Clone)]
pub struct TemplateLibrary {
    large: Vec<RgbImage>,
    small: Vec<RgbImage>,
}

impl TemplateLibrary {
    /// Loads `<dir>/<color>_b.png` and `<dir>/<color>_l.png` for every color.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let load_role = |role: SlotRole| -> Result<Vec<RgbImage>> {
            Piece::ALL
                .iter()
                .map(|piece| {
                    let path = dir.join(format!("{}_{}.png", piece.name(), role.file_suffix()));
                    image::open(&path)
                        .map(|img| img.to_rgb8())
                        .map_err(|source| EyesError::MissingTemplate { path, source })
                })
                .collect()
        };
        Ok(Self {
            large: load_role(SlotRole::Large)?,
            small: load_role(SlotRole::Small)?,
        })
    }

    pub fn from_images(large: Vec<RgbImage>, small: Vec<RgbImage>) -> Result<Self> {
        if large.len() != Piece::ALL.len() || small.len() != Piece::ALL.len() {
            return Err(EyesError::InvalidConfig(format!(
                "expected {} large and small templates, got {} and {}",
                Piece::ALL.len(),
                large.len(),
                small.len()
            )));
        }
        Ok(Self { large, small })
    }

    /// Every template must fit inside every slot it is matched against.
    pub fn check_fits(&self, sizes: &RegionSizes) -> Result<()> {
        let [slot_width, slot_height] = sizes.queue_slot();
        let large_slot = [sizes.hold[0].min(slot_width), sizes.hold[1].min(slot_height)];
        let checks = [
            (SlotRole::Large, &self.large, large_slot),
            (SlotRole::Small, &self.small, [slot_width, slot_height]),
        ];
        for (role, images, [slot_width, slot_height]) in checks {
            for (piece, template) in Piece::ALL.iter().zip(images) {
                if template.width() > slot_width || template.height() > slot_height {
                    return Err(EyesError::TemplateTooLarge {
                        name: format!("{}_{}", piece.name(), role.file_suffix()),
                        template_width: template.width(),
                        template_height: template.height(),
                        slot_width,
                        slot_height,
                    });
                }
            }
        }
        Ok(())
    }

    /// Classifies every template with the session's classifier.
    pub fn masks(&self, classifier: &CellClassifier) -> TemplateMasks {
        TemplateMasks {
            large: self.large.iter().map(|t| classifier.classify(t)).collect(),
            small: self.small.iter().map(|t| classifier.classify(t)).collect(),
        }
    }
}

/// Template masks for one classifier calibration.
#[derive(Debug, Clone)]
pub struct TemplateMasks {
    pub large: Vec<OccupancyMask>,
    pub small: Vec<OccupancyMask>,
}

impl TemplateMasks {
    pub fn for_role(&self, role: SlotRole) -> &[OccupancyMask] {
        match role {
            SlotRole::Large => &self.large,
            SlotRole::Small => &self.small,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PieceIdentifier {
    config: IdentifierConfig,
}

impl PieceIdentifier {
    pub fn new(config: IdentifierConfig) -> Self {
        Self { config }
    }

    /// Identifies the piece in `mask`. `templates` are in `Piece::ALL` order.
    pub fn identify(&self, mask: &OccupancyMask, templates: &[OccupancyMask]) -> PieceReading {
        if mask.area() == 0 || mask.occupied_fraction() < self.config.emptiness_threshold {
            return PieceReading::EMPTY;
        }
        let eroded = mask.eroded(self.config.erosion_kernel);

        let mut best: Option<(usize, usize)> = None;
        for (index, template) in templates.iter().enumerate() {
            let mismatch = aligned_mismatch(&eroded, template);
            if best.is_none_or(|(_, lowest)| mismatch < lowest) {
                best = Some((index, mismatch));
            }
        }

        let Some((index, mismatch)) = best else {
            return PieceReading::EMPTY;
        };
        let Some(&piece) = Piece::ALL.get(index) else {
            return PieceReading::EMPTY;
        };
        let agreement = 1.0 - mismatch as f64 / mask.area() as f64;
        PieceReading::new(piece, agreement >= self.config.locked_in_ratio)
    }
}

/// Mismatch between `mask` and `template` once their median occupied pixels
/// are aligned. The template is clamped inside the mask.
fn aligned_mismatch(mask: &OccupancyMask, template: &OccupancyMask) -> usize {
    let (mask_row, mask_col) = mask.median_occupied().unwrap_or((0.0, 0.0));
    let (template_row, template_col) = template.median_occupied().unwrap_or((0.0, 0.0));

    let max_row = mask.height().saturating_sub(template.height()) as i64;
    let max_col = mask.width().saturating_sub(template.width()) as i64;
    let row = ((mask_row - template_row).trunc() as i64).clamp(0, max_row) as u32;
    let col = ((mask_col - template_col).trunc() as i64).clamp(0, max_col) as u32;

    let mut mismatch = 0;
    for y in 0..mask.height() {
        for x in 0..mask.width() {
            let inside = x >= col
                && y >= row
                && x - col < template.width()
                && y - row < template.height();
            let expected = inside && template.get(x - col, y - row);
            if mask.get(x, y) != expected {
                mismatch += 1;
            }
        }
    }
    mismatch
}
