// THEORY:
// Region extraction is the bridge between a raw capture frame and the three
// fixed-size images the rest of the pipeline reasons about: the hold slot,
// the board and the queue. Calibration is fixed for the whole process, so an
// extractor is built once and then applied to every frame as a pure function.
//
// Two kinds of geometry exist. Pixel rectangles are handled here with the
// `image` crate (crop, then resize to the region size). Perspective quads need
// a homography warp, which is an image-library primitive; extractors backed by
// such a library implement the same `RegionExtractor` trait.

use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::config::{Calibration, PixelRect, RegionGeometry, RegionSizes};
use crate::error::{EyesError, Result};

/// One captured frame.
pub type Frame = RgbImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionKind {
    Hold,
    Board,
    Queue,
}

impl RegionKind {
    pub fn geometry(self, calibration: &Calibration) -> &RegionGeometry {
        match self {
            RegionKind::Hold => &calibration.hold,
            RegionKind::Board => &calibration.board,
            RegionKind::Queue => &calibration.queue,
        }
    }

    /// Output (width, height) of this region.
    pub fn size(self, sizes: &RegionSizes) -> [u32; 2] {
        match self {
            RegionKind::Hold => sizes.hold,
            RegionKind::Board => sizes.board,
            RegionKind::Queue => sizes.queue,
        }
    }
}

/// The three sub-images of one frame.
#[derive(Debug, Clone)]
pub struct Regions {
    pub hold: RgbImage,
    pub board: RgbImage,
    pub queue: RgbImage,
}

/// Produces calibrated sub-images from a frame.
pub trait RegionExtractor {
    fn extract(&self, frame: &Frame, region: RegionKind) -> Result<RgbImage>;

    /// All three regions of one frame. Extractors that convert the frame
    /// into another representation first override this to convert it once.
    fn extract_regions(&self, frame: &Frame) -> Result<Regions> {
        Ok(Regions {
            hold: self.extract(frame, RegionKind::Hold)?,
            board: self.extract(frame, RegionKind::Board)?,
            queue: self.extract(frame, RegionKind::Queue)?,
        })
    }
}

/// Runs an extractor over all three regions and checks the output sizes.
pub fn extract_all<E: RegionExtractor + ?Sized>(
    extractor: &E,
    frame: &Frame,
    sizes: &RegionSizes,
) -> Result<Regions> {
    let regions = extractor.extract_regions(frame)?;
    for (region, image) in [
        (RegionKind::Hold, &regions.hold),
        (RegionKind::Board, &regions.board),
        (RegionKind::Queue, &regions.queue),
    ] {
        let [expected_width, expected_height] = region.size(sizes);
        if image.dimensions() != (expected_width, expected_height) {
            return Err(EyesError::RegionSize {
                region,
                expected_width,
                expected_height,
                found_width: image.width(),
                found_height: image.height(),
            });
        }
    }
    Ok(regions)
}

/// Crops `rect` out of the frame and resizes it to `size`.
pub fn crop_region(frame: &Frame, region: RegionKind, rect: &PixelRect, size: [u32; 2]) -> Result<RgbImage> {
    let fits = rect.x.checked_add(rect.width).is_some_and(|right| right <= frame.width())
        && rect.y.checked_add(rect.height).is_some_and(|bottom| bottom <= frame.height());
    if !fits {
        return Err(EyesError::RegionOutOfFrame {
            region,
            frame_width: frame.width(),
            frame_height: frame.height(),
        });
    }
    let cropped = imageops::crop_imm(frame, rect.x, rect.y, rect.width, rect.height).to_image();
    if cropped.dimensions() == (size[0], size[1]) {
        return Ok(cropped);
    }
    Ok(imageops::resize(&cropped, size[0], size[1], FilterType::Nearest))
}

/// Extractor for calibrations made only of pixel rectangles.
#[derive(Debug, Clone)]
pub struct CropExtractor {
    hold: PixelRect,
    board: PixelRect,
    queue: PixelRect,
    sizes: RegionSizes,
}

impl CropExtractor {
    pub fn new(calibration: &Calibration, sizes: RegionSizes) -> Result<Self> {
        let rect = |region: RegionKind| match region.geometry(calibration) {
            RegionGeometry::Rect(rect) => Ok(*rect),
            RegionGeometry::Quad(_) => Err(EyesError::UnsupportedGeometry { region }),
        };
        Ok(Self {
            hold: rect(RegionKind::Hold)?,
            board: rect(RegionKind::Board)?,
            queue: rect(RegionKind::Queue)?,
            sizes,
        })
    }
}

impl RegionExtractor for CropExtractor {
    fn extract(&self, frame: &Frame, region: RegionKind) -> Result<RgbImage> {
        let rect = match region {
            RegionKind::Hold => &self.hold,
            RegionKind::Board => &self.board,
            RegionKind::Queue => &self.queue,
        };
        crop_region(frame, region, rect, region.size(&self.sizes))
    }
}
