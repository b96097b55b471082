// OpenCV side of frame acquisition: reading frames from a file or camera and
// warping calibrated quads onto fixed-size regions.

use std::path::Path;

use image::RgbImage;
use opencv::{
    core::{self, Mat, Point2f, Scalar, Size, Vector},
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture},
};
use tetris_eyes::config::{Calibration, PixelRect, RegionGeometry, RegionSizes};
use tetris_eyes::core_modules::region::{Frame, RegionExtractor, RegionKind, Regions, crop_region};
use tetris_eyes::{EyesError, FrameSource, Result};
use tracing::{info, warn};

const CAMERA_WIDTH: f64 = 640.0;
const CAMERA_HEIGHT: f64 = 480.0;

pub fn backend(err: opencv::Error) -> EyesError {
    EyesError::Backend(err.to_string())
}

/// Copies a packed 8-bit, 3-channel image into a new `Mat` with the same
/// channel order.
pub fn image_to_mat(image: &RgbImage) -> Result<Mat> {
    let mut mat = Mat::new_rows_cols_with_default(
        image.height() as i32,
        image.width() as i32,
        core::CV_8UC3,
        Scalar::all(0.0),
    )
    .map_err(backend)?;
    mat.data_bytes_mut().map_err(backend)?.copy_from_slice(image.as_raw());
    Ok(mat)
}

/// Copies a continuous 8-bit, 3-channel `Mat` into an image, keeping the
/// channel order.
pub fn mat_to_image(mat: &Mat) -> Result<RgbImage> {
    let (width, height) = (mat.cols() as u32, mat.rows() as u32);
    let bytes = mat.data_bytes().map_err(backend)?.to_vec();
    RgbImage::from_raw(width, height, bytes)
        .ok_or_else(|| EyesError::Backend(format!("frame buffer does not hold {width}x{height} pixels")))
}

/// Frames from a video file or a camera, converted to RGB.
pub struct OpenCvSource {
    capture: VideoCapture,
    frame: Mat,
    released: bool,
}

impl OpenCvSource {
    pub fn open_file(path: &Path) -> Result<Self> {
        let name = path.to_string_lossy();
        let capture = VideoCapture::from_file(&name, videoio::CAP_ANY).map_err(backend)?;
        Self::opened(capture, &name)
    }

    pub fn open_camera(index: i32) -> Result<Self> {
        let mut capture = VideoCapture::new(index, videoio::CAP_ANY).map_err(backend)?;
        capture.set(videoio::CAP_PROP_FRAME_WIDTH, CAMERA_WIDTH).map_err(backend)?;
        capture.set(videoio::CAP_PROP_FRAME_HEIGHT, CAMERA_HEIGHT).map_err(backend)?;
        Self::opened(capture, &format!("camera {index}"))
    }

    fn opened(capture: VideoCapture, name: &str) -> Result<Self> {
        if !capture.is_opened().map_err(backend)? {
            return Err(EyesError::Backend(format!("could not open {name}")));
        }
        info!(source = name, "capture opened");
        Ok(Self {
            capture,
            frame: Mat::default(),
            released: false,
        })
    }
}

impl FrameSource for OpenCvSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if !self.capture.read(&mut self.frame).map_err(backend)? || self.frame.empty() {
            return Ok(None);
        }
        let mut rgb = Mat::default();
        imgproc::cvt_color(&self.frame, &mut rgb, imgproc::COLOR_BGR2RGB, 0).map_err(backend)?;
        mat_to_image(&rgb).map(Some)
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(err) = self.capture.release() {
            warn!(error = %err, "failed to release capture");
        }
    }
}

enum RegionWarp {
    Crop(PixelRect),
    Perspective(Mat),
}

/// Extractor for any calibration: rectangles are cropped, quads are
/// perspective-warped.
pub struct WarpExtractor {
    hold: RegionWarp,
    board: RegionWarp,
    queue: RegionWarp,
    sizes: RegionSizes,
}

impl WarpExtractor {
    pub fn new(calibration: &Calibration, sizes: RegionSizes) -> Result<Self> {
        let warp = |region: RegionKind| -> Result<RegionWarp> {
            match region.geometry(calibration) {
                RegionGeometry::Rect(rect) => Ok(RegionWarp::Crop(*rect)),
                RegionGeometry::Quad(corners) => {
                    let [w, h] = region.size(&sizes);
                    let (w, h) = (w as f32, h as f32);
                    let source: Vector<Point2f> = corners.iter().map(|&[x, y]| Point2f::new(x, y)).collect();
                    // Upper-left, upper-right, lower-right, lower-left.
                    let target: Vector<Point2f> = [[0.0, 0.0], [w, 0.0], [w, h], [0.0, h]]
                        .iter()
                        .map(|&[x, y]| Point2f::new(x, y))
                        .collect();
                    let transform =
                        imgproc::get_perspective_transform(&source, &target, core::DECOMP_LU).map_err(backend)?;
                    Ok(RegionWarp::Perspective(transform))
                }
            }
        };
        Ok(Self {
            hold: warp(RegionKind::Hold)?,
            board: warp(RegionKind::Board)?,
            queue: warp(RegionKind::Queue)?,
            sizes,
        })
    }

    fn warp(&self, region: RegionKind) -> &RegionWarp {
        match region {
            RegionKind::Hold => &self.hold,
            RegionKind::Board => &self.board,
            RegionKind::Queue => &self.queue,
        }
    }

    fn any_perspective(&self) -> bool {
        [&self.hold, &self.board, &self.queue]
            .iter()
            .any(|warp| matches!(warp, RegionWarp::Perspective(_)))
    }

    /// Cuts `region` out of `frame`. `source` is the frame already
    /// converted to a `Mat`, if the caller has it.
    fn cut(&self, frame: &Frame, source: Option<&Mat>, region: RegionKind) -> Result<RgbImage> {
        let [width, height] = region.size(&self.sizes);
        match self.warp(region) {
            RegionWarp::Crop(rect) => crop_region(frame, region, rect, [width, height]),
            RegionWarp::Perspective(transform) => {
                let converted;
                let source = match source {
                    Some(mat) => mat,
                    None => {
                        converted = image_to_mat(frame)?;
                        &converted
                    }
                };
                let mut warped = Mat::default();
                imgproc::warp_perspective(
                    source,
                    &mut warped,
                    transform,
                    Size::new(width as i32, height as i32),
                    imgproc::INTER_LINEAR,
                    core::BORDER_CONSTANT,
                    Scalar::default(),
                )
                .map_err(backend)?;
                mat_to_image(&warped)
            }
        }
    }
}

impl RegionExtractor for WarpExtractor {
    fn extract(&self, frame: &Frame, region: RegionKind) -> Result<RgbImage> {
        self.cut(frame, None, region)
    }

    /// Converts the frame at most once for all three warps.
    fn extract_regions(&self, frame: &Frame) -> Result<Regions> {
        let source = if self.any_perspective() { Some(image_to_mat(frame)?) } else { None };
        let source = source.as_ref();
        Ok(Regions {
            hold: self.cut(frame, source, RegionKind::Hold)?,
            board: self.cut(frame, source, RegionKind::Board)?,
            queue: self.cut(frame, source, RegionKind::Queue)?,
        })
    }
}
