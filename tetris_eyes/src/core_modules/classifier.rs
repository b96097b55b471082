// THEORY:
// The `CellClassifier` turns a region image into an `OccupancyMask`. It hides
// which decision rule is in use behind one type selected at session setup:
//
// 1.  **Threshold**: a fixed luminance cutoff.
// 2.  **TwoCluster**: the queue region always shows both empty background and
//     piece pixels, so its luminance splits cleanly into two clusters. The
//     classifier learns the mean and spread of each cluster from the queue,
//     keeps a sampled history of those statistics, and uses their median. A
//     pixel is occupied when it is closer, in standard deviations, to the
//     "full" cluster than to the "empty" one.
// 3.  **NearestCentroid**: full-color comparison against one empty color and
//     any number of piece colors.
//
// The classifier is the only stateful part of classification, and only for
// `TwoCluster`. Given the same statistics and pixels, every strategy returns
// the same mask.

use std::collections::VecDeque;

use image::RgbImage;

use crate::config::ClassifierConfig;
use crate::core_modules::mask::OccupancyMask;
use crate::core_modules::pixel::pixel::{color_distance, luminance};

/// Floor for cluster spreads so a perfectly flat cluster does not divide by zero.
const MIN_STD_DEV: f64 = 1e-6;
/// How many calibration samples are kept for the running median.
const CALIBRATION_HISTORY_LIMIT: usize = 256;
/// Two-means stops once neither center moves more than this.
const CONVERGENCE_EPSILON: f64 = 1.0;

/// Luminance statistics of the empty (index 0) and full (index 1) clusters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterStats {
    pub means: [f64; 2],
    pub std_devs: [f64; 2],
}

impl ClusterStats {
    /// Whether a luminance value belongs to the full cluster. Ties go to empty.
    pub fn is_full(&self, value: f64) -> bool {
        let distance = |i: usize| (value - self.means[i]).abs() / self.std_devs[i].max(MIN_STD_DEV);
        distance(1) < distance(0)
    }

    /// Deterministic two-means over the luminance of `image`.
    ///
    /// Centers start at the darkest and brightest values present and follow
    /// Lloyd iterations over a 256-bin histogram.
    pub fn estimate(image: &RgbImage, max_iterations: usize) -> Option<ClusterStats> {
        let mut histogram = [0u64; 256];
        for pixel in image.pixels() {
            histogram[luminance(pixel).round().clamp(0.0, 255.0) as usize] += 1;
        }
        let lowest = histogram.iter().position(|&n| n > 0)?;
        let highest = histogram.iter().rposition(|&n| n > 0)?;
        let mut centers = [lowest as f64, highest as f64];

        for _ in 0..max_iterations {
            let mut sums = [0.0f64; 2];
            let mut counts = [0u64; 2];
            for (value, &n) in histogram.iter().enumerate() {
                if n == 0 {
                    continue;
                }
                let cluster = Self::nearest_center(&centers, value as f64);
                sums[cluster] += value as f64 * n as f64;
                counts[cluster] += n;
            }
            let mut shift = 0.0f64;
            for i in 0..2 {
                if counts[i] > 0 {
                    let updated = sums[i] / counts[i] as f64;
                    shift = shift.max((updated - centers[i]).abs());
                    centers[i] = updated;
                }
            }
            if shift < CONVERGENCE_EPSILON {
                break;
            }
        }

        let mut squares = [0.0f64; 2];
        let mut counts = [0u64; 2];
        for (value, &n) in histogram.iter().enumerate() {
            if n == 0 {
                continue;
            }
            let cluster = Self::nearest_center(&centers, value as f64);
            squares[cluster] += (value as f64 - centers[cluster]).powi(2) * n as f64;
            counts[cluster] += n;
        }
        let std_dev = |i: usize| {
            if counts[i] == 0 {
                0.0
            } else {
                (squares[i] / counts[i] as f64).sqrt()
            }
        };

        Some(ClusterStats {
            means: centers,
            std_devs: [std_dev(0), std_dev(1)],
        })
    }

    fn nearest_center(centers: &[f64; 2], value: f64) -> usize {
        if (value - centers[1]).abs() < (value - centers[0]).abs() { 1 } else { 0 }
    }

    /// Component-wise median of a set of samples.
    fn median_of(samples: &VecDeque<ClusterStats>) -> Option<ClusterStats> {
        if samples.is_empty() {
            return None;
        }
        let component = |pick: fn(&ClusterStats) -> f64| {
            let mut values: Vec<f64> = samples.iter().map(pick).collect();
            values.sort_by(f64::total_cmp);
            let mid = values.len() / 2;
            if values.len() % 2 == 0 {
                (values[mid - 1] + values[mid]) / 2.0
            } else {
                values[mid]
            }
        };
        Some(ClusterStats {
            means: [component(|s| s.means[0]), component(|s| s.means[1])],
            std_devs: [component(|s| s.std_devs[0]), component(|s| s.std_devs[1])],
        })
    }
}

#[derive(Debug, Clone)]
enum Strategy {
    Threshold {
        cutoff: f64,
    },
    TwoCluster {
        resample_interval: u64,
        max_iterations: usize,
        samples: VecDeque<ClusterStats>,
        current: Option<ClusterStats>,
    },
    NearestCentroid {
        empty: [u8; 3],
        full: Vec<[u8; 3]>,
    },
}

/// Per-session pixel classifier.
#[derive(Debug, Clone)]
pub struct CellClassifier {
    strategy: Strategy,
}

impl CellClassifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        let strategy = match config {
            ClassifierConfig::Threshold { cutoff } => Strategy::Threshold { cutoff: *cutoff },
            ClassifierConfig::TwoCluster { resample_interval, max_iterations } => Strategy::TwoCluster {
                resample_interval: *resample_interval,
                max_iterations: *max_iterations,
                samples: VecDeque::new(),
                current: None,
            },
            ClassifierConfig::NearestCentroid { empty, full } => Strategy::NearestCentroid {
                empty: *empty,
                full: full.clone(),
            },
        };
        Self { strategy }
    }

    /// Feeds the queue region of frame `frame_index` (1-based) into the
    /// calibration. Only `TwoCluster` learns; the other strategies ignore it.
    pub fn observe(&mut self, queue: &RgbImage, frame_index: u64) {
        if let Strategy::TwoCluster { resample_interval, max_iterations, samples, current } =
            &mut self.strategy
        {
            if !samples.is_empty() && frame_index % *resample_interval != 0 {
                return;
            }
            let Some(sample) = ClusterStats::estimate(queue, *max_iterations) else {
                return;
            };
            samples.push_back(sample);
            if samples.len() > CALIBRATION_HISTORY_LIMIT {
                samples.pop_front();
            }
            *current = ClusterStats::median_of(samples);
        }
    }

    /// The statistics currently in use, for `TwoCluster`.
    pub fn cluster_stats(&self) -> Option<ClusterStats> {
        match &self.strategy {
            Strategy::TwoCluster { current, .. } => *current,
            _ => None,
        }
    }

    /// Classifies every pixel. An uncalibrated `TwoCluster` classifier
    /// reports everything as empty.
    pub fn classify(&self, image: &RgbImage) -> OccupancyMask {
        let (width, height) = image.dimensions();
        match &self.strategy {
            Strategy::Threshold { cutoff } => {
                OccupancyMask::from_fn(width, height, |x, y| luminance(image.get_pixel(x, y)) > *cutoff)
            }
            Strategy::TwoCluster { current: Some(stats), .. } => {
                OccupancyMask::from_fn(width, height, |x, y| stats.is_full(luminance(image.get_pixel(x, y))))
            }
            Strategy::TwoCluster { current: None, .. } => OccupancyMask::new(width, height),
            Strategy::NearestCentroid { empty, full } => OccupancyMask::from_fn(width, height, |x, y| {
                let pixel = image.get_pixel(x, y);
                let to_empty = color_distance(pixel, empty);
                full.iter().any(|c| color_distance(pixel, c) < to_empty)
            }),
        }
    }
}
