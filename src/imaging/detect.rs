//! Handwriting vs. print heuristic.

use std::panic::{catch_unwind, AssertUnwindSafe};

use image::GrayImage;
use imageproc::edges::canny;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::SourceImage;

/// Thresholds for the handwriting heuristic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionSettings {
    pub canny_low: f32,
    pub canny_high: f32,
    /// Edge pixels / all pixels above which the image counts as handwriting.
    pub edge_density_threshold: f32,
    /// Laplacian variance above which the image counts as handwriting.
    pub variance_threshold: f32,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            canny_low: 100.0,
            canny_high: 200.0,
            edge_density_threshold: 0.03,
            variance_threshold: 100.0,
        }
    }
}

/// Result of content-type detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContentType {
    pub is_handwritten: bool,
    pub edge_density: f32,
    pub laplacian_variance: f32,
}

impl ContentType {
    /// Used when detection cannot run.
    pub fn unknown() -> Self {
        Self {
            is_handwritten: false,
            edge_density: 0.0,
            laplacian_variance: 0.0,
        }
    }
}

/// Classifies images as likely handwritten or likely printed.
#[derive(Debug, Clone, Default)]
pub struct ContentTypeDetector {
    settings: DetectionSettings,
}

impl ContentTypeDetector {
    pub fn new(settings: DetectionSettings) -> Self {
        Self { settings }
    }

    /// Handwriting iff edge density or Laplacian variance exceeds its threshold.
    /// Any internal failure yields "not handwritten".
    pub fn detect(&self, source: &SourceImage) -> ContentType {
        let (w, h) = source.dimensions();
        if w < 3 || h < 3 {
            return ContentType::unknown();
        }

        let result = catch_unwind(AssertUnwindSafe(|| {
            let gray = source.image().to_luma8();
            let edges = canny(&gray, self.settings.canny_low, self.settings.canny_high);
            let edge_pixels = edges.pixels().filter(|p| p[0] > 0).count();
            let edge_density = edge_pixels as f32 / (w as f32 * h as f32);
            (edge_density, laplacian_variance(&gray))
        }));

        match result {
            Ok((edge_density, laplacian_variance)) => {
                let is_handwritten = edge_density > self.settings.edge_density_threshold
                    || laplacian_variance > self.settings.variance_threshold;
                debug!(
                    "Content detection: edge density {:.4}, variance {:.2}, handwritten {}",
                    edge_density, laplacian_variance, is_handwritten
                );
                ContentType {
                    is_handwritten,
                    edge_density,
                    laplacian_variance,
                }
            }
            Err(_) => {
                warn!("Content type detection failed, assuming print");
                ContentType::unknown()
            }
        }
    }
}

/// Variance of the 4-neighbour Laplacian over interior pixels.
pub fn laplacian_variance(img: &GrayImage) -> f32 {
    let (w, h) = img.dimensions();
    if w < 3 || h < 3 {
        return 0.0;
    }

    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    let mut count = 0u64;
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let px = |x: u32, y: u32| img.get_pixel(x, y)[0] as f64;
            let lap = px(x, y - 1) + px(x, y + 1) + px(x - 1, y) + px(x + 1, y) - 4.0 * px(x, y);
            sum += lap;
            sum_sq += lap * lap;
            count += 1;
        }
    }

    let mean = sum / count as f64;
    ((sum_sq / count as f64) - mean * mean).max(0.0) as f32
}
