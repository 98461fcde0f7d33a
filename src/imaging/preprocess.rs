//! Content-tuned preprocessing profiles.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma};
use imageproc::contrast::{adaptive_threshold, otsu_level};
use imageproc::distance_transform::Norm;
use imageproc::filter::{gaussian_blur_f32, median_filter};
use imageproc::morphology::{close, dilate};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::clahe::clahe;
use super::{ImageVariant, Profile, SourceImage};

const CLAHE_GRID: (u32, u32) = (8, 8);

/// Enhancement strengths for one profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileTuning {
    /// Contrast factor (1.0 leaves contrast unchanged).
    pub contrast: f32,
    /// Unsharp-mask radius.
    pub sharpen_sigma: f32,
    /// Unsharp-mask threshold.
    pub sharpen_threshold: i32,
    /// CLAHE clip limit.
    pub clahe_clip: f32,
}

/// Preprocessing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessSettings {
    /// Images whose shorter side is below this are upscaled to it.
    pub min_dimension: u32,
    /// Block radius for adaptive binarization of handwriting.
    pub adaptive_block_radius: u32,
    /// Gaussian blur applied to print before Otsu thresholding.
    pub printed_blur_sigma: f32,
    pub handwriting: ProfileTuning,
    pub printed: ProfileTuning,
}

impl Default for PreprocessSettings {
    fn default() -> Self {
        Self {
            min_dimension: 256,
            adaptive_block_radius: 5,
            printed_blur_sigma: 0.5,
            handwriting: ProfileTuning {
                contrast: 1.8,
                sharpen_sigma: 1.5,
                sharpen_threshold: 2,
                clahe_clip: 2.0,
            },
            printed: ProfileTuning {
                contrast: 1.8,
                sharpen_sigma: 1.0,
                sharpen_threshold: 2,
                clahe_clip: 1.5,
            },
        }
    }
}

/// Produces [`ImageVariant`]s from a [`SourceImage`].
#[derive(Debug, Clone, Default)]
pub struct ImagePreprocessor {
    settings: PreprocessSettings,
}

impl ImagePreprocessor {
    pub fn new(settings: PreprocessSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &PreprocessSettings {
        &self.settings
    }

    /// Build the variant for `profile`. Never touches the source.
    ///
    /// If any step fails the original image is returned with `degraded` set.
    pub fn preprocess(&self, source: &SourceImage, profile: Profile) -> ImageVariant {
        let image = source.image();
        if profile == Profile::Original {
            return ImageVariant {
                profile,
                image: source.shared(),
                degraded: false,
            };
        }

        if image.width() == 0 || image.height() == 0 {
            warn!("Cannot preprocess empty image, using original");
            return degraded(source, profile);
        }

        let result = catch_unwind(AssertUnwindSafe(|| match profile {
            Profile::Handwriting => self.handwriting(image),
            Profile::Printed => self.printed(image),
            Profile::Original => image.to_luma8(),
        }));

        match result {
            Ok(gray) => {
                debug!(
                    "Preprocessed {}x{} image with {} profile",
                    gray.width(),
                    gray.height(),
                    profile
                );
                ImageVariant {
                    profile,
                    image: Arc::new(DynamicImage::ImageLuma8(gray)),
                    degraded: false,
                }
            }
            Err(_) => {
                warn!("{} preprocessing failed, using original image", profile);
                degraded(source, profile)
            }
        }
    }

    fn handwriting(&self, image: &DynamicImage) -> GrayImage {
        let tuning = &self.settings.handwriting;
        let image = upscale_if_small(image, self.settings.min_dimension);
        let gray = enhance(&image, tuning).to_luma8();
        let gray = clahe(&gray, tuning.clahe_clip, CLAHE_GRID);
        let gray = median_filter(&gray, 1, 1);
        let binary = adaptive_threshold(&gray, self.settings.adaptive_block_radius);
        reconnect_strokes(binary)
    }

    fn printed(&self, image: &DynamicImage) -> GrayImage {
        let tuning = &self.settings.printed;
        let gray = enhance(image, tuning).to_luma8();
        let gray = clahe(&gray, tuning.clahe_clip, CLAHE_GRID);
        let gray = gaussian_blur_f32(&gray, self.settings.printed_blur_sigma);
        let binary = binarize(&gray, otsu_level(&gray));
        median_filter(&binary, 1, 1)
    }
}

fn degraded(source: &SourceImage, profile: Profile) -> ImageVariant {
    ImageVariant {
        profile,
        image: source.shared(),
        degraded: true,
    }
}

/// Upscale so the shorter side reaches `min_dim`, keeping the aspect ratio.
fn upscale_if_small(image: &DynamicImage, min_dim: u32) -> DynamicImage {
    let (w, h) = (image.width(), image.height());
    let short = w.min(h);
    if short >= min_dim {
        return image.clone();
    }
    let scale = min_dim as f32 / short as f32;
    let new_w = ((w as f32 * scale).round() as u32).max(min_dim);
    let new_h = ((h as f32 * scale).round() as u32).max(min_dim);
    image.resize_exact(new_w, new_h, FilterType::Lanczos3)
}

/// Contrast boost followed by an unsharp mask.
fn enhance(image: &DynamicImage, tuning: &ProfileTuning) -> DynamicImage {
    image
        .adjust_contrast(contrast_percent(tuning.contrast))
        .unsharpen(tuning.sharpen_sigma, tuning.sharpen_threshold)
}

/// Convert a multiplicative contrast factor into the percentage `adjust_contrast` expects.
fn contrast_percent(factor: f32) -> f32 {
    (factor.max(0.0).sqrt() - 1.0) * 100.0
}

fn binarize(gray: &GrayImage, level: u8) -> GrayImage {
    let mut out = gray.clone();
    for p in out.pixels_mut() {
        p[0] = if p[0] > level { 255 } else { 0 };
    }
    out
}

fn mean_intensity(gray: &GrayImage) -> f32 {
    let n = (gray.width() as u64 * gray.height() as u64).max(1);
    let sum: u64 = gray.pixels().map(|p| p[0] as u64).sum();
    sum as f32 / n as f32
}

/// Close gaps in strokes and thicken them slightly, returning dark ink on a
/// light background whatever the input polarity.
///
/// The majority colour is taken as background.
fn reconnect_strokes(binary: GrayImage) -> GrayImage {
    let mut ink = binary;
    if mean_intensity(&ink) > 127.0 {
        // light background: make ink the foreground
        imageops::invert(&mut ink);
    }
    let ink = close(&ink, Norm::LInf, 1);
    let mut ink = dilate(&ink, Norm::L1, 1);
    imageops::invert(&mut ink);
    ink
}

#[cfg(test)]
pub(crate) fn test_page(width: u32, height: u32) -> DynamicImage {
    // light page with dark horizontal "text" bars
    DynamicImage::ImageLuma8(GrayImage::from_fn(width, height, |x, y| {
        let in_line = (y / 6) % 3 == 1;
        let in_word = (x / 9) % 4 != 3;
        if in_line && in_word && x > 4 && x + 4 < width {
            Luma([30])
        } else {
            Luma([225])
        }
    }))
}
