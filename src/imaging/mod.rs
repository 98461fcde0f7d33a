//! Image loading, content-tuned preprocessing, and content-type detection.
//!
//! Source images are immutable. Every preprocessing profile produces a new
//! [`ImageVariant`]; variants that need to be on disk for an engine are
//! written as a [`ScopedImageFile`] that is deleted when dropped.

mod clahe;
mod detect;
mod preprocess;

use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;

pub use clahe::clahe;
pub use detect::{ContentType, ContentTypeDetector, DetectionSettings};
pub use preprocess::{ImagePreprocessor, PreprocessSettings, ProfileTuning};

/// Errors from loading or persisting images.
#[derive(Debug, Error)]
pub enum ImagingError {
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Named preprocessing profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Binarized, stroke-reconnected variant for handwriting.
    Handwriting,
    /// Lightly cleaned, globally thresholded variant for print.
    Printed,
    /// The decoded image unchanged.
    Original,
}

impl Profile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Handwriting => "handwriting",
            Profile::Printed => "printed",
            Profile::Original => "original",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "handwriting" | "handwritten" => Some(Profile::Handwriting),
            "printed" | "print" => Some(Profile::Printed),
            "original" | "none" => Some(Profile::Original),
            _ => None,
        }
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A decoded source image.
#[derive(Debug, Clone)]
pub struct SourceImage {
    image: Arc<DynamicImage>,
    byte_len: usize,
}

impl SourceImage {
    /// Decode an image from raw bytes, guessing the format from its content.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ImagingError> {
        let image = image::load_from_memory(bytes)?;
        Ok(Self {
            image: Arc::new(image),
            byte_len: bytes.len(),
        })
    }

    /// Read and decode an image file.
    pub fn open(path: &Path) -> Result<Self, ImagingError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    /// Wrap an already decoded image.
    pub fn from_image(image: DynamicImage) -> Self {
        Self {
            image: Arc::new(image),
            byte_len: 0,
        }
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn shared(&self) -> Arc<DynamicImage> {
        Arc::clone(&self.image)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }

    /// Size of the encoded input, or 0 when built from a decoded image.
    pub fn byte_len(&self) -> usize {
        self.byte_len
    }
}

/// An image derived from a source for one profile.
#[derive(Debug, Clone)]
pub struct ImageVariant {
    pub profile: Profile,
    pub image: Arc<DynamicImage>,
    /// Set when preprocessing failed and the original image was used instead.
    pub degraded: bool,
}

impl ImageVariant {
    /// Encode the variant as PNG into a temp file under `dir`.
    pub fn write_scoped(&self, dir: &Path) -> Result<ScopedImageFile, ImagingError> {
        let mut file = tempfile::Builder::new()
            .prefix(&format!("{}-", self.profile))
            .suffix(".png")
            .tempfile_in(dir)?;
        {
            let mut writer = BufWriter::new(file.as_file_mut());
            self.image.write_to(&mut writer, ImageFormat::Png)?;
            writer.flush()?;
        }
        Ok(ScopedImageFile { file })
    }
}

/// On-disk copy of a variant, removed when dropped.
#[derive(Debug)]
pub struct ScopedImageFile {
    file: NamedTempFile,
}

impl ScopedImageFile {
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn test_profile_names() {
        for profile in [Profile::Handwriting, Profile::Printed, Profile::Original] {
            assert_eq!(Profile::from_str(profile.as_str()), Some(profile));
        }
        assert_eq!(Profile::from_str("PRINT"), Some(Profile::Printed));
        assert_eq!(Profile::from_str("sepia"), None);
    }

    #[test]
    fn test_decode_failure() {
        let result = SourceImage::from_bytes(b"definitely not an image");
        assert!(matches!(result, Err(ImagingError::Image(_))));
    }

    #[test]
    fn test_scoped_file_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let variant = ImageVariant {
            profile: Profile::Original,
            image: Arc::new(DynamicImage::ImageLuma8(GrayImage::from_pixel(
                8,
                8,
                Luma([200]),
            ))),
            degraded: false,
        };

        let scoped = variant.write_scoped(dir.path()).unwrap();
        let path = scoped.path().to_path_buf();
        assert!(path.exists());
        assert!(SourceImage::open(&path).is_ok());

        drop(scoped);
        assert!(!path.exists());
    }
}
