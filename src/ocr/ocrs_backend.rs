//! OCRS OCR backend implementation.
//!
//! Uses the ocrs crate for pure-Rust OCR without external dependencies.
//! Works on the decoded variant in memory; the on-disk copy is not read.
//!
//! Models are automatically downloaded on first use from:
//! https://ocrs-models.s3-accelerate.amazonaws.com/

use std::path::PathBuf;
use std::sync::OnceLock;

use super::backend::{EngineInput, EngineKind, OcrBackend, OcrError, Recognition};
use super::model_utils::{ModelFile, ModelStore};
use crate::config::OcrsSettings;
use crate::imaging::Profile;

/// Global cached OcrEngine instance (initialized once, reused for all OCR calls).
/// OcrEngine is Send+Sync and its methods take &self, so no Mutex needed.
static OCR_ENGINE: OnceLock<ocrs::OcrEngine> = OnceLock::new();

const DETECTION_MODEL: ModelFile = ModelFile {
    url: "https://ocrs-models.s3-accelerate.amazonaws.com/text-detection.rten",
    filename: "text-detection.rten",
    size_hint: "2.5 MB",
};

const RECOGNITION_MODEL: ModelFile = ModelFile {
    url: "https://ocrs-models.s3-accelerate.amazonaws.com/text-recognition.rten",
    filename: "text-recognition.rten",
    size_hint: "10 MB",
};

const MODELS: ModelStore = ModelStore {
    subdir: "ocrs",
    files: &[DETECTION_MODEL, RECOGNITION_MODEL],
};

/// OCRS OCR backend (pure Rust).
pub struct OcrsBackend {
    settings: OcrsSettings,
}

impl OcrsBackend {
    pub fn new(settings: OcrsSettings) -> Self {
        Self { settings }
    }

    fn model_dir(&self) -> Option<PathBuf> {
        MODELS.locate(self.settings.model_path.as_deref())
    }

    /// Get or initialize the cached OCR engine.
    fn get_or_init_engine(&self) -> Result<&'static ocrs::OcrEngine, OcrError> {
        if let Some(engine) = OCR_ENGINE.get() {
            return Ok(engine);
        }

        let model_dir = MODELS.fetch(self.settings.model_path.as_deref())?;
        let detection_model = rten::Model::load_file(model_dir.join(DETECTION_MODEL.filename))
            .map_err(|e| OcrError::InitFailed(format!("Failed to load detection model: {}", e)))?;
        let recognition_model = rten::Model::load_file(model_dir.join(RECOGNITION_MODEL.filename))
            .map_err(|e| OcrError::InitFailed(format!("Failed to load recognition model: {}", e)))?;

        let engine = ocrs::OcrEngine::new(ocrs::OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            ..Default::default()
        })
        .map_err(|e| OcrError::InitFailed(format!("Failed to create OCR engine: {}", e)))?;

        // Another thread may have won the race; either engine is fine
        let _ = OCR_ENGINE.set(engine);
        OCR_ENGINE
            .get()
            .ok_or_else(|| OcrError::InitFailed("Failed to cache OCR engine".to_string()))
    }
}

impl Default for OcrsBackend {
    fn default() -> Self {
        Self::new(OcrsSettings::default())
    }
}

impl OcrBackend for OcrsBackend {
    fn name(&self) -> &str {
        "ocrs"
    }

    fn kind(&self) -> EngineKind {
        EngineKind::General
    }

    fn profiles(&self) -> Vec<Profile> {
        if self.settings.profiles.is_empty() {
            vec![self.kind().default_profile()]
        } else {
            self.settings.profiles.clone()
        }
    }

    fn is_installed(&self) -> bool {
        // models are auto-downloaded on first use
        true
    }

    fn availability_hint(&self) -> String {
        match self.model_dir() {
            Some(path) => format!("OCRS models found at {:?}", path),
            None => format!(
                "OCRS models will be auto-downloaded on first use (~12 MB total) to {:?}",
                MODELS.default_dir()
            ),
        }
    }

    fn initialize(&self) -> Result<(), OcrError> {
        self.get_or_init_engine().map(|_| ())
    }

    fn extract(&self, input: &EngineInput) -> Result<Recognition, OcrError> {
        let engine = self.get_or_init_engine()?;

        let rgb_img = input.image.to_rgb8();
        let (width, height) = rgb_img.dimensions();
        let img_source = ocrs::ImageSource::from_bytes(rgb_img.as_raw(), (width, height))
            .map_err(|e| OcrError::ImageError(format!("Failed to convert image: {}", e)))?;

        let prepared = engine
            .prepare_input(img_source)
            .map_err(|e| OcrError::OcrFailed(format!("Failed to prepare input: {}", e)))?;
        let text = engine
            .get_text(&prepared)
            .map_err(|e| OcrError::OcrFailed(format!("Failed to extract text: {}", e)))?;

        // ocrs exposes no per-call confidence
        let confidence = if text.trim().is_empty() {
            0.0
        } else {
            self.settings.nominal_confidence
        };
        Ok(Recognition::new(text, confidence))
    }
}
