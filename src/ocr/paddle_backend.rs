//! PaddleOCR backend implementation.
//!
//! Uses paddle-ocr-rs for OCR via ONNX Runtime. Its detector copes with
//! multi-column and rotated layouts better than the line recognizers.
//!
//! Models are automatically downloaded on first use from:
//! https://github.com/RapidAI/RapidOCR

use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use paddle_ocr_rs::ocr_lite::OcrLite;

use super::backend::{EngineInput, EngineKind, OcrBackend, OcrError, Recognition};
use super::model_utils::{ModelFile, ModelStore};
use crate::config::PaddleSettings;
use crate::imaging::Profile;

/// Global cached OcrLite instance, wrapped in Mutex since detect_from_path needs &mut self.
static OCR_ENGINE: OnceLock<Mutex<OcrLite>> = OnceLock::new();

const DET_MODEL_NAME: &str = "ch_PP-OCRv4_det_infer.onnx";
const REC_MODEL_NAME: &str = "ch_PP-OCRv4_rec_infer.onnx";
const CLS_MODEL_NAME: &str = "ch_ppocr_mobile_v2.0_cls_infer.onnx";

const DET_MODEL: ModelFile = ModelFile {
    url: "https://huggingface.co/SWHL/RapidOCR/resolve/main/PP-OCRv4/ch_PP-OCRv4_det_infer.onnx",
    filename: DET_MODEL_NAME,
    size_hint: "4 MB",
};

const REC_MODEL: ModelFile = ModelFile {
    url: "https://huggingface.co/SWHL/RapidOCR/resolve/main/PP-OCRv4/ch_PP-OCRv4_rec_infer.onnx",
    filename: REC_MODEL_NAME,
    size_hint: "10 MB",
};

const CLS_MODEL: ModelFile = ModelFile {
    url: "https://www.modelscope.cn/models/RapidAI/RapidOCR/resolve/v3.4.0/onnx/PP-OCRv4/cls/ch_ppocr_mobile_v2.0_cls_infer.onnx",
    filename: CLS_MODEL_NAME,
    size_hint: "1 MB",
};

const MODELS: ModelStore = ModelStore {
    subdir: "paddle-ocr",
    files: &[DET_MODEL, REC_MODEL, CLS_MODEL],
};

/// PaddleOCR backend via ONNX Runtime.
pub struct PaddleBackend {
    settings: PaddleSettings,
}

impl PaddleBackend {
    pub fn new(settings: PaddleSettings) -> Self {
        Self { settings }
    }

    fn model_dir(&self) -> Option<PathBuf> {
        MODELS.locate(self.settings.model_path.as_deref())
    }

    /// Get or initialize the cached OCR engine.
    fn get_or_init_engine(&self) -> Result<&'static Mutex<OcrLite>, OcrError> {
        if let Some(engine) = OCR_ENGINE.get() {
            return Ok(engine);
        }

        let model_dir = MODELS.fetch(self.settings.model_path.as_deref())?;
        let path = |name: &str| model_dir.join(name).to_string_lossy().to_string();

        let mut ocr = OcrLite::new();
        ocr.init_models(
            &path(DET_MODEL_NAME),
            &path(CLS_MODEL_NAME),
            &path(REC_MODEL_NAME),
            self.settings.threads.max(1),
        )
        .map_err(|e| OcrError::InitFailed(format!("Failed to init PaddleOCR: {}", e)))?;

        let _ = OCR_ENGINE.set(Mutex::new(ocr));
        OCR_ENGINE
            .get()
            .ok_or_else(|| OcrError::InitFailed("Failed to cache OCR engine".to_string()))
    }
}

impl Default for PaddleBackend {
    fn default() -> Self {
        Self::new(PaddleSettings::default())
    }
}

impl OcrBackend for PaddleBackend {
    fn name(&self) -> &str {
        "paddleocr"
    }

    fn kind(&self) -> EngineKind {
        EngineKind::Layout
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
            Some(path) => format!("PaddleOCR models found at {:?}", path),
            None => format!(
                "PaddleOCR models will be auto-downloaded on first use (~15 MB total) to {:?}",
                MODELS.default_dir()
            ),
        }
    }

    fn initialize(&self) -> Result<(), OcrError> {
        self.get_or_init_engine().map(|_| ())
    }

    fn extract(&self, input: &EngineInput) -> Result<Recognition, OcrError> {
        let engine = self.get_or_init_engine()?;
        let mut ocr = engine
            .lock()
            .map_err(|e| OcrError::OcrFailed(format!("Failed to lock OCR engine: {}", e)))?;

        let path = input
            .path
            .to_str()
            .ok_or_else(|| OcrError::ImageError("Non UTF-8 image path".to_string()))?;

        let result = ocr
            .detect_from_path(
                path,
                50,    // padding
                1024,  // max side length
                0.5,   // box score threshold
                0.3,   // unclip ratio
                1.6,   // box threshold
                false, // do angle
                false, // most angle
            )
            .map_err(|e| OcrError::OcrFailed(format!("PaddleOCR detection failed: {}", e)))?;

        let blocks: Vec<_> = result
            .text_blocks
            .iter()
            .filter(|block| !block.text.trim().is_empty())
            .collect();
        if blocks.is_empty() {
            return Ok(Recognition::new("", 0.0));
        }

        let text = blocks
            .iter()
            .map(|block| block.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let confidence =
            blocks.iter().map(|block| block.text_score).sum::<f32>() / blocks.len() as f32;
        Ok(Recognition::new(text, confidence))
    }
}
