//! Recognition engines and the ensemble that runs them.
//!
//! ## OCR Backends
//!
//! - **DeepSeek**: vision-language OCR via subprocess, reads handwriting (role: handwriting)
//! - **OCRS**: pure Rust OCR, no external binaries (feature: ocr-ocrs, role: general)
//! - **PaddleOCR**: CNN-based detector/recognizer via ONNX (feature: ocr-paddle, role: layout)
//! - **Tesseract**: traditional OCR via command-line (role: fallback)
//!
//! Engines are registered in an [`EngineRegistry`], which initializes each
//! one lazily and at most once. The [`ExtractionOrchestrator`] orders them by
//! role for each image and reconciles their candidates.

mod backend;
mod deepseek;
mod model_utils;
mod orchestrator;
mod process;
mod registry;
mod tesseract;

#[cfg(feature = "ocr-ocrs")]
mod ocrs_backend;
#[cfg(feature = "ocr-paddle")]
mod paddle_backend;

pub use backend::{EngineInput, EngineKind, OcrBackend, OcrError, Recognition};
pub use deepseek::DeepSeekBackend;
pub use orchestrator::{
    priority_order, CancellationFlag, ExtractionOrchestrator, NO_USABLE_TEXT, SUGGESTIONS,
};
pub use registry::{EngineRegistry, EngineState, EngineStatus};
pub use tesseract::TesseractBackend;

#[cfg(feature = "ocr-ocrs")]
pub use ocrs_backend::OcrsBackend;
#[cfg(feature = "ocr-paddle")]
pub use paddle_backend::PaddleBackend;
