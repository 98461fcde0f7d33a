//! scanscribe - ensemble text extraction for photographed and scanned documents.
//!
//! Several recognition engines run against content-tuned variants of the same
//! image. Their outputs are cleaned, scored and validated, and the best result
//! (or a word-level vote across agreeing results) is returned together with a
//! calibrated confidence and diagnostics.
//!
//! The main entry point is [`services::ExtractionService`].

pub mod config;
pub mod imaging;
pub mod models;
pub mod ocr;
pub mod services;
pub mod text;

pub use config::Settings;
pub use models::{Candidate, ExtractionError, ExtractionResult};
pub use services::{ExtractionService, ImageInput};
