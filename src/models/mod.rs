//! Data models for scanscribe.

mod candidate;
mod extraction;
mod report;

pub use candidate::{Candidate, NormalizedCandidate, MIN_TEXT_CHARS};
pub use extraction::{ExtractionError, ExtractionResult, METHOD_NONE};
pub use report::{QualityLevel, QualityReport, ValidationReport};
