//! Final extraction results returned to callers.

use serde::Serialize;
use thiserror::Error;

use super::candidate::NormalizedCandidate;
use super::report::{QualityLevel, QualityReport, ValidationReport};
use crate::imaging::ContentType;
use crate::text::TextType;

/// Method reported when no engine produced usable text.
pub const METHOD_NONE: &str = "none";

/// Terminal failures of an extraction call.
///
/// These are carried inside [`ExtractionResult::error`] rather than returned
/// as `Err`, so callers always get a renderable result.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractionError {
    #[error("Could not decode image: {message}")]
    Decode { message: String },

    #[error("Engine {engine} failed to initialize: {message}")]
    EngineInit { engine: String, message: String },

    #[error("Engine {engine} failed: {message}")]
    EngineExtract { engine: String, message: String },

    #[error("No engine produced usable text")]
    NoCandidates,

    #[error("Unknown engine: {name}")]
    UnknownEngine { name: String },

    #[error("Extraction cancelled")]
    Cancelled,
}

/// Outcome of one extraction call.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResult {
    pub text: String,
    /// Calibrated confidence in [0, 1].
    pub confidence: f32,
    /// Engine that produced the selected text, or `"none"`.
    pub method: String,
    pub quality: QualityLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_details: Option<QualityReport>,
    pub text_type: TextType,
    pub all_candidates: Vec<NormalizedCandidate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ExtractionError>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<ContentType>,
    pub voting_applied: bool,
    pub processing_time_ms: u64,
}

impl ExtractionResult {
    /// A result carrying no text, used for every terminal failure.
    pub fn failed(error: ExtractionError) -> Self {
        Self {
            text: String::new(),
            confidence: 0.0,
            method: METHOD_NONE.to_string(),
            quality: QualityLevel::Empty,
            quality_details: None,
            text_type: TextType::Unknown,
            all_candidates: Vec::new(),
            validation: None,
            diagnostics: vec![error.to_string()],
            error: Some(error),
            suggestions: Vec::new(),
            content_type: None,
            voting_applied: false,
            processing_time_ms: 0,
        }
    }

    /// True when some engine produced the returned text.
    pub fn is_success(&self) -> bool {
        self.error.is_none() && !self.text.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_result_shape() {
        let result = ExtractionResult::failed(ExtractionError::NoCandidates);
        assert_eq!(result.method, "none");
        assert_eq!(result.confidence, 0.0);
        assert!(!result.is_success());
        assert_eq!(result.diagnostics, vec!["No engine produced usable text"]);
    }

    #[test]
    fn test_error_serializes_with_kind() {
        let err = ExtractionError::UnknownEngine {
            name: "magic".to_string(),
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "unknown_engine");
        assert_eq!(json["name"], "magic");
    }
}
