//! Recognition candidates produced by engines.

use serde::{Deserialize, Serialize};

use super::report::{QualityReport, ValidationReport};

/// Candidates whose trimmed text is this many characters or fewer are discarded.
pub const MIN_TEXT_CHARS: usize = 3;

/// Raw output of a single engine run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Engine that produced this text.
    pub engine_id: String,
    /// Text exactly as the engine returned it.
    pub raw_text: String,
    /// Engine-reported confidence in [0, 1].
    pub confidence: f32,
}

impl Candidate {
    /// Create a candidate, clamping confidence into [0, 1].
    ///
    /// Empty text always carries zero confidence.
    pub fn new(engine_id: impl Into<String>, raw_text: impl Into<String>, confidence: f32) -> Self {
        let raw_text = raw_text.into();
        let confidence = if raw_text.trim().is_empty() || !confidence.is_finite() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            engine_id: engine_id.into(),
            raw_text,
            confidence,
        }
    }

    /// Whether the text is long enough to count as a result at all.
    pub fn is_usable(&self) -> bool {
        self.raw_text.trim().chars().count() > MIN_TEXT_CHARS
    }

    /// Number of whitespace-separated words in the raw text.
    pub fn word_count(&self) -> usize {
        self.raw_text.split_whitespace().count()
    }
}

/// A candidate after cleanup, annotated with quality and validation reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedCandidate {
    pub engine_id: String,
    pub raw_text: String,
    /// Normalized text.
    pub text: String,
    pub confidence: f32,
    pub quality: QualityReport,
    pub validation: ValidationReport,
}

impl NormalizedCandidate {
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_has_zero_confidence() {
        let c = Candidate::new("ocrs", "   ", 0.9);
        assert_eq!(c.confidence, 0.0);
        assert!(!c.is_usable());
    }

    #[test]
    fn test_confidence_is_clamped() {
        assert_eq!(Candidate::new("a", "some text", 1.7).confidence, 1.0);
        assert_eq!(Candidate::new("a", "some text", -0.2).confidence, 0.0);
        assert_eq!(Candidate::new("a", "some text", f32::NAN).confidence, 0.0);
    }

    #[test]
    fn test_short_text_is_not_usable() {
        assert!(!Candidate::new("a", " abc ", 0.9).is_usable());
        assert!(Candidate::new("a", "abcd", 0.9).is_usable());
    }
}
