//! Quality and validation reports attached to candidates.

use serde::{Deserialize, Serialize};

/// Coarse quality bucket derived from a quality score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityLevel {
    Empty,
    Poor,
    Fair,
    Good,
}

impl QualityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Poor => "poor",
            Self::Fair => "fair",
            Self::Good => "good",
        }
    }

    /// Bucket a score in [0, 100].
    pub fn from_score(score: u32) -> Self {
        if score >= 75 {
            Self::Good
        } else if score >= 50 {
            Self::Fair
        } else {
            Self::Poor
        }
    }
}

impl std::fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Heuristic quality assessment of a piece of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    /// Score in [0, 100].
    pub score: u32,
    pub quality: QualityLevel,
    pub issues: Vec<String>,
    pub word_count: usize,
    pub char_count: usize,
}

impl QualityReport {
    pub fn empty() -> Self {
        Self {
            score: 0,
            quality: QualityLevel::Empty,
            issues: vec!["No text extracted".to_string()],
            word_count: 0,
            char_count: 0,
        }
    }
}

/// Plausibility check of a piece of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub issues: Vec<String>,
    /// Share of words found in the common-word set.
    pub common_word_ratio: f32,
    pub avg_word_length: f32,
}

impl ValidationReport {
    /// True when the text failed for structural reasons rather than only
    /// for lacking common words.
    pub fn has_structural_issues(&self) -> bool {
        !self.issues.is_empty()
    }
}
