//! Plausibility checks for extracted text.

use std::collections::HashSet;
use std::sync::LazyLock;

use crate::models::ValidationReport;

/// Minimum share of common words for text to read as language.
const MIN_COMMON_WORD_RATIO: f32 = 0.2;

/// Closed-class words that almost any English sentence contains.
static COMMON_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "the", "to", "keep", "balance", "a", "and", "is", "in", "for", "of", "that", "this", "be",
        "have", "with", "as", "from", "by", "are", "or", "an", "on", "at", "was", "been", "will",
    ]
    .into_iter()
    .collect()
});

/// Check whether `text` looks like a real transcription.
pub fn validate(text: &str) -> ValidationReport {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        let issue = if text.is_empty() {
            "Empty text"
        } else {
            "No words detected"
        };
        return ValidationReport {
            is_valid: false,
            issues: vec![issue.to_string()],
            common_word_ratio: 0.0,
            avg_word_length: 0.0,
        };
    }

    let word_count = words.len() as f32;
    let avg_word_length = average_word_length(&words);
    let mut issues = Vec::new();

    if avg_word_length < 2.0 {
        issues.push("Words too short (likely garbage)".to_string());
    }
    if avg_word_length > 15.0 {
        issues.push("Words too long (likely merged words)".to_string());
    }
    if text.matches('-').count() as f32 > word_count * 0.3 {
        issues.push("Too many hyphens".to_string());
    }
    if text.matches(':').count() > 2 {
        issues.push("Unusual colon count".to_string());
    }

    let common = words
        .iter()
        .filter(|w| COMMON_WORDS.contains(word_key(w).as_str()))
        .count();
    let common_word_ratio = common as f32 / word_count;

    ValidationReport {
        is_valid: common_word_ratio >= MIN_COMMON_WORD_RATIO && issues.is_empty(),
        issues,
        common_word_ratio,
        avg_word_length,
    }
}

/// Lowercased word with surrounding punctuation removed.
pub(crate) fn word_key(word: &str) -> String {
    word.trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
}

pub(crate) fn average_word_length(words: &[&str]) -> f32 {
    if words.is_empty() {
        return 0.0;
    }
    let total: usize = words.iter().map(|w| w.chars().count()).sum();
    total as f32 / words.len() as f32
}
