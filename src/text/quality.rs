//! Heuristic quality scoring of extracted text.

use regex::Regex;
use std::sync::LazyLock;

use crate::models::{QualityLevel, QualityReport};

/// Runs of pipes or exclamation marks typical of misread rules and borders.
static OCR_NOISE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\|{2,}|!{3,}").unwrap());

/// Punctuation that does not count as unusual.
const ORDINARY_PUNCT: &[char] = &['.', ',', ':', ';', '!', '?', '-', '\'', '"'];

/// Score `text` in [0, 100] and list what dragged it down.
pub fn score(text: &str) -> QualityReport {
    if text.trim().is_empty() {
        return QualityReport::empty();
    }

    let char_count = text.chars().count();
    let total = char_count as f32;
    let mut issues = Vec::new();
    let mut score: i32 = 100;

    if char_count < 10 {
        issues.push("Text too short".to_string());
        score -= 20;
    }

    let unusual = text
        .chars()
        .filter(|c| !c.is_alphanumeric() && !c.is_whitespace() && !ORDINARY_PUNCT.contains(c))
        .count();
    if unusual as f32 > total * 0.1 {
        issues.push(format!("High unusual character count ({})", unusual));
        score -= 15;
    }

    let digits = text.chars().filter(|c| c.is_ascii_digit()).count();
    if digits as f32 > total * 0.3 {
        issues.push("High numeric content".to_string());
        score -= 10;
    }

    if let Some(run) = longest_repeat(text).filter(|r| r.len >= 4) {
        issues.push(format!("Repeated character {:?} x{}", run.ch, run.len));
        score -= 25;
    }

    if OCR_NOISE.is_match(text) {
        issues.push("OCR noise patterns detected".to_string());
        score -= 20;
    }

    let score = score.clamp(0, 100) as u32;
    QualityReport {
        score,
        quality: QualityLevel::from_score(score),
        issues,
        word_count: text.split_whitespace().count(),
        char_count,
    }
}

#[derive(Clone, Copy)]
struct Run {
    ch: char,
    len: usize,
}

/// Longest run of one repeated non-whitespace character.
fn longest_repeat(text: &str) -> Option<Run> {
    let mut best: Option<Run> = None;
    let mut current: Option<Run> = None;

    for c in text.chars() {
        current = match current {
            Some(run) if run.ch == c => Some(Run {
                ch: c,
                len: run.len + 1,
            }),
            _ if c.is_whitespace() => None,
            _ => Some(Run { ch: c, len: 1 }),
        };
        if let Some(run) = current {
            if best.map_or(true, |b| run.len > b.len) {
                best = Some(run);
            }
        }
    }
    best
}
