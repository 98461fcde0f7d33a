//! Ranking of normalized candidates and word-level voting.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::normalize::normalize;
use super::quality;
use super::validate::{self, average_word_length, word_key};
use crate::models::{NormalizedCandidate, QualityReport, ValidationReport};

/// Confidence adjustment applied after validation of the selected text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Calibration {
    /// Multiplier for text that passed validation.
    pub valid_multiplier: f32,
    /// Multiplier for text that failed validation with structural issues.
    pub invalid_multiplier: f32,
    /// Ceiling for boosted confidence.
    pub max_confidence: f32,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            valid_multiplier: 1.2,
            invalid_multiplier: 0.7,
            max_confidence: 0.98,
        }
    }
}

impl Calibration {
    /// Nudge a raw confidence by the validation outcome.
    ///
    /// Text that only lacks common words (names, short labels) keeps its
    /// confidence unchanged.
    pub fn apply(&self, confidence: f32, validation: &ValidationReport) -> f32 {
        let adjusted = if validation.is_valid {
            (confidence * self.valid_multiplier).min(self.max_confidence)
        } else if validation.has_structural_issues() {
            confidence * self.invalid_multiplier
        } else {
            confidence
        };
        adjusted.clamp(0.0, 1.0)
    }
}

/// Outcome of ranking a set of candidates.
#[derive(Debug, Clone)]
pub struct Selection {
    /// Index of the chosen candidate in the input slice.
    pub chosen: usize,
    /// Final text (the chosen candidate's, or the voted synthesis).
    pub text: String,
    /// Calibrated confidence.
    pub confidence: f32,
    pub quality: QualityReport,
    pub validation: ValidationReport,
    pub voting_applied: bool,
}

/// Penalty in [0, 70] for text shaped like OCR garbage.
pub fn garbage_score(text: &str) -> u32 {
    let words: Vec<&str> = text.split_whitespace().collect();
    let mut garbage = 0;
    if text.matches('-').count() as f32 > words.len() as f32 * 0.5 {
        garbage += 30;
    }
    let avg = average_word_length(&words);
    if avg > 12.0 {
        garbage += 20;
    }
    if avg < 2.0 {
        garbage += 20;
    }
    garbage
}

/// Ranking score mixing engine confidence, quality, and garbage penalty.
pub fn combined_score(candidate: &NormalizedCandidate) -> f32 {
    let garbage = garbage_score(&candidate.text) as f32;
    let mut score = candidate.confidence * 0.35 + candidate.quality.score as f32 / 100.0 * 0.40
        - garbage / 100.0 * 0.25;

    let words = candidate.word_count();
    if (2..=50).contains(&words) {
        score *= 1.15;
    } else if words > 100 {
        score *= 0.8;
    }
    score
}

/// Pick the best candidate, fall back to a valid alternate, and vote.
///
/// Returns `None` for an empty slice.
pub fn select(candidates: &[NormalizedCandidate], calibration: &Calibration) -> Option<Selection> {
    let scores: Vec<f32> = candidates.iter().map(combined_score).collect();

    let mut best: Option<usize> = None;
    for (i, score) in scores.iter().enumerate() {
        if best.map_or(true, |b| *score > scores[b]) {
            best = Some(i);
        }
    }
    let best = best?;

    for (c, score) in candidates.iter().zip(&scores) {
        debug!(
            "{}: {:.3} (words={}, quality={}, garbage={})",
            c.engine_id,
            score,
            c.word_count(),
            c.quality.score,
            garbage_score(&c.text)
        );
    }

    let chosen = if candidates[best].validation.is_valid {
        best
    } else {
        candidates
            .iter()
            .enumerate()
            .find(|(i, c)| *i != best && c.validation.is_valid)
            .map(|(i, c)| {
                debug!(
                    "{} failed validation, using valid alternate {}",
                    candidates[best].engine_id, c.engine_id
                );
                i
            })
            .unwrap_or(best)
    };

    let winner = &candidates[chosen];
    let winner_words = winner.word_count();
    let mut text = winner.text.clone();
    let mut voting_applied = false;

    let voters: Vec<(&str, f32)> = candidates
        .iter()
        .filter(|c| c.word_count().abs_diff(winner_words) <= 1)
        .map(|c| (c.text.as_str(), c.confidence))
        .collect();
    if voters.len() >= 2 {
        let voted = normalize(&vote(&voters));
        let voted_words = voted.split_whitespace().count();
        if !voted.is_empty() && voted_words.abs_diff(winner_words) <= 1 && voted != text {
            debug!("Voting across {} candidates produced: {}", voters.len(), voted);
            text = voted;
            voting_applied = true;
        }
    }

    let quality = quality::score(&text);
    let validation = validate::validate(&text);
    let confidence = calibration.apply(winner.confidence, &validation);

    Some(Selection {
        chosen,
        text,
        confidence,
        quality,
        validation,
        voting_applied,
    })
}

/// Positional word vote across texts weighted by confidence.
///
/// At each word position the key (lowercased, punctuation trimmed) with the
/// highest summed confidence wins; ties go to the key seen first. The
/// surface form of the winning key's first occurrence is emitted.
pub fn vote(texts: &[(&str, f32)]) -> String {
    let split: Vec<(Vec<&str>, f32)> = texts
        .iter()
        .map(|(text, conf)| (text.split_whitespace().collect(), *conf))
        .collect();
    let positions = split.iter().map(|(w, _)| w.len()).max().unwrap_or(0);

    let mut out: Vec<&str> = Vec::with_capacity(positions);
    for pos in 0..positions {
        // (key, summed confidence, first surface form)
        let mut tally: Vec<(String, f32, &str)> = Vec::new();
        for (words, conf) in &split {
            let Some(word) = words.get(pos) else {
                continue;
            };
            let mut key = word_key(word);
            if key.is_empty() {
                key = (*word).to_string();
            }
            match tally.iter_mut().find(|(k, _, _)| *k == key) {
                Some(entry) => entry.1 += conf,
                None => tally.push((key, *conf, word)),
            }
        }

        let mut winner: Option<&(String, f32, &str)> = None;
        for entry in &tally {
            if winner.map_or(true, |w| entry.1 > w.1) {
                winner = Some(entry);
            }
        }
        if let Some((_, _, surface)) = winner {
            out.push(surface);
        }
    }
    out.join(" ")
}
