//! Text cleanup, scoring, validation, and selection.
//!
//! Everything here is a pure function of its input text, so candidates from
//! different engines can be compared on equal footing.

mod corrections;
mod normalize;
mod quality;
mod select;
mod text_type;
mod validate;

pub use corrections::{Confusion, CONFUSIONS, WORD_FIXES};
pub use normalize::normalize;
pub use quality::score;
pub use select::{combined_score, garbage_score, select, vote, Calibration, Selection};
pub use text_type::{detect_text_type, TextType};
pub use validate::validate;

use crate::models::{Candidate, NormalizedCandidate};

/// Normalize a raw candidate and attach its quality and validation reports.
pub fn annotate(candidate: &Candidate) -> NormalizedCandidate {
    let text = normalize(&candidate.raw_text);
    NormalizedCandidate {
        engine_id: candidate.engine_id.clone(),
        raw_text: candidate.raw_text.clone(),
        quality: score(&text),
        validation: validate(&text),
        confidence: candidate.confidence,
        text,
    }
}
