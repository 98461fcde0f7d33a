//! Guess whether recognized text came from handwriting or print.

use serde::{Deserialize, Serialize};

/// Kind of writing the recognized text most likely came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextType {
    Handwritten,
    Printed,
    Mixed,
    Unknown,
}

impl TextType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Handwritten => "handwritten",
            Self::Printed => "printed",
            Self::Mixed => "mixed",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for TextType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classify by capitalization: handwriting recognizers produce erratic case.
pub fn detect_text_type(text: &str) -> TextType {
    let upper = text.chars().filter(|c| c.is_uppercase()).count();
    let lower = text.chars().filter(|c| c.is_lowercase()).count();
    let letters = upper + lower;
    if letters == 0 {
        return TextType::Unknown;
    }

    let ratio = upper as f32 / letters as f32;
    if ratio > 0.3 && ratio < 0.7 {
        TextType::Handwritten
    } else if ratio < 0.15 {
        TextType::Printed
    } else {
        TextType::Mixed
    }
}
