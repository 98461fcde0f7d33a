//! Recognition engine abstraction.
//!
//! Every engine is a capability: given an image on disk (and the decoded
//! pixels, for engines that work in memory), return text and a confidence,
//! or fail. Engines never see each other; ordering and reconciliation live in
//! the orchestrator.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::imaging::Profile;

/// Errors from OCR backends.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Backend not available: {0}")]
    BackendNotAvailable(String),

    #[error("Initialization failed: {0}")]
    InitFailed(String),

    #[error("OCR failed: {0}")]
    OcrFailed(String),

    #[error("Timed out after {0}s")]
    Timeout(u64),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    ImageError(String),
}

/// Role an engine plays in priority ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Vision-language recognizer that copes with handwriting.
    Handwriting,
    /// General-purpose line recognizer.
    General,
    /// Detector/recognizer pair that handles complex page layouts.
    Layout,
    /// Always tried last.
    Fallback,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Handwriting => "handwriting",
            EngineKind::General => "general",
            EngineKind::Layout => "layout",
            EngineKind::Fallback => "fallback",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "handwriting" | "handwritten" => Some(EngineKind::Handwriting),
            "general" => Some(EngineKind::General),
            "layout" => Some(EngineKind::Layout),
            "fallback" => Some(EngineKind::Fallback),
            _ => None,
        }
    }

    /// Profile an engine of this kind runs on unless configured otherwise.
    pub fn default_profile(&self) -> Profile {
        match self {
            EngineKind::Handwriting => Profile::Original,
            EngineKind::General => Profile::Printed,
            EngineKind::Layout => Profile::Original,
            EngineKind::Fallback => Profile::Handwriting,
        }
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Text and confidence from one engine pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    pub text: String,
    /// Engine-reported confidence (0.0 - 1.0).
    pub confidence: f32,
}

impl Recognition {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }
}

/// What an engine receives for one pass.
#[derive(Debug, Clone)]
pub struct EngineInput {
    /// PNG copy of the variant, valid for the duration of the pass.
    pub path: PathBuf,
    /// The same variant, decoded.
    pub image: Arc<DynamicImage>,
    pub profile: Profile,
    /// Time budget for the pass. Engines that shell out kill their child
    /// process when it runs out.
    pub timeout: Option<Duration>,
}

/// Trait for OCR backends.
///
/// `initialize` and `extract` may block; callers run them on blocking workers.
pub trait OcrBackend: Send + Sync {
    /// Stable identifier, reported as the extraction method.
    fn name(&self) -> &str;

    fn kind(&self) -> EngineKind;

    /// Profiles to run, in order. More than one means a multi-pass engine.
    fn profiles(&self) -> Vec<Profile> {
        vec![self.kind().default_profile()]
    }

    /// Cheap static check that the engine could work (binary on PATH, feature built in).
    fn is_installed(&self) -> bool;

    /// Get a description of what's needed to make this backend available.
    fn availability_hint(&self) -> String;

    /// Load models or probe binaries. Called at most once per registry.
    fn initialize(&self) -> Result<(), OcrError>;

    /// Recognize text in one image.
    fn extract(&self, input: &EngineInput) -> Result<Recognition, OcrError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        for kind in [
            EngineKind::Handwriting,
            EngineKind::General,
            EngineKind::Layout,
            EngineKind::Fallback,
        ] {
            assert_eq!(EngineKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(EngineKind::from_str("Handwritten"), Some(EngineKind::Handwriting));
        assert_eq!(EngineKind::from_str("ocrs"), None);
    }

    #[test]
    fn test_default_profiles() {
        assert_eq!(EngineKind::General.default_profile(), Profile::Printed);
        assert_eq!(EngineKind::Fallback.default_profile(), Profile::Handwriting);
    }
}
