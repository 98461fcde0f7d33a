//! Text extraction service.
//!
//! The boundary callers use: decode the input, run the orchestrator, and
//! always hand back a renderable [`ExtractionResult`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::config::Settings;
use crate::imaging::SourceImage;
use crate::models::{ExtractionError, ExtractionResult};
use crate::ocr::{
    priority_order, CancellationFlag, EngineRegistry, EngineStatus, ExtractionOrchestrator,
};

/// Image handed to the service.
#[derive(Debug, Clone)]
pub enum ImageInput {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl From<PathBuf> for ImageInput {
    fn from(path: PathBuf) -> Self {
        ImageInput::Path(path)
    }
}

impl From<&Path> for ImageInput {
    fn from(path: &Path) -> Self {
        ImageInput::Path(path.to_path_buf())
    }
}

impl From<Vec<u8>> for ImageInput {
    fn from(bytes: Vec<u8>) -> Self {
        ImageInput::Bytes(bytes)
    }
}

/// Service for extracting text from images.
pub struct ExtractionService {
    orchestrator: ExtractionOrchestrator,
}

impl ExtractionService {
    /// Create a service with the standard engine set.
    pub fn new(settings: &Settings) -> Self {
        Self::with_registry(EngineRegistry::from_settings(&settings.ocr), settings)
    }

    /// Create a service over a caller-built registry.
    pub fn with_registry(registry: EngineRegistry, settings: &Settings) -> Self {
        Self {
            orchestrator: ExtractionOrchestrator::new(Arc::new(registry), settings),
        }
    }

    pub fn registry(&self) -> &EngineRegistry {
        self.orchestrator.registry()
    }

    /// Extract text, optionally forcing one engine (by name or role).
    pub async fn extract_text(&self, input: ImageInput, forced: Option<&str>) -> ExtractionResult {
        self.extract_text_with_cancel(input, forced, &CancellationFlag::new())
            .await
    }

    /// Like [`extract_text`](Self::extract_text), stopping between engines once `cancel` is set.
    pub async fn extract_text_with_cancel(
        &self,
        input: ImageInput,
        forced: Option<&str>,
        cancel: &CancellationFlag,
    ) -> ExtractionResult {
        let start = Instant::now();
        let source = match decode(input).await {
            Ok(source) => source,
            Err(error) => {
                warn!("{}", error);
                let mut result = ExtractionResult::failed(error);
                result.processing_time_ms = start.elapsed().as_millis() as u64;
                return result;
            }
        };

        let (width, height) = source.dimensions();
        info!(
            "Extracting text from {}x{} image ({} bytes)",
            width,
            height,
            source.byte_len()
        );
        let mut result = self.orchestrator.extract(&source, forced, cancel).await;
        result.processing_time_ms = start.elapsed().as_millis() as u64;
        result
    }

    /// Re-run extraction on a stored image with one specific engine.
    pub async fn reprocess(&self, path: &Path, engine: &str) -> ExtractionResult {
        info!("Reprocessing {} with {}", path.display(), engine);
        self.extract_text(ImageInput::Path(path.to_path_buf()), Some(engine))
            .await
    }

    /// Whether any engine is ready or could plausibly become ready.
    pub fn is_available(&self) -> bool {
        !self.available_methods().is_empty()
    }

    /// Ready engines first in priority order, then potentially available ones.
    pub fn available_methods(&self) -> Vec<String> {
        let registry = self.registry();
        let ready = registry.available();
        let maybe = registry.potentially_available();

        let mut methods: Vec<String> = priority_order(&registry.engines(), false)
            .into_iter()
            .filter(|name| ready.contains(name))
            .collect();
        for name in maybe {
            if !methods.contains(&name) {
                methods.push(name);
            }
        }
        methods
    }

    pub fn engine_report(&self) -> Vec<EngineStatus> {
        self.registry().engine_report()
    }
}

async fn decode(input: ImageInput) -> Result<SourceImage, ExtractionError> {
    let decoded = tokio::task::spawn_blocking(move || match input {
        ImageInput::Path(path) => {
            SourceImage::open(&path).map_err(|e| format!("{}: {}", path.display(), e))
        }
        ImageInput::Bytes(bytes) => SourceImage::from_bytes(&bytes).map_err(|e| e.to_string()),
    })
    .await;

    match decoded {
        Ok(Ok(source)) => Ok(source),
        Ok(Err(message)) => Err(ExtractionError::Decode { message }),
        Err(e) => Err(ExtractionError::Decode {
            message: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_undecodable_bytes() {
        let service = ExtractionService::with_registry(EngineRegistry::new(), &Settings::default());
        let result = service
            .extract_text(ImageInput::Bytes(b"not an image".to_vec()), None)
            .await;
        assert!(matches!(result.error, Some(ExtractionError::Decode { .. })));
        assert_eq!(result.method, "none");
        assert!(!result.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn test_missing_file() {
        let service = ExtractionService::with_registry(EngineRegistry::new(), &Settings::default());
        let result = service
            .reprocess(Path::new("/nonexistent/scan.png"), "tesseract")
            .await;
        match result.error {
            Some(ExtractionError::Decode { message }) => assert!(message.contains("scan.png")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_empty_registry_is_unavailable() {
        let service = ExtractionService::with_registry(EngineRegistry::new(), &Settings::default());
        assert!(!service.is_available());
        assert!(service.available_methods().is_empty());
        assert!(service.engine_report().is_empty());
    }
}
