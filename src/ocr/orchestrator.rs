//! Runs engines over an image and reconciles their output.
//!
//! One call: detect content type, run engines in priority order on their
//! profile variants, annotate and select among the candidates, then retry
//! untried engines if the result is weak. Every exit path produces an
//! [`ExtractionResult`]; engine failures only show up as diagnostics.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tempfile::TempDir;
use tracing::{debug, info, warn};

use super::backend::{EngineInput, EngineKind, OcrBackend, OcrError, Recognition};
use super::registry::{EngineRegistry, EngineState};
use crate::config::{OcrSettings, Settings};
use crate::imaging::{
    ContentType, ContentTypeDetector, ImagePreprocessor, ImageVariant, Profile, ScopedImageFile,
    SourceImage,
};
use crate::models::{Candidate, ExtractionError, ExtractionResult, NormalizedCandidate};
use crate::text::{self, detect_text_type};

/// Diagnostic added when nothing usable came back.
pub const NO_USABLE_TEXT: &str = "no engine produced usable text";

/// Capture advice attached to failed and low-confidence results.
pub const SUGGESTIONS: &[&str] = &[
    "For handwritten text: write clearly with dark ink on white paper",
    "For printed text: ensure good lighting and a clear image",
    "Take the photo from directly above the document",
    "Avoid shadows and keep the lighting even",
    "Make sure the text is in focus and not blurry",
    "Try writing in print letters rather than cursive",
];

/// Cooperative cancellation, checked between engine attempts.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Engine names ordered for a first pass.
///
/// Handwriting puts the handwriting engine first, then layout, then general;
/// otherwise layout, then general, then the rest. Fallback engines always go
/// last. Registration order breaks ties.
pub fn priority_order(engines: &[(String, EngineKind)], handwritten: bool) -> Vec<String> {
    let rank = |kind: EngineKind| match (handwritten, kind) {
        (true, EngineKind::Handwriting) => 0,
        (_, EngineKind::Layout) => 1,
        (_, EngineKind::General) => 2,
        (false, EngineKind::Handwriting) => 3,
        (_, EngineKind::Fallback) => 4,
    };
    let mut ordered: Vec<&(String, EngineKind)> = engines.iter().collect();
    ordered.sort_by_key(|(_, kind)| rank(*kind));
    ordered.into_iter().map(|(name, _)| name.clone()).collect()
}

/// State owned by one extraction call.
struct CallState {
    temp_root: Option<PathBuf>,
    workdir: Option<TempDir>,
    variants: HashMap<Profile, ImageVariant>,
    tried: HashSet<String>,
    diagnostics: Vec<String>,
    last_error: Option<ExtractionError>,
    cancelled: bool,
}

impl CallState {
    fn new(temp_root: Option<PathBuf>) -> Self {
        Self {
            temp_root,
            workdir: None,
            variants: HashMap::new(),
            tried: HashSet::new(),
            diagnostics: Vec::new(),
            last_error: None,
            cancelled: false,
        }
    }

    /// Per-call scratch directory, created on first use and removed with the call.
    fn workdir(&mut self) -> Result<PathBuf, OcrError> {
        if let Some(dir) = &self.workdir {
            return Ok(dir.path().to_path_buf());
        }
        let mut builder = tempfile::Builder::new();
        builder.prefix("scanscribe-");
        let dir = match &self.temp_root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        let path = dir.path().to_path_buf();
        self.workdir = Some(dir);
        Ok(path)
    }

    fn fail(&mut self, error: ExtractionError) {
        self.diagnostics.push(error.to_string());
        self.last_error = Some(error);
    }
}

/// Runs the engine ensemble for single extraction calls.
pub struct ExtractionOrchestrator {
    registry: Arc<EngineRegistry>,
    preprocessor: ImagePreprocessor,
    detector: ContentTypeDetector,
    settings: OcrSettings,
}

impl ExtractionOrchestrator {
    pub fn new(registry: Arc<EngineRegistry>, settings: &Settings) -> Self {
        Self {
            registry,
            preprocessor: ImagePreprocessor::new(settings.preprocess.clone()),
            detector: ContentTypeDetector::new(settings.detection.clone()),
            settings: settings.ocr.clone(),
        }
    }

    pub fn registry(&self) -> &Arc<EngineRegistry> {
        &self.registry
    }

    /// Extract text from `source`.
    ///
    /// `forced` (an engine or role name) restricts the call to that engine and
    /// disables the low-confidence retry.
    pub async fn extract(
        &self,
        source: &SourceImage,
        forced: Option<&str>,
        cancel: &CancellationFlag,
    ) -> ExtractionResult {
        let start = Instant::now();
        let mut result = self.run(source, forced, cancel).await;
        result.processing_time_ms = start.elapsed().as_millis() as u64;
        info!(
            "Extraction finished: method={}, confidence={:.2}, {} chars in {}ms",
            result.method,
            result.confidence,
            result.text.len(),
            result.processing_time_ms
        );
        result
    }

    async fn run(
        &self,
        source: &SourceImage,
        forced: Option<&str>,
        cancel: &CancellationFlag,
    ) -> ExtractionResult {
        let content = self.detect(source).await;
        let mut call = CallState::new(self.settings.temp_dir.clone());

        let order = match forced {
            Some(name) => match self.registry.resolve(name) {
                Some(engine) => vec![engine],
                None => {
                    let mut result = ExtractionResult::failed(ExtractionError::UnknownEngine {
                        name: name.to_string(),
                    });
                    result.content_type = Some(content);
                    return result;
                }
            },
            None => priority_order(&self.registry.engines(), content.is_handwritten),
        };
        debug!("Engine order: {:?}", order);

        let mut candidates: Vec<NormalizedCandidate> = Vec::new();
        for name in &order {
            if cancel.is_cancelled() {
                call.cancelled = true;
                break;
            }
            if let Some(threshold) = self.settings.early_stop_confidence {
                if candidates.iter().any(|c| c.confidence >= threshold) {
                    debug!("Early stop: a candidate reached {:.2}", threshold);
                    break;
                }
            }
            if let Some(candidate) = self.attempt(&mut call, source, name).await {
                candidates.push(text::annotate(&candidate));
            }
        }

        if candidates.is_empty() {
            return self.no_candidates(call, content, forced.is_some());
        }

        let mut result = self.assemble(candidates, content);
        if forced.is_none() && !call.cancelled && self.is_weak(&result) {
            result = self.retry(&mut call, source, result, cancel).await;
        }
        self.finish(result, call)
    }

    async fn detect(&self, source: &SourceImage) -> ContentType {
        let detector = self.detector.clone();
        let source = source.clone();
        match tokio::task::spawn_blocking(move || detector.detect(&source)).await {
            Ok(content) => content,
            Err(e) => {
                warn!("Content detection task failed: {}", e);
                ContentType::unknown()
            }
        }
    }

    fn is_weak(&self, result: &ExtractionResult) -> bool {
        result.confidence < self.settings.low_confidence_threshold || result.text.is_empty()
    }

    /// Run untried, non-failed engines alone; keep a result only if it is more confident.
    async fn retry(
        &self,
        call: &mut CallState,
        source: &SourceImage,
        mut result: ExtractionResult,
        cancel: &CancellationFlag,
    ) -> ExtractionResult {
        let untried: Vec<String> = self
            .registry
            .engines()
            .into_iter()
            .map(|(name, _)| name)
            .filter(|name| !call.tried.contains(name))
            .filter(|name| !matches!(self.registry.state(name), Some(EngineState::Failed(_))))
            .collect();

        for name in untried {
            if cancel.is_cancelled() {
                call.cancelled = true;
                break;
            }
            info!(
                "Low confidence ({:.2}), retrying with {}",
                result.confidence, name
            );
            let Some(candidate) = self.attempt(call, source, &name).await else {
                continue;
            };

            let annotated = text::annotate(&candidate);
            let mut all = std::mem::take(&mut result.all_candidates);
            all.push(annotated.clone());

            let content = result.content_type.unwrap_or_else(ContentType::unknown);
            let retried = self.assemble(vec![annotated], content);
            if retried.confidence > result.confidence {
                info!(
                    "Retry with {} improved confidence {:.2} -> {:.2}",
                    name, result.confidence, retried.confidence
                );
                result = retried;
            }
            result.all_candidates = all;
        }
        result
    }

    /// One engine: initialize, run every profile pass, merge the passes.
    ///
    /// Failures are recorded on `call` and yield `None`.
    async fn attempt(
        &self,
        call: &mut CallState,
        source: &SourceImage,
        name: &str,
    ) -> Option<Candidate> {
        call.tried.insert(name.to_string());

        let ready = match self.registry.get(name) {
            Some(backend) => Ok(backend),
            None => self.registry.ensure_ready(name).await,
        };
        let backend = match ready {
            Ok(backend) => backend,
            Err(e) => {
                debug!("Skipping {}: {}", name, e);
                call.fail(ExtractionError::EngineInit {
                    engine: name.to_string(),
                    message: e.to_string(),
                });
                return None;
            }
        };

        let start = Instant::now();
        let mut passes = Vec::new();
        let mut last_error = None;
        for profile in backend.profiles() {
            match self.run_pass(call, source, &backend, profile).await {
                Ok(recognition) => {
                    debug!(
                        "{} ({} profile): {} chars, confidence {:.2}",
                        name,
                        profile,
                        recognition.text.len(),
                        recognition.confidence
                    );
                    passes.push(recognition);
                }
                Err(e) => {
                    warn!("{} ({} profile) failed: {}", name, profile, e);
                    last_error = Some(e);
                }
            }
        }
        let elapsed = start.elapsed().as_millis();

        let Some(merged) = merge_passes(passes) else {
            let message = last_error.map_or_else(|| "no passes ran".to_string(), |e| e.to_string());
            info!("{} failed after {}ms", name, elapsed);
            call.fail(ExtractionError::EngineExtract {
                engine: name.to_string(),
                message,
            });
            return None;
        };

        let candidate = Candidate::new(name, merged.text, merged.confidence);
        if !candidate.is_usable() {
            info!("{} returned no usable text after {}ms", name, elapsed);
            call.fail(ExtractionError::EngineExtract {
                engine: name.to_string(),
                message: "text too short".to_string(),
            });
            return None;
        }

        info!(
            "{} produced {} words (confidence {:.2}) in {}ms",
            name,
            candidate.word_count(),
            candidate.confidence,
            elapsed
        );
        Some(candidate)
    }

    /// One engine pass on one profile variant. The scoped file is removed
    /// before this returns, whatever the outcome.
    async fn run_pass(
        &self,
        call: &mut CallState,
        source: &SourceImage,
        backend: &Arc<dyn OcrBackend>,
        profile: Profile,
    ) -> Result<Recognition, OcrError> {
        let variant = self.variant(call, source, profile).await?;
        let dir = call.workdir()?;
        let file = write_variant(variant.clone(), dir).await?;

        let timeout = self.settings.engine_timeout();
        let input = EngineInput {
            path: file.path().to_path_buf(),
            image: Arc::clone(&variant.image),
            profile,
            timeout: Some(timeout),
        };
        let engine = Arc::clone(backend);
        let outcome =
            tokio::time::timeout(timeout, tokio::task::spawn_blocking(move || engine.extract(&input)))
                .await;
        drop(file);

        match outcome {
            Ok(Ok(recognition)) => recognition,
            Ok(Err(e)) => Err(OcrError::OcrFailed(format!("engine task failed: {}", e))),
            // an in-process engine keeps its blocking worker until it returns;
            // subprocess engines kill their child on the same budget
            Err(_) => Err(OcrError::Timeout(timeout.as_secs())),
        }
    }

    /// The variant for `profile`, built at most once per call.
    async fn variant(
        &self,
        call: &mut CallState,
        source: &SourceImage,
        profile: Profile,
    ) -> Result<ImageVariant, OcrError> {
        if let Some(variant) = call.variants.get(&profile) {
            return Ok(variant.clone());
        }

        let preprocessor = self.preprocessor.clone();
        let owned = source.clone();
        let variant = tokio::task::spawn_blocking(move || preprocessor.preprocess(&owned, profile))
            .await
            .map_err(|e| OcrError::ImageError(format!("preprocessing task failed: {}", e)))?;
        if variant.degraded {
            call.diagnostics
                .push(format!("{} preprocessing failed, used the original image", profile));
        }
        call.variants.insert(profile, variant.clone());
        Ok(variant)
    }

    fn assemble(&self, candidates: Vec<NormalizedCandidate>, content: ContentType) -> ExtractionResult {
        let Some(selection) = text::select(&candidates, &self.settings.calibration) else {
            return ExtractionResult::failed(ExtractionError::NoCandidates);
        };

        ExtractionResult {
            method: candidates[selection.chosen].engine_id.clone(),
            text_type: detect_text_type(&selection.text),
            confidence: selection.confidence,
            quality: selection.quality.quality,
            quality_details: Some(selection.quality),
            validation: Some(selection.validation),
            voting_applied: selection.voting_applied,
            text: selection.text,
            all_candidates: candidates,
            error: None,
            diagnostics: Vec::new(),
            suggestions: Vec::new(),
            content_type: Some(content),
            processing_time_ms: 0,
        }
    }

    fn no_candidates(&self, call: CallState, content: ContentType, forced: bool) -> ExtractionResult {
        let error = if call.cancelled {
            ExtractionError::Cancelled
        } else if forced {
            call.last_error.clone().unwrap_or(ExtractionError::NoCandidates)
        } else {
            ExtractionError::NoCandidates
        };
        warn!("{}", error);

        let mut result = ExtractionResult::failed(error);
        result.content_type = Some(content);
        self.finish(result, call)
    }

    /// Attach call diagnostics and, for weak results, capture suggestions.
    fn finish(&self, mut result: ExtractionResult, call: CallState) -> ExtractionResult {
        let mut diagnostics = call.diagnostics;
        if call.cancelled {
            diagnostics.push("cancelled".to_string());
        }
        if result.all_candidates.is_empty() {
            diagnostics.push(NO_USABLE_TEXT.to_string());
        }
        for line in std::mem::take(&mut result.diagnostics) {
            if !diagnostics.contains(&line) {
                diagnostics.push(line);
            }
        }
        result.diagnostics = diagnostics;

        if self.is_weak(&result) {
            result.suggestions = SUGGESTIONS.iter().map(|s| s.to_string()).collect();
        }
        result
    }
}

/// Merge the passes of a multi-pass engine.
///
/// The most confident pass wins; a positional vote over passes of similar
/// length replaces its text unless it comes out more than a word shorter.
fn merge_passes(passes: Vec<Recognition>) -> Option<Recognition> {
    let mut best: Option<usize> = None;
    for (i, pass) in passes.iter().enumerate() {
        if best.map_or(true, |b| pass.confidence > passes[b].confidence) {
            best = Some(i);
        }
    }
    let best = best?;
    if passes.len() < 2 {
        return passes.into_iter().next();
    }

    let best_words = passes[best].text.split_whitespace().count();
    let voters: Vec<(&str, f32)> = passes
        .iter()
        .filter(|p| p.text.split_whitespace().count().abs_diff(best_words) <= 1)
        .map(|p| (p.text.as_str(), p.confidence))
        .collect();
    if voters.len() < 2 {
        return passes.into_iter().nth(best);
    }

    let voted = text::vote(&voters);
    let voted_words = voted.split_whitespace().count();
    let confidence = passes[best].confidence;
    if !voted.is_empty() && voted_words + 1 >= best_words {
        Some(Recognition::new(voted, confidence))
    } else {
        passes.into_iter().nth(best)
    }
}

async fn write_variant(variant: ImageVariant, dir: PathBuf) -> Result<ScopedImageFile, OcrError> {
    tokio::task::spawn_blocking(move || variant.write_scoped(Path::new(&dir)))
        .await
        .map_err(|e| OcrError::ImageError(format!("write task failed: {}", e)))?
        .map_err(|e| OcrError::ImageError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engines(list: &[(&str, EngineKind)]) -> Vec<(String, EngineKind)> {
        list.iter().map(|(n, k)| (n.to_string(), *k)).collect()
    }

    #[test]
    fn test_priority_for_handwriting() {
        let registered = engines(&[
            ("tesseract", EngineKind::Fallback),
            ("ocrs", EngineKind::General),
            ("paddleocr", EngineKind::Layout),
            ("deepseek", EngineKind::Handwriting),
        ]);
        assert_eq!(
            priority_order(&registered, true),
            vec!["deepseek", "paddleocr", "ocrs", "tesseract"]
        );
    }

    #[test]
    fn test_priority_for_print() {
        let registered = engines(&[
            ("deepseek", EngineKind::Handwriting),
            ("tesseract", EngineKind::Fallback),
            ("ocrs", EngineKind::General),
            ("paddleocr", EngineKind::Layout),
        ]);
        assert_eq!(
            priority_order(&registered, false),
            vec!["paddleocr", "ocrs", "deepseek", "tesseract"]
        );
    }

    #[test]
    fn test_priority_keeps_registration_order_within_role() {
        let registered = engines(&[
            ("b", EngineKind::General),
            ("a", EngineKind::General),
            ("only-fallback", EngineKind::Fallback),
        ]);
        assert_eq!(priority_order(&registered, false), vec!["b", "a", "only-fallback"]);

        let single = engines(&[("tess", EngineKind::Fallback)]);
        assert_eq!(priority_order(&single, true), vec!["tess"]);
    }

    #[test]
    fn test_merge_single_pass() {
        let merged = merge_passes(vec![Recognition::new("one pass", 0.4)]).unwrap();
        assert_eq!(merged, Recognition::new("one pass", 0.4));
        assert!(merge_passes(Vec::new()).is_none());
    }

    #[test]
    fn test_merge_votes_across_passes() {
        let merged = merge_passes(vec![
            Recognition::new("the qu1ck fox", 0.5),
            Recognition::new("the quick fox", 0.4),
            Recognition::new("tha quick fox", 0.3),
        ])
        .unwrap();
        assert_eq!(merged.text, "the quick fox");
        assert_eq!(merged.confidence, 0.5);
    }

    #[test]
    fn test_merge_ignores_passes_of_different_length() {
        let merged = merge_passes(vec![
            Recognition::new("short", 0.3),
            Recognition::new("a much longer reading of the page", 0.6),
        ])
        .unwrap();
        assert_eq!(merged.text, "a much longer reading of the page");
    }

    #[test]
    fn test_cancellation_flag_is_shared() {
        let flag = CancellationFlag::new();
        let clone = flag.clone();
        assert!(!flag.is_cancelled());
        clone.cancel();
        assert!(flag.is_cancelled());
    }
}
