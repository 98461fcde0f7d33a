//! End-to-end extraction through the service with scripted engines.

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::{DynamicImage, GrayImage, ImageFormat, Luma};

use scanscribe::imaging::Profile;
use scanscribe::models::QualityLevel;
use scanscribe::ocr::{
    CancellationFlag, EngineInput, EngineKind, EngineRegistry, OcrBackend, OcrError, Recognition,
    NO_USABLE_TEXT,
};
use scanscribe::{ExtractionError, ExtractionService, ImageInput, Settings};

enum Reply {
    Text(&'static str, f32),
    PerProfile(Vec<(Profile, &'static str, f32)>),
    Fail(&'static str),
}

struct MockEngine {
    name: &'static str,
    kind: EngineKind,
    profiles: Vec<Profile>,
    reply: Reply,
    init_error: Option<&'static str>,
    delay: Duration,
    inits: AtomicUsize,
    calls: AtomicUsize,
    order: Option<Arc<Mutex<Vec<String>>>>,
    /// Input path and whether it existed when the engine ran.
    seen: Mutex<Vec<(PathBuf, bool)>>,
}

impl MockEngine {
    fn new(name: &'static str, kind: EngineKind, reply: Reply) -> Self {
        Self {
            name,
            kind,
            profiles: Vec::new(),
            reply,
            init_error: None,
            delay: Duration::ZERO,
            inits: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            order: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    fn text(name: &'static str, kind: EngineKind, text: &'static str, conf: f32) -> Self {
        Self::new(name, kind, Reply::Text(text, conf))
    }

    fn failing_init(mut self, reason: &'static str) -> Self {
        self.init_error = Some(reason);
        self
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn with_profiles(mut self, profiles: Vec<Profile>) -> Self {
        self.profiles = profiles;
        self
    }

    fn logging_to(mut self, order: &Arc<Mutex<Vec<String>>>) -> Self {
        self.order = Some(Arc::clone(order));
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn inits(&self) -> usize {
        self.inits.load(Ordering::SeqCst)
    }
}

impl OcrBackend for MockEngine {
    fn name(&self) -> &str {
        self.name
    }

    fn kind(&self) -> EngineKind {
        self.kind
    }

    fn profiles(&self) -> Vec<Profile> {
        if self.profiles.is_empty() {
            vec![self.kind.default_profile()]
        } else {
            self.profiles.clone()
        }
    }

    fn is_installed(&self) -> bool {
        true
    }

    fn availability_hint(&self) -> String {
        format!("{} mock", self.name)
    }

    fn initialize(&self) -> Result<(), OcrError> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        match self.init_error {
            Some(reason) => Err(OcrError::ModelNotFound(reason.to_string())),
            None => Ok(()),
        }
    }

    fn extract(&self, input: &EngineInput) -> Result<Recognition, OcrError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap()
            .push((input.path.clone(), input.path.exists()));
        if let Some(order) = &self.order {
            order.lock().unwrap().push(self.name.to_string());
        }
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        match &self.reply {
            Reply::Text(text, conf) => Ok(Recognition::new(*text, *conf)),
            Reply::PerProfile(by_profile) => by_profile
                .iter()
                .find(|(p, _, _)| *p == input.profile)
                .map(|(_, text, conf)| Recognition::new(*text, *conf))
                .ok_or_else(|| OcrError::OcrFailed("unexpected profile".to_string())),
            Reply::Fail(reason) => Err(OcrError::OcrFailed(reason.to_string())),
        }
    }
}

fn service_with(engines: &[Arc<MockEngine>], settings: &Settings) -> ExtractionService {
    let mut registry = EngineRegistry::new();
    for engine in engines {
        registry.register(engine.clone());
    }
    ExtractionService::with_registry(registry, settings)
}

fn png_bytes(image: &DynamicImage) -> Vec<u8> {
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, ImageFormat::Png).unwrap();
    bytes.into_inner()
}

/// Even, light page: reads as print.
fn blank_page() -> ImageInput {
    let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(160, 120, Luma([235])));
    ImageInput::Bytes(png_bytes(&img))
}

/// Dense dark strokes: reads as handwriting.
fn busy_page() -> ImageInput {
    let img = DynamicImage::ImageLuma8(GrayImage::from_fn(160, 160, |x, y| {
        let in_line = (y / 6) % 3 == 1;
        let in_word = (x / 9) % 4 != 3;
        Luma([if in_line && in_word { 30 } else { 225 }])
    }));
    ImageInput::Bytes(png_bytes(&img))
}

#[tokio::test]
async fn test_single_confident_engine() {
    let engine = Arc::new(MockEngine::text(
        "alpha",
        EngineKind::General,
        "Hello World",
        0.92,
    ));
    let service = service_with(&[engine.clone()], &Settings::default());

    let result = service.extract_text(blank_page(), None).await;

    assert!(result.is_success());
    assert_eq!(result.text, "Hello World.");
    assert_eq!(result.method, "alpha");
    assert!(result.confidence > 0.9);
    assert_eq!(result.quality, QualityLevel::Good);
    assert_eq!(result.all_candidates.len(), 1);
    assert!(result.suggestions.is_empty());
    assert!(result.content_type.is_some());
}

#[tokio::test]
async fn test_better_spelling_wins_without_voting() {
    let sloppy = Arc::new(MockEngine::text("sloppy", EngineKind::Layout, "teh qick fox", 0.4));
    let careful = Arc::new(MockEngine::text(
        "careful",
        EngineKind::General,
        "the quick fox",
        0.6,
    ));
    let service = service_with(&[sloppy.clone(), careful.clone()], &Settings::default());

    let result = service.extract_text(blank_page(), None).await;

    assert_eq!(result.method, "careful");
    assert_eq!(result.text, "The quick fox.");
    assert!(!result.voting_applied);
    assert_eq!(result.all_candidates.len(), 2);
    assert!(result.all_candidates[0].text.starts_with("The "));
}

#[tokio::test]
async fn test_all_engines_failing() {
    let broken = Arc::new(
        MockEngine::text("broken", EngineKind::Layout, "unused", 0.9).failing_init("weights.bin"),
    );
    let crashing = Arc::new(MockEngine::new(
        "crashing",
        EngineKind::General,
        Reply::Fail("segfault"),
    ));
    let terse = Arc::new(MockEngine::text("terse", EngineKind::Fallback, " ok ", 0.9));
    let service = service_with(
        &[broken.clone(), crashing.clone(), terse.clone()],
        &Settings::default(),
    );

    let result = service.extract_text(blank_page(), None).await;

    assert_eq!(result.method, "none");
    assert_eq!(result.confidence, 0.0);
    assert!(result.text.is_empty());
    assert_eq!(result.error, Some(ExtractionError::NoCandidates));
    assert!(result.diagnostics.iter().any(|d| d == NO_USABLE_TEXT));
    assert!(result.diagnostics.iter().any(|d| d.contains("weights.bin")));
    assert!(result.diagnostics.iter().any(|d| d.contains("segfault")));
    assert!(!result.suggestions.is_empty());
    assert_eq!(crashing.calls(), 1);
    assert_eq!(terse.calls(), 1);
}

#[tokio::test]
async fn test_failed_engine_is_not_retried_across_calls() {
    let broken = Arc::new(
        MockEngine::text("broken", EngineKind::Layout, "unused", 0.9).failing_init("no gpu"),
    );
    let good = Arc::new(MockEngine::text(
        "good",
        EngineKind::General,
        "the cat sat on the mat",
        0.8,
    ));
    let service = service_with(&[broken.clone(), good.clone()], &Settings::default());
    assert_eq!(service.available_methods(), vec!["broken", "good"]);

    for _ in 0..2 {
        let result = service.extract_text(blank_page(), None).await;
        assert_eq!(result.method, "good");
    }

    assert_eq!(broken.inits(), 1);
    assert_eq!(broken.calls(), 0);
    assert_eq!(good.inits(), 1);
    assert_eq!(service.available_methods(), vec!["good"]);
    assert!(service.is_available());
}

#[tokio::test]
async fn test_forced_engine_runs_alone() {
    let layout = Arc::new(MockEngine::text(
        "layout",
        EngineKind::Layout,
        "the first reading",
        0.9,
    ));
    let general = Arc::new(MockEngine::text(
        "general",
        EngineKind::General,
        "the second reading",
        0.5,
    ));
    let service = service_with(&[layout.clone(), general.clone()], &Settings::default());

    let by_name = service.extract_text(blank_page(), Some("general")).await;
    assert_eq!(by_name.method, "general");
    assert_eq!(by_name.all_candidates.len(), 1);
    assert_eq!(layout.calls(), 0);

    let by_role = service.extract_text(blank_page(), Some("layout")).await;
    assert_eq!(by_role.method, "layout");
    assert_eq!(general.calls(), 1);
}

#[tokio::test]
async fn test_forced_unknown_engine() {
    let engine = Arc::new(MockEngine::text("alpha", EngineKind::General, "words here", 0.9));
    let service = service_with(&[engine.clone()], &Settings::default());

    let result = service.extract_text(blank_page(), Some("magic")).await;

    assert_eq!(
        result.error,
        Some(ExtractionError::UnknownEngine {
            name: "magic".to_string()
        })
    );
    assert_eq!(result.method, "none");
    assert_eq!(engine.calls(), 0);
}

#[tokio::test]
async fn test_forced_engine_failure_is_reported() {
    let engine = Arc::new(MockEngine::new(
        "flaky",
        EngineKind::General,
        Reply::Fail("model exploded"),
    ));
    let service = service_with(&[engine.clone()], &Settings::default());

    let result = service.extract_text(blank_page(), Some("flaky")).await;
    match result.error {
        Some(ExtractionError::EngineExtract { engine, message }) => {
            assert_eq!(engine, "flaky");
            assert!(message.contains("model exploded"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_low_confidence_retry_replaces_only_when_better() {
    let mut settings = Settings::default();
    settings.ocr.early_stop_confidence = Some(0.1);

    let weak = Arc::new(MockEngine::text("weak", EngineKind::Layout, "zzzz qqqq xxxx", 0.15));
    let strong = Arc::new(MockEngine::text(
        "strong",
        EngineKind::General,
        "the cat sat on the mat",
        0.6,
    ));
    let service = service_with(&[weak.clone(), strong.clone()], &settings);

    let result = service.extract_text(blank_page(), None).await;

    assert_eq!(result.method, "strong");
    assert!(result.confidence > 0.6);
    assert_eq!(result.all_candidates.len(), 2);
    assert_eq!(weak.calls(), 1);
    assert_eq!(strong.calls(), 1);
}

#[tokio::test]
async fn test_low_confidence_retry_never_lowers_confidence() {
    let mut settings = Settings::default();
    settings.ocr.early_stop_confidence = Some(0.1);

    let weak = Arc::new(MockEngine::text("weak", EngineKind::Layout, "zzzz qqqq xxxx", 0.15));
    let weaker = Arc::new(MockEngine::text(
        "weaker",
        EngineKind::General,
        "the cat sat on the mat",
        0.1,
    ));
    let service = service_with(&[weak.clone(), weaker.clone()], &settings);

    let result = service.extract_text(blank_page(), None).await;

    assert_eq!(result.method, "weak");
    assert!((result.confidence - 0.15).abs() < 1e-6);
    // the set of candidates only widens
    assert_eq!(result.all_candidates.len(), 2);
    assert_eq!(weaker.calls(), 1);
    assert!(!result.suggestions.is_empty());
}

#[tokio::test]
async fn test_handwriting_engine_runs_first_on_handwriting() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let engines = [
        Arc::new(MockEngine::text("tess", EngineKind::Fallback, "some text here", 0.5).logging_to(&order)),
        Arc::new(MockEngine::text("gen", EngineKind::General, "some text here", 0.5).logging_to(&order)),
        Arc::new(MockEngine::text("lay", EngineKind::Layout, "some text here", 0.5).logging_to(&order)),
        Arc::new(MockEngine::text("vlm", EngineKind::Handwriting, "some text here", 0.5).logging_to(&order)),
    ];
    let service = service_with(&engines, &Settings::default());

    let result = service.extract_text(busy_page(), None).await;
    assert!(result.content_type.unwrap().is_handwritten);
    assert_eq!(*order.lock().unwrap(), vec!["vlm", "lay", "gen", "tess"]);

    order.lock().unwrap().clear();
    let result = service.extract_text(blank_page(), None).await;
    assert!(!result.content_type.unwrap().is_handwritten);
    assert_eq!(*order.lock().unwrap(), vec!["lay", "gen", "vlm", "tess"]);
}

#[tokio::test]
async fn test_multi_pass_engine_votes_across_profiles() {
    let engine = Arc::new(
        MockEngine::new(
            "multi",
            EngineKind::General,
            Reply::PerProfile(vec![
                (Profile::Handwriting, "the qu1ck brown fox", 0.5),
                (Profile::Printed, "the quick brown fox", 0.45),
                (Profile::Original, "tha quick brown fox", 0.4),
            ]),
        )
        .with_profiles(vec![Profile::Handwriting, Profile::Printed, Profile::Original]),
    );
    let service = service_with(&[engine.clone()], &Settings::default());

    let result = service.extract_text(busy_page(), None).await;

    assert_eq!(engine.calls(), 3);
    assert_eq!(result.all_candidates.len(), 1);
    assert_eq!(result.all_candidates[0].raw_text, "the quick brown fox");
    assert_eq!(result.all_candidates[0].confidence, 0.5);
    assert_eq!(result.text, "The quick brown fox.");
}

#[tokio::test]
async fn test_variant_files_are_removed() {
    let scratch = tempfile::tempdir().unwrap();
    let mut settings = Settings::default();
    settings.ocr.temp_dir = Some(scratch.path().to_path_buf());

    let engine = Arc::new(
        MockEngine::text("alpha", EngineKind::General, "the files go away", 0.7)
            .with_profiles(vec![Profile::Printed, Profile::Handwriting]),
    );
    let failing = Arc::new(MockEngine::new("beta", EngineKind::Layout, Reply::Fail("nope")));
    let service = service_with(&[engine.clone(), failing.clone()], &settings);

    service.extract_text(busy_page(), None).await;

    let seen: Vec<(PathBuf, bool)> = engine
        .seen
        .lock()
        .unwrap()
        .iter()
        .chain(failing.seen.lock().unwrap().iter())
        .cloned()
        .collect();
    assert_eq!(seen.len(), 3);
    for (path, existed) in &seen {
        assert!(existed, "{} missing while the engine ran", path.display());
        assert!(!path.exists(), "{} left behind", path.display());
        assert!(path.starts_with(scratch.path()));
    }
    assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_slow_engine_times_out() {
    let mut settings = Settings::default();
    settings.ocr.engine_timeout_secs = 1;

    let slow = Arc::new(
        MockEngine::text("slow", EngineKind::Layout, "never seen text", 0.99)
            .slow(Duration::from_secs(2)),
    );
    let quick = Arc::new(MockEngine::text(
        "quick",
        EngineKind::General,
        "the quick answer",
        0.7,
    ));
    let service = service_with(&[slow.clone(), quick.clone()], &settings);

    let result = service.extract_text(blank_page(), None).await;

    assert_eq!(result.method, "quick");
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.contains("slow") && d.contains("Timed out")));
}

#[tokio::test]
async fn test_cancelled_call_runs_no_engines() {
    let engine = Arc::new(MockEngine::text("alpha", EngineKind::General, "words here", 0.9));
    let service = service_with(&[engine.clone()], &Settings::default());

    let cancel = CancellationFlag::new();
    cancel.cancel();
    let result = service
        .extract_text_with_cancel(blank_page(), None, &cancel)
        .await;

    assert_eq!(result.error, Some(ExtractionError::Cancelled));
    assert!(result.diagnostics.iter().any(|d| d == "cancelled"));
    assert_eq!(engine.calls(), 0);
}

#[tokio::test]
async fn test_concurrent_calls_initialize_engine_once() {
    let engine = Arc::new(
        MockEngine::text("shared", EngineKind::General, "shared engine text", 0.8)
            .slow(Duration::from_millis(20)),
    );
    let service = Arc::new(service_with(&[engine.clone()], &Settings::default()));

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.extract_text(blank_page(), None).await })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap().method, "shared");
    }

    assert_eq!(engine.inits(), 1);
    assert_eq!(engine.calls(), 4);
}

#[tokio::test]
async fn test_image_from_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("note.png");
    let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(64, 64, Luma([220])));
    img.save(&path).unwrap();

    let engine = Arc::new(MockEngine::text("alpha", EngineKind::General, "from a file", 0.8));
    let service = service_with(&[engine.clone()], &Settings::default());

    let result = service.reprocess(&path, "alpha").await;
    assert_eq!(result.method, "alpha");
    assert_eq!(result.text, "From a file.");
    assert!(path.exists());
}
