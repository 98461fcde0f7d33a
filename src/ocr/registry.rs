//! Registered engines and their lazy, memoized initialization.
//!
//! Each engine moves `uninitialized → initializing → ready | failed` at most
//! once per registry. Initialization runs behind a per-engine async gate so
//! concurrent first callers wait and then observe the same outcome.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn};

use super::backend::{EngineKind, OcrBackend, OcrError};
use super::deepseek::DeepSeekBackend;
use super::tesseract::TesseractBackend;
use crate::config::OcrSettings;

#[cfg(feature = "ocr-ocrs")]
use super::ocrs_backend::OcrsBackend;
#[cfg(feature = "ocr-paddle")]
use super::paddle_backend::PaddleBackend;

/// Initialization state of one engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum EngineState {
    Uninitialized,
    Initializing,
    Ready,
    /// Initialization failed; never retried.
    Failed(String),
}

impl EngineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineState::Uninitialized => "uninitialized",
            EngineState::Initializing => "initializing",
            EngineState::Ready => "ready",
            EngineState::Failed(_) => "failed",
        }
    }
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Failed(reason) => write!(f, "failed: {}", reason),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

/// Diagnostic view of one engine.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub name: String,
    pub kind: EngineKind,
    pub state: EngineState,
    pub installed: bool,
    pub hint: String,
}

struct Slot {
    backend: Arc<dyn OcrBackend>,
    state: Mutex<EngineState>,
    gate: tokio::sync::Mutex<()>,
}

impl Slot {
    fn new(backend: Arc<dyn OcrBackend>) -> Self {
        Self {
            backend,
            state: Mutex::new(EngineState::Uninitialized),
            gate: tokio::sync::Mutex::new(()),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        // state is a plain value; a panic elsewhere cannot leave it half-written
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn state(&self) -> EngineState {
        self.lock_state().clone()
    }

    fn set_state(&self, state: EngineState) {
        *self.lock_state() = state;
    }

    /// The memoized outcome, if initialization has finished.
    fn settled(&self) -> Option<Result<Arc<dyn OcrBackend>, OcrError>> {
        match &*self.lock_state() {
            EngineState::Ready => Some(Ok(Arc::clone(&self.backend))),
            EngineState::Failed(reason) => Some(Err(OcrError::InitFailed(reason.clone()))),
            _ => None,
        }
    }
}

/// The set of recognition engines, in registration order.
#[derive(Default)]
pub struct EngineRegistry {
    slots: Vec<Slot>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the standard engine set from settings, skipping disabled engines.
    /// Engines whose cargo feature is off are not registered.
    pub fn from_settings(settings: &OcrSettings) -> Self {
        let engines = &settings.engines;
        let mut registry = Self::new();

        if engines.deepseek.enabled {
            registry.register(Arc::new(DeepSeekBackend::new(engines.deepseek.clone())));
        }
        #[cfg(feature = "ocr-ocrs")]
        if engines.ocrs.enabled {
            registry.register(Arc::new(OcrsBackend::new(engines.ocrs.clone())));
        }
        #[cfg(feature = "ocr-paddle")]
        if engines.paddle.enabled {
            registry.register(Arc::new(PaddleBackend::new(engines.paddle.clone())));
        }
        if engines.tesseract.enabled {
            registry.register(Arc::new(TesseractBackend::new(
                engines.tesseract.clone(),
                settings.language.clone(),
            )));
        }
        registry
    }

    /// Register a backend. A backend with an already registered name replaces it.
    pub fn register(&mut self, backend: Arc<dyn OcrBackend>) {
        let slot = Slot::new(backend);
        match self
            .slots
            .iter_mut()
            .find(|s| s.backend.name() == slot.backend.name())
        {
            Some(existing) => *existing = slot,
            None => self.slots.push(slot),
        }
    }

    fn slot(&self, name: &str) -> Option<&Slot> {
        self.slots.iter().find(|s| s.backend.name() == name)
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Names and roles of all registered engines.
    pub fn engines(&self) -> Vec<(String, EngineKind)> {
        self.slots
            .iter()
            .map(|s| (s.backend.name().to_string(), s.backend.kind()))
            .collect()
    }

    pub fn state(&self, name: &str) -> Option<EngineState> {
        self.slot(name).map(Slot::state)
    }

    /// Map an engine name or role name to a registered engine name.
    ///
    /// Names win over roles; a role resolves to its first registered engine.
    pub fn resolve(&self, name_or_kind: &str) -> Option<String> {
        let wanted = name_or_kind.trim().to_lowercase();
        if let Some(slot) = self
            .slots
            .iter()
            .find(|s| s.backend.name().eq_ignore_ascii_case(&wanted))
        {
            return Some(slot.backend.name().to_string());
        }
        let kind = EngineKind::from_str(&wanted)?;
        self.slots
            .iter()
            .find(|s| s.backend.kind() == kind)
            .map(|s| s.backend.name().to_string())
    }

    /// A ready engine. Never triggers initialization.
    pub fn get(&self, name: &str) -> Option<Arc<dyn OcrBackend>> {
        self.slot(name)
            .and_then(|s| s.settled())
            .and_then(Result::ok)
    }

    /// Initialize `name` if needed and return it.
    ///
    /// Initialization runs on a blocking worker at most once; a failure is
    /// memoized and returned to every later caller.
    pub async fn ensure_ready(&self, name: &str) -> Result<Arc<dyn OcrBackend>, OcrError> {
        let slot = self
            .slot(name)
            .ok_or_else(|| OcrError::BackendNotAvailable(format!("{} is not registered", name)))?;
        if let Some(outcome) = slot.settled() {
            return outcome;
        }

        let _gate = slot.gate.lock().await;
        if let Some(outcome) = slot.settled() {
            return outcome;
        }

        slot.set_state(EngineState::Initializing);
        info!("Initializing OCR engine {}", name);
        let start = Instant::now();
        let backend = Arc::clone(&slot.backend);
        let outcome = match tokio::task::spawn_blocking(move || backend.initialize()).await {
            Ok(outcome) => outcome,
            Err(e) => Err(OcrError::InitFailed(format!("initialization panicked: {}", e))),
        };

        match outcome {
            Ok(()) => {
                info!(
                    "OCR engine {} ready in {}ms",
                    name,
                    start.elapsed().as_millis()
                );
                slot.set_state(EngineState::Ready);
                Ok(Arc::clone(&slot.backend))
            }
            Err(e) => {
                warn!("OCR engine {} failed to initialize: {}", name, e);
                let reason = e.to_string();
                slot.set_state(EngineState::Failed(reason.clone()));
                Err(OcrError::InitFailed(reason))
            }
        }
    }

    /// Names of ready engines, in registration order.
    pub fn available(&self) -> Vec<String> {
        self.slots
            .iter()
            .filter(|s| s.state() == EngineState::Ready)
            .map(|s| s.backend.name().to_string())
            .collect()
    }

    /// Names of engines that have not failed and look installed. Diagnostic only.
    pub fn potentially_available(&self) -> Vec<String> {
        self.slots
            .iter()
            .filter(|s| !matches!(s.state(), EngineState::Failed(_)))
            .filter(|s| s.backend.is_installed())
            .map(|s| s.backend.name().to_string())
            .collect()
    }

    pub fn engine_report(&self) -> Vec<EngineStatus> {
        self.slots
            .iter()
            .map(|s| EngineStatus {
                name: s.backend.name().to_string(),
                kind: s.backend.kind(),
                state: s.state(),
                installed: s.backend.is_installed(),
                hint: s.backend.availability_hint(),
            })
            .collect()
    }
}
