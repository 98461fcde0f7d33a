//! Configuration management for scanscribe using the prefer crate.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::imaging::{DetectionSettings, PreprocessSettings, Profile};
use crate::text::Calibration;

/// Errors from loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Tesseract CLI settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TesseractSettings {
    pub enabled: bool,
    /// Binary name or path. Overridden by `TESSERACT_CMD`.
    pub binary: PathBuf,
    pub profiles: Vec<Profile>,
    /// Page segmentation modes tried in order.
    pub psm_modes: Vec<u8>,
    /// Confidence used when Tesseract reports no word confidences.
    pub nominal_confidence: f32,
}

impl Default for TesseractSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            binary: PathBuf::from("tesseract"),
            profiles: vec![Profile::Handwriting],
            psm_modes: vec![6, 3, 4, 11],
            nominal_confidence: 0.7,
        }
    }
}

/// Pure-Rust ocrs engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrsSettings {
    pub enabled: bool,
    pub profiles: Vec<Profile>,
    /// Directory holding `text-detection.rten` and `text-recognition.rten`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_path: Option<PathBuf>,
    /// ocrs reports no confidence; this is used instead.
    pub nominal_confidence: f32,
}

impl Default for OcrsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            profiles: vec![Profile::Printed],
            model_path: None,
            nominal_confidence: 0.75,
        }
    }
}

/// PaddleOCR (ONNX) settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaddleSettings {
    pub enabled: bool,
    pub profiles: Vec<Profile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_path: Option<PathBuf>,
    pub threads: usize,
}

impl Default for PaddleSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            profiles: vec![Profile::Original],
            model_path: None,
            threads: 4,
        }
    }
}

/// DeepSeek-OCR subprocess settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeepSeekSettings {
    pub enabled: bool,
    /// Binary name or path. Overridden by `DEEPSEEK_OCR_BIN`.
    pub binary: PathBuf,
    pub profiles: Vec<Profile>,
    /// cpu, metal, or cuda.
    pub device: String,
    /// f32, f16, or bf16.
    pub dtype: String,
    pub model: String,
    pub max_new_tokens: u32,
    pub nominal_confidence: f32,
}

impl Default for DeepSeekSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            binary: PathBuf::from("deepseek-ocr-cli"),
            profiles: vec![Profile::Original],
            device: "cpu".to_string(),
            dtype: "f32".to_string(),
            model: "deepseek-ocr".to_string(),
            max_new_tokens: 4096,
            nominal_confidence: 0.85,
        }
    }
}

/// Per-engine settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub tesseract: TesseractSettings,
    pub ocrs: OcrsSettings,
    pub paddle: PaddleSettings,
    pub deepseek: DeepSeekSettings,
}

/// Orchestration settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    /// Recognition language (e.g., "eng", "chi_sim").
    pub language: String,
    /// Where scoped variant files are written. Defaults to the system temp dir.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<PathBuf>,
    pub engine_timeout_secs: u64,
    /// Results below this confidence trigger a retry with untried engines.
    pub low_confidence_threshold: f32,
    /// Skip remaining engines once a candidate reaches this confidence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub early_stop_confidence: Option<f32>,
    pub calibration: Calibration,
    pub engines: EngineSettings,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            temp_dir: None,
            engine_timeout_secs: 120,
            low_confidence_threshold: 0.2,
            early_stop_confidence: None,
            calibration: Calibration::default(),
            engines: EngineSettings::default(),
        }
    }
}

impl OcrSettings {
    pub fn engine_timeout(&self) -> Duration {
        Duration::from_secs(self.engine_timeout_secs.max(1))
    }
}

/// Top-level settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub ocr: OcrSettings,
    pub preprocess: PreprocessSettings,
    pub detection: DetectionSettings,
    /// File the settings were loaded from, if any.
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Settings {
    /// Load configuration using prefer crate for discovery.
    /// Falls back to defaults (with environment overrides) when no file is found
    /// or the discovered file cannot be parsed.
    pub async fn load() -> Self {
        match prefer::load("scanscribe").await {
            Ok(pref_config) => {
                if let Some(path) = pref_config.source_path() {
                    match Self::load_from_path(path).await {
                        Ok(settings) => settings,
                        Err(e) => {
                            tracing::warn!("Ignoring config {}: {}", path.display(), e);
                            Self::default_with_env()
                        }
                    }
                } else {
                    Self::default_with_env()
                }
            }
            Err(_) => Self::default_with_env(),
        }
    }

    /// Defaults with environment overrides applied.
    pub fn default_with_env() -> Self {
        let mut settings = Self::default();
        settings.apply_env();
        settings
    }

    /// Load configuration from a specific file path.
    /// Format is chosen by extension: TOML, YAML, otherwise JSON.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;

        let mut settings = Self::parse(&contents, path)?;
        settings.source_path = Some(path.to_path_buf());
        settings.resolve_paths();
        settings.apply_env();
        Ok(settings)
    }

    fn parse(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        Ok(match ext {
            "toml" => toml::from_str(contents)?,
            "yaml" | "yml" => serde_yaml::from_str(contents)?,
            _ => serde_json::from_str(contents)?,
        })
    }

    /// Directory relative paths in the config file are resolved against.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Expand `~` and resolve relative paths against the config file location.
    /// Bare binary names are left for PATH lookup.
    fn resolve_paths(&mut self) {
        let base = self.base_dir().unwrap_or_else(|| PathBuf::from("."));
        let ocr = &mut self.ocr;
        if let Some(dir) = ocr.temp_dir.as_mut() {
            *dir = resolve_path(dir, &base);
        }
        for model_path in [
            ocr.engines.ocrs.model_path.as_mut(),
            ocr.engines.paddle.model_path.as_mut(),
        ]
        .into_iter()
        .flatten()
        {
            *model_path = resolve_path(model_path, &base);
        }
        for binary in [
            &mut ocr.engines.tesseract.binary,
            &mut ocr.engines.deepseek.binary,
        ] {
            if binary.components().count() > 1 || binary.starts_with("~") {
                *binary = resolve_path(binary, &base);
            }
        }
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        if let Some(cmd) = env_var("TESSERACT_CMD") {
            tracing::debug!("Using TESSERACT_CMD from environment: {}", cmd);
            self.ocr.engines.tesseract.binary = expand(&cmd);
        }
        if let Some(bin) = env_var("DEEPSEEK_OCR_BIN") {
            tracing::debug!("Using DEEPSEEK_OCR_BIN from environment: {}", bin);
            self.ocr.engines.deepseek.binary = expand(&bin);
        }
        if let Some(dir) = env_var("SCANSCRIBE_TEMP_DIR") {
            self.ocr.temp_dir = Some(expand(&dir));
        }
        if let Some(secs) = env_var("SCANSCRIBE_ENGINE_TIMEOUT_SECS") {
            match secs.parse::<u64>() {
                Ok(secs) => self.ocr.engine_timeout_secs = secs,
                Err(_) => tracing::warn!(
                    "Ignoring invalid SCANSCRIBE_ENGINE_TIMEOUT_SECS: {}",
                    secs
                ),
            }
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

/// Resolve a path that may be relative to the config file.
/// - Absolute paths are returned as-is
/// - Paths starting with ~ are expanded
/// - Relative paths are resolved relative to `base_dir`
pub fn resolve_path(path: &Path, base_dir: &Path) -> PathBuf {
    let expanded = expand(&path.to_string_lossy());
    if expanded.is_absolute() {
        expanded
    } else {
        base_dir.join(expanded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.ocr.language, "eng");
        assert_eq!(settings.ocr.engine_timeout_secs, 120);
        assert_eq!(settings.ocr.low_confidence_threshold, 0.2);
        assert_eq!(settings.ocr.engines.tesseract.psm_modes, vec![6, 3, 4, 11]);
        assert_eq!(settings.preprocess.min_dimension, 256);
        assert_eq!(settings.detection.edge_density_threshold, 0.03);
    }

    #[test]
    fn test_parse_partial_toml() {
        let toml = r#"
[ocr]
engine_timeout_secs = 30
early_stop_confidence = 0.9

[ocr.engines.tesseract]
psm_modes = [7]
profiles = ["printed", "handwriting"]

[ocr.engines.paddle]
enabled = false

[detection]
variance_threshold = 250.0
"#;
        let settings = Settings::parse(toml, Path::new("scanscribe.toml")).unwrap();
        assert_eq!(settings.ocr.engine_timeout_secs, 30);
        assert_eq!(settings.ocr.early_stop_confidence, Some(0.9));
        assert_eq!(settings.ocr.engines.tesseract.psm_modes, vec![7]);
        assert_eq!(
            settings.ocr.engines.tesseract.profiles,
            vec![Profile::Printed, Profile::Handwriting]
        );
        assert!(!settings.ocr.engines.paddle.enabled);
        assert!(settings.ocr.engines.ocrs.enabled);
        assert_eq!(settings.detection.variance_threshold, 250.0);
        assert_eq!(settings.detection.canny_low, 100.0);
    }

    #[test]
    fn test_parse_yaml_and_json() {
        let yaml = "ocr:\n  language: deu\n";
        let settings = Settings::parse(yaml, Path::new("scanscribe.yaml")).unwrap();
        assert_eq!(settings.ocr.language, "deu");

        let json = r#"{"ocr": {"calibration": {"valid_multiplier": 1.1}}}"#;
        let settings = Settings::parse(json, Path::new("scanscribe.json")).unwrap();
        assert_eq!(settings.ocr.calibration.valid_multiplier, 1.1);
        assert_eq!(settings.ocr.calibration.max_confidence, 0.98);
    }

    #[test]
    fn test_invalid_toml_is_error() {
        let result = Settings::parse("[ocr\nlanguage = ", Path::new("bad.toml"));
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[tokio::test]
    async fn test_load_from_path_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scanscribe.toml");
        std::fs::write(
            &path,
            "[ocr]\ntemp_dir = \"scratch\"\n[ocr.engines.ocrs]\nmodel_path = \"models/ocrs\"\n",
        )
        .unwrap();

        let settings = Settings::load_from_path(&path).await.unwrap();
        assert_eq!(settings.source_path.as_deref(), Some(path.as_path()));
        assert_eq!(
            settings.ocr.engines.ocrs.model_path,
            Some(dir.path().join("models/ocrs"))
        );
        // bare binary names stay on PATH
        assert_eq!(settings.ocr.engines.deepseek.binary.components().count(), 1);
    }

    #[tokio::test]
    async fn test_load_missing_file_is_error() {
        let result = Settings::load_from_path(Path::new("/nonexistent/scanscribe.toml")).await;
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_resolve_path() {
        let base = Path::new("/etc/scanscribe");
        assert_eq!(
            resolve_path(Path::new("/abs/models"), base),
            PathBuf::from("/abs/models")
        );
        assert_eq!(
            resolve_path(Path::new("models"), base),
            PathBuf::from("/etc/scanscribe/models")
        );
    }
}
