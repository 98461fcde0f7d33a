//! Tesseract OCR backend implementation.
//!
//! Uses Tesseract OCR via command-line for text extraction. Runs in TSV mode
//! so per-word confidences are available, and sweeps the configured page
//! segmentation modes keeping the most confident output.

use std::io::ErrorKind;
use std::path::Path;
use std::process::Command;
use std::time::{Duration, Instant};

use tracing::debug;

use super::backend::{EngineInput, EngineKind, OcrBackend, OcrError, Recognition};
use super::model_utils::check_binary;
use super::process::output_within;
use crate::config::TesseractSettings;
use crate::imaging::Profile;

/// Confidence above which the PSM sweep stops early.
const GOOD_ENOUGH: f32 = 0.8;

/// Tesseract OCR backend.
pub struct TesseractBackend {
    settings: TesseractSettings,
    language: String,
}

impl TesseractBackend {
    pub fn new(settings: TesseractSettings, language: impl Into<String>) -> Self {
        Self {
            settings,
            language: language.into(),
        }
    }

    /// Run Tesseract on an image file with one page segmentation mode.
    fn run_tesseract(
        &self,
        image_path: &Path,
        psm: u8,
        budget: Option<Duration>,
    ) -> Result<String, OcrError> {
        let output = output_within(
            Command::new(&self.settings.binary)
                .arg(image_path)
                .arg("stdout")
                .args(["-l", &self.language])
                .args(["--oem", "3"])
                .args(["--psm", &psm.to_string()])
                .arg("tsv"),
            budget,
        );

        match output {
            Ok(output) => {
                if output.status.success() {
                    Ok(String::from_utf8_lossy(&output.stdout).to_string())
                } else {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    Err(OcrError::OcrFailed(format!("tesseract failed: {}", stderr.trim())))
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(OcrError::BackendNotAvailable(
                "tesseract not found (install tesseract-ocr)".to_string(),
            )),
            Err(e) if e.kind() == ErrorKind::TimedOut => {
                Err(OcrError::Timeout(budget.map_or(0, |b| b.as_secs())))
            }
            Err(e) => Err(OcrError::Io(e)),
        }
    }
}

impl Default for TesseractBackend {
    fn default() -> Self {
        Self::new(TesseractSettings::default(), "eng")
    }
}

impl OcrBackend for TesseractBackend {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn kind(&self) -> EngineKind {
        EngineKind::Fallback
    }

    fn profiles(&self) -> Vec<Profile> {
        if self.settings.profiles.is_empty() {
            vec![self.kind().default_profile()]
        } else {
            self.settings.profiles.clone()
        }
    }

    fn is_installed(&self) -> bool {
        check_binary(&self.settings.binary)
    }

    fn availability_hint(&self) -> String {
        if self.is_installed() {
            format!("Tesseract found ({})", self.settings.binary.display())
        } else {
            format!(
                "Tesseract not found at '{}'. Install with: apt install tesseract-ocr, or set TESSERACT_CMD",
                self.settings.binary.display()
            )
        }
    }

    fn initialize(&self) -> Result<(), OcrError> {
        let output = Command::new(&self.settings.binary).arg("--version").output();
        match output {
            Ok(output) if output.status.success() => Ok(()),
            Ok(output) => Err(OcrError::InitFailed(format!(
                "tesseract --version exited with {}",
                output.status
            ))),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(
                OcrError::BackendNotAvailable(self.availability_hint()),
            ),
            Err(e) => Err(OcrError::Io(e)),
        }
    }

    fn extract(&self, input: &EngineInput) -> Result<Recognition, OcrError> {
        let modes: &[u8] = if self.settings.psm_modes.is_empty() {
            &[6]
        } else {
            &self.settings.psm_modes
        };

        // the whole sweep shares one budget
        let deadline = input.timeout.map(|t| (Instant::now() + t, t));

        let mut best: Option<Recognition> = None;
        let mut last_error = None;
        for &psm in modes {
            let budget = match deadline {
                Some((at, total)) => {
                    let left = at.saturating_duration_since(Instant::now());
                    if left.is_zero() {
                        last_error = Some(OcrError::Timeout(total.as_secs()));
                        break;
                    }
                    Some(left)
                }
                None => None,
            };
            let tsv = match self.run_tesseract(&input.path, psm, budget) {
                Ok(tsv) => tsv,
                Err(e @ OcrError::BackendNotAvailable(_)) => return Err(e),
                Err(OcrError::Timeout(_)) => {
                    let total = deadline.map_or(0, |(_, t)| t.as_secs());
                    last_error = Some(OcrError::Timeout(total));
                    break;
                }
                Err(e) => {
                    debug!("Tesseract PSM {} failed: {}", psm, e);
                    last_error = Some(e);
                    continue;
                }
            };

            let page = parse_tsv(&tsv);
            let confidence = page.confidence.unwrap_or(self.settings.nominal_confidence);
            let confidence = if page.text.trim().is_empty() { 0.0 } else { confidence };
            debug!(
                "Tesseract PSM {}: {} chars, confidence {:.2}",
                psm,
                page.text.len(),
                confidence
            );

            if best.as_ref().map_or(true, |b| confidence > b.confidence) {
                best = Some(Recognition::new(page.text, confidence));
            }
            if confidence > GOOD_ENOUGH {
                break;
            }
        }

        match (best, last_error) {
            (Some(best), _) => Ok(best),
            (None, Some(e)) => Err(e),
            (None, None) => Ok(Recognition::new("", 0.0)),
        }
    }
}

/// Text and mean word confidence recovered from Tesseract TSV output.
#[derive(Debug, Default, PartialEq)]
struct TsvPage {
    text: String,
    /// Mean of positive word confidences, scaled to 0.0 - 1.0.
    confidence: Option<f32>,
}

/// Rebuild text from TSV word rows, breaking lines on block/paragraph/line changes.
fn parse_tsv(tsv: &str) -> TsvPage {
    let mut lines: Vec<String> = Vec::new();
    let mut current_line: Option<(u32, u32, u32)> = None;
    let mut conf_sum = 0.0f32;
    let mut conf_count = 0u32;

    // level page_num block_num par_num line_num word_num left top width height conf text
    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.splitn(12, '\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }
        let word = cols[11].trim();
        if word.is_empty() {
            continue;
        }
        let num = |i: usize| cols[i].parse::<u32>().unwrap_or(0);
        let key = (num(2), num(3), num(4));

        if current_line != Some(key) {
            lines.push(String::new());
            current_line = Some(key);
        }
        if let Some(line) = lines.last_mut() {
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(word);
        }

        if let Ok(conf) = cols[10].trim().parse::<f32>() {
            if conf > 0.0 {
                conf_sum += conf / 100.0;
                conf_count += 1;
            }
        }
    }

    TsvPage {
        text: lines.join("\n"),
        confidence: (conf_count > 0).then(|| (conf_sum / conf_count as f32).clamp(0.0, 1.0)),
    }
}
