//! DeepSeek OCR backend implementation.
//!
//! Uses DeepSeek-OCR.rs via subprocess for vision-language OCR. It reads
//! handwriting far better than the line recognizers but needs more resources
//! (6-13GB RAM, GPU recommended).
//!
//! Install deepseek-ocr.rs from:
//! https://github.com/TimmyOVO/deepseek-ocr.rs
//!
//! ```bash
//! git clone https://github.com/TimmyOVO/deepseek-ocr.rs
//! cd deepseek-ocr.rs
//! cargo install --path crates/cli --features cuda  # or --features metal for Mac
//! ```

use std::io::ErrorKind;
use std::process::Command;

use super::backend::{EngineInput, EngineKind, OcrBackend, OcrError, Recognition};
use super::model_utils::check_binary;
use super::process::output_within;
use crate::config::DeepSeekSettings;
use crate::imaging::Profile;

const PROMPT: &str =
    "Extract all text from this image, including handwriting. Return only the extracted text, nothing else. <image>";

/// DeepSeek OCR backend using subprocess.
pub struct DeepSeekBackend {
    settings: DeepSeekSettings,
}

impl DeepSeekBackend {
    pub fn new(settings: DeepSeekSettings) -> Self {
        Self { settings }
    }

    fn run_deepseek(&self, input: &EngineInput) -> Result<String, OcrError> {
        let output = output_within(
            Command::new(&self.settings.binary)
                .arg("--quiet") // Suppress logs, output only the result
                .args(["--prompt", PROMPT])
                .arg("--image")
                .arg(&input.path)
                .args(["--device", &self.settings.device])
                .args(["--dtype", &self.settings.dtype])
                .args(["--model", &self.settings.model])
                .args(["--max-new-tokens", &self.settings.max_new_tokens.to_string()]),
            input.timeout,
        );

        match output {
            Ok(output) => {
                if output.status.success() {
                    Ok(String::from_utf8_lossy(&output.stdout).to_string())
                } else {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    Err(OcrError::OcrFailed(format!(
                        "deepseek-ocr failed: {}",
                        stderr.trim()
                    )))
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(OcrError::BackendNotAvailable(self.availability_hint()))
            }
            Err(e) if e.kind() == ErrorKind::TimedOut => Err(OcrError::Timeout(
                input.timeout.map_or(0, |t| t.as_secs()),
            )),
            Err(e) => Err(OcrError::Io(e)),
        }
    }
}

impl Default for DeepSeekBackend {
    fn default() -> Self {
        Self::new(DeepSeekSettings::default())
    }
}

impl OcrBackend for DeepSeekBackend {
    fn name(&self) -> &str {
        "deepseek"
    }

    fn kind(&self) -> EngineKind {
        EngineKind::Handwriting
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
            format!(
                "DeepSeek-OCR is available (device: {}, model: {})",
                self.settings.device, self.settings.model
            )
        } else {
            format!(
                "DeepSeek-OCR not found at '{}'. Install from: https://github.com/TimmyOVO/deepseek-ocr.rs \
                 or set DEEPSEEK_OCR_BIN",
                self.settings.binary.display()
            )
        }
    }

    fn initialize(&self) -> Result<(), OcrError> {
        // model weights load per invocation; only the binary can be checked up front
        if self.is_installed() {
            Ok(())
        } else {
            Err(OcrError::BackendNotAvailable(self.availability_hint()))
        }
    }

    fn extract(&self, input: &EngineInput) -> Result<Recognition, OcrError> {
        let text = self.run_deepseek(input)?;
        let text = strip_markup(&text);
        // no per-call confidence is reported
        let confidence = if text.trim().is_empty() {
            0.0
        } else {
            self.settings.nominal_confidence
        };
        Ok(Recognition::new(text, confidence))
    }
}

/// Drop code fences and grounding tags the model sometimes wraps output in.
fn strip_markup(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .map(|line| {
            line.replace("<|ref|>", "")
                .replace("<|/ref|>", "")
                .replace("<|det|>", "")
                .replace("<|/det|>", "")
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
