//! Model files and external tools used by OCR backends.

// model stores are only used by the feature-gated in-process backends
#![cfg_attr(
    not(any(feature = "ocr-ocrs", feature = "ocr-paddle")),
    allow(dead_code)
)]

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::info;

use super::backend::OcrError;

/// Download tools tried in order, with the flags that write to a file.
const DOWNLOADERS: &[(&str, &[&str])] = &[("curl", &["-fsSL", "-o"]), ("wget", &["-q", "-O"])];

/// Check if a binary is available, either on PATH or as a direct path.
pub fn check_binary(name: impl AsRef<Path>) -> bool {
    let name = name.as_ref();
    which::which(name).is_ok() || (name.components().count() > 1 && name.is_file())
}

/// One downloadable model file.
pub struct ModelFile {
    pub url: &'static str,
    pub filename: &'static str,
    /// Shown while downloading.
    pub size_hint: &'static str,
}

/// The set of model files a backend needs, and where they live.
pub struct ModelStore {
    /// Directory name under `<data_dir>/scanscribe`.
    pub subdir: &'static str,
    pub files: &'static [ModelFile],
}

impl ModelStore {
    pub fn default_dir(&self) -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
            .join("scanscribe")
            .join(self.subdir)
            .join("models")
    }

    /// Whether `dir` holds every model file.
    pub fn is_complete(&self, dir: &Path) -> bool {
        self.files.iter().all(|f| dir.join(f.filename).is_file())
    }

    /// First complete directory among the configured one, the default, and
    /// the system-wide share.
    pub fn locate(&self, configured: Option<&Path>) -> Option<PathBuf> {
        let system = PathBuf::from("/usr/share").join(self.subdir).join("models");
        configured
            .map(Path::to_path_buf)
            .into_iter()
            .chain([self.default_dir(), system])
            .find(|dir| self.is_complete(dir))
    }

    /// A complete model directory, downloading whatever is missing into the
    /// configured directory (or the default one).
    pub fn fetch(&self, configured: Option<&Path>) -> Result<PathBuf, OcrError> {
        if let Some(dir) = self.locate(configured) {
            return Ok(dir);
        }

        let dir = configured.map_or_else(|| self.default_dir(), Path::to_path_buf);
        std::fs::create_dir_all(&dir)?;
        for file in self.files {
            let dest = dir.join(file.filename);
            if dest.is_file() {
                continue;
            }
            info!("Downloading {} (~{})", file.filename, file.size_hint);
            download(file.url, &dest)?;
        }
        info!("{} models ready in {}", self.subdir, dir.display());
        Ok(dir)
    }
}

/// Fetch `url` into `dest`. The file only appears once the download completes.
fn download(url: &str, dest: &Path) -> Result<(), OcrError> {
    let mut partial = OsString::from(dest.as_os_str());
    partial.push(".part");
    let partial = PathBuf::from(partial);

    for (tool, flags) in DOWNLOADERS {
        let status = match Command::new(tool).args(*flags).arg(&partial).arg(url).status() {
            Ok(status) => status,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => return Err(OcrError::Io(e)),
        };
        if !status.success() {
            let _ = std::fs::remove_file(&partial);
            return Err(OcrError::InitFailed(format!(
                "{} could not download {}",
                tool, url
            )));
        }
        std::fs::rename(&partial, dest)?;
        return Ok(());
    }

    Err(OcrError::BackendNotAvailable(
        "Neither curl nor wget found. Install one to download models.".to_string(),
    ))
}
