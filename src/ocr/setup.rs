use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::debug;

use crate::error::RecognitionError;

const COMMON_EXECUTABLE_PATHS: [&str; 5] = [
    "/usr/bin/tesseract",
    "/usr/local/bin/tesseract",
    "/opt/homebrew/bin/tesseract",
    r"C:\Program Files\Tesseract-OCR\tesseract.exe",
    r"C:\Program Files (x86)\Tesseract-OCR\tesseract.exe",
];

/// Returns the directory for locally provided Tesseract files
pub fn get_tesseract_dir() -> PathBuf {
    crate::paths::get_data_dir().join("tesseract")
}

fn responds_to_version(executable: &Path) -> bool {
    Command::new(executable)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Finds the Tesseract executable: the configured path, our local dir, PATH,
/// then common install locations.
pub fn find_tesseract_executable(configured: Option<&Path>) -> Result<PathBuf, RecognitionError> {
    if let Some(path) = configured {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(RecognitionError::EngineMissing(format!(
            "configured path {} does not exist",
            path.display()
        )));
    }

    let tesseract_dir = get_tesseract_dir();
    for name in ["tesseract", "tesseract.exe"] {
        let local = tesseract_dir.join(name);
        if local.exists() {
            return Ok(local);
        }
    }

    let on_path = PathBuf::from("tesseract");
    if responds_to_version(&on_path) {
        return Ok(on_path);
    }

    for path in COMMON_EXECUTABLE_PATHS {
        let p = PathBuf::from(path);
        if p.exists() {
            debug!("Found tesseract at {}", p.display());
            return Ok(p);
        }
    }

    Err(RecognitionError::EngineMissing(
        "install Tesseract-OCR or set ocr.tesseract_path".to_string(),
    ))
}

/// Finds a tessdata directory holding eng.traineddata. `None` lets tesseract
/// use its built-in default (which also honours TESSDATA_PREFIX).
pub fn find_tessdata_dir(configured: Option<&Path>) -> Option<PathBuf> {
    if let Some(dir) = configured {
        return Some(dir.to_path_buf());
    }

    let local = get_tesseract_dir().join("tessdata");
    if local.join("eng.traineddata").exists() {
        return Some(local);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_executable_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("tesseract");
        assert!(matches!(
            find_tesseract_executable(Some(&missing)),
            Err(RecognitionError::EngineMissing(_))
        ));

        std::fs::write(&missing, b"").unwrap();
        assert_eq!(find_tesseract_executable(Some(&missing)).unwrap(), missing);
    }

    #[test]
    fn test_configured_tessdata_wins() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            find_tessdata_dir(Some(dir.path())),
            Some(dir.path().to_path_buf())
        );
    }
}
