//! Error types shared across the ingestion pipeline and the store.
//!
//! The split follows how far a failure is allowed to travel:
//! - `RecognitionError`: one OCR call failed (caller decides row or screenshot scope)
//! - `ScreenshotError`: one screenshot is abandoned, the rest of the batch continues
//! - `IngestError`: the whole batch is aborted
//! - `StoreError`: persistence failed; treated as fatal by every caller

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// A single OCR invocation failed.
#[derive(Error, Debug)]
pub enum RecognitionError {
    #[error("tesseract not found: {0}")]
    EngineMissing(String),
    #[error("tesseract failed: {0}")]
    Engine(String),
    #[error("tesseract did not finish within {0:?}")]
    Timeout(Duration),
    #[error("failed to hand image to OCR engine: {0}")]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A screenshot could not be turned into roster rows.
#[derive(Error, Debug)]
pub enum ScreenshotError {
    #[error("'{0}' is not an image, only .png, .jpg and .jpeg are accepted")]
    UnsupportedAttachment(String),
    #[error("failed to fetch '{source_name}': {error}")]
    Fetch {
        source_name: String,
        #[source]
        error: reqwest::Error,
    },
    #[error("failed to fetch '{source_name}': HTTP {status}")]
    HttpStatus { source_name: String, status: u16 },
    #[error("failed to read '{source_name}': {error}")]
    Read {
        source_name: String,
        #[source]
        error: std::io::Error,
    },
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("unable to find a suitable rgb filter after {attempts} attempts")]
    Calibration { attempts: u32 },
    #[error(transparent)]
    Recognition(#[from] RecognitionError),
}

/// Persistence failures. Never recovered from inside the pipeline.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error("alias '{0}' already belongs to a player")]
    AliasTaken(String),
    #[error("corrupt value in column {column}: {value}")]
    Corrupt { column: &'static str, value: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Operator commands that reference players by name.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("the player \"{0}\" does not exist")]
    PlayerNotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures that abort a whole upload batch.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("dictionary file {} is not valid UTF-8: {error}", path.display())]
    DictionaryEncoding {
        path: PathBuf,
        #[source]
        error: std::string::FromUtf8Error,
    },
    #[error("failed to read dictionary file {}: {error}", path.display())]
    DictionaryRead {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}
