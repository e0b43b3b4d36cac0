//! Bot configuration.
//!
//! Loads settings from config.json at startup. Provides the screenshot layout,
//! filter calibration parameters, validation thresholds and OCR/fetch timeouts.
//! Every field has a default so a partial file is enough.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::analysis::config::ChartConfig;

/// Layout of a roster screenshot, as fractions of the image size.
///
/// The defaults match the in-game roster page at the resolutions seen so far;
/// other screenshot sources usually only need `margin_fraction` retuned.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Roster rows visible on one page
    pub row_count: usize,
    /// Left strip (fraction of width) blanked out to hide rank icons
    pub margin_fraction: f32,
    /// Header band (fraction of height) used for filter calibration
    pub header_fraction: f32,
    /// Top of the name/level column (fraction of height)
    pub name_top_fraction: f32,
    /// Top of the power column (fraction of height)
    pub power_top_fraction: f32,
    /// Split between the name/level column and the power column (fraction of width)
    pub column_split_fraction: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            row_count: 7,
            margin_fraction: 0.17,
            header_fraction: 0.10,
            name_top_fraction: 0.20,
            power_top_fraction: 0.10,
            column_split_fraction: 0.5,
        }
    }
}

/// RGB floor search used to make the header text legible.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// First floor tried for every channel
    pub start_floor: u8,
    /// Amount subtracted from every channel after a failed attempt
    pub step: u8,
    /// Maximum number of floors tried
    pub attempts: u32,
    /// Text that must appear in the header band once the filter works
    pub header_token: String,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            start_floor: 220,
            step: 20,
            attempts: 4,
            header_token: "MEMBERS".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Largest accepted relative power change between two snapshots
    pub power_band: f64,
    /// Largest edit distance accepted for a dictionary correction
    pub max_edit_distance: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            power_band: 0.10,
            max_edit_distance: 2,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Explicit tesseract executable; searched for when unset
    pub tesseract_path: Option<PathBuf>,
    /// Explicit tessdata directory; tesseract's own default when unset
    pub tessdata_dir: Option<PathBuf>,
    /// Deadline for a single OCR call
    pub timeout_secs: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            tesseract_path: None,
            tessdata_dir: None,
            timeout_secs: 30,
        }
    }
}

impl OcrConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { timeout_secs: 20 }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Parameters of the `guess` and `missing` lookups.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    /// How far back (days) a snapshot still counts as "recent"
    pub window_days: i64,
    /// Maximum candidates returned by `guess`
    pub guess_limit: usize,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            window_days: 7,
            guess_limit: 5,
        }
    }
}

/// Complete bot configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// SQLite database file; `<data dir>/roster.db` when unset
    pub database: Option<PathBuf>,
    /// Newline-delimited spellings merged into the dictionary before each upload
    pub dictionary_seed: Option<PathBuf>,
    pub layout: LayoutConfig,
    pub calibration: CalibrationConfig,
    pub validation: ValidationConfig,
    pub ocr: OcrConfig,
    pub fetch: FetchConfig,
    pub guess: LookupConfig,
    pub charts: ChartConfig,
}

impl BotConfig {
    /// Where the database lives once overrides are applied.
    pub fn database_path(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(|| crate::paths::get_data_dir().join("roster.db"))
    }
}

/// Loads configuration from `path`, or from config.json next to the executable.
///
/// A missing file yields the defaults. A file that exists but cannot be read
/// or parsed is an error: silently falling back would ignore operator edits.
pub fn load_config(path: Option<&Path>) -> Result<BotConfig> {
    let config_path = match path {
        Some(p) => p.to_path_buf(),
        None => crate::paths::get_exe_dir().join("config.json"),
    };

    tracing::debug!("Looking for config at: {}", config_path.display());

    if !config_path.exists() {
        if path.is_some() {
            anyhow::bail!("config file {} does not exist", config_path.display());
        }
        tracing::info!("config.json not found. Using default config.");
        return Ok(BotConfig::default());
    }

    let contents = fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read {}", config_path.display()))?;
    let config = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse {}", config_path.display()))?;
    tracing::info!("Config loaded from {}", config_path.display());
    Ok(config)
}
