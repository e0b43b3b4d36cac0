//! Logging setup.
//!
//! Console output is kept quiet (warnings and errors) since command replies are
//! printed to stdout; the log file under `<exe_dir>/logs/` records everything
//! down to DEBUG, including every store write and every row decision.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::prelude::*;

const LOG_FILE_NAME: &str = "roster-tracker.log";

/// Installs the global subscriber. `verbosity` raises the console level
/// (0 = warn, 1 = info, 2+ = debug). `RUST_LOG` overrides the file filter.
pub fn init(logs_dir: &Path, verbosity: u8) -> Result<()> {
    let log_path = logs_dir.join(LOG_FILE_NAME);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let console_level = match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        _ => LevelFilter::DEBUG,
    };

    let file_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(console_level),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(())
}
