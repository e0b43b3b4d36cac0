//! Growth summaries and power charts built from stored snapshots.
//!
//! This module provides:
//! - Player summaries and alliance roster activity (`growth`)
//! - Power-over-time line charts (`charts`)
//! - Chart styling (`config`)

pub mod charts;
pub mod config;
pub mod growth;

pub use charts::PowerSeries;

use anyhow::Result;
use chrono::{Months, NaiveDate};
use std::path::{Path, PathBuf};

use crate::roster::PlayerKey;
use crate::store::RosterStore;
use config::ChartConfig;

/// First day shown on "this month" charts.
pub fn month_start(today: NaiveDate) -> NaiveDate {
    today
        .checked_sub_months(Months::new(1))
        .unwrap_or(NaiveDate::MIN)
}

/// Last month of power readings for one player.
pub fn player_series(
    store: &dyn RosterStore,
    key: PlayerKey,
    label: &str,
    today: NaiveDate,
) -> Result<PowerSeries> {
    let points = store
        .snapshots_for(key, Some(month_start(today)))?
        .into_iter()
        .map(|s| (s.day, s.power))
        .collect();
    Ok(PowerSeries {
        label: label.to_string(),
        points,
    })
}

/// Draws `series` into the charts directory as `file_name`, returning the path.
pub fn render_chart(
    title: &str,
    series: &[PowerSeries],
    output_dir: &Path,
    file_name: &str,
    config: &ChartConfig,
) -> Result<PathBuf> {
    let output_path = output_dir.join(file_name);
    charts::draw_power_chart(title, series, &output_path, config)?;
    tracing::info!("Chart saved: {}", output_path.display());
    Ok(output_path)
}
