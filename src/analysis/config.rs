//! Chart styling, read from the `charts` section of config.json.
//!
//! Every field has a default, so the section can be omitted entirely.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartConfig {
    pub font: FontConfig,
    pub colors: ColorConfig,
    pub layout: ChartLayout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FontConfig {
    pub title_size: u32,
    pub axis_label_size: u32,
    pub legend_size: u32,
}

/// Colors as [R, G, B].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorConfig {
    pub background: [u8; 3],
    pub text: [u8; 3],
    pub grid: [u8; 3],
    /// Color of a single-player line; multi-player charts use a palette
    pub line: [u8; 3],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartLayout {
    pub chart_width: u32,
    pub chart_height: u32,
    pub line_width: u32,
    /// Width reserved on the right for the legend of multi-player charts
    pub legend_width: u32,
}

impl Default for FontConfig {
    fn default() -> Self {
        Self {
            title_size: 24,
            axis_label_size: 14,
            legend_size: 13,
        }
    }
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            background: [0, 0, 0],
            text: [235, 235, 235],
            grid: [60, 60, 60],
            line: [31, 119, 180], // #1F77B4
        }
    }
}

impl Default for ChartLayout {
    fn default() -> Self {
        Self {
            chart_width: 900,
            chart_height: 600,
            line_width: 2,
            legend_width: 180,
        }
    }
}
