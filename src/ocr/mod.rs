pub mod calibrate;
pub mod engine;
pub mod parse;
pub mod preprocess;
pub mod segment;
pub mod setup;

#[cfg(test)]
pub(crate) mod scripted;

pub use engine::TesseractEngine;

use std::fmt;

use image::{GrayImage, RgbImage};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{CalibrationConfig, LayoutConfig};
use crate::error::{RecognitionError, ScreenshotError};
use crate::roster::RowRead;
use calibrate::calibrate;
use parse::{parse_power, power_lines};
use preprocess::apply_mask;
use segment::{BandFailure, segment};

/// How the engine should treat the image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextLayout {
    /// Uniform block of text (header band, power column)
    Block,
    /// Exactly one line (a name band)
    Line,
}

impl TextLayout {
    pub fn page_segmentation_mode(self) -> &'static str {
        match self {
            TextLayout::Block => "6",
            TextLayout::Line => "7",
        }
    }
}

/// Image-to-text capability. The engine itself lives outside this crate.
pub trait Recognizer {
    fn recognize(&self, image: &GrayImage, layout: TextLayout) -> Result<String, RecognitionError>;
}

/// A roster row that could not be read, with a user-facing reason.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RowFailure {
    pub row: usize,
    pub reason: String,
}

impl fmt::Display for RowFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {}: {}", self.row, self.reason)
    }
}

/// Everything read from one screenshot. No store access has happened yet.
#[derive(Clone, Debug, Default)]
pub struct ScreenshotRead {
    pub rows: Vec<RowRead>,
    pub failures: Vec<RowFailure>,
}

/// High-level pipeline: screenshot -> filter calibration -> mask -> bands -> rows.
pub struct ScreenshotReader<'a> {
    ocr: &'a dyn Recognizer,
    layout: &'a LayoutConfig,
    calibration: &'a CalibrationConfig,
}

impl<'a> ScreenshotReader<'a> {
    pub fn new(
        ocr: &'a dyn Recognizer,
        layout: &'a LayoutConfig,
        calibration: &'a CalibrationConfig,
    ) -> Self {
        Self {
            ocr,
            layout,
            calibration,
        }
    }

    pub fn read(&self, mut img: RgbImage) -> Result<ScreenshotRead, ScreenshotError> {
        let floor = calibrate(&img, self.ocr, self.layout.header_fraction, self.calibration)?;
        info!("Using rgb filter ({}, {}, {})", floor.r, floor.g, floor.b);
        apply_mask(&mut img, floor, self.layout.margin_fraction);

        let segments = segment(&img, self.layout, self.ocr)?;
        let powers = power_lines(&segments.power_text);
        let parsed = segments.bands.iter().filter(|b| !b.excluded()).count();
        if powers.len() != parsed {
            warn!(
                "Read {} power values for {} parsed rows; unmatched rows are reported",
                powers.len(),
                parsed
            );
        }

        let mut read = ScreenshotRead::default();
        for (index, band) in segments.bands.into_iter().enumerate() {
            let row = band.row;
            let parsed = match band.parsed {
                Ok(parsed) => parsed,
                Err(BandFailure::Blank) => {
                    // Past the last power line the page is simply short
                    if let Some(power_text) = powers.get(index) {
                        read.failures.push(RowFailure {
                            row,
                            reason: format!("no name was read for power {power_text}"),
                        });
                    }
                    continue;
                }
                Err(failure) => {
                    read.failures.push(RowFailure {
                        row,
                        reason: failure.to_string(),
                    });
                    continue;
                }
            };

            let Some(power_text) = powers.get(index) else {
                read.failures.push(RowFailure {
                    row,
                    reason: format!("no power value was read for {}", parsed.name),
                });
                continue;
            };
            let Some(level) = parsed.level_value() else {
                read.failures.push(RowFailure {
                    row,
                    reason: format!(
                        "cannot interpret the level of player {} as an integer",
                        parsed.name
                    ),
                });
                continue;
            };
            let Some(power) = parse_power(power_text) else {
                read.failures.push(RowFailure {
                    row,
                    reason: format!(
                        "cannot interpret the power of player {} as an integer",
                        parsed.name
                    ),
                });
                continue;
            };

            read.rows.push(RowRead {
                row,
                name: parsed.name,
                level,
                power,
                power_text: power_text.clone(),
            });
        }

        Ok(read)
    }
}
