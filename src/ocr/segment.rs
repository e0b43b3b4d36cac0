use std::fmt;

use image::RgbImage;
use tracing::{debug, warn};

use super::parse::{ParseFailure, ParsedRow, parse_row};
use super::preprocess::to_gray;
use super::{Recognizer, TextLayout};
use crate::config::LayoutConfig;
use crate::error::ScreenshotError;

/// Why a name band produced no row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BandFailure {
    /// Band OCR'd to nothing (page shorter than `row_count`)
    Blank,
    /// OCR call failed for this band alone
    Unreadable(String),
    Unparsable(ParseFailure),
}

impl fmt::Display for BandFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BandFailure::Blank => f.write_str("row is empty"),
            BandFailure::Unreadable(error) => write!(f, "could not read row: {error}"),
            BandFailure::Unparsable(failure) => write!(f, "unable to process row; {failure}"),
        }
    }
}

/// OCR text of one name band and what the parser made of it.
#[derive(Debug, Clone)]
pub struct BandRead {
    /// 1-based position on the page
    pub row: usize,
    pub text: String,
    pub parsed: Result<ParsedRow, BandFailure>,
}

impl BandRead {
    pub fn excluded(&self) -> bool {
        self.parsed.is_err()
    }
}

#[derive(Debug, Clone)]
pub struct Segments {
    pub bands: Vec<BandRead>,
    /// Whole power column, OCR'd as one block
    pub power_text: String,
}

/// Pixel geometry of the name bands and the power column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandGeometry {
    pub split_x: u32,
    pub name_top: u32,
    pub band_height: u32,
    pub power_top: u32,
}

impl BandGeometry {
    pub fn new(width: u32, height: u32, layout: &LayoutConfig) -> Self {
        let split_x = ((width as f32 * layout.column_split_fraction) as u32).min(width);
        let name_top = ((height as f32 * layout.name_top_fraction) as u32).min(height);
        let power_top = ((height as f32 * layout.power_top_fraction) as u32).min(height);
        let band_height = (height - name_top) / layout.row_count.max(1) as u32;
        Self {
            split_x,
            name_top,
            band_height,
            power_top,
        }
    }

    pub fn band_top(&self, index: usize) -> u32 {
        self.name_top + self.band_height * index as u32
    }
}

/// OCRs each name band as a single line and the power column as a block.
///
/// A band whose OCR fails is excluded on its own; a failing power column
/// abandons the screenshot.
pub fn segment(
    img: &RgbImage,
    layout: &LayoutConfig,
    ocr: &dyn Recognizer,
) -> Result<Segments, ScreenshotError> {
    let (width, height) = img.dimensions();
    let geometry = BandGeometry::new(width, height, layout);
    debug!("Band geometry for {}x{}: {:?}", width, height, geometry);

    let mut bands = Vec::with_capacity(layout.row_count);
    for index in 0..layout.row_count {
        let row = index + 1;
        let band = image::imageops::crop_imm(
            img,
            0,
            geometry.band_top(index),
            geometry.split_x,
            geometry.band_height,
        )
        .to_image();

        let read = match ocr.recognize(&to_gray(&band), TextLayout::Line) {
            Ok(text) => {
                let parsed = if text.trim().is_empty() {
                    Err(BandFailure::Blank)
                } else {
                    parse_row(&text).map_err(BandFailure::Unparsable)
                };
                BandRead { row, text, parsed }
            }
            Err(error) => {
                warn!("OCR failed on row {}: {}", row, error);
                BandRead {
                    row,
                    text: String::new(),
                    parsed: Err(BandFailure::Unreadable(error.to_string())),
                }
            }
        };
        debug!("Row {} read {:?} -> {:?}", row, read.text.trim(), read.parsed);
        bands.push(read);
    }

    let power_region = image::imageops::crop_imm(
        img,
        geometry.split_x,
        geometry.power_top,
        width - geometry.split_x,
        height - geometry.power_top,
    )
    .to_image();
    let power_text = ocr.recognize(&to_gray(&power_region), TextLayout::Block)?;
    debug!("Power column read {:?}", power_text);

    Ok(Segments { bands, power_text })
}
