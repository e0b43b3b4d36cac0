use image::RgbImage;
use tracing::debug;

use super::preprocess::{RelativeRect, RgbFloor, apply_mask, crop_region, to_gray};
use super::{Recognizer, TextLayout};
use crate::config::CalibrationConfig;
use crate::error::ScreenshotError;

/// Floors tried by [`calibrate`], highest first.
pub fn candidate_floors(config: &CalibrationConfig) -> impl Iterator<Item = RgbFloor> + '_ {
    (0..config.attempts).map(|attempt| {
        let drop = u32::from(config.step) * attempt;
        RgbFloor::uniform(u32::from(config.start_floor).saturating_sub(drop) as u8)
    })
}

/// Finds an RGB floor under which the header band reads back the header token.
///
/// Only the header band is masked (without the left margin) and OCR'd for each
/// candidate; the full screenshot is untouched. An OCR error aborts the search.
pub fn calibrate(
    img: &RgbImage,
    ocr: &dyn Recognizer,
    header_fraction: f32,
    config: &CalibrationConfig,
) -> Result<RgbFloor, ScreenshotError> {
    let header = crop_region(
        img,
        &RelativeRect {
            x: 0.0,
            y: 0.0,
            width: 1.0,
            height: header_fraction,
        },
    );

    for floor in candidate_floors(config) {
        let mut band = header.clone();
        apply_mask(&mut band, floor, 0.0);
        let text = ocr.recognize(&to_gray(&band), TextLayout::Block)?;
        debug!("Header read with floor {}: {:?}", floor.r, text.trim());
        if text.contains(&config.header_token) {
            debug!("Found a working filter at {}", floor.r);
            return Ok(floor);
        }
    }

    Err(ScreenshotError::Calibration {
        attempts: config.attempts,
    })
}
