//! Recognizer double that replays canned OCR output in call order.

use std::collections::VecDeque;
use std::sync::Mutex;

use image::GrayImage;

use super::{Recognizer, TextLayout};
use crate::error::RecognitionError;

pub struct ScriptedOcr {
    responses: Mutex<VecDeque<Result<String, RecognitionError>>>,
    layouts: Mutex<Vec<TextLayout>>,
}

impl ScriptedOcr {
    pub fn new<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_results(texts.into_iter().map(|t| Ok(t.into())).collect())
    }

    pub fn from_results(responses: Vec<Result<String, RecognitionError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            layouts: Mutex::new(Vec::new()),
        }
    }

    /// A full screenshot: calibration succeeds at once, then one line per
    /// name band (padded with blanks up to `rows`) and the power block.
    pub fn roster(rows: usize, name_lines: &[&str], power_block: &str) -> Self {
        let mut texts = vec!["MEMBERS".to_string()];
        texts.extend((0..rows).map(|i| name_lines.get(i).copied().unwrap_or("").to_string()));
        texts.push(power_block.to_string());
        Self::new(texts)
    }

    pub fn calls(&self) -> usize {
        self.layouts.lock().unwrap().len()
    }

    pub fn layouts(&self) -> Vec<TextLayout> {
        self.layouts.lock().unwrap().clone()
    }
}

impl Recognizer for ScriptedOcr {
    fn recognize(&self, _image: &GrayImage, layout: TextLayout) -> Result<String, RecognitionError> {
        self.layouts.lock().unwrap().push(layout);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(String::new()))
    }
}
