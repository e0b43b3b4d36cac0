use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use image::GrayImage;
use tempfile::NamedTempFile;
use tracing::debug;

use super::setup::{find_tessdata_dir, find_tesseract_executable};
use super::{Recognizer, TextLayout};
use crate::config::OcrConfig;
use crate::error::RecognitionError;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Runs the tesseract CLI on one image per call.
pub struct TesseractEngine {
    executable: PathBuf,
    tessdata: Option<PathBuf>,
    timeout: Duration,
}

impl TesseractEngine {
    pub fn new(config: &OcrConfig) -> Result<Self, RecognitionError> {
        let executable = find_tesseract_executable(config.tesseract_path.as_deref())?;
        let tessdata = find_tessdata_dir(config.tessdata_dir.as_deref());
        debug!(
            "Using tesseract at {} (tessdata: {:?})",
            executable.display(),
            tessdata
        );
        Ok(Self {
            executable,
            tessdata,
            timeout: config.timeout(),
        })
    }

    fn wait_with_deadline(&self, child: &mut Child) -> Result<ExitStatus, RecognitionError> {
        let started = Instant::now();
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if started.elapsed() >= self.timeout {
                let _ = child.kill();
                let _ = child.wait();
                return Err(RecognitionError::Timeout(self.timeout));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl Recognizer for TesseractEngine {
    fn recognize(&self, img: &GrayImage, layout: TextLayout) -> Result<String, RecognitionError> {
        // Save image to temporary file
        let temp_input = NamedTempFile::with_suffix(".png")?;
        img.save(temp_input.path())?;

        // Tesseract appends .txt to the output base
        let temp_output = NamedTempFile::new()?;
        let output_base = temp_output.path().to_path_buf();
        let mut txt_path = output_base.clone().into_os_string();
        txt_path.push(".txt");
        let txt_path = PathBuf::from(txt_path);

        let mut command = Command::new(&self.executable);
        command
            .arg(temp_input.path())
            .arg(&output_base)
            .arg("-l")
            .arg("eng")
            .arg("--psm")
            .arg(layout.page_segmentation_mode());
        if let Some(dir) = &self.tessdata {
            command.arg("--tessdata-dir").arg(dir);
        }
        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        let status = self.wait_with_deadline(&mut child)?;
        if !status.success() {
            let mut stderr = String::new();
            if let Some(mut pipe) = child.stderr.take() {
                let _ = pipe.read_to_string(&mut stderr);
            }
            return Err(RecognitionError::Engine(stderr.trim().to_string()));
        }

        let text = std::fs::read_to_string(&txt_path)?;
        let _ = std::fs::remove_file(&txt_path);
        Ok(text)
    }
}
