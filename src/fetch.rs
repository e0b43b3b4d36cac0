//! Screenshot attachments: http(s) URLs or local files.

use std::path::Path;

use image::RgbImage;
use tracing::debug;

use crate::config::FetchConfig;
use crate::error::ScreenshotError;

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

pub trait ImageSource {
    fn load(&self, source: &str) -> Result<RgbImage, ScreenshotError>;
}

/// Only `.png`, `.jpg` and `.jpeg` attachments are processed. Query strings
/// and fragments on URLs are ignored for the check.
pub fn is_image_attachment(source: &str) -> bool {
    let path = source
        .split(['?', '#'])
        .next()
        .unwrap_or(source);
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

pub struct AttachmentLoader {
    client: reqwest::blocking::Client,
}

impl AttachmentLoader {
    pub fn new(config: &FetchConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("roster-tracker/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    fn download(&self, url: &str) -> Result<Vec<u8>, ScreenshotError> {
        let fetch_error = |error| ScreenshotError::Fetch {
            source_name: url.to_string(),
            error,
        };
        let response = self.client.get(url).send().map_err(fetch_error)?;
        if !response.status().is_success() {
            return Err(ScreenshotError::HttpStatus {
                source_name: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        let bytes = response.bytes().map_err(fetch_error)?;
        Ok(bytes.to_vec())
    }
}

impl ImageSource for AttachmentLoader {
    fn load(&self, source: &str) -> Result<RgbImage, ScreenshotError> {
        if !is_image_attachment(source) {
            return Err(ScreenshotError::UnsupportedAttachment(source.to_string()));
        }

        let bytes = if is_remote(source) {
            self.download(source)?
        } else {
            std::fs::read(source).map_err(|error| ScreenshotError::Read {
                source_name: source.to_string(),
                error,
            })?
        };
        debug!("Loaded {} ({} bytes)", source, bytes.len());

        Ok(image::load_from_memory(&bytes)?.to_rgb8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_is_image_attachment() {
        assert!(is_image_attachment("roster.png"));
        assert!(is_image_attachment("ROSTER.JPG"));
        assert!(is_image_attachment("https://cdn.example.com/a/b/roster.jpeg?ex=12&is=34"));
        assert!(!is_image_attachment("notes.txt"));
        assert!(!is_image_attachment("https://cdn.example.com/roster"));
        assert!(!is_image_attachment("archive.png.zip"));
    }

    #[test]
    fn test_loads_local_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roster.png");
        RgbImage::from_pixel(8, 4, Rgb([10, 20, 30])).save(&path).unwrap();

        let loader = AttachmentLoader::new(&FetchConfig::default()).unwrap();
        let img = loader.load(path.to_str().unwrap()).unwrap();
        assert_eq!(img.dimensions(), (8, 4));
        assert_eq!(*img.get_pixel(0, 0), Rgb([10, 20, 30]));
    }

    #[test]
    fn test_rejects_non_images_before_reading() {
        let loader = AttachmentLoader::new(&FetchConfig::default()).unwrap();
        assert!(matches!(
            loader.load("/does/not/exist.txt"),
            Err(ScreenshotError::UnsupportedAttachment(_))
        ));
        assert!(matches!(
            loader.load("/does/not/exist.png"),
            Err(ScreenshotError::Read { .. })
        ));
    }

    #[test]
    fn test_corrupt_image_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roster.png");
        std::fs::write(&path, b"not a png").unwrap();
        let loader = AttachmentLoader::new(&FetchConfig::default()).unwrap();
        assert!(matches!(
            loader.load(path.to_str().unwrap()),
            Err(ScreenshotError::Decode(_))
        ));
    }
}
