use image::{GrayImage, Rgb, RgbImage};

const FOREGROUND: Rgb<u8> = Rgb([0, 0, 0]);
const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

/// Per-channel minimum a pixel must reach to count as text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RgbFloor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl RgbFloor {
    pub fn uniform(value: u8) -> Self {
        Self {
            r: value,
            g: value,
            b: value,
        }
    }

    fn admits(&self, pixel: &Rgb<u8>) -> bool {
        pixel[0] >= self.r && pixel[1] >= self.g && pixel[2] >= self.b
    }
}

/// A rectangle given as fractions (0.0-1.0) of the image size.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RelativeRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Converts the image to black text on white, in place.
///
/// Pixels where any channel is below the floor become white (background), as
/// does everything left of `width * margin_fraction` (rank icons). Everything
/// else becomes black (text).
pub fn apply_mask(img: &mut RgbImage, floor: RgbFloor, margin_fraction: f32) {
    let cutoff = (img.width() as f32 * margin_fraction).floor() as u32;

    for (x, _, pixel) in img.enumerate_pixels_mut() {
        *pixel = if x >= cutoff && floor.admits(pixel) {
            FOREGROUND
        } else {
            BACKGROUND
        };
    }
}

/// Crops a sub-region from an image using relative coordinates.
///
/// Converts the relative rect (0.0–1.0) to absolute pixel coordinates,
/// clamps to image bounds, and returns the cropped sub-image.
pub fn crop_region(img: &RgbImage, region: &RelativeRect) -> RgbImage {
    let (w, h) = img.dimensions();

    let x0 = ((region.x * w as f32) as u32).min(w);
    let y0 = ((region.y * h as f32) as u32).min(h);
    let rw = ((region.width * w as f32) as u32).min(w - x0);
    let rh = ((region.height * h as f32) as u32).min(h - y0);

    image::imageops::crop_imm(img, x0, y0, rw, rh).to_image()
}

/// Grayscale copy handed to the OCR engine.
pub fn to_gray(img: &RgbImage) -> GrayImage {
    image::imageops::grayscale(img)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crop_region() {
        // 100x200 image
        let img = RgbImage::from_fn(100, 200, |x, y| Rgb([x as u8, y as u8, 0]));

        let region = RelativeRect { x: 0.1, y: 0.25, width: 0.5, height: 0.1 };
        let cropped = crop_region(&img, &region);

        assert_eq!(cropped.dimensions(), (50, 20));
        assert_eq!(cropped.get_pixel(0, 0)[0], 10);
        assert_eq!(cropped.get_pixel(0, 0)[1], 50);
    }

    #[test]
    fn test_crop_region_clamps() {
        let img = RgbImage::new(100, 100);
        let region = RelativeRect { x: 0.9, y: 0.9, width: 0.5, height: 0.5 };
        let cropped = crop_region(&img, &region);

        assert_eq!(cropped.dimensions(), (10, 10));
    }

    #[test]
    fn test_apply_mask() {
        let mut img = RgbImage::new(4, 1);
        img.put_pixel(0, 0, Rgb([100, 100, 100]));
        img.put_pixel(1, 0, Rgb([220, 230, 250]));
        img.put_pixel(2, 0, Rgb([250, 250, 100]));
        img.put_pixel(3, 0, Rgb([220, 220, 220]));

        apply_mask(&mut img, RgbFloor::uniform(220), 0.0);

        assert_eq!(*img.get_pixel(0, 0), BACKGROUND, "dark pixel");
        assert_eq!(*img.get_pixel(1, 0), FOREGROUND, "bright pixel");
        assert_eq!(*img.get_pixel(2, 0), BACKGROUND, "one dark channel");
        assert_eq!(*img.get_pixel(3, 0), FOREGROUND, "floor is inclusive");
    }

    #[test]
    fn test_apply_mask_blanks_left_margin() {
        let mut img = RgbImage::from_pixel(10, 2, Rgb([255, 255, 255]));
        apply_mask(&mut img, RgbFloor::uniform(200), 0.17);

        // floor(10 * 0.17) = 1
        for y in 0..2 {
            assert_eq!(*img.get_pixel(0, y), BACKGROUND);
            assert_eq!(*img.get_pixel(1, y), FOREGROUND);
            assert_eq!(*img.get_pixel(9, y), FOREGROUND);
        }
    }

    #[test]
    fn test_to_gray_keeps_mask_levels() {
        let mut img = RgbImage::from_pixel(2, 1, Rgb([255, 255, 255]));
        img.put_pixel(1, 0, Rgb([0, 0, 0]));
        let gray = to_gray(&img);
        assert_eq!(gray.get_pixel(0, 0)[0], 255);
        assert_eq!(gray.get_pixel(1, 0)[0], 0);
    }
}
