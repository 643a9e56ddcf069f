//! Cropping captured frames to the chart's bounding box

use crate::ChartError;
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::path::Path;

/// Element position and size as reported by the rendering engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElementBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ElementBox {
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }
}

/// Region of interest in frame pixel coordinates (right/bottom exclusive)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CropRect {
    pub left: i64,
    pub top: i64,
    pub right: i64,
    pub bottom: i64,
}

impl CropRect {
    pub fn new(left: i64, top: i64, right: i64, bottom: i64) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Rectangle covering the whole of `image`
    pub fn full(image: &DynamicImage) -> Self {
        let (width, height) = image.dimensions();
        Self::new(0, 0, width as i64, height as i64)
    }

    pub fn from_element_box(element: &ElementBox) -> Self {
        Self::new(
            element.x.round() as i64,
            element.y.round() as i64,
            element.right().round() as i64,
            element.bottom().round() as i64,
        )
    }

    pub fn width(&self) -> i64 {
        self.right - self.left
    }

    pub fn height(&self) -> i64 {
        self.bottom - self.top
    }
}

impl std::fmt::Display for CropRect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {})-({}, {})",
            self.left, self.top, self.right, self.bottom
        )
    }
}

/// Crop `image` to `rect` without any scaling
pub fn crop(image: &DynamicImage, rect: CropRect) -> Result<DynamicImage, ChartError> {
    let (frame_width, frame_height) = image.dimensions();

    if rect.width() <= 0 || rect.height() <= 0 {
        return Err(ChartError::InvalidRect(format!(
            "{rect} has no area"
        )));
    }

    if rect.left < 0
        || rect.top < 0
        || rect.right > frame_width as i64
        || rect.bottom > frame_height as i64
    {
        return Err(ChartError::InvalidRect(format!(
            "{rect} exceeds {frame_width}x{frame_height} frame"
        )));
    }

    Ok(image.crop_imm(
        rect.left as u32,
        rect.top as u32,
        rect.width() as u32,
        rect.height() as u32,
    ))
}

/// Decode a PNG capture, crop it and write the result to `dest`
pub fn crop_png(png: &[u8], rect: CropRect, dest: &Path) -> Result<(u32, u32), ChartError> {
    let frame = image::load_from_memory_with_format(png, ImageFormat::Png)
        .map_err(|e| ChartError::Render(format!("undecodable capture: {e}")))?;

    let cropped = crop(&frame, rect)?;
    cropped
        .save_with_format(dest, ImageFormat::Png)
        .map_err(|e| ChartError::Io(format!("{}: {e}", dest.display())))?;

    Ok(cropped.dimensions())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
            Rgba([x as u8, y as u8, (x + y) as u8, 255])
        }))
    }

    #[test]
    fn test_crop_keeps_pixels_in_place() {
        let frame = gradient(64, 48);
        let cropped = crop(&frame, CropRect::new(10, 5, 30, 25)).unwrap();

        assert_eq!(cropped.dimensions(), (20, 20));
        assert_eq!(cropped.get_pixel(0, 0), Rgba([10, 5, 15, 255]));
        assert_eq!(cropped.get_pixel(19, 19), Rgba([29, 24, 53, 255]));
    }

    #[test]
    fn test_crop_is_idempotent_on_full_extent() {
        let frame = gradient(40, 30);
        let once = crop(&frame, CropRect::new(4, 3, 36, 27)).unwrap();
        let twice = crop(&once, CropRect::full(&once)).unwrap();

        assert_eq!(once.dimensions(), twice.dimensions());
        assert_eq!(once.to_rgba8().into_raw(), twice.to_rgba8().into_raw());
    }

    #[test]
    fn test_degenerate_rects_are_rejected() {
        let frame = gradient(16, 16);
        for rect in [
            CropRect::new(5, 5, 5, 10),
            CropRect::new(5, 5, 10, 5),
            CropRect::new(8, 8, 2, 12),
        ] {
            assert!(matches!(crop(&frame, rect), Err(ChartError::InvalidRect(_))));
        }
    }

    #[test]
    fn test_out_of_frame_rects_are_rejected() {
        let frame = gradient(16, 16);
        for rect in [
            CropRect::new(-1, 0, 8, 8),
            CropRect::new(0, 0, 17, 8),
            CropRect::new(0, 0, 8, 17),
        ] {
            assert!(matches!(crop(&frame, rect), Err(ChartError::InvalidRect(_))));
        }
        assert!(crop(&frame, CropRect::new(0, 0, 16, 16)).is_ok());
    }

    #[test]
    fn test_rect_from_element_box_rounds() {
        let rect = CropRect::from_element_box(&ElementBox {
            x: 8.4,
            y: 7.6,
            width: 100.2,
            height: 50.0,
        });
        assert_eq!(rect, CropRect::new(8, 8, 109, 58));
    }

    #[test]
    fn test_crop_png_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.png");

        let mut png = Vec::new();
        gradient(32, 32)
            .write_to(&mut std::io::Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();

        let dims = crop_png(&png, CropRect::new(2, 2, 12, 22), &dest).unwrap();
        assert_eq!(dims, (10, 20));
        assert_eq!(image::open(&dest).unwrap().dimensions(), (10, 20));
    }

    #[test]
    fn test_crop_png_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let err = crop_png(b"not a png", CropRect::new(0, 0, 1, 1), &dir.path().join("x.png"))
            .unwrap_err();
        assert!(matches!(err, ChartError::Render(_)));
    }
}
