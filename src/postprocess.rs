//! Post-processing pipeline applied to raw backend bitmaps
//!
//! Fixed order: titlebar crop, transparent-border trim, optional restore to
//! the pre-trim size, one of two crop modes, final resize, PNG encode.
//! Everything here is pure over `RgbaImage` and shared by both backends.

use std::io::Cursor;

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

use crate::geometry::PixelRect;

/// Result of the transparent-border trim.
pub struct TrimResult {
    pub image: RgbaImage,
    /// Whether any rows/columns were removed.
    pub trimmed: bool,
}

/// Crop `pixels` rows from the top of the image (titlebar exclusion).
///
/// Always leaves at least one row so downstream steps never see a
/// zero-height image.
pub fn crop_top(image: &RgbaImage, pixels: u32) -> RgbaImage {
    let pixels = pixels.min(image.height().saturating_sub(1));
    if pixels == 0 {
        return image.clone();
    }
    imageops::crop_imm(image, 0, pixels, image.width(), image.height() - pixels).to_image()
}

/// Trim contiguous fully-transparent rows/columns from all four edges.
///
/// A row or column counts as transparent only when every pixel's alpha is
/// exactly zero. Backends hand over RGBA, so the no-alpha-channel case does
/// not arise; a fully opaque image is a no-op, and so is a fully transparent
/// one (trimming it to nothing would be worse than returning it unchanged).
/// Idempotent: a second pass removes nothing.
pub fn trim_transparent_border(image: &RgbaImage) -> TrimResult {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return TrimResult {
            image: image.clone(),
            trimmed: false,
        };
    }

    let row_transparent = |y: u32| (0..width).all(|x| image.get_pixel(x, y)[3] == 0);
    let col_transparent = |x: u32| (0..height).all(|y| image.get_pixel(x, y)[3] == 0);

    let mut top = 0;
    while top < height && row_transparent(top) {
        top += 1;
    }
    if top == height {
        // Entire image transparent: no-op, not an error
        return TrimResult {
            image: image.clone(),
            trimmed: false,
        };
    }

    let mut bottom = height;
    while bottom > top && row_transparent(bottom - 1) {
        bottom -= 1;
    }
    let mut left = 0;
    while left < width && col_transparent(left) {
        left += 1;
    }
    let mut right = width;
    while right > left && col_transparent(right - 1) {
        right -= 1;
    }

    if top == 0 && left == 0 && bottom == height && right == width {
        return TrimResult {
            image: image.clone(),
            trimmed: false,
        };
    }

    let trimmed = imageops::crop_imm(image, left, top, right - left, bottom - top).to_image();
    TrimResult {
        image: trimmed,
        trimmed: true,
    }
}

/// Exact (possibly distorting) high-quality resize.
pub fn resize_exact(image: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    imageops::resize(image, width.max(1), height.max(1), FilterType::Lanczos3)
}

/// Aspect-preserving resize centered on an opaque black canvas of exactly
/// `(width, height)`.
pub fn resize_aspect_centered(image: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    let width = width.max(1);
    let height = height.max(1);
    let (src_w, src_h) = image.dimensions();

    let scale = f64::min(width as f64 / src_w as f64, height as f64 / src_h as f64);
    let fit_w = ((src_w as f64 * scale).round() as u32).clamp(1, width);
    let fit_h = ((src_h as f64 * scale).round() as u32).clamp(1, height);
    let scaled = imageops::resize(image, fit_w, fit_h, FilterType::Lanczos3);

    let mut canvas = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255]));
    let x = i64::from((width - fit_w) / 2);
    let y = i64::from((height - fit_h) / 2);
    imageops::overlay(&mut canvas, &scaled, x, y);
    canvas
}

/// Crop to a pixel rect already clamped to the image bounds.
pub fn crop_rect(image: &RgbaImage, rect: PixelRect) -> RgbaImage {
    imageops::crop_imm(image, rect.x, rect.y, rect.width, rect.height).to_image()
}

/// Encode as lossless PNG.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, image::ImageError> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)?;
    Ok(bytes)
}
