//! Legacy backend: compositor capture of a single window via CGWindowList
//!
//! Works on any supported macOS and without the ScreenCaptureKit entitlement
//! checks, at the cost of CPU-side compositing. The compositor renders
//! exactly the window matching the id at best resolution.

use core_graphics::geometry::{CGPoint, CGRect, CGSize};
use core_graphics::window::{
    create_image, kCGWindowImageBestResolution, kCGWindowImageBoundsIgnoreFraming,
    kCGWindowImageDefault, kCGWindowListOptionIncludingWindow,
};
use image::RgbaImage;
use tracing::debug;

use super::{BackendError, BackendKind, CaptureBackend, CaptureTarget};

/// CGWindowList compositor backend.
#[derive(Debug, Clone, Default)]
pub struct LegacyBackend {
    /// Ask the compositor to drop the window's framing (shadow/decoration)
    /// instead of cropping it out afterwards.
    pub ignore_framing: bool,
}

impl CaptureBackend for LegacyBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Legacy
    }

    fn capture(&self, target: &CaptureTarget) -> Result<RgbaImage, BackendError> {
        // CGRectNull: let the compositor size the image to the window itself
        let bounds = CGRect::new(
            &CGPoint::new(f64::INFINITY, f64::INFINITY),
            &CGSize::new(0.0, 0.0),
        );
        let mut image_option = kCGWindowImageBestResolution;
        if self.ignore_framing {
            image_option |= kCGWindowImageBoundsIgnoreFraming;
        } else {
            image_option |= kCGWindowImageDefault;
        }

        let cg_image = create_image(
            bounds,
            kCGWindowListOptionIncludingWindow,
            target.window_id,
            image_option,
        )
        .ok_or(BackendError::WindowNotFound {
            id: target.window_id,
        })?;

        let width = cg_image.width() as u32;
        let height = cg_image.height() as u32;
        if width == 0 || height == 0 {
            return Err(BackendError::capture_failed(
                "compositor returned an empty image",
            ));
        }

        debug!(
            event = "backend.legacy.captured",
            window_id = target.window_id,
            width = width,
            height = height
        );

        cg_image_to_rgba(&cg_image)
    }
}

/// Convert a BGRA CGImage (row-padded) into a tightly-packed RgbaImage.
fn cg_image_to_rgba(cg_image: &core_graphics::image::CGImage) -> Result<RgbaImage, BackendError> {
    let width = cg_image.width() as usize;
    let height = cg_image.height() as usize;
    let bytes_per_row = cg_image.bytes_per_row() as usize;
    let bits_per_pixel = cg_image.bits_per_pixel() as usize;

    if bits_per_pixel != 32 {
        return Err(BackendError::capture_failed(format!(
            "unexpected pixel depth: {} bits per pixel",
            bits_per_pixel
        )));
    }

    let data = cg_image.data();
    let pixels = data.bytes();
    if pixels.len() < bytes_per_row * height {
        return Err(BackendError::capture_failed(
            "compositor image data shorter than expected",
        ));
    }

    let mut buffer = Vec::with_capacity(width * height * 4);
    for row in 0..height {
        let row_start = row * bytes_per_row;
        for col in 0..width {
            let pixel_start = row_start + col * 4;
            // BGRA to RGBA conversion
            buffer.push(pixels[pixel_start + 2]); // R
            buffer.push(pixels[pixel_start + 1]); // G
            buffer.push(pixels[pixel_start]); // B
            buffer.push(pixels[pixel_start + 3]); // A
        }
    }

    RgbaImage::from_raw(width as u32, height as u32, buffer)
        .ok_or_else(|| BackendError::capture_failed("failed to build image from compositor data"))
}
