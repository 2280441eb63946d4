//! Modern backend: single ScreenCaptureKit snapshot via cidre
//!
//! Requires macOS 14.0+ (SCScreenshotManager) and live screen-recording
//! permission. The display containing the window is captured at native pixel
//! resolution with the cursor excluded, then cropped to the window's pixel
//! rect; capturing the display and cropping works reliably for all window
//! types. A minimized window is rejected up front: snapshotting it produces
//! undefined or blank pixels, so that state surfaces as its own error.

use cidre::{cv, ns, sc};
use image::RgbaImage;
use tracing::debug;

use super::{classify_native_error, BackendError, BackendKind, CaptureBackend, CaptureTarget};
use crate::capability;
use crate::capture::{block_on, run_in_thread};

/// ScreenCaptureKit snapshot backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModernBackend;

impl CaptureBackend for ModernBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Modern
    }

    fn capture(&self, target: &CaptureTarget) -> Result<RgbaImage, BackendError> {
        if target.geometry.is_minimized {
            return Err(BackendError::WindowMinimized {
                id: target.window_id,
            });
        }
        if !capability::has_screen_recording_permission() {
            return Err(BackendError::PermissionDenied);
        }

        let target = target.clone();
        // Avoid a nested-runtime panic when the caller is already inside tokio
        if tokio::runtime::Handle::try_current().is_ok() {
            run_in_thread(move || block_on(capture_async(target)))
        } else {
            block_on(capture_async(target))
        }
    }
}

async fn capture_async(target: CaptureTarget) -> Result<RgbaImage, BackendError> {
    let content = sc::ShareableContent::current()
        .await
        .map_err(|e| classify_native_error(&format!("{:?}", e), None, None))?;

    // Match the target window by identifier within the snapshot
    let windows = content.windows();
    let window = windows
        .iter()
        .find(|w| w.id() == target.window_id)
        .ok_or(BackendError::WindowNotFound {
            id: target.window_id,
        })?;

    let window_frame = window.frame();
    let window_x = window_frame.origin.x;
    let window_y = window_frame.origin.y;
    let window_width = window_frame.size.width;
    let window_height = window_frame.size.height;

    // Find the display that contains this window
    let displays = content.displays();
    let display = displays
        .iter()
        .find(|d| {
            let display_frame = d.frame();
            window_x >= display_frame.origin.x
                && window_y >= display_frame.origin.y
                && window_x < display_frame.origin.x + display_frame.size.width
                && window_y < display_frame.origin.y + display_frame.size.height
        })
        .or_else(|| displays.first())
        .ok_or_else(|| BackendError::capture_failed("no display found for window"))?;

    let display_frame = display.frame();
    let display_width = display.width() as u32;
    let display_height = display.height() as u32;

    debug!(
        event = "backend.modern.display",
        window_id = target.window_id,
        display_px_width = display_width,
        display_px_height = display_height
    );

    // Capture the whole display at native pixel resolution, cursor excluded
    let empty_windows = ns::Array::new();
    let filter = sc::ContentFilter::with_display_excluding_windows(&display, &empty_windows);

    let mut cfg = sc::StreamCfg::new();
    cfg.set_width(display_width as usize);
    cfg.set_height(display_height as usize);
    cfg.set_pixel_format(cv::PixelFormat::_32_BGRA);
    cfg.set_shows_cursor(false);
    cfg.set_scales_to_fit(false);

    let sample_buf = sc::ScreenshotManager::capture_sample_buf(&filter, &cfg)
        .await
        .map_err(|e| classify_native_error(&format!("{:?}", e), None, None))?;

    let mut image_buf = sample_buf
        .image_buf()
        .ok_or_else(|| BackendError::capture_failed("no image buffer in snapshot sample"))?
        .retained();

    let full_image = image_buf_to_rgba(&mut image_buf)?;

    // Points-to-pixels scale of the captured display (2.0 on Retina)
    let scale = if display_frame.size.width > 0.0 {
        full_image.width() as f64 / display_frame.size.width
    } else {
        1.0
    };

    let crop_x = ((window_x - display_frame.origin.x) * scale).round().max(0.0) as u32;
    let crop_y = ((window_y - display_frame.origin.y) * scale).round().max(0.0) as u32;
    let crop_x = crop_x.min(full_image.width().saturating_sub(1));
    let crop_y = crop_y.min(full_image.height().saturating_sub(1));
    let crop_width =
        ((window_width * scale).round() as u32).min(full_image.width().saturating_sub(crop_x));
    let crop_height =
        ((window_height * scale).round() as u32).min(full_image.height().saturating_sub(crop_y));

    if crop_width == 0 || crop_height == 0 {
        return Err(BackendError::capture_failed(
            "window rect does not intersect the captured display",
        ));
    }

    debug!(
        event = "backend.modern.crop",
        window_id = target.window_id,
        x = crop_x,
        y = crop_y,
        width = crop_width,
        height = crop_height
    );

    let cropped = image::imageops::crop_imm(&full_image, crop_x, crop_y, crop_width, crop_height);
    Ok(cropped.to_image())
}

// FFI bindings for non-planar pixel buffer functions (not exposed by cidre)
extern "C" {
    fn CVPixelBufferGetBytesPerRow(pixelBuffer: *const std::ffi::c_void) -> usize;
    fn CVPixelBufferGetBaseAddress(pixelBuffer: *const std::ffi::c_void) -> *const u8;
}

/// Extract an RGBA image from a cv::ImageBuf (pixel buffer)
fn image_buf_to_rgba(image_buf: &mut cv::ImageBuf) -> Result<RgbaImage, BackendError> {
    // Get all metadata BEFORE locking
    let width = image_buf.width();
    let height = image_buf.height();
    let plane_count = image_buf.plane_count();

    let lock_flags = cv::pixel_buffer::LockFlags::READ_ONLY;
    let lock_result = unsafe { image_buf.lock_base_addr(lock_flags) };
    if lock_result.is_err() {
        return Err(BackendError::capture_failed(format!(
            "failed to lock pixel buffer: {:?}",
            lock_result
        )));
    }

    // Non-planar buffers (plane_count == 0) use the non-plane accessors
    let (bytes_per_row, pixels_ptr) = if plane_count == 0 {
        let bpr = unsafe {
            CVPixelBufferGetBytesPerRow(image_buf as *const _ as *const std::ffi::c_void)
        };
        let ptr = unsafe {
            CVPixelBufferGetBaseAddress(image_buf as *const _ as *const std::ffi::c_void)
        };
        (bpr, ptr)
    } else {
        (
            image_buf.plane_bytes_per_row(0),
            image_buf.plane_base_address(0),
        )
    };

    let result = if pixels_ptr.is_null() {
        Err(BackendError::capture_failed(
            "pixel buffer base address is null",
        ))
    } else {
        let data_size = bytes_per_row * height;
        let pixels = unsafe { std::slice::from_raw_parts(pixels_ptr, data_size) };

        // Copy and convert BGRA to RGBA
        let mut buffer = Vec::with_capacity(width * height * 4);
        for row in 0..height {
            let row_start = row * bytes_per_row;
            for col in 0..width {
                let pixel_start = row_start + col * 4;
                if pixel_start + 3 < pixels.len() {
                    buffer.push(pixels[pixel_start + 2]); // R
                    buffer.push(pixels[pixel_start + 1]); // G
                    buffer.push(pixels[pixel_start]); // B
                    buffer.push(pixels[pixel_start + 3]); // A
                }
            }
        }

        RgbaImage::from_raw(width as u32, height as u32, buffer)
            .ok_or_else(|| BackendError::capture_failed("failed to build image from pixel buffer"))
    };

    let unlock_result = unsafe { image_buf.unlock_lock_base_addr(lock_flags) };
    if unlock_result.is_err() {
        debug!(
            event = "backend.modern.unlock_failed",
            detail = format!("{:?}", unlock_result)
        );
    }

    result
}
