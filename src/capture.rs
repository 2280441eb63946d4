//! Capture Orchestrator: backend selection, fallback, post-processing
//!
//! Each capture call is a self-contained asynchronous unit of work: window
//! lookup, accessibility queries and pixel acquisition are blocking OS calls
//! and run off the caller's context. Concurrent captures of different
//! windows run fully in parallel; overlapping captures of the same window id
//! are permitted and simply perform redundant work. There is no cancellation
//! or internal timeout: callers needing one race the returned future against
//! a timer.

use image::RgbaImage;
use once_cell::sync::Lazy;
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use crate::backend::{
    BackendError, BackendKind, CaptureBackend, CaptureTarget, LegacyBackend, ModernBackend,
};
use crate::capability;
use crate::content_bounds;
use crate::error::{CaptureFailure, CaptureOutcome};
use crate::geometry::PixelRect;
use crate::locator::{self, LocateError, WindowGeometry};
use crate::postprocess;

/// Global tokio runtime for blocking on async operations (only used when not in an existing runtime)
static RUNTIME: Lazy<Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to create tokio runtime")
});

/// Run an async operation synchronously using the global runtime
///
/// Note: This must be called from outside a tokio runtime context.
/// For use within async code, use the async capture functions directly.
pub fn block_on<F: std::future::Future>(f: F) -> F::Output {
    RUNTIME.block_on(f)
}

/// Run a sync closure in a separate thread to avoid nested runtime issues
pub fn run_in_thread<F, T>(f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    std::thread::spawn(f).join().expect("Thread panicked")
}

/// Centered crop to an exact content size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentCrop {
    pub width: u32,
    pub height: u32,
}

/// Explicit rectangle crop; coordinates are clamped to the image bounds and
/// oversized extents are reduced rather than rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RectCrop {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Configuration for one capture call.
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub window_id: u32,
    pub exclude_titlebar: bool,
    /// Titlebar height override in points; defaults to the resolved content
    /// bounds (or the 28pt fallback) when unset.
    pub custom_titlebar_height: Option<f64>,
    pub target_width: Option<u32>,
    pub target_height: Option<u32>,
    pub preserve_aspect_ratio: bool,
    /// Mutually exclusive with `rect_crop`.
    pub content_crop: Option<ContentCrop>,
    /// Mutually exclusive with `content_crop`.
    pub rect_crop: Option<RectCrop>,
    /// Resize a border-trimmed image back to its pre-trim size.
    pub resize_cropped_to_original_size: bool,
    /// Caller override of the backend selection policy.
    pub forced_backend: Option<BackendKind>,
}

impl CaptureRequest {
    pub fn new(window_id: u32) -> Self {
        Self {
            window_id,
            exclude_titlebar: false,
            custom_titlebar_height: None,
            target_width: None,
            target_height: None,
            preserve_aspect_ratio: false,
            content_crop: None,
            rect_crop: None,
            resize_cropped_to_original_size: true,
            forced_backend: None,
        }
    }

    pub fn exclude_titlebar(mut self, exclude: bool) -> Self {
        self.exclude_titlebar = exclude;
        self
    }

    pub fn custom_titlebar_height(mut self, points: f64) -> Self {
        self.custom_titlebar_height = Some(points);
        self
    }

    pub fn target_size(mut self, width: u32, height: u32) -> Self {
        self.target_width = Some(width);
        self.target_height = Some(height);
        self
    }

    pub fn preserve_aspect_ratio(mut self, preserve: bool) -> Self {
        self.preserve_aspect_ratio = preserve;
        self
    }

    pub fn content_crop(mut self, width: u32, height: u32) -> Self {
        self.content_crop = Some(ContentCrop { width, height });
        self
    }

    pub fn rect_crop(mut self, x: i32, y: i32, width: u32, height: u32) -> Self {
        self.rect_crop = Some(RectCrop {
            x,
            y,
            width,
            height,
        });
        self
    }

    pub fn resize_cropped_to_original_size(mut self, resize: bool) -> Self {
        self.resize_cropped_to_original_size = resize;
        self
    }

    pub fn forced_backend(mut self, backend: BackendKind) -> Self {
        self.forced_backend = Some(backend);
        self
    }

    fn validate(&self) -> Result<(), CaptureFailure> {
        if self.content_crop.is_some() && self.rect_crop.is_some() {
            return Err(CaptureFailure::unknown(
                "content_crop and rect_crop are mutually exclusive",
            ));
        }
        Ok(())
    }
}

/// Capture a window, selecting the backend automatically.
///
/// Expected window states come back as classified failures the caller
/// branches on; only the returned future's execution happens off the calling
/// context, never on it.
pub async fn capture_auto(request: CaptureRequest) -> CaptureOutcome {
    request.validate()?;
    let window_id = request.window_id;
    info!(event = "capture.started", window_id = window_id);

    let outcome = tokio::task::spawn_blocking(move || capture_blocking(&request))
        .await
        .unwrap_or_else(|e| {
            Err(CaptureFailure::unknown(format!(
                "capture task failed: {e}"
            )))
        });

    match &outcome {
        Ok(bytes) => info!(
            event = "capture.completed",
            window_id = window_id,
            png_bytes = bytes.len()
        ),
        Err(failure) => info!(
            event = "capture.failed",
            window_id = window_id,
            reason = failure.reason.code(),
            message = %failure.message
        ),
    }
    outcome
}

/// Synchronous wrapper around [`capture_auto`].
pub fn capture_auto_sync(request: CaptureRequest) -> CaptureOutcome {
    // If we're in a tokio runtime, run in a separate thread to avoid nested runtime panic
    if tokio::runtime::Handle::try_current().is_ok() {
        run_in_thread(move || block_on(capture_auto(request)))
    } else {
        block_on(capture_auto(request))
    }
}

/// The blocking body of a capture call: locate, resolve bounds, acquire,
/// post-process.
fn capture_blocking(request: &CaptureRequest) -> CaptureOutcome {
    let geometry = match locator::locate(request.window_id) {
        Ok(geometry) => geometry,
        Err(LocateError::NotFound { id }) => {
            return Err(CaptureFailure::window_not_found(id));
        }
    };

    let fullscreen = content_bounds::is_fullscreen(&geometry.frame);
    let titlebar_points = titlebar_height_points(request, &geometry, fullscreen);

    let capability = capability::describe_capture_capability();
    let selected = capability::select_backend(&capability, request.forced_backend);
    debug!(
        event = "capture.backend_selected",
        window_id = request.window_id,
        backend = selected.as_str(),
        titlebar_points = titlebar_points
    );

    let modern = ModernBackend;
    let legacy = LegacyBackend::default();
    let modern_ref: Option<&dyn CaptureBackend> = match selected {
        BackendKind::Modern => Some(&modern),
        BackendKind::Legacy => None,
    };

    run_capture(modern_ref, &legacy, &geometry, titlebar_points, request)
}

/// Titlebar height in points for the post-capture crop.
///
/// Fullscreen windows have none. Otherwise a caller override wins, falling
/// back to the resolved content bounds (which degrade to the fixed 28pt rule
/// when no accessibility data is obtainable), clamped to the frame height.
fn titlebar_height_points(
    request: &CaptureRequest,
    geometry: &WindowGeometry,
    fullscreen: bool,
) -> f64 {
    if !request.exclude_titlebar {
        return 0.0;
    }
    if fullscreen {
        return 0.0;
    }
    let resolved = match request.custom_titlebar_height {
        Some(points) => points,
        None => {
            let content = content_bounds::resolve(request.window_id, &geometry.frame);
            content.y - geometry.frame.y
        }
    };
    resolved.clamp(0.0, geometry.frame.height)
}

/// Backend invocation with the fallback policy, then post-processing.
///
/// A minimized window reported by the modern backend propagates immediately:
/// minimization is a window state, not a capability gap, and the legacy
/// backend would silently capture it anyway, hiding the state from the
/// caller. Every other modern failure falls back to legacy transparently.
fn run_capture(
    modern: Option<&dyn CaptureBackend>,
    legacy: &dyn CaptureBackend,
    geometry: &WindowGeometry,
    titlebar_points: f64,
    request: &CaptureRequest,
) -> CaptureOutcome {
    let target = CaptureTarget {
        window_id: request.window_id,
        geometry: geometry.clone(),
    };

    let raw = match modern {
        Some(backend) => match backend.capture(&target) {
            Ok(image) => image,
            Err(BackendError::WindowMinimized { id }) => {
                return Err(CaptureFailure::window_minimized(id));
            }
            Err(e) => {
                warn!(
                    event = "capture.modern_fallback",
                    window_id = request.window_id,
                    error = %e
                );
                legacy
                    .capture(&target)
                    .map_err(|e| map_backend_error(e, request.window_id))?
            }
        },
        None => legacy
            .capture(&target)
            .map_err(|e| map_backend_error(e, request.window_id))?,
    };

    post_process(raw, geometry, titlebar_points, request)
}

/// Mandatory classification of backend failures into the caller taxonomy.
fn map_backend_error(error: BackendError, window_id: u32) -> CaptureFailure {
    match error {
        BackendError::WindowNotFound { id } => CaptureFailure::window_not_found(id),
        BackendError::WindowMinimized { id } => CaptureFailure::window_minimized(id),
        BackendError::PermissionDenied => CaptureFailure::permission_denied(),
        BackendError::UnsupportedVersion { required } => {
            CaptureFailure::unsupported_version(required)
        }
        BackendError::CaptureFailed {
            message,
            code,
            domain,
        } => {
            warn!(
                event = "capture.backend_error_unclassified",
                window_id = window_id,
                message = %message
            );
            CaptureFailure::unknown(message).with_native(code, domain)
        }
    }
}

/// Fixed-order post-processing pipeline over the raw backend bitmap.
fn post_process(
    raw: RgbaImage,
    geometry: &WindowGeometry,
    titlebar_points: f64,
    request: &CaptureRequest,
) -> CaptureOutcome {
    // Backends deliver pixels; the titlebar is measured in points
    let scale = if geometry.frame.width > 0.0 {
        raw.width() as f64 / geometry.frame.width
    } else {
        1.0
    };
    let titlebar_px = (titlebar_points * scale).round().max(0.0) as u32;

    let mut image = postprocess::crop_top(&raw, titlebar_px);

    let pre_trim = image.dimensions();
    let trim = postprocess::trim_transparent_border(&image);
    image = trim.image;
    if trim.trimmed && request.resize_cropped_to_original_size {
        image = postprocess::resize_exact(&image, pre_trim.0, pre_trim.1);
    }

    if let Some(crop) = request.content_crop {
        if let Some(rect) =
            PixelRect::centered(crop.width, crop.height, image.width(), image.height())
        {
            image = postprocess::crop_rect(&image, rect);
        }
    } else if let Some(crop) = request.rect_crop {
        if let Some(rect) = PixelRect::clamped(
            i64::from(crop.x),
            i64::from(crop.y),
            crop.width,
            crop.height,
            image.width(),
            image.height(),
        ) {
            image = postprocess::crop_rect(&image, rect);
        }
    }

    image = match (request.target_width, request.target_height) {
        (Some(width), Some(height)) if request.preserve_aspect_ratio => {
            postprocess::resize_aspect_centered(&image, width, height)
        }
        (Some(width), Some(height)) => postprocess::resize_exact(&image, width, height),
        (Some(width), None) => {
            let height = scaled_dimension(image.height(), image.width(), width);
            postprocess::resize_exact(&image, width, height)
        }
        (None, Some(height)) => {
            let width = scaled_dimension(image.width(), image.height(), height);
            postprocess::resize_exact(&image, width, height)
        }
        (None, None) => image,
    };

    postprocess::encode_png(&image)
        .map_err(|e| CaptureFailure::unknown(format!("PNG encoding failed: {e}")))
}

/// Proportional counterpart of a single-axis resize.
fn scaled_dimension(other: u32, axis: u32, target_axis: u32) -> u32 {
    if axis == 0 {
        return other.max(1);
    }
    ((other as f64 * target_axis as f64 / axis as f64).round() as u32).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;
    use image::Rgba;
    use std::cell::Cell;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

    fn geometry(width: f64, height: f64) -> WindowGeometry {
        WindowGeometry {
            frame: Rect::new(0.0, 0.0, width, height),
            owner_pid: 1,
            is_on_screen: true,
            is_minimized: false,
            title: Some("Test".to_string()),
        }
    }

    /// A backend returning a fixed result and counting invocations.
    struct FakeBackend {
        kind: BackendKind,
        result: Result<(u32, u32), BackendError>,
        calls: Cell<u32>,
    }

    impl FakeBackend {
        fn ok(kind: BackendKind, width: u32, height: u32) -> Self {
            Self {
                kind,
                result: Ok((width, height)),
                calls: Cell::new(0),
            }
        }

        fn err(kind: BackendKind, error: BackendError) -> Self {
            Self {
                kind,
                result: Err(error),
                calls: Cell::new(0),
            }
        }
    }

    impl CaptureBackend for FakeBackend {
        fn kind(&self) -> BackendKind {
            self.kind
        }

        fn capture(&self, _target: &CaptureTarget) -> Result<RgbaImage, BackendError> {
            self.calls.set(self.calls.get() + 1);
            match &self.result {
                Ok((w, h)) => Ok(RgbaImage::from_pixel(*w, *h, RED)),
                Err(e) => Err(e.clone()),
            }
        }
    }

    fn decode(outcome: &CaptureOutcome) -> (u32, u32) {
        let bytes = outcome.as_ref().expect("expected success");
        let img = image::load_from_memory(bytes).expect("decode png");
        (img.width(), img.height())
    }

    #[test]
    fn test_minimized_short_circuits_without_legacy_attempt() {
        let modern = FakeBackend::err(
            BackendKind::Modern,
            BackendError::WindowMinimized { id: 9 },
        );
        let legacy = FakeBackend::ok(BackendKind::Legacy, 100, 100);
        let request = CaptureRequest::new(9);

        let outcome = run_capture(Some(&modern), &legacy, &geometry(100.0, 100.0), 0.0, &request);

        let failure = outcome.unwrap_err();
        assert_eq!(failure.reason.code(), "WINDOW_MINIMIZED");
        assert_eq!(legacy.calls.get(), 0, "legacy must not be attempted");
    }

    #[test]
    fn test_permission_failure_falls_back_to_legacy() {
        let modern = FakeBackend::err(BackendKind::Modern, BackendError::PermissionDenied);
        let legacy = FakeBackend::ok(BackendKind::Legacy, 64, 64);
        let request = CaptureRequest::new(1);

        let outcome = run_capture(Some(&modern), &legacy, &geometry(64.0, 64.0), 0.0, &request);

        assert_eq!(decode(&outcome), (64, 64));
        assert_eq!(modern.calls.get(), 1);
        assert_eq!(legacy.calls.get(), 1);
    }

    #[test]
    fn test_generic_modern_failure_falls_back() {
        let modern = FakeBackend::err(
            BackendKind::Modern,
            BackendError::capture_failed("stream error"),
        );
        let legacy = FakeBackend::ok(BackendKind::Legacy, 32, 32);
        let request = CaptureRequest::new(1);

        let outcome = run_capture(Some(&modern), &legacy, &geometry(32.0, 32.0), 0.0, &request);
        assert!(outcome.is_ok());
        assert_eq!(legacy.calls.get(), 1);
    }

    #[test]
    fn test_legacy_only_when_modern_unselected() {
        let legacy = FakeBackend::ok(BackendKind::Legacy, 20, 20);
        let request = CaptureRequest::new(1);

        let outcome = run_capture(None, &legacy, &geometry(20.0, 20.0), 0.0, &request);
        assert!(outcome.is_ok());
        assert_eq!(legacy.calls.get(), 1);
    }

    #[test]
    fn test_both_backends_failing_maps_last_error() {
        let modern = FakeBackend::err(BackendKind::Modern, BackendError::PermissionDenied);
        let legacy = FakeBackend::err(
            BackendKind::Legacy,
            BackendError::WindowNotFound { id: 5 },
        );
        let request = CaptureRequest::new(5);

        let outcome = run_capture(Some(&modern), &legacy, &geometry(10.0, 10.0), 0.0, &request);
        assert_eq!(outcome.unwrap_err().reason.code(), "WINDOW_NOT_FOUND");
    }

    #[test]
    fn test_fullscreen_titlebar_crop_removes_nothing() {
        // titlebar_points = 0 (fullscreen): output height equals capture height
        let legacy = FakeBackend::ok(BackendKind::Legacy, 100, 80);
        let request = CaptureRequest::new(1).exclude_titlebar(true);

        let outcome = run_capture(None, &legacy, &geometry(100.0, 80.0), 0.0, &request);
        assert_eq!(decode(&outcome), (100, 80));
    }

    #[test]
    fn test_titlebar_crop_scales_points_to_pixels() {
        // 2x scale: a 100x80pt window captured at 200x160px loses 56px for a
        // 28pt titlebar
        let legacy = FakeBackend::ok(BackendKind::Legacy, 200, 160);
        let request = CaptureRequest::new(1).exclude_titlebar(true);

        let outcome = run_capture(None, &legacy, &geometry(100.0, 80.0), 28.0, &request);
        assert_eq!(decode(&outcome), (200, 104));
    }

    #[test]
    fn test_rect_crop_clamps_to_image() {
        let legacy = FakeBackend::ok(BackendKind::Legacy, 200, 100);
        let request = CaptureRequest::new(1).rect_crop(199, 0, 1000, 100);

        let outcome = run_capture(None, &legacy, &geometry(200.0, 100.0), 0.0, &request);
        assert_eq!(decode(&outcome), (1, 100));
    }

    #[test]
    fn test_content_crop_is_centered() {
        let legacy = FakeBackend::ok(BackendKind::Legacy, 400, 400);
        let request = CaptureRequest::new(1).content_crop(100, 50);

        let outcome = run_capture(None, &legacy, &geometry(400.0, 400.0), 0.0, &request);
        assert_eq!(decode(&outcome), (100, 50));
    }

    #[test]
    fn test_aspect_preserving_resize_letterboxes() {
        let legacy = FakeBackend::ok(BackendKind::Legacy, 400, 400);
        let request = CaptureRequest::new(1)
            .target_size(100, 50)
            .preserve_aspect_ratio(true);

        let outcome = run_capture(None, &legacy, &geometry(400.0, 400.0), 0.0, &request);
        assert_eq!(decode(&outcome), (100, 50));
    }

    #[test]
    fn test_exact_resize_distorts() {
        let legacy = FakeBackend::ok(BackendKind::Legacy, 400, 400);
        let request = CaptureRequest::new(1).target_size(100, 50);

        let outcome = run_capture(None, &legacy, &geometry(400.0, 400.0), 0.0, &request);
        assert_eq!(decode(&outcome), (100, 50));
    }

    #[test]
    fn test_single_axis_resize_keeps_aspect() {
        let legacy = FakeBackend::ok(BackendKind::Legacy, 400, 200);
        let mut request = CaptureRequest::new(1);
        request.target_width = Some(100);

        let outcome = run_capture(None, &legacy, &geometry(400.0, 200.0), 0.0, &request);
        assert_eq!(decode(&outcome), (100, 50));
    }

    #[test]
    fn test_mutually_exclusive_crops_rejected() {
        let request = CaptureRequest::new(1)
            .content_crop(10, 10)
            .rect_crop(0, 0, 10, 10);
        let err = request.validate().unwrap_err();
        assert_eq!(err.reason.code(), "UNKNOWN");
        assert!(err.message.contains("mutually exclusive"));
    }

    #[test]
    fn test_request_defaults() {
        let request = CaptureRequest::new(3);
        assert!(!request.exclude_titlebar);
        assert!(request.resize_cropped_to_original_size);
        assert!(request.forced_backend.is_none());
        assert!(request.validate().is_ok());
    }

    #[tokio::test]
    async fn test_capture_auto_unknown_window() {
        let outcome = capture_auto(CaptureRequest::new(u32::MAX)).await;
        assert_eq!(outcome.unwrap_err().reason.code(), "WINDOW_NOT_FOUND");
    }

    #[test]
    fn test_capture_auto_sync_unknown_window() {
        let outcome = capture_auto_sync(CaptureRequest::new(u32::MAX));
        assert_eq!(outcome.unwrap_err().reason.code(), "WINDOW_NOT_FOUND");
    }

    #[test]
    fn test_titlebar_height_points_rules() {
        let geometry = geometry(800.0, 600.0);
        // not excluding: always zero
        let req = CaptureRequest::new(1);
        assert_eq!(titlebar_height_points(&req, &geometry, false), 0.0);
        // fullscreen: zero even when excluding
        let req = CaptureRequest::new(1).exclude_titlebar(true);
        assert_eq!(titlebar_height_points(&req, &geometry, true), 0.0);
        // custom override wins and is clamped to the frame height
        let req = CaptureRequest::new(1)
            .exclude_titlebar(true)
            .custom_titlebar_height(40.0);
        assert_eq!(titlebar_height_points(&req, &geometry, false), 40.0);
        let req = CaptureRequest::new(1)
            .exclude_titlebar(true)
            .custom_titlebar_height(10_000.0);
        assert_eq!(titlebar_height_points(&req, &geometry, false), 600.0);
        let req = CaptureRequest::new(1)
            .exclude_titlebar(true)
            .custom_titlebar_height(-5.0);
        assert_eq!(titlebar_height_points(&req, &geometry, false), 0.0);
    }
}
