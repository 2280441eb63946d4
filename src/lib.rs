//! # wincap
//!
//! macOS window capture core: locate a window by id, resolve its drawable
//! content bounds, capture its pixels and post-process the bitmap into a
//! lossless PNG.
//!
//! ## Architecture
//!
//! - [`locator`]: resolves a window id against the live window registry
//!   (frame, owning pid, on-screen/minimized state)
//! - [`content_bounds`]: computes the drawable area inside the frame from the
//!   owner's accessibility tree, with a fixed-titlebar fallback
//! - [`backend`]: two pixel-acquisition strategies behind one trait: a
//!   ScreenCaptureKit snapshot (macOS 14.0+, needs screen-recording
//!   permission) and a CGWindowList compositor capture
//! - [`capture`]: selects a backend from the described capability, falls back
//!   transparently, applies the crop/trim/resize pipeline and encodes PNG
//!
//! Expected window states (not found, minimized, permission denied, ...) are
//! values in a closed [`FailureReason`] enumeration, never panics or opaque
//! error strings.
//!
//! ## Example
//!
//! ```rust,no_run
//! # #[cfg(target_os = "macos")] {
//! use wincap::{capture_auto_sync, describe_capture_capability, CaptureRequest};
//!
//! let capability = describe_capture_capability();
//! println!("will use: {}", capability.preferred_backend.as_str());
//!
//! let request = CaptureRequest::new(42).exclude_titlebar(true);
//! match capture_auto_sync(request) {
//!     Ok(png_bytes) => std::fs::write("window.png", png_bytes).unwrap(),
//!     Err(failure) => eprintln!("capture failed: {}", failure),
//! }
//! # }
//! ```

#![cfg(target_os = "macos")]

pub mod accessibility;
pub mod backend;
pub mod capability;
pub mod capture;
pub mod content_bounds;
mod error;
pub mod geometry;
pub mod locator;
pub mod postprocess;
pub mod registry;

pub use backend::{BackendError, BackendKind, CaptureBackend, CaptureTarget};
pub use capability::{
    describe_capture_capability, has_screen_recording_permission, select_backend,
    CaptureCapability, OsVersion,
};
pub use capture::{capture_auto, capture_auto_sync, CaptureRequest, ContentCrop, RectCrop};
pub use error::{CaptureFailure, CaptureOutcome, FailureReason};
pub use geometry::Rect;
pub use locator::{LocateError, WindowGeometry};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_is_pure_query() {
        // Describing capability never captures and never panics
        let a = describe_capture_capability();
        let b = describe_capture_capability();
        assert_eq!(a.preferred_backend, b.preferred_backend);
        assert_eq!(a.os_version, b.os_version);
    }
}
