//! Capture backends: two pixel-acquisition strategies behind one trait
//!
//! The modern backend takes a single ScreenCaptureKit snapshot and needs a
//! recent OS plus live screen-recording permission; the legacy backend asks
//! the compositor to render the one window matching the id. Neither backend
//! understands "titlebar": the orchestrator crops post-capture, uniformly.

mod legacy;
mod modern;

pub use legacy::LegacyBackend;
pub use modern::ModernBackend;

use image::RgbaImage;

use crate::locator::WindowGeometry;

/// Which pixel-acquisition strategy a capture uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// ScreenCaptureKit single-frame snapshot (macOS 14.0+).
    Modern,
    /// CGWindowList compositor capture (long-standing minimum OS).
    Legacy,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Modern => "screencapturekit",
            BackendKind::Legacy => "cgwindowlist",
        }
    }
}

/// Everything a backend needs to acquire pixels for one window.
#[derive(Debug, Clone)]
pub struct CaptureTarget {
    pub window_id: u32,
    pub geometry: WindowGeometry,
}

/// Backend-level failure taxonomy.
///
/// Native OS errors never pass through verbatim: each backend classifies into
/// this closed set, preserving the raw code/domain on the generic variant.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    #[error("window with id {id} not found")]
    WindowNotFound { id: u32 },
    #[error("window with id {id} is minimized")]
    WindowMinimized { id: u32 },
    #[error("screen recording permission not granted")]
    PermissionDenied,
    #[error("capture requires macOS {required} or newer")]
    UnsupportedVersion { required: &'static str },
    #[error("capture failed: {message}")]
    CaptureFailed {
        message: String,
        code: Option<i64>,
        domain: Option<String>,
    },
}

impl BackendError {
    pub fn capture_failed(message: impl Into<String>) -> Self {
        BackendError::CaptureFailed {
            message: message.into(),
            code: None,
            domain: None,
        }
    }
}

/// One pixel-acquisition strategy. Implementations are blocking; callers run
/// them on a worker context.
pub trait CaptureBackend {
    fn kind(&self) -> BackendKind;
    fn capture(&self, target: &CaptureTarget) -> Result<RgbaImage, BackendError>;
}

/// Collapse a native error's text and code into the backend taxonomy.
///
/// ScreenCaptureKit reports permission problems under many shapes across OS
/// releases; the description substrings and the well-known -3801 code cover
/// the ones observed so far. Everything unrecognized stays a generic capture
/// failure with the raw diagnostic attached.
pub(crate) fn classify_native_error(
    description: &str,
    code: Option<i64>,
    domain: Option<&str>,
) -> BackendError {
    let text = description.to_lowercase();
    let permissionish = text.contains("permission")
        || text.contains("denied")
        || text.contains("declined")
        || text.contains("not authorized")
        || code == Some(-3801);
    if permissionish {
        return BackendError::PermissionDenied;
    }

    if text.contains("unsupported") || text.contains("unavailable api") {
        return BackendError::UnsupportedVersion { required: "14.0" };
    }

    BackendError::CaptureFailed {
        message: description.to_string(),
        code,
        domain: domain.map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_permission_by_substring() {
        let err = classify_native_error("The user declined TCCs", None, None);
        assert!(matches!(err, BackendError::PermissionDenied));

        let err = classify_native_error("Screen recording Permission missing", None, None);
        assert!(matches!(err, BackendError::PermissionDenied));
    }

    #[test]
    fn test_classify_permission_by_code() {
        let err = classify_native_error(
            "stream failed",
            Some(-3801),
            Some("com.apple.ScreenCaptureKit.SCStreamErrorDomain"),
        );
        assert!(matches!(err, BackendError::PermissionDenied));
    }

    #[test]
    fn test_classify_unknown_preserves_diagnostics() {
        let err = classify_native_error("something odd", Some(-42), Some("SomeDomain"));
        match err {
            BackendError::CaptureFailed {
                message,
                code,
                domain,
            } => {
                assert_eq!(message, "something odd");
                assert_eq!(code, Some(-42));
                assert_eq!(domain.as_deref(), Some("SomeDomain"));
            }
            other => panic!("expected CaptureFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_backend_kind_strings() {
        assert_eq!(BackendKind::Modern.as_str(), "screencapturekit");
        assert_eq!(BackendKind::Legacy.as_str(), "cgwindowlist");
    }
}
