//! Caller-facing outcome taxonomy
//!
//! Expected window states (not found, minimized, permission denied, ...) are
//! first-class values the caller branches on, not exceptions. Everything the
//! OS reports that does not fit the closed [`FailureReason`] enumeration is
//! surfaced as [`FailureReason::Unknown`] with the native diagnostic kept
//! verbatim.

use std::fmt;

/// Closed enumeration of capture failure reasons.
///
/// The set is stable across macOS releases: backend-native errors are always
/// classified into one of these before reaching a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    WindowNotFound,
    WindowMinimized,
    PermissionDenied,
    UnsupportedVersion,
    CaptureInProgress,
    WindowNotCapturable,
    Unknown,
}

impl FailureReason {
    /// Stable machine-readable code for RPC surfaces.
    pub fn code(&self) -> &'static str {
        match self {
            FailureReason::WindowNotFound => "WINDOW_NOT_FOUND",
            FailureReason::WindowMinimized => "WINDOW_MINIMIZED",
            FailureReason::PermissionDenied => "PERMISSION_DENIED",
            FailureReason::UnsupportedVersion => "UNSUPPORTED_VERSION",
            FailureReason::CaptureInProgress => "CAPTURE_IN_PROGRESS",
            FailureReason::WindowNotCapturable => "WINDOW_NOT_CAPTURABLE",
            FailureReason::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A classified capture failure.
///
/// `native_code`/`native_domain` carry the underlying OS diagnostic when one
/// exists; they are informational only and never required for branching.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{reason}: {message}")]
pub struct CaptureFailure {
    pub reason: FailureReason,
    pub message: String,
    pub native_code: Option<i64>,
    pub native_domain: Option<String>,
}

impl CaptureFailure {
    pub fn new(reason: FailureReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
            native_code: None,
            native_domain: None,
        }
    }

    pub fn with_native(mut self, code: Option<i64>, domain: Option<String>) -> Self {
        self.native_code = code;
        self.native_domain = domain;
        self
    }

    pub fn window_not_found(window_id: u32) -> Self {
        Self::new(
            FailureReason::WindowNotFound,
            format!("window with id {} not found", window_id),
        )
    }

    pub fn window_minimized(window_id: u32) -> Self {
        Self::new(
            FailureReason::WindowMinimized,
            format!("window with id {} is minimized", window_id),
        )
    }

    pub fn permission_denied() -> Self {
        Self::new(
            FailureReason::PermissionDenied,
            "screen recording permission not granted. Grant access in System Settings > \
             Privacy & Security > Screen Recording",
        )
    }

    pub fn unsupported_version(required: &str) -> Self {
        Self::new(
            FailureReason::UnsupportedVersion,
            format!("capture requires macOS {} or newer", required),
        )
    }

    pub fn not_capturable(window_id: u32, details: impl Into<String>) -> Self {
        Self::new(
            FailureReason::WindowNotCapturable,
            format!("window {} cannot be captured: {}", window_id, details.into()),
        )
    }

    pub fn unknown(details: impl Into<String>) -> Self {
        Self::new(FailureReason::Unknown, details)
    }
}

/// Outcome of a capture call: lossless PNG bytes or a classified failure.
pub type CaptureOutcome = Result<Vec<u8>, CaptureFailure>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_codes_are_stable() {
        assert_eq!(FailureReason::WindowNotFound.code(), "WINDOW_NOT_FOUND");
        assert_eq!(FailureReason::WindowMinimized.code(), "WINDOW_MINIMIZED");
        assert_eq!(FailureReason::PermissionDenied.code(), "PERMISSION_DENIED");
        assert_eq!(FailureReason::Unknown.code(), "UNKNOWN");
    }

    #[test]
    fn test_failure_display_includes_reason_and_message() {
        let f = CaptureFailure::window_not_found(42);
        let text = format!("{}", f);
        assert!(text.contains("WINDOW_NOT_FOUND"));
        assert!(text.contains("42"));
    }

    #[test]
    fn test_with_native_preserves_diagnostics() {
        let f = CaptureFailure::unknown("stream error")
            .with_native(Some(-3801), Some("com.apple.ScreenCaptureKit".into()));
        assert_eq!(f.native_code, Some(-3801));
        assert_eq!(f.native_domain.as_deref(), Some("com.apple.ScreenCaptureKit"));
        assert_eq!(f.reason, FailureReason::Unknown);
    }

    #[test]
    fn test_permission_denied_message_mentions_settings() {
        let f = CaptureFailure::permission_denied();
        assert!(f.message.contains("Screen Recording"));
    }
}
