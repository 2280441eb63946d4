//! Capability description and backend selection
//!
//! One value object computed per call describes what the running OS can do;
//! a pure function over it picks the backend. Version checks live here and
//! nowhere else.

use std::os::raw::{c_char, c_int, c_void};

use tracing::debug;

use crate::backend::BackendKind;

// SAFETY: FFI declarations for libSystem's sysctl and the CoreGraphics
// permission preflight. Both are safe to call with valid arguments and do
// not prompt the user.
extern "C" {
    fn sysctlbyname(
        name: *const c_char,
        oldp: *mut c_void,
        oldlenp: *mut usize,
        newp: *mut c_void,
        newlen: usize,
    ) -> c_int;
}

#[link(name = "CoreGraphics", kind = "framework")]
extern "C" {
    fn CGPreflightScreenCaptureAccess() -> bool;
}

/// Minimum macOS version for the ScreenCaptureKit snapshot API
/// (SCScreenshotManager, macOS 14.0+).
pub const MODERN_CAPTURE_MIN: OsVersion = OsVersion {
    major: 14,
    minor: 0,
};

/// Minimum macOS version for the shareable-content window list (12.3+).
pub const MODERN_LIST_MIN: OsVersion = OsVersion {
    major: 12,
    minor: 3,
};

/// A parsed macOS product version, ordered numerically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct OsVersion {
    pub major: u32,
    pub minor: u32,
}

impl OsVersion {
    /// Parse "14.5" / "14.5.1" / "26.0" style product version strings.
    pub fn parse(text: &str) -> Option<OsVersion> {
        let mut parts = text.trim().split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        Some(OsVersion { major, minor })
    }
}

/// The running kernel's product version string ("kern.osproductversion").
pub fn os_product_version() -> Option<String> {
    let name = b"kern.osproductversion\0";
    let mut buf = [0u8; 64];
    let mut len = buf.len();
    let rc = unsafe {
        sysctlbyname(
            name.as_ptr() as *const c_char,
            buf.as_mut_ptr() as *mut c_void,
            &mut len,
            std::ptr::null_mut(),
            0,
        )
    };
    if rc != 0 || len == 0 {
        return None;
    }
    // len includes the trailing NUL
    let end = buf[..len].iter().position(|&b| b == 0).unwrap_or(len);
    String::from_utf8(buf[..end].to_vec()).ok()
}

/// Live screen-recording permission, checked without prompting.
pub fn has_screen_recording_permission() -> bool {
    unsafe { CGPreflightScreenCaptureAccess() }
}

/// What the running system can do, computed fresh per capture call.
///
/// Callers use this to predict which backend a capture will choose without
/// performing one.
#[derive(Debug, Clone)]
pub struct CaptureCapability {
    pub os_version: OsVersion,
    pub os_version_string: String,
    /// ScreenCaptureKit snapshot API present on this OS.
    pub modern_available: bool,
    /// Live screen-recording permission at the time of the query.
    pub screen_recording: bool,
    /// Backend a capture with no override will attempt first.
    pub preferred_backend: BackendKind,
    /// Backend used for shareable-content window listing.
    pub window_list_backend: BackendKind,
}

impl CaptureCapability {
    /// Pure construction from observed facts; the version gate lives here.
    pub(crate) fn from_parts(
        os_version: OsVersion,
        os_version_string: String,
        screen_recording: bool,
    ) -> Self {
        let modern_available = os_version >= MODERN_CAPTURE_MIN;
        // Preference is version-gated only: a permission failure surfaces
        // from the modern attempt and falls back, it does not change which
        // backend is tried first.
        let preferred_backend = if modern_available {
            BackendKind::Modern
        } else {
            BackendKind::Legacy
        };
        let window_list_backend = if os_version >= MODERN_LIST_MIN && screen_recording {
            BackendKind::Modern
        } else {
            BackendKind::Legacy
        };
        Self {
            os_version,
            os_version_string,
            modern_available,
            screen_recording,
            preferred_backend,
            window_list_backend,
        }
    }
}

/// Describe the current capture capability of this system.
pub fn describe_capture_capability() -> CaptureCapability {
    let os_version_string = os_product_version().unwrap_or_default();
    let os_version =
        OsVersion::parse(&os_version_string).unwrap_or(OsVersion { major: 0, minor: 0 });
    let screen_recording = has_screen_recording_permission();
    let capability =
        CaptureCapability::from_parts(os_version, os_version_string, screen_recording);
    debug!(
        event = "capability.described",
        os = %capability.os_version_string,
        modern_available = capability.modern_available,
        screen_recording = capability.screen_recording,
        preferred = capability.preferred_backend.as_str()
    );
    capability
}

/// Deterministic backend selection over a capability and an optional caller
/// override. A forced modern backend on an OS without it degrades to legacy
/// rather than guaranteeing a version failure.
pub fn select_backend(
    capability: &CaptureCapability,
    forced: Option<BackendKind>,
) -> BackendKind {
    match forced {
        Some(BackendKind::Legacy) => BackendKind::Legacy,
        Some(BackendKind::Modern) if capability.modern_available => BackendKind::Modern,
        Some(BackendKind::Modern) => BackendKind::Legacy,
        None => capability.preferred_backend,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capability(major: u32, minor: u32, permission: bool) -> CaptureCapability {
        CaptureCapability::from_parts(
            OsVersion { major, minor },
            format!("{major}.{minor}"),
            permission,
        )
    }

    #[test]
    fn test_parse_versions() {
        assert_eq!(
            OsVersion::parse("14.5"),
            Some(OsVersion {
                major: 14,
                minor: 5
            })
        );
        assert_eq!(
            OsVersion::parse("14.5.1"),
            Some(OsVersion {
                major: 14,
                minor: 5
            })
        );
        assert_eq!(
            OsVersion::parse("26"),
            Some(OsVersion {
                major: 26,
                minor: 0
            })
        );
        assert_eq!(OsVersion::parse(""), None);
        assert_eq!(OsVersion::parse("beta"), None);
    }

    #[test]
    fn test_version_ordering() {
        let v12_3 = OsVersion {
            major: 12,
            minor: 3,
        };
        let v14_0 = OsVersion {
            major: 14,
            minor: 0,
        };
        assert!(v12_3 < v14_0);
        assert!(v14_0 >= MODERN_CAPTURE_MIN);
        assert!(v12_3 < MODERN_CAPTURE_MIN);
    }

    // Version/permission tuples and the backend the capture will attempt
    // first. Permission does not affect the first attempt, only whether that
    // attempt succeeds.
    #[test]
    fn test_selection_table() {
        let cases = [
            ((11, 0, true), BackendKind::Legacy),
            ((11, 0, false), BackendKind::Legacy),
            ((12, 3, true), BackendKind::Legacy),
            ((13, 6, true), BackendKind::Legacy),
            ((14, 0, true), BackendKind::Modern),
            ((14, 0, false), BackendKind::Modern),
            ((15, 2, false), BackendKind::Modern),
        ];
        for ((major, minor, permission), expected) in cases {
            let cap = capability(major, minor, permission);
            assert_eq!(
                select_backend(&cap, None),
                expected,
                "case {major}.{minor} permission={permission}"
            );
            assert_eq!(cap.preferred_backend, expected);
        }
    }

    #[test]
    fn test_forced_legacy_always_honored() {
        let cap = capability(15, 0, true);
        assert_eq!(
            select_backend(&cap, Some(BackendKind::Legacy)),
            BackendKind::Legacy
        );
    }

    #[test]
    fn test_forced_modern_degrades_below_minimum() {
        let cap = capability(12, 3, true);
        assert_eq!(
            select_backend(&cap, Some(BackendKind::Modern)),
            BackendKind::Legacy
        );
    }

    #[test]
    fn test_window_list_backend_needs_permission() {
        assert_eq!(
            capability(14, 0, false).window_list_backend,
            BackendKind::Legacy
        );
        assert_eq!(
            capability(14, 0, true).window_list_backend,
            BackendKind::Modern
        );
        assert_eq!(
            capability(12, 2, true).window_list_backend,
            BackendKind::Legacy
        );
    }

    #[test]
    fn test_describe_capture_capability_smoke() {
        // Values depend on the host; the call must not panic and must be
        // internally consistent
        let cap = describe_capture_capability();
        if cap.modern_available {
            assert_eq!(cap.preferred_backend, BackendKind::Modern);
        } else {
            assert_eq!(cap.preferred_backend, BackendKind::Legacy);
        }
    }
}
