//! Window-registry primitives over the CGWindowList API
//!
//! The registry is the OS-maintained live list of all mapped windows
//! system-wide. Entries here are looked up fresh on every call; window ids
//! can be recycled after a window closes, so nothing is cached.

use core_foundation::base::{CFType, TCFType};
use core_foundation::dictionary::CFDictionaryRef;
use core_foundation::number::CFNumber;
use core_foundation::string::CFString;
use core_graphics::window::{kCGNullWindowID, kCGWindowListOptionAll, CGWindowListCopyWindowInfo};
use tracing::debug;

use crate::geometry::Rect;

/// A raw window-registry entry.
#[derive(Debug, Clone)]
pub struct RegistryWindow {
    pub id: u32,
    pub owner_pid: i32,
    pub frame: Rect,
    pub is_on_screen: bool,
    pub title: Option<String>,
    pub app_name: Option<String>,
}

/// Find the registry entry whose id equals `window_id`.
///
/// Enumerates with the all-windows option so minimized and other-desktop
/// windows are visible (the on-screen-only option would hide them). Returns
/// `None` when no entry matches; a closed or recycled id is a normal state.
pub fn find_window(window_id: u32) -> Option<RegistryWindow> {
    list_windows().into_iter().find(|w| w.id == window_id)
}

/// Enumerate every registry entry that carries a usable id, pid and bounds.
pub fn list_windows() -> Vec<RegistryWindow> {
    let mut windows = Vec::new();

    unsafe {
        let window_list = CGWindowListCopyWindowInfo(kCGWindowListOptionAll, kCGNullWindowID);
        if window_list.is_null() {
            debug!("CGWindowListCopyWindowInfo returned null");
            return windows;
        }

        let cf_array = core_foundation::array::CFArray::<CFType>::wrap_under_create_rule(
            window_list as core_foundation::array::CFArrayRef,
        );

        for i in 0..cf_array.len() {
            let Some(dict) = cf_array.get(i) else {
                continue;
            };
            let dict_ref = dict.as_CFTypeRef() as CFDictionaryRef;

            let id = match get_cf_number_value(dict_ref, "kCGWindowNumber") {
                Some(id) if id > 0 => id as u32,
                _ => continue,
            };
            let owner_pid = match get_cf_number_value(dict_ref, "kCGWindowOwnerPID") {
                Some(pid) if pid >= 0 => pid,
                _ => continue,
            };
            let Some(frame) = get_cf_bounds_value(dict_ref, "kCGWindowBounds") else {
                continue;
            };

            // kCGWindowIsOnscreen is absent for minimized / other-desktop windows
            let is_on_screen =
                get_cf_bool_value(dict_ref, "kCGWindowIsOnscreen").unwrap_or(false);

            let title = get_cf_string_value(dict_ref, "kCGWindowName").filter(|s| !s.is_empty());
            let app_name =
                get_cf_string_value(dict_ref, "kCGWindowOwnerName").filter(|s| !s.is_empty());

            windows.push(RegistryWindow {
                id,
                owner_pid,
                frame,
                is_on_screen,
                title,
                app_name,
            });
        }
    }

    windows
}

/// Get a string value from a CFDictionary
fn get_cf_string_value(dict: CFDictionaryRef, key: &str) -> Option<String> {
    unsafe {
        let cf_key = CFString::new(key);
        let mut value: *const std::ffi::c_void = std::ptr::null();

        let found = core_foundation::dictionary::CFDictionaryGetValueIfPresent(
            dict,
            cf_key.as_concrete_TypeRef() as *const _,
            &mut value,
        );
        if found != 0 && !value.is_null() {
            let cf_string =
                CFString::wrap_under_get_rule(value as core_foundation::string::CFStringRef);
            Some(cf_string.to_string())
        } else {
            None
        }
    }
}

/// Get a number value from a CFDictionary
fn get_cf_number_value(dict: CFDictionaryRef, key: &str) -> Option<i32> {
    unsafe {
        let cf_key = CFString::new(key);
        let mut value: *const std::ffi::c_void = std::ptr::null();

        let found = core_foundation::dictionary::CFDictionaryGetValueIfPresent(
            dict,
            cf_key.as_concrete_TypeRef() as *const _,
            &mut value,
        );
        if found != 0 && !value.is_null() {
            let cf_number =
                CFNumber::wrap_under_get_rule(value as core_foundation::number::CFNumberRef);
            cf_number.to_i32()
        } else {
            None
        }
    }
}

/// Get a boolean value from a CFDictionary
fn get_cf_bool_value(dict: CFDictionaryRef, key: &str) -> Option<bool> {
    unsafe {
        let cf_key = CFString::new(key);
        let mut value: *const std::ffi::c_void = std::ptr::null();

        let found = core_foundation::dictionary::CFDictionaryGetValueIfPresent(
            dict,
            cf_key.as_concrete_TypeRef() as *const _,
            &mut value,
        );
        if found != 0 && !value.is_null() {
            let cf_bool = core_foundation::boolean::CFBoolean::wrap_under_get_rule(
                value as core_foundation::boolean::CFBooleanRef,
            );
            Some(cf_bool.into())
        } else {
            None
        }
    }
}

/// Get an f64 value from a CFDictionary
fn get_cf_f64_value(dict: CFDictionaryRef, key: &str) -> Option<f64> {
    unsafe {
        let cf_key = CFString::new(key);
        let mut value: *const std::ffi::c_void = std::ptr::null();

        let found = core_foundation::dictionary::CFDictionaryGetValueIfPresent(
            dict,
            cf_key.as_concrete_TypeRef() as *const _,
            &mut value,
        );
        if found != 0 && !value.is_null() {
            let cf_number =
                CFNumber::wrap_under_get_rule(value as core_foundation::number::CFNumberRef);
            cf_number.to_f64()
        } else {
            None
        }
    }
}

/// Read a kCGWindowBounds-style nested dictionary ({X, Y, Width, Height}).
fn get_cf_bounds_value(dict: CFDictionaryRef, key: &str) -> Option<Rect> {
    unsafe {
        let cf_key = CFString::new(key);
        let mut value: *const std::ffi::c_void = std::ptr::null();

        let found = core_foundation::dictionary::CFDictionaryGetValueIfPresent(
            dict,
            cf_key.as_concrete_TypeRef() as *const _,
            &mut value,
        );
        if found == 0 || value.is_null() {
            return None;
        }

        let bounds = value as CFDictionaryRef;
        let x = get_cf_f64_value(bounds, "X")?;
        let y = get_cf_f64_value(bounds, "Y")?;
        let width = get_cf_f64_value(bounds, "Width")?;
        let height = get_cf_f64_value(bounds, "Height")?;
        Some(Rect::new(x, y, width, height))
    }
}
