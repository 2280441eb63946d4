//! Accessibility-tree primitives
//!
//! Thin safe wrappers over the AXUIElement API, used to infer window state
//! (minimized flag) and content geometry that the window registry does not
//! expose. Everything here is best-effort: attribute reads return `Option`
//! and a denied permission surfaces as an error value, never a panic.

use std::ffi::c_void;

use accessibility_sys::{
    kAXChildrenAttribute, kAXErrorSuccess, kAXMinimizedAttribute, kAXPositionAttribute,
    kAXSizeAttribute, kAXTitleAttribute, kAXValueTypeCGPoint, kAXValueTypeCGSize,
    kAXWindowsAttribute, AXIsProcessTrusted, AXUIElementCopyAttributeValue,
    AXUIElementCreateApplication, AXUIElementGetTypeID, AXUIElementRef, AXValueGetValue,
    AXValueRef,
};
use core_foundation::array::CFArray;
use core_foundation::base::{CFGetTypeID, CFType, CFTypeRef, TCFType};
use core_foundation::boolean::{CFBoolean, CFBooleanRef};
use core_foundation::string::{CFString, CFStringRef};
use core_graphics::geometry::{CGPoint, CGSize};
use tracing::debug;

use crate::geometry::Rect;

/// The window's main content element ("AXContents"); not exposed as a named
/// constant by every accessibility-sys release, so spelled out here.
const AX_CONTENTS_ATTRIBUTE: &str = "AXContents";

/// Errors from accessibility queries.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AxError {
    #[error("process is not trusted for accessibility access")]
    NotTrusted,
    #[error("accessibility attribute query failed (AXError {code})")]
    ApiError { code: i32 },
}

/// Check whether this process holds accessibility trust.
pub fn is_process_trusted() -> bool {
    unsafe { AXIsProcessTrusted() }
}

/// A top-level accessibility window of some process.
///
/// Holds a retained AXUIElement; released when dropped via the CFType wrapper.
pub struct AxWindow {
    element: CFType,
}

impl AxWindow {
    fn element_ref(&self) -> AXUIElementRef {
        self.element.as_CFTypeRef() as AXUIElementRef
    }

    /// The window's frame in screen points, when both position and size are readable.
    pub fn frame(&self) -> Option<Rect> {
        element_frame(self.element_ref())
    }

    pub fn title(&self) -> Option<String> {
        let value = copy_attribute(self.element_ref(), kAXTitleAttribute)?;
        if value.instance_of::<CFString>() {
            let s = unsafe { CFString::wrap_under_get_rule(value.as_CFTypeRef() as CFStringRef) };
            Some(s.to_string())
        } else {
            None
        }
    }

    /// The AXMinimized attribute, when readable.
    pub fn minimized(&self) -> Option<bool> {
        let value = copy_attribute(self.element_ref(), kAXMinimizedAttribute)?;
        if value.instance_of::<CFBoolean>() {
            let b = unsafe { CFBoolean::wrap_under_get_rule(value.as_CFTypeRef() as CFBooleanRef) };
            Some(b.into())
        } else {
            None
        }
    }

    /// Frame of the window's main content element (AXContents), when exposed.
    ///
    /// AXContents is an array of elements in some toolkits and a single
    /// element in others; the first entry wins in the array case.
    pub fn content_frame(&self) -> Option<Rect> {
        let value = copy_attribute(self.element_ref(), AX_CONTENTS_ATTRIBUTE)?;
        if value.instance_of::<CFArray<CFType>>() {
            let array = unsafe {
                CFArray::<CFType>::wrap_under_get_rule(
                    value.as_CFTypeRef() as core_foundation::array::CFArrayRef
                )
            };
            let first = array.get(0)?;
            element_frame(ax_element_ref(&first)?)
        } else {
            element_frame(ax_element_ref(&value)?)
        }
    }

    /// Frames of the window's immediate accessibility children.
    pub fn children_frames(&self) -> Vec<Rect> {
        let Some(value) = copy_attribute(self.element_ref(), kAXChildrenAttribute) else {
            return Vec::new();
        };
        if !value.instance_of::<CFArray<CFType>>() {
            return Vec::new();
        }
        let array = unsafe {
            CFArray::<CFType>::wrap_under_get_rule(
                value.as_CFTypeRef() as core_foundation::array::CFArrayRef
            )
        };
        let mut frames = Vec::new();
        for i in 0..array.len() {
            if let Some(child) = array.get(i) {
                if let Some(frame) = ax_element_ref(&child).and_then(element_frame) {
                    frames.push(frame);
                }
            }
        }
        frames
    }
}

/// Top-level accessibility windows of `pid`.
///
/// Fails when the process is not accessibility-trusted or the application
/// element rejects the AXWindows query (sandboxed or exiting processes do).
pub fn windows_for_pid(pid: i32) -> Result<Vec<AxWindow>, AxError> {
    if !is_process_trusted() {
        return Err(AxError::NotTrusted);
    }

    unsafe {
        let app = AXUIElementCreateApplication(pid);
        if app.is_null() {
            return Err(AxError::ApiError { code: -1 });
        }
        // Transfer ownership so the app element is released on all paths
        let app_element = CFType::wrap_under_create_rule(app as CFTypeRef);

        let attr = CFString::new(kAXWindowsAttribute);
        let mut value: CFTypeRef = std::ptr::null();
        let err = AXUIElementCopyAttributeValue(
            app_element.as_CFTypeRef() as AXUIElementRef,
            attr.as_concrete_TypeRef(),
            &mut value,
        );
        if err != kAXErrorSuccess || value.is_null() {
            debug!(
                event = "accessibility.windows_query_failed",
                pid = pid,
                ax_error = err
            );
            return Err(AxError::ApiError { code: err });
        }

        let value = CFType::wrap_under_create_rule(value);
        if !value.instance_of::<CFArray<CFType>>() {
            return Err(AxError::ApiError { code: -2 });
        }
        let array = CFArray::<CFType>::wrap_under_get_rule(
            value.as_CFTypeRef() as core_foundation::array::CFArrayRef
        );
        let mut windows = Vec::with_capacity(array.len() as usize);
        for i in 0..array.len() {
            if let Some(elem) = array.get(i) {
                windows.push(AxWindow {
                    // Retain past the array's lifetime
                    element: CFType::wrap_under_get_rule(elem.as_CFTypeRef()),
                });
            }
        }
        Ok(windows)
    }
}

/// View a CF value as an AXUIElement only when its type id matches.
///
/// Attribute values are untyped at the CF level; a toolkit may hand back a
/// string or dictionary where an element is expected, and a mistyped ref must
/// degrade to `None` rather than reach the AX API.
fn ax_element_ref(value: &CFType) -> Option<AXUIElementRef> {
    let is_element = unsafe { CFGetTypeID(value.as_CFTypeRef()) == AXUIElementGetTypeID() };
    if is_element {
        Some(value.as_CFTypeRef() as AXUIElementRef)
    } else {
        None
    }
}

/// Read an element's AXPosition + AXSize as a screen-point rect.
fn element_frame(element: AXUIElementRef) -> Option<Rect> {
    let position = copy_attribute(element, kAXPositionAttribute)?;
    let size = copy_attribute(element, kAXSizeAttribute)?;

    let mut point = CGPoint::new(0.0, 0.0);
    let ok = unsafe {
        AXValueGetValue(
            position.as_CFTypeRef() as AXValueRef,
            kAXValueTypeCGPoint,
            &mut point as *mut CGPoint as *mut c_void,
        )
    };
    if !ok {
        return None;
    }

    let mut cg_size = CGSize::new(0.0, 0.0);
    let ok = unsafe {
        AXValueGetValue(
            size.as_CFTypeRef() as AXValueRef,
            kAXValueTypeCGSize,
            &mut cg_size as *mut CGSize as *mut c_void,
        )
    };
    if !ok {
        return None;
    }

    Some(Rect::new(point.x, point.y, cg_size.width, cg_size.height))
}

/// Copy one attribute value, transferring ownership into a CFType.
fn copy_attribute(element: AXUIElementRef, name: &str) -> Option<CFType> {
    unsafe {
        let attr = CFString::new(name);
        let mut value: CFTypeRef = std::ptr::null();
        let err = AXUIElementCopyAttributeValue(element, attr.as_concrete_TypeRef(), &mut value);
        if err == kAXErrorSuccess && !value.is_null() {
            Some(CFType::wrap_under_create_rule(value))
        } else {
            None
        }
    }
}
