//! Content-Bounds Resolver: the drawable area within a window's frame
//!
//! Resolution order, first success wins: fullscreen detection against the
//! connected displays, the matched accessibility window's AXContents frame,
//! the largest immediate accessibility child, and finally a fixed-titlebar
//! fallback. Some non-degenerate rectangle is always returned.

use core_graphics::display::CGDisplay;
use tracing::debug;

use crate::accessibility;
use crate::geometry::Rect;
use crate::locator;
use crate::registry;

/// Standard macOS titlebar height in points, used when no accessibility data
/// is obtainable.
pub const DEFAULT_TITLEBAR_HEIGHT: f64 = 28.0;

/// Tolerance for matching a frame against a display's full bounds.
const FULLSCREEN_EPSILON: f64 = 0.5;

/// Compute the drawable content rectangle for `window_id` with frame `frame`.
pub fn resolve(window_id: u32, frame: &Rect) -> Rect {
    // Fullscreen windows have no titlebar: content bounds equal the frame
    if is_fullscreen(frame) {
        debug!(event = "content_bounds.fullscreen", window_id = window_id);
        return *frame;
    }

    match resolve_via_accessibility(window_id, frame) {
        Some(content) => clamp_to_frame(&content, frame),
        None => {
            debug!(
                event = "content_bounds.fallback",
                window_id = window_id,
                titlebar = DEFAULT_TITLEBAR_HEIGHT
            );
            fallback(frame)
        }
    }
}

/// True when `frame` equals the full bounds of any connected display.
pub fn is_fullscreen(frame: &Rect) -> bool {
    let display_ids = match CGDisplay::active_displays() {
        Ok(ids) => ids,
        Err(_) => return false,
    };
    display_ids.into_iter().any(|id| {
        let bounds = CGDisplay::new(id).bounds();
        let display_frame = Rect::new(
            bounds.origin.x,
            bounds.origin.y,
            bounds.size.width,
            bounds.size.height,
        );
        frame.approx_eq(&display_frame, FULLSCREEN_EPSILON)
    })
}

/// Steps 2-4: correlate the registry entry with the owner's AX windows, then
/// read AXContents directly or take the largest immediate child.
fn resolve_via_accessibility(window_id: u32, frame: &Rect) -> Option<Rect> {
    let entry = registry::find_window(window_id)?;
    let ax_windows = match accessibility::windows_for_pid(entry.owner_pid) {
        Ok(windows) => windows,
        Err(e) => {
            debug!(
                event = "content_bounds.ax_unavailable",
                window_id = window_id,
                error = %e
            );
            return None;
        }
    };

    let window = locator::correlate(&ax_windows, frame, entry.title.as_deref())?;

    if let Some(content) = window.content_frame() {
        debug!(event = "content_bounds.from_contents", window_id = window_id);
        return Some(content);
    }

    let child = largest_child_frame(&window.children_frames())?;
    debug!(event = "content_bounds.from_largest_child", window_id = window_id);
    Some(child)
}

/// The single largest child frame by area; ties keep the first enumerated.
///
/// The main content view is normally the largest leaf container. The
/// heuristic can mis-identify content in unusual layouts, and the
/// first-enumerated tie-break is a deliberate stable rule, not a guess about
/// which equal-area sibling is "really" the content.
pub(crate) fn largest_child_frame(frames: &[Rect]) -> Option<Rect> {
    let mut best: Option<Rect> = None;
    for frame in frames {
        match best {
            Some(current) if frame.area() <= current.area() => {}
            _ => best = Some(*frame),
        }
    }
    best
}

/// Fixed-titlebar fallback: frame with 28 points stripped from the top,
/// clamped so height never goes negative.
pub(crate) fn fallback(frame: &Rect) -> Rect {
    frame.strip_top(DEFAULT_TITLEBAR_HEIGHT)
}

/// Keep accessibility-reported content inside the registry frame.
fn clamp_to_frame(content: &Rect, frame: &Rect) -> Rect {
    let x = content.x.max(frame.x);
    let y = content.y.max(frame.y);
    let right = (content.x + content.width).min(frame.x + frame.width);
    let bottom = (content.y + content.height).min(frame.y + frame.height);
    if right <= x || bottom <= y {
        return fallback(frame);
    }
    Rect::new(x, y, right - x, bottom - y)
}
