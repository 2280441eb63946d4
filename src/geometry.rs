//! Rectangle math shared by the locator, content-bounds resolver and backends

/// A rectangle in screen coordinates (points, not pixels).
///
/// Origin is top-left in the window-registry coordinate space. Width and
/// height are kept non-negative by every operation on this type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width: width.max(0.0),
            height: height.max(0.0),
        }
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Equality within `epsilon` on all four fields.
    ///
    /// The window registry and the accessibility tree report the same window
    /// with sub-point rounding differences, so exact float equality is too
    /// strict for frame correlation.
    pub fn approx_eq(&self, other: &Rect, epsilon: f64) -> bool {
        (self.x - other.x).abs() <= epsilon
            && (self.y - other.y).abs() <= epsilon
            && (self.width - other.width).abs() <= epsilon
            && (self.height - other.height).abs() <= epsilon
    }

    /// Strip `points` from the top edge, clamping so height never goes negative.
    pub fn strip_top(&self, points: f64) -> Rect {
        let points = points.clamp(0.0, self.height);
        Rect::new(self.x, self.y + points, self.width, self.height - points)
    }

    pub fn contains_point(&self, px: f64, py: f64) -> bool {
        px >= self.x && py >= self.y && px < self.x + self.width && py < self.y + self.height
    }
}

/// A crop region in pixel space, clamped to the bounds of an image.
///
/// Guarantees `x < image_width`, `y < image_height` and non-zero width/height
/// whenever the source image itself is non-empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    /// Clamp an arbitrary requested region to `(image_width, image_height)`.
    ///
    /// Oversized width/height are reduced rather than rejected; an origin past
    /// the image edge is pulled back to the last valid row/column.
    pub fn clamped(
        x: i64,
        y: i64,
        width: u32,
        height: u32,
        image_width: u32,
        image_height: u32,
    ) -> Option<PixelRect> {
        if image_width == 0 || image_height == 0 {
            return None;
        }
        let x = x.clamp(0, image_width.saturating_sub(1) as i64) as u32;
        let y = y.clamp(0, image_height.saturating_sub(1) as i64) as u32;
        let width = width.min(image_width - x).max(1);
        let height = height.min(image_height - y).max(1);
        Some(PixelRect {
            x,
            y,
            width,
            height,
        })
    }

    /// A crop of `(width, height)` centered within `(image_width, image_height)`.
    pub fn centered(
        width: u32,
        height: u32,
        image_width: u32,
        image_height: u32,
    ) -> Option<PixelRect> {
        let width = width.min(image_width);
        let height = height.min(image_height);
        if width == 0 || height == 0 {
            return None;
        }
        Some(PixelRect {
            x: (image_width - width) / 2,
            y: (image_height - height) / 2,
            width,
            height,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_clamps_negative_dimensions() {
        let r = Rect::new(0.0, 0.0, -5.0, -1.0);
        assert_eq!(r.width, 0.0);
        assert_eq!(r.height, 0.0);
    }

    #[test]
    fn test_strip_top_normal() {
        let r = Rect::new(10.0, 20.0, 100.0, 200.0).strip_top(28.0);
        assert_eq!(r, Rect::new(10.0, 48.0, 100.0, 172.0));
    }

    #[test]
    fn test_strip_top_clamps_at_zero_height() {
        let r = Rect::new(0.0, 0.0, 100.0, 20.0).strip_top(28.0);
        assert_eq!(r.height, 0.0);
        assert_eq!(r.y, 20.0);
    }

    #[test]
    fn test_strip_top_ignores_negative_points() {
        let r = Rect::new(0.0, 0.0, 100.0, 50.0);
        assert_eq!(r.strip_top(-10.0), r);
    }

    #[test]
    fn test_approx_eq_tolerates_rounding() {
        let a = Rect::new(0.0, 0.0, 800.0, 600.0);
        let b = Rect::new(0.4, -0.4, 800.2, 599.8);
        assert!(a.approx_eq(&b, 1.0));
        assert!(!a.approx_eq(&b, 0.1));
    }

    #[test]
    fn test_pixel_rect_clamps_overflowing_width() {
        // x at the last column with an absurd width yields a 1px-wide crop
        let r = PixelRect::clamped(199, 0, 1000, 50, 200, 100).unwrap();
        assert_eq!(r.x, 199);
        assert_eq!(r.width, 1);
        assert_eq!(r.height, 50);
    }

    #[test]
    fn test_pixel_rect_clamps_negative_origin() {
        let r = PixelRect::clamped(-30, -30, 50, 50, 200, 100).unwrap();
        assert_eq!((r.x, r.y), (0, 0));
        assert_eq!((r.width, r.height), (50, 50));
    }

    #[test]
    fn test_pixel_rect_empty_image() {
        assert!(PixelRect::clamped(0, 0, 10, 10, 0, 0).is_none());
    }

    #[test]
    fn test_centered_crop() {
        let r = PixelRect::centered(100, 50, 400, 400).unwrap();
        assert_eq!((r.x, r.y), (150, 175));
        assert_eq!((r.width, r.height), (100, 50));
    }

    #[test]
    fn test_centered_crop_larger_than_image() {
        let r = PixelRect::centered(1000, 1000, 400, 300).unwrap();
        assert_eq!((r.x, r.y), (0, 0));
        assert_eq!((r.width, r.height), (400, 300));
    }
}
