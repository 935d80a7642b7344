//! Pixel-space geometry for the stereo framebuffer.
//!
//! The composited frame is two eye viewports side by side:
//!
//! ```text
//! x = 0            eye_width          2 * eye_width
//! +----------------+------------------+
//! |   left eye     |    right eye     |
//! +----------------+------------------+
//! ```
//!
//! Overlay rectangles are expressed in eye-local coordinates; the right eye
//! is shifted by one eye width when drawn.

use serde::{Deserialize, Serialize};

/// Integer rectangle, origin top-left. Width and height may be non-positive
/// after clipping; such a rectangle is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    /// Rectangle at the origin covering `width` x `height`.
    pub fn sized(width: u32, height: u32) -> Self {
        Self::new(0, 0, width as i32, height as i32)
    }

    pub fn right(&self) -> i32 {
        self.x + self.w
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.h
    }

    /// Center using integer division, matching how zoom re-centers rects.
    pub fn center(&self) -> (i32, i32) {
        (self.x + self.w / 2, self.y + self.h / 2)
    }

    pub fn is_empty(&self) -> bool {
        self.w <= 0 || self.h <= 0
    }

    /// Translate by `(dx, dy)`.
    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.w, self.h)
    }

    /// Scale about the center with rounded dimensions.
    ///
    /// A scale of exactly 1 returns the rectangle unchanged.
    pub fn zoom_about_center(self, scale: f32) -> Self {
        if (scale - 1.0).abs() < f32::EPSILON {
            return self;
        }
        let (cx, cy) = self.center();
        let w = (self.w as f32 * scale).round() as i32;
        let h = (self.h as f32 * scale).round() as i32;
        Self::new(cx - w / 2, cy - h / 2, w, h)
    }

    /// True if `other` lies completely inside `self`.
    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// True if the two rectangles share at least one pixel.
    pub fn intersects(&self, other: &Rect) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }
}

/// Which half of the side-by-side frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eye {
    Left,
    Right,
}

/// Dimensions of one eye viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EyeLayout {
    pub eye_width: i32,
    pub eye_height: i32,
}

impl EyeLayout {
    pub fn new(eye_width: u32, eye_height: u32) -> Self {
        Self {
            eye_width: eye_width as i32,
            eye_height: eye_height as i32,
        }
    }

    /// Eye viewport in eye-local coordinates.
    pub fn viewport(&self) -> Rect {
        Rect::new(0, 0, self.eye_width, self.eye_height)
    }

    /// Horizontal origin of an eye inside the composited frame.
    pub fn eye_origin(&self, eye: Eye) -> i32 {
        match eye {
            Eye::Left => 0,
            Eye::Right => self.eye_width,
        }
    }

    /// Whole side-by-side frame.
    pub fn frame(&self) -> Rect {
        Rect::new(0, 0, self.eye_width * 2, self.eye_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_edges() {
        let r = Rect::new(10, 20, 30, 40);
        assert_eq!(r.right(), 40);
        assert_eq!(r.bottom(), 60);
        assert_eq!(r.center(), (25, 40));
        assert!(!r.is_empty());
        assert!(Rect::new(0, 0, 0, 5).is_empty());
        assert!(Rect::new(0, 0, 5, -1).is_empty());
    }

    #[test]
    fn test_zoom_identity() {
        let r = Rect::new(3, 4, 101, 57);
        assert_eq!(r.zoom_about_center(1.0), r);
    }

    #[test]
    fn test_zoom_about_center() {
        let r = Rect::new(100, 100, 100, 50);
        let z = r.zoom_about_center(2.0);
        assert_eq!(z, Rect::new(50, 75, 200, 100));
        assert_eq!(z.center(), r.center());

        // 2 - p at p = 0.5 rounds 75 * 1.5 = 112.5 up
        let odd = Rect::new(0, 0, 75, 75).zoom_about_center(1.5);
        assert_eq!(odd.w, 113);
    }

    #[test]
    fn test_contains_and_intersects() {
        let viewport = Rect::new(0, 0, 100, 100);
        assert!(viewport.contains_rect(&Rect::new(10, 10, 20, 20)));
        assert!(!viewport.contains_rect(&Rect::new(90, 10, 20, 20)));
        assert!(viewport.intersects(&Rect::new(90, 10, 20, 20)));
        assert!(!viewport.intersects(&Rect::new(100, 10, 20, 20)));
    }

    #[test]
    fn test_eye_layout() {
        let layout = EyeLayout::new(1440, 1440);
        assert_eq!(layout.eye_origin(Eye::Left), 0);
        assert_eq!(layout.eye_origin(Eye::Right), 1440);
        assert_eq!(layout.frame(), Rect::new(0, 0, 2880, 1440));
    }
}
