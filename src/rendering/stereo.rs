//! Stereo projection of one overlay onto both eye viewports.
//!
//! Each eye is clipped independently. Whenever an edge of the destination
//! rectangle is trimmed, the matching edge of the source rectangle is
//! trimmed by the same amount scaled by `src / dest`, so stretched or
//! rotated overlays near an eye boundary never sample outside their source
//! region.

use super::canvas::Canvas;
use super::coord::{Eye, EyeLayout, Rect};
use super::texture::Texture;

/// One eye's clipped draw, `dest` in framebuffer coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EyeDraw {
    pub src: Rect,
    pub dest: Rect,
}

/// Result of clipping for both eyes. `None` means the eye draws nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StereoClip {
    pub left: Option<EyeDraw>,
    pub right: Option<EyeDraw>,
}

impl StereoClip {
    pub fn eye(&self, eye: Eye) -> Option<&EyeDraw> {
        match eye {
            Eye::Left => self.left.as_ref(),
            Eye::Right => self.right.as_ref(),
        }
    }
}

/// Source pixels to drop for `overage` destination pixels.
fn source_trim(src_len: i32, dest_len: i32, overage: i32) -> i32 {
    if dest_len <= 0 {
        return src_len;
    }
    let scale = src_len as f64 / dest_len as f64;
    ((scale * overage as f64).round() as i32).clamp(0, src_len.max(0))
}

/// Clip one destination rectangle against one viewport.
///
/// Both rectangles are in the same coordinate space. Returns `None` if
/// either rectangle ends up with a non-positive dimension.
pub fn clip_eye(src: Rect, dest: Rect, viewport: Rect) -> Option<EyeDraw> {
    let mut src = src;
    let mut dest = dest;

    if src.is_empty() || dest.is_empty() {
        return None;
    }

    // Left edge
    if dest.x < viewport.x {
        let overage = viewport.x - dest.x;
        let trim = source_trim(src.w, dest.w, overage);
        src.x += trim;
        src.w -= trim;
        dest.w -= overage;
        dest.x = viewport.x;
        if dest.w <= 0 {
            return None;
        }
    }

    // Right edge
    if dest.right() > viewport.right() {
        let overage = dest.right() - viewport.right();
        let trim = source_trim(src.w, dest.w, overage);
        src.w -= trim;
        dest.w -= overage;
        if dest.w <= 0 {
            return None;
        }
    }

    // Top edge
    if dest.y < viewport.y {
        let overage = viewport.y - dest.y;
        let trim = source_trim(src.h, dest.h, overage);
        src.y += trim;
        src.h -= trim;
        dest.h -= overage;
        dest.y = viewport.y;
        if dest.h <= 0 {
            return None;
        }
    }

    // Bottom edge
    if dest.bottom() > viewport.bottom() {
        let overage = dest.bottom() - viewport.bottom();
        let trim = source_trim(src.h, dest.h, overage);
        src.h -= trim;
        dest.h -= overage;
    }

    if src.is_empty() || dest.is_empty() {
        return None;
    }

    Some(EyeDraw { src, dest })
}

/// Clip a logical overlay rectangle for both eyes.
///
/// `dest_left` and `dest_right` are eye-local. A missing right rectangle
/// reuses the left one, i.e. the overlay lands at the same spot in both
/// eyes.
pub fn clip_stereo(
    src: Rect,
    dest_left: Rect,
    dest_right: Option<Rect>,
    layout: &EyeLayout,
) -> StereoClip {
    let dest_right = dest_right.unwrap_or(dest_left);
    let viewport = layout.viewport();

    let left = clip_eye(src, dest_left, viewport);
    let right_origin = layout.eye_origin(Eye::Right);
    let right = clip_eye(
        src,
        dest_right.offset(right_origin, 0),
        viewport.offset(right_origin, 0),
    );

    StereoClip { left, right }
}

/// Draw `texture` once per eye with independent clipping.
///
/// `src` defaults to the whole texture. A non-zero `angle` (degrees)
/// rotates each eye's draw about its clipped destination center. Returns
/// how many draw calls were issued.
pub fn project_stereo(
    canvas: &mut dyn Canvas,
    texture: &Texture,
    src: Option<Rect>,
    dest_left: Rect,
    dest_right: Option<Rect>,
    angle: f64,
    layout: &EyeLayout,
) -> usize {
    let src = src.unwrap_or_else(|| Rect::sized(texture.width(), texture.height()));
    let clip = clip_stereo(src, dest_left, dest_right, layout);

    let mut draws = 0;
    for draw in [clip.left, clip.right].into_iter().flatten() {
        if angle == 0.0 {
            canvas.copy(texture, draw.src, draw.dest);
        } else {
            canvas.copy_rotated(texture, draw.src, draw.dest, angle);
        }
        draws += 1;
    }

    if draws == 0 {
        log::trace!(
            "[STEREO] '{}' fully clipped at {:?}",
            texture.label(),
            dest_left
        );
    }

    draws
}

/// Stretch a camera image over one eye viewport.
///
/// `crop` selects a column range `(x, width)` of the image; rows are always
/// taken in full. The range is clamped to the image.
pub fn project_eye(
    canvas: &mut dyn Canvas,
    texture: &Texture,
    crop: Option<(u32, u32)>,
    eye: Eye,
    layout: &EyeLayout,
) {
    let (w, h) = (texture.width(), texture.height());
    let src = match crop {
        Some((x, width)) => {
            let x = x.min(w);
            Rect::new(x as i32, 0, width.min(w - x) as i32, h as i32)
        },
        None => Rect::sized(w, h),
    };
    if src.is_empty() {
        return;
    }
    let dest = layout.viewport().offset(layout.eye_origin(eye), 0);
    canvas.copy(texture, src, dest);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::canvas::tests::RecordingCanvas;

    fn layout() -> EyeLayout {
        EyeLayout::new(100, 80)
    }

    #[test]
    fn test_inside_viewport_is_identity() {
        let src = Rect::new(5, 5, 40, 20);
        let dest = Rect::new(10, 10, 40, 20);
        let clip = clip_stereo(src, dest, None, &layout());

        let left = clip.left.unwrap();
        assert_eq!(left.src, src);
        assert_eq!(left.dest, dest);

        let right = clip.right.unwrap();
        assert_eq!(right.src, src);
        assert_eq!(right.dest, dest.offset(100, 0));
    }

    #[test]
    fn test_left_edge_clip_scales_source() {
        // Source is twice the destination size, so 10 dest px = 20 src px.
        let src = Rect::new(0, 0, 80, 40);
        let dest = Rect::new(-10, 0, 40, 20);
        let draw = clip_eye(src, dest, Rect::new(0, 0, 100, 80)).unwrap();
        assert_eq!(draw.dest, Rect::new(0, 0, 30, 20));
        assert_eq!(draw.src, Rect::new(20, 0, 60, 40));
    }

    #[test]
    fn test_right_and_bottom_clip() {
        let src = Rect::new(0, 0, 50, 50);
        let dest = Rect::new(80, 70, 50, 50);
        let draw = clip_eye(src, dest, Rect::new(0, 0, 100, 80)).unwrap();
        assert_eq!(draw.dest, Rect::new(80, 70, 20, 10));
        assert_eq!(draw.src, Rect::new(0, 0, 20, 10));
    }

    #[test]
    fn test_top_clip_keeps_lower_source() {
        let src = Rect::new(0, 0, 10, 40);
        let dest = Rect::new(0, -20, 10, 40);
        let draw = clip_eye(src, dest, Rect::new(0, 0, 100, 80)).unwrap();
        assert_eq!(draw.dest, Rect::new(0, 0, 10, 20));
        assert_eq!(draw.src, Rect::new(0, 20, 10, 20));
    }

    #[test]
    fn test_fully_outside_is_skipped() {
        let src = Rect::new(0, 0, 10, 10);
        assert!(clip_eye(src, Rect::new(-20, 0, 10, 10), Rect::new(0, 0, 100, 80)).is_none());
        assert!(clip_eye(src, Rect::new(0, 90, 10, 10), Rect::new(0, 0, 100, 80)).is_none());
        assert!(clip_eye(src, Rect::new(0, 0, 0, 10), Rect::new(0, 0, 100, 80)).is_none());
    }

    #[test]
    fn test_straddling_eye_boundary_conserves_width() {
        let layout = layout();
        let src = Rect::new(0, 0, 63, 30);

        for x in [51, 60, 75, 99] {
            let dest_left = Rect::new(x, 10, 50, 30);
            // Same framebuffer position expressed in right-eye-local space
            let dest_right = dest_left.offset(-layout.eye_width, 0);
            let clip = clip_stereo(src, dest_left, Some(dest_right), &layout);

            let left = clip.left.unwrap();
            let right = clip.right.unwrap();
            assert_eq!(left.dest.w + right.dest.w, 50, "x = {}", x);
            assert_eq!(left.dest.right(), 100);
            assert_eq!(right.dest.x, 100);

            for draw in [left, right] {
                assert!(src.contains_rect(&draw.src), "{:?}", draw.src);
            }
            let src_total = left.src.w + right.src.w;
            assert!((src_total - src.w).abs() <= 1, "src total {}", src_total);
        }
    }

    #[test]
    fn test_right_eye_defaults_to_left_rect() {
        let layout = layout();
        let dest = Rect::new(90, 0, 20, 10);
        let clip = clip_stereo(Rect::new(0, 0, 20, 10), dest, None, &layout);
        assert_eq!(clip.eye(Eye::Left).unwrap().dest, Rect::new(90, 0, 10, 10));
        assert_eq!(clip.eye(Eye::Right).unwrap().dest, Rect::new(190, 0, 10, 10));
    }

    #[test]
    fn test_project_uses_rotation_only_when_needed() {
        let layout = layout();
        let tex = Texture::from_rgba(4, 4, vec![255; 64], "square");
        let mut canvas = RecordingCanvas::new(200, 80);

        let draws = project_stereo(&mut canvas, &tex, None, Rect::new(0, 0, 4, 4), None, 0.0, &layout);
        assert_eq!(draws, 2);
        assert!(canvas.calls.iter().all(|c| c.angle == 0.0));
        assert_eq!(canvas.calls[0].src, Rect::new(0, 0, 4, 4));

        canvas.calls.clear();
        project_stereo(&mut canvas, &tex, None, Rect::new(0, 0, 4, 4), None, 12.5, &layout);
        assert!(canvas.calls.iter().all(|c| c.angle == 12.5));
    }

    #[test]
    fn test_project_eye_fills_viewport() {
        let layout = layout();
        let tex = Texture::from_rgba(64, 48, vec![0; 64 * 48 * 4], "camera");
        let mut canvas = RecordingCanvas::new(200, 80);

        project_eye(&mut canvas, &tex, None, Eye::Left, &layout);
        project_eye(&mut canvas, &tex, Some((16, 100)), Eye::Right, &layout);
        assert_eq!(canvas.calls[0].src, Rect::new(0, 0, 64, 48));
        assert_eq!(canvas.calls[0].dest, Rect::new(0, 0, 100, 80));
        // Crop is clamped to the image width
        assert_eq!(canvas.calls[1].src, Rect::new(16, 0, 48, 48));
        assert_eq!(canvas.calls[1].dest, Rect::new(100, 0, 100, 80));
    }

    #[test]
    fn test_project_skips_offscreen_eye() {
        let layout = layout();
        let tex = Texture::from_rgba(4, 4, vec![255; 64], "square");
        let mut canvas = RecordingCanvas::new(200, 80);

        let draws = project_stereo(
            &mut canvas,
            &tex,
            None,
            Rect::new(10, 10, 4, 4),
            Some(Rect::new(-40, 10, 4, 4)),
            0.0,
            &layout,
        );
        assert_eq!(draws, 1);
        assert_eq!(canvas.calls[0].dest, Rect::new(10, 10, 4, 4));
    }
}
