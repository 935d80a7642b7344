//! Draw target abstraction.
//!
//! The render thread composes every frame through [`Canvas`]. Two backends
//! exist: [`SoftwareCanvas`] (CPU, used headless and in tests) and
//! `GpuCanvas` (wgpu). Texture alpha modulation is read at draw time.

use super::coord::Rect;
use super::texture::Texture;
use crate::error::{HudError, HudResult};
use crate::output::readback::{PixelReadback, RowOrder, READBACK_SLOTS};

/// A side-by-side stereo framebuffer that textures are copied into.
pub trait Canvas {
    /// Framebuffer size in pixels (both eyes).
    fn size(&self) -> (u32, u32);

    /// Fill the whole framebuffer.
    fn clear(&mut self, rgba: [u8; 4]);

    /// Copy `src` of `texture` into `dest`, scaling as needed.
    fn copy(&mut self, texture: &Texture, src: Rect, dest: Rect);

    /// Like [`Canvas::copy`], rotated clockwise by `angle` degrees about the
    /// center of `dest`.
    fn copy_rotated(&mut self, texture: &Texture, src: Rect, dest: Rect, angle: f64);

    /// Hand everything drawn this tick to the backend.
    fn present(&mut self) -> HudResult<()> {
        Ok(())
    }

    /// Synchronously read back the composited frame as tightly packed,
    /// top-down RGBA. Render thread only.
    fn read_pixels(&mut self) -> HudResult<Vec<u8>>;
}

/// CPU framebuffer with nearest-neighbor sampling and straight-alpha
/// blending.
pub struct SoftwareCanvas {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    readback: [Vec<u8>; READBACK_SLOTS],
}

impl SoftwareCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0u8; (width as usize) * (height as usize) * 4],
            readback: Default::default(),
        }
    }

    /// Current framebuffer contents.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// RGBA at `(x, y)`, or `None` outside the framebuffer.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = ((y * self.width + x) * 4) as usize;
        Some([
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ])
    }

    fn sample(texture: &Texture, sx: i32, sy: i32) -> Option<[u8; 4]> {
        if sx < 0 || sy < 0 || sx >= texture.width() as i32 || sy >= texture.height() as i32 {
            return None;
        }
        let i = sy as usize * texture.stride() as usize + sx as usize * 4;
        let px = texture.pixels().get(i..i + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    fn blend(&mut self, x: i32, y: i32, src: [u8; 4], alpha_mod: u8) {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return;
        }
        let a = (src[3] as u32 * alpha_mod as u32) / 255;
        if a == 0 {
            return;
        }
        let i = ((y as u32 * self.width + x as u32) * 4) as usize;
        let dst = &mut self.pixels[i..i + 4];
        let inv = 255 - a;
        for c in 0..3 {
            dst[c] = ((src[c] as u32 * a + dst[c] as u32 * inv + 127) / 255) as u8;
        }
        dst[3] = (a + (dst[3] as u32 * inv + 127) / 255).min(255) as u8;
    }

    /// Map a destination-local position to a source texel.
    fn source_texel(src: Rect, dest: Rect, u: f64, v: f64) -> (i32, i32) {
        let sx = src.x + ((u * src.w as f64) / dest.w as f64).floor() as i32;
        let sy = src.y + ((v * src.h as f64) / dest.h as f64).floor() as i32;
        (
            sx.clamp(src.x, src.x + src.w - 1),
            sy.clamp(src.y, src.y + src.h - 1),
        )
    }
}

impl Canvas for SoftwareCanvas {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn clear(&mut self, rgba: [u8; 4]) {
        for px in self.pixels.chunks_exact_mut(4) {
            px.copy_from_slice(&rgba);
        }
    }

    fn copy(&mut self, texture: &Texture, src: Rect, dest: Rect) {
        if src.is_empty() || dest.is_empty() {
            return;
        }
        let alpha_mod = texture.alpha_mod();
        let x0 = dest.x.max(0);
        let y0 = dest.y.max(0);
        let x1 = dest.right().min(self.width as i32);
        let y1 = dest.bottom().min(self.height as i32);

        for y in y0..y1 {
            let v = (y - dest.y) as f64 + 0.5;
            for x in x0..x1 {
                let u = (x - dest.x) as f64 + 0.5;
                let (sx, sy) = Self::source_texel(src, dest, u, v);
                if let Some(px) = Self::sample(texture, sx, sy) {
                    self.blend(x, y, px, alpha_mod);
                }
            }
        }
    }

    fn copy_rotated(&mut self, texture: &Texture, src: Rect, dest: Rect, angle: f64) {
        if src.is_empty() || dest.is_empty() {
            return;
        }
        let alpha_mod = texture.alpha_mod();
        let (sin, cos) = angle.to_radians().sin_cos();
        let cx = dest.x as f64 + dest.w as f64 / 2.0;
        let cy = dest.y as f64 + dest.h as f64 / 2.0;
        let hw = dest.w as f64 / 2.0;
        let hh = dest.h as f64 / 2.0;

        // Axis-aligned bounds of the rotated rectangle
        let ex = hw * cos.abs() + hh * sin.abs();
        let ey = hw * sin.abs() + hh * cos.abs();
        let x0 = ((cx - ex).floor() as i32).max(0);
        let y0 = ((cy - ey).floor() as i32).max(0);
        let x1 = ((cx + ex).ceil() as i32).min(self.width as i32);
        let y1 = ((cy + ey).ceil() as i32).min(self.height as i32);

        for y in y0..y1 {
            let py = y as f64 + 0.5 - cy;
            for x in x0..x1 {
                let px = x as f64 + 0.5 - cx;
                // Inverse rotation back into the unrotated rectangle
                let lx = px * cos + py * sin;
                let ly = -px * sin + py * cos;
                let u = lx + hw;
                let v = ly + hh;
                if u < 0.0 || v < 0.0 || u >= dest.w as f64 || v >= dest.h as f64 {
                    continue;
                }
                let (sx, sy) = Self::source_texel(src, dest, u, v);
                if let Some(texel) = Self::sample(texture, sx, sy) {
                    self.blend(x, y, texel, alpha_mod);
                }
            }
        }
    }

    fn read_pixels(&mut self) -> HudResult<Vec<u8>> {
        Ok(self.pixels.clone())
    }
}

/// Readback completes immediately; a slot is mappable once begun.
impl PixelReadback for SoftwareCanvas {
    fn readback_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn row_order(&self) -> RowOrder {
        RowOrder::TopDown
    }

    fn begin_readback(&mut self, slot: usize) -> HudResult<()> {
        let buffer = self
            .readback
            .get_mut(slot)
            .ok_or_else(|| HudError::Other(format!("No readback slot {}", slot)))?;
        buffer.clear();
        buffer.extend_from_slice(&self.pixels);
        Ok(())
    }

    fn map_readback(&mut self, slot: usize, consume: &mut dyn FnMut(&[u8], usize)) -> bool {
        match self.readback.get_mut(slot) {
            Some(buffer) if !buffer.is_empty() => {
                consume(buffer, self.width as usize * 4);
                buffer.clear();
                true
            },
            _ => false,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// One recorded draw call.
    #[derive(Debug, Clone)]
    pub struct DrawCall {
        pub texture_id: u64,
        pub label: String,
        pub src: Rect,
        pub dest: Rect,
        pub angle: f64,
        pub alpha: u8,
    }

    /// Canvas that records draw calls instead of rasterizing.
    pub struct RecordingCanvas {
        pub width: u32,
        pub height: u32,
        pub calls: Vec<DrawCall>,
        pub clears: usize,
    }

    impl RecordingCanvas {
        pub fn new(width: u32, height: u32) -> Self {
            Self {
                width,
                height,
                calls: Vec::new(),
                clears: 0,
            }
        }

        pub fn calls_for(&self, label: &str) -> Vec<&DrawCall> {
            self.calls.iter().filter(|c| c.label == label).collect()
        }
    }

    impl Canvas for RecordingCanvas {
        fn size(&self) -> (u32, u32) {
            (self.width, self.height)
        }

        fn clear(&mut self, _rgba: [u8; 4]) {
            self.clears += 1;
        }

        fn copy(&mut self, texture: &Texture, src: Rect, dest: Rect) {
            self.copy_rotated(texture, src, dest, 0.0);
        }

        fn copy_rotated(&mut self, texture: &Texture, src: Rect, dest: Rect, angle: f64) {
            self.calls.push(DrawCall {
                texture_id: texture.id(),
                label: texture.label().to_string(),
                src,
                dest,
                angle,
                alpha: texture.alpha_mod(),
            });
        }

        fn read_pixels(&mut self) -> HudResult<Vec<u8>> {
            Ok(vec![0u8; (self.width * self.height * 4) as usize])
        }
    }

    fn solid(w: u32, h: u32, rgba: [u8; 4]) -> Texture {
        let pixels = rgba.iter().copied().cycle().take((w * h * 4) as usize).collect();
        Texture::from_rgba(w, h, pixels, "solid")
    }

    #[test]
    fn test_copy_scales_source() {
        let mut canvas = SoftwareCanvas::new(8, 8);
        let mut pixels = vec![0u8; 8];
        pixels[..4].copy_from_slice(&[255, 0, 0, 255]);
        pixels[4..].copy_from_slice(&[0, 0, 255, 255]);
        let tex = Texture::from_rgba(2, 1, pixels, "two");

        canvas.copy(&tex, Rect::new(0, 0, 2, 1), Rect::new(0, 0, 4, 2));
        assert_eq!(canvas.pixel(0, 0), Some([255, 0, 0, 255]));
        assert_eq!(canvas.pixel(1, 1), Some([255, 0, 0, 255]));
        assert_eq!(canvas.pixel(2, 0), Some([0, 0, 255, 255]));
        assert_eq!(canvas.pixel(3, 1), Some([0, 0, 255, 255]));
        assert_eq!(canvas.pixel(4, 0), Some([0, 0, 0, 0]));
    }

    #[test]
    fn test_alpha_mod_blends() {
        let mut canvas = SoftwareCanvas::new(2, 2);
        canvas.clear([0, 0, 0, 255]);
        let tex = solid(1, 1, [255, 255, 255, 255]);
        {
            let _guard = tex.alpha_scope(128);
            canvas.copy(&tex, Rect::new(0, 0, 1, 1), Rect::new(0, 0, 1, 1));
        }
        let px = canvas.pixel(0, 0).unwrap();
        assert!((px[0] as i32 - 128).abs() <= 1, "{:?}", px);
        assert_eq!(px[3], 255);
    }

    #[test]
    fn test_copy_clips_to_framebuffer() {
        let mut canvas = SoftwareCanvas::new(4, 4);
        let tex = solid(4, 4, [9, 9, 9, 255]);
        canvas.copy(&tex, Rect::new(0, 0, 4, 4), Rect::new(-2, 2, 4, 4));
        assert_eq!(canvas.pixel(0, 3), Some([9, 9, 9, 255]));
        assert_eq!(canvas.pixel(2, 3), Some([0, 0, 0, 0]));
    }

    #[test]
    fn test_rotation_by_90_swaps_extent() {
        let mut canvas = SoftwareCanvas::new(20, 20);
        let tex = solid(1, 1, [200, 0, 0, 255]);
        // 10x2 bar centered at (10, 10), rotated to vertical
        canvas.copy_rotated(&tex, Rect::new(0, 0, 1, 1), Rect::new(5, 9, 10, 2), 90.0);
        assert_eq!(canvas.pixel(10, 6), Some([200, 0, 0, 255]));
        assert_eq!(canvas.pixel(10, 13), Some([200, 0, 0, 255]));
        assert_eq!(canvas.pixel(6, 10), Some([0, 0, 0, 0]));
    }

    #[test]
    fn test_software_readback_through_ring() {
        use crate::output::readback::ReadbackRing;

        let mut canvas = SoftwareCanvas::new(2, 1);
        let mut ring = ReadbackRing::new();
        canvas.clear([1, 1, 1, 255]);
        assert!(ring.tick(&mut canvas).unwrap().is_none());
        canvas.clear([2, 2, 2, 255]);
        assert!(ring.tick(&mut canvas).unwrap().is_none());
        canvas.clear([3, 3, 3, 255]);
        // Each tick maps the readback begun on the tick before it
        assert_eq!(ring.tick(&mut canvas).unwrap(), Some(&[2, 2, 2, 255, 2, 2, 2, 255][..]));
        canvas.clear([4, 4, 4, 255]);
        assert_eq!(ring.tick(&mut canvas).unwrap(), Some(&[3, 3, 3, 255, 3, 3, 3, 255][..]));
    }

    #[test]
    fn test_read_pixels_matches_buffer() {
        let mut canvas = SoftwareCanvas::new(2, 1);
        canvas.clear([1, 2, 3, 4]);
        assert_eq!(canvas.read_pixels().unwrap(), vec![1, 2, 3, 4, 1, 2, 3, 4]);
    }
}
