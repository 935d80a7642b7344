//! Environmental panel element.
//!
//! The panel is drawn on the CPU into an RGBA image and handed to the
//! canvas as one texture. It is redrawn at most once per refresh interval;
//! the texture id stays fixed and the version is bumped, so GPU backends
//! update one device texture in place.

use std::sync::Arc;
use std::time::{Duration, Instant};

use image::{Rgba, RgbaImage};

use super::sensors::EnvironmentSample;
use crate::rendering::texture::{next_texture_id, Texture};

/// How often the panel picks up new sensor values.
pub const PANEL_REFRESH: Duration = Duration::from_millis(1000);

/// Size used when the layout gives none.
pub const DEFAULT_PANEL_SIZE: (u32, u32) = (320, 200);

const ACCENT: [u8; 4] = [0, 245, 252, 255];
const BACKGROUND: [u8; 4] = [0, 25, 40, 120];
const GAUGE_BACKGROUND: [u8; 4] = [40, 40, 40, 160];

/// Thermometer scale in degrees C.
const TEMP_RANGE: (f64, f64) = (0.0, 50.0);
const HUMIDITY_MAX: f64 = 100.0;
const AIR_QUALITY_MAX: f64 = 100.0;
const CO2_MAX_PPM: f64 = 2000.0;
const TVOC_MAX_PPB: f64 = 1000.0;
const HEAT_INDEX_MAX: f64 = 50.0;

#[derive(Debug, Clone)]
pub struct EnvironmentPanel {
    width: u32,
    height: u32,
    texture_id: u64,
    version: u64,
    texture: Option<Texture>,
    rendered_at: Option<Instant>,
}

impl EnvironmentPanel {
    /// A zero dimension takes the default size.
    pub fn new(width: i32, height: i32) -> Self {
        let width = if width > 0 { width as u32 } else { DEFAULT_PANEL_SIZE.0 };
        let height = if height > 0 { height as u32 } else { DEFAULT_PANEL_SIZE.1 };
        Self {
            width,
            height,
            texture_id: next_texture_id(),
            version: 0,
            texture: None,
            rendered_at: None,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Panel texture for `now`, redrawn when the refresh interval passed.
    pub fn texture(&mut self, env: &EnvironmentSample, now: Instant) -> Texture {
        let fresh = self
            .rendered_at
            .is_some_and(|at| now.saturating_duration_since(at) < PANEL_REFRESH);
        if let (true, Some(texture)) = (fresh, &self.texture) {
            return texture.clone();
        }

        let image = draw_panel(self.width, self.height, env);
        self.version += 1;
        let texture = Texture::from_shared(
            self.texture_id,
            self.version,
            self.width,
            self.height,
            self.width * 4,
            Arc::new(image.into_raw()),
            "environment",
        );
        self.texture = Some(texture.clone());
        self.rendered_at = Some(now);
        texture
    }

    pub fn cached_texture(&self) -> Option<&Texture> {
        self.texture.as_ref()
    }
}

/// Integer rectangle inside the panel image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Area {
    x: u32,
    y: u32,
    w: u32,
    h: u32,
}

fn blend(image: &mut RgbaImage, x: u32, y: u32, color: [u8; 4]) {
    if x >= image.width() || y >= image.height() {
        return;
    }
    let dst = image.get_pixel_mut(x, y);
    let a = color[3] as u32;
    let inv = 255 - a;
    let out_a = a + dst.0[3] as u32 * inv / 255;
    for c in 0..3 {
        dst.0[c] = ((color[c] as u32 * a + dst.0[c] as u32 * inv) / 255) as u8;
    }
    dst.0[3] = out_a.min(255) as u8;
}

fn fill(image: &mut RgbaImage, area: Area, color: [u8; 4]) {
    for y in area.y..area.y + area.h {
        for x in area.x..area.x + area.w {
            blend(image, x, y, color);
        }
    }
}

fn outline(image: &mut RgbaImage, area: Area, color: [u8; 4]) {
    if area.w == 0 || area.h == 0 {
        return;
    }
    let (right, bottom) = (area.x + area.w - 1, area.y + area.h - 1);
    for x in area.x..=right {
        blend(image, x, area.y, color);
        blend(image, x, bottom, color);
    }
    for y in area.y + 1..bottom {
        blend(image, area.x, y, color);
        blend(image, right, y, color);
    }
}

/// Fraction of `max` as `[0, 1]`.
fn fraction(value: f64, max: f64) -> f64 {
    if max <= 0.0 || !value.is_finite() {
        return 0.0;
    }
    (value / max).clamp(0.0, 1.0)
}

/// Blue at 0 through cyan, green and yellow to red at 1.
pub fn temperature_color(fraction: f64) -> [u8; 4] {
    let p = fraction.clamp(0.0, 1.0);
    let ramp = |t: f64| (255.0 * t.clamp(0.0, 1.0)) as u8;
    if p < 0.25 {
        [0, ramp(p * 4.0), 255, 255]
    } else if p < 0.5 {
        [0, 255, ramp(1.0 - (p - 0.25) * 4.0), 255]
    } else if p < 0.75 {
        [ramp((p - 0.5) * 4.0), 255, 0, 255]
    } else {
        [255, ramp(1.0 - (p - 0.75) * 4.0), 0, 255]
    }
}

/// Good, acceptable, poor and bad CO2 bands.
pub fn co2_color(ppm: f64) -> [u8; 4] {
    if ppm < 800.0 {
        [0, 255, 100, 255]
    } else if ppm < 1200.0 {
        [255, 255, 0, 255]
    } else if ppm < 2000.0 {
        [255, 128, 0, 255]
    } else {
        [255, 0, 0, 255]
    }
}

/// Higher air quality is better.
pub fn air_quality_color(quality: f64) -> [u8; 4] {
    co2_color(2000.0 * (1.0 - fraction(quality, AIR_QUALITY_MAX)))
}

/// Horizontal gauge with ten segments.
fn bar_gauge(image: &mut RgbaImage, area: Area, fraction: f64, color: [u8; 4]) {
    fill(image, area, GAUGE_BACKGROUND);
    let filled = (area.w as f64 * fraction) as u32;
    if filled > 0 {
        fill(image, Area { w: filled, ..area }, color);
    }
    for i in 1..10 {
        let x = area.x + area.w / 10 * i;
        for y in area.y..area.y + area.h {
            blend(image, x, y, [255, 255, 255, 64]);
        }
    }
    outline(image, area, [255, 255, 255, 128]);
}

/// Vertical thermometer column filled from the bottom.
fn thermometer(image: &mut RgbaImage, area: Area, temp_c: f64) {
    let p = fraction(temp_c - TEMP_RANGE.0, TEMP_RANGE.1 - TEMP_RANGE.0);
    let filled = (area.h as f64 * p) as u32;
    if filled > 0 {
        fill(
            image,
            Area {
                y: area.y + area.h - filled,
                h: filled,
                ..area
            },
            temperature_color(p),
        );
    }
    outline(image, area, ACCENT);
}

fn corner_brackets(image: &mut RgbaImage) {
    let (w, h) = image.dimensions();
    let len = (w.min(h) / 8).max(2);
    let inset = 2u32.min(w / 4).min(h / 4);
    let (right, bottom) = (w.saturating_sub(inset + 1), h.saturating_sub(inset + 1));
    for i in 0..len {
        for (x, y) in [
            (inset + i, inset),
            (inset, inset + i),
            (right.saturating_sub(i), inset),
            (right, inset + i),
            (inset + i, bottom),
            (inset, bottom.saturating_sub(i)),
            (right.saturating_sub(i), bottom),
            (right, bottom.saturating_sub(i)),
        ] {
            blend(image, x, y, ACCENT);
        }
    }
}

/// Draw the panel for `env`.
///
/// A thermometer fills the left eighth; five bar gauges (humidity, air
/// quality, CO2, VOC, heat index) are stacked on the right.
pub fn draw_panel(width: u32, height: u32, env: &EnvironmentSample) -> RgbaImage {
    let mut image = RgbaImage::from_pixel(width, height, Rgba(BACKGROUND));
    let margin = (width.min(height) / 16).max(1);

    let column = Area {
        x: margin,
        y: margin,
        w: (width / 8).max(1),
        h: height.saturating_sub(margin * 2).max(1),
    };
    thermometer(&mut image, column, env.temperature_c);

    let gauges = [
        (fraction(env.humidity, HUMIDITY_MAX), ACCENT),
        (fraction(env.air_quality, AIR_QUALITY_MAX), air_quality_color(env.air_quality)),
        (fraction(env.co2_ppm, CO2_MAX_PPM), co2_color(env.co2_ppm)),
        (fraction(env.tvoc_ppb, TVOC_MAX_PPB), ACCENT),
        (
            fraction(env.heat_index_c, HEAT_INDEX_MAX),
            temperature_color(fraction(env.heat_index_c, HEAT_INDEX_MAX)),
        ),
    ];
    let left = column.x + column.w + margin * 2;
    let gauge_w = width.saturating_sub(left + margin).max(1);
    let row_h = column.h / gauges.len() as u32;
    let gauge_h = (row_h * 2 / 3).max(1);
    for (i, (value, color)) in gauges.into_iter().enumerate() {
        let area = Area {
            x: left,
            y: margin + row_h * i as u32 + row_h.saturating_sub(gauge_h) / 2,
            w: gauge_w,
            h: gauge_h,
        };
        bar_gauge(&mut image, area, value, color);
    }

    corner_brackets(&mut image);
    image
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EnvironmentSample {
        EnvironmentSample {
            temperature_c: 25.0,
            humidity: 50.0,
            air_quality: 90.0,
            co2_ppm: 600.0,
            tvoc_ppb: 100.0,
            heat_index_c: 26.0,
        }
    }

    #[test]
    fn test_temperature_ramp() {
        assert_eq!(temperature_color(0.0), [0, 0, 255, 255]);
        assert_eq!(temperature_color(0.5), [0, 255, 0, 255]);
        assert_eq!(temperature_color(1.0), [255, 0, 0, 255]);
        assert_eq!(temperature_color(7.0), temperature_color(1.0));
    }

    #[test]
    fn test_co2_bands() {
        assert_eq!(co2_color(450.0), [0, 255, 100, 255]);
        assert_eq!(co2_color(1000.0), [255, 255, 0, 255]);
        assert_eq!(co2_color(1500.0), [255, 128, 0, 255]);
        assert_eq!(co2_color(5000.0), [255, 0, 0, 255]);
        assert_eq!(air_quality_color(100.0), co2_color(0.0));
    }

    #[test]
    fn test_thermometer_fills_from_bottom() {
        let mut env = sample();
        env.temperature_c = 25.0;
        let image = draw_panel(160, 160, &env);
        // Column spans x 10..30, y 10..150; half full at 25 C
        assert_eq!(image.get_pixel(20, 145).0, [0, 255, 0, 255]);
        assert_ne!(image.get_pixel(20, 40).0, [0, 255, 0, 255]);
    }

    #[test]
    fn test_refresh_interval() {
        let mut panel = EnvironmentPanel::new(0, 0);
        assert_eq!(panel.size(), DEFAULT_PANEL_SIZE);
        let t0 = Instant::now();
        let mut env = sample();
        let first = panel.texture(&env, t0);

        env.humidity = 90.0;
        let same = panel.texture(&env, t0 + Duration::from_millis(500));
        assert!(first.ptr_eq(&same));

        let next = panel.texture(&env, t0 + PANEL_REFRESH);
        assert!(!first.ptr_eq(&next));
        assert_eq!(next.id(), first.id());
        assert_eq!(next.version(), first.version() + 1);
    }
}
