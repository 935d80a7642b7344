//! Text overlays.
//!
//! Text elements hold a template with sensor tokens. The expanded string is
//! rasterized by a [`TextRasterizer`] collaborator and the texture is kept
//! until the string changes.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use super::sensors::SensorSnapshot;
use crate::error::HudResult;
use crate::rendering::texture::Texture;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextStyle {
    pub font: String,
    pub size: u32,
    pub color: [u8; 4],
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font: "sans-serif".to_string(),
            size: 24,
            color: [255, 255, 255, 255],
        }
    }
}

/// Turns a string into a texture. Called on the render thread only.
pub trait TextRasterizer {
    fn rasterize(&mut self, text: &str, style: &TextStyle) -> HudResult<Texture>;
}

/// A template plus its last rasterization.
#[derive(Debug, Clone)]
pub struct TextElement {
    pub template: String,
    pub style: TextStyle,
    cached: Option<(String, Texture)>,
}

impl TextElement {
    pub fn new(template: impl Into<String>, style: TextStyle) -> Self {
        Self {
            template: template.into(),
            style,
            cached: None,
        }
    }

    /// Texture for the current sensor values, re-rasterizing only when the
    /// expanded text differs from the cached one.
    pub fn texture(
        &mut self,
        sensors: &SensorSnapshot,
        now: DateTime<Local>,
        rasterizer: &mut dyn TextRasterizer,
    ) -> HudResult<Option<Texture>> {
        let text = expand_template(&self.template, sensors, now);
        if text.is_empty() {
            return Ok(None);
        }
        if let Some((cached_text, texture)) = &self.cached {
            if *cached_text == text {
                return Ok(Some(texture.clone()));
            }
        }
        let texture = rasterizer.rasterize(&text, &self.style)?;
        self.cached = Some((text, texture.clone()));
        Ok(Some(texture))
    }

    pub fn cached_texture(&self) -> Option<&Texture> {
        self.cached.as_ref().map(|(_, t)| t)
    }

    /// Drop the cached render; the next frame rasterizes again.
    pub fn invalidate(&mut self) {
        self.cached = None;
    }
}

/// Substitute sensor tokens. Unknown tokens are left as written.
pub fn expand_template(template: &str, sensors: &SensorSnapshot, now: DateTime<Local>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = match after.find('}') {
            Some(end) => end,
            None => {
                out.push_str(&rest[start..]);
                return out;
            },
        };
        let token = &after[..end];
        match token_value(token, sensors, now) {
            Some(value) => out.push_str(&value),
            None => {
                out.push('{');
                out.push_str(token);
                out.push('}');
            },
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

fn token_value(token: &str, sensors: &SensorSnapshot, now: DateTime<Local>) -> Option<String> {
    let value = match token {
        "heading" => format!("{:.0}", sensors.motion.heading),
        "roll" => format!("{:.0}", sensors.motion.roll),
        "pitch" => format!("{:.0}", sensors.motion.pitch),
        "altitude" => format!("{:.0}", sensors.gps.altitude),
        "temp" => format!("{:.1}", sensors.environment.temperature_c),
        "humidity" => format!("{:.0}", sensors.environment.humidity),
        "fps" => sensors.fps.to_string(),
        "time" => now.format("%H:%M:%S").to_string(),
        _ => return None,
    };
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    struct CountingRasterizer {
        calls: usize,
    }

    impl TextRasterizer for CountingRasterizer {
        fn rasterize(&mut self, text: &str, _style: &TextStyle) -> HudResult<Texture> {
            self.calls += 1;
            let width = text.len().max(1) as u32;
            Ok(Texture::from_rgba(width, 1, vec![255; (width * 4) as usize], text))
        }
    }

    fn noon() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 6, 12, 30, 5).unwrap()
    }

    #[test]
    fn test_expand_tokens() {
        let mut sensors = SensorSnapshot::default();
        sensors.motion.heading = 271.6;
        sensors.gps.altitude = 104.2;
        sensors.environment.temperature_c = 21.55;
        sensors.fps = 58;

        let text = expand_template(
            "HDG {heading} ALT {altitude}m {temp}C {fps}fps {time} {bogus} {open",
            &sensors,
            noon(),
        );
        assert_eq!(text, "HDG 272 ALT 104m 21.6C 58fps 12:30:05 {bogus} {open");
    }

    #[test]
    fn test_texture_cached_until_text_changes() {
        let mut element = TextElement::new("{fps}", TextStyle::default());
        let mut rasterizer = CountingRasterizer { calls: 0 };
        let mut sensors = SensorSnapshot::default();
        sensors.fps = 30;

        let a = element.texture(&sensors, noon(), &mut rasterizer).unwrap().unwrap();
        let b = element.texture(&sensors, noon(), &mut rasterizer).unwrap().unwrap();
        assert!(a.ptr_eq(&b));
        assert_eq!(rasterizer.calls, 1);

        sensors.fps = 31;
        let c = element.texture(&sensors, noon(), &mut rasterizer).unwrap().unwrap();
        assert!(!a.ptr_eq(&c));
        assert_eq!(rasterizer.calls, 2);
        assert_eq!(element.cached_texture().unwrap().label(), "31");
    }

    #[test]
    fn test_invalidate_forces_rasterize() {
        let mut element = TextElement::new("{fps}", TextStyle::default());
        let mut rasterizer = CountingRasterizer { calls: 0 };
        let sensors = SensorSnapshot::default();
        element.texture(&sensors, noon(), &mut rasterizer).unwrap();
        element.invalidate();
        assert!(element.cached_texture().is_none());
        element.texture(&sensors, noon(), &mut rasterizer).unwrap();
        assert_eq!(rasterizer.calls, 2);
    }

    #[test]
    fn test_empty_text_draws_nothing() {
        let mut element = TextElement::new("", TextStyle::default());
        let mut rasterizer = CountingRasterizer { calls: 0 };
        let result = element
            .texture(&SensorSnapshot::default(), noon(), &mut rasterizer)
            .unwrap();
        assert!(result.is_none());
        assert_eq!(rasterizer.calls, 0);
    }
}
