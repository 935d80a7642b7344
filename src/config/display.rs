//! Display and camera configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Stereo display geometry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DisplayConfig {
    /// Width of one eye viewport in pixels.
    pub eye_width: u32,

    /// Height of one eye viewport in pixels.
    pub eye_height: u32,

    /// Horizontal disparity applied to non-fixed overlays. The left eye
    /// moves by `-offset`, the right eye by `+offset`.
    pub stereo_offset: i32,

    /// Calibration offset added to pitch before the pitch ladder lookup.
    pub pitch_offset: f32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            eye_width: 1440,
            eye_height: 1440,
            stereo_offset: 0,
            pitch_offset: 0.0,
        }
    }
}

impl DisplayConfig {
    /// Validate and clamp settings to acceptable ranges.
    pub fn validate(&mut self) {
        self.eye_width = self.eye_width.clamp(64, 8192);
        self.eye_height = self.eye_height.clamp(64, 8192);
        let max_offset = (self.eye_width / 2) as i32;
        self.stereo_offset = self.stereo_offset.clamp(-max_offset, max_offset);
        self.pitch_offset = self.pitch_offset.clamp(-90.0, 90.0);
    }

    /// Full side-by-side framebuffer size.
    pub fn framebuffer_size(&self) -> (u32, u32) {
        (self.eye_width * 2, self.eye_height)
    }
}

/// Camera acquisition settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CameraConfig {
    /// Two physical cameras (one per eye) instead of one shared feed.
    pub dual: bool,

    /// Capture width requested from the device.
    pub width: u32,

    /// Capture height requested from the device.
    pub height: u32,

    /// Capture frame rate. Also defines the sync tolerance.
    pub fps: u32,

    /// Left edge of the passthrough crop in camera pixels.
    pub crop_x: u32,

    /// Width of the passthrough crop in camera pixels.
    pub crop_width: u32,

    /// Device paths, left camera first.
    pub devices: Vec<String>,

    /// Upper bound on catch-up re-pulls in one sync iteration.
    pub max_catchup_pulls: u32,

    /// How long one pull waits before reporting an empty sample.
    pub poll_timeout_ms: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            dual: true,
            width: 1920,
            height: 1080,
            fps: 60,
            crop_x: 420,
            crop_width: 1080,
            devices: default_devices(),
            max_catchup_pulls: 8,
            poll_timeout_ms: 100,
        }
    }
}

fn default_devices() -> Vec<String> {
    vec!["/dev/video0".to_string(), "/dev/video1".to_string()]
}

impl CameraConfig {
    /// Validate and clamp settings to acceptable ranges.
    pub fn validate(&mut self) {
        self.width = self.width.clamp(16, 8192);
        self.height = self.height.clamp(16, 8192);
        self.fps = self.fps.clamp(1, 240);
        self.crop_width = self.crop_width.clamp(1, self.width);
        self.crop_x = self.crop_x.min(self.width - self.crop_width);
        self.max_catchup_pulls = self.max_catchup_pulls.clamp(1, 120);
        self.poll_timeout_ms = self.poll_timeout_ms.clamp(10, 2000);

        let needed = if self.dual { 2 } else { 1 };
        if self.devices.len() < needed {
            log::warn!(
                "[CONFIG] {} camera device(s) configured, {} needed; using defaults",
                self.devices.len(),
                needed
            );
            self.devices = default_devices();
        }
    }

    /// One capture frame period. Two frames closer than this are a pair.
    pub fn frame_duration(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / self.fps as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_defaults() {
        let config = DisplayConfig::default();
        assert_eq!(config.eye_width, 1440);
        assert_eq!(config.framebuffer_size(), (2880, 1440));
    }

    #[test]
    fn test_display_validate_clamps_offset() {
        let mut config = DisplayConfig {
            eye_width: 100,
            stereo_offset: 500,
            ..Default::default()
        };
        config.validate();
        assert_eq!(config.stereo_offset, 50);
    }

    #[test]
    fn test_camera_crop_clamped_inside_frame() {
        let mut config = CameraConfig {
            width: 1280,
            crop_x: 900,
            crop_width: 1080,
            ..Default::default()
        };
        config.validate();
        assert_eq!(config.crop_width, 1080);
        assert_eq!(config.crop_x, 200);
    }

    #[test]
    fn test_camera_frame_duration() {
        let config = CameraConfig {
            fps: 30,
            ..Default::default()
        };
        assert_eq!(config.frame_duration().as_millis(), 33);
    }

    #[test]
    fn test_camera_single_device_when_dual_falls_back() {
        let mut config = CameraConfig {
            devices: vec!["/dev/video3".to_string()],
            ..Default::default()
        };
        config.validate();
        assert_eq!(config.devices.len(), 2);

        let mut single = CameraConfig {
            dual: false,
            devices: vec!["/dev/video3".to_string()],
            ..Default::default()
        };
        single.validate();
        assert_eq!(single.devices, vec!["/dev/video3".to_string()]);
    }
}
