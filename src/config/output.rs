//! Record/stream output configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Encoder and sink settings used when output is enabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OutputConfig {
    /// Directory for recordings and screenshots.
    pub record_dir: PathBuf,

    /// Encode frame rate (10-60).
    pub target_fps: u32,

    /// Recording bitrate in kbit/s.
    pub record_bitrate_kbps: u32,

    /// Network stream frame width.
    pub stream_width: u32,

    /// Network stream frame height.
    pub stream_height: u32,

    /// Network stream bitrate in kbit/s.
    pub stream_bitrate_kbps: u32,

    /// RTMP endpoint for stream-only mode.
    pub stream_url: String,

    /// Host receiving the MPEG-TS branch in record+stream mode.
    pub udp_host: String,

    /// Port receiving the MPEG-TS branch in record+stream mode.
    pub udp_port: u16,

    /// Interval between recording file growth checks.
    pub watchdog_interval_ms: u64,

    /// Consecutive non-growing checks before the stall alert is raised.
    pub stall_threshold: u32,

    /// Try the hardware H.264 encoder before falling back to x264.
    pub prefer_hardware: bool,

    /// Frames buffered between the encode thread and ffmpeg's stdin.
    pub encoder_queue_frames: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            record_dir: PathBuf::from("."),
            target_fps: 30,
            record_bitrate_kbps: 16_000,
            stream_width: 1920,
            stream_height: 960,
            stream_bitrate_kbps: 8_000,
            stream_url: "rtmp://127.0.0.1/live/hud".to_string(),
            udp_host: "127.0.0.1".to_string(),
            udp_port: 5000,
            watchdog_interval_ms: 5000,
            stall_threshold: 2,
            prefer_hardware: true,
            encoder_queue_frames: 4,
        }
    }
}

impl OutputConfig {
    /// Validate and clamp settings to acceptable ranges.
    pub fn validate(&mut self) {
        self.target_fps = self.target_fps.clamp(10, 60);
        self.record_bitrate_kbps = self.record_bitrate_kbps.clamp(500, 100_000);
        self.stream_bitrate_kbps = self.stream_bitrate_kbps.clamp(250, 50_000);
        // yuv420p needs even dimensions
        self.stream_width = (self.stream_width.clamp(64, 7680)) & !1;
        self.stream_height = (self.stream_height.clamp(64, 4320)) & !1;
        self.watchdog_interval_ms = self.watchdog_interval_ms.clamp(500, 60_000);
        self.stall_threshold = self.stall_threshold.clamp(1, 20);
        self.encoder_queue_frames = self.encoder_queue_frames.clamp(1, 16);
        if self.udp_port == 0 {
            self.udp_port = 5000;
        }
    }

    /// Target time between encoded frames.
    pub fn frame_duration(&self) -> Duration {
        Duration::from_micros(1_000_000 / self.target_fps as u64)
    }

    /// Interval between watchdog checks.
    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_millis(self.watchdog_interval_ms)
    }
}
