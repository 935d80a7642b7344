//! Sprite-sheet animations and sensor-driven frame selection.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::rendering::coord::Rect;

/// Default animation rate.
pub const DEFAULT_FRAME_INTERVAL_MS: u64 = 1000 / 30;

/// One frame of a sprite sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimFrame {
    /// Region of the sheet.
    pub source: Rect,
    /// Offset of the trimmed frame inside the original canvas.
    pub dest_x: i32,
    pub dest_y: i32,
    /// Original canvas size, used to rescale stretched elements.
    pub source_size_w: i32,
    pub source_size_h: i32,
}

impl AnimFrame {
    /// Destination for an element at `(x, y)` whose configured size is
    /// `width` x `height` (0 = natural size).
    ///
    /// A stretched element scales the frame offset by the ratio between
    /// the configured size and the original canvas size. The remaining
    /// extent is the configured size minus the scaled offset.
    pub fn dest_rect(&self, x: i32, y: i32, width: i32, height: i32) -> Rect {
        let fx = self.dest_x as f64;
        let fy = self.dest_y as f64;

        match (width, height) {
            (0, 0) => Rect::new(x + self.dest_x, y + self.dest_y, self.source.w, self.source.h),
            (0, h) => {
                let ratio = ratio(h, self.source_size_h);
                Rect::new(
                    (x as f64 + fx * ratio) as i32,
                    (y as f64 + fy * ratio) as i32,
                    (self.source.w as f64 * ratio) as i32,
                    (h as f64 - fy * ratio) as i32,
                )
            },
            (w, 0) => {
                let ratio = ratio(w, self.source_size_w);
                Rect::new(
                    (x as f64 + fx * ratio) as i32,
                    (y as f64 + fy * ratio) as i32,
                    (w as f64 - fx * ratio) as i32,
                    (self.source.h as f64 * ratio) as i32,
                )
            },
            (w, h) => {
                let ratio_w = ratio(w, self.source_size_w);
                let ratio_h = ratio(h, self.source_size_h);
                Rect::new(
                    (x as f64 + fx * ratio_w) as i32,
                    (y as f64 + fy * ratio_h) as i32,
                    (w as f64 - fx * ratio_w) as i32,
                    (h as f64 - fy * ratio_h) as i32,
                )
            },
        }
    }

    /// Unscaled destination used by sensor gauges.
    pub fn natural_rect(&self, x: i32, y: i32) -> Rect {
        Rect::new(x + self.dest_x, y + self.dest_y, self.source.w, self.source.h)
    }
}

fn ratio(size: i32, original: i32) -> f64 {
    if original <= 0 {
        1.0
    } else {
        size as f64 / original as f64
    }
}

/// Frame table plus playback position.
#[derive(Debug, Clone)]
pub struct Animation {
    frames: Vec<AnimFrame>,
    current: usize,
    frame_interval: Duration,
    last_advance: Option<Instant>,
}

impl Animation {
    pub fn new(frames: Vec<AnimFrame>, frame_interval: Duration) -> Self {
        Self {
            frames,
            current: 0,
            frame_interval: if frame_interval.is_zero() {
                Duration::from_millis(DEFAULT_FRAME_INTERVAL_MS)
            } else {
                frame_interval
            },
            last_advance: None,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_frame(&self) -> Option<&AnimFrame> {
        self.frames.get(self.current)
    }

    pub fn frame(&self, index: usize) -> Option<&AnimFrame> {
        self.frames.get(index)
    }

    /// Step playback by however many whole intervals elapsed since the
    /// last step, wrapping at the end of the table.
    pub fn advance(&mut self, now: Instant) {
        if self.frames.is_empty() {
            return;
        }
        let last = match self.last_advance {
            Some(last) => last,
            None => {
                self.last_advance = Some(now);
                return;
            },
        };

        let elapsed = now.saturating_duration_since(last);
        let steps = (elapsed.as_nanos() / self.frame_interval.as_nanos()) as u64;
        if steps == 0 {
            return;
        }
        self.current = ((self.current as u64 + steps) % self.frames.len() as u64) as usize;
        self.last_advance = Some(last + self.frame_interval * steps as u32);
    }

    /// Jump to `index`, clamped into the table.
    pub fn select(&mut self, index: usize) {
        self.current = index.min(self.frames.len().saturating_sub(1));
    }
}

fn last_index(frame_count: usize) -> i64 {
    frame_count.saturating_sub(1) as i64
}

/// Compass frame: one frame per degree.
pub fn heading_frame(heading: f64, frame_count: usize) -> usize {
    let index = (heading as i64).clamp(0, 359);
    index.min(last_index(frame_count)).max(0) as usize
}

/// Pitch ladder frame: two frames per degree starting at -90.
pub fn pitch_frame(pitch: f64, pitch_offset: f64, frame_count: usize) -> usize {
    let index = ((pitch + 90.0 + pitch_offset) * 2.0).round() as i64;
    index.clamp(0, last_index(frame_count).max(0)) as usize
}

/// Altimeter frame: one frame per ten meters.
pub fn altitude_frame(altitude: f64, frame_count: usize) -> usize {
    let max_altitude = (frame_count as i64 * 10 - 1).max(0);
    let altitude = (altitude as i64).clamp(0, max_altitude);
    (altitude / 10).min(last_index(frame_count).max(0)) as usize
}

/// Wifi frame: one frame per signal bar.
pub fn wifi_frame(level: i32, frame_count: usize) -> usize {
    (level as i64).clamp(0, last_index(frame_count).max(0)) as usize
}

/// Battery indicator state by charge percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatteryLevel {
    Empty,
    Low,
    Medium,
    High,
    Full,
}

impl BatteryLevel {
    pub fn from_percent(percent: i32) -> Self {
        match percent {
            p if p <= 0 => BatteryLevel::Empty,
            p if p <= 25 => BatteryLevel::Low,
            p if p <= 50 => BatteryLevel::Medium,
            p if p <= 75 => BatteryLevel::High,
            _ => BatteryLevel::Full,
        }
    }
}
