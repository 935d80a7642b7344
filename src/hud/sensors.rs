//! Read-only sensor snapshot consumed by element rendering.
//!
//! Collaborators (motion, GPS, environment, AI and armor telemetry) update
//! their own copy and hand the render thread a snapshot once per frame.
//! Rendering never mutates it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Voice assistant state, as reported by the AI collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AiState {
    #[default]
    Idle,
    Silence,
    WakewordListen,
    CommandRecording,
    ProcessCommand,
    VisionAiReady,
}

impl AiState {
    /// Parse the collaborator's state name. Unknown names are `Idle`.
    pub fn from_name(name: &str) -> Self {
        match name.trim() {
            "SILENCE" => AiState::Silence,
            "WAKEWORD_LISTEN" => AiState::WakewordListen,
            "COMMAND_RECORDING" => AiState::CommandRecording,
            "PROCESS_COMMAND" => AiState::ProcessCommand,
            "VISION_AI_READY" => AiState::VisionAiReady,
            _ => AiState::Idle,
        }
    }
}

/// Health of one armor component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArmorStatus {
    #[default]
    Unregistered,
    Online,
    Warning,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MotionSample {
    /// Degrees, positive clockwise.
    pub roll: f64,
    /// Degrees, -90 (down) to 90 (up).
    pub pitch: f64,
    /// Compass heading in degrees.
    pub heading: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GpsSample {
    pub latitude: f64,
    pub longitude: f64,
    /// Meters.
    pub altitude: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnvironmentSample {
    pub temperature_c: f64,
    /// Relative humidity, percent.
    pub humidity: f64,
    /// Air quality index, 100 is best.
    pub air_quality: f64,
    pub co2_ppm: f64,
    pub tvoc_ppb: f64,
    pub heat_index_c: f64,
}

/// Bounding box in camera pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DetectionBox {
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
}

impl DetectionBox {
    pub fn center(&self) -> (i32, i32) {
        (self.left + self.width / 2, self.top + self.height / 2)
    }
}

/// One object found in both camera images.
///
/// The detection collaborator pairs the per-camera results; the label is
/// shown in both eyes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Detection {
    pub label: String,
    pub left: DetectionBox,
    pub right: DetectionBox,
}

/// Everything element rendering may look at in one frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SensorSnapshot {
    pub motion: MotionSample,
    pub gps: GpsSample,
    pub environment: EnvironmentSample,
    /// Wifi signal bars.
    pub wifi_level: i32,
    /// Battery percentage.
    pub battery_level: i32,
    pub ai_state: AiState,
    /// Armor status by component name.
    pub armor: HashMap<String, ArmorStatus>,
    /// Objects seen by both cameras this frame.
    pub detections: Vec<Detection>,
    /// Measured render rate.
    pub fps: u32,
}

impl SensorSnapshot {
    pub fn armor_status(&self, component: &str) -> ArmorStatus {
        self.armor.get(component).copied().unwrap_or_default()
    }
}
