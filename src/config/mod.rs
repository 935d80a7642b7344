//! Application configuration.
//!
//! Typed, serde-backed settings for the whole pipeline:
//!
//! - `DisplayConfig`: eye viewport geometry and stereo disparity
//! - `CameraConfig`: capture devices, frame rate and passthrough crop
//! - `OutputConfig`: record/stream encoder and watchdog settings
//! - `HudDefaults`: default transition used when a HUD names none
//!
//! Every struct has a `Default` carrying the system defaults and a
//! `validate()` that clamps values into range instead of failing. The
//! loaded `AppConfig` is owned by the runtime and handed to worker threads
//! explicitly; there is no process-wide configuration state.

pub mod display;
pub mod output;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use display::{CameraConfig, DisplayConfig};
pub use output::OutputConfig;

use crate::error::{HudError, HudResult};

/// Transition used when a HUD or a switch request does not name one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HudDefaults {
    /// Transition name (`fade`, `slide_left`, `slide_right`, `zoom`).
    pub transition: String,

    /// Transition duration in milliseconds.
    pub transition_duration_ms: u32,
}

impl Default for HudDefaults {
    fn default() -> Self {
        Self {
            transition: "fade".to_string(),
            transition_duration_ms: 500,
        }
    }
}

impl HudDefaults {
    /// Validate and clamp settings to acceptable ranges.
    pub fn validate(&mut self) {
        if self.transition_duration_ms == 0 {
            self.transition_duration_ms = 500;
        }
        self.transition_duration_ms = self.transition_duration_ms.min(10_000);
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub display: DisplayConfig,
    pub camera: CameraConfig,
    pub output: OutputConfig,
    pub hud: HudDefaults,

    /// Overlay layout file. Relative paths resolve against the config file.
    pub layout_path: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from a JSON file.
    ///
    /// A missing file yields defaults. Malformed JSON is an error so a bad
    /// edit never silently resets the whole system.
    pub fn load(path: &Path) -> HudResult<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!(
                    "[CONFIG] {} not found, using defaults",
                    path.display()
                );
                return Ok(Self::default());
            },
            Err(e) => return Err(e.into()),
        };

        let mut config: AppConfig = serde_json::from_str(&text)
            .map_err(|e| HudError::ConfigError(format!("{}: {}", path.display(), e)))?;

        if let (Some(layout), Some(parent)) = (config.layout_path.as_ref(), path.parent()) {
            if layout.is_relative() {
                config.layout_path = Some(parent.join(layout));
            }
        }

        config.validate();
        log::debug!("[CONFIG] Loaded {}: {:?}", path.display(), config);
        Ok(config)
    }

    /// Validate and clamp every section.
    pub fn validate(&mut self) {
        self.display.validate();
        self.camera.validate();
        self.output.validate();
        self.hud.validate();
    }
}
