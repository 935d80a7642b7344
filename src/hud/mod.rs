//! HUD screens, overlay elements and transitions.
//!
//! - `screen`: the append-only screen registry and membership masks
//! - `transition`: the switch/transition state machine and per-element effects
//! - `element`: overlay element kinds and the element arena
//! - `animation`: sprite-sheet frames and sensor-driven frame selection
//! - `text`: template text elements
//! - `panel`: the CPU-drawn environmental panel
//! - `sensors`: the read-only per-frame sensor snapshot
//! - `defs`: JSON layout definitions
//! - `renderer`: draws visible elements through the stereo projector

pub mod animation;
pub mod defs;
pub mod element;
pub mod panel;
pub mod renderer;
pub mod screen;
pub mod sensors;
pub mod text;
pub mod transition;

#[cfg(test)]
mod tests;

pub use defs::{BuiltLayout, LayoutConfig};
pub use element::{AngleMode, DetectionOverlay, ElementId, ElementKind, ElementStore, OverlayElement};
pub use panel::EnvironmentPanel;
pub use renderer::{render_huds, CameraView, RenderContext, RenderReport};
pub use screen::{HudId, HudMask, HudRegistry, HudScreen, TransitionKind, MAX_HUDS};
pub use sensors::{AiState, ArmorStatus, Detection, DetectionBox, SensorSnapshot};
pub use text::{TextRasterizer, TextStyle};
pub use transition::{ElementEffect, FramePhase, HudManager, HudStatus, SwitchRequest};
