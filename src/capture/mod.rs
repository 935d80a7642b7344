//! Camera acquisition and synchronization.
//!
//! ## Architecture
//!
//! ```text
//! capture/
//!   +-- frame.rs   (CameraFrame, FramePair)
//!   +-- source.rs  (CameraSource trait, ffmpeg-backed V4L2 source)
//!   +-- slot.rs    (DoubleBufferSlot hand-off to the render thread)
//!   +-- sync.rs    (FrameSynchronizer capture loop)
//!   +-- tests.rs   (scripted-source scenarios)
//! ```
//!
//! The capture thread owns the sources. The render thread only ever sees
//! frames through the slot and never waits on it.

pub mod frame;
pub mod slot;
pub mod source;
pub mod sync;
#[cfg(test)]
mod tests;

pub use frame::{CameraFrame, FramePair};
pub use slot::DoubleBufferSlot;
pub use source::{CameraSource, FfmpegCameraSource, SampleResult};
pub use sync::{FrameSynchronizer, StepOutcome, SyncStats};

use crate::config::CameraConfig;
use crate::error::HudResult;

/// Left source plus the right source in dual-camera mode.
pub type CameraSources = (Box<dyn CameraSource>, Option<Box<dyn CameraSource>>);

/// Open the configured camera devices.
pub fn open_sources(config: &CameraConfig) -> HudResult<CameraSources> {
    let left_device = config
        .devices
        .first()
        .map(String::as_str)
        .unwrap_or("/dev/video0");
    let left: Box<dyn CameraSource> =
        Box::new(FfmpegCameraSource::open("left", left_device, config)?);

    let right: Option<Box<dyn CameraSource>> = if config.dual {
        let right_device = config
            .devices
            .get(1)
            .map(String::as_str)
            .unwrap_or("/dev/video1");
        Some(Box::new(FfmpegCameraSource::open("right", right_device, config)?))
    } else {
        None
    };

    Ok((left, right))
}
