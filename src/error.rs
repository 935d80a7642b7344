//! Central error types for the HUD pipeline.
//!
//! Every fallible operation in the crate returns [`HudResult`]. Callers
//! decide whether an error is transient (retry or reuse stale data), a
//! configuration problem (coerce or drop the action) or fatal (request an
//! orderly shutdown).

use thiserror::Error;

/// Main error type for HUD pipeline operations.
#[derive(Error, Debug)]
pub enum HudError {
    /// Camera capture failed
    #[error("Capture failed: {0}")]
    CaptureError(String),

    /// A camera source reported end-of-stream
    #[error("Camera '{camera}' reached end of stream")]
    CameraEndOfStream { camera: String },

    /// Filesystem or pipe I/O failed
    #[error("Storage error: {0}")]
    StorageError(#[from] std::io::Error),

    /// FFmpeg binary not found
    #[error("FFmpeg not found. Please ensure FFmpeg is installed or bundled.")]
    FfmpegNotFound,

    /// Encoder process failed while running
    #[error("Encoder error: {0}")]
    EncoderError(String),

    /// Encode graph could not be constructed
    #[error("Failed to build encode graph: {0}")]
    GraphBuildError(String),

    /// Invalid application configuration
    #[error("Config error: {0}")]
    ConfigError(String),

    /// Invalid overlay layout definition
    #[error("Layout error: {0}")]
    LayoutError(String),

    /// Image decoding/encoding failed
    #[error("Image error: {0}")]
    ImageError(String),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// GPU rendering error (wgpu)
    #[error("GPU error: {0}")]
    GpuError(String),

    /// Output mode switch requested while the previous encode thread is alive
    #[error("Output pipeline is still shutting down")]
    OutputBusy,

    /// HUD screen lookup failed
    #[error("Unknown HUD '{name}'")]
    UnknownHud { name: String },

    /// Worker thread could not be started
    #[error("Failed to spawn thread: {0}")]
    ThreadSpawn(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl From<image::ImageError> for HudError {
    fn from(err: image::ImageError) -> Self {
        HudError::ImageError(err.to_string())
    }
}

impl From<String> for HudError {
    fn from(msg: String) -> Self {
        HudError::Other(msg)
    }
}

impl From<&str> for HudError {
    fn from(msg: &str) -> Self {
        HudError::Other(msg.to_string())
    }
}

/// Extension trait for adding context to Results.
///
/// # Example
/// ```ignore
/// use crate::error::{HudResult, ResultExt};
///
/// fn load(path: &Path) -> HudResult<String> {
///     std::fs::read_to_string(path).context("failed to read layout")
/// }
/// ```
pub trait ResultExt<T> {
    /// Add context to an error, converting it to HudError::Other.
    fn context(self, msg: &str) -> HudResult<T>;

    /// Add context lazily (only evaluated on error).
    fn with_context<F: FnOnce() -> String>(self, f: F) -> HudResult<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn context(self, msg: &str) -> HudResult<T> {
        self.map_err(|e| HudError::Other(format!("{}: {}", msg, e)))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> HudResult<T> {
        self.map_err(|e| HudError::Other(format!("{}: {}", f(), e)))
    }
}

/// Type alias for Results using HudError.
pub type HudResult<T> = Result<T, HudError>;
