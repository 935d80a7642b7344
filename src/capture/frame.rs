//! Camera frame container.

use std::sync::Arc;
use std::time::{Duration, Instant};

/// One captured camera image.
///
/// Pixel bytes are reference counted so the synchronizer, the render
/// thread and texture handles can share them without copying.
#[derive(Clone)]
pub struct CameraFrame {
    /// Tightly packed or row-padded RGBA bytes.
    pub data: Arc<Vec<u8>>,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Bytes per row.
    pub stride: u32,
    /// Monotonic presentation timestamp relative to the source's start.
    pub pts: Duration,
    /// Wall-clock time when the frame was received.
    pub captured_at: Instant,
    /// Per-source monotonic frame counter.
    pub frame_id: u64,
}

impl std::fmt::Debug for CameraFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraFrame")
            .field("size", &(self.width, self.height))
            .field("pts", &self.pts)
            .field("frame_id", &self.frame_id)
            .finish()
    }
}

impl CameraFrame {
    /// Wrap tightly packed RGBA bytes.
    pub fn new(data: Vec<u8>, width: u32, height: u32, pts: Duration, frame_id: u64) -> Self {
        Self {
            data: Arc::new(data),
            width,
            height,
            stride: width * 4,
            pts,
            captured_at: Instant::now(),
            frame_id,
        }
    }

    /// Expected byte length of one tightly packed RGBA frame.
    pub fn rgba_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 4
    }

    /// True if both frames share the same pixel storage.
    pub fn same_buffer(&self, other: &CameraFrame) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

/// Time-aligned frames for the two eyes.
///
/// In single-camera mode both sides share one buffer.
#[derive(Clone, Debug)]
pub struct FramePair {
    pub left: CameraFrame,
    pub right: CameraFrame,
}

impl FramePair {
    /// Absolute capture-time difference between the two eyes.
    pub fn skew(&self) -> std::time::Duration {
        if self.left.pts > self.right.pts {
            self.left.pts - self.right.pts
        } else {
            self.right.pts - self.left.pts
        }
    }

    pub fn is_mono(&self) -> bool {
        self.left.same_buffer(&self.right)
    }
}
