//! Cross-camera timestamp alignment.
//!
//! The capture thread pulls one frame from each camera per iteration. When
//! their timestamps are more than one frame period apart it re-pulls from
//! the camera that is behind until the pair lines up, then publishes the
//! pair through the [`DoubleBufferSlot`]. Single-camera mode publishes the
//! same frame for both eyes.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use super::frame::{CameraFrame, FramePair};
use super::slot::DoubleBufferSlot;
use super::source::{CameraSource, SampleResult};
use crate::error::{HudError, HudResult};
use crate::shutdown::ShutdownFlag;

/// Counters reported when the capture thread exits.
#[derive(Debug, Default, Clone)]
pub struct SyncStats {
    /// Aligned pairs handed to the render thread.
    pub pairs_published: u64,
    /// Extra pulls made to close a timestamp gap.
    pub catchup_pulls: u64,
    /// Iterations abandoned because the gap never closed.
    pub pairs_dropped: u64,
    /// Transient empty samples seen.
    pub empty_samples: u64,
    /// Error that ended the loop, if any.
    pub error: Option<String>,
}

/// What one synchronizer iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// A pair was published.
    Published,
    /// Catch-up gave up; nothing was published.
    Dropped,
    /// Shutdown was observed mid-iteration.
    Stopped,
}

/// Pulls, aligns and publishes camera frames.
pub struct FrameSynchronizer {
    left: Box<dyn CameraSource>,
    right: Option<Box<dyn CameraSource>>,
    slot: Arc<DoubleBufferSlot<FramePair>>,
    frame_duration: Duration,
    max_catchup_pulls: u32,
    shutdown: ShutdownFlag,
    stats: SyncStats,
}

impl FrameSynchronizer {
    /// `right == None` selects single-camera mode.
    pub fn new(
        left: Box<dyn CameraSource>,
        right: Option<Box<dyn CameraSource>>,
        slot: Arc<DoubleBufferSlot<FramePair>>,
        frame_duration: Duration,
        max_catchup_pulls: u32,
        shutdown: ShutdownFlag,
    ) -> Self {
        Self {
            left,
            right,
            slot,
            frame_duration,
            max_catchup_pulls: max_catchup_pulls.max(1),
            shutdown,
            stats: SyncStats::default(),
        }
    }

    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    /// Pull until a frame arrives. `Ok(None)` means shutdown was requested.
    fn pull(
        source: &mut dyn CameraSource,
        shutdown: &ShutdownFlag,
        stats: &mut SyncStats,
    ) -> HudResult<Option<CameraFrame>> {
        loop {
            if shutdown.is_requested() {
                return Ok(None);
            }
            match source.pull_sample() {
                SampleResult::Frame(frame) => return Ok(Some(frame)),
                SampleResult::Empty => {
                    stats.empty_samples += 1;
                    log::debug!("[SYNC] Null sample from {}, retrying", source.name());
                },
                SampleResult::EndOfStream => {
                    return Err(HudError::CameraEndOfStream {
                        camera: source.name().to_string(),
                    });
                },
            }
        }
    }

    /// Run one pull/align/publish iteration.
    pub fn step(&mut self) -> HudResult<StepOutcome> {
        let mut left = match Self::pull(self.left.as_mut(), &self.shutdown, &mut self.stats)? {
            Some(frame) => frame,
            None => return Ok(StepOutcome::Stopped),
        };

        let right_source = match self.right.as_mut() {
            Some(source) => source,
            None => {
                self.slot.publish(FramePair {
                    right: left.clone(),
                    left,
                });
                self.stats.pairs_published += 1;
                return Ok(StepOutcome::Published);
            },
        };

        let mut right = match Self::pull(right_source.as_mut(), &self.shutdown, &mut self.stats)? {
            Some(frame) => frame,
            None => return Ok(StepOutcome::Stopped),
        };

        let mut pulls = 0u32;
        loop {
            let catch_up_right = left.pts > right.pts + self.frame_duration;
            let catch_up_left = right.pts > left.pts + self.frame_duration;
            if !catch_up_left && !catch_up_right {
                break;
            }

            if pulls >= self.max_catchup_pulls {
                log::warn!(
                    "[SYNC] Cameras still {:?} apart after {} catch-up pulls, dropping pair",
                    if catch_up_right {
                        left.pts - right.pts
                    } else {
                        right.pts - left.pts
                    },
                    pulls
                );
                self.stats.pairs_dropped += 1;
                return Ok(StepOutcome::Dropped);
            }
            pulls += 1;
            self.stats.catchup_pulls += 1;

            let (source, target) = if catch_up_right {
                (right_source.as_mut(), &mut right)
            } else {
                (self.left.as_mut(), &mut left)
            };
            log::trace!("[SYNC] Catching up {}", source.name());
            match Self::pull(source, &self.shutdown, &mut self.stats)? {
                Some(frame) => *target = frame,
                None => return Ok(StepOutcome::Stopped),
            }
        }

        self.slot.publish(FramePair { left, right });
        self.stats.pairs_published += 1;
        Ok(StepOutcome::Published)
    }

    /// Loop until shutdown or a fatal source error.
    ///
    /// End-of-stream from any camera requests global shutdown.
    pub fn run(mut self) -> SyncStats {
        log::info!(
            "[SYNC] Capture loop started ({} camera(s), tolerance {:?})",
            if self.right.is_some() { 2 } else { 1 },
            self.frame_duration
        );

        while !self.shutdown.is_requested() {
            if let Err(e) = self.step() {
                log::error!("[SYNC] {}", e);
                self.stats.error = Some(e.to_string());
                self.shutdown.request(&e.to_string());
                break;
            }
        }

        log::info!(
            "[SYNC] Capture loop finished: {} pairs, {} catch-up pulls, {} dropped",
            self.stats.pairs_published,
            self.stats.catchup_pulls,
            self.stats.pairs_dropped
        );
        self.stats
    }

    /// Start the capture thread.
    pub fn spawn(self) -> HudResult<JoinHandle<SyncStats>> {
        std::thread::Builder::new()
            .name("hud-capture".to_string())
            .spawn(move || self.run())
            .map_err(|e| HudError::ThreadSpawn(format!("capture: {}", e)))
    }
}
