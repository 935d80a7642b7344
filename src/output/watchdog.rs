//! Recording liveness check and user-visible alerts.
//!
//! While a record-containing mode is running, the render thread asks
//! [`FileGrowthWatchdog`] every check interval whether the recording file
//! is still growing. A file that stops growing raises
//! [`AlertFlags::RECORDING_STALLED`] and is announced once; the pipeline
//! keeps running and the alert clears when growth resumes.

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const STALL_ANNOUNCEMENT: &str = "There is potentially an error with recording.";
pub const RELOAD_FAILED_ANNOUNCEMENT: &str = "Configuration reload failed.";

/// Spoken/visual announcements. Implemented by the command collaborator.
pub trait Announcer: Send + Sync {
    fn announce(&self, text: &str);
}

/// Announcer that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAnnouncer;

impl Announcer for LogAnnouncer {
    fn announce(&self, text: &str) {
        log::info!("[OUTPUT] Announce: {}", text);
    }
}

/// Shared set of active alert bits, readable from any thread.
#[derive(Debug, Default, Clone)]
pub struct AlertFlags {
    bits: Arc<AtomicU32>,
}

impl AlertFlags {
    pub const RECORDING_STALLED: u32 = 1 << 0;
    pub const CONFIG_RELOAD_FAILED: u32 = 1 << 1;

    pub fn new() -> Self {
        Self::default()
    }

    /// Set `flag`. Returns true if it was not already set.
    pub fn raise(&self, flag: u32) -> bool {
        self.bits.fetch_or(flag, Ordering::SeqCst) & flag == 0
    }

    /// Clear `flag`. Returns true if it was set.
    pub fn clear(&self, flag: u32) -> bool {
        self.bits.fetch_and(!flag, Ordering::SeqCst) & flag != 0
    }

    pub fn contains(&self, flag: u32) -> bool {
        self.bits.load(Ordering::Relaxed) & flag != 0
    }

    pub fn bits(&self) -> u32 {
        self.bits.load(Ordering::Relaxed)
    }
}

/// Outcome of one watchdog poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogVerdict {
    /// Not time for a check yet.
    Skipped,
    Growing,
    /// Not grown this check, below the stall threshold.
    Suspect,
    /// Threshold reached, alert newly raised.
    Stalled,
    /// Still stalled, alert already raised.
    StillStalled,
}

/// Compares recording file sizes across checks.
#[derive(Debug)]
pub struct FileGrowthWatchdog {
    interval: Duration,
    threshold: u32,
    last_check: Option<Instant>,
    last_size: Option<u64>,
    stalled_checks: u32,
    alerted: bool,
}

impl FileGrowthWatchdog {
    pub fn new(interval: Duration, threshold: u32) -> Self {
        Self {
            interval,
            threshold: threshold.max(1),
            last_check: None,
            last_size: None,
            stalled_checks: 0,
            alerted: false,
        }
    }

    /// Forget history, e.g. when a new recording starts. The first check
    /// happens one interval after `now`.
    pub fn reset(&mut self, now: Instant) {
        self.last_check = Some(now);
        self.last_size = None;
        self.stalled_checks = 0;
        self.alerted = false;
    }

    /// Poll the file at `path` if the check interval has elapsed.
    ///
    /// A missing file counts as size zero so a recording that never
    /// produced a file is reported as stalled too.
    pub fn check(&mut self, path: &Path, now: Instant) -> WatchdogVerdict {
        match self.last_check {
            Some(last) if now.duration_since(last) < self.interval => return WatchdogVerdict::Skipped,
            None => {
                self.last_check = Some(now);
                return WatchdogVerdict::Skipped;
            },
            _ => {},
        }
        self.last_check = Some(now);

        let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        let grew = self.last_size.map_or(size > 0, |last| size > last);
        self.last_size = Some(size);

        if grew {
            self.stalled_checks = 0;
            self.alerted = false;
            return WatchdogVerdict::Growing;
        }

        self.stalled_checks += 1;
        if self.stalled_checks < self.threshold {
            log::debug!(
                "[WATCHDOG] {} did not grow ({} bytes, check {})",
                path.display(),
                size,
                self.stalled_checks
            );
            return WatchdogVerdict::Suspect;
        }

        if self.alerted {
            return WatchdogVerdict::StillStalled;
        }
        self.alerted = true;
        log::error!(
            "[WATCHDOG] {}: file size is not increasing ({} bytes after {} checks)",
            path.display(),
            size,
            self.stalled_checks
        );
        WatchdogVerdict::Stalled
    }
}
