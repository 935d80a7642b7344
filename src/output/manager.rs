//! Output pipeline manager.
//!
//! Owned by the render thread. Tracks the requested output mode, runs the
//! readback ring every tick while output is enabled, publishes frames into
//! the triple buffer and owns the encode thread for the current session.
//!
//! The encode thread is started lazily on the first render tick after a
//! mode is enabled, so a mode that is switched off again before the next
//! tick never builds an encode graph.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use super::encoder::{EncodeThread, EncoderResult};
use super::graph::{recording_filename, GraphFactory, GraphPlan};
use super::mode::OutputMode;
use super::readback::{PixelReadback, ReadbackRing};
use super::triple::{triple_buffer, TripleWriter};
use super::watchdog::{AlertFlags, Announcer, FileGrowthWatchdog, WatchdogVerdict, STALL_ANNOUNCEMENT};
use crate::config::OutputConfig;
use crate::error::{HudError, HudResult};
use crate::shutdown::ShutdownFlag;

/// Snapshot of the output pipeline for status queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputStatus {
    pub mode: OutputMode,
    pub started: bool,
    pub encoder_running: bool,
    pub output_path: Option<PathBuf>,
    pub alerts: u32,
    pub frames_mapped: u64,
    pub frames_reused: u64,
}

pub struct OutputPipelineManager {
    config: OutputConfig,
    factory: Arc<dyn GraphFactory>,
    announcer: Arc<dyn Announcer>,
    alerts: AlertFlags,
    shutdown: ShutdownFlag,
    mode: OutputMode,
    readback: ReadbackRing,
    writer: Option<TripleWriter>,
    encode: Option<EncodeThread>,
    started: Arc<AtomicBool>,
    output_path: Option<PathBuf>,
    watchdog: FileGrowthWatchdog,
    last_result: Option<EncoderResult>,
}

impl OutputPipelineManager {
    pub fn new(
        config: OutputConfig,
        factory: Arc<dyn GraphFactory>,
        announcer: Arc<dyn Announcer>,
        alerts: AlertFlags,
        shutdown: ShutdownFlag,
    ) -> Self {
        let watchdog = FileGrowthWatchdog::new(config.watchdog_interval(), config.stall_threshold);
        Self {
            config,
            factory,
            announcer,
            alerts,
            shutdown,
            mode: OutputMode::Disabled,
            readback: ReadbackRing::new(),
            writer: None,
            encode: None,
            started: Arc::new(AtomicBool::new(false)),
            output_path: None,
            watchdog,
            last_result: None,
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// True while an encode graph is running.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Relaxed)
    }

    pub fn encoder_running(&self) -> bool {
        self.encode.as_ref().is_some_and(|t| t.is_running())
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.output_path.as_deref()
    }

    pub fn alerts(&self) -> &AlertFlags {
        &self.alerts
    }

    /// Result of the most recently joined encode session.
    pub fn last_result(&self) -> Option<&EncoderResult> {
        self.last_result.as_ref()
    }

    /// Replace output settings. Takes effect with the next session.
    pub fn set_config(&mut self, config: OutputConfig) {
        self.watchdog = FileGrowthWatchdog::new(config.watchdog_interval(), config.stall_threshold);
        self.config = config;
    }

    /// Switch output mode.
    ///
    /// Returns `Ok(false)` for a repeat of the current mode. Enabling a mode
    /// while the previous session's encode thread is still alive fails with
    /// [`HudError::OutputBusy`].
    pub fn request_mode(&mut self, mode: OutputMode) -> HudResult<bool> {
        if mode == self.mode {
            log::info!("[OUTPUT] Output mode unchanged ({})", mode);
            return Ok(false);
        }

        self.reap();

        if mode.is_enabled() && self.encode.is_some() {
            log::warn!(
                "[OUTPUT] Cannot switch to {} while the {} encoder is still running",
                mode,
                self.mode
            );
            return Err(HudError::OutputBusy);
        }

        log::info!("[OUTPUT] Output mode {} -> {}", self.mode, mode);
        self.announcer.announce(mode.announcement());
        self.mode = mode;

        if mode.is_enabled() {
            self.readback.reset();
            self.watchdog.reset(Instant::now());
        } else {
            if let Some(encode) = &self.encode {
                encode.request_stop();
            }
            self.writer = None;
            if self.alerts.clear(AlertFlags::RECORDING_STALLED) {
                log::debug!("[OUTPUT] Cleared recording alert");
            }
        }
        Ok(true)
    }

    /// Join an encode thread that has exited.
    fn reap(&mut self) {
        let finished = self.encode.as_ref().is_some_and(|t| !t.is_running());
        if !finished {
            return;
        }
        let Some(encode) = self.encode.take() else {
            return;
        };
        let stopped = encode.is_stopping();
        let session_mode = encode.mode();
        let result = encode.join();

        if !stopped && self.mode == session_mode {
            // The session died on its own
            log::error!(
                "[OUTPUT] {} encoder exited: {}",
                session_mode,
                result.error.as_deref().unwrap_or("no error reported")
            );
            self.mode = OutputMode::Disabled;
            self.writer = None;
        }
        self.last_result = Some(result);
    }

    fn start_session(&mut self, width: u32, height: u32) -> HudResult<()> {
        let record_path = self
            .mode
            .includes_record()
            .then(|| recording_filename(&self.config.record_dir, chrono::Local::now()));
        let plan = GraphPlan::for_mode(self.mode, width, height, &self.config, record_path.clone())?;

        if let Some(path) = &record_path {
            log::info!("[OUTPUT] New recording: {}", path.display());
        }

        let (writer, reader) = triple_buffer();
        let encode = EncodeThread::spawn(
            plan,
            Arc::clone(&self.factory),
            reader,
            Arc::clone(&self.started),
            self.shutdown.clone(),
        )?;

        self.writer = Some(writer);
        self.encode = Some(encode);
        self.output_path = record_path;
        Ok(())
    }

    /// Per-tick output step, called after the frame is fully composited.
    ///
    /// Never blocks on the encoder. Transient readback failures are logged
    /// and skipped.
    pub fn on_render_tick(&mut self, source: &mut dyn PixelReadback, now: Instant) -> HudResult<()> {
        self.reap();
        if !self.mode.is_enabled() {
            return Ok(());
        }

        if self.encode.is_none() {
            let (width, height) = source.readback_size();
            if let Err(e) = self.start_session(width, height) {
                log::error!("[OUTPUT] Failed to start {} output: {}", self.mode, e);
                self.mode = OutputMode::Disabled;
                self.writer = None;
                return Err(e);
            }
        }

        self.poll_watchdog(now);

        match self.readback.tick(source) {
            Ok(Some(frame)) => {
                if let Some(writer) = self.writer.as_mut() {
                    writer.publish_from(frame);
                }
            },
            Ok(None) => {},
            Err(e) => log::warn!("[READBACK] Readback skipped this tick: {}", e),
        }
        Ok(())
    }

    fn poll_watchdog(&mut self, now: Instant) {
        if !self.mode.includes_record() || !self.is_started() {
            return;
        }
        let Some(path) = self.output_path.as_deref() else {
            return;
        };
        match self.watchdog.check(path, now) {
            WatchdogVerdict::Stalled => {
                if self.alerts.raise(AlertFlags::RECORDING_STALLED) {
                    self.announcer.announce(STALL_ANNOUNCEMENT);
                }
            },
            WatchdogVerdict::Growing => {
                self.alerts.clear(AlertFlags::RECORDING_STALLED);
            },
            _ => {},
        }
    }

    pub fn status(&self) -> OutputStatus {
        OutputStatus {
            mode: self.mode,
            started: self.is_started(),
            encoder_running: self.encoder_running(),
            output_path: self.output_path.clone(),
            alerts: self.alerts.bits(),
            frames_mapped: self.readback.frames_mapped(),
            frames_reused: self.readback.frames_reused(),
        }
    }

    /// Stop output and wait for the encode thread to flush and exit.
    pub fn shutdown(&mut self) -> Option<EncoderResult> {
        self.mode = OutputMode::Disabled;
        self.writer = None;
        let encode = self.encode.take()?;
        log::info!("[OUTPUT] Waiting for {} encoder to finish", encode.mode());
        let result = encode.join();
        self.last_result = Some(result.clone());
        Some(result)
    }
}
