//! The encode thread.
//!
//! Owns the encode graph for one output session. Each iteration waits on
//! the graph's backpressure signal, takes the newest published frame from
//! the triple buffer and pushes it, then sleeps away whatever is left of
//! the frame period so encode cadence does not drift.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::graph::{GraphFactory, GraphPlan, GraphStats};
use super::mode::OutputMode;
use super::triple::TripleReader;
use crate::error::{HudError, HudResult};
use crate::shutdown::ShutdownFlag;

/// Result of one encode session.
#[derive(Debug, Default, Clone)]
pub struct EncoderResult {
    /// Frames accepted by the graph.
    pub frames_pushed: u64,
    /// Frames the graph refused because it already had enough data.
    pub frames_refused: u64,
    /// Iterations where the graph signalled backpressure for a full period.
    pub backpressure_waits: u64,
    /// Iterations with no new frame published.
    pub idle_ticks: u64,
    /// Counters from the graph, if it was built and finished cleanly.
    pub graph: Option<GraphStats>,
    /// Whether a graph was ever constructed.
    pub graph_built: bool,
    /// Any error that occurred.
    pub error: Option<String>,
}

/// Pacing delay after an iteration that took `processing`.
pub fn pacing_delay(frame_duration: Duration, processing: Duration) -> Duration {
    frame_duration.saturating_sub(processing)
}

/// Handle to a running encode thread.
pub struct EncodeThread {
    mode: OutputMode,
    thread: Option<JoinHandle<EncoderResult>>,
    stop_signal: Arc<AtomicBool>,
}

impl EncodeThread {
    /// Start the encode thread for `plan`.
    ///
    /// `started` is raised once the graph is running and lowered before it
    /// is torn down. A graph that cannot be built requests global shutdown.
    pub fn spawn(
        plan: GraphPlan,
        factory: Arc<dyn GraphFactory>,
        reader: TripleReader,
        started: Arc<AtomicBool>,
        shutdown: ShutdownFlag,
    ) -> HudResult<Self> {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let stop_signal_clone = Arc::clone(&stop_signal);
        let mode = plan.mode;

        let thread = std::thread::Builder::new()
            .name("hud-encode".to_string())
            .spawn(move || {
                encode_thread(plan, factory, reader, started, stop_signal_clone, shutdown)
            })
            .map_err(|e| HudError::ThreadSpawn(format!("encode: {}", e)))?;

        Ok(Self {
            mode,
            thread: Some(thread),
            stop_signal,
        })
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Ask the thread to flush and exit without waiting for it.
    pub fn request_stop(&self) {
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    pub fn is_stopping(&self) -> bool {
        self.stop_signal.load(Ordering::Relaxed)
    }

    /// Check if the thread is still running.
    pub fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .map(|t| !t.is_finished())
            .unwrap_or(false)
    }

    /// Stop the thread and wait for it to exit.
    pub fn join(mut self) -> EncoderResult {
        self.request_stop();
        match self.thread.take() {
            Some(thread) => thread.join().unwrap_or_else(|_| EncoderResult {
                error: Some("Encode thread panicked".to_string()),
                ..Default::default()
            }),
            None => EncoderResult::default(),
        }
    }
}

impl Drop for EncodeThread {
    fn drop(&mut self) {
        self.stop_signal.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Encode thread main function.
fn encode_thread(
    plan: GraphPlan,
    factory: Arc<dyn GraphFactory>,
    mut reader: TripleReader,
    started: Arc<AtomicBool>,
    stop_signal: Arc<AtomicBool>,
    shutdown: ShutdownFlag,
) -> EncoderResult {
    let mut result = EncoderResult::default();
    let should_stop = || stop_signal.load(Ordering::Relaxed) || shutdown.is_requested();

    if should_stop() {
        log::info!("[OUTPUT] {} cancelled before the encode graph was built", plan.mode);
        return result;
    }

    let mut graph = match factory.build(&plan) {
        Ok(graph) => graph,
        Err(e) => {
            log::error!("[OUTPUT] Could not build {} encode graph: {}", plan.mode, e);
            result.error = Some(e.to_string());
            shutdown.request(&format!("encode graph construction failed: {}", e));
            return result;
        },
    };
    result.graph_built = true;
    started.store(true, Ordering::SeqCst);

    let frame_duration = Duration::from_micros(1_000_000 / plan.fps.max(1) as u64);
    log::info!(
        "[OUTPUT] Encoding {} at {} fps ({}x{})",
        plan.mode,
        plan.fps,
        plan.width,
        plan.height
    );

    while !should_stop() {
        let tick_start = Instant::now();

        if !graph.is_alive() {
            log::error!("[OUTPUT] Encode graph stopped accepting frames");
            result.error = Some("encode graph exited".to_string());
            break;
        }

        if graph.wait_ready(frame_duration) {
            if let Some(frame) = reader.take_latest() {
                match graph.push_frame(frame) {
                    Ok(true) => result.frames_pushed += 1,
                    Ok(false) => result.frames_refused += 1,
                    Err(e) => {
                        log::error!("[OUTPUT] Failed to push frame: {}", e);
                        result.error = Some(e.to_string());
                        break;
                    },
                }
            } else {
                result.idle_ticks += 1;
            }
        } else {
            result.backpressure_waits += 1;
        }

        let delay = pacing_delay(frame_duration, tick_start.elapsed());
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }

    started.store(false, Ordering::SeqCst);
    match graph.finish() {
        Ok(stats) => result.graph = Some(stats),
        Err(e) => {
            log::error!("[OUTPUT] Encode graph teardown failed: {}", e);
            result.error.get_or_insert_with(|| e.to_string());
        },
    }

    log::info!(
        "[OUTPUT] Encode thread finished: {} pushed, {} refused, {} backpressure waits",
        result.frames_pushed,
        result.frames_refused,
        result.backpressure_waits
    );
    result
}
