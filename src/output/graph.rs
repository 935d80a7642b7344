//! Encode graphs.
//!
//! An encode graph accepts composited RGBA frames and writes them to a
//! local file, a network sink or both. [`GraphPlan`] describes the graph for
//! one output mode; a [`GraphFactory`] turns a plan into a running
//! [`EncodeGraph`]. The production factory runs ffmpeg with raw RGBA on
//! stdin, fed from a bounded channel by a dedicated writer thread.
//!
//! Frames pushed while the writer queue is full are refused and flip the
//! graph's [`BackpressureGate`] to "enough data"; the writer reopens it as
//! it drains.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Stdio};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use parking_lot::Mutex;

use super::backpressure::BackpressureGate;
use super::encoder_selection::{select_encoder, EncoderSettings};
use super::mode::OutputMode;
use crate::config::OutputConfig;
use crate::error::{HudError, HudResult};

/// How long `finish` waits for ffmpeg to flush and exit before killing it.
const FINISH_TIMEOUT: Duration = Duration::from_secs(10);

/// ffmpeg stderr lines kept for the exit error message.
const STDERR_TAIL_LINES: usize = 5;

/// Recording file name for a recording started at `now`.
pub fn recording_filename(dir: &Path, now: DateTime<Local>) -> PathBuf {
    dir.join(format!("stereohud-{}.mkv", now.format("%Y%m%d_%H%M%S")))
}

/// Everything needed to build the encode graph for one output mode.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphPlan {
    pub mode: OutputMode,
    /// Composited frame size (both eyes).
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub record_path: Option<PathBuf>,
    pub record_bitrate_kbps: u32,
    pub stream_width: u32,
    pub stream_height: u32,
    pub stream_bitrate_kbps: u32,
    /// RTMP endpoint used in stream-only mode.
    pub stream_url: String,
    /// RTP endpoint used for the network branch of record+stream mode.
    pub rtp_url: String,
    pub queue_frames: usize,
}

impl GraphPlan {
    /// Plan the graph for `mode` at the composited frame size.
    ///
    /// Record-containing modes need `record_path`.
    pub fn for_mode(
        mode: OutputMode,
        width: u32,
        height: u32,
        config: &OutputConfig,
        record_path: Option<PathBuf>,
    ) -> HudResult<Self> {
        if !mode.is_enabled() {
            return Err(HudError::GraphBuildError(
                "no encode graph for disabled output".to_string(),
            ));
        }
        if width == 0 || height == 0 {
            return Err(HudError::GraphBuildError(format!(
                "invalid frame size {}x{}",
                width, height
            )));
        }
        if mode.includes_record() && record_path.is_none() {
            return Err(HudError::GraphBuildError(format!(
                "{} mode requires a recording path",
                mode
            )));
        }

        Ok(Self {
            mode,
            width,
            height,
            fps: config.target_fps.max(1),
            record_path: if mode.includes_record() {
                record_path
            } else {
                None
            },
            record_bitrate_kbps: config.record_bitrate_kbps,
            stream_width: config.stream_width,
            stream_height: config.stream_height,
            stream_bitrate_kbps: config.stream_bitrate_kbps,
            stream_url: config.stream_url.clone(),
            rtp_url: format!("rtp://{}:{}", config.udp_host, config.udp_port),
            queue_frames: config.encoder_queue_frames.max(1),
        })
    }

    /// Size of one input frame in bytes.
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }

    fn scale_filter(&self) -> String {
        format!("scale={}:{}", self.stream_width, self.stream_height)
    }

    /// Full ffmpeg argument list for this plan.
    pub fn ffmpeg_args(&self, encoder: &EncoderSettings) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-y".to_string(),
            "-f".to_string(),
            "rawvideo".to_string(),
            "-pix_fmt".to_string(),
            "rgba".to_string(),
            "-s".to_string(),
            format!("{}x{}", self.width, self.height),
            "-r".to_string(),
            self.fps.to_string(),
            "-i".to_string(),
            "-".to_string(),
        ];

        let record_path = self
            .record_path
            .as_ref()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_default();

        match self.mode {
            OutputMode::Record => {
                args.extend(encoder.codec_args(self.record_bitrate_kbps, self.fps));
                args.extend(["-f".to_string(), "matroska".to_string(), record_path]);
            },
            OutputMode::Stream => {
                args.extend(["-vf".to_string(), self.scale_filter()]);
                args.extend(encoder.codec_args(self.stream_bitrate_kbps, self.fps * 2));
                args.extend(["-f".to_string(), "flv".to_string(), self.stream_url.clone()]);
            },
            OutputMode::RecordStream => {
                // One source fanned out to a full-size file and a scaled network branch
                args.extend([
                    "-filter_complex".to_string(),
                    format!("[0:v]split=2[rec][net];[net]{}[netout]", self.scale_filter()),
                    "-map".to_string(),
                    "[rec]".to_string(),
                ]);
                args.extend(encoder.codec_args(self.record_bitrate_kbps, self.fps));
                args.extend([
                    "-f".to_string(),
                    "matroska".to_string(),
                    record_path,
                    "-map".to_string(),
                    "[netout]".to_string(),
                ]);
                args.extend(encoder.codec_args(self.stream_bitrate_kbps, self.fps));
                args.extend(["-f".to_string(), "rtp".to_string(), self.rtp_url.clone()]);
            },
            OutputMode::Disabled => {},
        }

        args
    }
}

/// Counters reported when a graph is finished.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphStats {
    pub frames_written: u64,
    pub frames_refused: u64,
}

/// A running encode graph.
pub trait EncodeGraph: Send {
    /// Non-blocking backpressure check.
    fn wants_data(&self) -> bool;

    /// Block up to `timeout` until the graph wants data.
    fn wait_ready(&self, timeout: Duration) -> bool;

    /// Queue one frame. `Ok(false)` means the graph refused it because it
    /// already has enough data.
    fn push_frame(&mut self, frame: &[u8]) -> HudResult<bool>;

    /// False once the sink side has failed or exited.
    fn is_alive(&self) -> bool;

    /// Send end-of-stream, wait for the sink to flush and release it.
    fn finish(self: Box<Self>) -> HudResult<GraphStats>;
}

/// Builds encode graphs from plans. Called on the encode thread.
pub trait GraphFactory: Send + Sync {
    fn build(&self, plan: &GraphPlan) -> HudResult<Box<dyn EncodeGraph>>;
}

/// Factory that runs ffmpeg. The binary and encoder are resolved on the
/// first build and reused afterwards.
pub struct FfmpegGraphFactory {
    prefer_hardware: bool,
    resolved: Mutex<Option<(PathBuf, EncoderSettings)>>,
}

impl FfmpegGraphFactory {
    pub fn new(prefer_hardware: bool) -> Self {
        Self {
            prefer_hardware,
            resolved: Mutex::new(None),
        }
    }

    fn resolve(&self) -> HudResult<(PathBuf, EncoderSettings)> {
        let mut resolved = self.resolved.lock();
        if let Some(found) = resolved.as_ref() {
            return Ok(found.clone());
        }
        let ffmpeg_path = crate::ffmpeg::require_ffmpeg()?;
        let encoder = select_encoder(&ffmpeg_path, self.prefer_hardware);
        *resolved = Some((ffmpeg_path.clone(), encoder.clone()));
        Ok((ffmpeg_path, encoder))
    }
}

impl GraphFactory for FfmpegGraphFactory {
    fn build(&self, plan: &GraphPlan) -> HudResult<Box<dyn EncodeGraph>> {
        let (ffmpeg_path, encoder) = self
            .resolve()
            .map_err(|e| HudError::GraphBuildError(e.to_string()))?;
        let graph = FfmpegEncodeGraph::spawn(&ffmpeg_path, plan, &encoder)?;
        Ok(Box::new(graph))
    }
}

/// What the writer thread reports when it exits.
#[derive(Debug, Default)]
struct WriterOutcome {
    written: u64,
    error: Option<String>,
}

/// ffmpeg child process fed through a writer thread.
pub struct FfmpegEncodeGraph {
    child: Child,
    frames: Option<flume::Sender<Vec<u8>>>,
    writer: Option<JoinHandle<WriterOutcome>>,
    stderr: Option<JoinHandle<()>>,
    stderr_lines: Arc<Mutex<VecDeque<String>>>,
    gate: BackpressureGate,
    frame_len: usize,
    refused: u64,
}

impl FfmpegEncodeGraph {
    /// Start ffmpeg for `plan`.
    pub fn spawn(ffmpeg_path: &Path, plan: &GraphPlan, encoder: &EncoderSettings) -> HudResult<Self> {
        if let Some(parent) = plan.record_path.as_ref().and_then(|p| p.parent()) {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    HudError::GraphBuildError(format!("Failed to create {}: {}", parent.display(), e))
                })?;
            }
        }

        let args = plan.ffmpeg_args(encoder);
        log::info!(
            "[ENCODER] Starting {} graph: ffmpeg {}",
            plan.mode,
            crate::ffmpeg::format_args_for_log(&args)
        );

        let mut child = crate::ffmpeg::create_hidden_command(ffmpeg_path)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| HudError::GraphBuildError(format!("Failed to start FFmpeg: {}", e)))?;

        let stdin = match child.stdin.take() {
            Some(stdin) => stdin,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(HudError::GraphBuildError(
                    "Failed to get FFmpeg stdin".to_string(),
                ));
            },
        };

        let stderr_lines = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
        let stderr = match child.stderr.take() {
            Some(pipe) => {
                let tail = Arc::clone(&stderr_lines);
                let spawned = std::thread::Builder::new()
                    .name("hud-encode-stderr".to_string())
                    .spawn(move || drain_stderr(pipe, &tail));
                match spawned {
                    Ok(handle) => Some(handle),
                    Err(e) => {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(HudError::ThreadSpawn(e.to_string()));
                    },
                }
            },
            None => None,
        };

        let capacity = plan.queue_frames;
        let (tx, rx) = flume::bounded::<Vec<u8>>(capacity);
        let gate = BackpressureGate::new();
        let writer_gate = gate.clone();

        let writer = std::thread::Builder::new()
            .name("hud-encode-writer".to_string())
            .spawn(move || write_frames(stdin, rx, writer_gate, capacity));

        let writer = match writer {
            Ok(handle) => handle,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(HudError::ThreadSpawn(e.to_string()));
            },
        };

        Ok(Self {
            child,
            frames: Some(tx),
            writer: Some(writer),
            stderr,
            stderr_lines,
            gate,
            frame_len: plan.frame_len(),
            refused: 0,
        })
    }

    /// Wait for the child to exit, killing it after `timeout`.
    fn wait_child(&mut self, timeout: Duration) -> HudResult<std::process::ExitStatus> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = self.child.try_wait()? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                log::warn!("[ENCODER] FFmpeg did not exit after end of stream, killing it");
                let _ = self.child.kill();
                return Ok(self.child.wait()?);
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    }

    /// Last stderr lines. Call after the child has exited.
    fn stderr_tail(&mut self) -> String {
        if let Some(reader) = self.stderr.take() {
            let _ = reader.join();
        }
        let tail = self.stderr_lines.lock();
        tail.iter().map(String::as_str).collect::<Vec<_>>().join(" | ")
    }
}

/// Read ffmpeg's stderr until it closes so the pipe never fills up.
///
/// Every line goes to the debug log; the last few are kept in `tail`.
fn drain_stderr<R: Read>(stderr: R, tail: &Mutex<VecDeque<String>>) {
    let reader = BufReader::new(stderr);
    for line in reader.split(b'\n') {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                log::debug!("[ENCODER] FFmpeg stderr closed: {}", e);
                break;
            },
        };
        let line = String::from_utf8_lossy(&line).trim_end().to_string();
        if line.is_empty() {
            continue;
        }
        log::debug!("[ENCODER] ffmpeg: {}", line);
        let mut tail = tail.lock();
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
}

fn write_frames(
    mut stdin: ChildStdin,
    frames: flume::Receiver<Vec<u8>>,
    gate: BackpressureGate,
    capacity: usize,
) -> WriterOutcome {
    let mut outcome = WriterOutcome::default();

    for frame in frames.iter() {
        if let Err(e) = stdin.write_all(&frame) {
            log::error!("[ENCODER] Failed to write frame to FFmpeg: {}", e);
            outcome.error = Some(e.to_string());
            gate.close();
            return outcome;
        }
        outcome.written += 1;
        if frames.len() < capacity {
            gate.need_data();
        }
    }

    // Every sender is gone: closing stdin is ffmpeg's end of stream
    if let Err(e) = stdin.flush() {
        log::debug!("[ENCODER] Flush at end of stream failed: {}", e);
    }
    drop(stdin);
    log::debug!("[ENCODER] Writer finished after {} frames", outcome.written);
    outcome
}

impl EncodeGraph for FfmpegEncodeGraph {
    fn wants_data(&self) -> bool {
        self.gate.wants_data()
    }

    fn wait_ready(&self, timeout: Duration) -> bool {
        self.gate.wait_ready(timeout)
    }

    fn push_frame(&mut self, frame: &[u8]) -> HudResult<bool> {
        if frame.len() != self.frame_len {
            return Err(HudError::EncoderError(format!(
                "frame is {} bytes, expected {}",
                frame.len(),
                self.frame_len
            )));
        }
        let tx = self
            .frames
            .as_ref()
            .ok_or_else(|| HudError::EncoderError("encode graph already finished".to_string()))?;

        match tx.try_send(frame.to_vec()) {
            Ok(()) => {
                if tx.is_full() {
                    self.gate.enough_data();
                    // The writer may have drained between the two calls
                    if !tx.is_full() {
                        self.gate.need_data();
                    }
                }
                Ok(true)
            },
            Err(flume::TrySendError::Full(_)) => {
                self.refused += 1;
                self.gate.enough_data();
                if !tx.is_full() {
                    self.gate.need_data();
                }
                Ok(false)
            },
            Err(flume::TrySendError::Disconnected(_)) => Err(HudError::EncoderError(
                "FFmpeg writer exited".to_string(),
            )),
        }
    }

    fn is_alive(&self) -> bool {
        self.writer.as_ref().is_some_and(|w| !w.is_finished())
    }

    fn finish(mut self: Box<Self>) -> HudResult<GraphStats> {
        // Dropping the sender lets the writer drain, then close stdin
        self.frames.take();
        self.gate.close();

        let outcome = match self.writer.take() {
            Some(writer) => writer.join().unwrap_or_else(|_| WriterOutcome {
                written: 0,
                error: Some("writer thread panicked".to_string()),
            }),
            None => WriterOutcome::default(),
        };

        let status = self.wait_child(FINISH_TIMEOUT)?;
        let stats = GraphStats {
            frames_written: outcome.written,
            frames_refused: self.refused,
        };

        if !status.success() {
            let tail = self.stderr_tail();
            log::error!("[ENCODER] FFmpeg exited with {}: {}", status, tail);
            return Err(HudError::EncoderError(format!(
                "FFmpeg exited with {}: {}",
                status, tail
            )));
        }
        if let Some(error) = outcome.error {
            return Err(HudError::EncoderError(error));
        }

        log::info!(
            "[ENCODER] Graph finished: {} frames written, {} refused",
            stats.frames_written,
            stats.frames_refused
        );
        Ok(stats)
    }
}

impl Drop for FfmpegEncodeGraph {
    fn drop(&mut self) {
        // Only reached without finish() on an error path
        if self.frames.take().is_some() {
            self.gate.close();
            let _ = self.child.kill();
            let _ = self.child.wait();
            if let Some(writer) = self.writer.take() {
                let _ = writer.join();
            }
            if let Some(reader) = self.stderr.take() {
                let _ = reader.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn config() -> OutputConfig {
        OutputConfig {
            stream_width: 960,
            stream_height: 480,
            udp_host: "10.0.0.2".to_string(),
            ..Default::default()
        }
    }

    fn contains_pair(args: &[String], a: &str, b: &str) -> bool {
        args.windows(2).any(|w| w[0] == a && w[1] == b)
    }

    #[test]
    fn test_recording_filename_is_date_coded() {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        let path = recording_filename(Path::new("/rec"), now);
        assert_eq!(path, PathBuf::from("/rec/stereohud-20240309_070501.mkv"));
    }

    #[test]
    fn test_disabled_has_no_plan() {
        let err = GraphPlan::for_mode(OutputMode::Disabled, 100, 50, &config(), None).unwrap_err();
        assert!(matches!(err, HudError::GraphBuildError(_)));
    }

    #[test]
    fn test_record_requires_path() {
        assert!(GraphPlan::for_mode(OutputMode::Record, 100, 50, &config(), None).is_err());
        assert!(GraphPlan::for_mode(OutputMode::Stream, 100, 50, &config(), None).is_ok());
    }

    #[test]
    fn test_record_args() {
        let plan = GraphPlan::for_mode(
            OutputMode::Record,
            2880,
            1440,
            &config(),
            Some(PathBuf::from("out.mkv")),
        )
        .unwrap();
        assert_eq!(plan.frame_len(), 2880 * 1440 * 4);

        let args = plan.ffmpeg_args(&EncoderSettings::x264());
        assert!(contains_pair(&args, "-s", "2880x1440"));
        assert!(contains_pair(&args, "-pix_fmt", "rgba"));
        assert!(contains_pair(&args, "-i", "-"));
        assert!(contains_pair(&args, "-f", "matroska"));
        assert_eq!(args.last().map(String::as_str), Some("out.mkv"));
        assert!(!args.iter().any(|a| a.starts_with("scale=")));
    }

    #[test]
    fn test_stream_args_scale_to_stream_size() {
        let plan = GraphPlan::for_mode(OutputMode::Stream, 2880, 1440, &config(), None).unwrap();
        assert!(plan.record_path.is_none());
        let args = plan.ffmpeg_args(&EncoderSettings::x264());
        assert!(contains_pair(&args, "-vf", "scale=960:480"));
        assert!(contains_pair(&args, "-f", "flv"));
        assert!(contains_pair(&args, "-b:v", "8000k"));
        assert_eq!(args.last().map(String::as_str), Some("rtmp://127.0.0.1/live/hud"));
    }

    #[test]
    fn test_record_stream_fans_out() {
        let plan = GraphPlan::for_mode(
            OutputMode::RecordStream,
            2880,
            1440,
            &config(),
            Some(PathBuf::from("both.mkv")),
        )
        .unwrap();
        let args = plan.ffmpeg_args(&EncoderSettings::nvenc());
        assert!(args.iter().any(|a| a.contains("split=2") && a.contains("scale=960:480")));
        assert!(contains_pair(&args, "-map", "[rec]"));
        assert!(contains_pair(&args, "-map", "[netout]"));
        assert!(contains_pair(&args, "matroska", "both.mkv"));
        assert_eq!(args.last().map(String::as_str), Some("rtp://10.0.0.2:5000"));
        assert_eq!(args.iter().filter(|a| *a == "h264_nvenc").count(), 2);
    }

    #[test]
    fn test_stderr_drain_reads_everything_and_keeps_tail() {
        // Far more than a pipe buffer holds
        let text: String = (0..20_000).map(|i| format!("frame={} warning\n", i)).collect();
        let tail = Mutex::new(VecDeque::new());
        drain_stderr(std::io::Cursor::new(text.into_bytes()), &tail);

        let tail = tail.lock();
        assert_eq!(tail.len(), STDERR_TAIL_LINES);
        assert_eq!(tail.front().map(String::as_str), Some("frame=19995 warning"));
        assert_eq!(tail.back().map(String::as_str), Some("frame=19999 warning"));
    }

    #[test]
    fn test_factory_without_ffmpeg_is_build_error() {
        let factory = FfmpegGraphFactory::new(false);
        *factory.resolved.lock() = Some((
            PathBuf::from("/nonexistent/ffmpeg"),
            EncoderSettings::x264(),
        ));
        let plan = GraphPlan::for_mode(OutputMode::Stream, 64, 32, &config(), None).unwrap();
        let err = factory.build(&plan).err().unwrap();
        assert!(matches!(err, HudError::GraphBuildError(_)));
    }
}
