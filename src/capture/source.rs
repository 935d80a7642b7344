//! Camera sources.
//!
//! A source yields frames in capture order. Pulling may block for up to the
//! source's own poll timeout but never indefinitely, so the capture thread
//! can observe shutdown between pulls.

use std::io::Read;
use std::process::{Child, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::frame::CameraFrame;
use crate::config::CameraConfig;
use crate::error::{HudError, HudResult};

/// Outcome of one pull.
#[derive(Debug)]
pub enum SampleResult {
    /// A new frame.
    Frame(CameraFrame),
    /// Nothing available right now. Transient, retry.
    Empty,
    /// The source will never produce another frame.
    EndOfStream,
}

/// A live camera feed.
pub trait CameraSource: Send {
    /// Human readable identifier used in logs.
    fn name(&self) -> &str;

    /// Pull the next frame.
    fn pull_sample(&mut self) -> SampleResult;
}

/// Frames buffered between the ffmpeg reader and the sync thread.
const READER_QUEUE_FRAMES: usize = 2;

/// V4L2 camera read through an ffmpeg child process emitting raw RGBA.
pub struct FfmpegCameraSource {
    name: String,
    child: Child,
    reader: Option<JoinHandle<()>>,
    frames: flume::Receiver<CameraFrame>,
    poll_timeout: Duration,
}

impl FfmpegCameraSource {
    /// Start capturing from `device`.
    pub fn open(name: &str, device: &str, config: &CameraConfig) -> HudResult<Self> {
        let ffmpeg_path = crate::ffmpeg::require_ffmpeg()?;
        let args = capture_args(device, config);

        log::info!(
            "[CAPTURE] Opening {} ({}): ffmpeg {}",
            name,
            device,
            crate::ffmpeg::format_args_for_log(&args)
        );

        let mut child = crate::ffmpeg::create_hidden_command(&ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| HudError::CaptureError(format!("Failed to start ffmpeg for {}: {}", device, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| HudError::CaptureError("Failed to get ffmpeg stdout".to_string()))?;

        let (tx, rx) = flume::bounded(READER_QUEUE_FRAMES);
        let width = config.width;
        let height = config.height;
        let reader_name = name.to_string();

        let reader = std::thread::Builder::new()
            .name(format!("hud-camera-reader-{}", name))
            .spawn(move || read_frames(stdout, tx, width, height, &reader_name))
            .map_err(|e| HudError::ThreadSpawn(e.to_string()))?;

        Ok(Self {
            name: name.to_string(),
            child,
            reader: Some(reader),
            frames: rx,
            poll_timeout: Duration::from_millis(config.poll_timeout_ms),
        })
    }
}

impl CameraSource for FfmpegCameraSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn pull_sample(&mut self) -> SampleResult {
        pull_from(&self.frames, self.poll_timeout)
    }
}

/// Map a channel receive onto the sample protocol.
fn pull_from(frames: &flume::Receiver<CameraFrame>, timeout: Duration) -> SampleResult {
    match frames.recv_timeout(timeout) {
        Ok(frame) => SampleResult::Frame(frame),
        Err(flume::RecvTimeoutError::Timeout) => SampleResult::Empty,
        Err(flume::RecvTimeoutError::Disconnected) => SampleResult::EndOfStream,
    }
}

impl Drop for FfmpegCameraSource {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        log::info!("[CAPTURE] {} closed", self.name);
    }
}

/// ffmpeg arguments for a raw RGBA capture of one V4L2 device.
pub fn capture_args(device: &str, config: &CameraConfig) -> Vec<String> {
    vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-f".to_string(),
        "v4l2".to_string(),
        "-framerate".to_string(),
        config.fps.to_string(),
        "-video_size".to_string(),
        format!("{}x{}", config.width, config.height),
        "-i".to_string(),
        device.to_string(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pix_fmt".to_string(),
        "rgba".to_string(),
        "pipe:1".to_string(),
    ]
}

/// Slice a raw RGBA byte stream into frames.
///
/// Returns when the stream ends or the consumer disconnects. Dropping the
/// sender is how the source learns about end-of-stream.
fn read_frames(
    mut stream: impl Read,
    tx: flume::Sender<CameraFrame>,
    width: u32,
    height: u32,
    name: &str,
) {
    let frame_len = CameraFrame::rgba_len(width, height);
    let epoch = Instant::now();
    let mut frame_id = 0u64;

    loop {
        let mut buf = vec![0u8; frame_len];
        if let Err(e) = stream.read_exact(&mut buf) {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                log::info!("[CAPTURE] {} stream ended after {} frames", name, frame_id);
            } else {
                log::error!("[CAPTURE] {} read failed: {}", name, e);
            }
            break;
        }

        let pts = epoch.elapsed();
        let frame = CameraFrame::new(buf, width, height, pts, frame_id);
        frame_id += 1;

        if tx.send(frame).is_err() {
            break;
        }
    }
}
