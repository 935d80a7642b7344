//! Stereo HUD compositor.
//!
//! Captures one or two cameras, overlays HUD screens for both eyes of a
//! side-by-side stereo display and optionally records and/or streams the
//! composited frame through ffmpeg.

pub mod capture;
pub mod config;
pub mod error;
pub mod ffmpeg;
pub mod hud;
pub mod logging;
pub mod output;
pub mod rendering;
pub mod runtime;
pub mod shutdown;

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use config::AppConfig;
use error::HudResult;
use output::{FfmpegGraphFactory, LogAnnouncer, OutputMode};
use rendering::{Canvas, GpuCanvas, SoftwareCanvas};
use runtime::{ControlMessage, HudRuntime, RuntimeHandle};
use shutdown::ShutdownFlag;

/// Default config location: `<config dir>/stereohud/config.json`.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("stereohud")
        .join("config.json")
}

/// Map one console line to a control message.
///
/// Digits select the HUD bound to that key; letters drive output and
/// maintenance.
pub fn parse_console_command(line: &str) -> Option<ControlMessage> {
    let line = line.trim();
    let mut chars = line.chars();
    let first = chars.next()?;
    if chars.next().is_some() {
        return match line {
            "quit" | "exit" => Some(ControlMessage::Shutdown),
            "reload" => Some(ControlMessage::ReloadLayout),
            _ => line
                .strip_prefix("shot ")
                .map(|path| ControlMessage::Screenshot(Some(PathBuf::from(path.trim())))),
        };
    }
    match first {
        'q' => Some(ControlMessage::Shutdown),
        'd' => Some(ControlMessage::SetOutputMode(OutputMode::Disabled)),
        'r' => Some(ControlMessage::SetOutputMode(OutputMode::Record)),
        's' => Some(ControlMessage::SetOutputMode(OutputMode::Stream)),
        'b' => Some(ControlMessage::SetOutputMode(OutputMode::RecordStream)),
        'l' => Some(ControlMessage::ReloadLayout),
        'p' => Some(ControlMessage::Screenshot(None)),
        c => Some(ControlMessage::Hotkey(c)),
    }
}

/// Forward console commands to the runtime until stdin closes.
fn spawn_console(handle: RuntimeHandle) -> HudResult<()> {
    std::thread::Builder::new()
        .name("hud-console".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                match parse_console_command(&line) {
                    Some(message) => {
                        if handle.send(message).is_err() {
                            break;
                        }
                    },
                    None => log::debug!("[RUNTIME] Ignoring console input '{}'", line.trim()),
                }
            }
        })
        .map_err(|e| error::HudError::ThreadSpawn(format!("console: {}", e)))?;
    Ok(())
}

fn run_with<C: Canvas + output::PixelReadback>(
    config: AppConfig,
    canvas: C,
    shutdown: ShutdownFlag,
) -> HudResult<()> {
    let factory = Arc::new(FfmpegGraphFactory::new(config.output.prefer_hardware));
    let sources = capture::open_sources(&config.camera)?;
    let fps = config.camera.fps;

    let mut runtime = HudRuntime::new(config, canvas, factory, Arc::new(LogAnnouncer), shutdown)?;
    runtime.start_capture(sources)?;
    spawn_console(runtime.handle())?;

    let result = runtime.run(fps);
    let report = runtime.shutdown();
    log::info!(
        "[RUNTIME] Exit: {} frames rendered, capture {:?}, encoder {:?}",
        report.frames_rendered,
        report.capture,
        report.encoder
    );
    result
}

/// Load configuration and run the pipeline until shutdown.
pub fn run(config_path: &Path) -> HudResult<()> {
    logging::init_logging(log::LevelFilter::Info);
    let config = AppConfig::load(config_path)?;
    let shutdown = ShutdownFlag::new();
    let (width, height) = config.display.framebuffer_size();

    match GpuCanvas::new(width, height) {
        Ok(canvas) => run_with(config, canvas, shutdown),
        Err(e) => {
            log::warn!("[GPU] {}, falling back to software compositing", e);
            run_with(config, SoftwareCanvas::new(width, height), shutdown)
        },
    }
}
