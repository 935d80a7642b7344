//! Render-thread runtime.
//!
//! [`HudRuntime`] owns everything that lives on the render thread: the
//! canvas, the HUD state machine and element store, and the output pipeline
//! manager. Other threads talk to it only through a [`RuntimeHandle`]
//! (bounded control channel), the shared sensor snapshot and the camera
//! frame slot.
//!
//! One render tick:
//!
//! ```text
//! drain controls -> clear -> camera passthrough -> overlays -> present -> output
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::RwLock;
use serde::Serialize;

use crate::capture::{CameraSources, DoubleBufferSlot, FramePair, FrameSynchronizer, SyncStats};
use crate::config::AppConfig;
use crate::error::{HudError, HudResult, ResultExt};
use crate::hud::{
    render_huds, CameraView, ElementStore, HudManager, HudStatus, LayoutConfig, RenderContext,
    RenderReport, SensorSnapshot, SwitchRequest, TextRasterizer,
};
use crate::output::encoder::pacing_delay;
use crate::output::watchdog::RELOAD_FAILED_ANNOUNCEMENT;
use crate::output::{
    AlertFlags, Announcer, EncoderResult, GraphFactory, OutputMode, OutputPipelineManager,
    OutputStatus, PixelReadback,
};
use crate::rendering::texture::next_texture_id;
use crate::rendering::{project_eye, Canvas, Eye, EyeLayout, Texture, TextureCache};
use crate::shutdown::ShutdownFlag;

/// Control messages are dropped, not queued, beyond this many.
const CONTROL_QUEUE_DEPTH: usize = 64;

/// Requests from collaborator threads, applied at the start of a tick.
#[derive(Debug, Clone)]
pub enum ControlMessage {
    SwitchHud(SwitchRequest),
    /// Switch to the HUD bound to this key with its own transition.
    Hotkey(char),
    SetOutputMode(OutputMode),
    ReloadLayout,
    /// Save the last composited frame. `None` picks a timestamped name.
    Screenshot(Option<PathBuf>),
    Shutdown,
}

/// Cloneable sender side of the control channel.
#[derive(Clone)]
pub struct RuntimeHandle {
    tx: Sender<ControlMessage>,
}

impl RuntimeHandle {
    /// Queue a message without blocking.
    pub fn send(&self, message: ControlMessage) -> HudResult<()> {
        match self.tx.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(message)) => {
                log::warn!("[RUNTIME] Control queue full, dropping {:?}", message);
                Err(HudError::Other("control queue full".to_string()))
            },
            Err(TrySendError::Disconnected(_)) => {
                Err(HudError::Other("runtime has exited".to_string()))
            },
        }
    }

    pub fn switch_hud(&self, request: SwitchRequest) -> HudResult<()> {
        self.send(ControlMessage::SwitchHud(request))
    }

    pub fn hotkey(&self, key: char) -> HudResult<()> {
        self.send(ControlMessage::Hotkey(key))
    }

    pub fn set_output_mode(&self, mode: OutputMode) -> HudResult<()> {
        self.send(ControlMessage::SetOutputMode(mode))
    }
}

/// Snapshot for status queries.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeStatus {
    pub hud: HudStatus,
    pub output: OutputStatus,
    pub alerts: u32,
    pub frames_rendered: u64,
    pub camera_pairs: u64,
    pub fps: u32,
}

/// What [`HudRuntime::shutdown`] collected from the worker threads.
#[derive(Debug, Default)]
pub struct ShutdownReport {
    pub capture: Option<SyncStats>,
    pub encoder: Option<EncoderResult>,
    pub frames_rendered: u64,
}

/// Frames-per-second over one-second windows.
#[derive(Debug)]
struct FpsCounter {
    window_start: Option<Instant>,
    frames: u32,
    fps: u32,
}

impl FpsCounter {
    fn new() -> Self {
        Self {
            window_start: None,
            frames: 0,
            fps: 0,
        }
    }

    fn tick(&mut self, now: Instant) -> u32 {
        let start = *self.window_start.get_or_insert(now);
        self.frames += 1;
        let elapsed = now.duration_since(start);
        if elapsed >= Duration::from_secs(1) {
            self.fps = (self.frames as f64 / elapsed.as_secs_f64()).round() as u32;
            self.frames = 0;
            self.window_start = Some(now);
        }
        self.fps
    }
}

pub struct HudRuntime<C: Canvas + PixelReadback> {
    config: AppConfig,
    canvas: C,
    layout: EyeLayout,
    hud: HudManager,
    elements: ElementStore,
    textures: TextureCache,
    text: Option<Box<dyn TextRasterizer>>,
    sensors: Arc<RwLock<SensorSnapshot>>,
    frames: Arc<DoubleBufferSlot<FramePair>>,
    camera_streams: [u64; 2],
    output: OutputPipelineManager,
    announcer: Arc<dyn Announcer>,
    alerts: AlertFlags,
    shutdown: ShutdownFlag,
    control_tx: Sender<ControlMessage>,
    control_rx: Receiver<ControlMessage>,
    capture: Option<JoinHandle<SyncStats>>,
    fps: FpsCounter,
    frames_rendered: u64,
}

impl<C: Canvas + PixelReadback> HudRuntime<C> {
    /// Build the runtime and load the overlay layout, if one is configured.
    ///
    /// A configured layout that fails to load is a startup error.
    pub fn new(
        config: AppConfig,
        canvas: C,
        factory: Arc<dyn GraphFactory>,
        announcer: Arc<dyn Announcer>,
        shutdown: ShutdownFlag,
    ) -> HudResult<Self> {
        let layout = EyeLayout::new(config.display.eye_width, config.display.eye_height);
        let (fb_width, fb_height) = config.display.framebuffer_size();
        if canvas.size() != (fb_width, fb_height) {
            log::warn!(
                "[RUNTIME] Canvas is {:?}, display expects {}x{}",
                canvas.size(),
                fb_width,
                fb_height
            );
        }

        let alerts = AlertFlags::new();
        let output = OutputPipelineManager::new(
            config.output.clone(),
            factory,
            Arc::clone(&announcer),
            alerts.clone(),
            shutdown.clone(),
        );
        let (control_tx, control_rx) = crossbeam_channel::bounded(CONTROL_QUEUE_DEPTH);

        let mut runtime = Self {
            hud: HudManager::new(&config.hud),
            elements: ElementStore::new(),
            textures: TextureCache::default(),
            text: None,
            sensors: Arc::new(RwLock::new(SensorSnapshot::default())),
            frames: Arc::new(DoubleBufferSlot::new()),
            camera_streams: [next_texture_id(), next_texture_id()],
            output,
            announcer,
            alerts,
            shutdown,
            control_tx,
            control_rx,
            capture: None,
            fps: FpsCounter::new(),
            frames_rendered: 0,
            config,
            canvas,
            layout,
        };

        match runtime.config.layout_path.clone() {
            Some(path) => runtime.load_layout(&path)?,
            None => log::warn!("[RUNTIME] No layout configured, rendering camera only"),
        }
        Ok(runtime)
    }

    /// Handle for other threads to send control messages.
    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle {
            tx: self.control_tx.clone(),
        }
    }

    /// Sensor snapshot written by the sensor collaborator.
    pub fn sensors(&self) -> Arc<RwLock<SensorSnapshot>> {
        Arc::clone(&self.sensors)
    }

    /// Slot the capture thread publishes aligned frame pairs into.
    pub fn frame_slot(&self) -> Arc<DoubleBufferSlot<FramePair>> {
        Arc::clone(&self.frames)
    }

    pub fn set_text_rasterizer(&mut self, rasterizer: Box<dyn TextRasterizer>) {
        self.text = Some(rasterizer);
    }

    pub fn alerts(&self) -> &AlertFlags {
        &self.alerts
    }

    pub fn canvas(&self) -> &C {
        &self.canvas
    }

    /// Start the capture thread over `sources`, publishing into this
    /// runtime's frame slot.
    pub fn start_capture(&mut self, sources: CameraSources) -> HudResult<()> {
        if self.capture.is_some() {
            return Err(HudError::CaptureError("capture already running".to_string()));
        }
        let (left, right) = sources;
        let camera = &self.config.camera;
        let synchronizer = FrameSynchronizer::new(
            left,
            right,
            Arc::clone(&self.frames),
            Duration::from_micros(1_000_000 / camera.fps.max(1) as u64),
            camera.max_catchup_pulls,
            self.shutdown.clone(),
        );
        self.capture = Some(synchronizer.spawn()?);
        Ok(())
    }

    fn load_layout(&mut self, path: &Path) -> HudResult<()> {
        let layout = LayoutConfig::load(path)?;
        let mut cache = match path.parent() {
            Some(root) => TextureCache::with_root(root),
            None => TextureCache::default(),
        };
        let built = layout.build(&mut cache, &self.config.hud, self.hud.registry())?;

        self.hud.replace_registry(built.registry);
        self.elements = built.elements;
        self.textures = cache;
        log::info!(
            "[RUNTIME] Layout active: {} HUD(s), {} element(s), {} texture(s)",
            self.hud.registry().len(),
            self.elements.len(),
            self.textures.len()
        );
        Ok(())
    }

    /// Rebuild the layout from disk and swap it in.
    ///
    /// The new registry and elements are built completely before anything
    /// is replaced, so a failed reload leaves the running layout untouched.
    /// The current HUD is kept when a HUD of the same name still exists.
    pub fn reload_layout(&mut self) -> HudResult<()> {
        let result = match self.config.layout_path.clone() {
            Some(path) => self.load_layout(&path),
            None => Err(HudError::ConfigError("no layout path configured".to_string())),
        };

        match &result {
            Ok(()) => {
                if self.alerts.clear(AlertFlags::CONFIG_RELOAD_FAILED) {
                    log::info!("[RUNTIME] Layout reload recovered");
                }
            },
            Err(e) => {
                log::error!("[RUNTIME] Layout reload failed, keeping current layout: {}", e);
                if self.alerts.raise(AlertFlags::CONFIG_RELOAD_FAILED) {
                    self.announcer.announce(RELOAD_FAILED_ANNOUNCEMENT);
                }
            },
        }
        result
    }

    /// Write the last composited frame to a PNG.
    pub fn screenshot(&mut self, path: Option<PathBuf>) -> HudResult<PathBuf> {
        let path = path.unwrap_or_else(|| {
            let name = chrono::Local::now()
                .format("stereohud-snap-%Y%m%d_%H%M%S.png")
                .to_string();
            self.config.output.record_dir.join(name)
        });

        let (width, height) = self.canvas.size();
        let pixels = self.canvas.read_pixels()?;
        let image = image::RgbaImage::from_raw(width, height, pixels).ok_or_else(|| {
            HudError::ImageError(format!("readback is not {}x{} RGBA", width, height))
        })?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        image
            .save(&path)
            .with_context(|| format!("writing {}", path.display()))?;
        log::info!("[RUNTIME] Screenshot saved to {}", path.display());
        Ok(path)
    }

    fn drain_controls(&mut self, now: Instant) {
        while let Ok(message) = self.control_rx.try_recv() {
            log::debug!("[RUNTIME] Control: {:?}", message);
            match message {
                ControlMessage::SwitchHud(request) => self.switch_hud(&request, now),
                ControlMessage::Hotkey(key) => match self.hud.hud_for_hotkey(key) {
                    Some(name) => {
                        let request = SwitchRequest::new(name);
                        self.switch_hud(&request, now);
                    },
                    None => log::debug!("[RUNTIME] No HUD bound to '{}'", key),
                },
                ControlMessage::SetOutputMode(mode) => {
                    if let Err(e) = self.output.request_mode(mode) {
                        log::warn!("[RUNTIME] Output mode {} rejected: {}", mode, e);
                    }
                },
                ControlMessage::ReloadLayout => {
                    let _ = self.reload_layout();
                },
                ControlMessage::Screenshot(path) => {
                    if let Err(e) = self.screenshot(path) {
                        log::error!("[RUNTIME] Screenshot failed: {}", e);
                    }
                },
                ControlMessage::Shutdown => self.shutdown.request("shutdown requested"),
            }
        }
    }

    fn switch_hud(&mut self, request: &SwitchRequest, now: Instant) {
        match self.hud.switch_to_at(request, now) {
            Ok(true) => {},
            Ok(false) => log::debug!("[RUNTIME] Already on HUD '{}'", request.hud),
            Err(e) => log::warn!("[RUNTIME] {}", e),
        }
    }

    /// Draw the newest camera pair into both eyes.
    fn draw_cameras(&mut self) {
        let Some((pair, _fresh)) = self.frames.latest() else {
            return;
        };
        let crop = Some((self.config.camera.crop_x, self.config.camera.crop_width));

        let left = Texture::from_frame(self.camera_streams[0], &pair.left);
        project_eye(&mut self.canvas, &left, crop, Eye::Left, &self.layout);
        if pair.is_mono() {
            project_eye(&mut self.canvas, &left, crop, Eye::Right, &self.layout);
        } else {
            let right = Texture::from_frame(self.camera_streams[1], &pair.right);
            project_eye(&mut self.canvas, &right, crop, Eye::Right, &self.layout);
        }
    }

    /// Compose and emit one frame.
    ///
    /// Present failures are returned; output pipeline problems are logged
    /// and never fail the tick.
    pub fn render_tick(&mut self, now: Instant) -> HudResult<RenderReport> {
        self.drain_controls(now);

        self.canvas.clear([0, 0, 0, 255]);
        self.draw_cameras();

        let fps = self.fps.tick(now);
        let mut sensors = self.sensors.read().clone();
        sensors.fps = fps;

        let camera = &self.config.camera;
        let ctx = RenderContext {
            layout: self.layout,
            camera: CameraView {
                crop_x: camera.crop_x as i32,
                crop_width: camera.crop_width as i32,
                height: camera.height as i32,
            },
            stereo_offset: self.config.display.stereo_offset,
            pitch_offset: self.config.display.pitch_offset as f64,
            sensors: &sensors,
            output_started: self.output.is_started(),
            output_mode: self.output.mode(),
            now,
            wall_clock: chrono::Local::now(),
        };
        let text = self.text.as_deref_mut().map(|t| t as &mut dyn TextRasterizer);
        let report = render_huds(&mut self.canvas, &mut self.hud, &mut self.elements, &ctx, text);

        self.canvas.present()?;

        if let Err(e) = self.output.on_render_tick(&mut self.canvas, now) {
            log::warn!("[RUNTIME] Output step failed: {}", e);
        }

        self.frames_rendered += 1;
        Ok(report)
    }

    /// Render at `fps` until shutdown is requested.
    pub fn run(&mut self, fps: u32) -> HudResult<()> {
        let frame_duration = Duration::from_micros(1_000_000 / fps.max(1) as u64);
        log::info!("[RUNTIME] Render loop started at {} fps", fps);

        while !self.shutdown.is_requested() {
            let tick_start = Instant::now();
            if let Err(e) = self.render_tick(tick_start) {
                log::error!("[RUNTIME] Render tick failed: {}", e);
                self.shutdown.request(&e.to_string());
                return Err(e);
            }
            let delay = pacing_delay(frame_duration, tick_start.elapsed());
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
        }
        Ok(())
    }

    pub fn status(&self) -> RuntimeStatus {
        RuntimeStatus {
            hud: self.hud.status(),
            output: self.output.status(),
            alerts: self.alerts.bits(),
            frames_rendered: self.frames_rendered,
            camera_pairs: self.frames.generation(),
            fps: self.fps.fps,
        }
    }

    /// Stop every worker, producers first, and collect their results.
    pub fn shutdown(&mut self) -> ShutdownReport {
        self.shutdown.request("runtime shutting down");

        let capture = self.capture.take().map(|thread| {
            thread.join().unwrap_or_else(|_| SyncStats {
                error: Some("Capture thread panicked".to_string()),
                ..Default::default()
            })
        });
        let encoder = self.output.shutdown();

        log::info!("[RUNTIME] Stopped after {} frames", self.frames_rendered);
        ShutdownReport {
            capture,
            encoder,
            frames_rendered: self.frames_rendered,
        }
    }
}

impl<C: Canvas + PixelReadback> Drop for HudRuntime<C> {
    fn drop(&mut self) {
        if self.capture.is_some() || self.output.encoder_running() {
            self.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CameraFrame;
    use crate::config::{CameraConfig, DisplayConfig, OutputConfig};
    use crate::output::{EncodeGraph, GraphPlan, GraphStats};
    use crate::rendering::SoftwareCanvas;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingAnnouncer {
        said: Mutex<Vec<String>>,
    }

    impl Announcer for RecordingAnnouncer {
        fn announce(&self, text: &str) {
            self.said.lock().push(text.to_string());
        }
    }

    struct NullGraph;

    impl EncodeGraph for NullGraph {
        fn wants_data(&self) -> bool {
            true
        }

        fn wait_ready(&self, _timeout: Duration) -> bool {
            true
        }

        fn push_frame(&mut self, _frame: &[u8]) -> HudResult<bool> {
            Ok(true)
        }

        fn is_alive(&self) -> bool {
            true
        }

        fn finish(self: Box<Self>) -> HudResult<GraphStats> {
            Ok(GraphStats::default())
        }
    }

    struct NullFactory;

    impl GraphFactory for NullFactory {
        fn build(&self, _plan: &GraphPlan) -> HudResult<Box<dyn EncodeGraph>> {
            Ok(Box::new(NullGraph))
        }
    }

    const LAYOUT: &str = r#"{
        "huds": [
            { "name": "main", "hotkey": "1" },
            { "name": "map", "hotkey": "2", "transition": "fade", "transitionDurationMs": 100 }
        ],
        "elements": [
            { "name": "reticle", "type": "static", "file": "reticle.png", "x": 8, "y": 8, "huds": ["main"] }
        ]
    }"#;

    const RELOADED: &str = r#"{
        "huds": [ { "name": "map" }, { "name": "extra" } ],
        "elements": []
    }"#;

    struct Fixture {
        runtime: HudRuntime<SoftwareCanvas>,
        announcer: Arc<RecordingAnnouncer>,
        shutdown: ShutdownFlag,
        dir: PathBuf,
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            self.runtime.shutdown();
            let _ = std::fs::remove_dir_all(&self.dir);
        }
    }

    fn fixture(name: &str) -> Fixture {
        let dir = std::env::temp_dir().join(format!("stereohud-runtime-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        image::RgbaImage::from_pixel(4, 4, image::Rgba([255, 255, 255, 255]))
            .save(dir.join("reticle.png"))
            .unwrap();
        let layout_path = dir.join("layout.json");
        std::fs::write(&layout_path, LAYOUT).unwrap();

        let config = AppConfig {
            display: DisplayConfig {
                eye_width: 64,
                eye_height: 32,
                ..Default::default()
            },
            camera: CameraConfig {
                crop_x: 0,
                crop_width: 8,
                ..Default::default()
            },
            output: OutputConfig {
                record_dir: dir.clone(),
                ..Default::default()
            },
            layout_path: Some(layout_path),
            ..Default::default()
        };

        let announcer = Arc::new(RecordingAnnouncer::default());
        let shutdown = ShutdownFlag::new();
        let runtime = HudRuntime::new(
            config,
            SoftwareCanvas::new(128, 32),
            Arc::new(NullFactory),
            announcer.clone(),
            shutdown.clone(),
        )
        .unwrap();
        Fixture {
            runtime,
            announcer,
            shutdown,
            dir,
        }
    }

    #[test]
    fn test_overlay_drawn_in_both_eyes() {
        let mut f = fixture("overlay");
        let report = f.runtime.render_tick(Instant::now()).unwrap();
        assert_eq!(report.elements_drawn, 1);

        let canvas = f.runtime.canvas();
        assert_eq!(canvas.pixel(8, 8), Some([255, 255, 255, 255]));
        assert_eq!(canvas.pixel(64 + 8, 8), Some([255, 255, 255, 255]));
        assert_eq!(canvas.pixel(0, 0), Some([0, 0, 0, 255]));
    }

    #[test]
    fn test_mono_camera_fills_both_eyes() {
        let mut f = fixture("camera");
        let red = [255u8, 0, 0, 255].repeat(8 * 8);
        let frame = CameraFrame::new(red, 8, 8, Duration::ZERO, 1);
        f.runtime.frame_slot().publish(FramePair {
            left: frame.clone(),
            right: frame,
        });

        f.runtime.render_tick(Instant::now()).unwrap();
        let canvas = f.runtime.canvas();
        assert_eq!(canvas.pixel(0, 0), Some([255, 0, 0, 255]));
        assert_eq!(canvas.pixel(64 + 63, 31), Some([255, 0, 0, 255]));
        assert_eq!(f.runtime.status().camera_pairs, 1);
    }

    #[test]
    fn test_hotkey_switches_hud() {
        let mut f = fixture("hotkey");
        let t0 = Instant::now();
        f.runtime.handle().hotkey('2').unwrap();
        f.runtime.handle().hotkey('9').unwrap();

        f.runtime.render_tick(t0).unwrap();
        assert!(f.runtime.status().hud.in_transition);

        f.runtime.render_tick(t0 + Duration::from_millis(500)).unwrap();
        let status = f.runtime.status();
        assert!(!status.hud.in_transition);
        assert_eq!(status.hud.current_name.as_deref(), Some("map"));
        assert_eq!(status.frames_rendered, 2);
    }

    #[test]
    fn test_unknown_hud_is_ignored() {
        let mut f = fixture("unknown");
        f.runtime
            .handle()
            .switch_hud(SwitchRequest::new("nowhere"))
            .unwrap();
        f.runtime.render_tick(Instant::now()).unwrap();
        assert_eq!(f.runtime.status().hud.current_name.as_deref(), Some("main"));
    }

    #[test]
    fn test_failed_reload_keeps_layout_and_alerts() {
        let mut f = fixture("reload");
        f.runtime.handle().hotkey('2').unwrap();
        let t0 = Instant::now();
        f.runtime.render_tick(t0).unwrap();
        f.runtime.render_tick(t0 + Duration::from_secs(1)).unwrap();

        let layout_path = f.dir.join("layout.json");
        std::fs::write(&layout_path, "{ not json").unwrap();
        assert!(f.runtime.reload_layout().is_err());
        assert!(f.runtime.alerts().contains(AlertFlags::CONFIG_RELOAD_FAILED));
        assert_eq!(f.runtime.status().hud.current_name.as_deref(), Some("map"));
        assert_eq!(*f.announcer.said.lock(), vec![RELOAD_FAILED_ANNOUNCEMENT]);

        // A second failure does not repeat the announcement
        assert!(f.runtime.reload_layout().is_err());
        assert_eq!(f.announcer.said.lock().len(), 1);

        std::fs::write(&layout_path, RELOADED).unwrap();
        f.runtime.reload_layout().unwrap();
        assert!(!f.runtime.alerts().contains(AlertFlags::CONFIG_RELOAD_FAILED));
        // "map" keeps its id even though it is listed first now
        let status = f.runtime.status();
        assert_eq!(status.hud.current_name.as_deref(), Some("map"));
        assert_eq!(status.hud.current_id, Some(1));
        f.runtime.handle().switch_hud(SwitchRequest::new("extra")).unwrap();
        f.runtime.render_tick(t0 + Duration::from_secs(2)).unwrap();
        assert_eq!(f.runtime.status().hud.current_id, Some(2));
    }

    #[test]
    fn test_screenshot_writes_png() {
        let mut f = fixture("screenshot");
        f.runtime.render_tick(Instant::now()).unwrap();

        let path = f.runtime.screenshot(None).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("stereohud-snap-") && name.ends_with(".png"));

        let image = image::open(&path).unwrap().to_rgba8();
        assert_eq!(image.dimensions(), (128, 32));
        assert_eq!(image.get_pixel(8, 8).0, [255, 255, 255, 255]);
    }

    #[test]
    fn test_output_mode_and_shutdown_messages() {
        let mut f = fixture("output");
        let handle = f.runtime.handle();
        handle.set_output_mode(OutputMode::Stream).unwrap();
        f.runtime.render_tick(Instant::now()).unwrap();
        assert_eq!(f.runtime.status().output.mode, OutputMode::Stream);
        assert_eq!(*f.announcer.said.lock(), vec!["Starting streaming."]);

        handle.send(ControlMessage::Shutdown).unwrap();
        f.runtime.render_tick(Instant::now()).unwrap();
        assert!(f.shutdown.is_requested());

        let report = f.runtime.shutdown();
        assert!(report.capture.is_none());
        assert_eq!(report.frames_rendered, 2);
        assert!(!f.runtime.status().output.encoder_running);
    }

    #[test]
    fn test_status_serializes_camel_case() {
        let f = fixture("status");
        let json = serde_json::to_value(f.runtime.status()).unwrap();
        assert_eq!(json["hud"]["currentName"], "main");
        assert_eq!(json["output"]["mode"], "disabled");
        assert_eq!(json["framesRendered"], 0);
    }
}
