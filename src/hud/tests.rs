//! End-to-end HUD switching scenarios through the software canvas.

use std::time::{Duration, Instant};

use chrono::Local;

use super::element::{ElementKind, ElementStore, OverlayElement, StateTextures};
use super::renderer::{render_huds, CameraView, RenderContext};
use super::screen::HudMask;
use super::sensors::SensorSnapshot;
use super::transition::{FramePhase, HudManager, SwitchRequest};
use crate::config::HudDefaults;
use crate::output::mode::OutputMode;
use crate::rendering::canvas::tests::RecordingCanvas;
use crate::rendering::canvas::{Canvas, SoftwareCanvas};
use crate::rendering::coord::EyeLayout;
use crate::rendering::texture::Texture;

fn solid(label: &str, rgba: [u8; 4]) -> Texture {
    let pixels = rgba.iter().copied().cycle().take(8 * 8 * 4).collect();
    Texture::from_rgba(8, 8, pixels, label)
}

fn element(label: &str, huds: HudMask, x: i32, rgba: [u8; 4]) -> OverlayElement {
    let mut element = OverlayElement::new(label, ElementKind::Static(StateTextures::new(solid(label, rgba))));
    element.huds = huds;
    element.x = x;
    element.y = 4;
    element
}

struct Scene {
    manager: HudManager,
    store: ElementStore,
    sensors: SensorSnapshot,
}

impl Scene {
    fn new() -> Self {
        let mut manager = HudManager::new(&HudDefaults::default());
        let main = manager.register("main", Some('m'), None, None).unwrap();
        let map = manager.register("map", Some('p'), None, None).unwrap();

        let mut store = ElementStore::new();
        store.insert(element("main_only", HudMask::EMPTY.with(main), 2, [255, 0, 0, 255]));
        store.insert(element("map_only", HudMask::EMPTY.with(map), 20, [0, 0, 255, 255]));
        store.insert(element("shared", HudMask::EMPTY.with(main).with(map), 40, [0, 255, 0, 255]));

        Self {
            manager,
            store,
            sensors: SensorSnapshot::default(),
        }
    }

    fn render(&mut self, canvas: &mut dyn Canvas, now: Instant) -> FramePhase {
        let ctx = RenderContext {
            layout: EyeLayout::new(64, 16),
            camera: CameraView::default(),
            stereo_offset: 0,
            pitch_offset: 0.0,
            sensors: &self.sensors,
            output_started: false,
            output_mode: OutputMode::Disabled,
            now,
            wall_clock: Local::now(),
        };
        render_huds(canvas, &mut self.manager, &mut self.store, &ctx, None).phase
    }
}

#[test]
fn test_fade_main_to_map() {
    let mut scene = Scene::new();
    let start = Instant::now();
    scene
        .manager
        .switch_to_at(&SwitchRequest::new("map").with_transition("fade").with_duration(500), start)
        .unwrap();

    let mut canvas = RecordingCanvas::new(128, 16);
    let phase = scene.render(&mut canvas, start + Duration::from_millis(250));
    assert!(matches!(phase, FramePhase::Transitioning { .. }));
    assert!((scene.manager.progress() - 0.5).abs() < 0.01);

    let main = canvas.calls_for("main_only");
    assert_eq!(main.len(), 2);
    for call in main {
        assert!((call.alpha as f32 / 255.0 - 0.5).abs() < 0.01, "alpha {}", call.alpha);
    }
    // Shared element never double-blends
    assert!(canvas.calls_for("shared").iter().all(|c| c.alpha == 255));

    canvas.calls.clear();
    let phase = scene.render(&mut canvas, start + Duration::from_millis(600));
    assert!(matches!(phase, FramePhase::Idle { .. }));
    assert_eq!(scene.manager.progress(), 1.0);
    assert_eq!(scene.manager.transition_from(), None);

    assert!(canvas.calls_for("main_only").is_empty());
    assert_eq!(canvas.calls_for("map_only").len(), 2);
    assert_eq!(canvas.calls_for("shared").len(), 2);
    assert!(canvas.calls.iter().all(|c| c.alpha == 255));
}

#[test]
fn test_fade_pixels_on_software_canvas() {
    let mut scene = Scene::new();
    let start = Instant::now();
    scene
        .manager
        .switch_to_at(&SwitchRequest::new("map").with_transition("fade").with_duration(500), start)
        .unwrap();

    let mut canvas = SoftwareCanvas::new(128, 16);
    canvas.clear([0, 0, 0, 255]);
    scene.render(&mut canvas, start + Duration::from_millis(250));

    let outgoing = canvas.pixel(4, 6).unwrap();
    assert!((outgoing[0] as i32 - 127).abs() <= 2, "{:?}", outgoing);
    let incoming = canvas.pixel(22, 6).unwrap();
    assert!((incoming[2] as i32 - 127).abs() <= 2, "{:?}", incoming);
    assert_eq!(canvas.pixel(42, 6), Some([0, 255, 0, 255]));
    // Right eye mirrors the left
    assert_eq!(canvas.pixel(64 + 42, 6), Some([0, 255, 0, 255]));
}

#[test]
fn test_hotkey_switch_and_repeat_is_noop() {
    let mut scene = Scene::new();
    let start = Instant::now();
    let target = scene.manager.hud_for_hotkey('p').unwrap().to_string();
    assert!(scene.manager.switch_to_at(&SwitchRequest::new(target.clone()), start).unwrap());

    let mut canvas = RecordingCanvas::new(128, 16);
    scene.render(&mut canvas, start + Duration::from_millis(1000));
    assert!(!scene.manager.switch_to_at(&SwitchRequest::new(target), start).unwrap());
    assert!(!scene.manager.in_transition());
    assert_eq!(scene.manager.status().current_name.as_deref(), Some("map"));
}
