//! Layout definitions loaded from JSON.
//!
//! A layout names the HUD screens and every overlay element. [`LayoutConfig::build`]
//! produces a complete registry and element arena without touching the live
//! ones; the runtime swaps them in only after the build succeeds.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::animation::{AnimFrame, Animation, DEFAULT_FRAME_INTERVAL_MS};
use super::element::{
    AngleMode, ArmorTextures, BatteryTextures, DetectionOverlay, ElementKind, ElementStore,
    GaugeKind, OverlayElement, SpecialElement, StateTextures,
};
use super::panel::EnvironmentPanel;
use super::screen::{HudMask, HudRegistry, TransitionKind};
use super::text::{TextElement, TextStyle};
use crate::config::HudDefaults;
use crate::error::{HudError, HudResult};
use crate::rendering::coord::Rect;
use crate::rendering::texture::{Texture, TextureCache};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HudDef {
    pub name: String,
    pub hotkey: Option<char>,
    pub transition: Option<String>,
    pub transition_duration_ms: Option<u32>,
}

/// Fixed angle in degrees, or `"roll"` / `"opposite_roll"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AngleDef {
    Degrees(f64),
    Named(String),
}

impl Default for AngleDef {
    fn default() -> Self {
        AngleDef::Degrees(0.0)
    }
}

impl AngleDef {
    fn resolve(&self, element: &str) -> AngleMode {
        match self {
            AngleDef::Degrees(angle) => AngleMode::Fixed(*angle),
            AngleDef::Named(name) => match name.as_str() {
                "roll" => AngleMode::Roll,
                "opposite_roll" => AngleMode::OppositeRoll,
                other => {
                    log::warn!(
                        "[LAYOUT] Element '{}': unknown angle '{}', using 0",
                        element,
                        other
                    );
                    AngleMode::Fixed(0.0)
                },
            },
        }
    }
}

/// One sprite-sheet frame as written in a layout.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FrameDef {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
    pub dest_x: i32,
    pub dest_y: i32,
    /// Original canvas size; 0 means untrimmed (same as `w`/`h`).
    pub source_w: i32,
    pub source_h: i32,
}

impl From<FrameDef> for AnimFrame {
    fn from(def: FrameDef) -> Self {
        AnimFrame {
            source: Rect::new(def.x, def.y, def.w, def.h),
            dest_x: def.dest_x,
            dest_y: def.dest_y,
            source_size_w: if def.source_w > 0 { def.source_w } else { def.w },
            source_size_h: if def.source_h > 0 { def.source_h } else { def.h },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialKindDef {
    Heading,
    Pitch,
    Altitude,
    Wifi,
    Battery,
}

impl SpecialKindDef {
    /// Sprite-sheet gauge for this kind; battery uses level textures.
    fn gauge(self) -> Option<GaugeKind> {
        match self {
            SpecialKindDef::Heading => Some(GaugeKind::Heading),
            SpecialKindDef::Pitch => Some(GaugeKind::Pitch),
            SpecialKindDef::Altitude => Some(GaugeKind::Altitude),
            SpecialKindDef::Wifi => Some(GaugeKind::Wifi),
            SpecialKindDef::Battery => None,
        }
    }
}

/// Kind-specific element fields, tagged by `"type"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ElementKindDef {
    #[serde(rename_all = "camelCase")]
    Static {
        file: PathBuf,
        #[serde(default)]
        file_record: Option<PathBuf>,
        #[serde(default)]
        file_stream: Option<PathBuf>,
        #[serde(default)]
        file_record_stream: Option<PathBuf>,
        #[serde(default)]
        file_listening: Option<PathBuf>,
        #[serde(default)]
        file_wake: Option<PathBuf>,
        #[serde(default)]
        file_processing: Option<PathBuf>,
    },
    #[serde(rename_all = "camelCase")]
    Animated {
        file: PathBuf,
        frames: Vec<FrameDef>,
        #[serde(default)]
        frame_interval_ms: Option<u64>,
    },
    #[serde(rename_all = "camelCase")]
    Text {
        text: String,
        #[serde(default)]
        style: TextStyle,
    },
    #[serde(rename_all = "camelCase")]
    Special {
        special: SpecialKindDef,
        file: PathBuf,
        #[serde(default)]
        frames: Vec<FrameDef>,
        #[serde(default)]
        file_high: Option<PathBuf>,
        #[serde(default)]
        file_medium: Option<PathBuf>,
        #[serde(default)]
        file_low: Option<PathBuf>,
        #[serde(default)]
        file_empty: Option<PathBuf>,
    },
    #[serde(rename_all = "camelCase")]
    Armor {
        component: String,
        file: PathBuf,
        #[serde(default)]
        file_online: Option<PathBuf>,
        #[serde(default)]
        file_warning: Option<PathBuf>,
        #[serde(default)]
        file_offline: Option<PathBuf>,
    },
    /// Box sprite drawn over each detected object.
    #[serde(rename_all = "camelCase")]
    Detect {
        file: PathBuf,
        frames: Vec<FrameDef>,
        #[serde(default)]
        frame_interval_ms: Option<u64>,
        /// Label style; absent draws boxes only.
        #[serde(default)]
        label: Option<TextStyle>,
        #[serde(default)]
        label_offset_x: i32,
        #[serde(default)]
        label_offset_y: i32,
    },
    /// Environmental sensor panel sized by the element's width and height.
    Environment {},
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementDef {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// HUD names; empty joins the first HUD.
    #[serde(default)]
    pub huds: Vec<String>,
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
    #[serde(default)]
    pub width: i32,
    #[serde(default)]
    pub height: i32,
    #[serde(default)]
    pub angle: AngleDef,
    #[serde(default)]
    pub fixed: bool,
    #[serde(default)]
    pub layer: i32,
    #[serde(flatten)]
    pub kind: ElementKindDef,
}

/// Registry and elements built from a layout, ready to swap in.
#[derive(Debug)]
pub struct BuiltLayout {
    pub registry: HudRegistry,
    pub elements: ElementStore,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LayoutConfig {
    pub huds: Vec<HudDef>,
    pub elements: Vec<ElementDef>,
}

impl LayoutConfig {
    pub fn load(path: &Path) -> HudResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let layout: LayoutConfig = serde_json::from_str(&text)
            .map_err(|e| HudError::LayoutError(format!("{}: {}", path.display(), e)))?;
        log::info!(
            "[LAYOUT] Loaded {}: {} HUD(s), {} element(s)",
            path.display(),
            layout.huds.len(),
            layout.elements.len()
        );
        Ok(layout)
    }

    /// Register every HUD and build every element.
    ///
    /// Screens continue `previous`'s id assignments, so a HUD that was
    /// already registered keeps its id. Bad HUD entries, elements whose
    /// base texture fails to load and elements naming only unknown HUDs
    /// are logged and skipped. A layout that ends up with no HUD is an
    /// error.
    pub fn build(
        &self,
        cache: &mut TextureCache,
        defaults: &HudDefaults,
        previous: &HudRegistry,
    ) -> HudResult<BuiltLayout> {
        let default_kind = TransitionKind::from_name(&defaults.transition).unwrap_or_default();
        let mut registry = previous.successor();

        for hud in &self.huds {
            let kind = match hud.transition.as_deref() {
                None => default_kind,
                Some(name) => TransitionKind::from_name(name).unwrap_or_else(|| {
                    log::warn!(
                        "[LAYOUT] HUD '{}': unknown transition '{}', using {}",
                        hud.name,
                        name,
                        default_kind
                    );
                    default_kind
                }),
            };
            let duration = hud
                .transition_duration_ms
                .unwrap_or(defaults.transition_duration_ms);
            if let Err(e) = registry.register(&hud.name, hud.hotkey, kind, duration) {
                log::error!("[LAYOUT] {}", e);
            }
        }

        let first = registry
            .first()
            .map(|s| s.id)
            .ok_or_else(|| HudError::LayoutError("layout defines no HUDs".to_string()))?;

        let mut elements = ElementStore::new();
        for def in &self.elements {
            let mut huds = HudMask::EMPTY;
            for name in &def.huds {
                match registry.by_name(name) {
                    Some(screen) => huds.insert(screen.id),
                    None => log::warn!(
                        "[LAYOUT] Element '{}' names unknown HUD '{}'",
                        def.name,
                        name
                    ),
                }
            }
            if huds.is_empty() {
                if !def.huds.is_empty() {
                    log::warn!(
                        "[LAYOUT] Skipping element '{}': none of its HUDs exist",
                        def.name
                    );
                    continue;
                }
                huds.insert(first);
            }

            let kind = match build_kind(def, cache) {
                Ok(kind) => kind,
                Err(e) => {
                    log::error!("[LAYOUT] Skipping element '{}': {}", def.name, e);
                    continue;
                },
            };

            elements.insert(OverlayElement {
                name: def.name.clone(),
                enabled: def.enabled,
                huds,
                x: def.x,
                y: def.y,
                width: def.width,
                height: def.height,
                angle: def.angle.resolve(&def.name),
                fixed: def.fixed,
                layer: def.layer,
                kind,
            });
        }

        log::info!(
            "[LAYOUT] Built {} HUD(s), {} element(s), {} texture(s)",
            registry.len(),
            elements.len(),
            cache.len()
        );
        Ok(BuiltLayout { registry, elements })
    }
}

/// Load a texture that may be absent. Failures are warnings.
fn optional(cache: &mut TextureCache, element: &str, path: &Option<PathBuf>) -> Option<Texture> {
    let path = path.as_ref()?;
    match cache.load(path) {
        Ok(texture) => Some(texture),
        Err(e) => {
            log::warn!(
                "[LAYOUT] Element '{}': optional texture {}: {}",
                element,
                path.display(),
                e
            );
            None
        },
    }
}

fn animation(element: &str, frames: &[FrameDef], interval_ms: Option<u64>) -> HudResult<Animation> {
    if frames.is_empty() {
        return Err(HudError::LayoutError(format!(
            "element '{}' has no animation frames",
            element
        )));
    }
    let frames = frames.iter().copied().map(AnimFrame::from).collect();
    let interval = Duration::from_millis(interval_ms.unwrap_or(DEFAULT_FRAME_INTERVAL_MS));
    Ok(Animation::new(frames, interval))
}

fn build_kind(def: &ElementDef, cache: &mut TextureCache) -> HudResult<ElementKind> {
    let name = def.name.as_str();
    let kind = match &def.kind {
        ElementKindDef::Static {
            file,
            file_record,
            file_stream,
            file_record_stream,
            file_listening,
            file_wake,
            file_processing,
        } => {
            let mut textures = StateTextures::new(cache.load(file)?);
            textures.record = optional(cache, name, file_record);
            textures.stream = optional(cache, name, file_stream);
            textures.record_stream = optional(cache, name, file_record_stream);
            textures.listening = optional(cache, name, file_listening);
            textures.wake = optional(cache, name, file_wake);
            textures.processing = optional(cache, name, file_processing);
            ElementKind::Static(textures)
        },
        ElementKindDef::Animated {
            file,
            frames,
            frame_interval_ms,
        } => ElementKind::Animated {
            sheet: cache.load(file)?,
            animation: animation(name, frames, *frame_interval_ms)?,
        },
        ElementKindDef::Text { text, style } => {
            ElementKind::Text(TextElement::new(text.clone(), style.clone()))
        },
        ElementKindDef::Special {
            special,
            file,
            frames,
            file_high,
            file_medium,
            file_low,
            file_empty,
        } => match special.gauge() {
            Some(gauge) => ElementKind::Special(SpecialElement::Gauge {
                gauge,
                sheet: cache.load(file)?,
                animation: animation(name, frames, None)?,
            }),
            None => ElementKind::Special(SpecialElement::Battery(BatteryTextures {
                full: cache.load(file)?,
                high: optional(cache, name, file_high),
                medium: optional(cache, name, file_medium),
                low: optional(cache, name, file_low),
                empty: optional(cache, name, file_empty),
            })),
        },
        ElementKindDef::Armor {
            component,
            file,
            file_online,
            file_warning,
            file_offline,
        } => ElementKind::ArmorComponent(ArmorTextures {
            component: component.clone(),
            base: cache.load(file)?,
            online: optional(cache, name, file_online),
            warning: optional(cache, name, file_warning),
            offline: optional(cache, name, file_offline),
        }),
        ElementKindDef::Detect {
            file,
            frames,
            frame_interval_ms,
            label,
            label_offset_x,
            label_offset_y,
        } => ElementKind::Detections(DetectionOverlay::new(
            cache.load(file)?,
            animation(name, frames, *frame_interval_ms)?,
            label.clone(),
            (*label_offset_x, *label_offset_y),
        )),
        ElementKindDef::Environment {} => {
            ElementKind::EnvironmentPanel(EnvironmentPanel::new(def.width, def.height))
        },
    };
    Ok(kind)
}
