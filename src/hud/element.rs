//! Overlay elements and their arena.
//!
//! Elements live in an [`ElementStore`]: a slot vector with generation
//! counters and a free list. Handles stay valid across unrelated inserts
//! and removals, and a stale handle simply resolves to `None`. Draw order
//! is a secondary index sorted by layer, stable for equal layers.

use std::collections::HashMap;

use super::animation::{Animation, BatteryLevel};
use super::panel::EnvironmentPanel;
use super::screen::HudMask;
use super::sensors::{AiState, ArmorStatus};
use super::text::{TextElement, TextRasterizer, TextStyle};
use crate::error::HudResult;
use crate::output::mode::OutputMode;
use crate::rendering::texture::Texture;

/// Distinct detection labels kept rasterized at once.
const MAX_CACHED_LABELS: usize = 32;

/// How an element's rotation is chosen each frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AngleMode {
    /// Constant angle in degrees.
    Fixed(f64),
    /// Follow head roll.
    Roll,
    /// Counter-rotate against head roll (artificial horizon).
    OppositeRoll,
}

impl AngleMode {
    pub fn resolve(self, roll: f64) -> f64 {
        match self {
            AngleMode::Fixed(angle) => angle,
            AngleMode::Roll => roll,
            AngleMode::OppositeRoll => -roll,
        }
    }
}

/// Textures of a static element, chosen by output and assistant state.
#[derive(Debug, Clone)]
pub struct StateTextures {
    pub base: Texture,
    pub record: Option<Texture>,
    pub stream: Option<Texture>,
    pub record_stream: Option<Texture>,
    pub listening: Option<Texture>,
    pub wake: Option<Texture>,
    pub processing: Option<Texture>,
}

impl StateTextures {
    pub fn new(base: Texture) -> Self {
        Self {
            base,
            record: None,
            stream: None,
            record_stream: None,
            listening: None,
            wake: None,
            processing: None,
        }
    }

    /// Output state wins over assistant state; missing variants fall back
    /// to the base texture.
    pub fn select(&self, output_started: bool, mode: OutputMode, ai: AiState) -> &Texture {
        let by_output = if output_started {
            match mode {
                OutputMode::RecordStream => self.record_stream.as_ref(),
                OutputMode::Record => self.record.as_ref(),
                OutputMode::Stream => self.stream.as_ref(),
                OutputMode::Disabled => None,
            }
        } else {
            None
        };

        let by_ai = || match ai {
            AiState::Silence | AiState::CommandRecording => self.listening.as_ref(),
            AiState::WakewordListen => self.wake.as_ref(),
            AiState::ProcessCommand | AiState::VisionAiReady => self.processing.as_ref(),
            AiState::Idle => None,
        };

        by_output.or_else(by_ai).unwrap_or(&self.base)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Texture> {
        std::iter::once(&self.base).chain(
            [
                &self.record,
                &self.stream,
                &self.record_stream,
                &self.listening,
                &self.wake,
                &self.processing,
            ]
            .into_iter()
            .flatten(),
        )
    }
}

/// Battery indicator textures. `full` is required; lower levels fall back
/// to the next higher one that exists.
#[derive(Debug, Clone)]
pub struct BatteryTextures {
    pub full: Texture,
    pub high: Option<Texture>,
    pub medium: Option<Texture>,
    pub low: Option<Texture>,
    pub empty: Option<Texture>,
}

impl BatteryTextures {
    pub fn select(&self, percent: i32) -> &Texture {
        let level = BatteryLevel::from_percent(percent);
        let chain: [(BatteryLevel, &Option<Texture>); 4] = [
            (BatteryLevel::Empty, &self.empty),
            (BatteryLevel::Low, &self.low),
            (BatteryLevel::Medium, &self.medium),
            (BatteryLevel::High, &self.high),
        ];
        chain
            .iter()
            .skip_while(|(l, _)| *l != level)
            .find_map(|(_, t)| t.as_ref())
            .unwrap_or(&self.full)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Texture> {
        std::iter::once(&self.full).chain(
            [&self.high, &self.medium, &self.low, &self.empty]
                .into_iter()
                .flatten(),
        )
    }
}

/// Textures of an armor component by reported status.
#[derive(Debug, Clone)]
pub struct ArmorTextures {
    pub component: String,
    pub base: Texture,
    pub online: Option<Texture>,
    pub warning: Option<Texture>,
    pub offline: Option<Texture>,
}

impl ArmorTextures {
    pub fn select(&self, status: ArmorStatus) -> &Texture {
        let texture = match status {
            ArmorStatus::Unregistered => None,
            ArmorStatus::Online => self.online.as_ref(),
            ArmorStatus::Warning => self.warning.as_ref(),
            ArmorStatus::Offline => self.offline.as_ref(),
        };
        texture.unwrap_or(&self.base)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Texture> {
        std::iter::once(&self.base).chain(
            [&self.online, &self.warning, &self.offline]
                .into_iter()
                .flatten(),
        )
    }
}

/// Sprite-sheet gauges whose frame follows a sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GaugeKind {
    Heading,
    Pitch,
    Altitude,
    Wifi,
}

#[derive(Debug, Clone)]
pub enum SpecialElement {
    Gauge {
        gauge: GaugeKind,
        sheet: Texture,
        animation: Animation,
    },
    Battery(BatteryTextures),
}

/// Animated box plus label drawn over every detected object.
#[derive(Debug, Clone)]
pub struct DetectionOverlay {
    pub sheet: Texture,
    pub animation: Animation,
    /// `None` draws boxes without labels.
    pub label_style: Option<TextStyle>,
    /// Label position relative to the box frame's top-left corner.
    pub label_offset: (i32, i32),
    labels: HashMap<String, Texture>,
}

impl DetectionOverlay {
    pub fn new(
        sheet: Texture,
        animation: Animation,
        label_style: Option<TextStyle>,
        label_offset: (i32, i32),
    ) -> Self {
        Self {
            sheet,
            animation,
            label_style,
            label_offset,
            labels: HashMap::new(),
        }
    }

    /// Label texture for `text`, rasterized once per distinct string.
    pub fn label(
        &mut self,
        text: &str,
        rasterizer: &mut dyn TextRasterizer,
    ) -> HudResult<Option<Texture>> {
        let Some(style) = &self.label_style else {
            return Ok(None);
        };
        if text.is_empty() {
            return Ok(None);
        }
        if let Some(texture) = self.labels.get(text) {
            return Ok(Some(texture.clone()));
        }
        if self.labels.len() >= MAX_CACHED_LABELS {
            self.labels.clear();
        }
        let texture = rasterizer.rasterize(text, style)?;
        self.labels.insert(text.to_string(), texture.clone());
        Ok(Some(texture))
    }

    pub fn clear_labels(&mut self) {
        self.labels.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Texture> {
        std::iter::once(&self.sheet).chain(self.labels.values())
    }
}

/// Per-kind element payload.
#[derive(Debug, Clone)]
pub enum ElementKind {
    Static(StateTextures),
    Animated { sheet: Texture, animation: Animation },
    Text(TextElement),
    Special(SpecialElement),
    ArmorComponent(ArmorTextures),
    Detections(DetectionOverlay),
    EnvironmentPanel(EnvironmentPanel),
}

impl ElementKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            ElementKind::Static(_) => "static",
            ElementKind::Animated { .. } => "animated",
            ElementKind::Text(_) => "text",
            ElementKind::Special(_) => "special",
            ElementKind::ArmorComponent(_) => "armor",
            ElementKind::Detections(_) => "detect",
            ElementKind::EnvironmentPanel(_) => "environment",
        }
    }
}

/// One overlay unit.
#[derive(Debug, Clone)]
pub struct OverlayElement {
    pub name: String,
    pub enabled: bool,
    pub huds: HudMask,
    /// Eye-local position.
    pub x: i32,
    pub y: i32,
    /// Configured size; 0 means the texture or frame's natural size.
    pub width: i32,
    pub height: i32,
    pub angle: AngleMode,
    /// Fixed elements ignore the stereo offset.
    pub fixed: bool,
    pub layer: i32,
    pub kind: ElementKind,
}

impl OverlayElement {
    pub fn new(name: impl Into<String>, kind: ElementKind) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            huds: HudMask::EMPTY,
            x: 0,
            y: 0,
            width: 0,
            height: 0,
            angle: AngleMode::Fixed(0.0),
            fixed: false,
            layer: 0,
            kind,
        }
    }

    /// Every texture this element may draw.
    pub fn textures(&self) -> Box<dyn Iterator<Item = &Texture> + '_> {
        match &self.kind {
            ElementKind::Static(textures) => Box::new(textures.iter()),
            ElementKind::Animated { sheet, .. } => Box::new(std::iter::once(sheet)),
            ElementKind::Text(text) => Box::new(text.cached_texture().into_iter()),
            ElementKind::Special(SpecialElement::Gauge { sheet, .. }) => {
                Box::new(std::iter::once(sheet))
            },
            ElementKind::Special(SpecialElement::Battery(textures)) => Box::new(textures.iter()),
            ElementKind::ArmorComponent(textures) => Box::new(textures.iter()),
            ElementKind::Detections(overlay) => Box::new(overlay.iter()),
            ElementKind::EnvironmentPanel(panel) => Box::new(panel.cached_texture().into_iter()),
        }
    }
}

/// Generation-checked handle into an [`ElementStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementId {
    index: u32,
    generation: u32,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    element: Option<OverlayElement>,
}

/// Arena of overlay elements with layer ordering.
#[derive(Debug, Default)]
pub struct ElementStore {
    slots: Vec<Slot>,
    free: Vec<u32>,
    /// Live ids sorted by ascending layer, insertion order within a layer.
    order: Vec<ElementId>,
}

impl ElementStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, element: OverlayElement) -> ElementId {
        let layer = element.layer;
        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.element = Some(element);
                ElementId {
                    index,
                    generation: slot.generation,
                }
            },
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    element: Some(element),
                });
                ElementId {
                    index: (self.slots.len() - 1) as u32,
                    generation: 0,
                }
            },
        };

        // After every id with layer <= this one keeps insertion order stable
        let position = self
            .order
            .partition_point(|other| self.layer_of(*other).is_some_and(|l| l <= layer));
        self.order.insert(position, id);
        id
    }

    pub fn remove(&mut self, id: ElementId) -> Option<OverlayElement> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let element = slot.element.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.order.retain(|other| *other != id);
        Some(element)
    }

    pub fn get(&self, id: ElementId) -> Option<&OverlayElement> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.element.as_ref())
    }

    pub fn get_mut(&mut self, id: ElementId) -> Option<&mut OverlayElement> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.element.as_mut())
    }

    fn layer_of(&self, id: ElementId) -> Option<i32> {
        self.get(id).map(|e| e.layer)
    }

    /// Move an element to another layer, after existing elements of that
    /// layer.
    pub fn set_layer(&mut self, id: ElementId, layer: i32) -> bool {
        match self.get_mut(id) {
            Some(element) => element.layer = layer,
            None => return false,
        }
        self.order.retain(|other| *other != id);
        let position = self
            .order
            .partition_point(|other| self.layer_of(*other).is_some_and(|l| l <= layer));
        self.order.insert(position, id);
        true
    }

    pub fn find(&self, name: &str) -> Option<ElementId> {
        self.order
            .iter()
            .copied()
            .find(|id| self.get(*id).is_some_and(|e| e.name == name))
    }

    /// Ids back-to-front.
    pub fn ids_layered(&self) -> &[ElementId] {
        &self.order
    }

    /// Elements back-to-front.
    pub fn iter_layered(&self) -> impl Iterator<Item = (ElementId, &OverlayElement)> {
        self.order
            .iter()
            .filter_map(move |id| self.get(*id).map(|e| (*id, e)))
    }

    /// Forget every cached text render.
    pub fn invalidate_text(&mut self) {
        for element in self.slots.iter_mut().filter_map(|slot| slot.element.as_mut()) {
            match &mut element.kind {
                ElementKind::Text(text) => text.invalidate(),
                ElementKind::Detections(overlay) => overlay.clear_labels(),
                _ => {},
            }
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tex(label: &str) -> Texture {
        Texture::from_rgba(1, 1, vec![255; 4], label)
    }

    fn element(name: &str, layer: i32) -> OverlayElement {
        let mut e = OverlayElement::new(name, ElementKind::Static(StateTextures::new(tex(name))));
        e.layer = layer;
        e
    }

    fn names(store: &ElementStore) -> Vec<String> {
        store.iter_layered().map(|(_, e)| e.name.clone()).collect()
    }

    #[test]
    fn test_layer_order_is_stable() {
        let mut store = ElementStore::new();
        store.insert(element("a", 1));
        store.insert(element("b", 0));
        store.insert(element("c", 1));
        store.insert(element("d", -1));
        store.insert(element("e", 0));
        assert_eq!(names(&store), ["d", "b", "e", "a", "c"]);
    }

    #[test]
    fn test_stale_handle_after_remove() {
        let mut store = ElementStore::new();
        let a = store.insert(element("a", 0));
        let b = store.insert(element("b", 0));
        assert_eq!(store.remove(a).unwrap().name, "a");
        assert!(store.get(a).is_none());
        assert!(store.remove(a).is_none());

        // Slot is reused with a new generation
        let c = store.insert(element("c", 0));
        assert!(store.get(a).is_none());
        assert_eq!(store.get(c).unwrap().name, "c");
        assert_eq!(store.get(b).unwrap().name, "b");
        assert_eq!(names(&store), ["b", "c"]);
    }

    #[test]
    fn test_set_layer_reorders() {
        let mut store = ElementStore::new();
        let a = store.insert(element("a", 0));
        store.insert(element("b", 1));
        assert!(store.set_layer(a, 5));
        assert_eq!(names(&store), ["b", "a"]);
        assert_eq!(store.find("a"), Some(a));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_state_texture_priority() {
        let mut textures = StateTextures::new(tex("base"));
        textures.record = Some(tex("rec"));
        textures.listening = Some(tex("listen"));
        textures.processing = Some(tex("proc"));

        let pick = |started, mode, ai| textures.select(started, mode, ai).label().to_string();
        assert_eq!(pick(true, OutputMode::Record, AiState::Silence), "rec");
        // Stream has no texture, so assistant state decides
        assert_eq!(pick(true, OutputMode::Stream, AiState::Silence), "listen");
        // Not started yet
        assert_eq!(pick(false, OutputMode::Record, AiState::VisionAiReady), "proc");
        assert_eq!(pick(false, OutputMode::Disabled, AiState::WakewordListen), "base");
        assert_eq!(pick(false, OutputMode::Disabled, AiState::Idle), "base");
    }

    #[test]
    fn test_battery_fallback_chain() {
        let textures = BatteryTextures {
            full: tex("full"),
            high: None,
            medium: Some(tex("medium")),
            low: None,
            empty: Some(tex("empty")),
        };
        assert_eq!(textures.select(0).label(), "empty");
        assert_eq!(textures.select(10).label(), "medium");
        assert_eq!(textures.select(60).label(), "full");
        assert_eq!(textures.select(100).label(), "full");
    }

    #[test]
    fn test_armor_status_textures() {
        let textures = ArmorTextures {
            component: "helmet".to_string(),
            base: tex("base"),
            online: Some(tex("online")),
            warning: None,
            offline: Some(tex("offline")),
        };
        assert_eq!(textures.select(ArmorStatus::Online).label(), "online");
        assert_eq!(textures.select(ArmorStatus::Warning).label(), "base");
        assert_eq!(textures.select(ArmorStatus::Offline).label(), "offline");
        assert_eq!(textures.select(ArmorStatus::Unregistered).label(), "base");
    }

    #[test]
    fn test_angle_modes() {
        assert_eq!(AngleMode::Fixed(15.0).resolve(3.0), 15.0);
        assert_eq!(AngleMode::Roll.resolve(3.0), 3.0);
        assert_eq!(AngleMode::OppositeRoll.resolve(3.0), -3.0);
    }
}
