//! HUD switching and the transition state machine.
//!
//! [`HudManager`] owns the screen registry, the current screen and at most
//! one in-flight transition. The render thread calls [`HudManager::advance`]
//! once per frame and asks [`element_effect`] how each element should be
//! drawn for the resulting [`FramePhase`].

use std::time::{Duration, Instant};

use serde::Serialize;

use super::screen::{HudId, HudMask, HudRegistry, HudScreen, TransitionKind, DEFAULT_TRANSITION_MS};
use crate::config::HudDefaults;
use crate::error::{HudError, HudResult};

/// Effects never start from exactly zero progress, so the first frame of
/// a transition already shows movement.
const MIN_EFFECT_PROGRESS: f32 = 0.02;

/// A request to change the current HUD.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchRequest {
    pub hud: String,
    /// Transition name; `None` uses the target screen's default.
    pub transition: Option<String>,
    /// Duration; `None` uses the target screen's default.
    pub duration_ms: Option<i64>,
}

impl SwitchRequest {
    pub fn new(hud: impl Into<String>) -> Self {
        Self {
            hud: hud.into(),
            transition: None,
            duration_ms: None,
        }
    }

    pub fn with_transition(mut self, transition: impl Into<String>) -> Self {
        self.transition = Some(transition.into());
        self
    }

    pub fn with_duration(mut self, duration_ms: i64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

#[derive(Debug, Clone)]
struct TransitionState {
    from: HudId,
    kind: TransitionKind,
    started: Instant,
    duration: Duration,
    progress: f32,
}

/// What the renderer should draw this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FramePhase {
    /// No HUD registered.
    Empty,
    Idle {
        current: HudId,
    },
    Transitioning {
        from: HudId,
        to: HudId,
        kind: TransitionKind,
        progress: f32,
    },
}

/// How an element relates to the two screens of a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementGroup {
    /// Only on the outgoing screen.
    FromOnly,
    /// Only on the incoming screen.
    ToOnly,
    /// On both screens.
    Shared,
}

impl ElementGroup {
    /// Classify membership against a transition. `None` means the element
    /// is on neither screen and is not drawn.
    pub fn classify(mask: HudMask, from: HudId, to: HudId) -> Option<Self> {
        match (mask.contains(from), mask.contains(to)) {
            (true, true) => Some(ElementGroup::Shared),
            (true, false) => Some(ElementGroup::FromOnly),
            (false, true) => Some(ElementGroup::ToOnly),
            (false, false) => None,
        }
    }
}

/// Per-element draw modifiers for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElementEffect {
    /// Opacity in `[0, 1]`.
    pub alpha: f32,
    /// Horizontal shift in pixels, applied to both eyes.
    pub offset_x: i32,
    /// Scale about the element center.
    pub scale: f32,
}

impl ElementEffect {
    pub const NORMAL: ElementEffect = ElementEffect {
        alpha: 1.0,
        offset_x: 0,
        scale: 1.0,
    };

    /// Alpha as a texture modulation value.
    pub fn alpha_mod(&self) -> u8 {
        (self.alpha.clamp(0.0, 1.0) * 255.0) as u8
    }

    pub fn is_normal(&self) -> bool {
        *self == Self::NORMAL
    }
}

/// Draw order of the element groups for a transition kind.
///
/// Slides draw shared elements underneath the moving ones; fade and zoom
/// draw them on top.
pub fn render_passes(kind: TransitionKind) -> [ElementGroup; 3] {
    match kind {
        TransitionKind::SlideLeft | TransitionKind::SlideRight => [
            ElementGroup::Shared,
            ElementGroup::FromOnly,
            ElementGroup::ToOnly,
        ],
        TransitionKind::Fade | TransitionKind::Zoom => [
            ElementGroup::FromOnly,
            ElementGroup::ToOnly,
            ElementGroup::Shared,
        ],
    }
}

/// Effect for an element of `group` at `progress` through a `kind`
/// transition. Shared elements are always drawn normally.
pub fn element_effect(
    group: ElementGroup,
    kind: TransitionKind,
    progress: f32,
    eye_width: i32,
) -> ElementEffect {
    if group == ElementGroup::Shared {
        return ElementEffect::NORMAL;
    }
    let p = progress.clamp(MIN_EFFECT_PROGRESS, 1.0);
    let width = eye_width as f32;
    let outgoing = group == ElementGroup::FromOnly;

    match kind {
        TransitionKind::Fade => ElementEffect {
            alpha: if outgoing { 1.0 - p } else { p },
            ..ElementEffect::NORMAL
        },
        TransitionKind::SlideLeft => ElementEffect {
            offset_x: if outgoing {
                (-p * width) as i32
            } else {
                ((1.0 - p) * width) as i32
            },
            ..ElementEffect::NORMAL
        },
        TransitionKind::SlideRight => ElementEffect {
            offset_x: if outgoing {
                (p * width) as i32
            } else {
                (-(1.0 - p) * width) as i32
            },
            ..ElementEffect::NORMAL
        },
        TransitionKind::Zoom => {
            if outgoing {
                ElementEffect {
                    alpha: 1.0 - p,
                    offset_x: 0,
                    scale: 1.0 + p,
                }
            } else {
                ElementEffect {
                    alpha: p,
                    offset_x: 0,
                    scale: 2.0 - p,
                }
            }
        },
    }
}

/// Snapshot for UI and telemetry collaborators.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HudStatus {
    pub current_id: Option<u8>,
    pub current_name: Option<String>,
    pub in_transition: bool,
    pub progress: f32,
}

/// Current HUD plus transition state machine.
#[derive(Debug)]
pub struct HudManager {
    registry: HudRegistry,
    current: Option<HudId>,
    transition: Option<TransitionState>,
    default_kind: TransitionKind,
    default_duration_ms: u32,
    /// Set when the current HUD changes; cleared by [`HudManager::take_switched`].
    switched: bool,
}

impl HudManager {
    pub fn new(defaults: &HudDefaults) -> Self {
        let default_kind = TransitionKind::from_name(&defaults.transition).unwrap_or_else(|| {
            log::warn!(
                "[HUD] Unknown default transition '{}', using fade",
                defaults.transition
            );
            TransitionKind::Fade
        });
        Self {
            registry: HudRegistry::new(),
            current: None,
            transition: None,
            default_kind,
            default_duration_ms: if defaults.transition_duration_ms == 0 {
                DEFAULT_TRANSITION_MS
            } else {
                defaults.transition_duration_ms
            },
            switched: false,
        }
    }

    /// Register a screen. The first registered screen becomes current.
    ///
    /// An unknown transition name falls back to the manager default.
    pub fn register(
        &mut self,
        name: &str,
        hotkey: Option<char>,
        transition: Option<&str>,
        duration_ms: Option<u32>,
    ) -> HudResult<HudId> {
        let kind = match transition {
            None => self.default_kind,
            Some(t) => TransitionKind::from_name(t).unwrap_or_else(|| {
                log::warn!(
                    "[HUD] Unknown transition '{}' for HUD '{}', using {}",
                    t,
                    name,
                    self.default_kind
                );
                self.default_kind
            }),
        };
        let duration = duration_ms.unwrap_or(self.default_duration_ms);
        let id = self.registry.register(name, hotkey, kind, duration)?;
        if self.current.is_none() {
            self.current = Some(id);
        }
        Ok(id)
    }

    /// Swap in a freshly built registry, keeping the current HUD if a
    /// screen of the same name still exists. Any transition is dropped.
    ///
    /// Build the new registry from [`HudRegistry::successor`] of the
    /// current one so ids held elsewhere keep naming the same screens.
    pub fn replace_registry(&mut self, registry: HudRegistry) {
        let previous = self.current_screen().map(|s| s.name.clone());
        let current = previous
            .as_deref()
            .and_then(|name| registry.by_name(name))
            .or_else(|| registry.first())
            .map(|s| s.id);

        match (&previous, current.and_then(|id| registry.by_id(id))) {
            (Some(prev), Some(screen)) if *prev != screen.name => log::info!(
                "[HUD] HUD '{}' no longer exists, falling back to '{}'",
                prev,
                screen.name
            ),
            _ => {},
        }

        self.registry = registry;
        self.current = current;
        self.transition = None;
    }

    pub fn registry(&self) -> &HudRegistry {
        &self.registry
    }

    pub fn current(&self) -> Option<HudId> {
        self.current
    }

    pub fn current_screen(&self) -> Option<&HudScreen> {
        self.current.and_then(|id| self.registry.by_id(id))
    }

    /// Outgoing screen of the in-flight transition.
    pub fn transition_from(&self) -> Option<HudId> {
        self.transition.as_ref().map(|t| t.from)
    }

    pub fn in_transition(&self) -> bool {
        self.transition.is_some()
    }

    /// Progress of the in-flight transition; 1 when idle.
    pub fn progress(&self) -> f32 {
        self.transition.as_ref().map_or(1.0, |t| t.progress)
    }

    /// Whether the current HUD changed since the last call.
    pub fn take_switched(&mut self) -> bool {
        std::mem::take(&mut self.switched)
    }

    pub fn hud_for_hotkey(&self, key: char) -> Option<&str> {
        self.registry.by_hotkey(key).map(|s| s.name.as_str())
    }

    pub fn switch_to(&mut self, request: &SwitchRequest) -> HudResult<bool> {
        self.switch_to_at(request, Instant::now())
    }

    /// Start a transition to `request.hud` at `now`.
    ///
    /// Returns `Ok(false)` when the target is already current (nothing
    /// changes). An unknown screen name is rejected.
    pub fn switch_to_at(&mut self, request: &SwitchRequest, now: Instant) -> HudResult<bool> {
        let target = match self.registry.by_name(&request.hud) {
            Some(screen) => screen.id,
            None => {
                log::error!("[HUD] Unknown HUD '{}'", request.hud);
                return Err(HudError::UnknownHud {
                    name: request.hud.clone(),
                });
            },
        };

        if self.current == Some(target) {
            log::info!("[HUD] Already on HUD '{}'", request.hud);
            return Ok(false);
        }

        let kind = self.resolve_kind(target, request.transition.as_deref());
        let duration_ms = self.resolve_duration(target, request.duration_ms);

        self.switched = true;
        let from = match self.current.replace(target) {
            Some(from) => from,
            None => {
                log::info!("[HUD] Switched to HUD '{}'", request.hud);
                return Ok(true);
            },
        };

        if let Some(previous) = &self.transition {
            log::debug!(
                "[HUD] Interrupting {} transition at {:.2}",
                previous.kind,
                previous.progress
            );
        }

        log::info!(
            "[HUD] Switching {} -> '{}' ({} {}ms)",
            self.registry
                .by_id(from)
                .map(|s| s.name.as_str())
                .unwrap_or("?"),
            request.hud,
            kind,
            duration_ms
        );

        self.transition = Some(TransitionState {
            from,
            kind,
            started: now,
            duration: Duration::from_millis(duration_ms as u64),
            progress: 0.0,
        });
        Ok(true)
    }

    fn resolve_kind(&mut self, target: HudId, requested: Option<&str>) -> TransitionKind {
        let screen = match self.registry.by_id_mut(target) {
            Some(screen) => screen,
            None => return self.default_kind,
        };
        match requested {
            None => screen.transition,
            Some(name) => match TransitionKind::from_name(name) {
                Some(kind) => kind,
                None => {
                    log::warn!(
                        "[HUD] Invalid transition '{}' for HUD '{}', defaulting to fade",
                        name,
                        screen.name
                    );
                    screen.transition = TransitionKind::Fade;
                    TransitionKind::Fade
                },
            },
        }
    }

    fn resolve_duration(&self, target: HudId, requested: Option<i64>) -> u32 {
        match requested {
            None => self
                .registry
                .by_id(target)
                .map_or(self.default_duration_ms, |s| s.transition_duration_ms),
            Some(ms) if ms <= 0 => {
                log::warn!(
                    "[HUD] Invalid transition duration {}ms, using {}ms",
                    ms,
                    DEFAULT_TRANSITION_MS
                );
                DEFAULT_TRANSITION_MS
            },
            Some(ms) => ms.min(u32::MAX as i64) as u32,
        }
    }

    /// Advance the transition clock and describe this frame.
    ///
    /// Progress is `elapsed / duration` clamped to `[0, 1]` and never
    /// decreases. On reaching 1 the transition ends and the frame is a
    /// normal render of the current HUD.
    pub fn advance(&mut self, now: Instant) -> FramePhase {
        let current = match self.current {
            Some(id) => id,
            None => return FramePhase::Empty,
        };

        let state = match self.transition.as_mut() {
            Some(state) => state,
            None => return FramePhase::Idle { current },
        };

        let elapsed = now.saturating_duration_since(state.started);
        let raw = if state.duration.is_zero() {
            1.0
        } else {
            (elapsed.as_secs_f64() / state.duration.as_secs_f64()).clamp(0.0, 1.0) as f32
        };
        state.progress = state.progress.max(raw);

        if state.progress >= 1.0 {
            log::debug!("[HUD] {} transition complete", state.kind);
            self.transition = None;
            return FramePhase::Idle { current };
        }

        FramePhase::Transitioning {
            from: state.from,
            to: current,
            kind: state.kind,
            progress: state.progress,
        }
    }

    pub fn status(&self) -> HudStatus {
        let screen = self.current_screen();
        HudStatus {
            current_id: screen.map(|s| s.id.0),
            current_name: screen.map(|s| s.name.clone()),
            in_transition: self.in_transition(),
            progress: self.progress(),
        }
    }
}
