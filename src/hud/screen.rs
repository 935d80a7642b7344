//! HUD screens and their registry.

use serde::{Deserialize, Serialize};

use crate::error::{HudError, HudResult};

/// Upper bound on registered HUD screens. Membership masks are 16 bits.
pub const MAX_HUDS: usize = 16;

/// Default transition duration when none is configured or a request
/// carries an invalid one.
pub const DEFAULT_TRANSITION_MS: u32 = 500;

/// Registry-assigned screen id in `0..MAX_HUDS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HudId(pub u8);

impl HudId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Set of HUD ids an element belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct HudMask(u16);

impl HudMask {
    pub const EMPTY: HudMask = HudMask(0);

    pub fn contains(self, id: HudId) -> bool {
        id.index() < MAX_HUDS && self.0 & (1 << id.0) != 0
    }

    pub fn insert(&mut self, id: HudId) {
        if id.index() < MAX_HUDS {
            self.0 |= 1 << id.0;
        }
    }

    pub fn with(mut self, id: HudId) -> Self {
        self.insert(id);
        self
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn bits(self) -> u16 {
        self.0
    }
}

/// Animated hand-off style between two HUDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Fade,
    SlideLeft,
    SlideRight,
    Zoom,
}

impl Default for TransitionKind {
    fn default() -> Self {
        TransitionKind::Fade
    }
}

impl TransitionKind {
    pub const ALL: [TransitionKind; 4] = [
        TransitionKind::Fade,
        TransitionKind::SlideLeft,
        TransitionKind::SlideRight,
        TransitionKind::Zoom,
    ];

    /// Config/protocol name.
    pub fn name(self) -> &'static str {
        match self {
            TransitionKind::Fade => "fade",
            TransitionKind::SlideLeft => "slide_left",
            TransitionKind::SlideRight => "slide_right",
            TransitionKind::Zoom => "zoom",
        }
    }

    /// Parse a config/protocol name. Unknown names yield `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(name.trim()))
    }

    /// Decode a numeric transition code (0 = fade ... 3 = zoom).
    pub fn from_raw(raw: i64) -> Option<Self> {
        usize::try_from(raw)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }
}

impl std::fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A named set of overlay elements shown together.
#[derive(Debug, Clone, PartialEq)]
pub struct HudScreen {
    pub id: HudId,
    pub name: String,
    pub hotkey: Option<char>,
    /// Transition used when switching to this screen without an explicit one.
    pub transition: TransitionKind,
    pub transition_duration_ms: u32,
}

/// Screen registry.
///
/// Ids are handed out from a counter that only moves forward. A registry
/// built with [`HudRegistry::successor`] inherits that counter and every
/// name-to-id binding, so a screen keeps its id across layout reloads and
/// an id never names a different screen.
#[derive(Debug, Clone, Default)]
pub struct HudRegistry {
    screens: Vec<HudScreen>,
    /// Every name ever registered in this lineage.
    assigned: Vec<(String, HudId)>,
    next_id: u8,
}

impl HudRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty registry that continues this one's id assignments.
    pub fn successor(&self) -> Self {
        Self {
            screens: Vec::new(),
            assigned: self.assigned.clone(),
            next_id: self.next_id,
        }
    }

    /// Register a screen and return its id.
    ///
    /// A name seen before in this lineage gets its old id back. Rejects
    /// duplicate names and new names once all [`MAX_HUDS`] ids are spent.
    pub fn register(
        &mut self,
        name: &str,
        hotkey: Option<char>,
        transition: TransitionKind,
        transition_duration_ms: u32,
    ) -> HudResult<HudId> {
        if self.by_name(name).is_some() {
            return Err(HudError::LayoutError(format!(
                "HUD '{}' is already registered",
                name
            )));
        }

        let known = self
            .assigned
            .iter()
            .find(|(assigned, _)| assigned == name)
            .map(|(_, id)| *id);
        let id = match known {
            Some(id) => id,
            None => {
                if self.next_id as usize >= MAX_HUDS {
                    return Err(HudError::LayoutError(format!(
                        "Cannot register HUD '{}': limit of {} reached",
                        name, MAX_HUDS
                    )));
                }
                let id = HudId(self.next_id);
                self.next_id += 1;
                self.assigned.push((name.to_string(), id));
                id
            },
        };

        let duration = if transition_duration_ms == 0 {
            DEFAULT_TRANSITION_MS
        } else {
            transition_duration_ms
        };
        self.screens.push(HudScreen {
            id,
            name: name.to_string(),
            hotkey,
            transition,
            transition_duration_ms: duration,
        });

        log::info!(
            "[HUD] Registered HUD '{}' (id {}, hotkey {:?}, {} {}ms)",
            name,
            id.0,
            hotkey,
            transition,
            duration
        );
        Ok(id)
    }

    pub fn by_name(&self, name: &str) -> Option<&HudScreen> {
        self.screens.iter().find(|s| s.name == name)
    }

    pub fn by_id(&self, id: HudId) -> Option<&HudScreen> {
        self.screens.iter().find(|s| s.id == id)
    }

    pub fn by_id_mut(&mut self, id: HudId) -> Option<&mut HudScreen> {
        self.screens.iter_mut().find(|s| s.id == id)
    }

    pub fn by_hotkey(&self, key: char) -> Option<&HudScreen> {
        self.screens.iter().find(|s| s.hotkey == Some(key))
    }

    /// First registered screen.
    pub fn first(&self) -> Option<&HudScreen> {
        self.screens.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HudScreen> {
        self.screens.iter()
    }

    pub fn len(&self) -> usize {
        self.screens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.screens.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_names_round_trip() {
        for kind in TransitionKind::ALL {
            assert_eq!(TransitionKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(TransitionKind::from_name("SLIDE_LEFT"), Some(TransitionKind::SlideLeft));
        assert_eq!(TransitionKind::from_name("spin"), None);
    }

    #[test]
    fn test_transition_from_raw() {
        assert_eq!(TransitionKind::from_raw(3), Some(TransitionKind::Zoom));
        assert_eq!(TransitionKind::from_raw(4), None);
        assert_eq!(TransitionKind::from_raw(-1), None);
    }

    #[test]
    fn test_register_assigns_sequential_ids() {
        let mut registry = HudRegistry::new();
        let main = registry.register("main", Some('1'), TransitionKind::Fade, 0).unwrap();
        let map = registry.register("map", None, TransitionKind::Zoom, 250).unwrap();
        assert_eq!(main, HudId(0));
        assert_eq!(map, HudId(1));
        assert_eq!(registry.by_id(main).unwrap().transition_duration_ms, 500);
        assert_eq!(registry.by_hotkey('1').unwrap().name, "main");
        assert_eq!(registry.first().unwrap().name, "main");
    }

    #[test]
    fn test_register_rejects_duplicates_and_overflow() {
        let mut registry = HudRegistry::new();
        registry.register("main", None, TransitionKind::Fade, 500).unwrap();
        assert!(registry.register("main", None, TransitionKind::Fade, 500).is_err());

        for i in 1..MAX_HUDS {
            registry
                .register(&format!("hud{}", i), None, TransitionKind::Fade, 500)
                .unwrap();
        }
        assert_eq!(registry.len(), MAX_HUDS);
        assert!(registry.register("overflow", None, TransitionKind::Fade, 500).is_err());
    }

    #[test]
    fn test_successor_keeps_ids_by_name() {
        let mut registry = HudRegistry::new();
        registry.register("main", None, TransitionKind::Fade, 500).unwrap();
        registry.register("map", None, TransitionKind::Fade, 500).unwrap();

        let mut next = registry.successor();
        let map = next.register("map", None, TransitionKind::Zoom, 500).unwrap();
        let aux = next.register("aux", None, TransitionKind::Fade, 500).unwrap();
        let main = next.register("main", None, TransitionKind::Fade, 500).unwrap();
        assert_eq!(map, HudId(1));
        assert_eq!(main, HudId(0));
        // New names never take an id another screen has held
        assert_eq!(aux, HudId(2));
        assert_eq!(next.first().unwrap().name, "map");
        assert_eq!(next.by_id(HudId(1)).unwrap().name, "map");

        // A dropped screen's id stays retired
        let mut later = next.successor();
        let fresh = later.register("fresh", None, TransitionKind::Fade, 500).unwrap();
        assert_eq!(fresh, HudId(3));
        assert!(later.by_id(HudId(0)).is_none());
    }

    #[test]
    fn test_successor_shares_id_limit() {
        let mut registry = HudRegistry::new();
        for i in 0..MAX_HUDS {
            registry
                .register(&format!("hud{}", i), None, TransitionKind::Fade, 500)
                .unwrap();
        }
        let mut next = registry.successor();
        assert!(next.register("hud3", None, TransitionKind::Fade, 500).is_ok());
        assert!(next.register("brand_new", None, TransitionKind::Fade, 500).is_err());
    }

    #[test]
    fn test_mask_membership() {
        let mask = HudMask::EMPTY.with(HudId(0)).with(HudId(15));
        assert!(mask.contains(HudId(0)));
        assert!(mask.contains(HudId(15)));
        assert!(!mask.contains(HudId(3)));
        assert!(!mask.contains(HudId(16)));
        assert_eq!(mask.bits(), 0x8001);
    }
}
