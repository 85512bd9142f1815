//! Variant registry and the capability interface every variant implements.

use super::Region;
use crate::arena::{ArenaEvent, ArenaPlayer};
use crate::settings::{Settings, SettingsSchema};
use crate::variants::{DamageInterval, Delete, Forwarding, Music, SpleefFloor};
use std::fmt;
use std::sync::Arc;

/// Behavior attached to a [`Region`].
///
/// Hooks are called with the variant locked and receive the owning region.
/// They may read region state and submit build work through it, but must
/// not call back into the region's public lifecycle methods.
pub trait RegionVariant: Send {
    fn kind(&self) -> VariantKind;

    /// Whether the region captures a snapshot when enabled.
    fn requires_snapshot(&self) -> bool {
        false
    }

    /// Whether the region subscribes to its arena's events while enabled.
    fn listens_to_arena_events(&self) -> bool {
        false
    }

    /// Whether untrigger writes the snapshot back.
    fn restores_on_untrigger(&self) -> bool {
        false
    }

    /// Applies validated settings. Called at init and after every change.
    fn load_settings(&mut self, region: &Region, settings: &Settings);

    fn on_init(&mut self, _region: &Region) {}

    fn on_enable(&mut self, _region: &Region) {}

    fn on_disable(&mut self, _region: &Region) {}

    fn accepts_enter(&self, _player: &dyn ArenaPlayer) -> bool {
        false
    }

    fn accepts_leave(&self, _player: &dyn ArenaPlayer) -> bool {
        false
    }

    fn on_enter(&mut self, _region: &Region, _player: &Arc<dyn ArenaPlayer>) {}

    fn on_leave(&mut self, _region: &Region, _player: &Arc<dyn ArenaPlayer>) {}

    /// Returns whether the trigger had an effect.
    fn on_trigger(&mut self, _region: &Region) -> bool {
        false
    }

    fn on_arena_event(&mut self, _region: &Region, _event: &ArenaEvent) {}
}

/// Closed set of region variants, keyed by their persisted type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariantKind {
    DamageInterval,
    Music,
    Delete,
    SpleefFloor,
    Forwarding,
}

impl VariantKind {
    pub const ALL: [VariantKind; 5] = [
        VariantKind::DamageInterval,
        VariantKind::Music,
        VariantKind::Delete,
        VariantKind::SpleefFloor,
        VariantKind::Forwarding,
    ];

    pub fn type_name(self) -> &'static str {
        match self {
            VariantKind::DamageInterval => "damageinterval",
            VariantKind::Music => "music",
            VariantKind::Delete => "delete",
            VariantKind::SpleefFloor => "spleeffloor",
            VariantKind::Forwarding => "forwarding",
        }
    }

    /// Case-insensitive lookup by persisted type name.
    pub fn from_type_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.type_name().eq_ignore_ascii_case(name))
    }

    pub fn description(self) -> &'static str {
        match self {
            VariantKind::DamageInterval => "Damages or heals players at an interval while inside.",
            VariantKind::Music => "Plays music to players inside.",
            VariantKind::Delete => "Deletes the blocks of the region when triggered, restores on untrigger.",
            VariantKind::SpleefFloor => "Removes interacted blocks, restores the floor when the arena ends.",
            VariantKind::Forwarding => "Forwards players to another arena.",
        }
    }

    pub fn schema(self) -> &'static SettingsSchema {
        match self {
            VariantKind::DamageInterval => &*crate::variants::damage_interval::SCHEMA,
            VariantKind::Music => &*crate::variants::music::SCHEMA,
            VariantKind::Delete => &*crate::variants::delete::SCHEMA,
            VariantKind::SpleefFloor => &*crate::variants::spleef_floor::SCHEMA,
            VariantKind::Forwarding => &*crate::variants::forwarding::SCHEMA,
        }
    }

    pub fn create(self) -> Box<dyn RegionVariant> {
        match self {
            VariantKind::DamageInterval => Box::new(DamageInterval::default()),
            VariantKind::Music => Box::new(Music::default()),
            VariantKind::Delete => Box::new(Delete),
            VariantKind::SpleefFloor => Box::new(SpleefFloor::default()),
            VariantKind::Forwarding => Box::new(Forwarding::default()),
        }
    }
}

impl fmt::Display for VariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}
