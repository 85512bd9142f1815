//! Plays a playlist to players inside the region.

use crate::arena::ArenaPlayer;
use crate::region::{Region, RegionVariant, VariantKind};
use crate::settings::{Settings, SettingsSchema};
use crate::types::PlayerId;
use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

pub static SCHEMA: Lazy<SettingsSchema> = Lazy::new(|| {
    SettingsSchema::new()
        .string("resource-sound", "", "Comma separated names of the sounds to play.")
        .boolean("loop", false, "Restart the playlist when it ends.")
});

#[derive(Debug, Default)]
pub struct Music {
    playlist: Vec<String>,
    looping: bool,
    listeners: HashSet<PlayerId>,
}

impl Music {
    pub fn playlist(&self) -> &[String] {
        &self.playlist
    }
}

impl RegionVariant for Music {
    fn kind(&self) -> VariantKind {
        VariantKind::Music
    }

    fn load_settings(&mut self, region: &Region, settings: &Settings) {
        let sounds = &region.services().sounds;
        self.looping = settings.bool("loop");
        self.playlist = settings
            .string("resource-sound")
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .filter(|name| {
                let known = sounds.has_sound(name);
                if !known {
                    debug!("Region {}: unknown sound '{}' skipped", region.context(), name);
                }
                known
            })
            .map(str::to_string)
            .collect();
    }

    fn accepts_enter(&self, _player: &dyn ArenaPlayer) -> bool {
        !self.playlist.is_empty()
    }

    fn accepts_leave(&self, _player: &dyn ArenaPlayer) -> bool {
        true
    }

    fn on_enter(&mut self, region: &Region, player: &Arc<dyn ArenaPlayer>) {
        let sounds = &region.services().sounds;
        if sounds.is_playing(player.id()) {
            return;
        }
        sounds.play(player.id(), &self.playlist, self.looping);
        self.listeners.insert(player.id());
    }

    fn on_leave(&mut self, region: &Region, player: &Arc<dyn ArenaPlayer>) {
        if self.listeners.remove(&player.id()) {
            region.services().sounds.stop(player.id());
        }
    }

    fn on_disable(&mut self, region: &Region) {
        let sounds = &region.services().sounds;
        for player in self.listeners.drain() {
            sounds.stop(player);
        }
    }
}
