//! Damages (or heals) players at a fixed interval while they stay inside.

use crate::arena::ArenaPlayer;
use crate::region::{Region, RegionVariant, VariantKind};
use crate::scheduler::{ScheduledTask, TICKS_PER_SECOND};
use crate::settings::{Settings, SettingsSchema};
use crate::types::PlayerId;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

pub static SCHEMA: Lazy<SettingsSchema> = Lazy::new(|| {
    SettingsSchema::new()
        .double("damage", 1.0, "Damage dealt each interval. Negative values heal.")
        .integer("interval", 1, "Seconds between hits.")
});

#[derive(Debug)]
pub struct DamageInterval {
    damage: f64,
    interval_secs: u64,
    timers: HashMap<PlayerId, ScheduledTask>,
}

impl Default for DamageInterval {
    fn default() -> Self {
        Self {
            damage: 1.0,
            interval_secs: 1,
            timers: HashMap::new(),
        }
    }
}

impl DamageInterval {
    /// Number of players with a running timer.
    pub fn active_timers(&self) -> usize {
        self.timers.values().filter(|timer| !timer.is_finished()).count()
    }

    /// Timer period in game ticks.
    fn period_ticks(&self) -> u64 {
        self.interval_secs.saturating_mul(TICKS_PER_SECOND)
    }
}

/// Applies one hit. Negative damage heals, capped at max health.
fn apply_damage(player: &dyn ArenaPlayer, damage: f64) {
    if damage < 0.0 {
        let health = (player.health() - damage).min(player.max_health());
        player.set_health(health);
    } else if damage > 0.0 {
        player.damage(damage);
    }
}

impl RegionVariant for DamageInterval {
    fn kind(&self) -> VariantKind {
        VariantKind::DamageInterval
    }

    fn load_settings(&mut self, _region: &Region, settings: &Settings) {
        self.damage = settings.double("damage");
        self.interval_secs = settings.integer("interval").max(1) as u64;
    }

    fn accepts_enter(&self, _player: &dyn ArenaPlayer) -> bool {
        true
    }

    fn accepts_leave(&self, _player: &dyn ArenaPlayer) -> bool {
        true
    }

    fn on_enter(&mut self, region: &Region, player: &Arc<dyn ArenaPlayer>) {
        let target = player.clone();
        let damage = self.damage;
        let timer = region.services().scheduler.run_repeating(
            1,
            self.period_ticks(),
            move || {
                if !target.is_online() || target.is_dead() {
                    return false;
                }
                apply_damage(target.as_ref(), damage);
                true
            },
        );

        if let Some(previous) = self.timers.insert(player.id(), timer) {
            previous.cancel();
        }
        debug!("Region {}: damage timer started for {}", region.context(), player.id());
    }

    fn on_leave(&mut self, region: &Region, player: &Arc<dyn ArenaPlayer>) {
        if let Some(timer) = self.timers.remove(&player.id()) {
            timer.cancel();
            debug!("Region {}: damage timer stopped for {}", region.context(), player.id());
        }
    }

    fn on_disable(&mut self, _region: &Region) {
        for (_, timer) in self.timers.drain() {
            timer.cancel();
        }
    }
}
