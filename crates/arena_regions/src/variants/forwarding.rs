//! Forwards players who enter the region to another arena.

use crate::arena::{ArenaPlayer, Placement};
use crate::region::{Region, RegionVariant, VariantKind};
use crate::settings::{Settings, SettingsSchema};
use crate::types::{ArenaId, Bounds, Location, Vec3};
use once_cell::sync::Lazy;
use std::sync::Arc;
use tracing::{debug, warn};

pub static SCHEMA: Lazy<SettingsSchema> = Lazy::new(|| {
    SettingsSchema::new()
        .unique_id("forward-to-arena", "Arena to forward players to.")
        .boolean("do-teleport", true, "Teleport players into the destination arena.")
        .string(
            "teleport-region",
            "",
            "Region to place players in, searched in this arena first, then in the destination arena.",
        )
        .double("yaw-adjust", 0.0, "Degrees added to the player's yaw when placed through 'teleport-region'.")
});

#[derive(Debug)]
pub struct Forwarding {
    destination: Option<ArenaId>,
    do_teleport: bool,
    teleport_region: String,
    yaw_adjust: f64,
}

impl Default for Forwarding {
    fn default() -> Self {
        Self {
            destination: None,
            do_teleport: true,
            teleport_region: String::new(),
            yaw_adjust: 0.0,
        }
    }
}

/// Places a player at the same offset inside `to` as it has inside `from`.
pub fn relative_placement(from: Bounds, to: Bounds, location: Location, velocity: Vec3, yaw_adjust: f64) -> Placement {
    let (origin, target) = (from.min(), to.min());
    let yaw = ((location.yaw as f64 + yaw_adjust).rem_euclid(360.0)) as f32;

    Placement {
        location: Location::new(
            target.x as f64 + (location.x - origin.x as f64),
            target.y as f64 + (location.y - origin.y as f64),
            target.z as f64 + (location.z - origin.z as f64),
        )
        .with_facing(yaw, location.pitch),
        velocity,
    }
}

impl Forwarding {
    fn destination_bounds(&self, region: &Region, destination: ArenaId) -> Option<Bounds> {
        let directory = &region.services().regions;
        directory
            .find_region(region.arena().id(), &self.teleport_region)
            .or_else(|| directory.find_region(destination, &self.teleport_region))
            .map(|target| target.bounds())
    }
}

impl RegionVariant for Forwarding {
    fn kind(&self) -> VariantKind {
        VariantKind::Forwarding
    }

    fn load_settings(&mut self, _region: &Region, settings: &Settings) {
        self.destination = settings.unique_id("forward-to-arena").map(ArenaId);
        self.do_teleport = settings.bool("do-teleport");
        self.teleport_region = settings.string("teleport-region").trim().to_string();
        self.yaw_adjust = settings.double("yaw-adjust");
    }

    fn accepts_enter(&self, _player: &dyn ArenaPlayer) -> bool {
        self.destination.is_some()
    }

    fn on_enter(&mut self, region: &Region, player: &Arc<dyn ArenaPlayer>) {
        let Some(destination) = self.destination else {
            return;
        };
        let Some(arena) = region.services().arenas.arena(destination) else {
            warn!("Region {}: destination arena {} not found", region.context(), destination);
            return;
        };

        let placement = if self.do_teleport && !self.teleport_region.is_empty() {
            match self.destination_bounds(region, destination) {
                Some(target) => Some(relative_placement(
                    region.bounds(),
                    target,
                    player.location(),
                    player.velocity(),
                    self.yaw_adjust,
                )),
                None => {
                    warn!(
                        "Region {}: teleport region '{}' not found",
                        region.context(),
                        self.teleport_region
                    );
                    None
                }
            }
        } else {
            None
        };

        debug!("Region {}: forwarding {} to arena {}", region.context(), player.id(), arena.name());
        arena.forward_player(player.as_ref(), placement);
    }
}
