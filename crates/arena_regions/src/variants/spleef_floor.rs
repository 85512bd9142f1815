//! Spleef floor: interacted blocks disappear, the arena end brings them back.

use crate::arena::ArenaEvent;
use crate::error::WorldError;
use crate::queue::BuildSpeed;
use crate::region::{Region, RegionVariant, VariantKind};
use crate::settings::{Settings, SettingsSchema};
use crate::types::{BlockData, BlockPos, Material, PlayerId};
use once_cell::sync::Lazy;
use tracing::{debug, warn};

pub static SCHEMA: Lazy<SettingsSchema> = Lazy::new(|| {
    SettingsSchema::new()
        .materials(
            "affected-blocks",
            "Materials that can be removed. Empty (or only AIR) affects every block.",
        )
        .boolean(
            "drop-unsupported",
            true,
            "Let removed blocks with nothing underneath fall instead of vanishing.",
        )
});

#[derive(Debug)]
pub struct SpleefFloor {
    affected: Vec<Material>,
    drop_unsupported: bool,
}

impl Default for SpleefFloor {
    fn default() -> Self {
        Self {
            affected: Vec::new(),
            drop_unsupported: true,
        }
    }
}

impl SpleefFloor {
    fn affects(&self, material: &Material) -> bool {
        self.affected.is_empty() || self.affected.contains(material)
    }

    /// Removes the block at `pos`. Returns whether anything changed.
    fn remove_block(&self, region: &Region, pos: BlockPos) -> Result<bool, WorldError> {
        let world = &region.services().world;
        let block = world.read_block(pos)?;
        if block.is_air() || !self.affects(&block.material) {
            return Ok(false);
        }

        if self.drop_unsupported && world.read_block(pos.below())?.is_air() {
            world.spawn_falling_block(pos, &block)?;
        }
        world.write_block(pos, &BlockData::air())?;
        Ok(true)
    }

    fn on_block_interact(&self, region: &Region, player: PlayerId, pos: BlockPos) {
        if !region.contains(pos) {
            return;
        }

        match self.remove_block(region, pos) {
            Ok(true) => {
                region.mark_dirty();
                debug!("Region {}: {} removed block at {}", region.context(), player, pos);
            }
            Ok(false) => {}
            Err(e) => warn!("Region {}: failed to remove block at {}: {}", region.context(), pos, e),
        }
    }
}

impl RegionVariant for SpleefFloor {
    fn kind(&self) -> VariantKind {
        VariantKind::SpleefFloor
    }

    fn requires_snapshot(&self) -> bool {
        true
    }

    fn listens_to_arena_events(&self) -> bool {
        true
    }

    fn load_settings(&mut self, _region: &Region, settings: &Settings) {
        let affected: Vec<Material> = settings.materials("affected-blocks").to_vec();
        self.affected = if affected.iter().all(Material::is_air) {
            Vec::new()
        } else {
            affected
        };
        self.drop_unsupported = settings.bool("drop-unsupported");
    }

    fn on_arena_event(&mut self, region: &Region, event: &ArenaEvent) {
        match event {
            ArenaEvent::BlockInteract { player, pos } => self.on_block_interact(region, *player, *pos),
            ArenaEvent::Ended => {
                let future = region.submit_restore(false, BuildSpeed::Performance);
                let context = region.context();
                future.on_fail(move |reason| warn!("Region {}: floor restore failed: {}", context, reason));
            }
            ArenaEvent::Started => {}
        }
    }
}
