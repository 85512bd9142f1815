//! Clears the whole volume when triggered; untrigger brings it back.

use crate::queue::{BuildSpeed, BuildTask};
use crate::region::{Region, RegionVariant, VariantKind};
use crate::settings::{Settings, SettingsSchema};
use crate::types::BlockData;
use once_cell::sync::Lazy;
use tracing::debug;

pub static SCHEMA: Lazy<SettingsSchema> = Lazy::new(SettingsSchema::new);

#[derive(Debug, Default)]
pub struct Delete;

impl RegionVariant for Delete {
    fn kind(&self) -> VariantKind {
        VariantKind::Delete
    }

    fn requires_snapshot(&self) -> bool {
        true
    }

    fn restores_on_untrigger(&self) -> bool {
        true
    }

    fn load_settings(&mut self, _region: &Region, _settings: &Settings) {}

    fn on_trigger(&mut self, region: &Region) -> bool {
        if !region.can_restore() {
            debug!("Region {}: no snapshot yet, trigger ignored", region.context());
            return false;
        }

        let task = BuildTask::fill(region.id().clone(), region.bounds(), BlockData::air())
            .with_speed(BuildSpeed::Fast);
        region.submit(task);
        true
    }
}
