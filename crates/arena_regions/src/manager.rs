//! Per-arena region ownership and player containment tracking.

use crate::arena::{Arena, ArenaPlayer};
use crate::config::RegionDocument;
use crate::error::RegionError;
use crate::region::Region;
use crate::services::RegionServices;
use crate::types::{ArenaId, BlockPos, PlayerId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of [`RegionManager::load_documents`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded: Vec<String>,
    /// Region name and the reason it was skipped
    pub skipped: Vec<(String, String)>,
}

/// Regions a player entered and left with one movement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Movement {
    pub entered: Vec<String>,
    pub left: Vec<String>,
}

/// Owns every region of one arena, indexed by name.
pub struct RegionManager {
    arena: Arc<dyn Arena>,
    services: Arc<RegionServices>,
    regions: DashMap<String, Arc<Region>>,
    /// Names of the regions each player is inside
    containment: DashMap<PlayerId, BTreeSet<String>>,
}

impl RegionManager {
    /// Creates the manager and registers it in the services' directory.
    pub fn new(arena: Arc<dyn Arena>, services: Arc<RegionServices>) -> Arc<Self> {
        let manager = Arc::new(Self {
            arena,
            services,
            regions: DashMap::new(),
            containment: DashMap::new(),
        });
        manager.services.regions.register(&manager);
        manager
    }

    pub fn arena_id(&self) -> ArenaId {
        self.arena.id()
    }

    pub fn arena(&self) -> &Arc<dyn Arena> {
        &self.arena
    }

    /// Creates, initializes and stores a region.
    pub fn create_region(&self, document: &RegionDocument) -> Result<Arc<Region>, RegionError> {
        if self.regions.contains_key(&document.name) {
            return Err(RegionError::DuplicateRegion(document.name.clone()));
        }

        let region = Region::from_document(document, self.arena.clone(), self.services.clone())?;
        match self.regions.entry(document.name.clone()) {
            Entry::Occupied(_) => {
                region.dispose();
                Err(RegionError::DuplicateRegion(document.name.clone()))
            }
            Entry::Vacant(entry) => {
                entry.insert(region.clone());
                info!("Region {} created ({})", region.context(), region.kind());
                Ok(region)
            }
        }
    }

    /// Creates every region in `documents`. Invalid entries are skipped with
    /// a warning; the rest still load.
    pub fn load_documents(&self, documents: &[RegionDocument]) -> LoadReport {
        let mut report = LoadReport::default();
        for document in documents {
            match self.create_region(document) {
                Ok(_) => report.loaded.push(document.name.clone()),
                Err(e) => {
                    warn!(
                        "Arena {}: skipping region '{}': {}",
                        self.arena.name(),
                        document.name,
                        e
                    );
                    report.skipped.push((document.name.clone(), e.to_string()));
                }
            }
        }

        info!(
            "Arena {}: loaded {} regions, skipped {}",
            self.arena.name(),
            report.loaded.len(),
            report.skipped.len()
        );
        report
    }

    pub fn region(&self, name: &str) -> Option<Arc<Region>> {
        self.regions.get(name).map(|entry| entry.value().clone())
    }

    /// All regions, ordered by name.
    pub fn regions(&self) -> Vec<Arc<Region>> {
        let mut regions: Vec<Arc<Region>> = self.regions.iter().map(|entry| entry.value().clone()).collect();
        regions.sort_by(|a, b| a.name().cmp(b.name()));
        regions
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Removes and disposes a region.
    pub fn remove_region(&self, name: &str) -> Result<Arc<Region>, RegionError> {
        let (_, region) = self
            .regions
            .remove(name)
            .ok_or_else(|| RegionError::RegionNotFound(name.to_string()))?;

        for mut entry in self.containment.iter_mut() {
            entry.value_mut().remove(name);
        }
        region.dispose();
        info!("Region {} removed", region.context());
        Ok(region)
    }

    /// Persistable documents of every region, ordered by name.
    pub fn documents(&self) -> Vec<RegionDocument> {
        self.regions().iter().map(|region| region.document()).collect()
    }

    /// Updates which regions `player` is inside after moving to `pos`, and
    /// notifies the regions it entered or left.
    pub fn update_player(&self, player: &Arc<dyn ArenaPlayer>, pos: BlockPos) -> Movement {
        let mut movement = Movement::default();
        let regions = self.regions();
        {
            let mut inside = self.containment.entry(player.id()).or_default();
            for region in &regions {
                let name = region.name();
                let contains = region.contains(pos);
                if contains && !inside.contains(name) {
                    inside.insert(name.to_string());
                    movement.entered.push(name.to_string());
                } else if !contains && inside.remove(name) {
                    movement.left.push(name.to_string());
                }
            }
        }

        for region in &regions {
            if movement.left.iter().any(|name| name == region.name()) {
                region.player_left(player);
            }
        }
        for region in &regions {
            if movement.entered.iter().any(|name| name == region.name()) {
                region.player_entered(player);
            }
        }
        movement
    }

    /// Player left the arena or disconnected: leave every region it was in.
    pub fn player_removed(&self, player: &Arc<dyn ArenaPlayer>) -> Vec<String> {
        let names: Vec<String> = self
            .containment
            .remove(&player.id())
            .map(|(_, names)| names.into_iter().collect())
            .unwrap_or_default();

        for name in &names {
            if let Some(region) = self.region(name) {
                region.player_left(player);
            }
        }
        names
    }

    /// Names of the regions `player` is currently inside.
    pub fn regions_of(&self, player: PlayerId) -> Vec<String> {
        self.containment
            .get(&player)
            .map(|names| names.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Disposes every region and leaves the directory.
    pub fn dispose(&self) {
        for region in self.regions() {
            region.dispose();
        }
        self.regions.clear();
        self.containment.clear();
        self.services.regions.unregister(self.arena.id());
        info!("Arena {}: regions disposed", self.arena.name());
    }
}

impl fmt::Debug for RegionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegionManager")
            .field("arena", &self.arena.name())
            .field("regions", &self.regions.len())
            .finish()
    }
}
