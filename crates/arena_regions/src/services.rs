//! Services shared by every region of a host.
//!
//! One [`RegionServices`] bundle is created at startup and handed to each
//! [`RegionManager`]. Independent bundles can coexist in one process, which is
//! how tests run isolated arenas side by side.

use crate::arena::{ArenaDirectory, SoundPlayer};
use crate::config::EngineConfig;
use crate::manager::RegionManager;
use crate::queue::TaskQueue;
use crate::region::Region;
use crate::scheduler::Scheduler;
use crate::types::ArenaId;
use crate::world::WorldHandle;
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use tracing::info;

/// Region managers by arena, held weakly.
#[derive(Debug, Default)]
pub struct RegionDirectory {
    managers: DashMap<ArenaId, Weak<RegionManager>>,
}

impl RegionDirectory {
    pub fn register(&self, manager: &Arc<RegionManager>) {
        self.managers.insert(manager.arena_id(), Arc::downgrade(manager));
    }

    pub fn unregister(&self, arena: ArenaId) {
        self.managers.remove(&arena);
    }

    pub fn manager(&self, arena: ArenaId) -> Option<Arc<RegionManager>> {
        self.managers.get(&arena).and_then(|entry| entry.value().upgrade())
    }

    /// Looks up a region by arena and name.
    pub fn find_region(&self, arena: ArenaId, name: &str) -> Option<Arc<Region>> {
        self.manager(arena).and_then(|manager| manager.region(name))
    }
}

pub struct RegionServices {
    pub world: Arc<dyn WorldHandle>,
    pub queue: Arc<TaskQueue>,
    pub scheduler: Scheduler,
    pub arenas: Arc<dyn ArenaDirectory>,
    pub sounds: Arc<dyn SoundPlayer>,
    pub regions: RegionDirectory,
}

impl RegionServices {
    /// Builds the service bundle on the current tokio runtime.
    pub fn new(
        world: Arc<dyn WorldHandle>,
        arenas: Arc<dyn ArenaDirectory>,
        sounds: Arc<dyn SoundPlayer>,
        config: &EngineConfig,
    ) -> Arc<Self> {
        let queue = Arc::new(TaskQueue::new(world.clone(), &config.queue));
        let scheduler = Scheduler::current(&config.scheduler);
        info!(
            "Region services started (tick {}ms, performance pause {}ms)",
            config.scheduler.tick_interval_ms, config.queue.performance_pause_ms
        );

        Arc::new(Self {
            world,
            queue,
            scheduler,
            arenas,
            sounds,
            regions: RegionDirectory::default(),
        })
    }

    /// Drains the build queue. Pending tasks resolve as cancelled.
    pub fn shutdown(&self) {
        self.queue.shutdown();
    }
}
