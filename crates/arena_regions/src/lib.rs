//! # Arena Regions
//!
//! Named, bounded volumes inside game arenas that react to players and arena
//! events, backed by block snapshots and an asynchronous build queue.
//!
//! ## Core Features
//!
//! - **Snapshots**: Capture a region's blocks chunk by chunk and restore them later
//! - **Build Queue**: One background worker runs capture, restore and fill work in strict FIFO order
//! - **Futures**: Every submitted task resolves exactly once with a success, failure or cancellation
//! - **Region Variants**: Damage intervals, music, delete-on-trigger, spleef floors and arena forwarding
//! - **Typed Settings**: Per-variant settings schemas with validation and JSON persistence
//!
//! ## Quick Start Example
//!
//! ```rust,no_run
//! use arena_regions::*;
//! use std::sync::Arc;
//!
//! # fn host() -> (Arc<dyn Arena>, Arc<dyn ArenaDirectory>, Arc<dyn SoundPlayer>) { unimplemented!() }
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let (arena, arenas, sounds) = host();
//!     let world = Arc::new(MemoryWorld::new());
//!     let services = RegionServices::new(world, arenas, sounds, &EngineConfig::default());
//!
//!     let manager = RegionManager::new(arena, services.clone());
//!     let file = RegionsFile::load_from_file(&"regions.toml".into()).await?;
//!     let report = manager.load_documents(&file.regions);
//!     println!("{} regions loaded", report.loaded.len());
//!
//!     if let Some(region) = manager.region("bridge") {
//!         region.trigger();
//!     }
//!
//!     services.shutdown();
//!     Ok(())
//! }
//! ```

pub mod arena;
pub mod config;
pub mod error;
pub mod future;
pub mod logging;
pub mod manager;
pub mod queue;
pub mod region;
pub mod scheduler;
pub mod services;
pub mod settings;
pub mod snapshot;
pub mod types;
pub mod variants;
pub mod world;

#[cfg(test)]
mod testkit;

pub use arena::{Arena, ArenaDirectory, ArenaEvent, ArenaEvents, ArenaPlayer, Placement, SoundPlayer};
pub use config::{EngineConfig, RegionDocument, RegionsFile};
pub use error::{RegionError, WorldError};
pub use future::{TaskFuture, TaskOutcome, TaskOutput, TaskStatus};
pub use logging::setup_logging;
pub use manager::{LoadReport, Movement, RegionManager};
pub use queue::{BuildSpeed, BuildTask, TaskHandle, TaskId, TaskQueue};
pub use region::{Region, RegionStatus, VariantKind};
pub use scheduler::{ScheduledTask, Scheduler};
pub use services::RegionServices;
pub use settings::{PropertyKind, PropertyValue, Settings, SettingsSchema};
pub use snapshot::Snapshot;
pub use types::{ArenaId, BlockData, BlockPos, BlockState, Bounds, ChunkCoords, Location, Material, PlayerId, RegionId, Vec3};
pub use world::{MemoryWorld, WorldHandle};

pub type Result<T> = std::result::Result<T, RegionError>;
