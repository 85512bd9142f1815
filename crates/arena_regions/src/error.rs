//! Error types for the region engine.
//!
//! World access failures are always recoverable by resubmitting the work.
//! Contention (a redundant restore) is not an error at all from the queue's
//! point of view and is reported through a cancelled [`TaskFuture`], but the
//! variant exists so synchronous callers can surface it the same way.
//!
//! [`TaskFuture`]: crate::future::TaskFuture

use crate::types::{BlockPos, ChunkCoords};

/// Failures reported by a [`WorldHandle`](crate::world::WorldHandle).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WorldError {
    /// The chunk holding the requested cells is not loaded
    #[error("Chunk not loaded: {0}")]
    ChunkNotLoaded(ChunkCoords),

    /// A single block could not be read or written
    #[error("Block access failed at {pos}: {reason}")]
    BlockAccess { pos: BlockPos, reason: String },
}

/// Main error type for region operations
#[derive(Debug, thiserror::Error)]
pub enum RegionError {
    /// World I/O failed (chunk not loaded, block read/write failure)
    #[error("World I/O error: {0}")]
    WorldIo(#[from] WorldError),

    /// Rejected because an overlapping operation is already in flight
    #[error("Redundant operation: {0}")]
    RedundantOperation(String),

    /// A property value does not match its schema type
    #[error("Setting '{key}' expects {expected}, got {found}")]
    SettingsType {
        key: String,
        expected: String,
        found: String,
    },

    /// The variant has no property with this name
    #[error("Unknown setting: {0}")]
    UnknownSetting(String),

    /// The persisted `type` does not name a region variant
    #[error("Unknown region type: {0}")]
    UnknownRegionType(String),

    /// A region with this name already exists in the arena
    #[error("Region already exists: {0}")]
    DuplicateRegion(String),

    /// No region with this name exists in the arena
    #[error("Region not found: {0}")]
    RegionNotFound(String),

    /// The region has no captured snapshot to restore from
    #[error("Region has no snapshot: {0}")]
    NoSnapshot(String),

    /// The region has build work in flight
    #[error("Region is busy: {0}")]
    Busy(String),

    /// Region bounds are unusable
    #[error("Invalid bounds: {0}")]
    InvalidBounds(String),

    /// Engine configuration is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for RegionError {
    fn from(err: serde_json::Error) -> Self {
        RegionError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for RegionError {
    fn from(err: toml::de::Error) -> Self {
        RegionError::Serialization(err.to_string())
    }
}

impl From<toml::ser::Error> for RegionError {
    fn from(err: toml::ser::Error) -> Self {
        RegionError::Serialization(err.to_string())
    }
}
