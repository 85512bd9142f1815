//! Build task definitions.

use crate::error::WorldError;
use crate::future::TaskOutput;
use crate::snapshot::{fill_volume, Snapshot};
use crate::types::{BlockData, Bounds, RegionId};
use crate::world::WorldHandle;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Identifier assigned to a task when it is submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How aggressively a task may use the world between chunk sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildSpeed {
    /// No pauses at all
    Fast,
    /// Yield the worker thread between sections
    #[default]
    Balanced,
    /// Sleep for the configured pause between sections
    Performance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Capture,
    Restore,
    Fill,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Capture => write!(f, "capture"),
            TaskKind::Restore => write!(f, "restore"),
            TaskKind::Fill => write!(f, "fill"),
        }
    }
}

/// The world mutation (or read) a task performs.
#[derive(Debug, Clone)]
pub enum BuildJob {
    /// Read the volume into a new snapshot
    Capture { bounds: Bounds },
    /// Write a snapshot back; the snapshot is shared, never mutated
    Restore { snapshot: Arc<Snapshot> },
    /// Overwrite the volume with a single block
    Fill { bounds: Bounds, block: BlockData },
}

/// A unit of work for the [`TaskQueue`](super::TaskQueue).
#[derive(Debug, Clone)]
pub struct BuildTask {
    pub region: RegionId,
    pub job: BuildJob,
    pub speed: BuildSpeed,
    /// Skips the redundancy guard for restores
    pub force: bool,
}

impl BuildTask {
    pub fn capture(region: RegionId, bounds: Bounds) -> Self {
        Self::new(region, BuildJob::Capture { bounds })
    }

    pub fn restore(region: RegionId, snapshot: Arc<Snapshot>) -> Self {
        Self::new(region, BuildJob::Restore { snapshot })
    }

    pub fn fill(region: RegionId, bounds: Bounds, block: BlockData) -> Self {
        Self::new(region, BuildJob::Fill { bounds, block })
    }

    fn new(region: RegionId, job: BuildJob) -> Self {
        Self {
            region,
            job,
            speed: BuildSpeed::default(),
            force: false,
        }
    }

    pub fn with_speed(mut self, speed: BuildSpeed) -> Self {
        self.speed = speed;
        self
    }

    pub fn forced(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn kind(&self) -> TaskKind {
        match self.job {
            BuildJob::Capture { .. } => TaskKind::Capture,
            BuildJob::Restore { .. } => TaskKind::Restore,
            BuildJob::Fill { .. } => TaskKind::Fill,
        }
    }

    /// Runs the job against `world`. Blocks the calling thread.
    pub fn execute(&self, world: &dyn WorldHandle, pause: Option<Duration>) -> Result<TaskOutput, WorldError> {
        match &self.job {
            BuildJob::Capture { bounds } => {
                let snapshot = Snapshot::capture(world, self.region.clone(), *bounds, pause)?;
                Ok(TaskOutput::Captured(Arc::new(snapshot)))
            }
            BuildJob::Restore { snapshot } => {
                let cells = snapshot.restore(world, pause)?;
                Ok(TaskOutput::Restored { cells })
            }
            BuildJob::Fill { bounds, block } => {
                let cells = fill_volume(world, *bounds, block, pause)?;
                Ok(TaskOutput::Filled { cells })
            }
        }
    }
}
