//! Region snapshots partitioned into chunk sections.
//!
//! A snapshot is an immutable record of every cell inside a region's bounds.
//! Cells are grouped by the chunk column they live in so capture and restore
//! can work (and pause) one section at a time.

use crate::error::WorldError;
use crate::types::{BlockData, BlockPos, BlockState, Bounds, ChunkCoords, RegionId};
use crate::world::WorldHandle;
use std::time::Duration;
use tracing::debug;

/// All captured cells of one region that fall inside a single chunk column.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkSection {
    pub coords: ChunkCoords,
    pub blocks: Vec<BlockState>,
}

/// Complete, immutable capture of a region's volume.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    region: RegionId,
    bounds: Bounds,
    sections: Vec<ChunkSection>,
}

impl Snapshot {
    /// Reads every cell inside `bounds` from the live world.
    ///
    /// All chunks are checked before the first read, so a capture either sees
    /// the whole volume or fails with [`WorldError::ChunkNotLoaded`].
    pub fn capture(
        world: &dyn WorldHandle,
        region: RegionId,
        bounds: Bounds,
        pause: Option<Duration>,
    ) -> Result<Self, WorldError> {
        let chunks = bounds.chunks();
        ensure_loaded(world, &chunks)?;

        let mut sections = Vec::with_capacity(chunks.len());
        for (index, coords) in chunks.into_iter().enumerate() {
            if index > 0 {
                pause_between_sections(pause);
            }

            let (xs, zs) = bounds.column_ranges(coords);
            let mut blocks = Vec::with_capacity(
                xs.clone().count() * zs.clone().count() * bounds.height() as usize,
            );

            for y in bounds.min().y..=bounds.max().y {
                for z in zs.clone() {
                    for x in xs.clone() {
                        let pos = BlockPos::new(x, y, z);
                        let block = world.read_block(pos)?;
                        blocks.push(BlockState::new(bounds.to_local(pos), block));
                    }
                }
            }

            sections.push(ChunkSection { coords, blocks });
        }

        let snapshot = Self {
            region,
            bounds,
            sections,
        };
        debug!(
            "Captured {} cells in {} sections for {}",
            snapshot.cell_count(),
            snapshot.sections.len(),
            snapshot.region
        );
        Ok(snapshot)
    }

    /// Writes every captured cell back into the world, section by section.
    ///
    /// Returns the number of cells written. Callers must not rely on any
    /// particular cell order, only on completeness after success.
    pub fn restore(&self, world: &dyn WorldHandle, pause: Option<Duration>) -> Result<usize, WorldError> {
        let chunks: Vec<ChunkCoords> = self.sections.iter().map(|section| section.coords).collect();
        ensure_loaded(world, &chunks)?;

        let mut written = 0;
        for (index, section) in self.sections.iter().enumerate() {
            if index > 0 {
                pause_between_sections(pause);
            }

            for state in &section.blocks {
                let pos = self.bounds.to_world(state.local_pos());
                world.write_block(pos, &state.block())?;
                written += 1;
            }
        }

        debug!("Restored {} cells for {}", written, self.region);
        Ok(written)
    }

    pub fn region(&self) -> &RegionId {
        &self.region
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn sections(&self) -> &[ChunkSection] {
        &self.sections
    }

    /// Total number of captured cells across all sections.
    pub fn cell_count(&self) -> usize {
        self.sections.iter().map(|section| section.blocks.len()).sum()
    }

    /// Looks up the captured state at region-local coordinates.
    pub fn block_at(&self, local: BlockPos) -> Option<&BlockState> {
        let world = self.bounds.to_world(local);
        if !self.bounds.contains(world) {
            return None;
        }

        let coords = ChunkCoords::of(world);
        self.sections
            .iter()
            .find(|section| section.coords == coords)
            .and_then(|section| section.blocks.iter().find(|state| state.local_pos() == local))
    }
}

/// Writes `block` into every cell of `bounds`, one chunk section at a time.
pub fn fill_volume(
    world: &dyn WorldHandle,
    bounds: Bounds,
    block: &BlockData,
    pause: Option<Duration>,
) -> Result<usize, WorldError> {
    let chunks = bounds.chunks();
    ensure_loaded(world, &chunks)?;

    let mut written = 0;
    for (index, coords) in chunks.into_iter().enumerate() {
        if index > 0 {
            pause_between_sections(pause);
        }

        let (xs, zs) = bounds.column_ranges(coords);
        for y in bounds.min().y..=bounds.max().y {
            for z in zs.clone() {
                for x in xs.clone() {
                    world.write_block(BlockPos::new(x, y, z), block)?;
                    written += 1;
                }
            }
        }
    }
    Ok(written)
}

fn ensure_loaded(world: &dyn WorldHandle, chunks: &[ChunkCoords]) -> Result<(), WorldError> {
    match chunks.iter().find(|coords| !world.is_chunk_loaded(**coords)) {
        Some(coords) => Err(WorldError::ChunkNotLoaded(*coords)),
        None => Ok(()),
    }
}

fn pause_between_sections(pause: Option<Duration>) {
    if let Some(pause) = pause {
        if pause.is_zero() {
            std::thread::yield_now();
        } else {
            std::thread::sleep(pause);
        }
    }
}
