//! World access seam.
//!
//! The engine never touches a host's world directly. Everything goes through
//! [`WorldHandle`], which hosts implement over their own block storage. Calls
//! are assumed to be neither pure nor fast, so any operation touching more than
//! a handful of cells is routed through the [`TaskQueue`](crate::queue::TaskQueue).

use crate::error::WorldError;
use crate::types::{BlockData, BlockPos, ChunkCoords};
use dashmap::{DashMap, DashSet};
use std::sync::atomic::{AtomicU64, Ordering};

/// Block-level access to a host world.
pub trait WorldHandle: Send + Sync {
    /// Reads the block at `pos`.
    fn read_block(&self, pos: BlockPos) -> Result<BlockData, WorldError>;

    /// Writes `block` at `pos`.
    fn write_block(&self, pos: BlockPos, block: &BlockData) -> Result<(), WorldError>;

    /// Whether the chunk column is loaded and safe to read or write.
    fn is_chunk_loaded(&self, coords: ChunkCoords) -> bool;

    /// Spawns a falling-block entity carrying `block` at `pos`.
    ///
    /// Worlds without entities can keep the default, which does nothing.
    fn spawn_falling_block(&self, _pos: BlockPos, _block: &BlockData) -> Result<(), WorldError> {
        Ok(())
    }
}

/// In-memory world used by hosts' tests and by this crate's own tests.
///
/// Unset cells read as air. Every chunk is loaded unless explicitly unloaded.
#[derive(Debug, Default)]
pub struct MemoryWorld {
    blocks: DashMap<BlockPos, BlockData>,
    unloaded: DashSet<ChunkCoords>,
    falling: DashMap<BlockPos, BlockData>,
    writes: AtomicU64,
}

impl MemoryWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a block without counting it as a write.
    pub fn set(&self, pos: BlockPos, block: BlockData) {
        self.blocks.insert(pos, block);
    }

    /// Reads a block regardless of chunk load state.
    pub fn get(&self, pos: BlockPos) -> BlockData {
        self.blocks
            .get(&pos)
            .map(|entry| entry.value().clone())
            .unwrap_or_else(BlockData::air)
    }

    /// Fills the inclusive box between two corners without counting writes.
    pub fn fill(&self, p1: BlockPos, p2: BlockPos, block: BlockData) {
        for x in p1.x.min(p2.x)..=p1.x.max(p2.x) {
            for y in p1.y.min(p2.y)..=p1.y.max(p2.y) {
                for z in p1.z.min(p2.z)..=p1.z.max(p2.z) {
                    self.blocks.insert(BlockPos::new(x, y, z), block.clone());
                }
            }
        }
    }

    pub fn unload_chunk(&self, coords: ChunkCoords) {
        self.unloaded.insert(coords);
    }

    pub fn load_chunk(&self, coords: ChunkCoords) {
        self.unloaded.remove(&coords);
    }

    /// Number of `write_block` calls that succeeded.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Acquire)
    }

    /// Falling blocks spawned so far, keyed by their origin cell.
    pub fn falling_block(&self, pos: BlockPos) -> Option<BlockData> {
        self.falling.get(&pos).map(|entry| entry.value().clone())
    }

    fn ensure_loaded(&self, pos: BlockPos) -> Result<(), WorldError> {
        let coords = ChunkCoords::of(pos);
        if self.unloaded.contains(&coords) {
            return Err(WorldError::ChunkNotLoaded(coords));
        }
        Ok(())
    }
}

impl WorldHandle for MemoryWorld {
    fn read_block(&self, pos: BlockPos) -> Result<BlockData, WorldError> {
        self.ensure_loaded(pos)?;
        Ok(self.get(pos))
    }

    fn write_block(&self, pos: BlockPos, block: &BlockData) -> Result<(), WorldError> {
        self.ensure_loaded(pos)?;
        self.blocks.insert(pos, block.clone());
        self.writes.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn is_chunk_loaded(&self, coords: ChunkCoords) -> bool {
        !self.unloaded.contains(&coords)
    }

    fn spawn_falling_block(&self, pos: BlockPos, block: &BlockData) -> Result<(), WorldError> {
        self.ensure_loaded(pos)?;
        self.falling.insert(pos, block.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_cells_read_as_air() {
        let world = MemoryWorld::new();
        assert!(world.read_block(BlockPos::new(1, 2, 3)).unwrap().is_air());
    }

    #[test]
    fn test_unloaded_chunk_rejects_access() {
        let world = MemoryWorld::new();
        let pos = BlockPos::new(20, 0, 20);
        world.unload_chunk(ChunkCoords::of(pos));

        assert_eq!(
            world.read_block(pos),
            Err(WorldError::ChunkNotLoaded(ChunkCoords::new(1, 1)))
        );
        assert!(world.write_block(pos, &BlockData::of("STONE")).is_err());
        assert_eq!(world.write_count(), 0);

        world.load_chunk(ChunkCoords::of(pos));
        world.write_block(pos, &BlockData::of("STONE")).unwrap();
        assert_eq!(world.write_count(), 1);
        assert_eq!(world.get(pos), BlockData::of("STONE"));
    }
}
