//! Core value types shared across the region engine.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use uuid::Uuid;

/// Width of a chunk column along X and Z, in blocks.
pub const CHUNK_WIDTH: i32 = 16;

const CHUNK_SHIFT: i32 = 4;

/// Integer position in the block grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub const fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    /// The position directly below this one.
    pub const fn below(self) -> Self {
        self.offset(0, -1, 0)
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

impl From<[i32; 3]> for BlockPos {
    fn from([x, y, z]: [i32; 3]) -> Self {
        Self::new(x, y, z)
    }
}

/// Coordinates of a 16x16 chunk column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkCoords {
    pub x: i32,
    pub z: i32,
}

impl ChunkCoords {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// The chunk column containing `pos`.
    pub const fn of(pos: BlockPos) -> Self {
        Self::new(pos.x >> CHUNK_SHIFT, pos.z >> CHUNK_SHIFT)
    }

    /// Block X of the chunk's western edge.
    pub const fn min_x(self) -> i32 {
        self.x * CHUNK_WIDTH
    }

    /// Block Z of the chunk's northern edge.
    pub const fn min_z(self) -> i32 {
        self.z * CHUNK_WIDTH
    }
}

impl fmt::Display for ChunkCoords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.x, self.z)
    }
}

/// Inclusive rectangular volume, normalized so `min <= max` on every axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Corners")]
pub struct Bounds {
    min: BlockPos,
    max: BlockPos,
}

/// Serialized corners of a [`Bounds`], normalized on the way in.
#[derive(Deserialize)]
struct Corners {
    min: BlockPos,
    max: BlockPos,
}

impl From<Corners> for Bounds {
    fn from(corners: Corners) -> Self {
        Bounds::new(corners.min, corners.max)
    }
}

impl Bounds {
    /// Creates bounds from two arbitrary corners.
    pub fn new(p1: BlockPos, p2: BlockPos) -> Self {
        Self {
            min: BlockPos::new(p1.x.min(p2.x), p1.y.min(p2.y), p1.z.min(p2.z)),
            max: BlockPos::new(p1.x.max(p2.x), p1.y.max(p2.y), p1.z.max(p2.z)),
        }
    }

    pub fn min(&self) -> BlockPos {
        self.min
    }

    pub fn max(&self) -> BlockPos {
        self.max
    }

    pub fn width(&self) -> u64 {
        (self.max.x as i64 - self.min.x as i64 + 1) as u64
    }

    pub fn height(&self) -> u64 {
        (self.max.y as i64 - self.min.y as i64 + 1) as u64
    }

    pub fn length(&self) -> u64 {
        (self.max.z as i64 - self.min.z as i64 + 1) as u64
    }

    /// Number of cells inside the volume.
    pub fn volume(&self) -> u64 {
        self.width() * self.height() * self.length()
    }

    pub fn contains(&self, pos: BlockPos) -> bool {
        pos.x >= self.min.x
            && pos.x <= self.max.x
            && pos.y >= self.min.y
            && pos.y <= self.max.y
            && pos.z >= self.min.z
            && pos.z <= self.max.z
    }

    /// True when the two volumes share at least one cell.
    pub fn intersects(&self, other: &Bounds) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Converts a world position into coordinates relative to `min`.
    pub fn to_local(&self, pos: BlockPos) -> BlockPos {
        BlockPos::new(pos.x - self.min.x, pos.y - self.min.y, pos.z - self.min.z)
    }

    /// Converts region-local coordinates back into a world position.
    pub fn to_world(&self, local: BlockPos) -> BlockPos {
        self.min.offset(local.x, local.y, local.z)
    }

    /// Every chunk column the volume touches, ordered by (x, z).
    pub fn chunks(&self) -> Vec<ChunkCoords> {
        let from = ChunkCoords::of(self.min);
        let to = ChunkCoords::of(self.max);
        let mut chunks = Vec::new();
        for x in from.x..=to.x {
            for z in from.z..=to.z {
                chunks.push(ChunkCoords::new(x, z));
            }
        }
        chunks
    }

    /// The X and Z block ranges of this volume that fall inside `chunk`.
    pub fn column_ranges(&self, chunk: ChunkCoords) -> (RangeInclusive<i32>, RangeInclusive<i32>) {
        let x_start = self.min.x.max(chunk.min_x());
        let x_end = self.max.x.min(chunk.min_x() + CHUNK_WIDTH - 1);
        let z_start = self.min.z.max(chunk.min_z());
        let z_end = self.max.z.min(chunk.min_z() + CHUNK_WIDTH - 1);
        (x_start..=x_end, z_start..=z_end)
    }
}

/// Block material name, normalized to upper case (`"STONE"`, `"AIR"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Material(CompactString);

impl Material {
    pub fn new(name: &str) -> Self {
        Self(CompactString::new(name.trim().to_ascii_uppercase()))
    }

    pub fn air() -> Self {
        Self::new("AIR")
    }

    pub fn is_air(&self) -> bool {
        self.0 == "AIR"
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for Material {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Material {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Contents of one cell: material plus auxiliary data (orientation, damage).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockData {
    pub material: Material,
    #[serde(default)]
    pub data: u8,
}

impl BlockData {
    pub fn new(material: impl Into<Material>, data: u8) -> Self {
        Self {
            material: material.into(),
            data,
        }
    }

    pub fn of(material: impl Into<Material>) -> Self {
        Self::new(material, 0)
    }

    pub fn air() -> Self {
        Self::of(Material::air())
    }

    pub fn is_air(&self) -> bool {
        self.material.is_air()
    }
}

/// One captured cell with region-local coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockState {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub material: Material,
    pub data: u8,
}

impl BlockState {
    pub fn new(local: BlockPos, block: BlockData) -> Self {
        Self {
            x: local.x,
            y: local.y,
            z: local.z,
            material: block.material,
            data: block.data,
        }
    }

    pub fn local_pos(&self) -> BlockPos {
        BlockPos::new(self.x, self.y, self.z)
    }

    pub fn block(&self) -> BlockData {
        BlockData::new(self.material.clone(), self.data)
    }
}

/// Identifier of an arena owned by the host runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArenaId(pub Uuid);

impl ArenaId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ArenaId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ArenaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a player known to the host runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Region identity: owning arena plus the region's unique name within it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegionId {
    pub arena: ArenaId,
    pub name: CompactString,
}

impl RegionId {
    pub fn new(arena: ArenaId, name: &str) -> Self {
        Self {
            arena,
            name: CompactString::new(name),
        }
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.arena, self.name)
    }
}

/// Precise entity location including facing.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Location {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f32,
    pub pitch: f32,
}

impl Location {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            x,
            y,
            z,
            yaw: 0.0,
            pitch: 0.0,
        }
    }

    pub fn with_facing(mut self, yaw: f32, pitch: f32) -> Self {
        self.yaw = yaw;
        self.pitch = pitch;
        self
    }

    /// The block grid cell this location falls into.
    pub fn block_pos(&self) -> BlockPos {
        BlockPos::new(
            self.x.floor() as i32,
            self.y.floor() as i32,
            self.z.floor() as i32,
        )
    }
}

/// Velocity vector in blocks per tick.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialized_bounds_are_normalized() {
        let json = r#"{"min":{"x":5,"y":0,"z":-1},"max":{"x":1,"y":3,"z":-4}}"#;
        let bounds: Bounds = serde_json::from_str(json).unwrap();

        assert_eq!(bounds.min(), BlockPos::new(1, 0, -4));
        assert_eq!(bounds.max(), BlockPos::new(5, 3, -1));
        assert_eq!(serde_json::from_str::<Bounds>(&serde_json::to_string(&bounds).unwrap()).unwrap(), bounds);
    }

    #[test]
    fn test_bounds_normalize_corners() {
        let bounds = Bounds::new(BlockPos::new(4, 10, -2), BlockPos::new(0, 8, 3));

        assert_eq!(bounds.min(), BlockPos::new(0, 8, -2));
        assert_eq!(bounds.max(), BlockPos::new(4, 10, 3));
        assert_eq!(bounds.volume(), 5 * 3 * 6);
    }

    #[test]
    fn test_chunk_coords_of_negative_positions() {
        assert_eq!(ChunkCoords::of(BlockPos::new(0, 0, 0)), ChunkCoords::new(0, 0));
        assert_eq!(ChunkCoords::of(BlockPos::new(15, 0, 15)), ChunkCoords::new(0, 0));
        assert_eq!(ChunkCoords::of(BlockPos::new(16, 0, -1)), ChunkCoords::new(1, -1));
        assert_eq!(ChunkCoords::of(BlockPos::new(-17, 0, -16)), ChunkCoords::new(-2, -1));
    }

    #[test]
    fn test_bounds_chunk_partition_covers_volume() {
        let bounds = Bounds::new(BlockPos::new(-3, 0, 10), BlockPos::new(20, 2, 40));
        let chunks = bounds.chunks();

        // x spans chunks -1..=1, z spans 0..=2
        assert_eq!(chunks.len(), 9);

        let covered: u64 = chunks
            .iter()
            .map(|chunk| {
                let (xs, zs) = bounds.column_ranges(*chunk);
                xs.count() as u64 * zs.count() as u64 * bounds.height()
            })
            .sum();
        assert_eq!(covered, bounds.volume());
    }

    #[test]
    fn test_local_world_conversion() {
        let bounds = Bounds::new(BlockPos::new(100, 64, -50), BlockPos::new(104, 64, -46));
        let world = BlockPos::new(102, 64, -48);

        let local = bounds.to_local(world);
        assert_eq!(local, BlockPos::new(2, 0, 2));
        assert_eq!(bounds.to_world(local), world);
    }

    #[test]
    fn test_material_is_normalized() {
        assert_eq!(Material::new(" stone "), Material::new("STONE"));
        assert!(Material::new("air").is_air());
        assert!(BlockData::air().is_air());
    }

    #[test]
    fn test_bounds_intersection() {
        let a = Bounds::new(BlockPos::new(0, 0, 0), BlockPos::new(4, 4, 4));
        let b = Bounds::new(BlockPos::new(4, 4, 4), BlockPos::new(8, 8, 8));
        let c = Bounds::new(BlockPos::new(5, 0, 0), BlockPos::new(8, 4, 4));

        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }
}
