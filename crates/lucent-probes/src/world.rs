//! The block world that probes are traced against.

use lucent_core::glam::{const_ivec3, IVec3, Vec3A};
use lucent_core::ilattice::prelude::Extent;
use lucent_core::static_assertions::const_assert_eq;
use lucent_core::SmallKeyHashMap;
use ndshape::{ConstPow2Shape3i32, ConstShape};
use parking_lot::RwLock;
use smallvec::{smallvec, SmallVec};
use std::sync::Arc;

/// The collision geometry of a block, with boxes in block-local coordinates (`[0, 1]³` for a full cube).
#[derive(Clone, Debug, PartialEq)]
pub struct BlockShape {
    pub block_id: u16,
    /// Empty for blocks that rays pass through, like plants.
    pub collision_boxes: SmallVec<[Extent<Vec3A>; 2]>,
}

impl BlockShape {
    pub fn full_cube(block_id: u16) -> Self {
        Self {
            block_id,
            collision_boxes: smallvec![Extent::from_min_and_shape(Vec3A::ZERO, Vec3A::ONE)],
        }
    }

    /// The lower half of a cube.
    pub fn slab(block_id: u16) -> Self {
        Self {
            block_id,
            collision_boxes: smallvec![Extent::from_min_and_shape(
                Vec3A::ZERO,
                Vec3A::new(1.0, 0.5, 1.0)
            )],
        }
    }

    pub fn pass_through(block_id: u16) -> Self {
        Self {
            block_id,
            collision_boxes: SmallVec::new(),
        }
    }
}

/// Light in a voxel, each channel in `[0, 1]`. `sky` is how much of the open sky reaches the voxel.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LightRgbs {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub sky: f32,
}

impl LightRgbs {
    pub const fn new(r: f32, g: f32, b: f32, sky: f32) -> Self {
        Self { r, g, b, sky }
    }

    pub const fn sky(sky: f32) -> Self {
        Self::new(0.0, 0.0, 0.0, sky)
    }
}

/// Read access to the voxel world. Implementations are called concurrently from trace workers and must never block on
/// the main thread.
pub trait BlockWorld: Send + Sync {
    fn is_chunk_loaded(&self, voxel: IVec3) -> bool;

    /// The solid-most block occupying `voxel`, or `None` for air.
    fn most_solid_block(&self, voxel: IVec3) -> Option<BlockShape>;

    /// `None` when no light data is available.
    fn light_rgbs(&self, voxel: IVec3) -> Option<LightRgbs>;
}

impl<W: BlockWorld + ?Sized> BlockWorld for Arc<W> {
    fn is_chunk_loaded(&self, voxel: IVec3) -> bool {
        (**self).is_chunk_loaded(voxel)
    }

    fn most_solid_block(&self, voxel: IVec3) -> Option<BlockShape> {
        (**self).most_solid_block(voxel)
    }

    fn light_rgbs(&self, voxel: IVec3) -> Option<LightRgbs> {
        (**self).light_rgbs(voxel)
    }
}

/// A [`BlockWorld`] made of closures, for procedural worlds and tests.
pub struct FnWorld<L, B, G> {
    loaded: L,
    block: B,
    light: G,
}

impl<L, B, G> FnWorld<L, B, G>
where
    L: Fn(IVec3) -> bool + Send + Sync,
    B: Fn(IVec3) -> Option<BlockShape> + Send + Sync,
    G: Fn(IVec3) -> Option<LightRgbs> + Send + Sync,
{
    pub fn new(loaded: L, block: B, light: G) -> Self {
        Self {
            loaded,
            block,
            light,
        }
    }
}

impl<L, B, G> BlockWorld for FnWorld<L, B, G>
where
    L: Fn(IVec3) -> bool + Send + Sync,
    B: Fn(IVec3) -> Option<BlockShape> + Send + Sync,
    G: Fn(IVec3) -> Option<LightRgbs> + Send + Sync,
{
    fn is_chunk_loaded(&self, voxel: IVec3) -> bool {
        (self.loaded)(voxel)
    }

    fn most_solid_block(&self, voxel: IVec3) -> Option<BlockShape> {
        (self.block)(voxel)
    }

    fn light_rgbs(&self, voxel: IVec3) -> Option<LightRgbs> {
        (self.light)(voxel)
    }
}

pub type ChunkShape = ConstPow2Shape3i32<4, 4, 4>;
const_assert_eq!(ChunkShape::SIZE, 16 * 16 * 16);
pub const CHUNK_SIZE: usize = ChunkShape::SIZE as usize;
pub const CHUNK_SHAPE_LOG2_IVEC3: IVec3 = const_ivec3!([4; 3]);
const CHUNK_MASK: i32 = 15;

/// Block ID 0 is always air.
pub const AIR: u16 = 0;

/// Chunk coordinates of the chunk containing `voxel`.
pub fn voxel_chunk_key(voxel: IVec3) -> [i32; 3] {
    (voxel >> CHUNK_SHAPE_LOG2_IVEC3).to_array()
}

fn voxel_offset(voxel: IVec3) -> usize {
    let offset = voxel & IVec3::splat(CHUNK_MASK);
    ChunkShape::linearize(offset.to_array()) as usize
}

#[derive(Clone)]
struct BlockChunk {
    blocks: Box<[u16; CHUNK_SIZE]>,
    light: Box<[LightRgbs; CHUNK_SIZE]>,
}

impl BlockChunk {
    fn new(ambient: LightRgbs) -> Self {
        Self {
            blocks: Box::new([AIR; CHUNK_SIZE]),
            light: Box::new([ambient; CHUNK_SIZE]),
        }
    }
}

/// An in-memory world of 16³ chunks. Only chunks that were inserted count as loaded.
///
/// Readers take a shared lock per query, so traces can run concurrently with each other; edits take the exclusive lock
/// briefly.
pub struct SparseBlockWorld {
    shapes: SmallKeyHashMap<u16, BlockShape>,
    chunks: RwLock<SmallKeyHashMap<[i32; 3], BlockChunk>>,
    ambient: LightRgbs,
}

impl SparseBlockWorld {
    /// `ambient` is the light of every voxel in a newly inserted chunk.
    pub fn new(ambient: LightRgbs) -> Self {
        Self {
            shapes: SmallKeyHashMap::default(),
            chunks: RwLock::new(SmallKeyHashMap::default()),
            ambient,
        }
    }

    /// Registers the shape of a block ID. Unregistered non-air IDs are full cubes.
    pub fn register_shape(&mut self, shape: BlockShape) {
        self.shapes.insert(shape.block_id, shape);
    }

    pub fn insert_empty_chunk(&self, chunk_key: [i32; 3]) {
        self.chunks
            .write()
            .entry(chunk_key)
            .or_insert_with(|| BlockChunk::new(self.ambient));
    }

    pub fn remove_chunk(&self, chunk_key: [i32; 3]) -> bool {
        self.chunks.write().remove(&chunk_key).is_some()
    }

    pub fn num_chunks(&self) -> usize {
        self.chunks.read().len()
    }

    /// Loads the chunk if necessary.
    pub fn set_block(&self, voxel: IVec3, block_id: u16) {
        let mut chunks = self.chunks.write();
        let chunk = chunks
            .entry(voxel_chunk_key(voxel))
            .or_insert_with(|| BlockChunk::new(self.ambient));
        chunk.blocks[voxel_offset(voxel)] = block_id;
    }

    /// Loads the chunk if necessary.
    pub fn set_light(&self, voxel: IVec3, light: LightRgbs) {
        let mut chunks = self.chunks.write();
        let chunk = chunks
            .entry(voxel_chunk_key(voxel))
            .or_insert_with(|| BlockChunk::new(self.ambient));
        chunk.light[voxel_offset(voxel)] = light;
    }

    /// Sets every voxel in `extent`, loading chunks as needed.
    pub fn fill_extent(&self, extent: Extent<IVec3>, block_id: u16) {
        let mut chunks = self.chunks.write();
        for p in extent.iter3() {
            let chunk = chunks
                .entry(voxel_chunk_key(p))
                .or_insert_with(|| BlockChunk::new(self.ambient));
            chunk.blocks[voxel_offset(p)] = block_id;
        }
    }

    pub fn block_id(&self, voxel: IVec3) -> Option<u16> {
        self.chunks
            .read()
            .get(&voxel_chunk_key(voxel))
            .map(|c| c.blocks[voxel_offset(voxel)])
    }

    fn shape_of(&self, block_id: u16) -> BlockShape {
        self.shapes
            .get(&block_id)
            .cloned()
            .unwrap_or_else(|| BlockShape::full_cube(block_id))
    }
}

impl BlockWorld for SparseBlockWorld {
    fn is_chunk_loaded(&self, voxel: IVec3) -> bool {
        self.chunks.read().contains_key(&voxel_chunk_key(voxel))
    }

    fn most_solid_block(&self, voxel: IVec3) -> Option<BlockShape> {
        match self.block_id(voxel)? {
            AIR => None,
            id => Some(self.shape_of(id)),
        }
    }

    fn light_rgbs(&self, voxel: IVec3) -> Option<LightRgbs> {
        self.chunks
            .read()
            .get(&voxel_chunk_key(voxel))
            .map(|c| c.light[voxel_offset(voxel)])
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn negative_voxels_land_in_negative_chunks() {
        assert_eq!(voxel_chunk_key(IVec3::new(-1, 0, 15)), [-1, 0, 0]);
        assert_eq!(voxel_chunk_key(IVec3::new(-16, -17, 16)), [-1, -2, 1]);
        assert_eq!(voxel_offset(IVec3::new(-1, 0, 0)), 15);
    }

    #[test]
    fn sparse_world_reports_loaded_chunks_and_blocks() {
        let mut world = SparseBlockWorld::new(LightRgbs::sky(1.0));
        world.register_shape(BlockShape::pass_through(7));

        assert!(!world.is_chunk_loaded(IVec3::ZERO));
        assert_eq!(world.most_solid_block(IVec3::ZERO), None);
        assert_eq!(world.light_rgbs(IVec3::ZERO), None);

        world.set_block(IVec3::new(-3, 2, 5), 1);
        world.set_block(IVec3::new(-2, 2, 5), 7);
        assert!(world.is_chunk_loaded(IVec3::new(-16, 0, 0)));
        assert!(!world.is_chunk_loaded(IVec3::new(0, 0, 0)));

        assert_eq!(
            world.most_solid_block(IVec3::new(-3, 2, 5)),
            Some(BlockShape::full_cube(1))
        );
        assert!(world
            .most_solid_block(IVec3::new(-2, 2, 5))
            .unwrap()
            .collision_boxes
            .is_empty());
        assert_eq!(world.most_solid_block(IVec3::new(-4, 2, 5)), None);
        assert_eq!(
            world.light_rgbs(IVec3::new(-4, 2, 5)),
            Some(LightRgbs::sky(1.0))
        );

        assert!(world.remove_chunk([-1, 0, 0]));
        assert_eq!(world.num_chunks(), 0);
    }

    #[test]
    fn fill_extent_spans_chunks() {
        let world = SparseBlockWorld::new(LightRgbs::default());
        world.fill_extent(
            Extent::from_min_and_shape(IVec3::new(-20, -1, -20), IVec3::new(40, 1, 40)),
            3,
        );
        assert_eq!(world.num_chunks(), 16);
        assert_eq!(world.block_id(IVec3::new(19, -1, -20)), Some(3));
        assert_eq!(world.block_id(IVec3::new(19, 0, -20)), Some(AIR));
    }
}
