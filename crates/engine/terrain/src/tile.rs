//! Terrain tiles: independently rooted quadtrees sharing one arena
//!
//! Each tile owns its world transform and the per-root state the normal
//! pass needs (dirty region and the scale normals were last built at).
//! Tiles adjoin each other only through a [`NeighborFinder`](crate::NeighborFinder),
//! for which [`TileGrid`] is the stock implementation.

use crate::bounds::Aabb;
use crate::neighbor::{Direction, NeighborFinder};
use crate::tree::NodeId;
use glam::{IVec2, Vec2, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identifies a tile within a [`Terrain`](crate::Terrain)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileId(pub u32);

/// World placement of a tile: translation plus per-axis scale
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub translation: Vec3,
    pub scale: Vec3,
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        translation: Vec3::ZERO,
        scale: Vec3::ONE,
    };

    pub fn new(translation: Vec3, scale: Vec3) -> Self {
        Self { translation, scale }
    }

    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            scale: Vec3::ONE,
        }
    }

    /// Local to world
    #[inline]
    pub fn apply(&self, local: Vec3) -> Vec3 {
        self.translation + local * self.scale
    }

    /// World to local
    #[inline]
    pub fn inverse_apply(&self, world: Vec3) -> Vec3 {
        (world - self.translation) / self.scale
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Root record of one tile
#[derive(Debug, Clone)]
pub struct Tile {
    pub(crate) id: TileId,
    pub(crate) root: NodeId,
    pub(crate) total_size: u32,
    pub(crate) step_scale: Vec3,
    pub(crate) transform: Transform,
    /// Scale the current normals were computed with
    pub(crate) last_scale: Vec3,
    /// World area whose normals are stale; `None` when clean
    pub(crate) dirty: Option<Aabb>,
}

impl Tile {
    pub fn id(&self) -> TileId {
        self.id
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn total_size(&self) -> u32 {
        self.total_size
    }

    pub fn step_scale(&self) -> Vec3 {
        self.step_scale
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn dirty_region(&self) -> Option<&Aabb> {
        self.dirty.as_ref()
    }

    /// Half the sample span, the sample index at the tile centre
    #[inline]
    pub(crate) fn half_span(&self) -> f32 {
        ((self.total_size - 1) / 2) as f32
    }

    /// World distance between adjacent samples on each axis
    #[inline]
    pub fn sample_spacing(&self) -> Vec3 {
        self.step_scale * self.transform.scale
    }

    /// Tile-local position of sample `(x, z)` at height `h`
    #[inline]
    pub(crate) fn local_position(&self, x: f32, z: f32, h: f32) -> Vec3 {
        let half = self.half_span();
        Vec3::new(
            (x - half) * self.step_scale.x,
            h * self.step_scale.y,
            (z - half) * self.step_scale.z,
        )
    }

    /// Fractional sample coordinate of a world position
    pub fn world_to_sample(&self, world: Vec2) -> Vec2 {
        let local = self
            .transform
            .inverse_apply(Vec3::new(world.x, 0.0, world.y));
        let half = self.half_span();
        Vec2::new(
            local.x / self.step_scale.x + half,
            local.z / self.step_scale.z + half,
        )
    }

    /// Nearest sample to a world position, if it lies in `[0, total_size)`
    pub fn nearest_sample(&self, world: Vec2) -> Option<(u32, u32)> {
        let sample = self.world_to_sample(world).round();
        let size = self.total_size as f32;
        let inside = |v: f32| v >= 0.0 && v < size;
        if inside(sample.x) && inside(sample.y) {
            Some((sample.x as u32, sample.y as u32))
        } else {
            None
        }
    }

    /// World xz position of sample `(x, z)`
    pub fn sample_to_world(&self, x: u32, z: u32) -> Vec2 {
        let world = self
            .transform
            .apply(self.local_position(x as f32, z as f32, 0.0));
        Vec2::new(world.x, world.z)
    }

    /// World box covering the whole tile with unbounded height
    pub fn world_extent(&self) -> Aabb {
        let max = (self.total_size - 1) as f32;
        let a = self.transform.apply(self.local_position(0.0, 0.0, 0.0));
        let b = self.transform.apply(self.local_position(max, max, 0.0));
        Aabb::new(
            Vec3::new(a.x.min(b.x), f32::MIN, a.z.min(b.z)),
            Vec3::new(a.x.max(b.x), f32::MAX, a.z.max(b.z)),
        )
    }
}

/// Regular grid of tiles, usable as the terrain's neighbor finder
///
/// Grid x grows to the right, grid y grows towards the bottom (+z).
#[derive(Debug, Clone, Default)]
pub struct TileGrid {
    by_coord: HashMap<IVec2, TileId>,
    by_tile: HashMap<TileId, IVec2>,
}

impl TileGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, coord: IVec2, tile: TileId) {
        if let Some(old) = self.by_coord.insert(coord, tile) {
            self.by_tile.remove(&old);
        }
        self.by_tile.insert(tile, coord);
    }

    pub fn remove(&mut self, tile: TileId) -> Option<IVec2> {
        let coord = self.by_tile.remove(&tile)?;
        self.by_coord.remove(&coord);
        Some(coord)
    }

    pub fn coord_of(&self, tile: TileId) -> Option<IVec2> {
        self.by_tile.get(&tile).copied()
    }

    pub fn tile_at(&self, coord: IVec2) -> Option<TileId> {
        self.by_coord.get(&coord).copied()
    }

    /// Translation placing a tile at `coord` so its edge samples coincide
    /// with those of its grid neighbors
    pub fn translation_for(coord: IVec2, tile_extent: Vec2) -> Vec3 {
        Vec3::new(
            coord.x as f32 * tile_extent.x,
            0.0,
            coord.y as f32 * tile_extent.y,
        )
    }
}

impl NeighborFinder for TileGrid {
    fn neighbor_tile(&self, tile: TileId, direction: Direction) -> Option<TileId> {
        let coord = self.coord_of(tile)?;
        self.tile_at(coord + direction.grid_offset())
    }
}
