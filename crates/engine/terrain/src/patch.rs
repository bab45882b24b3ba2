//! Leaf patches: the renderable cells of the quadtree

use crate::bounds::Aabb;
use crate::error::Result;
use crate::height_field::{EditMode, HeightField};
use crate::mesh::{MeshGenerator, PatchMesh};
use crate::neighbor::Direction;
use crate::tree::NodeId;
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

/// Last known LOD of each adjoining patch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NeighborLods {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl NeighborLods {
    pub fn splat(lod: u32) -> Self {
        Self {
            left: lod,
            top: lod,
            right: lod,
            bottom: lod,
        }
    }
}

impl Index<Direction> for NeighborLods {
    type Output = u32;

    fn index(&self, direction: Direction) -> &u32 {
        match direction {
            Direction::Left => &self.left,
            Direction::Top => &self.top,
            Direction::Right => &self.right,
            Direction::Bottom => &self.bottom,
        }
    }
}

impl IndexMut<Direction> for NeighborLods {
    fn index_mut(&mut self, direction: Direction) -> &mut u32 {
        match direction {
            Direction::Left => &mut self.left,
            Direction::Top => &mut self.top,
            Direction::Right => &mut self.right,
            Direction::Bottom => &mut self.bottom,
        }
    }
}

/// Coarsest LOD a patch of edge length `size` supports
///
/// `max(1, floor(log2(size - 1)) - 1)`
pub fn max_lod_for(size: u32) -> u32 {
    let log = (size.max(2) - 1).ilog2();
    log.saturating_sub(1).max(1)
}

/// Level-of-detail state of one patch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LodState {
    /// Current LOD, 0 = full detail
    pub lod: u32,
    pub previous_lod: u32,
    pub max_lod: u32,
    pub neighbors: NeighborLods,
}

impl LodState {
    pub fn new(size: u32) -> Self {
        Self {
            lod: 0,
            previous_lod: 0,
            max_lod: max_lod_for(size),
            neighbors: NeighborLods::default(),
        }
    }
}

/// Cached neighbor lookup; `None` until searched
pub(crate) type NeighborCache = Option<[Option<NodeId>; 4]>;

/// Quadtree leaf holding heights, mesh and LOD state
#[derive(Debug)]
pub struct LeafPatch {
    heights: HeightField,
    mesh: PatchMesh,
    pub(crate) lod: LodState,
    pub(crate) neighbors: NeighborCache,
    /// Tile-local position of sample `(0, 0)` at height zero
    local_origin: Vec3,
    step_scale: Vec3,
    local_bound: Aabb,
}

impl LeafPatch {
    pub(crate) fn new(
        heights: HeightField,
        local_origin: Vec3,
        step_scale: Vec3,
        generator: &dyn MeshGenerator,
    ) -> Self {
        let lod = LodState::new(heights.size());
        let mesh = generator.build_mesh(&heights, step_scale, local_origin, lod.lod, &lod.neighbors);
        let local_bound = compute_bound(&heights, local_origin, step_scale);
        Self {
            heights,
            mesh,
            lod,
            neighbors: None,
            local_origin,
            step_scale,
            local_bound,
        }
    }

    #[inline]
    pub fn size(&self) -> u32 {
        self.heights.size()
    }

    pub fn heights(&self) -> &HeightField {
        &self.heights
    }

    pub fn mesh(&self) -> &PatchMesh {
        &self.mesh
    }

    pub(crate) fn mesh_mut(&mut self) -> &mut PatchMesh {
        &mut self.mesh
    }

    pub fn lod_state(&self) -> &LodState {
        &self.lod
    }

    #[inline]
    pub fn lod(&self) -> u32 {
        self.lod.lod
    }

    pub fn local_origin(&self) -> Vec3 {
        self.local_origin
    }

    pub fn step_scale(&self) -> Vec3 {
        self.step_scale
    }

    /// Tile-local bound of the patch
    pub fn local_bound(&self) -> Aabb {
        self.local_bound
    }

    /// Whether the neighbor lookup has been cached
    pub fn neighbors_searched(&self) -> bool {
        self.neighbors.is_some()
    }

    #[inline]
    pub(crate) fn vertex_index(&self, x: u32, z: u32) -> usize {
        (z * self.size() + x) as usize
    }

    /// Mesh normal at patch sample `(x, z)`
    pub fn normal(&self, x: u32, z: u32) -> Option<Vec3> {
        if x >= self.size() || z >= self.size() {
            return None;
        }
        self.mesh.normals.get(self.vertex_index(x, z)).copied()
    }

    /// Edit one sample and keep the vertex and bound in step
    pub(crate) fn write_height(&mut self, x: u32, z: u32, value: f32, mode: EditMode) -> Result<f32> {
        let height = self.heights.apply(x, z, value, mode)?;
        let i = self.vertex_index(x, z);
        if let Some(position) = self.mesh.positions.get_mut(i) {
            position.y = height * self.step_scale.y;
        }
        self.local_bound = compute_bound(&self.heights, self.local_origin, self.step_scale);
        Ok(height)
    }
}

fn compute_bound(heights: &HeightField, origin: Vec3, step: Vec3) -> Aabb {
    let (lo, hi) = heights.min_max();
    let span = (heights.size() - 1) as f32;
    let a = Vec3::new(origin.x, lo * step.y, origin.z);
    let b = Vec3::new(origin.x + span * step.x, hi * step.y, origin.z + span * step.z);
    Aabb::new(a.min(b), a.max(b))
}
