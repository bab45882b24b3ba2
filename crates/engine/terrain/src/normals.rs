//! Vertex normals and their dirty-region tracking
//!
//! Edits only grow a per-tile dirty box. The flush then recomputes every
//! leaf the box touches in two steps: interior normals from the leaf's own
//! samples, then border vertices from a stencil that reaches into the
//! surrounding leaves. Border results are written into every leaf sharing
//! the vertex, so lighting is continuous across patch and tile seams.

use crate::bounds::Aabb;
use crate::error::{Result, TerrainError};
use crate::neighbor::Direction;
use crate::patch::LeafPatch;
use crate::terrain::Terrain;
use crate::tile::TileId;
use crate::tree::NodeId;
use glam::{Vec2, Vec3};
use tracing::{debug, trace};

/// Normal at a vertex from its four axis neighbors
///
/// `arms` holds the neighbor heights indexed by [`Direction::index`]; a
/// missing arm drops the two faces it belongs to. Heights are in sample
/// units and scaled by `spacing.y`.
pub fn average_normal(spacing: Vec3, center: f32, arms: [Option<f32>; 4]) -> Vec3 {
    let root = Vec3::new(0.0, center * spacing.y, 0.0);
    let arm = |direction: Direction| {
        arms[direction.index()].map(|h| {
            let step = direction.grid_offset();
            Vec3::new(
                step.x as f32 * spacing.x,
                h * spacing.y,
                step.y as f32 * spacing.z,
            )
        })
    };
    let (left, top, right, bottom) = (
        arm(Direction::Left),
        arm(Direction::Top),
        arm(Direction::Right),
        arm(Direction::Bottom),
    );

    let sum: Vec3 = [(top, left), (left, bottom), (bottom, right), (right, top)]
        .into_iter()
        .filter_map(|(a, b)| Some((a? - root).cross(b? - root).normalize_or_zero()))
        .sum();
    sum.try_normalize().unwrap_or(Vec3::Y)
}

/// Ring offset of a stencil coordinate that may step past the patch
#[inline]
fn ring_cell(v: i64, m: i64) -> i32 {
    if v < 0 {
        -1
    } else if v > m {
        1
    } else {
        0
    }
}

impl Terrain {
    /// Grow a tile's dirty region by one sample around a world point
    pub fn mark_normals_dirty(&mut self, tile: TileId, world: Vec2) -> Result<()> {
        let t = self
            .tiles
            .get_mut(&tile)
            .ok_or(TerrainError::UnknownTile(tile))?;
        let spacing = t.sample_spacing().abs();
        let region = Aabb::new(
            Vec3::new(world.x - spacing.x, f32::MIN, world.y - spacing.z),
            Vec3::new(world.x + spacing.x, f32::MAX, world.y + spacing.z),
        );
        t.dirty = Some(match t.dirty {
            Some(dirty) => dirty.union(&region),
            None => region,
        });
        Ok(())
    }

    /// Mark a whole tile for normal recomputation
    pub fn invalidate_all_normals(&mut self, tile: TileId) {
        if let Some(t) = self.tiles.get_mut(&tile) {
            t.dirty = Some(t.world_extent());
        }
    }

    /// Recompute normals in every tile's dirty region
    ///
    /// Returns the number of leaves recomputed.
    pub fn flush_normals(&mut self) -> usize {
        let ids: Vec<TileId> = self.tiles.keys().copied().collect();
        ids.into_iter().map(|id| self.flush_tile_normals(id)).sum()
    }

    fn flush_tile_normals(&mut self, id: TileId) -> usize {
        let Some(tile) = self.tiles.get_mut(&id) else {
            return 0;
        };
        if tile.transform.scale != tile.last_scale {
            debug!(
                "Tile {:?} rescaled from {} to {}, rebuilding all normals",
                id, tile.last_scale, tile.transform.scale
            );
            tile.last_scale = tile.transform.scale;
            tile.dirty = Some(tile.world_extent());
        }
        let Some(region) = tile.dirty.take() else {
            return 0;
        };
        let root = tile.root;
        let spacing = tile.sample_spacing();

        let mut hits = Vec::new();
        self.collect_leaves_in(root, &region, &mut hits);
        for &leaf in &hits {
            self.recompute_interior_normals(leaf, spacing);
        }
        for &leaf in &hits {
            self.recompute_edge_normals(leaf, spacing);
        }
        trace!("Tile {:?}: recomputed normals of {} leaves", id, hits.len());
        hits.len()
    }

    fn collect_leaves_in(&self, id: NodeId, region: &Aabb, out: &mut Vec<NodeId>) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        if !self.world_bound(id).is_some_and(|b| b.intersects(region)) {
            return;
        }
        match node.children() {
            Some(children) => {
                for child in children {
                    self.collect_leaves_in(*child, region, out);
                }
            }
            None => out.push(id),
        }
    }

    /// Normals of every vertex from the leaf's own samples
    fn recompute_interior_normals(&mut self, leaf: NodeId, spacing: Vec3) {
        let Some(patch) = self.leaf(leaf) else {
            return;
        };
        let heights = patch.heights();
        let size = heights.size() as i64;
        let mut normals = Vec::with_capacity((size * size) as usize);
        for z in 0..size {
            for x in 0..size {
                let center = heights.get_signed(x, z).unwrap_or(0.0);
                let arms = Direction::ALL.map(|d| {
                    let step = d.grid_offset();
                    heights.get_signed(x + step.x as i64, z + step.y as i64)
                });
                normals.push(average_normal(spacing, center, arms));
            }
        }
        if let Some(patch) = self.leaf_mut(leaf) {
            patch.mesh_mut().normals = normals;
        }
    }

    /// Border vertices from the neighbor ring, written to every sharer
    fn recompute_edge_normals(&mut self, leaf: NodeId, spacing: Vec3) {
        let ring = self.neighbor_ring(leaf);
        let Some(size) = self.leaf(leaf).map(LeafPatch::size) else {
            return;
        };
        let m = (size - 1) as i64;
        let height = |x: i64, z: i64| -> Option<f32> {
            let (dx, dz) = (ring_cell(x, m), ring_cell(z, m));
            let id = ring.at(dx, dz)?;
            self.leaf(id)?
                .heights()
                .get_signed(x - dx as i64 * m, z - dz as i64 * m)
        };

        let mut writes = Vec::new();
        for (x, z) in (0..=m).flat_map(|i| [(i, 0), (i, m), (0, i), (m, i)]) {
            let Some(center) = height(x, z) else {
                continue;
            };
            let arms = Direction::ALL.map(|d| {
                let step = d.grid_offset();
                height(x + step.x as i64, z + step.y as i64)
            });
            let normal = average_normal(spacing, center, arms);
            for (dx, dz, id) in ring.iter() {
                let (lx, lz) = (x - dx as i64 * m, z - dz as i64 * m);
                if (0..=m).contains(&lx) && (0..=m).contains(&lz) {
                    writes.push((id, lx as u32, lz as u32, normal));
                }
            }
        }

        for (id, x, z, normal) in writes {
            if let Some(patch) = self.leaf_mut(id) {
                let i = patch.vertex_index(x, z);
                if let Some(slot) = patch.mesh_mut().normals.get_mut(i) {
                    *slot = normal;
                }
            }
        }
    }

    /// Mesh normal at a tile sample
    pub fn normal_at_sample(&self, tile: TileId, x: u32, z: u32) -> Option<Vec3> {
        self.locate(tile, x, z)
            .into_iter()
            .find_map(|(leaf, col, row)| self.leaf(leaf)?.normal(col, row))
    }

    /// Average of the four vertex normals around a world point
    pub fn normal_at(&self, world: Vec2) -> Option<Vec3> {
        let tile = self.tiles_containing(world).into_iter().next()?;
        let t = self.tiles.get(&tile)?;
        let sample = t.world_to_sample(world);
        let x0 = (sample.x.max(0.0).floor() as u32).min(t.total_size - 2);
        let z0 = (sample.y.max(0.0).floor() as u32).min(t.total_size - 2);
        let sum: Vec3 = [(x0, z0), (x0 + 1, z0), (x0, z0 + 1), (x0 + 1, z0 + 1)]
            .into_iter()
            .filter_map(|(x, z)| self.normal_at_sample(tile, x, z))
            .sum();
        sum.try_normalize()
    }
}
