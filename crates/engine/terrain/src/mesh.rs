//! Patch meshes and geomipmap index generation
//!
//! Every patch keeps a full-resolution vertex grid; LOD only changes which
//! vertices the index buffer references. At LOD `l` the interior is a
//! regular grid with step `2^l` that stops one step short of each border.
//! The ring between that inner grid and the patch border is triangulated per
//! edge by zipping two rows together:
//!
//! ```text
//!   outer (patch edge): 0 ---- E ---- 2E ---- ... ---- m
//!                        \   /  \    /  \
//!   inner (one step in):   s ---- 2s ---- ... ---- m-s
//! ```
//!
//! The outer row uses step `E = max(2^lod, 2^neighbor_lod)`, so both
//! patches along an edge reference exactly the same edge vertices. That
//! keeps the seam watertight for any LOD difference.

use crate::bounds::Aabb;
use crate::height_field::HeightField;
use crate::neighbor::Direction;
use crate::patch::NeighborLods;
use glam::Vec3;
use std::sync::Arc;

/// Vertex and index data of one patch, in tile-local space
#[derive(Debug, Clone)]
pub struct PatchMesh {
    /// Edge length of the vertex grid
    pub size: u32,
    /// Row-major vertex positions, `size * size` entries
    pub positions: Vec<Vec3>,
    /// Per-vertex normals, same layout as `positions`
    pub normals: Vec<Vec3>,
    /// Triangle list for the current LOD
    ///
    /// Shared so a render thread can keep drawing the previous buffer while
    /// an update pass installs a new one.
    pub indices: Arc<[u32]>,
}

impl PatchMesh {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Triangles of the current index buffer
    pub fn triangles(&self) -> impl Iterator<Item = [Vec3; 3]> + '_ {
        self.indices.chunks_exact(3).map(|t| {
            [
                self.positions[t[0] as usize],
                self.positions[t[1] as usize],
                self.positions[t[2] as usize],
            ]
        })
    }

    pub fn bound(&self) -> Option<Aabb> {
        let first = *self.positions.first()?;
        Some(
            self.positions
                .iter()
                .fold(Aabb::new(first, first), |b, p| Aabb::new(b.min.min(*p), b.max.max(*p))),
        )
    }

    pub(crate) fn set_indices(&mut self, indices: Vec<u32>) {
        self.indices = indices.into();
    }
}

/// Builds patch meshes from height samples
pub trait MeshGenerator: Send + Sync {
    /// Index buffer for a `size`-wide grid at `lod`, stitched to `neighbors`
    fn build_indices(&self, size: u32, lod: u32, neighbors: &NeighborLods) -> Vec<u32>;

    /// Full mesh with placeholder normals pointing up
    ///
    /// Vertex `(x, z)` sits at `origin + (x * step.x, h * step.y, z * step.z)`.
    fn build_mesh(
        &self,
        heights: &HeightField,
        step_scale: Vec3,
        origin: Vec3,
        lod: u32,
        neighbors: &NeighborLods,
    ) -> PatchMesh {
        let size = heights.size();
        let mut positions = Vec::with_capacity((size * size) as usize);
        for z in 0..size {
            for x in 0..size {
                let h = heights.get(x, z).unwrap_or(0.0);
                positions.push(
                    origin
                        + Vec3::new(
                            x as f32 * step_scale.x,
                            h * step_scale.y,
                            z as f32 * step_scale.z,
                        ),
                );
            }
        }
        PatchMesh {
            size,
            normals: vec![Vec3::Y; positions.len()],
            positions,
            indices: self.build_indices(size, lod, neighbors).into(),
        }
    }
}

/// Geomipmap triangulation with seam stitching
#[derive(Debug, Clone, Copy, Default)]
pub struct GeomipMeshGenerator;

impl GeomipMeshGenerator {
    /// Sample step at `lod`, never wider than the patch
    #[inline]
    fn step(size: u32, lod: u32) -> u32 {
        let span = size - 1;
        1u32.checked_shl(lod).unwrap_or(span).min(span)
    }
}

impl MeshGenerator for GeomipMeshGenerator {
    fn build_indices(&self, size: u32, lod: u32, neighbors: &NeighborLods) -> Vec<u32> {
        let mut out = TriangleList::new(size);
        if size < 2 {
            return out.indices;
        }
        let m = size - 1;
        let s = Self::step(size, lod);

        if 2 * s > m {
            // No room for an inner ring: two triangles over the corners
            out.push((0, 0), (0, m), (m, 0));
            out.push((m, 0), (0, m), (m, m));
            return out.indices;
        }

        let mut z = s;
        while z + s <= m - s {
            let mut x = s;
            while x + s <= m - s {
                out.push((x, z), (x, z + s), (x + s, z));
                out.push((x + s, z), (x, z + s), (x + s, z + s));
                x += s;
            }
            z += s;
        }

        for direction in Direction::ALL {
            let edge = s.max(Self::step(size, neighbors[direction]));
            let outer: Vec<u32> = (0..=m).step_by(edge as usize).collect();
            let inner: Vec<u32> = (s..=m - s).step_by(s as usize).collect();
            let place = |t: u32, is_outer: bool| -> (u32, u32) {
                let depth = if is_outer { 0 } else { s };
                match direction {
                    Direction::Top => (t, depth),
                    Direction::Bottom => (t, m - depth),
                    Direction::Left => (depth, t),
                    Direction::Right => (m - depth, t),
                }
            };

            let (mut i, mut j) = (0, 0);
            while i + 1 < outer.len() || j + 1 < inner.len() {
                let advance_outer = if i + 1 >= outer.len() {
                    false
                } else if j + 1 >= inner.len() {
                    true
                } else {
                    outer[i + 1] <= inner[j + 1]
                };
                if advance_outer {
                    out.push(
                        place(outer[i], true),
                        place(outer[i + 1], true),
                        place(inner[j], false),
                    );
                    i += 1;
                } else {
                    out.push(
                        place(outer[i], true),
                        place(inner[j], false),
                        place(inner[j + 1], false),
                    );
                    j += 1;
                }
            }
        }
        out.indices
    }
}

/// Collects grid triangles, facing them up and dropping degenerate ones
struct TriangleList {
    size: u32,
    indices: Vec<u32>,
}

impl TriangleList {
    fn new(size: u32) -> Self {
        Self {
            size,
            indices: Vec::new(),
        }
    }

    fn push(&mut self, a: (u32, u32), b: (u32, u32), c: (u32, u32)) {
        // y component of (b - a) x (c - a) over the (x, z) grid
        let cross = (b.1 as i64 - a.1 as i64) * (c.0 as i64 - a.0 as i64)
            - (b.0 as i64 - a.0 as i64) * (c.1 as i64 - a.1 as i64);
        let index = |p: (u32, u32)| p.1 * self.size + p.0;
        match cross.signum() {
            1 => self.indices.extend([index(a), index(b), index(c)]),
            -1 => self.indices.extend([index(a), index(c), index(b)]),
            _ => {}
        }
    }
}
