//! Ray and volume queries against the current patch meshes
//!
//! Queries run in tile-local space: the ray or box is mapped through the
//! inverse tile transform, the quadtree is pruned by node bounds, and the
//! remaining leaves are handed to the [`CollisionProbe`]. Hits are reported
//! in world space.

use crate::bounds::{Aabb, Ray};
use crate::mesh::PatchMesh;
use crate::terrain::Terrain;
use crate::tile::{TileId, Transform};
use crate::tree::NodeId;
use glam::Vec3;

const EPSILON: f32 = 1e-7;

/// Closest ray hit on the terrain surface
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// Distance along the ray, in world units
    pub distance: f32,
    pub point: Vec3,
    /// Up-facing normal of the triangle hit
    pub normal: Vec3,
    pub tile: TileId,
    pub patch: NodeId,
    /// Triangle hit, world space
    pub triangle: [Vec3; 3],
}

/// Narrow-phase queries against one patch mesh
///
/// Inputs are in the mesh's tile-local space. The ray direction is not
/// necessarily normalized; distances are in units of its length.
pub trait CollisionProbe: Send + Sync {
    /// Nearest hit within `ray.limit`, with the triangle hit
    fn probe_ray(&self, mesh: &PatchMesh, ray: &Ray) -> Option<(f32, [Vec3; 3])>;

    /// Triangles that may touch `volume`
    fn probe_volume(&self, mesh: &PatchMesh, volume: &Aabb) -> Vec<[Vec3; 3]>;
}

/// Brute-force probe over the triangles of the current index buffer
#[derive(Debug, Clone, Copy, Default)]
pub struct TriangleProbe;

impl CollisionProbe for TriangleProbe {
    fn probe_ray(&self, mesh: &PatchMesh, ray: &Ray) -> Option<(f32, [Vec3; 3])> {
        mesh.triangles()
            .filter_map(|tri| ray_triangle(ray, &tri).map(|t| (t, tri)))
            .filter(|(t, _)| *t <= ray.limit)
            .min_by(|a, b| a.0.total_cmp(&b.0))
    }

    fn probe_volume(&self, mesh: &PatchMesh, volume: &Aabb) -> Vec<[Vec3; 3]> {
        mesh.triangles()
            .filter(|[a, b, c]| Aabb::new(a.min(*b).min(*c), a.max(*b).max(*c)).intersects(volume))
            .collect()
    }
}

/// Möller–Trumbore ray/triangle intersection, double-sided
pub fn ray_triangle(ray: &Ray, [a, b, c]: &[Vec3; 3]) -> Option<f32> {
    let e1 = *b - *a;
    let e2 = *c - *a;
    let p = ray.direction.cross(e2);
    let det = e1.dot(p);
    if det.abs() < EPSILON {
        return None;
    }
    let inv_det = 1.0 / det;
    let s = ray.origin - *a;
    let u = s.dot(p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(e1);
    let v = ray.direction.dot(q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = e2.dot(q) * inv_det;
    (t >= 0.0).then_some(t)
}

fn to_local_ray(ray: &Ray, transform: &Transform) -> Ray {
    // Same parameter t on both sides, so distances stay in world units
    Ray {
        origin: transform.inverse_apply(ray.origin),
        direction: ray.direction / transform.scale,
        limit: ray.limit,
    }
}

fn to_local_box(volume: &Aabb, transform: &Transform) -> Aabb {
    let a = transform.inverse_apply(volume.min);
    let b = transform.inverse_apply(volume.max);
    Aabb::new(a.min(b), a.max(b))
}

impl Terrain {
    /// Nearest hit of a world ray on any tile
    pub fn collide_ray(&self, ray: &Ray) -> Option<RayHit> {
        let mut best: Option<RayHit> = None;
        for tile in self.tiles.values() {
            let local = to_local_ray(ray, &tile.transform);
            let mut stack = vec![tile.root];
            while let Some(id) = stack.pop() {
                let Some(node) = self.nodes.get(id) else {
                    continue;
                };
                let Some((near, _)) = self.local_bound(id).and_then(|b| b.ray_interval(&local)) else {
                    continue;
                };
                if best.is_some_and(|hit| near > hit.distance) {
                    continue;
                }
                if let Some(children) = node.children() {
                    stack.extend(children.iter().copied());
                    continue;
                }
                let Some(leaf) = node.as_leaf() else {
                    continue;
                };
                let Some((t, tri)) = self.collision_probe.probe_ray(leaf.mesh(), &local) else {
                    continue;
                };
                if best.is_some_and(|hit| hit.distance <= t) {
                    continue;
                }
                let triangle = tri.map(|p| tile.transform.apply(p));
                let normal = (triangle[1] - triangle[0])
                    .cross(triangle[2] - triangle[0])
                    .normalize_or_zero();
                best = Some(RayHit {
                    distance: t,
                    point: ray.at(t),
                    normal: if normal.y < 0.0 { -normal } else { normal },
                    tile: tile.id,
                    patch: id,
                    triangle,
                });
            }
        }
        best
    }

    /// World-space triangles of every patch that may touch a world box
    pub fn collide_volume(&self, volume: &Aabb) -> Vec<(NodeId, [Vec3; 3])> {
        let mut out = Vec::new();
        for tile in self.tiles.values() {
            let local = to_local_box(volume, &tile.transform);
            let mut stack = vec![tile.root];
            while let Some(id) = stack.pop() {
                let Some(node) = self.nodes.get(id) else {
                    continue;
                };
                if !self.local_bound(id).is_some_and(|b| b.intersects(&local)) {
                    continue;
                }
                match node.children() {
                    Some(children) => stack.extend(children.iter().copied()),
                    None => {
                        if let Some(leaf) = node.as_leaf() {
                            out.extend(
                                self.collision_probe
                                    .probe_volume(leaf.mesh(), &local)
                                    .into_iter()
                                    .map(|tri| (id, tri.map(|p| tile.transform.apply(p)))),
                            );
                        }
                    }
                }
            }
        }
        out
    }
}
