//! Level-of-detail negotiation and edge fixing
//!
//! One pass per update tick, in this order:
//!
//! 1. **decide**: ask the [`LodDecider`] for every leaf; changed leaves get an
//!    [`UpdatedPatch`] record
//! 2. **balance**: lower any leaf that is coarser than a neighbor by more than
//!    the configured delta
//! 3. **propagate**: exchange final LODs between each recorded leaf and its
//!    neighbors, creating neighbor records on demand
//! 4. **fix edges**: flag the neighbors of every changed leaf for restitching
//! 5. **reindex**: rebuild index buffers from the settled records
//! 6. **commit**: install the new LODs, neighbor LODs and index buffers
//!
//! Mesh generation only ever reads settled values, so an edge whose two sides
//! both changed is stitched once with the final pair.

use crate::bounds::Aabb;
use crate::neighbor::Direction;
use crate::patch::NeighborLods;
use crate::terrain::Terrain;
use crate::tile::TileId;
use crate::tree::NodeId;
use glam::Vec3;
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, trace};

/// What a [`LodDecider`] sees of a patch
#[derive(Debug, Clone, Copy)]
pub struct LodContext {
    pub patch: NodeId,
    pub tile: TileId,
    /// World bound of the patch
    pub bounds: Aabb,
    pub center: Vec3,
    pub size: u32,
    pub current_lod: u32,
    pub max_lod: u32,
    pub world_scale: Vec3,
}

/// Desired LOD for a patch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LodDecision {
    pub lod: u32,
    pub changed: bool,
}

impl LodDecision {
    pub fn keep(current: u32) -> Self {
        Self {
            lod: current,
            changed: false,
        }
    }
}

/// Chooses a patch LOD from the viewpoints
pub trait LodDecider: Send + Sync {
    fn decide(&self, patch: &LodContext, viewpoints: &[Vec3]) -> LodDecision;
}

/// Distance-banded LOD: one level per `size * multiplier` world units
#[derive(Debug, Clone, Copy)]
pub struct DistanceLodDecider {
    pub multiplier: f32,
}

impl DistanceLodDecider {
    pub fn new(multiplier: f32) -> Self {
        Self { multiplier }
    }
}

impl Default for DistanceLodDecider {
    fn default() -> Self {
        Self::new(2.7)
    }
}

impl LodDecider for DistanceLodDecider {
    fn decide(&self, patch: &LodContext, viewpoints: &[Vec3]) -> LodDecision {
        let Some(distance) = viewpoints
            .iter()
            .map(|v| v.distance(patch.center))
            .reduce(f32::min)
        else {
            return LodDecision::keep(patch.current_lod);
        };

        let band = patch.size as f32 * self.multiplier * patch.world_scale.x;
        let lod = (0..=patch.max_lod)
            .find(|i| distance < band * (i + 1) as f32)
            .unwrap_or(patch.max_lod);
        LodDecision {
            lod,
            changed: lod != patch.current_lod,
        }
    }
}

/// Per-pass bookkeeping for one patch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdatedPatch {
    pub old_lod: u32,
    pub new_lod: u32,
    /// Neighbor LODs as proposed by the neighbors this pass
    pub neighbor_lods: NeighborLods,
    /// An adjoining patch changed LOD, so this one must be restitched
    pub fix_edges: bool,
}

impl UpdatedPatch {
    fn seed(lod: u32, neighbors: NeighborLods) -> Self {
        Self {
            old_lod: lod,
            new_lod: lod,
            neighbor_lods: neighbors,
            fix_edges: false,
        }
    }

    #[inline]
    pub fn lod_changed(&self) -> bool {
        self.old_lod != self.new_lod
    }

    /// Whether the index buffer has to be regenerated
    pub fn reindex_needed(&self, stored: &NeighborLods) -> bool {
        self.lod_changed() || self.fix_edges || self.neighbor_lods != *stored
    }
}

/// Outcome of one negotiation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LodPassReport {
    /// Patches whose LOD changed
    pub changed: Vec<NodeId>,
    /// Patches whose index buffer was rebuilt
    pub reindexed: Vec<NodeId>,
    /// Patches lowered to respect the neighbor delta
    pub clamped: usize,
}

type Records = BTreeMap<NodeId, UpdatedPatch>;

impl Terrain {
    /// Run one full LOD negotiation pass
    pub fn update_lod(&mut self, viewpoints: &[Vec3]) -> LodPassReport {
        if self.lod_locked {
            return LodPassReport::default();
        }
        let force = std::mem::take(&mut self.topology_changed);
        let leaves = self.all_leaves();

        let mut records = self.decide_lods(&leaves, viewpoints, force);
        let clamped = self.balance_lods(&mut records);
        self.propagate_lods(&mut records);
        self.fix_edges(&mut records);

        let staged: Vec<(NodeId, Vec<u32>)> = records
            .iter()
            .filter_map(|(id, record)| {
                let leaf = self.leaf(*id)?;
                record.reindex_needed(&leaf.lod.neighbors).then(|| {
                    let indices = self.mesh_generator.build_indices(
                        leaf.size(),
                        record.new_lod,
                        &record.neighbor_lods,
                    );
                    (*id, indices)
                })
            })
            .collect();

        let mut report = LodPassReport {
            clamped,
            ..Default::default()
        };
        for (id, record) in &records {
            if record.lod_changed() {
                report.changed.push(*id);
            }
            if let Some(leaf) = self.leaf_mut(*id) {
                leaf.lod.previous_lod = leaf.lod.lod;
                leaf.lod.lod = record.new_lod;
                leaf.lod.neighbors = record.neighbor_lods;
            }
        }
        for (id, indices) in staged {
            if let Some(leaf) = self.leaf_mut(id) {
                leaf.mesh_mut().set_indices(indices);
                report.reindexed.push(id);
            }
        }

        if !report.changed.is_empty() || !report.reindexed.is_empty() {
            debug!(
                "LOD pass: {} changed, {} reindexed, {} clamped",
                report.changed.len(),
                report.reindexed.len(),
                report.clamped
            );
        }
        report
    }

    pub(crate) fn lod_context(&self, id: NodeId) -> Option<LodContext> {
        let node = self.node(id)?;
        let leaf = node.as_leaf()?;
        let tile = self.tiles.get(&node.tile)?;
        let bounds = self.world_bound(id)?;
        Some(LodContext {
            patch: id,
            tile: node.tile,
            bounds,
            center: bounds.center(),
            size: leaf.size(),
            current_lod: leaf.lod.lod,
            max_lod: leaf.lod.max_lod,
            world_scale: tile.transform.scale,
        })
    }

    fn decide_lods(&self, leaves: &[NodeId], viewpoints: &[Vec3], force: bool) -> Records {
        let mut records = Records::new();
        for &id in leaves {
            let (Some(ctx), Some(leaf)) = (self.lod_context(id), self.leaf(id)) else {
                continue;
            };
            let decision = self.lod_decider.decide(&ctx, viewpoints);
            let lod = decision.lod.min(ctx.max_lod);
            if (decision.changed && lod != ctx.current_lod) || force {
                trace!("Patch {:?}: lod {} -> {}", id, ctx.current_lod, lod);
                let mut record = UpdatedPatch::seed(ctx.current_lod, leaf.lod.neighbors);
                record.new_lod = lod;
                records.insert(id, record);
            }
        }
        records
    }

    /// Proposed LOD of a patch: its record if any, else its committed LOD
    fn pending_lod(&self, records: &Records, id: NodeId) -> Option<u32> {
        records
            .get(&id)
            .map(|r| r.new_lod)
            .or_else(|| self.leaf(id).map(|l| l.lod.lod))
    }

    fn record_mut<'a>(&self, records: &'a mut Records, id: NodeId) -> Option<&'a mut UpdatedPatch> {
        if !records.contains_key(&id) {
            let leaf = self.leaf(id)?;
            records.insert(id, UpdatedPatch::seed(leaf.lod.lod, leaf.lod.neighbors));
        }
        records.get_mut(&id)
    }

    /// Lower patches until no neighbor pair differs by more than the limit
    fn balance_lods(&mut self, records: &mut Records) -> usize {
        let delta = self.config.lod.max_neighbor_delta;
        let mut queue: VecDeque<NodeId> = records.keys().copied().collect();
        let mut clamped = 0;

        while let Some(id) = queue.pop_front() {
            let neighbors = self.patch_neighbors(id);
            let Some(mut lod) = self.pending_lod(records, id) else {
                continue;
            };
            for neighbor in neighbors.into_iter().flatten() {
                let Some(other) = self.pending_lod(records, neighbor) else {
                    continue;
                };
                if other > lod + delta {
                    if let Some(record) = self.record_mut(records, neighbor) {
                        record.new_lod = lod + delta;
                        clamped += 1;
                        queue.push_back(neighbor);
                    }
                } else if lod > other + delta {
                    lod = other + delta;
                    if let Some(record) = self.record_mut(records, id) {
                        record.new_lod = lod;
                        clamped += 1;
                    }
                    queue.push_back(id);
                }
            }
        }
        clamped
    }

    /// Exchange settled LODs between every recorded patch and its neighbors
    fn propagate_lods(&mut self, records: &mut Records) {
        let ids: Vec<NodeId> = records.keys().copied().collect();
        for id in ids {
            let neighbors = self.patch_neighbors(id);
            let Some(new_lod) = records.get(&id).map(|r| r.new_lod) else {
                continue;
            };
            for direction in Direction::ALL {
                // Open sides stitch as a terrain boundary at full detail
                let Some(other) = neighbors[direction.index()]
                    .and_then(|neighbor| self.record_mut(records, neighbor))
                else {
                    if let Some(record) = records.get_mut(&id) {
                        record.neighbor_lods[direction] = 0;
                    }
                    continue;
                };
                other.neighbor_lods[direction.opposite()] = new_lod;
                let other_lod = other.new_lod;
                if let Some(record) = records.get_mut(&id) {
                    record.neighbor_lods[direction] = other_lod;
                }
            }
        }
    }

    /// Flag the neighbors of every changed patch for restitching
    fn fix_edges(&mut self, records: &mut Records) {
        let changed: Vec<(NodeId, u32)> = records
            .iter()
            .filter(|(_, r)| r.lod_changed())
            .map(|(id, r)| (*id, r.new_lod))
            .collect();
        for (id, new_lod) in changed {
            let neighbors = self.patch_neighbors(id);
            for direction in Direction::ALL {
                let Some(neighbor) = neighbors[direction.index()] else {
                    continue;
                };
                if let Some(other) = self.record_mut(records, neighbor) {
                    other.neighbor_lods[direction.opposite()] = new_lod;
                    other.fix_edges = true;
                }
            }
        }
    }
}
