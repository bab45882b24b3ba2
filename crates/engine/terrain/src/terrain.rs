//! The terrain facade: tiles, collaborators and the update tick

use crate::bounds::Aabb;
use crate::collision::{CollisionProbe, TriangleProbe};
use crate::config::TerrainConfig;
use crate::edit::{EditQueue, TerrainEditor};
use crate::error::{Result, TerrainError};
use crate::height_field::HeightField;
use crate::lod::{DistanceLodDecider, LodDecider, LodPassReport};
use crate::mesh::{GeomipMeshGenerator, MeshGenerator};
use crate::neighbor::NeighborFinder;
use crate::tile::{Tile, TileId, Transform};
use crate::tree::{BuildContext, NodeArena};
use glam::{UVec2, Vec2, Vec3};
use std::collections::{BTreeMap, HashSet};
use std::time::Instant;
use tracing::debug;

/// Summary of one [`Terrain::update`] tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateReport {
    /// Queued edits applied at the start of the tick
    pub edits_applied: usize,
    pub lod: LodPassReport,
    /// Leaves whose normals were recomputed
    pub normals_recomputed: usize,
}

/// Geomipmapped height-field terrain made of one or more tiles
///
/// All tiles share the configuration's sizes and step scale and live in a
/// single node arena. Collaborators are injected through [`TerrainBuilder`]
/// and may be swapped later.
pub struct Terrain {
    pub(crate) config: TerrainConfig,
    pub(crate) nodes: NodeArena,
    pub(crate) tiles: BTreeMap<TileId, Tile>,
    next_tile: u32,
    pub(crate) neighbor_finder: Option<Box<dyn NeighborFinder>>,
    pub(crate) mesh_generator: Box<dyn MeshGenerator>,
    pub(crate) lod_decider: Box<dyn LodDecider>,
    pub(crate) collision_probe: Box<dyn CollisionProbe>,
    pub(crate) edits: EditQueue,
    /// Set when tiles or finders change; the next LOD pass revisits every leaf
    pub(crate) topology_changed: bool,
    pub(crate) lod_locked: bool,
}

impl std::fmt::Debug for Terrain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Terrain")
            .field("config", &self.config)
            .field("tiles", &self.tiles.len())
            .field("nodes", &self.nodes.len())
            .field("lod_locked", &self.lod_locked)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Terrain`] with custom collaborators
pub struct TerrainBuilder {
    config: TerrainConfig,
    transform: Transform,
    neighbor_finder: Option<Box<dyn NeighborFinder>>,
    mesh_generator: Box<dyn MeshGenerator>,
    lod_decider: Option<Box<dyn LodDecider>>,
    collision_probe: Box<dyn CollisionProbe>,
}

impl TerrainBuilder {
    pub fn new(config: TerrainConfig) -> Self {
        Self {
            config,
            transform: Transform::IDENTITY,
            neighbor_finder: None,
            mesh_generator: Box::new(GeomipMeshGenerator),
            lod_decider: None,
            collision_probe: Box::new(TriangleProbe),
        }
    }

    /// Transform of the first tile
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_neighbor_finder(mut self, finder: Box<dyn NeighborFinder>) -> Self {
        self.neighbor_finder = Some(finder);
        self
    }

    pub fn with_mesh_generator(mut self, generator: Box<dyn MeshGenerator>) -> Self {
        self.mesh_generator = generator;
        self
    }

    pub fn with_lod_decider(mut self, decider: Box<dyn LodDecider>) -> Self {
        self.lod_decider = Some(decider);
        self
    }

    pub fn with_collision_probe(mut self, probe: Box<dyn CollisionProbe>) -> Self {
        self.collision_probe = probe;
        self
    }

    /// Validate the configuration and build the first tile
    ///
    /// `heights` is a square row-major array; `None` builds a flat tile.
    pub fn build(self, heights: Option<&[f32]>) -> Result<Terrain> {
        self.config.validate()?;
        let lod_decider = self.lod_decider.unwrap_or_else(|| {
            Box::new(DistanceLodDecider::new(self.config.lod.distance_multiplier))
        });
        let mut terrain = Terrain {
            config: self.config,
            nodes: NodeArena::new(),
            tiles: BTreeMap::new(),
            next_tile: 0,
            neighbor_finder: self.neighbor_finder,
            mesh_generator: self.mesh_generator,
            lod_decider,
            collision_probe: self.collision_probe,
            edits: EditQueue::default(),
            topology_changed: true,
            lod_locked: false,
        };
        terrain.add_tile(heights, self.transform)?;
        Ok(terrain)
    }
}

impl Terrain {
    /// Single-tile terrain with the default collaborators
    pub fn new(config: TerrainConfig, heights: Option<&[f32]>) -> Result<Self> {
        TerrainBuilder::new(config).build(heights)
    }

    /// Build another tile from `heights` and place it with `transform`
    ///
    /// The tile only joins its neighbors once the neighbor finder knows it.
    pub fn add_tile(&mut self, heights: Option<&[f32]>, transform: Transform) -> Result<TileId> {
        let start = Instant::now();
        let total = self.config.total_size;
        if !(transform.scale.x > 0.0 && transform.scale.z > 0.0) {
            return Err(TerrainError::IncompatibleTile(format!(
                "tile scale must be positive on x and z, got {}",
                transform.scale
            )));
        }
        let field = match heights {
            Some(samples) => HeightField::from_samples(total, samples)?,
            None => HeightField::flat(total),
        };

        let id = TileId(self.next_tile);
        self.next_tile += 1;
        let ctx = BuildContext {
            tile: id,
            patch_size: self.config.patch_size,
            step_scale: self.config.step_scale,
            half_span: ((total - 1) / 2) as f32,
        };
        let root = self.build_node(&ctx, &field, None, None, UVec2::ZERO, Vec2::ZERO, 0.0);
        self.tiles.insert(
            id,
            Tile {
                id,
                root,
                total_size: total,
                step_scale: self.config.step_scale,
                transform,
                last_scale: transform.scale,
                dirty: None,
            },
        );

        self.invalidate_neighbor_caches();
        self.invalidate_all_normals(id);
        self.flush_normals();
        debug!(
            "Built tile {:?}: {} leaves in {:.2}ms",
            id,
            self.leaves(id).len(),
            start.elapsed().as_secs_f32() * 1000.0
        );
        Ok(id)
    }

    /// Remove a tile and every node under it
    ///
    /// Cached links into the removed leaves are cleared on both sides and
    /// adjoining tiles get their border normals rebuilt on the next update.
    pub fn detach_tile(&mut self, tile: TileId) -> Result<()> {
        let root = self.tiles.get(&tile).ok_or(TerrainError::UnknownTile(tile))?.root;
        let removed: HashSet<_> = self.subtree(root).into_iter().collect();
        self.clear_links_into(&removed);
        for id in &removed {
            self.nodes.remove(*id);
        }
        let Some(detached) = self.tiles.remove(&tile) else {
            return Err(TerrainError::UnknownTile(tile));
        };

        let extent = detached.world_extent();
        for other in self.tiles.values_mut() {
            if other.world_extent().intersects(&extent) {
                other.dirty = Some(match other.dirty {
                    Some(dirty) => dirty.union(&extent),
                    None => extent,
                });
            }
        }
        self.topology_changed = true;
        debug!("Detached tile {:?} ({} nodes)", tile, removed.len());
        Ok(())
    }

    /// Lowest tile id, the tile created by the builder unless detached
    pub fn primary_tile(&self) -> TileId {
        self.tiles.keys().next().copied().unwrap_or(TileId(0))
    }

    pub fn tile(&self, tile: TileId) -> Option<&Tile> {
        self.tiles.get(&tile)
    }

    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.values()
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    pub fn config(&self) -> &TerrainConfig {
        &self.config
    }

    /// Unscaled world size of one tile on x and z
    ///
    /// Tiles placed this far apart share their edge samples.
    pub fn tile_extent(&self) -> Vec2 {
        let span = (self.config.total_size - 1) as f32;
        Vec2::new(
            span * self.config.step_scale.x,
            span * self.config.step_scale.z,
        )
    }

    pub fn transform(&self, tile: TileId) -> Option<Transform> {
        self.tiles.get(&tile).map(|t| t.transform)
    }

    /// Move or rescale a tile
    ///
    /// A scale change rebuilds the tile's normals on the next flush.
    pub fn set_transform(&mut self, tile: TileId, transform: Transform) -> Result<()> {
        let t = self
            .tiles
            .get_mut(&tile)
            .ok_or(TerrainError::UnknownTile(tile))?;
        t.transform = transform;
        Ok(())
    }

    /// Replace the tile adjacency source; `None` isolates every tile
    pub fn set_neighbor_finder(&mut self, finder: Option<Box<dyn NeighborFinder>>) {
        self.neighbor_finder = finder;
        self.invalidate_neighbor_caches();
        let ids: Vec<TileId> = self.tiles.keys().copied().collect();
        for id in ids {
            self.invalidate_all_normals(id);
        }
    }

    pub fn set_lod_decider(&mut self, decider: Box<dyn LodDecider>) {
        self.lod_decider = decider;
    }

    pub fn set_collision_probe(&mut self, probe: Box<dyn CollisionProbe>) {
        self.collision_probe = probe;
    }

    /// Freeze every patch at its current LOD
    pub fn set_lod_locked(&mut self, locked: bool) {
        self.lod_locked = locked;
    }

    pub fn is_lod_locked(&self) -> bool {
        self.lod_locked
    }

    /// Handle for queueing edits from other threads
    pub fn editor(&self) -> TerrainEditor {
        TerrainEditor::new(self.edits.clone())
    }

    /// One tick: apply queued edits, negotiate LODs, then repair normals
    pub fn update(&mut self, viewpoints: &[Vec3]) -> UpdateReport {
        let edits_applied = self.apply_pending_edits();
        let lod = self.update_lod(viewpoints);
        let normals_recomputed = self.flush_normals();
        UpdateReport {
            edits_applied,
            lod,
            normals_recomputed,
        }
    }

    /// Tiles whose xz extent contains a world point
    pub fn tiles_containing(&self, world: Vec2) -> Vec<TileId> {
        self.tiles
            .values()
            .filter(|t| {
                let extent = t.world_extent();
                world.x >= extent.min.x
                    && world.x <= extent.max.x
                    && world.y >= extent.min.z
                    && world.y <= extent.max.z
            })
            .map(|t| t.id)
            .collect()
    }

    /// Interpolated world height at a world xz position
    pub fn height(&self, world: Vec2) -> Option<f32> {
        self.tiles_containing(world)
            .into_iter()
            .find_map(|tile| self.tile_height(tile, world))
    }

    fn tile_height(&self, tile: TileId, world: Vec2) -> Option<f32> {
        let t = self.tiles.get(&tile)?;
        let sample = t.world_to_sample(world);
        let max = (t.total_size - 1) as f32;
        if !(0.0..=max).contains(&sample.x) || !(0.0..=max).contains(&sample.y) {
            return None;
        }
        let x0 = (sample.x.floor() as u32).min(t.total_size - 2);
        let z0 = (sample.y.floor() as u32).min(t.total_size - 2);

        // Any leaf holding the whole cell will do
        let (leaf, col, row) = self
            .locate(tile, x0, z0)
            .into_iter()
            .find(|(leaf, col, row)| {
                self.leaf(*leaf)
                    .is_some_and(|l| col + 1 < l.size() && row + 1 < l.size())
            })?;
        let h = self.leaf(leaf)?.heights().interpolate(
            col as f32 + (sample.x - x0 as f32),
            row as f32 + (sample.y - z0 as f32),
        )?;
        Some(t.transform.apply(t.local_position(0.0, 0.0, h)).y)
    }

    /// Raw sample height at the sample nearest to a world point
    pub fn heightmap_height(&self, world: Vec2) -> Option<f32> {
        self.tiles_containing(world).into_iter().find_map(|tile| {
            let (x, z) = self.tiles.get(&tile)?.nearest_sample(world)?;
            self.height_at_sample(tile, x, z)
        })
    }

    /// World box of a tile's extent, y taken from its nodes
    pub fn tile_bound(&self, tile: TileId) -> Option<Aabb> {
        self.world_bound(self.tiles.get(&tile)?.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neighbor::Direction;
    use crate::tile::TileGrid;
    use glam::IVec2;

    fn ramp(size: u32) -> Vec<f32> {
        (0..size * size).map(|i| (i % size) as f32).collect()
    }

    #[test]
    fn test_invalid_sizes_build_nothing() {
        assert_eq!(
            Terrain::new(TerrainConfig::new(100, 65), None).unwrap_err(),
            TerrainError::InvalidSize(100)
        );
        assert_eq!(
            Terrain::new(TerrainConfig::new(129, 12), None).unwrap_err(),
            TerrainError::InvalidPatchSize(12)
        );
        assert_eq!(
            Terrain::new(TerrainConfig::new(129, 65), Some(&[0.0; 10])).unwrap_err(),
            TerrainError::NonSquareHeightMap(10)
        );
    }

    #[test]
    fn test_mismatched_height_map_is_adapted() {
        // 65x65 samples into a 129 tile: zero-filled past the source
        let terrain = Terrain::new(TerrainConfig::new(129, 65), Some(&ramp(65))).unwrap();
        let tile = terrain.primary_tile();
        assert_eq!(terrain.height_at_sample(tile, 64, 0), Some(64.0));
        assert_eq!(terrain.height_at_sample(tile, 65, 0), Some(0.0));
    }

    #[test]
    fn test_interpolated_height() {
        let terrain = Terrain::new(TerrainConfig::new(129, 65), Some(&ramp(129))).unwrap();
        // Sample x == world x + 64
        assert_eq!(terrain.height(Vec2::new(0.0, 0.0)), Some(64.0));
        assert_eq!(terrain.height(Vec2::new(10.5, -3.25)), Some(74.5));
        assert_eq!(terrain.height(Vec2::new(64.0, 64.0)), Some(128.0));
        assert_eq!(terrain.height(Vec2::new(64.5, 0.0)), None);
        assert_eq!(terrain.heightmap_height(Vec2::new(10.4, 0.0)), Some(74.0));
    }

    #[test]
    fn test_height_follows_transform() {
        let transform = Transform::new(Vec3::new(1000.0, 5.0, 0.0), Vec3::new(2.0, 3.0, 2.0));
        let terrain = TerrainBuilder::new(TerrainConfig::new(65, 33))
            .with_transform(transform)
            .build(Some(&ramp(65)))
            .unwrap();
        // World x 1000 is sample 32
        assert_eq!(terrain.height(Vec2::new(1000.0, 0.0)), Some(5.0 + 32.0 * 3.0));
        assert_eq!(terrain.height(Vec2::new(0.0, 0.0)), None);
    }

    #[test]
    fn test_two_tiles_join_through_grid() {
        let config = TerrainConfig::new(129, 65);
        let mut terrain = Terrain::new(config, None).unwrap();
        let left = terrain.primary_tile();
        let extent = terrain.tile_extent();
        let right = terrain
            .add_tile(
                None,
                Transform::from_translation(TileGrid::translation_for(IVec2::new(1, 0), extent)),
            )
            .unwrap();

        let mut grid = TileGrid::new();
        grid.insert(IVec2::new(0, 0), left);
        grid.insert(IVec2::new(1, 0), right);
        terrain.set_neighbor_finder(Some(Box::new(grid)));

        let left_root = terrain.tile(left).unwrap().root();
        let right_root = terrain.tile(right).unwrap().root();
        assert_eq!(terrain.find_neighbor(left_root, Direction::Right), Some(right_root));
        assert_eq!(terrain.find_neighbor(right_root, Direction::Left), Some(left_root));

        // Leaves on the shared border see each other both ways
        for leaf in terrain.leaves(left) {
            if let Some(other) = terrain.patch_neighbor(leaf, Direction::Right) {
                assert_eq!(terrain.patch_neighbor(other, Direction::Left), Some(leaf));
            }
        }
        let mut across = Vec::new();
        for leaf in terrain.leaves(left) {
            across.extend(terrain.patch_neighbor(leaf, Direction::Right));
        }
        across.retain(|n| terrain.node(*n).unwrap().tile() == right);
        let across = across.len();
        assert_eq!(across, 2);
        assert_eq!(terrain.tiles_containing(Vec2::new(64.0, 0.0)).len(), 2);
    }

    #[test]
    fn test_detach_clears_links() {
        let mut terrain = Terrain::new(TerrainConfig::new(129, 65), None).unwrap();
        let left = terrain.primary_tile();
        let right = terrain
            .add_tile(None, Transform::from_translation(Vec3::new(128.0, 0.0, 0.0)))
            .unwrap();
        let mut grid = TileGrid::new();
        grid.insert(IVec2::ZERO, left);
        grid.insert(IVec2::new(1, 0), right);
        terrain.set_neighbor_finder(Some(Box::new(grid)));

        let border: Vec<_> = terrain
            .leaves(left)
            .into_iter()
            .filter(|l| terrain.patch_neighbor(*l, Direction::Right).is_some_and(|n| {
                terrain.node(n).is_some_and(|n| n.tile() == right)
            }))
            .collect();
        assert_eq!(border.len(), 2);
        assert_eq!(terrain.node_count(), 10);
        terrain.flush_normals();
        assert!(terrain.tile(left).unwrap().dirty_region().is_none());

        terrain.detach_tile(right).unwrap();
        assert_eq!(terrain.node_count(), 5);
        assert!(terrain.tile(right).is_none());
        for leaf in border {
            assert!(!terrain.leaf(leaf).unwrap().neighbors_searched());
        }
        assert_eq!(
            terrain.detach_tile(right),
            Err(TerrainError::UnknownTile(right))
        );
        assert!(terrain.tile(left).unwrap().dirty_region().is_some());
    }

    #[test]
    fn test_update_applies_edits_first() {
        let mut terrain = Terrain::new(TerrainConfig::new(129, 65), None).unwrap();
        let editor = terrain.editor();
        editor.set_height(Vec2::new(0.0, 0.0), 4.0);
        editor.adjust_height(Vec2::new(0.0, 0.0), 1.0);

        let report = terrain.update(&[Vec3::new(0.0, 0.0, 0.0)]);
        assert_eq!(report.edits_applied, 2);
        assert_eq!(report.normals_recomputed, 4);
        assert_eq!(terrain.heightmap_height(Vec2::ZERO), Some(5.0));
    }
}
