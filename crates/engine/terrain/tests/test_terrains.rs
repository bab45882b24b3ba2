//! Terrain fixtures and invariant checks shared by the integration tests

#![allow(dead_code)]

use glam::{IVec2, Vec3};
use std::collections::BTreeSet;
use terrain::{
    Direction, GeomipMeshGenerator, MeshGenerator, NodeId, Terrain, TerrainConfig, TileGrid,
    TileId, Transform,
};

// ============================================================================
// Fixtures
// ============================================================================

/// Smooth rolling hills, deterministic
pub fn hills(size: u32) -> Vec<f32> {
    (0..size * size)
        .map(|i| {
            let x = (i % size) as f32;
            let z = (i / size) as f32;
            (x * 0.05).sin() * 8.0 + (z * 0.08).cos() * 5.0
        })
        .collect()
}

/// Row of `count` tiles joined through a [`TileGrid`]
pub fn tile_row(config: TerrainConfig, count: i32) -> (Terrain, Vec<TileId>) {
    let mut terrain = Terrain::new(config, None).expect("valid config");
    let extent = terrain.tile_extent();
    let mut grid = TileGrid::new();
    let mut tiles = vec![terrain.primary_tile()];
    grid.insert(IVec2::ZERO, tiles[0]);
    for i in 1..count {
        let coord = IVec2::new(i, 0);
        let translation = TileGrid::translation_for(coord, extent);
        let tile = terrain
            .add_tile(None, Transform::from_translation(translation))
            .expect("tile builds");
        grid.insert(coord, tile);
        tiles.push(tile);
    }
    terrain.set_neighbor_finder(Some(Box::new(grid)));
    (terrain, tiles)
}

// ============================================================================
// Invariant checks
// ============================================================================

/// Grid coordinates along `side` of a leaf that its index buffer references
pub fn edge_coords(terrain: &Terrain, leaf: NodeId, side: Direction) -> BTreeSet<u32> {
    let patch = terrain.leaf(leaf).expect("leaf");
    let size = patch.size();
    let m = size - 1;
    patch
        .mesh()
        .indices
        .iter()
        .map(|&i| (i % size, i / size))
        .filter_map(|(x, z)| match side {
            Direction::Left => (x == 0).then_some(z),
            Direction::Right => (x == m).then_some(z),
            Direction::Top => (z == 0).then_some(x),
            Direction::Bottom => (z == m).then_some(x),
        })
        .collect()
}

/// Every shared edge uses the same vertex set from both sides
pub fn assert_watertight(terrain: &mut Terrain) {
    for leaf in terrain.all_leaves() {
        for direction in [Direction::Right, Direction::Bottom] {
            let Some(other) = terrain.patch_neighbor(leaf, direction) else {
                continue;
            };
            assert_eq!(
                edge_coords(terrain, leaf, direction),
                edge_coords(terrain, other, direction.opposite()),
                "seam between {leaf:?} and {other:?}"
            );
        }
    }
}

/// Stored neighbor LODs match the neighbors, and index buffers match the state
pub fn assert_lod_bookkeeping(terrain: &mut Terrain, max_delta: u32) {
    for leaf in terrain.all_leaves() {
        let neighbors = terrain.patch_neighbors(leaf);
        let patch = terrain.leaf(leaf).expect("leaf");
        let state = *patch.lod_state();
        assert!(state.lod <= state.max_lod);

        for direction in Direction::ALL {
            if let Some(n) = neighbors[direction.index()] {
                let other = terrain.leaf(n).expect("neighbor leaf").lod();
                assert_eq!(state.neighbors[direction], other, "{leaf:?} {direction:?}");
                assert!(state.lod.abs_diff(other) <= max_delta);
            }
        }

        let patch = terrain.leaf(leaf).expect("leaf");
        let expected = GeomipMeshGenerator.build_indices(patch.size(), state.lod, &state.neighbors);
        assert_eq!(&*patch.mesh().indices, expected.as_slice(), "{leaf:?} indices");
    }
}

/// Viewpoint `t` of the way along a straight flight
pub fn flight(from: Vec3, to: Vec3, t: f32) -> Vec3 {
    from.lerp(to, t)
}
