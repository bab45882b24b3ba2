//! LOD negotiation across whole terrains
//!
//! Flies viewpoints over single- and multi-tile terrains and checks after
//! every tick that LOD bookkeeping is exact, neighbor deltas stay bounded
//! and index buffers match the settled state.

mod test_terrains;

use glam::Vec3;
use terrain::{DistanceLodDecider, Terrain, TerrainBuilder, TerrainConfig};
use test_terrains::*;

#[test]
fn test_flythrough_single_tile() {
    let mut terrain = TerrainBuilder::new(TerrainConfig::new(513, 65))
        .with_lod_decider(Box::new(DistanceLodDecider::new(0.6)))
        .build(Some(&hills(513)))
        .unwrap();

    let from = Vec3::new(-300.0, 40.0, -300.0);
    let to = Vec3::new(300.0, 40.0, 250.0);
    let mut total_changed = 0;
    for frame in 0..=24 {
        let eye = flight(from, to, frame as f32 / 24.0);
        let report = terrain.update(&[eye]);
        for id in &report.lod.changed {
            assert!(report.lod.reindexed.contains(id));
        }
        total_changed += report.lod.changed.len();
        assert_lod_bookkeeping(&mut terrain, 1);
        assert_watertight(&mut terrain);
    }
    assert!(total_changed > 0);
}

#[test]
fn test_nearest_patch_is_finest() {
    let mut terrain = TerrainBuilder::new(TerrainConfig::new(513, 65))
        .with_lod_decider(Box::new(DistanceLodDecider::new(0.5)))
        .build(None)
        .unwrap();
    let eye = Vec3::new(-224.0, 0.0, -224.0);
    terrain.update(&[eye]);

    let leaves = terrain.all_leaves();
    let nearest = leaves
        .iter()
        .copied()
        .min_by(|a, b| {
            let da = terrain.world_bound(*a).unwrap().center().distance(eye);
            let db = terrain.world_bound(*b).unwrap().center().distance(eye);
            da.total_cmp(&db)
        })
        .unwrap();
    let farthest_lod = leaves.iter().map(|l| terrain.leaf(*l).unwrap().lod()).max().unwrap();
    assert_eq!(terrain.leaf(nearest).unwrap().lod(), 0);
    assert!(farthest_lod > 1);
    assert_lod_bookkeeping(&mut terrain, 1);
}

#[test]
fn test_wider_delta_is_respected() {
    let mut config = TerrainConfig::new(513, 65);
    config.lod.max_neighbor_delta = 2;
    let mut terrain = TerrainBuilder::new(config)
        .with_lod_decider(Box::new(DistanceLodDecider::new(0.2)))
        .build(None)
        .unwrap();
    for eye in [Vec3::ZERO, Vec3::new(250.0, 0.0, 250.0), Vec3::new(-250.0, 0.0, 0.0)] {
        terrain.update(&[eye]);
        assert_lod_bookkeeping(&mut terrain, 2);
        assert_watertight(&mut terrain);
    }
}

#[test]
fn test_flythrough_across_tiles() {
    let (mut terrain, tiles) = tile_row(TerrainConfig::new(257, 65), 3);
    terrain.set_lod_decider(Box::new(DistanceLodDecider::new(0.5)));
    assert_eq!(tiles.len(), 3);

    for frame in 0..=16 {
        let eye = flight(Vec3::new(-100.0, 20.0, 0.0), Vec3::new(600.0, 20.0, 0.0), frame as f32 / 16.0);
        terrain.update(&[eye]);
        assert_lod_bookkeeping(&mut terrain, 1);
        assert_watertight(&mut terrain);
    }
}

#[test]
fn test_locked_terrain_holds_lods() {
    let mut terrain = TerrainBuilder::new(TerrainConfig::new(257, 65))
        .with_lod_decider(Box::new(DistanceLodDecider::new(0.5)))
        .build(None)
        .unwrap();
    terrain.update(&[Vec3::new(-120.0, 0.0, -120.0)]);
    let before: Vec<u32> = terrain
        .all_leaves()
        .iter()
        .map(|l| terrain.leaf(*l).unwrap().lod())
        .collect();

    terrain.set_lod_locked(true);
    let report = terrain.update(&[Vec3::new(120.0, 0.0, 120.0)]);
    assert!(report.lod.changed.is_empty());
    let after: Vec<u32> = terrain
        .all_leaves()
        .iter()
        .map(|l| terrain.leaf(*l).unwrap().lod())
        .collect();
    assert_eq!(before, after);
}

#[test]
fn test_no_viewpoints_keeps_state() {
    let mut terrain = Terrain::new(TerrainConfig::new(257, 65), None).unwrap();
    terrain.update(&[Vec3::new(2000.0, 0.0, 0.0)]);
    let report = terrain.update(&[]);
    assert!(report.lod.changed.is_empty());
    assert!(report.lod.reindexed.is_empty());
}
