//! Neighbor resolution across the quadtree and between tiles
//!
//! A neighbor is found by walking up until the step stays inside a parent,
//! then back down through the mirrored quadrants:
//!
//! | direction | from 1       | from 2       | from 3       | from 4       |
//! |-----------|--------------|--------------|--------------|--------------|
//! | right     | sibling 3    | sibling 4    | parent → 1   | parent → 2   |
//! | left      | parent → 3   | parent → 4   | sibling 1    | sibling 2    |
//! | bottom    | sibling 2    | parent → 1   | sibling 4    | parent → 3   |
//! | top       | parent → 2   | sibling 1    | parent → 4   | sibling 3    |
//!
//! At a tile root the walk hands over to the [`NeighborFinder`].

use crate::quadrant::Quadrant;
use crate::terrain::Terrain;
use crate::tile::TileId;
use crate::tree::NodeId;
use glam::IVec2;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Side of a node; top is -z, bottom is +z
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Left,
    Top,
    Right,
    Bottom,
}

/// Where a step in some direction lands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Another child of the same parent
    Sibling(Quadrant),
    /// The given child of the parent's neighbor in the same direction
    ParentNeighbor(Quadrant),
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Left,
        Direction::Top,
        Direction::Right,
        Direction::Bottom,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub fn opposite(self) -> Direction {
        match self {
            Direction::Left => Direction::Right,
            Direction::Top => Direction::Bottom,
            Direction::Right => Direction::Left,
            Direction::Bottom => Direction::Top,
        }
    }

    /// Step on a tile grid (x right, y towards +z)
    #[inline]
    pub fn grid_offset(self) -> IVec2 {
        match self {
            Direction::Left => IVec2::new(-1, 0),
            Direction::Top => IVec2::new(0, -1),
            Direction::Right => IVec2::new(1, 0),
            Direction::Bottom => IVec2::new(0, 1),
        }
    }

    pub fn transition(self, from: Quadrant) -> Transition {
        use Quadrant::*;
        use Transition::*;
        match (self, from) {
            (Direction::Right, UpperLeft) => Sibling(UpperRight),
            (Direction::Right, LowerLeft) => Sibling(LowerRight),
            (Direction::Right, UpperRight) => ParentNeighbor(UpperLeft),
            (Direction::Right, LowerRight) => ParentNeighbor(LowerLeft),

            (Direction::Left, UpperRight) => Sibling(UpperLeft),
            (Direction::Left, LowerRight) => Sibling(LowerLeft),
            (Direction::Left, UpperLeft) => ParentNeighbor(UpperRight),
            (Direction::Left, LowerLeft) => ParentNeighbor(LowerRight),

            (Direction::Bottom, UpperLeft) => Sibling(LowerLeft),
            (Direction::Bottom, UpperRight) => Sibling(LowerRight),
            (Direction::Bottom, LowerLeft) => ParentNeighbor(UpperLeft),
            (Direction::Bottom, LowerRight) => ParentNeighbor(UpperRight),

            (Direction::Top, LowerLeft) => Sibling(UpperLeft),
            (Direction::Top, LowerRight) => Sibling(UpperRight),
            (Direction::Top, UpperLeft) => ParentNeighbor(LowerLeft),
            (Direction::Top, UpperRight) => ParentNeighbor(LowerRight),
        }
    }
}

/// Supplies the tile adjoining a tile root
///
/// Returning the asking tile itself is treated as "no neighbor".
pub trait NeighborFinder: Send + Sync {
    fn neighbor_tile(&self, tile: TileId, direction: Direction) -> Option<TileId>;
}

impl<F> NeighborFinder for F
where
    F: Fn(TileId, Direction) -> Option<TileId> + Send + Sync,
{
    fn neighbor_tile(&self, tile: TileId, direction: Direction) -> Option<TileId> {
        self(tile, direction)
    }
}

/// Leaves surrounding a patch, indexed by `(dx + 1, dz + 1)`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NeighborRing {
    cells: [[Option<NodeId>; 3]; 3],
}

impl NeighborRing {
    /// Leaf at grid offset `(dx, dz)`, each in `-1..=1`; `(0, 0)` is the centre
    #[inline]
    pub fn at(&self, dx: i32, dz: i32) -> Option<NodeId> {
        if !(-1..=1).contains(&dx) || !(-1..=1).contains(&dz) {
            return None;
        }
        self.cells[(dz + 1) as usize][(dx + 1) as usize]
    }

    fn set(&mut self, dx: i32, dz: i32, id: Option<NodeId>) {
        self.cells[(dz + 1) as usize][(dx + 1) as usize] = id;
    }

    /// Present leaves with their offsets, centre included
    pub fn iter(&self) -> impl Iterator<Item = (i32, i32, NodeId)> + '_ {
        (-1..=1).flat_map(move |dz| {
            (-1..=1).filter_map(move |dx| self.at(dx, dz).map(|id| (dx, dz, id)))
        })
    }
}

impl Terrain {
    /// Adjacent node at the same depth, internal or leaf
    pub fn find_neighbor(&self, id: NodeId, direction: Direction) -> Option<NodeId> {
        let node = self.nodes.get(id)?;
        let tile = self.tiles.get(&node.tile)?;
        let budget = (tile.total_size - 1).ilog2() + 2;
        self.find_neighbor_within(id, direction, budget)
    }

    fn find_neighbor_within(&self, id: NodeId, direction: Direction, budget: u32) -> Option<NodeId> {
        if budget == 0 {
            warn!("Neighbor search from {:?} exceeded the depth limit", id);
            return None;
        }
        let node = self.nodes.get(id)?;
        let Some(quadrant) = node.quadrant else {
            return self.neighbor_root(node.tile, direction);
        };
        let parent = node.parent?;
        match direction.transition(quadrant) {
            Transition::Sibling(q) => self.nodes.get(parent)?.child(q),
            Transition::ParentNeighbor(q) => {
                let across = self.find_neighbor_within(parent, direction, budget - 1)?;
                self.nodes.get(across)?.child(q)
            }
        }
    }

    /// Root of the tile adjoining `tile`, via the neighbor finder
    fn neighbor_root(&self, tile: TileId, direction: Direction) -> Option<NodeId> {
        let finder = self.neighbor_finder.as_ref()?;
        let other = finder.neighbor_tile(tile, direction)?;
        if other == tile {
            warn!(
                "Neighbor finder returned tile {:?} as its own {:?} neighbor",
                tile, direction
            );
            return None;
        }
        self.tiles.get(&other).map(|t| t.root)
    }

    /// Leaf adjoining a leaf, without touching the cache
    fn lookup_patch_neighbor(&self, leaf: NodeId, direction: Direction) -> Option<NodeId> {
        let found = self.find_neighbor(leaf, direction)?;
        let same_size = self.nodes.get(found)?.size == self.nodes.get(leaf)?.size;
        (self.leaf(found).is_some() && same_size).then_some(found)
    }

    /// The 4 leaves adjoining a leaf, indexed by [`Direction::index`]
    ///
    /// Resolved once and cached on the leaf until the topology changes.
    pub fn patch_neighbors(&mut self, leaf: NodeId) -> [Option<NodeId>; 4] {
        if let Some(cached) = self.leaf(leaf).and_then(|l| l.neighbors) {
            return cached;
        }
        let mut found = [None; 4];
        for direction in Direction::ALL {
            found[direction.index()] = self.lookup_patch_neighbor(leaf, direction);
        }
        if let Some(l) = self.leaf_mut(leaf) {
            l.neighbors = Some(found);
        }
        found
    }

    pub fn patch_neighbor(&mut self, leaf: NodeId, direction: Direction) -> Option<NodeId> {
        self.patch_neighbors(leaf)[direction.index()]
    }

    /// Corner neighbor of a leaf, e.g. `(Top, Left)` for the upper-left one
    ///
    /// Reached through the `first` edge neighbor; when that side is missing
    /// the path through `second` is tried instead.
    pub fn diagonal_neighbor(&mut self, leaf: NodeId, first: Direction, second: Direction) -> Option<NodeId> {
        self.patch_neighbor(leaf, first)
            .and_then(|n| self.patch_neighbor(n, second))
            .or_else(|| {
                self.patch_neighbor(leaf, second)
                    .and_then(|n| self.patch_neighbor(n, first))
            })
    }

    /// Edge and corner neighbors of a leaf
    pub fn neighbor_ring(&mut self, leaf: NodeId) -> NeighborRing {
        let mut ring = NeighborRing::default();
        ring.set(0, 0, Some(leaf));
        let around = self.patch_neighbors(leaf);
        for direction in Direction::ALL {
            let step = direction.grid_offset();
            ring.set(step.x, step.y, around[direction.index()]);
        }

        for (horizontal, vertical) in [
            (Direction::Left, Direction::Top),
            (Direction::Right, Direction::Top),
            (Direction::Left, Direction::Bottom),
            (Direction::Right, Direction::Bottom),
        ] {
            let corner = self.diagonal_neighbor(leaf, vertical, horizontal);
            let offset = horizontal.grid_offset() + vertical.grid_offset();
            ring.set(offset.x, offset.y, corner);
        }
        ring
    }

    /// Forget every cached neighbor lookup
    pub fn invalidate_neighbor_caches(&mut self) {
        for id in self.all_leaves() {
            if let Some(leaf) = self.leaf_mut(id) {
                leaf.neighbors = None;
            }
        }
        self.topology_changed = true;
        debug!("Neighbor caches invalidated");
    }

    /// Clear cached links into `removed` from both sides
    pub(crate) fn clear_links_into(&mut self, removed: &HashSet<NodeId>) {
        let mut touched = Vec::new();
        for id in removed {
            if let Some(Some(links)) = self.leaf(*id).map(|l| l.neighbors) {
                touched.extend(links.into_iter().flatten());
            }
            if let Some(leaf) = self.leaf_mut(*id) {
                leaf.neighbors = None;
            }
        }
        for id in self.all_leaves() {
            let points_in = self
                .leaf(id)
                .and_then(|l| l.neighbors)
                .is_some_and(|links| links.iter().flatten().any(|n| removed.contains(n)));
            if points_in || touched.contains(&id) {
                if let Some(leaf) = self.leaf_mut(id) {
                    leaf.neighbors = None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TerrainConfig;

    #[test]
    fn test_transition_table() {
        use Quadrant::*;
        assert_eq!(Direction::Right.transition(UpperLeft), Transition::Sibling(UpperRight));
        assert_eq!(Direction::Right.transition(LowerRight), Transition::ParentNeighbor(LowerLeft));
        assert_eq!(Direction::Left.transition(LowerLeft), Transition::ParentNeighbor(LowerRight));
        assert_eq!(Direction::Bottom.transition(UpperLeft), Transition::Sibling(LowerLeft));
        assert_eq!(Direction::Bottom.transition(LowerRight), Transition::ParentNeighbor(UpperRight));
        assert_eq!(Direction::Top.transition(UpperRight), Transition::ParentNeighbor(LowerRight));
    }

    #[test]
    fn test_transition_is_reversible() {
        // Stepping one way then back lands on the starting quadrant
        for direction in Direction::ALL {
            for q in Quadrant::ALL {
                let there = match direction.transition(q) {
                    Transition::Sibling(t) | Transition::ParentNeighbor(t) => t,
                };
                let back = match direction.opposite().transition(there) {
                    Transition::Sibling(t) | Transition::ParentNeighbor(t) => t,
                };
                assert_eq!(back, q, "{direction:?} from {q:?}");
            }
        }
    }

    #[test]
    fn test_siblings_in_129() {
        let mut terrain = Terrain::new(TerrainConfig::new(129, 65), None).unwrap();
        let root = terrain.tile(terrain.primary_tile()).unwrap().root();
        let [p1, p2, p3, p4] = terrain.children(root).unwrap();

        assert_eq!(terrain.patch_neighbor(p1, Direction::Right), Some(p3));
        assert_eq!(terrain.patch_neighbor(p1, Direction::Bottom), Some(p2));
        assert_eq!(terrain.patch_neighbor(p4, Direction::Left), Some(p2));
        assert_eq!(terrain.patch_neighbor(p4, Direction::Top), Some(p3));
        assert_eq!(terrain.patch_neighbor(p1, Direction::Left), None);
        assert_eq!(terrain.patch_neighbor(p1, Direction::Top), None);

        assert_eq!(terrain.diagonal_neighbor(p1, Direction::Bottom, Direction::Right), Some(p4));
        assert_eq!(terrain.diagonal_neighbor(p4, Direction::Left, Direction::Top), Some(p1));
        assert_eq!(terrain.diagonal_neighbor(p2, Direction::Bottom, Direction::Right), None);

        let ring = terrain.neighbor_ring(p1);
        assert_eq!(ring.at(1, 1), Some(p4));
        assert_eq!(ring.at(-1, -1), None);
        assert_eq!(ring.iter().count(), 4);
    }

    #[test]
    fn test_cross_parent_lookup() {
        let mut terrain = Terrain::new(TerrainConfig::new(257, 65), None).unwrap();
        let root = terrain.tile(terrain.primary_tile()).unwrap().root();
        let [q1, q2, q3, _] = terrain.children(root).unwrap();
        let q1_children = terrain.children(q1).unwrap();
        let q3_children = terrain.children(q3).unwrap();
        let q2_children = terrain.children(q2).unwrap();

        // Upper-right leaf of q1 sits left of the upper-left leaf of q3
        assert_eq!(
            terrain.patch_neighbor(q1_children[Quadrant::UpperRight.slot()], Direction::Right),
            Some(q3_children[Quadrant::UpperLeft.slot()])
        );
        assert_eq!(
            terrain.patch_neighbor(q1_children[Quadrant::LowerRight.slot()], Direction::Right),
            Some(q3_children[Quadrant::LowerLeft.slot()])
        );
        assert_eq!(
            terrain.patch_neighbor(q1_children[Quadrant::LowerLeft.slot()], Direction::Bottom),
            Some(q2_children[Quadrant::UpperLeft.slot()])
        );
        assert_eq!(terrain.find_neighbor(q1, Direction::Right), Some(q3));
        assert_eq!(terrain.find_neighbor(q1, Direction::Left), None);
    }

    #[test]
    fn test_symmetry_513() {
        let mut terrain = Terrain::new(TerrainConfig::new(513, 65), None).unwrap();
        let mut edges = 0;
        for leaf in terrain.all_leaves() {
            for direction in Direction::ALL {
                if let Some(other) = terrain.patch_neighbor(leaf, direction) {
                    assert_eq!(terrain.patch_neighbor(other, direction.opposite()), Some(leaf));
                    edges += 1;
                }
            }
        }
        // 8x8 grid of leaves: 2 * 8 * 7 shared edges, each seen from both sides
        assert_eq!(edges, 2 * 2 * 8 * 7);
    }

    #[test]
    fn test_neighbors_are_geometrically_adjacent() {
        let mut terrain = Terrain::new(TerrainConfig::new(257, 33), None).unwrap();
        for leaf in terrain.all_leaves() {
            let origin = terrain.node(leaf).unwrap().origin();
            let span = terrain.node(leaf).unwrap().size() - 1;
            for direction in Direction::ALL {
                let Some(other) = terrain.patch_neighbor(leaf, direction) else {
                    continue;
                };
                let other_origin = terrain.node(other).unwrap().origin().as_ivec2();
                let step = direction.grid_offset() * span as i32;
                assert_eq!(other_origin, origin.as_ivec2() + step);
            }
        }
    }

    #[test]
    fn test_cache_and_invalidate() {
        let mut terrain = Terrain::new(TerrainConfig::new(129, 65), None).unwrap();
        let leaf = terrain.all_leaves()[0];
        assert!(!terrain.leaf(leaf).unwrap().neighbors_searched());
        terrain.patch_neighbors(leaf);
        assert!(terrain.leaf(leaf).unwrap().neighbors_searched());
        terrain.invalidate_neighbor_caches();
        assert!(!terrain.leaf(leaf).unwrap().neighbors_searched());
    }

    #[test]
    fn test_self_returning_finder_is_ignored() {
        let mut terrain = Terrain::new(TerrainConfig::new(129, 65), None).unwrap();
        terrain.set_neighbor_finder(Some(Box::new(|tile: TileId, _: Direction| Some(tile))));
        let root = terrain.tile(terrain.primary_tile()).unwrap().root();
        let [p1, ..] = terrain.children(root).unwrap();
        assert_eq!(terrain.find_neighbor(root, Direction::Left), None);
        assert_eq!(terrain.patch_neighbor(p1, Direction::Left), None);
    }
}
