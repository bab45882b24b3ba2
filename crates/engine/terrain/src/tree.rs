//! Quadtree arena, recursive construction and point routing
//!
//! Nodes of every tile live in a single push-only arena addressed by
//! [`NodeId`]. Parent, child and neighbor links are plain ids, never owning
//! references, so detaching a tile is a matter of emptying its slots and
//! sweeping the neighbor caches that pointed at them. Slots are never
//! reused, which keeps a stale id from silently aliasing a newer node.

use crate::bounds::Aabb;
use crate::height_field::HeightField;
use crate::patch::LeafPatch;
use crate::quadrant::{find_quadrant, split_of, to_local, Quadrant};
use crate::terrain::Terrain;
use crate::tile::TileId;
use glam::{UVec2, Vec2, Vec3};

/// Stable handle to a node in the terrain arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Internal node or leaf patch
#[derive(Debug)]
pub enum NodeKind {
    /// Four children ordered by quadrant index
    Internal { children: [NodeId; 4] },
    Leaf(Box<LeafPatch>),
}

/// One quadtree node
#[derive(Debug)]
pub struct Node {
    pub(crate) tile: TileId,
    pub(crate) parent: Option<NodeId>,
    /// `None` for a tile root
    pub(crate) quadrant: Option<Quadrant>,
    pub(crate) size: u32,
    /// Tile sample coordinate of this node's `(0, 0)`
    pub(crate) origin: UVec2,
    pub(crate) offset: Vec2,
    pub(crate) offset_amount: f32,
    pub(crate) kind: NodeKind,
}

impl Node {
    pub fn tile(&self) -> TileId {
        self.tile
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn quadrant(&self) -> Option<Quadrant> {
        self.quadrant
    }

    /// Quadrant index, 0 for a root
    pub fn quadrant_index(&self) -> u8 {
        self.quadrant.map_or(0, Quadrant::index)
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn origin(&self) -> UVec2 {
        self.origin
    }

    /// Texture offset accumulated from the ancestors
    pub fn offset(&self) -> Vec2 {
        self.offset
    }

    pub fn offset_amount(&self) -> f32 {
        self.offset_amount
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf(_))
    }

    pub fn as_leaf(&self) -> Option<&LeafPatch> {
        match &self.kind {
            NodeKind::Leaf(leaf) => Some(leaf),
            NodeKind::Internal { .. } => None,
        }
    }

    pub fn as_leaf_mut(&mut self) -> Option<&mut LeafPatch> {
        match &mut self.kind {
            NodeKind::Leaf(leaf) => Some(leaf),
            NodeKind::Internal { .. } => None,
        }
    }

    pub fn children(&self) -> Option<&[NodeId; 4]> {
        match &self.kind {
            NodeKind::Internal { children } => Some(children),
            NodeKind::Leaf(_) => None,
        }
    }

    pub fn child(&self, quadrant: Quadrant) -> Option<NodeId> {
        self.children().map(|c| c[quadrant.slot()])
    }
}

/// Push-only storage for nodes of every tile
#[derive(Debug, Default)]
pub struct NodeArena {
    slots: Vec<Option<Node>>,
    live: usize,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots.get(id.index()).and_then(Option::as_ref)
    }

    #[inline]
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots.get_mut(id.index()).and_then(Option::as_mut)
    }

    /// Allocate an empty slot to be filled once the node's children exist
    fn reserve(&mut self) -> NodeId {
        let id = NodeId(self.slots.len() as u32);
        self.slots.push(None);
        id
    }

    fn fill(&mut self, id: NodeId, node: Node) {
        if let Some(slot) = self.slots.get_mut(id.index()) {
            if slot.replace(node).is_none() {
                self.live += 1;
            }
        }
    }

    pub(crate) fn remove(&mut self, id: NodeId) -> Option<Node> {
        let node = self.slots.get_mut(id.index())?.take();
        if node.is_some() {
            self.live -= 1;
        }
        node
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }
}

/// Values constant across one tile's construction
pub(crate) struct BuildContext {
    pub tile: TileId,
    pub patch_size: u32,
    pub step_scale: Vec3,
    pub half_span: f32,
}

impl Terrain {
    /// Recursively build a subtree from `block`
    ///
    /// A node whose halves fit in a patch gets four leaves; anything larger
    /// gets four internal children of size `(size >> 1) + 1`.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn build_node(
        &mut self,
        ctx: &BuildContext,
        block: &HeightField,
        parent: Option<NodeId>,
        quadrant: Option<Quadrant>,
        origin: UVec2,
        offset: Vec2,
        offset_amount: f32,
    ) -> NodeId {
        let id = self.nodes.reserve();
        let size = block.size();
        let split = split_of(size);
        let quarter = (size >> 2) as f32;
        let child_amount = offset_amount + quarter;
        let makes_leaves = (size >> 1) + 1 <= ctx.patch_size;

        let mut children = [id; 4];
        for q in Quadrant::ALL {
            let (ox, oz) = q.origin(split);
            let sub = block.sub_block(ox, oz, split);
            let (dx, dz) = q.direction();
            let child_offset = offset
                + Vec2::new(dx * quarter * ctx.step_scale.x, dz * quarter * ctx.step_scale.z);
            let child_origin = origin + UVec2::new(ox, oz);

            children[q.slot()] = if makes_leaves {
                self.build_leaf(ctx, sub, id, q, child_origin, child_offset, child_amount)
            } else {
                self.build_node(
                    ctx,
                    &sub,
                    Some(id),
                    Some(q),
                    child_origin,
                    child_offset,
                    child_amount,
                )
            };
        }

        self.nodes.fill(
            id,
            Node {
                tile: ctx.tile,
                parent,
                quadrant,
                size,
                origin,
                offset,
                offset_amount,
                kind: NodeKind::Internal { children },
            },
        );
        id
    }

    #[allow(clippy::too_many_arguments)]
    fn build_leaf(
        &mut self,
        ctx: &BuildContext,
        heights: HeightField,
        parent: NodeId,
        quadrant: Quadrant,
        origin: UVec2,
        offset: Vec2,
        offset_amount: f32,
    ) -> NodeId {
        let id = self.nodes.reserve();
        let size = heights.size();
        let local_origin = Vec3::new(
            (origin.x as f32 - ctx.half_span) * ctx.step_scale.x,
            0.0,
            (origin.y as f32 - ctx.half_span) * ctx.step_scale.z,
        );
        let leaf = LeafPatch::new(
            heights,
            local_origin,
            ctx.step_scale,
            self.mesh_generator.as_ref(),
        );
        self.nodes.fill(
            id,
            Node {
                tile: ctx.tile,
                parent: Some(parent),
                quadrant: Some(quadrant),
                size,
                origin,
                offset,
                offset_amount,
                kind: NodeKind::Leaf(Box::new(leaf)),
            },
        );
        id
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn leaf(&self, id: NodeId) -> Option<&LeafPatch> {
        self.nodes.get(id).and_then(Node::as_leaf)
    }

    pub(crate) fn leaf_mut(&mut self, id: NodeId) -> Option<&mut LeafPatch> {
        self.nodes.get_mut(id).and_then(Node::as_leaf_mut)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id).and_then(Node::parent)
    }

    pub fn children(&self, id: NodeId) -> Option<[NodeId; 4]> {
        self.nodes.get(id).and_then(Node::children).copied()
    }

    /// Live nodes across all tiles
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Every node of a subtree, parents before children
    pub(crate) fn subtree(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            out.push(id);
            if let Some(children) = node.children() {
                stack.extend(children.iter().rev());
            }
        }
        out
    }

    /// Leaves of one tile in depth-first quadrant order
    pub fn leaves(&self, tile: TileId) -> Vec<NodeId> {
        let Some(root) = self.tiles.get(&tile).map(|t| t.root) else {
            return Vec::new();
        };
        self.subtree(root)
            .into_iter()
            .filter(|id| self.nodes.get(*id).is_some_and(Node::is_leaf))
            .collect()
    }

    /// Leaves of every tile, ordered by tile then depth-first
    pub fn all_leaves(&self) -> Vec<NodeId> {
        self.tiles.keys().flat_map(|t| self.leaves(*t)).collect()
    }

    pub fn leaf_count(&self) -> usize {
        self.all_leaves().len()
    }

    /// Route a tile sample coordinate down to every leaf holding it
    ///
    /// Returns `(leaf, col, row)` for each match; shared edge samples match
    /// two leaves and shared corners up to four.
    pub fn locate(&self, tile: TileId, x: u32, z: u32) -> Vec<(NodeId, u32, u32)> {
        let mut out = Vec::new();
        if let Some(t) = self.tiles.get(&tile) {
            self.route(t.root, x, z, &mut out);
        }
        out
    }

    fn route(&self, id: NodeId, x: u32, z: u32, out: &mut Vec<(NodeId, u32, u32)>) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        match &node.kind {
            NodeKind::Leaf(_) => {
                if x < node.size && z < node.size {
                    out.push((id, x, z));
                }
            }
            NodeKind::Internal { children } => {
                let split = split_of(node.size);
                for q in find_quadrant(x, z, node.size).iter() {
                    let (col, row) = to_local(x, z, q, split);
                    self.route(children[q.slot()], col, row, out);
                }
            }
        }
    }

    /// Raw height sample at a tile coordinate
    pub fn height_at_sample(&self, tile: TileId, x: u32, z: u32) -> Option<f32> {
        self.locate(tile, x, z)
            .into_iter()
            .find_map(|(leaf, col, row)| self.leaf(leaf)?.heights().get(col, row))
    }

    /// Reassemble the full `total_size^2` height array of a tile
    pub fn height_map(&self, tile: TileId) -> Option<Vec<f32>> {
        let total = self.tiles.get(&tile)?.total_size;
        let mut out = vec![0.0; (total * total) as usize];
        for id in self.leaves(tile) {
            let (Some(node), Some(leaf)) = (self.nodes.get(id), self.leaf(id)) else {
                continue;
            };
            let size = leaf.size();
            for row in 0..size {
                for col in 0..size {
                    let gx = node.origin.x + col;
                    let gz = node.origin.y + row;
                    if let Some(h) = leaf.heights().get(col, row) {
                        out[(gz * total + gx) as usize] = h;
                    }
                }
            }
        }
        Some(out)
    }

    /// Tile-local bound of a node, unioned over its subtree
    pub fn local_bound(&self, id: NodeId) -> Option<Aabb> {
        let node = self.nodes.get(id)?;
        match &node.kind {
            NodeKind::Leaf(leaf) => Some(leaf.local_bound()),
            NodeKind::Internal { children } => children
                .iter()
                .filter_map(|c| self.local_bound(*c))
                .reduce(|a, b| a.union(&b)),
        }
    }

    /// World bound of a node through its tile's transform
    pub fn world_bound(&self, id: NodeId) -> Option<Aabb> {
        let tile = self.tiles.get(&self.nodes.get(id)?.tile)?;
        Some(self.local_bound(id)?.transformed(&tile.transform))
    }
}

#[cfg(test)]
mod tests {
    use crate::config::TerrainConfig;
    use crate::quadrant::Quadrant;
    use crate::terrain::Terrain;

    fn ramp(size: u32) -> Vec<f32> {
        (0..size * size).map(|i| (i % size + i / size) as f32).collect()
    }

    #[test]
    fn test_structure_129_65() {
        let terrain = Terrain::new(TerrainConfig::new(129, 65), None).unwrap();
        let tile = terrain.primary_tile();
        let root = terrain.tile(tile).unwrap().root();
        let root_node = terrain.node(root).unwrap();

        assert_eq!(root_node.quadrant_index(), 0);
        assert_eq!(root_node.size(), 129);
        assert_eq!(terrain.leaf_count(), 4);
        assert_eq!(terrain.node_count(), 5);

        let children = terrain.children(root).unwrap();
        for q in Quadrant::ALL {
            let child = terrain.node(children[q.slot()]).unwrap();
            assert!(child.is_leaf());
            assert_eq!(child.quadrant(), Some(q));
            assert_eq!(child.size(), 65);
            assert_eq!(child.parent(), Some(root));
        }
    }

    #[test]
    fn test_structure_513_65() {
        let terrain = Terrain::new(TerrainConfig::new(513, 65), None).unwrap();
        // 1 + 4 + 16 internal nodes, 64 leaves
        assert_eq!(terrain.leaf_count(), 64);
        assert_eq!(terrain.node_count(), 85);
        for id in terrain.all_leaves() {
            assert_eq!(terrain.leaf(id).unwrap().size(), 65);
        }
    }

    #[test]
    fn test_leaf_origins_follow_quadrants() {
        let terrain = Terrain::new(TerrainConfig::new(129, 65), None).unwrap();
        let root = terrain.tile(terrain.primary_tile()).unwrap().root();
        let children = terrain.children(root).unwrap();
        let origin = |q: Quadrant| terrain.node(children[q.slot()]).unwrap().origin();
        assert_eq!(origin(Quadrant::UpperLeft).to_array(), [0, 0]);
        assert_eq!(origin(Quadrant::LowerLeft).to_array(), [0, 64]);
        assert_eq!(origin(Quadrant::UpperRight).to_array(), [64, 0]);
        assert_eq!(origin(Quadrant::LowerRight).to_array(), [64, 64]);

        // World placement matches the quadrant: far x is +x, far z is +z
        let ul = terrain.world_bound(children[Quadrant::UpperLeft.slot()]).unwrap();
        let lr = terrain.world_bound(children[Quadrant::LowerRight.slot()]).unwrap();
        assert_eq!(ul.min.x, -64.0);
        assert_eq!(ul.max.x, 0.0);
        assert_eq!(lr.min.z, 0.0);
        assert_eq!(lr.max.z, 64.0);
    }

    #[test]
    fn test_offsets_accumulate() {
        let terrain = Terrain::new(TerrainConfig::new(257, 65), None).unwrap();
        let root = terrain.tile(terrain.primary_tile()).unwrap().root();
        let quad = terrain.children(root).unwrap()[Quadrant::LowerRight.slot()];
        let leaf = terrain.children(quad).unwrap()[Quadrant::UpperLeft.slot()];

        let quad_node = terrain.node(quad).unwrap();
        assert_eq!(quad_node.offset_amount(), 64.0);
        assert_eq!(quad_node.offset().to_array(), [64.0, 64.0]);

        let leaf_node = terrain.node(leaf).unwrap();
        assert_eq!(leaf_node.offset_amount(), 96.0);
        assert_eq!(leaf_node.offset().to_array(), [32.0, 32.0]);
    }

    #[test]
    fn test_height_map_round_trip() {
        let heights = ramp(129);
        let terrain = Terrain::new(TerrainConfig::new(129, 33), Some(&heights)).unwrap();
        let tile = terrain.primary_tile();
        assert_eq!(terrain.height_map(tile).unwrap(), heights);
        assert_eq!(terrain.height_at_sample(tile, 100, 7), Some(107.0));
        assert_eq!(terrain.height_at_sample(tile, 129, 0), None);
    }

    #[test]
    fn test_locate_shared_samples() {
        let terrain = Terrain::new(TerrainConfig::new(129, 65), None).unwrap();
        let tile = terrain.primary_tile();
        assert_eq!(terrain.locate(tile, 0, 0).len(), 1);
        assert_eq!(terrain.locate(tile, 64, 0).len(), 2);
        assert_eq!(terrain.locate(tile, 64, 64).len(), 4);
        assert!(terrain.locate(tile, 0, 129).is_empty());

        for (leaf, col, row) in terrain.locate(tile, 64, 64) {
            assert!(terrain.leaf(leaf).is_some());
            assert!(col == 0 || col == 64);
            assert!(row == 0 || row == 64);
        }
    }
}
