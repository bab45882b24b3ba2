//! Geomipmapped height-field terrain
//!
//! A terrain tile is a square height field of `2^k + 1` samples split into a
//! quadtree whose leaves are independently renderable mesh patches. Each
//! patch picks its own level of detail; adjoining patches negotiate so that
//! their shared edges stay watertight and their normals continuous.
//!
//! # Architecture
//!
//! - [`Terrain`] owns every tile, a single node arena and the injected
//!   collaborators ([`MeshGenerator`], [`LodDecider`], [`CollisionProbe`],
//!   [`NeighborFinder`])
//! - nodes refer to each other by [`NodeId`]; a leaf carries a [`LeafPatch`]
//!   with its [`HeightField`], [`PatchMesh`] and [`LodState`]
//! - [`Terrain::update`] drains queued edits, runs the LOD pass and flushes
//!   the normal dirty region
//!
//! # Example
//!
//! ```
//! use terrain::{Terrain, TerrainConfig};
//! use glam::{Vec2, Vec3};
//!
//! let mut terrain = Terrain::new(TerrainConfig::new(129, 65), None).unwrap();
//! terrain.set_height(Vec2::new(0.0, 0.0), 4.0);
//! let report = terrain.update(&[Vec3::new(0.0, 10.0, 0.0)]);
//! assert_eq!(report.normals_recomputed, 4);
//! assert_eq!(terrain.heightmap_height(Vec2::ZERO), Some(4.0));
//! ```

pub mod bounds;
pub mod collision;
pub mod config;
pub mod edit;
pub mod error;
pub mod height_field;
pub mod lod;
pub mod mesh;
pub mod neighbor;
pub mod normals;
pub mod patch;
pub mod quadrant;
mod terrain;
pub mod tile;
pub mod tree;

pub use bounds::{Aabb, Ray};
pub use collision::{CollisionProbe, RayHit, TriangleProbe};
pub use config::{LodConfig, TerrainConfig};
pub use edit::{HeightEdit, TerrainEditor};
pub use error::{Result, TerrainError};
pub use height_field::{EditMode, HeightField};
pub use lod::{DistanceLodDecider, LodContext, LodDecider, LodDecision, LodPassReport, UpdatedPatch};
pub use mesh::{GeomipMeshGenerator, MeshGenerator, PatchMesh};
pub use neighbor::{Direction, NeighborFinder, NeighborRing};
pub use normals::average_normal;
pub use patch::{LeafPatch, LodState, NeighborLods};
pub use quadrant::{find_quadrant, to_local, Quadrant, QuadrantMask};
pub use terrain::{Terrain, TerrainBuilder, UpdateReport};
pub use tile::{Tile, TileGrid, TileId, Transform};
pub use tree::{Node, NodeArena, NodeId, NodeKind};

// Re-export for convenience
pub use glam;
