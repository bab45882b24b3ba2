//! Error types for the terrain crate

use crate::tile::TileId;
use thiserror::Error;

/// Result type alias for terrain operations
pub type Result<T> = std::result::Result<T, TerrainError>;

/// Errors that can occur while building or editing a terrain
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TerrainError {
    /// Sample coordinate outside the `[0, size)` range of a height field
    #[error("Sample ({x}, {z}) is outside the {size}x{size} height field")]
    OutOfRange { x: i64, z: i64, size: u32 },

    /// Edge length that is not of the form `2^k + 1`
    #[error("Terrain size {0} is not of the form 2^k + 1 (minimum 9)")]
    InvalidSize(u32),

    /// Patch size that cannot produce valid leaves
    #[error("Patch size {0} is not of the form 2^k + 1 (minimum 5)")]
    InvalidPatchSize(u32),

    /// Height samples that do not form a square grid
    #[error("Height map of {0} samples is not square")]
    NonSquareHeightMap(usize),

    /// Tile id that is not part of this terrain
    #[error("Unknown tile: {0:?}")]
    UnknownTile(TileId),

    /// Tile whose dimensions do not match the terrain it joins
    #[error("Incompatible tile: {0}")]
    IncompatibleTile(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl TerrainError {
    /// Whether the error comes from a caller-supplied coordinate or id
    /// and leaves the terrain untouched.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TerrainError::OutOfRange { .. } | TerrainError::UnknownTile(_)
        )
    }
}
