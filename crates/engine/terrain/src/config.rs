//! Terrain construction and LOD settings, loadable from TOML

use crate::error::{Result, TerrainError};
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Terrain construction and LOD settings
///
/// Usually embedded in a larger TOML document:
///
/// ```toml
/// total_size = 513
/// patch_size = 65
/// step_scale = [1.0, 1.0, 1.0]
///
/// [lod]
/// distance_multiplier = 2.7
/// max_neighbor_delta = 1
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerrainConfig {
    /// Edge length of one terrain tile in height samples (`2^k + 1`)
    #[serde(default = "default_total_size")]
    pub total_size: u32,
    /// Largest edge length a leaf patch may have (`2^k + 1`)
    #[serde(default = "default_patch_size")]
    pub patch_size: u32,
    /// World distance per height sample on each axis
    #[serde(default = "default_step_scale")]
    pub step_scale: Vec3,
    #[serde(default)]
    pub lod: LodConfig,
}

fn default_total_size() -> u32 {
    513
}

fn default_patch_size() -> u32 {
    65
}

fn default_step_scale() -> Vec3 {
    Vec3::ONE
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LodConfig {
    /// Distance bands of the default LOD decider, in multiples of the patch size
    #[serde(default = "default_distance_multiplier")]
    pub distance_multiplier: f32,
    /// Largest LOD difference allowed between two adjoining patches
    #[serde(default = "default_max_neighbor_delta")]
    pub max_neighbor_delta: u32,
}

fn default_distance_multiplier() -> f32 {
    2.7
}

fn default_max_neighbor_delta() -> u32 {
    1
}

impl Default for LodConfig {
    fn default() -> Self {
        Self {
            distance_multiplier: default_distance_multiplier(),
            max_neighbor_delta: default_max_neighbor_delta(),
        }
    }
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            total_size: default_total_size(),
            patch_size: default_patch_size(),
            step_scale: default_step_scale(),
            lod: LodConfig::default(),
        }
    }
}

/// True when `size - 1` is a power of two.
#[inline]
pub fn is_pow2_plus_one(size: u32) -> bool {
    size >= 2 && (size - 1).is_power_of_two()
}

impl TerrainConfig {
    pub fn new(total_size: u32, patch_size: u32) -> Self {
        Self {
            total_size,
            patch_size,
            ..Default::default()
        }
    }

    pub fn with_step_scale(mut self, step_scale: Vec3) -> Self {
        self.step_scale = step_scale;
        self
    }

    /// Check the size invariants before any tree is built
    pub fn validate(&self) -> Result<()> {
        if !is_pow2_plus_one(self.total_size) || self.total_size < 9 {
            return Err(TerrainError::InvalidSize(self.total_size));
        }
        if !is_pow2_plus_one(self.patch_size) || self.patch_size < 5 {
            return Err(TerrainError::InvalidPatchSize(self.patch_size));
        }
        if !(self.step_scale.x > 0.0 && self.step_scale.z > 0.0) {
            return Err(TerrainError::InvalidConfig(format!(
                "step scale must be positive on x and z, got {}",
                self.step_scale
            )));
        }
        if self.lod.max_neighbor_delta == 0 {
            return Err(TerrainError::InvalidConfig(
                "lod.max_neighbor_delta must be at least 1".to_string(),
            ));
        }
        if !(self.lod.distance_multiplier > 0.0) {
            return Err(TerrainError::InvalidConfig(format!(
                "lod.distance_multiplier must be positive, got {}",
                self.lod.distance_multiplier
            )));
        }
        Ok(())
    }

    /// Edge length of the leaves this configuration produces
    pub fn leaf_size(&self) -> u32 {
        let mut size = self.total_size;
        loop {
            let split = (size >> 1) + 1;
            if split <= self.patch_size {
                return split;
            }
            size = split;
        }
    }
}
