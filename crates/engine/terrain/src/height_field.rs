//! Per-leaf height sample storage
//!
//! Samples are stored row-major (`z * size + x`), one `f32` per sample.

use crate::error::{Result, TerrainError};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// How an edit combines with the existing height
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EditMode {
    /// Replace the sample with the given height
    Override,
    /// Add the given delta to the sample
    Adjust,
}

/// Square grid of height samples
#[derive(Debug, Clone, PartialEq)]
pub struct HeightField {
    size: u32,
    samples: Vec<f32>,
}

impl HeightField {
    /// Create a flat field of the given edge length
    pub fn flat(size: u32) -> Self {
        Self {
            size,
            samples: vec![0.0; (size * size) as usize],
        }
    }

    /// Wrap `size * size` samples
    pub fn new(size: u32, samples: Vec<f32>) -> Result<Self> {
        if samples.len() != (size as usize) * (size as usize) {
            return Err(TerrainError::NonSquareHeightMap(samples.len()));
        }
        Ok(Self { size, samples })
    }

    /// Adopt an arbitrary square array as a field of edge length `size`
    ///
    /// Arrays with a different edge length are cropped or zero-filled from
    /// the top-left corner.
    pub fn from_samples(size: u32, samples: &[f32]) -> Result<Self> {
        let side = square_side(samples.len())?;
        if side == size {
            return Ok(Self {
                size,
                samples: samples.to_vec(),
            });
        }
        warn!(
            "Height map edge length {} does not match terrain size {}",
            side, size
        );
        Ok(sub_block(samples, 0, 0, size))
    }

    #[inline]
    pub fn size(&self) -> u32 {
        self.size
    }

    #[inline]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    #[inline]
    fn index(&self, x: u32, z: u32) -> Option<usize> {
        if x < self.size && z < self.size {
            Some((z * self.size + x) as usize)
        } else {
            None
        }
    }

    fn out_of_range(&self, x: u32, z: u32) -> TerrainError {
        TerrainError::OutOfRange {
            x: x as i64,
            z: z as i64,
            size: self.size,
        }
    }

    /// Height at `(x, z)`, or `None` outside `[0, size)`
    #[inline]
    pub fn get(&self, x: u32, z: u32) -> Option<f32> {
        self.index(x, z).map(|i| self.samples[i])
    }

    /// Height at a signed coordinate, used by stencils that step past the border
    #[inline]
    pub fn get_signed(&self, x: i64, z: i64) -> Option<f32> {
        if x < 0 || z < 0 {
            return None;
        }
        self.get(x as u32, z as u32)
    }

    pub fn set(&mut self, x: u32, z: u32, height: f32) -> Result<()> {
        let i = self.index(x, z).ok_or_else(|| self.out_of_range(x, z))?;
        self.samples[i] = height;
        Ok(())
    }

    pub fn adjust(&mut self, x: u32, z: u32, delta: f32) -> Result<()> {
        let i = self.index(x, z).ok_or_else(|| self.out_of_range(x, z))?;
        self.samples[i] += delta;
        Ok(())
    }

    /// Apply an edit and return the resulting height
    pub fn apply(&mut self, x: u32, z: u32, value: f32, mode: EditMode) -> Result<f32> {
        match mode {
            EditMode::Override => self.set(x, z, value)?,
            EditMode::Adjust => self.adjust(x, z, value)?,
        }
        Ok(self.samples[(z * self.size + x) as usize])
    }

    /// Copy a `side x side` block starting at `(x, z)`, zero-filling past the border
    pub fn sub_block(&self, x: u32, z: u32, side: u32) -> HeightField {
        sub_block(&self.samples, x, z, side)
    }

    /// Lowest and highest sample
    pub fn min_max(&self) -> (f32, f32) {
        self.samples
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), &h| (lo.min(h), hi.max(h)))
    }

    /// Height at a fractional coordinate
    ///
    /// Each cell is split along the diagonal from `(x+1, z)` to `(x, z+1)`,
    /// matching the triangles of the full-detail mesh.
    pub fn interpolate(&self, fx: f32, fz: f32) -> Option<f32> {
        let max = (self.size - 1) as f32;
        if !(0.0..=max).contains(&fx) || !(0.0..=max).contains(&fz) {
            return None;
        }
        let x0 = (fx.floor() as u32).min(self.size - 2);
        let z0 = (fz.floor() as u32).min(self.size - 2);
        let dx = fx - x0 as f32;
        let dz = fz - z0 as f32;

        let h00 = self.get(x0, z0)?;
        let h10 = self.get(x0 + 1, z0)?;
        let h01 = self.get(x0, z0 + 1)?;
        let h11 = self.get(x0 + 1, z0 + 1)?;

        if dx + dz <= 1.0 {
            Some(h00 + dx * (h10 - h00) + dz * (h01 - h00))
        } else {
            Some(h11 + (1.0 - dx) * (h01 - h11) + (1.0 - dz) * (h10 - h11))
        }
    }
}

/// Edge length of a square sample array
pub fn square_side(len: usize) -> Result<u32> {
    let side = (len as f64).sqrt().round() as usize;
    if side * side != len || side == 0 {
        return Err(TerrainError::NonSquareHeightMap(len));
    }
    Ok(side as u32)
}

/// Copy a `side x side` block out of a square array
///
/// The source edge length is taken from the square root of its length.
/// Indices past the source's border read as zero.
pub fn sub_block(source: &[f32], x: u32, z: u32, side: u32) -> HeightField {
    let source_side = (source.len() as f64).sqrt() as u32;
    let mut samples = Vec::with_capacity((side * side) as usize);
    for row in z..z + side {
        for col in x..x + side {
            let value = if row < source_side && col < source_side {
                source[(row * source_side + col) as usize]
            } else {
                0.0
            };
            samples.push(value);
        }
    }
    HeightField {
        size: side,
        samples,
    }
}
