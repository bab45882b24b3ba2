//! Quadrant addressing for the terrain quadtree
//!
//! A node of edge length `size` splits at `split = (size + 1) / 2`. Its four
//! children each have edge length `split` and overlap by one sample along the
//! middle row and column, so a coordinate on that shared line belongs to two
//! (or, at the centre, all four) quadrants. Writes must reach every one of
//! them to keep shared edges identical.
//!
//! ```text
//!          x ->
//!   z   +-----+-----+
//!   |   |  1  |  3  |
//!   v   +-----+-----+
//!       |  2  |  4  |
//!       +-----+-----+
//! ```

use serde::{Deserialize, Serialize};

/// Child position within a parent node
///
/// 1 = upper-left (near x, near z), 2 = lower-left (near x, far z),
/// 3 = upper-right (far x, near z), 4 = lower-right (far x, far z).
/// The root of a tree has no quadrant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Quadrant {
    UpperLeft = 1,
    LowerLeft = 2,
    UpperRight = 3,
    LowerRight = 4,
}

impl Quadrant {
    pub const ALL: [Quadrant; 4] = [
        Quadrant::UpperLeft,
        Quadrant::LowerLeft,
        Quadrant::UpperRight,
        Quadrant::LowerRight,
    ];

    /// Quadrant index, 1..=4
    #[inline]
    pub fn index(self) -> u8 {
        self as u8
    }

    /// Position in a parent's child array, 0..=3
    #[inline]
    pub fn slot(self) -> usize {
        self as usize - 1
    }

    /// Mask bit: 1, 2, 4 or 8
    #[inline]
    pub fn bit(self) -> u8 {
        1 << (self as u8 - 1)
    }

    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            1 => Some(Quadrant::UpperLeft),
            2 => Some(Quadrant::LowerLeft),
            3 => Some(Quadrant::UpperRight),
            4 => Some(Quadrant::LowerRight),
            _ => None,
        }
    }

    /// Whether this quadrant covers the far half along x
    #[inline]
    pub fn is_far_x(self) -> bool {
        matches!(self, Quadrant::UpperRight | Quadrant::LowerRight)
    }

    /// Whether this quadrant covers the far half along z
    #[inline]
    pub fn is_far_z(self) -> bool {
        matches!(self, Quadrant::LowerLeft | Quadrant::LowerRight)
    }

    /// Sample offset of this quadrant's origin inside a parent that splits at `split`
    #[inline]
    pub fn origin(self, split: u32) -> (u32, u32) {
        let x = if self.is_far_x() { split - 1 } else { 0 };
        let z = if self.is_far_z() { split - 1 } else { 0 };
        (x, z)
    }

    /// Unit direction of this quadrant away from the parent centre, on (x, z)
    pub fn direction(self) -> (f32, f32) {
        let x = if self.is_far_x() { 1.0 } else { -1.0 };
        let z = if self.is_far_z() { 1.0 } else { -1.0 };
        (x, z)
    }
}

/// Set of quadrants containing a coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct QuadrantMask(u8);

impl QuadrantMask {
    pub const EMPTY: QuadrantMask = QuadrantMask(0);

    pub fn from_bits(bits: u8) -> Self {
        Self(bits & 0b1111)
    }

    #[inline]
    pub fn bits(self) -> u8 {
        self.0
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn contains(self, quadrant: Quadrant) -> bool {
        self.0 & quadrant.bit() != 0
    }

    #[inline]
    pub fn insert(&mut self, quadrant: Quadrant) {
        self.0 |= quadrant.bit();
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Quadrants in index order
    pub fn iter(self) -> impl Iterator<Item = Quadrant> {
        Quadrant::ALL.into_iter().filter(move |q| self.contains(*q))
    }
}

/// Split point of a node with edge length `size`
#[inline]
pub fn split_of(size: u32) -> u32 {
    (size + 1) >> 1
}

/// Find every quadrant of a `size`-wide node that contains `(x, z)`
///
/// Coordinates outside `[0, size)` produce an empty mask.
pub fn find_quadrant(x: u32, z: u32, size: u32) -> QuadrantMask {
    let mut mask = QuadrantMask::EMPTY;
    if x >= size || z >= size {
        return mask;
    }
    let split = split_of(size);
    if x < split && z < split {
        mask.insert(Quadrant::UpperLeft);
    }
    if x < split && z >= split - 1 {
        mask.insert(Quadrant::LowerLeft);
    }
    if x >= split - 1 && z < split {
        mask.insert(Quadrant::UpperRight);
    }
    if x >= split - 1 && z >= split - 1 {
        mask.insert(Quadrant::LowerRight);
    }
    mask
}

/// Convert parent coordinates into `(col, row)` inside the given child
///
/// The caller must only pass quadrants returned by [`find_quadrant`] for the
/// same coordinate.
#[inline]
pub fn to_local(x: u32, z: u32, quadrant: Quadrant, split: u32) -> (u32, u32) {
    let (ox, oz) = quadrant.origin(split);
    (x - ox, z - oz)
}
