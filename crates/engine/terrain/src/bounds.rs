//! Axis-aligned boxes and rays in terrain space

use crate::tile::Transform;
use glam::Vec3;

/// Axis-Aligned Bounding Box
///
/// Used for node bounds, the normal dirty region and collision queries.
/// Intersection tests are inclusive, so boxes that only touch intersect.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    /// Minimum corner of the bounding box
    pub min: Vec3,
    /// Maximum corner of the bounding box
    pub max: Vec3,
}

impl Aabb {
    /// Create a new AABB from min and max corners
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_center_half_extents(center: Vec3, half_extents: Vec3) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    /// Map a local box through a translation and per-axis scale
    ///
    /// Negative scale factors swap the corners on that axis.
    pub fn transformed(&self, transform: &Transform) -> Self {
        let a = transform.apply(self.min);
        let b = transform.apply(self.max);
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Test intersection with another AABB
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Calculate the center point of the AABB
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Calculate the size (extents) of the AABB
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Check if a point is inside the AABB
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
            && point.z >= self.min.z
            && point.z <= self.max.z
    }

    /// Create an AABB that encompasses both AABBs
    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Entry and exit distances of a ray through this box (slab method)
    ///
    /// Returns `None` when the ray misses or the box lies behind the origin.
    pub fn ray_interval(&self, ray: &Ray) -> Option<(f32, f32)> {
        let inv = |d: f32| if d.abs() < 1e-8 { 1e8 } else { 1.0 / d };
        let inv_dir = Vec3::new(inv(ray.direction.x), inv(ray.direction.y), inv(ray.direction.z));

        let t_min = (self.min - ray.origin) * inv_dir;
        let t_max = (self.max - ray.origin) * inv_dir;
        let t1 = t_min.min(t_max);
        let t2 = t_min.max(t_max);

        let t_near = t1.x.max(t1.y).max(t1.z);
        let t_far = t2.x.min(t2.y).min(t2.z);

        if t_far >= t_near && t_far >= 0.0 {
            Some((t_near.max(0.0), t_far))
        } else {
            None
        }
    }
}

/// Ray with an optional length limit
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    /// Normalized direction
    pub direction: Vec3,
    /// Hits farther than this are ignored
    pub limit: f32,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
            limit: f32::INFINITY,
        }
    }

    pub fn with_limit(mut self, limit: f32) -> Self {
        self.limit = limit;
        self
    }

    #[inline]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}
