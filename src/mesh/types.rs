//! Core mesh data types

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 3D point type
pub type Point = Point3<f64>;

/// 3D vector type
pub type Vec3 = Vector3<f64>;

/// Mesh-wide element identifier
///
/// Stable under migration and ghost replication, unlike the process-local
/// array index of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ElementId(pub u64);

impl ElementId {
    /// Largest id that exchange buffers of f64 words represent exactly
    pub const MAX_PACKED: u64 = 1 << 53;
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ElementId {
    fn from(id: u64) -> Self {
        ElementId(id)
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub lo: Point,
    pub hi: Point,
}

impl BoundingBox {
    /// An empty box that any point extends
    pub fn empty() -> Self {
        Self {
            lo: Point::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            hi: Point::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    pub fn new(lo: Point, hi: Point) -> Self {
        Self { lo, hi }
    }

    pub fn reset(&mut self) {
        *self = Self::empty();
    }

    pub fn is_empty(&self) -> bool {
        (0..3).any(|k| self.lo[k] > self.hi[k])
    }

    pub fn extend_to_contain(&mut self, p: &Point) {
        for k in 0..3 {
            self.lo[k] = self.lo[k].min(p[k]);
            self.hi[k] = self.hi[k].max(p[k]);
        }
    }

    pub fn merge(&mut self, other: &BoundingBox) {
        if other.is_empty() {
            return;
        }
        self.extend_to_contain(&other.lo);
        self.extend_to_contain(&other.hi);
    }

    /// Half-open containment, matching subdomain ownership of points
    pub fn contains(&self, p: &Point) -> bool {
        (0..3).all(|k| p[k] >= self.lo[k] && p[k] < self.hi[k])
    }

    /// Box grown by `margin` in every direction
    pub fn expanded(&self, margin: f64) -> Self {
        let m = Vec3::new(margin, margin, margin);
        Self {
            lo: self.lo - m,
            hi: self.hi + m,
        }
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::empty()
    }
}

/// Spatial region owned by this process
pub trait Subdomain {
    /// Whether `p` lies in this process's subdomain
    fn contains(&self, p: &Point) -> bool;
}

impl Subdomain for BoundingBox {
    fn contains(&self, p: &Point) -> bool {
        BoundingBox::contains(self, p)
    }
}
