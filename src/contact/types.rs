//! Contact data types

use crate::mesh::types::{ElementId, Point, Vec3};
use serde::{Deserialize, Serialize};

/// Gap reported for "no contact", outside any physical overlap range
pub const NO_CONTACT_GAP: f64 = 1.0;

/// Feature of an element that a contact point lies on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContactFeature {
    Face,
    /// Edge from node k to node k + 1
    Edge(usize),
    /// Node k
    Corner(usize),
}

/// Closest point of an element to a sphere
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphereContact {
    /// Distance from the sphere surface to the element (+ for gap, - for overlap)
    pub gap: f64,

    /// Closest point on the element
    pub contact_point: Point,

    /// Vector from the sphere center to the contact point
    pub delta: Vec3,

    pub feature: ContactFeature,

    /// Barycentric coordinates of the contact point
    pub bary: [f64; 3],
}

impl SphereContact {
    pub fn is_overlapping(&self) -> bool {
        self.gap < 0.0
    }
}

/// Gap of a resolution result, [`NO_CONTACT_GAP`] when there is none
pub fn gap_or_sentinel(contact: &Option<SphereContact>) -> f64 {
    contact.as_ref().map_or(NO_CONTACT_GAP, |c| c.gap)
}

/// An overlapping particle-wall contact handed to the force law
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WallContact {
    pub element: ElementId,
    pub gap: f64,
    pub contact_point: Point,
    pub delta: Vec3,
    pub feature: ContactFeature,
}
