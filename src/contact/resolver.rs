//! Sphere-triangle contact classification
//!
//! The projection of the sphere center onto the triangle plane is classified
//! by its in-plane distance to each edge line, measured in units of that
//! edge's length. Within the boundary epsilon of zero the point lies on the
//! edge, not outside it. Both elements sharing an edge see the same length
//! and the same distance, so a point on a seam is never missed by both of
//! them. Which of them reports it is decided by feature ownership from
//! neighbour building.

use crate::contact::types::{ContactFeature, SphereContact};
use crate::error::Result;
use crate::mesh::geometry::signed_distance_to_plane;
use crate::mesh::surface::{TopologyProvider, TriMesh};
use crate::mesh::types::{ElementId, Point};

/// Sphere contact queries against mesh elements
pub trait ContactResolver {
    /// Closest point of element `id` to the sphere, if it may touch it
    ///
    /// `None` when the sphere is farther than its radius from the element
    /// plane or when the closest feature belongs to another element.
    fn resolve(&self, id: ElementId, radius: f64, center: &Point)
        -> Result<Option<SphereContact>>;

    /// Cheap test whether a sphere grown by `skin` can reach element `i`
    fn prefilter(&self, i: usize, radius: f64, center: &Point, skin: f64) -> bool;
}

// Edge -> corner -> adjacent edge is the longest delegation chain
const MAX_DELEGATIONS: usize = 3;

/// In-plane position of a projected point relative to one triangle
///
/// Both arrays are indexed by node; entry `k` refers to the edge opposite
/// node `k`, which is edge `(k + 1) % 3`.
struct PlanePosition {
    bary: [f64; 3],
    /// Distance inside the opposite edge line over that edge's length
    offset: [f64; 3],
}

impl PlanePosition {
    /// Nodes whose opposite edge lies more than `eps` outside, as a bitmask
    fn outside(&self, eps: f64) -> u8 {
        mask(|k| self.offset[k] < -eps)
    }

    /// Nodes whose opposite edge passes within `eps`, as a bitmask
    fn on_seam(&self, eps: f64) -> u8 {
        mask(|k| self.offset[k].abs() <= eps)
    }

    fn dominant_node(&self) -> usize {
        (0..3)
            .max_by(|&a, &b| self.bary[a].total_cmp(&self.bary[b]))
            .unwrap_or(0)
    }
}

fn mask(test: impl Fn(usize) -> bool) -> u8 {
    (0..3).fold(0, |m, k| if test(k) { m | 1 << k } else { m })
}

impl TriMesh {
    fn plane_position(&self, i: usize, p: &Point) -> PlanePosition {
        let nodes = self.nodes(i);
        let edge_norm = self.edge_norm(i);
        let edge_len = self.edge_len(i);
        let twice_area = 2.0 * self.area(i);

        let mut position = PlanePosition {
            bary: [0.0; 3],
            offset: [0.0; 3],
        };
        for k in 0..3 {
            let e = (k + 1) % 3;
            let inward = -signed_distance_to_plane(p, &nodes[e], &edge_norm[e]);
            position.bary[k] = inward * edge_len[e] / twice_area;
            position.offset[k] = inward / edge_len[e];
        }
        position
    }

    /// Projection inside the triangle, possibly on a seam
    fn resolve_face(
        &self,
        i: usize,
        p: &Point,
        position: &PlanePosition,
    ) -> Option<(ContactFeature, Point)> {
        let seams = position.on_seam(self.config().boundary_epsilon);

        match seams.count_ones() {
            0 => Some((ContactFeature::Face, *p)),
            1 => {
                let edge = (seams.trailing_zeros() as usize + 1) % 3;
                let owned = self.edge_active(i)[edge]
                    || self.neighbours(i)[edge].map_or(true, |n| self.id(i) > n);
                owned.then_some((ContactFeature::Edge(edge), *p))
            }
            _ => {
                let node = position.dominant_node();
                self.corner_owner(i)[node].then_some((ContactFeature::Corner(node), *p))
            }
        }
    }

    /// Projection outside the triangle, starting from the feature its region suggests
    ///
    /// In obtuse triangles the closest point of an edge region may be a
    /// corner and that of a corner region an adjacent edge, so the start
    /// feature is refined before ownership is checked.
    fn resolve_edge_corner(
        &self,
        i: usize,
        p: &Point,
        start: ContactFeature,
    ) -> Option<(ContactFeature, Point)> {
        let nodes = self.nodes(i);
        let edge_vec = self.edge_vec(i);
        let edge_len = self.edge_len(i);

        let mut feature = start;
        for _ in 0..MAX_DELEGATIONS {
            match feature {
                ContactFeature::Edge(e) => {
                    let t = (p - nodes[e]).dot(&edge_vec[e]);
                    if t <= 0.0 {
                        feature = ContactFeature::Corner(e);
                    } else if t >= edge_len[e] {
                        feature = ContactFeature::Corner((e + 1) % 3);
                    } else {
                        return self.edge_active(i)[e]
                            .then(|| (feature, nodes[e] + edge_vec[e] * t));
                    }
                }
                ContactFeature::Corner(k) => {
                    let prev = (k + 2) % 3;
                    let along_next = (p - nodes[k]).dot(&edge_vec[k]);
                    let along_prev = (p - nodes[prev]).dot(&edge_vec[prev]);
                    if along_next > 0.0 && along_next < edge_len[k] {
                        feature = ContactFeature::Edge(k);
                    } else if along_prev > 0.0 && along_prev < edge_len[prev] {
                        feature = ContactFeature::Edge(prev);
                    } else {
                        return self.corner_active(i)[k].then_some((feature, nodes[k]));
                    }
                }
                ContactFeature::Face => return None,
            }
        }

        log::debug!(
            "Contact resolution on element {} did not settle, last feature {:?}",
            self.id(i),
            feature
        );
        None
    }
}

fn feature_bary(feature: ContactFeature, bary_face: [f64; 3], t_edge: Option<f64>) -> [f64; 3] {
    match feature {
        ContactFeature::Face => bary_face,
        ContactFeature::Edge(e) => {
            let mut b = [0.0; 3];
            let s = t_edge.unwrap_or(0.5);
            b[e] = 1.0 - s;
            b[(e + 1) % 3] = s;
            b
        }
        ContactFeature::Corner(k) => {
            let mut b = [0.0; 3];
            b[k] = 1.0;
            b
        }
    }
}

impl ContactResolver for TriMesh {
    fn resolve(
        &self,
        id: ElementId,
        radius: f64,
        center: &Point,
    ) -> Result<Option<SphereContact>> {
        let i = self.element_index(id)?;
        let normal = self.face_norm(i);
        let d_norm = signed_distance_to_plane(center, &self.nodes(i)[0], normal);

        if radius > 0.0 && d_norm.abs() > radius {
            return Ok(None);
        }

        let projected = Point::from(center.coords - normal * d_norm);
        let position = self.plane_position(i, &projected);
        let outside = position.outside(self.config().boundary_epsilon);

        let resolved = match outside.count_ones() {
            0 => self.resolve_face(i, &projected, &position),
            1 => {
                let edge = (outside.trailing_zeros() as usize + 1) % 3;
                self.resolve_edge_corner(i, &projected, ContactFeature::Edge(edge))
            }
            _ => {
                let node = position.dominant_node();
                self.resolve_edge_corner(i, &projected, ContactFeature::Corner(node))
            }
        };

        Ok(resolved.map(|(feature, contact_point)| {
            let t_edge = match feature {
                ContactFeature::Edge(e) => {
                    let nodes = self.nodes(i);
                    Some((contact_point - nodes[e]).norm() / self.edge_len(i)[e])
                }
                _ => None,
            };
            let delta = contact_point - center;
            SphereContact {
                gap: delta.norm() - radius,
                contact_point,
                delta,
                feature,
                bary: feature_bary(feature, position.bary, t_edge),
            }
        }))
    }

    fn prefilter(&self, i: usize, radius: f64, center: &Point, skin: f64) -> bool {
        let reach = radius + skin;

        let d_norm = signed_distance_to_plane(center, self.center(i), self.face_norm(i));
        if d_norm.abs() > reach {
            return false;
        }

        let nodes = self.nodes(i);
        let edge_norm = self.edge_norm(i);
        (0..3).all(|k| signed_distance_to_plane(center, &nodes[k], &edge_norm[k]) <= reach)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WallMeshConfig;
    use crate::contact::types::{gap_or_sentinel, NO_CONTACT_GAP};
    use crate::mesh::surface::SurfaceMesh;
    use crate::parallel::SerialComm;
    use approx::assert_relative_eq;

    fn build(elements: &[(u64, [Point; 3])]) -> TriMesh {
        let mut m = SurfaceMesh::new(WallMeshConfig::default()).unwrap();
        for (id, nodes) in elements {
            m.add_element(ElementId(*id), *nodes).unwrap();
        }
        m.refresh_owned(&SerialComm, true).unwrap();
        m.build_neighbours();
        m
    }

    fn single() -> TriMesh {
        build(&[(
            0,
            [
                Point::new(0.0, 0.0, 0.0),
                Point::new(1.0, 0.0, 0.0),
                Point::new(0.0, 1.0, 0.0),
            ],
        )])
    }

    #[test]
    fn test_face_contact() {
        let m = single();
        let c = m
            .resolve(ElementId(0), 0.1, &Point::new(0.2, 0.3, 0.05))
            .unwrap()
            .unwrap();

        assert_eq!(c.feature, ContactFeature::Face);
        assert_relative_eq!(c.gap, -0.05, epsilon = 1e-12);
        assert_relative_eq!(c.contact_point, Point::new(0.2, 0.3, 0.0), epsilon = 1e-12);
        assert_relative_eq!(c.bary[0] + c.bary[1] + c.bary[2], 1.0, epsilon = 1e-12);
        assert_relative_eq!(c.bary[1], 0.2, epsilon = 1e-12);
    }

    #[test]
    fn test_too_far_from_plane() {
        let m = single();
        let c = m
            .resolve(ElementId(0), 0.1, &Point::new(0.2, 0.3, 0.2))
            .unwrap();
        assert!(c.is_none());
        assert_eq!(gap_or_sentinel(&c), NO_CONTACT_GAP);
    }

    #[test]
    fn test_edge_and_corner_regions() {
        let m = single();

        let edge = m
            .resolve(ElementId(0), 0.1, &Point::new(0.5, -0.05, 0.0))
            .unwrap()
            .unwrap();
        assert_eq!(edge.feature, ContactFeature::Edge(0));
        assert_relative_eq!(edge.gap, -0.05, epsilon = 1e-12);

        let hyp = m
            .resolve(ElementId(0), 0.1, &Point::new(0.55, 0.55, 0.0))
            .unwrap()
            .unwrap();
        assert_eq!(hyp.feature, ContactFeature::Edge(1));
        assert_relative_eq!(hyp.contact_point, Point::new(0.5, 0.5, 0.0), epsilon = 1e-12);

        let corner = m
            .resolve(ElementId(0), 0.1, &Point::new(-0.03, -0.04, 0.0))
            .unwrap()
            .unwrap();
        assert_eq!(corner.feature, ContactFeature::Corner(0));
        assert_relative_eq!(corner.gap, -0.05, epsilon = 1e-12);
        assert_eq!(corner.bary, [1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_edge_region_beyond_edge_end_is_corner() {
        let m = build(&[(
            0,
            [
                Point::new(0.0, 0.0, 0.0),
                Point::new(1.0, 0.0, 0.0),
                Point::new(0.5, 1.0, 0.0),
            ],
        )]);

        // outside edge 0 only, but past node 1
        let c = m
            .resolve(ElementId(0), 0.5, &Point::new(1.05, -0.2, 0.0))
            .unwrap()
            .unwrap();
        assert_eq!(c.feature, ContactFeature::Corner(1));
        assert_relative_eq!(c.contact_point, Point::new(1.0, 0.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_obtuse_corner_region_delegates_to_edge() {
        // obtuse angle at node 0
        let m = build(&[(
            0,
            [
                Point::new(0.0, 0.0, 0.0),
                Point::new(1.0, 0.0, 0.0),
                Point::new(-0.5, 0.5, 0.0),
            ],
        )]);

        // outside edges 0 and 2, closest point lies inside edge 0
        let c = m
            .resolve(ElementId(0), 0.5, &Point::new(0.1, -0.2, 0.0))
            .unwrap()
            .unwrap();
        assert_eq!(c.feature, ContactFeature::Edge(0));
        assert_relative_eq!(c.contact_point, Point::new(0.1, 0.0, 0.0), epsilon = 1e-12);
    }

    /// Coplanar pair across the x axis: a tall triangle (id 0) and a flat one (id 1)
    fn tall_and_flat() -> TriMesh {
        build(&[
            (
                0,
                [
                    Point::new(0.0, 0.0, 0.0),
                    Point::new(1.0, 0.0, 0.0),
                    Point::new(0.5, 100.0, 0.0),
                ],
            ),
            (
                1,
                [
                    Point::new(1.0, 0.0, 0.0),
                    Point::new(0.0, 0.0, 0.0),
                    Point::new(0.5, -0.01, 0.0),
                ],
            ),
        ])
    }

    #[test]
    fn test_seam_band_shared_by_neighbours_of_different_height() {
        let m = tall_and_flat();
        let reported = |y: f64| {
            let center = Point::new(0.5, y, 0.05);
            let a = m.resolve(ElementId(0), 0.1, &center).unwrap();
            let b = m.resolve(ElementId(1), 0.1, &center).unwrap();
            (a, b)
        };

        // clearly inside the tall element, but within its own barycentric epsilon
        let (a, b) = reported(5e-9);
        let a = a.unwrap();
        assert_eq!(a.feature, ContactFeature::Face);
        assert_relative_eq!(a.gap, -0.05, epsilon = 1e-12);
        assert!(b.is_none());

        // inside the shared band: the higher id reports the seam
        let (a, b) = reported(5e-11);
        assert!(a.is_none());
        let b = b.unwrap();
        assert_eq!(b.feature, ContactFeature::Edge(0));
        assert_relative_eq!(b.gap, -0.05, epsilon = 1e-12);

        // inside the flat element
        let (a, b) = reported(-0.001);
        assert!(a.is_none());
        assert_eq!(b.unwrap().feature, ContactFeature::Face);
    }

    #[test]
    fn test_unknown_element_is_an_error() {
        let m = single();
        assert!(m.resolve(ElementId(42), 0.1, &Point::origin()).is_err());
    }

    #[test]
    fn test_prefilter() {
        let m = single();
        assert!(m.prefilter(0, 0.1, &Point::new(0.2, 0.2, 0.15), 0.1));
        assert!(!m.prefilter(0, 0.1, &Point::new(0.2, 0.2, 0.25), 0.1));
        assert!(!m.prefilter(0, 0.1, &Point::new(0.5, -0.3, 0.0), 0.1));
        assert!(m.prefilter(0, 0.1, &Point::new(0.5, -0.15, 0.0), 0.1));
    }
}
