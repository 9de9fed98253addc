//! Geometric operations for mesh elements

use crate::error::{Result, WallMeshError};
use crate::mesh::types::{Point, Vec3};
use nalgebra::{Unit, UnitQuaternion};

/// Compute the unit normal of an element
/// Uses the cross product of the first two edges, so it follows the node winding
pub fn compute_face_normal<const N: usize>(nodes: &[Point; N]) -> Result<Vec3> {
    let e0 = nodes[1] - nodes[0];
    let e1 = nodes[2 % N] - nodes[1];

    let normal = e0.cross(&e1);

    let norm = normal.norm();
    if norm < 1e-12 {
        return Err(WallMeshError::GeometryError(
            "Degenerate face (zero normal)".to_string(),
        ));
    }

    Ok(normal / norm)
}

/// Compute the centroid of an element as the mean of its nodes
pub fn compute_face_centroid<const N: usize>(nodes: &[Point; N]) -> Point {
    let sum = nodes.iter().fold(Vec3::zeros(), |acc, n| acc + n.coords);
    Point::from(sum / N as f64)
}

/// Largest node distance from `center`
pub fn compute_bound_radius<const N: usize>(nodes: &[Point; N], center: &Point) -> f64 {
    nodes
        .iter()
        .map(|n| distance(n, center))
        .fold(0.0, f64::max)
}

/// Compute the area of a planar element
/// Sums the fan triangles from node 0, projected on the face normal
pub fn compute_face_area<const N: usize>(nodes: &[Point; N], normal: &Vec3) -> f64 {
    (1..N - 1)
        .map(|k| 0.5 * (nodes[k] - nodes[0]).cross(&(nodes[k + 1] - nodes[0])).dot(normal))
        .sum::<f64>()
        .abs()
}

/// Area of the triangle spanned by three points
pub fn triangle_area(a: &Point, b: &Point, c: &Point) -> f64 {
    0.5 * (b - a).cross(&(c - a)).norm()
}

/// Compute the distance between two points
pub fn distance(p1: &Point, p2: &Point) -> f64 {
    (p2 - p1).norm()
}

/// Per-coordinate equality within an absolute tolerance
pub fn nodes_match(a: &Point, b: &Point, tolerance: f64) -> bool {
    (0..3).all(|k| (a[k] - b[k]).abs() <= tolerance)
}

/// Compute the signed distance from a point to a plane defined by a point and normal
/// Positive distance means the point is on the side the normal points to
pub fn signed_distance_to_plane(point: &Point, plane_point: &Point, plane_normal: &Vec3) -> f64 {
    let v = point - plane_point;
    v.dot(plane_normal)
}

/// Project a point onto a plane defined by a point and normal
pub fn project_point_to_plane(point: &Point, plane_point: &Point, plane_normal: &Vec3) -> Point {
    let dist = signed_distance_to_plane(point, plane_point, plane_normal);
    Point::from(point.coords - dist * plane_normal)
}

/// Rotation by `angle` radians about `axis`
pub fn rotation_about_axis(axis: &Vec3, angle: f64) -> Result<UnitQuaternion<f64>> {
    if axis.norm() < 1e-12 {
        return Err(WallMeshError::GeometryError(
            "Rotation axis has zero length".to_string(),
        ));
    }
    Ok(UnitQuaternion::from_axis_angle(
        &Unit::new_normalize(*axis),
        angle,
    ))
}

/// Rotate `point` by `q` about the fixed point `origin`
pub fn rotate_about_point(point: &Point, q: &UnitQuaternion<f64>, origin: &Point) -> Point {
    origin + q * (point - origin)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn make_triangle() -> [Point; 3] {
        [
            Point::new(0.0, 0.0, 0.0),
            Point::new(1.0, 0.0, 0.0),
            Point::new(0.0, 1.0, 0.0),
        ]
    }

    fn make_square() -> [Point; 4] {
        [
            Point::new(0.0, 0.0, 0.0),
            Point::new(1.0, 0.0, 0.0),
            Point::new(1.0, 1.0, 0.0),
            Point::new(0.0, 1.0, 0.0),
        ]
    }

    #[test]
    fn test_face_normal() {
        let normal = compute_face_normal(&make_triangle()).unwrap();

        // Counter-clockwise winding seen from +z
        assert_relative_eq!(normal, Vec3::z(), epsilon = 1e-12);
    }

    #[test]
    fn test_degenerate_normal() {
        let nodes = [
            Point::new(0.0, 0.0, 0.0),
            Point::new(1.0, 0.0, 0.0),
            Point::new(2.0, 0.0, 0.0),
        ];
        assert!(compute_face_normal(&nodes).is_err());
    }

    #[test]
    fn test_face_centroid() {
        let centroid = compute_face_centroid(&make_square());

        assert_relative_eq!(centroid.x, 0.5, epsilon = 1e-10);
        assert_relative_eq!(centroid.y, 0.5, epsilon = 1e-10);
        assert_relative_eq!(centroid.z, 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_face_area() {
        let tri = make_triangle();
        let square = make_square();

        assert_relative_eq!(compute_face_area(&tri, &Vec3::z()), 0.5, epsilon = 1e-12);
        assert_relative_eq!(compute_face_area(&square, &Vec3::z()), 1.0, epsilon = 1e-12);
        assert_relative_eq!(triangle_area(&tri[0], &tri[1], &tri[2]), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_bound_radius() {
        let square = make_square();
        let c = compute_face_centroid(&square);
        assert_relative_eq!(compute_bound_radius(&square, &c), 0.5_f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_distance() {
        let p1 = Point::new(0.0, 0.0, 0.0);
        let p2 = Point::new(3.0, 4.0, 0.0);

        let d = distance(&p1, &p2);
        assert_relative_eq!(d, 5.0, epsilon = 1e-10); // 3-4-5 triangle
    }

    #[test]
    fn test_nodes_match() {
        let a = Point::new(1.0, 2.0, 3.0);
        assert!(nodes_match(&a, &Point::new(1.0 + 5e-9, 2.0, 3.0), 1e-8));
        assert!(!nodes_match(&a, &Point::new(1.0, 2.0 + 2e-8, 3.0), 1e-8));
    }

    #[test]
    fn test_signed_distance_to_plane() {
        let plane_point = Point::new(0.0, 0.0, 0.0);
        let plane_normal = Vec3::new(0.0, 0.0, 1.0);

        let point_above = Point::new(0.0, 0.0, 2.0);
        let point_below = Point::new(0.0, 0.0, -1.5);

        assert_relative_eq!(
            signed_distance_to_plane(&point_above, &plane_point, &plane_normal),
            2.0,
            epsilon = 1e-10
        );
        assert_relative_eq!(
            signed_distance_to_plane(&point_below, &plane_point, &plane_normal),
            -1.5,
            epsilon = 1e-10
        );
        assert_relative_eq!(
            project_point_to_plane(&point_above, &plane_point, &plane_normal),
            Point::origin(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_rotate_about_point() {
        let q = rotation_about_axis(&Vec3::new(0.0, 0.0, 2.0), std::f64::consts::PI).unwrap();
        let p = rotate_about_point(&Point::new(2.0, 1.0, 0.0), &q, &Point::new(1.0, 1.0, 0.0));
        assert_relative_eq!(p, Point::new(0.0, 1.0, 0.0), epsilon = 1e-12);

        assert!(rotation_about_axis(&Vec3::zeros(), 1.0).is_err());
    }
}
