//! Spatial index of element centers for wall contact candidates

use crate::mesh::surface::SurfaceMesh;
use crate::mesh::types::Point;
use kiddo::ImmutableKdTree;

/// k-d tree over the centers of all local elements, owned and ghost
///
/// The tree is immutable: rebuild it whenever the mesh is rebuilt or has
/// moved farther than the skin allows.
pub struct ElementIndex {
    tree: Option<ImmutableKdTree<f64, 3>>,
    len: usize,
    max_bound_radius: f64,
}

impl ElementIndex {
    pub fn build<const N: usize>(mesh: &SurfaceMesh<N>) -> Self {
        let centers: Vec<[f64; 3]> = (0..mesh.len())
            .map(|i| {
                let c = mesh.center(i);
                [c.x, c.y, c.z]
            })
            .collect();

        // Empty trees are not supported by kiddo
        let tree = (!centers.is_empty()).then(|| ImmutableKdTree::new_from_slice(&centers));

        log::debug!("Built element index over {} centers", centers.len());

        Self {
            tree,
            len: centers.len(),
            max_bound_radius: mesh.store().max_bound_radius(),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Indices of all elements a sphere grown by `skin` may touch, ascending
    pub fn candidates(&self, center: &Point, radius: f64, skin: f64) -> Vec<usize> {
        let Some(tree) = &self.tree else {
            return Vec::new();
        };

        let reach = radius + skin + self.max_bound_radius;
        let mut found: Vec<usize> = tree
            .within::<kiddo::SquaredEuclidean>(&[center.x, center.y, center.z], reach * reach)
            .iter()
            .map(|neighbour| neighbour.item as usize)
            .collect();
        found.sort_unstable();
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WallMeshConfig;
    use crate::mesh::surface::TriMesh;
    use crate::mesh::types::ElementId;
    use crate::parallel::SerialComm;

    fn strip(n: u64) -> TriMesh {
        let mut m = SurfaceMesh::new(WallMeshConfig::default()).unwrap();
        for k in 0..n {
            let x = k as f64;
            m.add_element(
                ElementId(k),
                [
                    Point::new(x, 0.0, 0.0),
                    Point::new(x + 1.0, 0.0, 0.0),
                    Point::new(x, 1.0, 0.0),
                ],
            )
            .unwrap();
        }
        m.refresh_owned(&SerialComm, true).unwrap();
        m
    }

    #[test]
    fn test_empty_mesh_has_no_candidates() {
        let m: TriMesh = SurfaceMesh::new(WallMeshConfig::default()).unwrap();
        let index = ElementIndex::build(&m);
        assert!(index.is_empty());
        assert!(index.candidates(&Point::origin(), 1.0, 1.0).is_empty());
    }

    #[test]
    fn test_candidates_near_sphere() {
        let m = strip(10);
        let index = ElementIndex::build(&m);
        assert_eq!(index.len(), 10);

        let found = index.candidates(&Point::new(4.3, 0.3, 0.05), 0.1, 0.0);
        assert!(found.contains(&4));
        assert!(!found.contains(&0));
        assert!(!found.contains(&9));
        assert!(found.windows(2).all(|w| w[0] < w[1]));
    }
}
