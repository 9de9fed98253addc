//! Surface mesh: derived element geometry and feature ownership
//!
//! Every edge and corner shared between two elements is owned by exactly one
//! of them. The rules only depend on element ids and geometry, never on the
//! local array order, so every process holding a copy of both elements
//! (owned or ghost) reaches the same result.

use crate::config::WallMeshConfig;
use crate::error::{Result, WallMeshError};
use crate::mesh::geometry::{
    compute_face_area, compute_face_normal, distance, nodes_match, project_point_to_plane,
    rotation_about_axis, signed_distance_to_plane,
};
use crate::mesh::node_store::NodeStore;
use crate::mesh::types::{BoundingBox, ElementId, Point, Subdomain, Vec3};
use crate::parallel::Communicator;
use crate::property::{
    CommMode, CommScope, Container, FrameInvariance, Motion, Property, PropertySpec,
};
use crate::random::UniformSource;

/// Triangulated surface mesh
pub type TriMesh = SurfaceMesh<3>;

/// Id-based topology queries
pub trait TopologyProvider {
    /// Local index of an element known to this process
    fn element_index(&self, id: ElementId) -> Result<usize>;

    /// Whether two elements have parallel or antiparallel normals
    fn are_coplanar(&self, a: ElementId, b: ElementId) -> Result<bool>;

    /// Whether two elements lie in one plane and face the same way
    fn share_plane(&self, a: ElementId, b: ElementId) -> Result<bool>;
}

/// Area bookkeeping of a mesh
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AreaTotals {
    /// Sum of owned areas over all processes
    pub global: f64,
    pub owned: f64,
    pub ghost: f64,
    /// Share of the surface inside this process's subdomain (insertion meshes)
    pub subdomain: f64,
}

struct ElementGeometry<const N: usize> {
    edge_vec: [Vec3; N],
    edge_len: [f64; N],
    edge_norm: [Vec3; N],
    face_norm: Vec3,
    area: f64,
}

fn element_geometry<const N: usize>(
    id: ElementId,
    nodes: &[Point; N],
) -> Result<ElementGeometry<N>> {
    let face_norm = compute_face_normal(nodes)
        .map_err(|e| WallMeshError::GeometryError(format!("element {}: {}", id, e)))?;

    let mut edge_vec = [Vec3::zeros(); N];
    let mut edge_len = [0.0; N];
    let mut edge_norm = [Vec3::zeros(); N];
    for k in 0..N {
        let e = nodes[(k + 1) % N] - nodes[k];
        let len = e.norm();
        if len < 1e-12 {
            return Err(WallMeshError::GeometryError(format!(
                "element {} has a zero-length edge {}",
                id, k
            )));
        }
        edge_vec[k] = e / len;
        edge_len[k] = len;
        edge_norm[k] = edge_vec[k].cross(&face_norm);
    }

    Ok(ElementGeometry {
        edge_vec,
        edge_len,
        edge_norm,
        face_norm,
        area: compute_face_area(nodes, &face_norm),
    })
}

const DIRECTION_SPEC: PropertySpec =
    PropertySpec::new(FrameInvariance::SCALE_TRANS_INVARIANT, CommMode::None);
const LENGTH_SPEC: PropertySpec =
    PropertySpec::new(FrameInvariance::TRANS_ROT_INVARIANT, CommMode::None);
const TOPOLOGY_SPEC: PropertySpec =
    PropertySpec::new(FrameInvariance::INVARIANT, CommMode::ExchangeBorders);

/// Per-element values derived from the nodes or from neighbour building
#[derive(Debug)]
struct SurfaceAttributes<const N: usize> {
    edge_vec: Container<[Vec3; N]>,
    edge_len: Container<[f64; N]>,
    edge_norm: Container<[Vec3; N]>,
    face_norm: Container<Vec3>,
    area: Container<f64>,
    edge_active: Container<[bool; N]>,
    corner_active: Container<[bool; N]>,
    corner_owner: Container<[bool; N]>,
    non_coplanar_node: Container<[bool; N]>,
    neighbour: Container<[Option<ElementId>; N]>,
}

impl<const N: usize> SurfaceAttributes<N> {
    fn new() -> Self {
        Self {
            edge_vec: Container::new(DIRECTION_SPEC),
            edge_len: Container::new(LENGTH_SPEC),
            edge_norm: Container::new(DIRECTION_SPEC),
            face_norm: Container::new(DIRECTION_SPEC),
            area: Container::new(LENGTH_SPEC),
            edge_active: Container::new(TOPOLOGY_SPEC),
            corner_active: Container::new(TOPOLOGY_SPEC),
            corner_owner: Container::new(TOPOLOGY_SPEC),
            non_coplanar_node: Container::new(TOPOLOGY_SPEC),
            neighbour: Container::new(TOPOLOGY_SPEC),
        }
    }

    fn all(&self) -> [&dyn Property; 10] {
        [
            &self.edge_vec,
            &self.edge_len,
            &self.edge_norm,
            &self.face_norm,
            &self.area,
            &self.edge_active,
            &self.corner_active,
            &self.corner_owner,
            &self.non_coplanar_node,
            &self.neighbour,
        ]
    }

    fn all_mut(&mut self) -> [&mut dyn Property; 10] {
        [
            &mut self.edge_vec,
            &mut self.edge_len,
            &mut self.edge_norm,
            &mut self.face_norm,
            &mut self.area,
            &mut self.edge_active,
            &mut self.corner_active,
            &mut self.corner_owner,
            &mut self.non_coplanar_node,
            &mut self.neighbour,
        ]
    }

    fn push(&mut self, geometry: ElementGeometry<N>) {
        self.edge_vec.push(geometry.edge_vec);
        self.edge_len.push(geometry.edge_len);
        self.edge_norm.push(geometry.edge_norm);
        self.face_norm.push(geometry.face_norm);
        self.area.push(geometry.area);
        self.edge_active.push([true; N]);
        self.corner_active.push([true; N]);
        self.corner_owner.push([true; N]);
        self.non_coplanar_node.push([false; N]);
        self.neighbour.push([None; N]);
    }

    fn set_geometry(&mut self, i: usize, geometry: ElementGeometry<N>) {
        self.edge_vec[i] = geometry.edge_vec;
        self.edge_len[i] = geometry.edge_len;
        self.edge_norm[i] = geometry.edge_norm;
        self.face_norm[i] = geometry.face_norm;
        self.area[i] = geometry.area;
    }

    fn reset_topology(&mut self) {
        self.edge_active.fill([true; N]);
        self.corner_active.fill([true; N]);
        self.corner_owner.fill([true; N]);
        self.non_coplanar_node.fill([false; N]);
        self.neighbour.fill([None; N]);
    }

    fn truncate(&mut self, len: usize) {
        self.all_mut().into_iter().for_each(|p| p.truncate(len));
    }

    fn remove(&mut self, i: usize) {
        self.all_mut().into_iter().for_each(|p| Property::remove(p, i));
    }

    fn apply(&mut self, motion: &Motion) {
        self.all_mut().into_iter().for_each(|p| {
            p.apply(motion);
        });
    }
}

/// Wall surface made of N-node planar elements
#[derive(Debug)]
pub struct SurfaceMesh<const N: usize> {
    store: NodeStore<N>,
    attrs: SurfaceAttributes<N>,
    area_acc: Vec<f64>,
    pub(super) areas: AreaTotals,
    config: WallMeshConfig,
    insertion: bool,
}

impl<const N: usize> SurfaceMesh<N> {
    pub fn new(config: WallMeshConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store: NodeStore::new(),
            attrs: SurfaceAttributes::new(),
            area_acc: Vec::new(),
            areas: AreaTotals::default(),
            config,
            insertion: false,
        })
    }

    pub fn config(&self) -> &WallMeshConfig {
        &self.config
    }

    /// Node coordinates, ids and motion state
    pub fn store(&self) -> &NodeStore<N> {
        &self.store
    }

    /// Custom properties travelling with the elements
    pub fn properties_mut(&mut self) -> &mut crate::property::PropertyRegistry {
        self.store.properties_mut()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn n_owned(&self) -> usize {
        self.store.n_owned()
    }

    pub fn n_ghost(&self) -> usize {
        self.store.n_ghost()
    }

    pub fn id(&self, i: usize) -> ElementId {
        self.store.id(i)
    }

    pub fn index_of(&self, id: ElementId) -> Option<usize> {
        self.store.index_of(id)
    }

    pub fn nodes(&self, i: usize) -> &[Point; N] {
        self.store.nodes(i)
    }

    pub fn center(&self, i: usize) -> &Point {
        self.store.center(i)
    }

    pub fn edge_vec(&self, i: usize) -> &[Vec3; N] {
        &self.attrs.edge_vec[i]
    }

    pub fn edge_len(&self, i: usize) -> &[f64; N] {
        &self.attrs.edge_len[i]
    }

    /// In-plane outward edge normals
    pub fn edge_norm(&self, i: usize) -> &[Vec3; N] {
        &self.attrs.edge_norm[i]
    }

    pub fn face_norm(&self, i: usize) -> &Vec3 {
        &self.attrs.face_norm[i]
    }

    pub fn area(&self, i: usize) -> f64 {
        self.attrs.area[i]
    }

    /// Running area sum over local order, owned then ghosts
    pub fn area_acc(&self) -> &[f64] {
        &self.area_acc
    }

    pub fn areas(&self) -> &AreaTotals {
        &self.areas
    }

    pub fn edge_active(&self, i: usize) -> &[bool; N] {
        &self.attrs.edge_active[i]
    }

    pub fn corner_active(&self, i: usize) -> &[bool; N] {
        &self.attrs.corner_active[i]
    }

    /// Whether this element carries the highest id among those sharing each node
    pub fn corner_owner(&self, i: usize) -> &[bool; N] {
        &self.attrs.corner_owner[i]
    }

    pub fn has_non_coplanar_shared_node(&self, i: usize) -> &[bool; N] {
        &self.attrs.non_coplanar_node[i]
    }

    /// Element across each edge, if any
    pub fn neighbours(&self, i: usize) -> &[Option<ElementId>; N] {
        &self.attrs.neighbour[i]
    }

    pub fn n_active_edges(&self, i: usize) -> usize {
        self.attrs.edge_active[i].iter().filter(|a| **a).count()
    }

    pub fn n_active_corners(&self, i: usize) -> usize {
        self.attrs.corner_active[i].iter().filter(|a| **a).count()
    }

    /// Mark this mesh as a particle insertion surface
    ///
    /// Insertion meshes estimate their subdomain area in `refresh_ghosts`.
    pub fn use_as_insertion_mesh(&mut self) {
        self.insertion = true;
    }

    pub fn is_insertion_mesh(&self) -> bool {
        self.insertion
    }

    /// Append an owned element
    pub fn add_element(&mut self, id: ElementId, nodes: [Point; N]) -> Result<usize> {
        let geometry = element_geometry(id, &nodes)?;
        let i = self.store.add_element(id, nodes)?;
        self.attrs.push(geometry);
        self.area_acc.clear();
        Ok(i)
    }

    /// Append a ghost replica of a remotely owned element
    pub fn add_ghost(&mut self, id: ElementId, nodes: [Point; N]) -> Result<usize> {
        let geometry = element_geometry(id, &nodes)?;
        let i = self.store.add_ghost(id, nodes)?;
        self.attrs.push(geometry);
        self.area_acc.clear();
        Ok(i)
    }

    pub fn clear_ghosts(&mut self) {
        self.store.clear_ghosts();
        self.attrs.truncate(self.store.len());
        self.area_acc.clear();
    }

    pub fn delete_element(&mut self, i: usize) -> Result<()> {
        self.store.delete_element(i)?;
        self.attrs.remove(i);
        self.area_acc.clear();
        Ok(())
    }

    /// Serialise element `i`, see [`NodeStore::pack_element`]
    ///
    /// Neighbour topology follows the node data when its comm tag includes
    /// `scope`. Derived geometry is recomputed by the receiver.
    pub fn pack_element(&self, i: usize, scope: CommScope, buf: &mut Vec<f64>) {
        self.store.pack_element(i, scope, buf);
        for p in self.attrs.all() {
            if p.spec().comm.included_in(scope) {
                p.pack_element(i, buf);
            }
        }
    }

    /// Append a packed element, returns words consumed
    pub fn unpack_element(&mut self, buf: &[f64], scope: CommScope) -> Result<usize> {
        let mut used = self.store.unpack_element(buf, scope)?;
        let i = self.store.len() - 1;
        let geometry = element_geometry(self.store.id(i), self.store.nodes(i))?;
        self.attrs.push(geometry);

        for p in self.attrs.all_mut() {
            if p.spec().comm.included_in(scope) {
                used += p.unpack_into(i, &buf[used.min(buf.len())..])?;
            }
        }
        self.area_acc.clear();
        Ok(used)
    }

    pub fn set_timestep(&mut self, step: u64) {
        self.store.set_timestep(step);
    }

    pub fn register_move(&mut self, scale: bool, translate: bool, rotate: bool) -> bool {
        self.store.register_move(scale, translate, rotate)
    }

    pub fn unregister_move(&mut self, scale: bool, translate: bool, rotate: bool) -> Result<()> {
        self.store.unregister_move(scale, translate, rotate)
    }

    pub fn move_incremental(&mut self, delta: &Vec3) -> Result<()> {
        self.store.move_incremental(delta);
        self.follow(&Motion::Translate(*delta));
        Ok(())
    }

    pub fn move_total(&mut self, total: &Vec3, incremental: &Vec3) -> Result<()> {
        self.store.move_total(total, incremental)?;
        self.update_geometry()
    }

    pub fn rotate_total(
        &mut self,
        total_angle: f64,
        d_angle: f64,
        axis: &Vec3,
        point: &Point,
    ) -> Result<()> {
        self.store.rotate_total(total_angle, d_angle, axis, point)?;
        self.update_geometry()
    }

    pub fn rotate_incremental(&mut self, d_angle: f64, axis: &Vec3, point: &Point) -> Result<()> {
        self.store.rotate_incremental(d_angle, axis, point)?;
        self.follow(&Motion::Rotate {
            q: rotation_about_axis(axis, d_angle)?,
            pivot: *point,
        });
        Ok(())
    }

    pub fn scale(&mut self, factor: f64) -> Result<()> {
        self.store.scale(factor)?;
        self.update_geometry()
    }

    pub fn scale_about(&mut self, factor: f64, origin: &Point) -> Result<()> {
        self.store.scale_about(factor, origin)?;
        self.update_geometry()
    }

    pub fn decide_rebuild(&self, comm: &dyn Communicator, skin: f64) -> bool {
        self.store.decide_rebuild(comm, skin)
    }

    pub fn store_rebuild_snapshot(&mut self) {
        self.store.store_rebuild_snapshot();
    }

    pub fn bounding_box(&self) -> &BoundingBox {
        self.store.bounding_box()
    }

    pub fn global_bounding_box(&self, comm: &dyn Communicator) -> BoundingBox {
        self.store.global_bounding_box(comm)
    }

    fn update_range(&mut self, range: std::ops::Range<usize>) -> Result<()> {
        for i in range {
            let geometry = element_geometry(self.store.id(i), self.store.nodes(i))?;
            self.attrs.set_geometry(i, geometry);
        }
        Ok(())
    }

    /// Carry derived geometry along an incremental rigid motion of the nodes
    fn follow(&mut self, motion: &Motion) {
        self.attrs.apply(motion);
        self.update_local_areas();
    }

    /// Recompute derived geometry of all elements and the local area sums
    ///
    /// Needed after resets to the reference pose and after scaling, which
    /// changes areas quadratically.
    fn update_geometry(&mut self) -> Result<()> {
        self.update_range(0..self.len())?;
        self.update_local_areas();
        Ok(())
    }

    fn update_local_areas(&mut self) {
        let n_owned = self.n_owned();
        self.areas.owned = self.attrs.area.iter().take(n_owned).sum();
        self.areas.ghost = self.attrs.area.iter().skip(n_owned).sum();

        self.area_acc.clear();
        let mut acc = 0.0;
        for a in self.attrs.area.iter() {
            acc += a;
            self.area_acc.push(acc);
        }
    }

    /// Recompute geometry of owned elements and the global area
    ///
    /// Collective: the global area is a sum over all processes. With `setup`
    /// the rebuild snapshot is taken as well.
    pub fn refresh_owned(&mut self, comm: &dyn Communicator, setup: bool) -> Result<()> {
        self.store.refresh();
        self.update_range(0..self.n_owned())?;
        self.update_local_areas();

        let global = comm.sum_f64(self.areas.owned);
        if !(global > 0.0) {
            return Err(WallMeshError::NonPositiveArea(global));
        }
        self.areas.global = global;

        if setup {
            self.store.store_rebuild_snapshot();
            log::info!(
                "Mesh area: global {:.6e}, owned {:.6e} over {} elements",
                global,
                self.areas.owned,
                self.n_owned()
            );
        }
        Ok(())
    }

    /// Recompute geometry of ghost elements
    ///
    /// Insertion meshes also estimate the subdomain area share, which is
    /// collective and needs the global area from a preceding
    /// [`SurfaceMesh::refresh_owned`].
    pub fn refresh_ghosts(
        &mut self,
        comm: &dyn Communicator,
        subdomain: &dyn Subdomain,
        rng: &mut dyn UniformSource,
        setup: bool,
    ) -> Result<()> {
        self.store.refresh();
        self.update_range(self.n_owned()..self.len())?;
        self.update_local_areas();

        if self.insertion {
            self.areas.subdomain = self.estimate_subdomain_area(comm, subdomain, rng)?;
            if setup {
                log::info!(
                    "Subdomain area share {:.6e} of global {:.6e}",
                    self.areas.subdomain,
                    self.areas.global
                );
            }
        }
        Ok(())
    }

    /// Build edge and corner ownership between all local elements
    ///
    /// Pairs are visited in ascending id order so that every process applies
    /// the rules in the same sequence.
    pub fn build_neighbours(&mut self) {
        self.attrs.reset_topology();

        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by_key(|&i| self.store.id(i));

        let curvature = self.config.curvature();
        let tol = self.config.node_match_tolerance;
        let mut n_shared_edges = 0;
        let mut n_ridges = 0;

        for (a, &i) in order.iter().enumerate() {
            for &j in &order[a + 1..] {
                let reach = self.store.bound_radius(i) + self.store.bound_radius(j) + 2.0 * tol;
                if distance(self.store.center(i), self.store.center(j)) > reach {
                    continue;
                }

                let shared = self.shared_nodes(i, j);
                if shared.is_empty() {
                    continue;
                }

                let dot = self.attrs.face_norm[i].dot(&self.attrs.face_norm[j]);
                let coplanar = dot.abs() > curvature;

                match self.shared_edge(i, j, &shared) {
                    Some((ei, ej)) => {
                        n_shared_edges += 1;
                        if !coplanar {
                            n_ridges += 1;
                        }
                        self.handle_shared_edge(i, ei, j, ej, coplanar);
                    }
                    None => {
                        for &(ni, nj) in &shared {
                            self.handle_shared_node(i, ni, j, nj, coplanar);
                        }
                    }
                }
            }
        }

        let active_edges: usize = (0..self.len()).map(|i| self.n_active_edges(i)).sum();
        log::info!(
            "Built neighbours for {} elements: {} shared edges ({} non-coplanar), {} active edges",
            self.len(),
            n_shared_edges,
            n_ridges,
            active_edges
        );
    }

    fn shared_nodes(&self, i: usize, j: usize) -> Vec<(usize, usize)> {
        let tol = self.config.node_match_tolerance;
        let (ni, nj) = (self.store.nodes(i), self.store.nodes(j));

        let mut shared = Vec::new();
        for a in 0..N {
            for b in 0..N {
                if nodes_match(&ni[a], &nj[b], tol) {
                    shared.push((a, b));
                }
            }
        }
        shared
    }

    /// Edge of `i` and edge of `j` running over the same two nodes in opposite directions
    fn shared_edge(
        &self,
        i: usize,
        j: usize,
        shared: &[(usize, usize)],
    ) -> Option<(usize, usize)> {
        for &(a, b) in shared {
            let prev_b = (b + N - 1) % N;
            if shared.contains(&((a + 1) % N, prev_b)) {
                return Some((a, prev_b));
            }
        }

        if shared
            .iter()
            .any(|&(a, b)| shared.contains(&((a + 1) % N, (b + 1) % N)))
        {
            log::warn!(
                "Elements {} and {} share an edge with inconsistent winding, treating as corners",
                self.store.id(i),
                self.store.id(j)
            );
        }
        None
    }

    /// Whether element `i` has a lower id than element `j`
    fn lower(&self, i: usize, j: usize) -> bool {
        self.store.id(i) < self.store.id(j)
    }

    fn set_neighbour(&mut self, i: usize, edge: usize, other: ElementId) {
        let current = self.attrs.neighbour[i][edge];
        match current {
            Some(existing) if existing != other => {
                log::warn!(
                    "Non-manifold edge {} of element {}: keeping neighbour {}, ignoring {}",
                    edge,
                    self.store.id(i),
                    existing,
                    other
                );
            }
            _ => self.attrs.neighbour[i][edge] = Some(other),
        }
    }

    fn handle_shared_edge(&mut self, i: usize, ei: usize, j: usize, ej: usize, coplanar: bool) {
        let (id_i, id_j) = (self.store.id(i), self.store.id(j));
        self.set_neighbour(i, ei, id_j);
        self.set_neighbour(j, ej, id_i);

        if coplanar {
            self.attrs.edge_active[i][ei] = false;
            self.attrs.edge_active[j][ej] = false;
        } else if self.lower(i, j) {
            self.attrs.edge_active[i][ei] = false;
        } else {
            self.attrs.edge_active[j][ej] = false;
        }
        log::debug!(
            "Elements {} and {} share edge {}/{} (coplanar: {})",
            id_i,
            id_j,
            ei,
            ej,
            coplanar
        );

        self.handle_shared_node(i, ei, j, (ej + 1) % N, coplanar);
        self.handle_shared_node(i, (ei + 1) % N, j, ej, coplanar);
    }

    fn handle_shared_node(&mut self, i: usize, ni: usize, j: usize, nj: usize, coplanar: bool) {
        let (lo, lo_node) = if self.lower(i, j) { (i, ni) } else { (j, nj) };
        self.attrs.corner_owner[lo][lo_node] = false;

        if coplanar {
            let flagged =
                self.attrs.non_coplanar_node[i][ni] || self.attrs.non_coplanar_node[j][nj];
            if flagged {
                self.attrs.corner_active[lo][lo_node] = false;
            } else {
                self.attrs.corner_active[i][ni] = false;
                self.attrs.corner_active[j][nj] = false;
            }
        } else {
            self.attrs.non_coplanar_node[i][ni] = true;
            self.attrs.non_coplanar_node[j][nj] = true;
            self.attrs.corner_active[lo][lo_node] = false;
        }
    }

    /// False if any owned element has a non-coplanar neighbour on some process
    ///
    /// Collective.
    pub fn is_planar(&self, comm: &dyn Communicator) -> bool {
        let curvature = self.config.curvature();
        let bent = (0..self.n_owned()).any(|i| {
            self.attrs.neighbour[i].iter().flatten().any(|id| {
                self.index_of(*id).is_some_and(|j| {
                    self.attrs.face_norm[i].dot(&self.attrs.face_norm[j]).abs() <= curvature
                })
            })
        });
        comm.max_i64(i64::from(bent)) == 0
    }

    /// Whether the projection of `pos` onto element `i`'s plane lies inside it
    pub fn is_in_element(&self, pos: &Point, i: usize) -> bool {
        let nodes = self.nodes(i);
        let projected = project_point_to_plane(pos, &nodes[0], self.face_norm(i));
        let eps = self.config.boundary_epsilon;

        (0..N).all(|k| {
            signed_distance_to_plane(&projected, &nodes[k], &self.attrs.edge_norm[i][k])
                <= eps * self.attrs.edge_len[i][k]
        })
    }

    /// Whether `pos` lies on any local element
    pub fn is_on_surface(&self, pos: &Point) -> bool {
        let tol = self.config.node_match_tolerance;
        (0..self.len()).any(|i| {
            signed_distance_to_plane(pos, &self.nodes(i)[0], self.face_norm(i)).abs() <= tol
                && self.is_in_element(pos, i)
        })
    }
}

impl<const N: usize> TopologyProvider for SurfaceMesh<N> {
    fn element_index(&self, id: ElementId) -> Result<usize> {
        self.store.try_index_of(id)
    }

    fn are_coplanar(&self, a: ElementId, b: ElementId) -> Result<bool> {
        let ia = self.element_index(a)?;
        let ib = self.element_index(b)?;
        let dot = self.attrs.face_norm[ia].dot(&self.attrs.face_norm[ib]);
        Ok(dot.abs() > self.config.curvature())
    }

    fn share_plane(&self, a: ElementId, b: ElementId) -> Result<bool> {
        let ia = self.element_index(a)?;
        let ib = self.element_index(b)?;
        let normal = &self.attrs.face_norm[ia];
        let curvature = self.config.curvature();
        if normal.dot(&self.attrs.face_norm[ib]) <= curvature {
            return Ok(false);
        }

        // offset a tilt within the curvature tolerance can build up between the centers
        let max_sin = (1.0 - curvature * curvature).max(0.0).sqrt();
        let reach = distance(self.center(ia), self.center(ib));
        let offset = signed_distance_to_plane(self.center(ib), &self.nodes(ia)[0], normal);
        Ok(offset.abs() <= self.config.node_match_tolerance + reach * max_sin)
    }
}
