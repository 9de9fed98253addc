//! Per-element node storage with rigid-body motion
//!
//! Elements are stored owned first, then ghosts. The process-local index of an
//! element changes whenever elements are added or deleted; the [`ElementId`]
//! does not, and the id map is rebuilt after every such change.
//!
//! Total motions (`move_total`, `rotate_total`) start from a reference pose
//! that exists only while at least one motion is registered. The first total
//! motion of a timestep resets the nodes to that pose and applies the full
//! displacement; later motions in the same step apply their increment.

use crate::error::{Result, WallMeshError};
use crate::mesh::geometry::{compute_bound_radius, compute_face_centroid, rotation_about_axis};
use crate::mesh::types::{BoundingBox, ElementId, Point, Vec3};
use crate::parallel::{Communicator, ReduceOp};
use crate::property::{
    CommMode, CommScope, Container, FrameInvariance, Motion, Property, PropertyRegistry,
    PropertySpec, PropertyValue,
};
use std::collections::HashMap;

const NODE_SPEC: PropertySpec =
    PropertySpec::new(FrameInvariance::VARIANT, CommMode::ExchangeBorders);
const CENTER_SPEC: PropertySpec = PropertySpec::new(FrameInvariance::VARIANT, CommMode::None);
const RADIUS_SPEC: PropertySpec =
    PropertySpec::new(FrameInvariance::TRANS_ROT_INVARIANT, CommMode::None);
// The reference pose follows scaling only, total motions are applied on top of it
const REFERENCE_SPEC: PropertySpec =
    PropertySpec::new(FrameInvariance::TRANS_ROT_INVARIANT, CommMode::Exchange);

/// Reference counts of registered motions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MotionCounts {
    pub total: usize,
    pub scale: usize,
    pub translate: usize,
    pub rotate: usize,
}

/// Node coordinates and bounding spheres of N-node elements
#[derive(Debug)]
pub struct NodeStore<const N: usize> {
    ids: Vec<ElementId>,
    nodes: Container<[Point; N]>,
    center: Container<Point>,
    bound_radius: Container<f64>,
    n_owned: usize,
    id_map: HashMap<ElementId, usize>,

    reference: Option<Container<[Point; N]>>,
    motions: MotionCounts,
    step: u64,
    last_reset: Option<u64>,

    rebuild_snapshot: Vec<[Point; N]>,
    bbox: BoundingBox,
    properties: PropertyRegistry,
}

impl<const N: usize> Default for NodeStore<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> NodeStore<N> {
    pub fn new() -> Self {
        Self {
            ids: Vec::new(),
            nodes: Container::new(NODE_SPEC),
            center: Container::new(CENTER_SPEC),
            bound_radius: Container::new(RADIUS_SPEC),
            n_owned: 0,
            id_map: HashMap::new(),
            reference: None,
            motions: MotionCounts::default(),
            step: 0,
            last_reset: None,
            rebuild_snapshot: Vec::new(),
            bbox: BoundingBox::empty(),
            properties: PropertyRegistry::new(),
        }
    }

    /// Number of owned plus ghost elements
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn n_owned(&self) -> usize {
        self.n_owned
    }

    pub fn n_ghost(&self) -> usize {
        self.ids.len() - self.n_owned
    }

    pub fn is_ghost(&self, i: usize) -> bool {
        i >= self.n_owned
    }

    pub fn id(&self, i: usize) -> ElementId {
        self.ids[i]
    }

    pub fn ids(&self) -> &[ElementId] {
        &self.ids
    }

    pub fn nodes(&self, i: usize) -> &[Point; N] {
        &self.nodes[i]
    }

    pub fn center(&self, i: usize) -> &Point {
        &self.center[i]
    }

    pub fn bound_radius(&self, i: usize) -> f64 {
        self.bound_radius[i]
    }

    /// Largest bounding radius over owned and ghost elements
    pub fn max_bound_radius(&self) -> f64 {
        self.bound_radius.iter().copied().fold(0.0, f64::max)
    }

    /// Process-local index of an element
    pub fn index_of(&self, id: ElementId) -> Option<usize> {
        self.id_map.get(&id).copied()
    }

    /// Like [`NodeStore::index_of`], failing on ids unknown to this process
    pub fn try_index_of(&self, id: ElementId) -> Result<usize> {
        self.index_of(id).ok_or(WallMeshError::UnknownElementId(id))
    }

    /// Custom per-element and global properties
    pub fn properties(&self) -> &PropertyRegistry {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut PropertyRegistry {
        &mut self.properties
    }

    /// Reference pose of element `i`, if a motion is registered
    pub fn reference_nodes(&self, i: usize) -> Option<&[Point; N]> {
        self.reference.as_ref().map(|r| &r[i])
    }

    /// Append an owned element, returns its local index
    pub fn add_element(&mut self, id: ElementId, nodes: [Point; N]) -> Result<usize> {
        if self.n_ghost() > 0 {
            return Err(WallMeshError::InvalidMeshTopology(format!(
                "cannot add owned element {} while {} ghosts are present",
                id,
                self.n_ghost()
            )));
        }
        self.push_core(id, nodes, None)?;
        self.properties.grow();
        self.n_owned += 1;
        Ok(self.len() - 1)
    }

    /// Append a ghost replica of a remotely owned element
    pub fn add_ghost(&mut self, id: ElementId, nodes: [Point; N]) -> Result<usize> {
        self.push_core(id, nodes, None)?;
        self.properties.grow();
        Ok(self.len() - 1)
    }

    fn push_core(
        &mut self,
        id: ElementId,
        nodes: [Point; N],
        reference: Option<[Point; N]>,
    ) -> Result<()> {
        if self.id_map.contains_key(&id) {
            return Err(WallMeshError::InvalidMeshTopology(format!(
                "duplicate element id {}",
                id
            )));
        }
        if id.0 > ElementId::MAX_PACKED {
            return Err(WallMeshError::InvalidMeshTopology(format!(
                "element id {} exceeds the largest exchangeable id {}",
                id,
                ElementId::MAX_PACKED
            )));
        }
        if nodes.iter().any(|n| n.iter().any(|x| !x.is_finite())) {
            return Err(WallMeshError::GeometryError(format!(
                "element {} has non-finite node coordinates",
                id
            )));
        }

        let center = compute_face_centroid(&nodes);
        let radius = compute_bound_radius(&nodes, &center);

        self.id_map.insert(id, self.ids.len());
        self.ids.push(id);
        self.nodes.push(nodes);
        self.center.push(center);
        self.bound_radius.push(radius);
        if let Some(r) = self.reference.as_mut() {
            r.push(reference.unwrap_or(nodes));
        }
        Ok(())
    }

    /// Drop every ghost element
    pub fn clear_ghosts(&mut self) {
        let n = self.n_owned;
        self.ids.truncate(n);
        self.nodes.truncate(n);
        self.center.truncate(n);
        self.bound_radius.truncate(n);
        if let Some(r) = self.reference.as_mut() {
            r.truncate(n);
        }
        self.properties.truncate(n);
        self.rebuild_id_map();
    }

    /// Remove the element at local index `i`, keeping the order of the rest
    pub fn delete_element(&mut self, i: usize) -> Result<()> {
        if i >= self.len() {
            return Err(WallMeshError::InvalidMeshTopology(format!(
                "element index {} out of bounds ({} elements)",
                i,
                self.len()
            )));
        }

        self.ids.remove(i);
        self.nodes.remove(i);
        self.center.remove(i);
        self.bound_radius.remove(i);
        if let Some(r) = self.reference.as_mut() {
            r.remove(i);
        }
        self.properties.remove(i);
        if i < self.n_owned {
            self.n_owned -= 1;
            if i < self.rebuild_snapshot.len() {
                self.rebuild_snapshot.remove(i);
            }
        }
        self.rebuild_id_map();
        Ok(())
    }

    fn rebuild_id_map(&mut self) {
        self.id_map = self
            .ids
            .iter()
            .enumerate()
            .map(|(i, id)| (*id, i))
            .collect();
    }

    /// Advance the step counter that gates resets to the reference pose
    pub fn set_timestep(&mut self, step: u64) {
        self.step = step;
    }

    pub fn timestep(&self) -> u64 {
        self.step
    }

    pub fn motions(&self) -> MotionCounts {
        self.motions
    }

    pub fn is_moving(&self) -> bool {
        self.motions.total > 0
    }

    pub fn is_translating(&self) -> bool {
        self.motions.translate > 0
    }

    pub fn is_rotating(&self) -> bool {
        self.motions.rotate > 0
    }

    pub fn is_scaling(&self) -> bool {
        self.motions.scale > 0
    }

    /// Register a motion, returns true for the first registrant
    ///
    /// The first registration snapshots the current nodes as reference pose.
    pub fn register_move(&mut self, scale: bool, translate: bool, rotate: bool) -> bool {
        let first = self.motions.total == 0;

        self.motions.total += 1;
        if scale {
            self.motions.scale += 1;
        }
        if translate {
            self.motions.translate += 1;
        }
        if rotate {
            self.motions.rotate += 1;
        }

        if first {
            let mut reference = Container::new(REFERENCE_SPEC);
            self.nodes.iter().for_each(|n| reference.push(*n));
            self.reference = Some(reference);
            log::debug!("reference pose stored for {} elements", self.len());
        }
        first
    }

    /// Remove a registration made with the same flags
    pub fn unregister_move(&mut self, scale: bool, translate: bool, rotate: bool) -> Result<()> {
        let m = &self.motions;
        if m.total == 0
            || (scale && m.scale == 0)
            || (translate && m.translate == 0)
            || (rotate && m.rotate == 0)
        {
            return Err(WallMeshError::MotionNotRegistered("unregister_move"));
        }

        self.motions.total -= 1;
        if scale {
            self.motions.scale -= 1;
        }
        if translate {
            self.motions.translate -= 1;
        }
        if rotate {
            self.motions.rotate -= 1;
        }

        if self.motions.total == 0 {
            self.reference = None;
            self.last_reset = None;
            log::debug!("reference pose released");
        }
        Ok(())
    }

    /// Restore the reference pose once per timestep, returns whether it did
    fn reset_to_reference(&mut self) -> bool {
        if self.last_reset == Some(self.step) {
            return false;
        }
        match self.reference.as_ref() {
            Some(reference) => {
                self.nodes.as_mut_slice().copy_from_slice(reference.as_slice());
                self.last_reset = Some(self.step);
                self.recompute_bounds();
                true
            }
            None => false,
        }
    }

    /// Apply `motion` to every built-in container its frame tag marks as affected
    fn dispatch(&mut self, motion: &Motion) {
        self.nodes.apply(motion);
        self.center.apply(motion);
        self.bound_radius.apply(motion);
        if let Some(reference) = self.reference.as_mut() {
            reference.apply(motion);
        }
        self.update_bounding_box();
    }

    /// Translate every element by `delta` on top of the current pose
    pub fn move_incremental(&mut self, delta: &Vec3) {
        let motion = Motion::Translate(*delta);
        self.dispatch(&motion);
        self.properties.apply(&motion);
    }

    /// Translate to `total` relative to the reference pose
    ///
    /// `incremental` is applied instead when another total motion has
    /// already reset the pose during this timestep.
    pub fn move_total(&mut self, total: &Vec3, incremental: &Vec3) -> Result<()> {
        if !self.is_translating() {
            return Err(WallMeshError::MotionNotRegistered("move_total"));
        }

        let step = if self.reset_to_reference() {
            total
        } else {
            incremental
        };
        self.dispatch(&Motion::Translate(*step));
        self.properties.apply(&Motion::Translate(*incremental));
        Ok(())
    }

    /// Rotate to `total_angle` about `axis` through `point`, relative to the reference pose
    pub fn rotate_total(
        &mut self,
        total_angle: f64,
        d_angle: f64,
        axis: &Vec3,
        point: &Point,
    ) -> Result<()> {
        if !self.is_rotating() {
            return Err(WallMeshError::MotionNotRegistered("rotate_total"));
        }

        let dq = rotation_about_axis(axis, d_angle)?;
        let q = if self.reset_to_reference() {
            rotation_about_axis(axis, total_angle)?
        } else {
            dq
        };
        self.dispatch(&Motion::Rotate { q, pivot: *point });
        self.properties.apply(&Motion::Rotate {
            q: dq,
            pivot: *point,
        });
        Ok(())
    }

    /// Rotate by `d_angle` about `axis` through `point` on top of the current pose
    pub fn rotate_incremental(&mut self, d_angle: f64, axis: &Vec3, point: &Point) -> Result<()> {
        if !self.is_rotating() {
            return Err(WallMeshError::MotionNotRegistered("rotate_incremental"));
        }

        let motion = Motion::Rotate {
            q: rotation_about_axis(axis, d_angle)?,
            pivot: *point,
        };
        self.dispatch(&motion);
        self.properties.apply(&motion);
        Ok(())
    }

    /// Scale every element about its own center
    ///
    /// This changes element shapes, not the frame, so nodes and reference
    /// pose are scaled element by element and the bounds recomputed.
    pub fn scale(&mut self, factor: f64) -> Result<()> {
        check_scale_factor(factor)?;

        for (element, c) in self.nodes.as_mut_slice().iter_mut().zip(self.center.iter()) {
            element.apply(&Motion::Scale { factor, origin: *c });
        }
        if let Some(reference) = self.reference.as_mut() {
            for element in reference.as_mut_slice() {
                let origin = compute_face_centroid(element);
                element.apply(&Motion::Scale { factor, origin });
            }
        }
        self.properties.apply(&Motion::Scale {
            factor,
            origin: Point::origin(),
        });
        self.refresh();
        Ok(())
    }

    /// Scale the whole mesh about `origin`, keeping shared nodes coincident
    pub fn scale_about(&mut self, factor: f64, origin: &Point) -> Result<()> {
        check_scale_factor(factor)?;

        let motion = Motion::Scale {
            factor,
            origin: *origin,
        };
        self.dispatch(&motion);
        self.properties.apply(&motion);
        Ok(())
    }

    /// Recompute centers, bounding radii and the local bounding box
    pub fn refresh(&mut self) {
        self.recompute_bounds();
        self.update_bounding_box();
    }

    fn recompute_bounds(&mut self) {
        for i in 0..self.len() {
            let c = compute_face_centroid(&self.nodes[i]);
            self.bound_radius[i] = compute_bound_radius(&self.nodes[i], &c);
            self.center[i] = c;
        }
    }

    fn update_bounding_box(&mut self) {
        self.bbox.reset();
        for element in self.nodes.iter().take(self.n_owned) {
            element.iter().for_each(|n| self.bbox.extend_to_contain(n));
        }
    }

    /// Bounding box of the owned elements on this process
    pub fn bounding_box(&self) -> &BoundingBox {
        &self.bbox
    }

    /// Bounding box of the whole mesh
    ///
    /// Collective: every process must call it.
    pub fn global_bounding_box(&self, comm: &dyn Communicator) -> BoundingBox {
        let mut lo = [self.bbox.lo.x, self.bbox.lo.y, self.bbox.lo.z];
        let mut hi = [self.bbox.hi.x, self.bbox.hi.y, self.bbox.hi.z];
        comm.all_reduce_f64(&mut lo, ReduceOp::Min);
        comm.all_reduce_f64(&mut hi, ReduceOp::Max);
        BoundingBox::new(Point::from(lo), Point::from(hi))
    }

    /// Remember the owned nodes as of the last neighbour-list rebuild
    pub fn store_rebuild_snapshot(&mut self) {
        self.rebuild_snapshot = self.nodes.iter().take(self.n_owned).copied().collect();
    }

    /// Whether any owned node moved more than half the skin since the last snapshot
    ///
    /// Collective for moving meshes. Meshes without a registered motion
    /// answer false without communicating.
    pub fn decide_rebuild(&self, comm: &dyn Communicator, skin: f64) -> bool {
        if !self.is_moving() {
            return false;
        }

        let trigger_sq = 0.25 * skin * skin;
        let local = self.rebuild_snapshot.len() != self.n_owned
            || self
                .nodes
                .iter()
                .zip(self.rebuild_snapshot.iter())
                .any(|(now, then)| {
                    now.iter()
                        .zip(then.iter())
                        .any(|(a, b)| (a - b).norm_squared() > trigger_sq)
                });

        comm.max_i64(i64::from(local)) > 0
    }

    fn reference_travels(&self, scope: CommScope) -> bool {
        self.reference
            .as_ref()
            .is_some_and(|r| r.spec().comm.included_in(scope))
    }

    /// Serialise element `i` for migration or ghost synchronisation
    ///
    /// Layout: id, nodes, reference nodes (when registered and its comm tag
    /// includes `scope`), then the custom properties travelling in `scope`.
    /// Centers and bounding radii are recomputed by the receiver.
    pub fn pack_element(&self, i: usize, scope: CommScope, buf: &mut Vec<f64>) {
        buf.push(self.ids[i].0 as f64);
        self.nodes.pack_element(i, buf);
        if let Some(reference) = self.reference.as_ref() {
            if self.reference_travels(scope) {
                reference.pack_element(i, buf);
            }
        }
        self.properties.pack_element(i, scope, buf);
    }

    /// Append an element packed by [`NodeStore::pack_element`], returns words consumed
    ///
    /// Exchange scope appends an owned element, Borders scope a ghost.
    pub fn unpack_element(&mut self, buf: &[f64], scope: CommScope) -> Result<usize> {
        let node_width = <[Point; N]>::WIDTH;
        let with_reference = self.reference_travels(scope);
        let head = 1 + node_width * if with_reference { 2 } else { 1 };
        if buf.len() < head {
            return Err(WallMeshError::PropertyError(format!(
                "element buffer too short: need {} words, have {}",
                head,
                buf.len()
            )));
        }
        if scope == CommScope::Exchange && self.n_ghost() > 0 {
            return Err(WallMeshError::InvalidMeshTopology(
                "cannot receive owned elements while ghosts are present".to_string(),
            ));
        }

        let raw_id = buf[0];
        if !(raw_id >= 0.0 && raw_id <= ElementId::MAX_PACKED as f64 && raw_id.fract() == 0.0) {
            return Err(WallMeshError::PropertyError(format!(
                "element buffer holds an invalid id word {}",
                raw_id
            )));
        }
        let id = ElementId(raw_id as u64);
        let nodes = <[Point; N]>::unpack(&buf[1..]);
        let reference = with_reference.then(|| <[Point; N]>::unpack(&buf[1 + node_width..]));

        self.push_core(id, nodes, reference)?;
        let used = self.properties.unpack_element(&buf[head..], scope)?;
        if scope == CommScope::Exchange {
            self.n_owned += 1;
        }
        Ok(head + used)
    }
}

fn check_scale_factor(factor: f64) -> Result<()> {
    if !(factor.is_finite() && factor > 0.0) {
        return Err(WallMeshError::GeometryError(format!(
            "scale factor must be finite and positive, got {}",
            factor
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::SerialComm;
    use approx::assert_relative_eq;

    fn unit_triangle(offset: f64) -> [Point; 3] {
        [
            Point::new(offset, 0.0, 0.0),
            Point::new(offset + 1.0, 0.0, 0.0),
            Point::new(offset, 1.0, 0.0),
        ]
    }

    fn store_with(n: usize) -> NodeStore<3> {
        let mut store = NodeStore::new();
        for k in 0..n {
            store
                .add_element(ElementId(10 + k as u64), unit_triangle(2.0 * k as f64))
                .unwrap();
        }
        store.refresh();
        store
    }

    #[test]
    fn test_add_element_derived_fields() {
        let store = store_with(2);

        assert_eq!(store.len(), 2);
        assert_eq!(store.n_owned(), 2);
        assert_eq!(store.index_of(ElementId(11)), Some(1));
        assert_relative_eq!(*store.center(0), Point::new(1.0 / 3.0, 1.0 / 3.0, 0.0));
        assert_relative_eq!(store.bound_radius(0), (5.0_f64 / 9.0).sqrt(), epsilon = 1e-12);
        assert!(store.try_index_of(ElementId(99)).is_err());
    }

    #[test]
    fn test_duplicate_and_late_owned_rejected() {
        let mut store = store_with(1);
        assert!(store.add_element(ElementId(10), unit_triangle(5.0)).is_err());

        store.add_ghost(ElementId(50), unit_triangle(5.0)).unwrap();
        assert!(store.add_element(ElementId(51), unit_triangle(8.0)).is_err());

        store.clear_ghosts();
        assert_eq!(store.len(), 1);
        assert_eq!(store.index_of(ElementId(50)), None);
    }

    #[test]
    fn test_delete_keeps_order_and_map() {
        let mut store = store_with(3);
        store.register_move(false, true, false);
        store.delete_element(0).unwrap();

        assert_eq!(store.ids(), &[ElementId(11), ElementId(12)]);
        assert_eq!(store.index_of(ElementId(12)), Some(1));
        assert_eq!(store.n_owned(), 2);
        assert_eq!(store.reference_nodes(0), Some(&unit_triangle(2.0)));
        assert!(store.delete_element(5).is_err());
    }

    #[test]
    fn test_total_motion_requires_registration() {
        let mut store = store_with(1);
        let t = Vec3::new(1.0, 0.0, 0.0);

        assert!(matches!(
            store.move_total(&t, &t),
            Err(WallMeshError::MotionNotRegistered(_))
        ));
        assert!(store
            .rotate_incremental(0.1, &Vec3::z(), &Point::origin())
            .is_err());
        assert!(store.unregister_move(false, true, false).is_err());
    }

    #[test]
    fn test_registration_lifecycle() {
        let mut store = store_with(1);

        assert!(store.register_move(false, true, false));
        assert!(!store.register_move(false, false, true));
        assert!(store.reference_nodes(0).is_some());

        store.unregister_move(false, true, false).unwrap();
        assert!(store.reference_nodes(0).is_some());
        store.unregister_move(false, false, true).unwrap();
        assert!(store.reference_nodes(0).is_none());
    }

    #[test]
    fn test_move_total_round_trip() {
        let mut store = store_with(2);
        store.register_move(false, true, false);
        let original = *store.nodes(1);
        let t = Vec3::new(0.3, -1.2, 4.0);

        store.set_timestep(1);
        store.move_total(&t, &t).unwrap();
        assert_relative_eq!(store.nodes(1)[0], original[0] + t, epsilon = 1e-12);

        store.set_timestep(2);
        store.move_total(&Vec3::zeros(), &-t).unwrap();
        for k in 0..3 {
            assert_relative_eq!(store.nodes(1)[k], original[k], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_second_total_motion_in_step_is_incremental() {
        let mut store = store_with(1);
        store.register_move(false, true, true);
        let original = *store.nodes(0);
        let t = Vec3::new(1.0, 0.0, 0.0);

        store.set_timestep(1);
        store.move_total(&t, &t).unwrap();
        store
            .rotate_total(std::f64::consts::PI, 0.0, &Vec3::z(), &Point::origin())
            .unwrap();

        // the rotation ran after the reset, so only its zero increment applied
        assert_relative_eq!(store.nodes(0)[0], original[0] + t, epsilon = 1e-12);
    }

    #[test]
    fn test_rotate_round_trip() {
        let mut store = store_with(2);
        store.register_move(false, false, true);
        let original = *store.nodes(1);
        let axis = Vec3::new(1.0, 1.0, 0.5);
        let pivot = Point::new(0.5, -1.0, 2.0);

        store.rotate_incremental(0.7, &axis, &pivot).unwrap();
        assert!((store.nodes(1)[0] - original[0]).norm() > 1e-3);
        store.rotate_incremental(-0.7, &axis, &pivot).unwrap();

        for k in 0..3 {
            assert_relative_eq!(store.nodes(1)[k], original[k], epsilon = 1e-12);
        }
        assert!(store.rotate_incremental(0.1, &Vec3::zeros(), &pivot).is_err());
    }

    #[test]
    fn test_scale_about_center() {
        let mut store = store_with(1);
        let r0 = store.bound_radius(0);
        let c0 = *store.center(0);

        store.scale(2.0).unwrap();

        assert_relative_eq!(store.bound_radius(0), 2.0 * r0, epsilon = 1e-12);
        assert_relative_eq!(*store.center(0), c0, epsilon = 1e-12);
        assert!(store.scale(0.0).is_err());

        store.scale_about(0.5, &Point::origin()).unwrap();
        assert_relative_eq!(store.bound_radius(0), r0, epsilon = 1e-12);
    }

    #[test]
    fn test_motion_keeps_derived_fields_consistent() {
        let mut store = store_with(2);
        store.register_move(false, true, true);
        let pivot = Point::new(0.5, -1.0, 2.0);

        store
            .rotate_incremental(0.4, &Vec3::new(1.0, 2.0, 0.5), &pivot)
            .unwrap();
        store.move_incremental(&Vec3::new(0.0, 3.0, 0.0));
        store.set_timestep(1);
        store.rotate_total(1.1, 0.1, &Vec3::z(), &pivot).unwrap();
        store.scale_about(1.5, &pivot).unwrap();

        for i in 0..store.len() {
            let c = compute_face_centroid(store.nodes(i));
            assert_relative_eq!(*store.center(i), c, epsilon = 1e-12);
            assert_relative_eq!(
                store.bound_radius(i),
                compute_bound_radius(store.nodes(i), &c),
                epsilon = 1e-12
            );
        }

        // the reference pose followed the scaling but none of the rigid motions
        let reference = store.reference_nodes(0).unwrap();
        let expected = unit_triangle(0.0).map(|n| pivot + (n - pivot) * 1.5);
        for k in 0..3 {
            assert_relative_eq!(reference[k], expected[k], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_decide_rebuild() {
        let comm = SerialComm;
        let mut store = store_with(1);
        assert!(!store.decide_rebuild(&comm, 0.1));

        store.register_move(false, true, false);
        store.store_rebuild_snapshot();
        store.move_incremental(&Vec3::new(0.04, 0.0, 0.0));
        assert!(!store.decide_rebuild(&comm, 0.1));

        store.move_incremental(&Vec3::new(0.02, 0.0, 0.0));
        assert!(store.decide_rebuild(&comm, 0.1));
    }

    #[test]
    fn test_bounding_box_owned_only() {
        let mut store = store_with(1);
        store.add_ghost(ElementId(77), unit_triangle(10.0)).unwrap();
        store.refresh();

        let bbox = store.bounding_box();
        assert_eq!(bbox.lo, Point::new(0.0, 0.0, 0.0));
        assert_eq!(bbox.hi, Point::new(1.0, 1.0, 0.0));
        assert_eq!(store.global_bounding_box(&SerialComm), *bbox);
    }

    #[test]
    fn test_pack_unpack_ghost() {
        let mut source = store_with(2);
        source
            .properties_mut()
            .add_element_property::<f64>(
                "wear",
                PropertySpec::new(FrameInvariance::TRANS_ROT_INVARIANT, CommMode::ExchangeBorders),
            )
            .unwrap();
        source.properties_mut().element_property_mut::<f64>("wear").unwrap()[1] = 0.75;

        let mut buf = Vec::new();
        source.pack_element(1, CommScope::Borders, &mut buf);

        let mut target = store_with(1);
        target
            .properties_mut()
            .add_element_property::<f64>(
                "wear",
                PropertySpec::new(FrameInvariance::TRANS_ROT_INVARIANT, CommMode::ExchangeBorders),
            )
            .unwrap();
        let used = target.unpack_element(&buf, CommScope::Borders).unwrap();

        assert_eq!(used, buf.len());
        assert_eq!(target.n_owned(), 1);
        assert_eq!(target.n_ghost(), 1);
        assert_eq!(target.nodes(1), source.nodes(1));
        assert_eq!(target.properties().element_property::<f64>("wear").unwrap()[1], 0.75);
    }

    #[test]
    fn test_reference_pose_travels_on_exchange_only() {
        let mut source = store_with(1);
        source.register_move(false, true, false);
        source.move_incremental(&Vec3::new(0.0, 0.0, 2.0));

        let mut borders = Vec::new();
        source.pack_element(0, CommScope::Borders, &mut borders);
        let mut exchange = Vec::new();
        source.pack_element(0, CommScope::Exchange, &mut exchange);
        assert_eq!(borders.len(), 1 + 9);
        assert_eq!(exchange.len(), 1 + 18);

        let mut target = NodeStore::<3>::new();
        target.register_move(false, true, false);
        assert_eq!(target.unpack_element(&exchange, CommScope::Exchange).unwrap(), 19);
        assert_eq!(target.nodes(0), source.nodes(0));
        assert_eq!(target.reference_nodes(0), Some(&unit_triangle(0.0)));
    }

    #[test]
    fn test_ids_must_survive_packing() {
        let mut store = store_with(1);
        let too_large = ElementId(ElementId::MAX_PACKED + 1);
        assert!(matches!(
            store.add_element(too_large, unit_triangle(3.0)),
            Err(WallMeshError::InvalidMeshTopology(_))
        ));
        store
            .add_element(ElementId(ElementId::MAX_PACKED), unit_triangle(3.0))
            .unwrap();

        let mut buf = Vec::new();
        store.pack_element(1, CommScope::Borders, &mut buf);
        let mut target = NodeStore::<3>::new();
        target.unpack_element(&buf, CommScope::Borders).unwrap();
        assert_eq!(target.id(0), ElementId(ElementId::MAX_PACKED));

        buf[0] = 2.5;
        assert!(NodeStore::<3>::new()
            .unpack_element(&buf, CommScope::Borders)
            .is_err());
    }
}
