//! Typed per-element containers

use crate::error::{Result, WallMeshError};
use crate::mesh::geometry::rotate_about_point;
use crate::mesh::types::{ElementId, Point, Vec3};
use nalgebra::UnitQuaternion;
use std::any::Any;
use std::fmt::Debug;

/// Which rigid-body motions leave a property unchanged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInvariance {
    pub scale: bool,
    pub translate: bool,
    pub rotate: bool,
}

impl FrameInvariance {
    /// Unaffected by any motion (flags, ids, counters)
    pub const INVARIANT: Self = Self {
        scale: true,
        translate: true,
        rotate: true,
    };
    /// Changes only under scaling (areas, lengths)
    pub const TRANS_ROT_INVARIANT: Self = Self {
        scale: false,
        translate: true,
        rotate: true,
    };
    /// Changes only under rotation (unit directions)
    pub const SCALE_TRANS_INVARIANT: Self = Self {
        scale: true,
        translate: true,
        rotate: false,
    };
    /// Follows every motion (positions)
    pub const VARIANT: Self = Self {
        scale: false,
        translate: false,
        rotate: false,
    };

    /// Whether a motion of the given kinds touches this property
    pub fn affected_by(&self, scale: bool, translate: bool, rotate: bool) -> bool {
        (scale && !self.scale) || (translate && !self.translate) || (rotate && !self.rotate)
    }

    pub fn affected_by_motion(&self, motion: &Motion) -> bool {
        match motion {
            Motion::Translate(_) => self.affected_by(false, true, false),
            Motion::Rotate { .. } => self.affected_by(false, false, true),
            Motion::Scale { .. } => self.affected_by(true, false, false),
        }
    }
}

/// Rigid-body motion dispatched to tagged containers
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Motion {
    Translate(Vec3),
    /// Rotation by `q` about the fixed point `pivot`
    Rotate {
        q: UnitQuaternion<f64>,
        pivot: Point,
    },
    /// Scaling by `factor` about the fixed point `origin`
    Scale { factor: f64, origin: Point },
}

/// When a property travels with its element between processes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommMode {
    /// Recomputed locally, never sent
    None,
    /// Sent when an element migrates to another owner
    Exchange,
    /// Sent on migration and on ghost synchronisation
    ExchangeBorders,
}

/// Transfer scope of a pack/unpack call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommScope {
    Exchange,
    Borders,
}

impl CommMode {
    pub fn included_in(&self, scope: CommScope) -> bool {
        match (self, scope) {
            (CommMode::None, _) => false,
            (CommMode::Exchange, CommScope::Exchange) => true,
            (CommMode::Exchange, CommScope::Borders) => false,
            (CommMode::ExchangeBorders, _) => true,
        }
    }
}

/// Declared transform and communication behaviour of a container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertySpec {
    pub frame: FrameInvariance,
    pub comm: CommMode,
}

impl PropertySpec {
    pub const fn new(frame: FrameInvariance, comm: CommMode) -> Self {
        Self { frame, comm }
    }
}

/// Value stored per element in a [`Container`]
pub trait PropertyValue: Copy + Debug + 'static {
    /// Number of f64 words used when packed
    const WIDTH: usize;

    /// Value of a freshly added or reset element
    fn initial() -> Self;

    fn scale(&mut self, _factor: f64) {}

    fn translate(&mut self, _delta: &Vec3) {}

    fn rotate(&mut self, _q: &UnitQuaternion<f64>) {}

    /// Apply `motion`; only positions see the fixed point of a rotation or scaling
    fn apply(&mut self, motion: &Motion) {
        match motion {
            Motion::Translate(delta) => self.translate(delta),
            Motion::Rotate { q, pivot } => {
                self.translate(&-pivot.coords);
                self.rotate(q);
                self.translate(&pivot.coords);
            }
            Motion::Scale { factor, origin } => {
                self.translate(&-origin.coords);
                self.scale(*factor);
                self.translate(&origin.coords);
            }
        }
    }

    fn pack(&self, buf: &mut Vec<f64>);

    fn unpack(buf: &[f64]) -> Self;
}

impl PropertyValue for f64 {
    const WIDTH: usize = 1;

    fn initial() -> Self {
        0.0
    }

    fn scale(&mut self, factor: f64) {
        *self *= factor;
    }

    fn pack(&self, buf: &mut Vec<f64>) {
        buf.push(*self);
    }

    fn unpack(buf: &[f64]) -> Self {
        buf[0]
    }
}

impl PropertyValue for bool {
    const WIDTH: usize = 1;

    fn initial() -> Self {
        false
    }

    fn pack(&self, buf: &mut Vec<f64>) {
        buf.push(if *self { 1.0 } else { 0.0 });
    }

    fn unpack(buf: &[f64]) -> Self {
        buf[0] != 0.0
    }
}

impl PropertyValue for i64 {
    const WIDTH: usize = 1;

    fn initial() -> Self {
        0
    }

    fn pack(&self, buf: &mut Vec<f64>) {
        buf.push(*self as f64);
    }

    fn unpack(buf: &[f64]) -> Self {
        buf[0] as i64
    }
}

impl PropertyValue for Option<ElementId> {
    const WIDTH: usize = 1;

    fn initial() -> Self {
        None
    }

    fn pack(&self, buf: &mut Vec<f64>) {
        buf.push(self.map_or(-1.0, |id| id.0 as f64));
    }

    fn unpack(buf: &[f64]) -> Self {
        if buf[0] < 0.0 {
            None
        } else {
            Some(ElementId(buf[0] as u64))
        }
    }
}

impl PropertyValue for Vec3 {
    const WIDTH: usize = 3;

    fn initial() -> Self {
        Vec3::zeros()
    }

    fn scale(&mut self, factor: f64) {
        *self *= factor;
    }

    fn rotate(&mut self, q: &UnitQuaternion<f64>) {
        *self = q * *self;
    }

    fn pack(&self, buf: &mut Vec<f64>) {
        buf.extend_from_slice(self.as_slice());
    }

    fn unpack(buf: &[f64]) -> Self {
        Vec3::new(buf[0], buf[1], buf[2])
    }
}

impl PropertyValue for Point {
    const WIDTH: usize = 3;

    fn initial() -> Self {
        Point::origin()
    }

    fn scale(&mut self, factor: f64) {
        self.coords *= factor;
    }

    fn translate(&mut self, delta: &Vec3) {
        *self += delta;
    }

    fn rotate(&mut self, q: &UnitQuaternion<f64>) {
        *self = q * *self;
    }

    fn apply(&mut self, motion: &Motion) {
        *self = match motion {
            Motion::Translate(delta) => *self + delta,
            Motion::Rotate { q, pivot } => rotate_about_point(self, q, pivot),
            Motion::Scale { factor, origin } => origin + (*self - origin) * *factor,
        };
    }

    fn pack(&self, buf: &mut Vec<f64>) {
        buf.extend_from_slice(self.coords.as_slice());
    }

    fn unpack(buf: &[f64]) -> Self {
        Point::new(buf[0], buf[1], buf[2])
    }
}

impl<T: PropertyValue, const N: usize> PropertyValue for [T; N] {
    const WIDTH: usize = T::WIDTH * N;

    fn initial() -> Self {
        [T::initial(); N]
    }

    fn scale(&mut self, factor: f64) {
        self.iter_mut().for_each(|v| v.scale(factor));
    }

    fn translate(&mut self, delta: &Vec3) {
        self.iter_mut().for_each(|v| v.translate(delta));
    }

    fn rotate(&mut self, q: &UnitQuaternion<f64>) {
        self.iter_mut().for_each(|v| v.rotate(q));
    }

    fn apply(&mut self, motion: &Motion) {
        self.iter_mut().for_each(|v| v.apply(motion));
    }

    fn pack(&self, buf: &mut Vec<f64>) {
        self.iter().for_each(|v| v.pack(buf));
    }

    fn unpack(buf: &[f64]) -> Self {
        std::array::from_fn(|k| T::unpack(&buf[k * T::WIDTH..]))
    }
}

/// Typed per-element storage with a declared [`PropertySpec`]
#[derive(Debug, Clone)]
pub struct Container<T: PropertyValue> {
    spec: PropertySpec,
    data: Vec<T>,
}

/// One value per element
pub type ScalarContainer<T> = Container<T>;

/// A fixed-length vector per element
pub type VectorContainer<T, const N: usize> = Container<[T; N]>;

/// N three-component vectors per element
pub type MultiVectorContainer<const N: usize> = Container<[Vec3; N]>;

impl<T: PropertyValue> Container<T> {
    pub fn new(spec: PropertySpec) -> Self {
        Self {
            spec,
            data: Vec::new(),
        }
    }

    pub fn spec(&self) -> &PropertySpec {
        &self.spec
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn push(&mut self, value: T) {
        self.data.push(value);
    }

    pub fn get(&self, i: usize) -> Option<&T> {
        self.data.get(i)
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.data.iter()
    }

    pub fn set(&mut self, i: usize, value: T) {
        self.data[i] = value;
    }

    pub fn fill(&mut self, value: T) {
        self.data.iter_mut().for_each(|v| *v = value);
    }

    pub fn truncate(&mut self, len: usize) {
        self.data.truncate(len);
    }

    pub fn remove(&mut self, i: usize) -> T {
        self.data.remove(i)
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Apply `motion` to every element unless the frame tag exempts this container
    pub fn apply(&mut self, motion: &Motion) -> bool {
        if !self.spec.frame.affected_by_motion(motion) {
            return false;
        }
        self.data.iter_mut().for_each(|v| v.apply(motion));
        true
    }
}

impl<T: PropertyValue> std::ops::Index<usize> for Container<T> {
    type Output = T;

    fn index(&self, i: usize) -> &T {
        &self.data[i]
    }
}

impl<T: PropertyValue> std::ops::IndexMut<usize> for Container<T> {
    fn index_mut(&mut self, i: usize) -> &mut T {
        &mut self.data[i]
    }
}

/// Object-safe view of a container, used by the registry
pub trait Property: Debug {
    fn spec(&self) -> &PropertySpec;
    fn len(&self) -> usize;
    fn width(&self) -> usize;
    fn push_default(&mut self);
    fn remove(&mut self, i: usize);
    fn truncate(&mut self, len: usize);
    /// Reset every value to its default
    fn reset(&mut self);
    /// Apply `motion` if the frame tag says it is affected, returns whether it was
    fn apply(&mut self, motion: &Motion) -> bool;
    fn pack_element(&self, i: usize, buf: &mut Vec<f64>);
    /// Append one element read from the front of `buf`, returns words consumed
    fn unpack_element(&mut self, buf: &[f64]) -> Result<usize>;
    /// Overwrite element `i` from the front of `buf`, returns words consumed
    fn unpack_into(&mut self, i: usize, buf: &[f64]) -> Result<usize>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: PropertyValue> Property for Container<T> {
    fn spec(&self) -> &PropertySpec {
        &self.spec
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn width(&self) -> usize {
        T::WIDTH
    }

    fn push_default(&mut self) {
        self.data.push(T::initial());
    }

    fn remove(&mut self, i: usize) {
        self.data.remove(i);
    }

    fn truncate(&mut self, len: usize) {
        self.data.truncate(len);
    }

    fn reset(&mut self) {
        self.data.iter_mut().for_each(|v| *v = T::initial());
    }

    fn apply(&mut self, motion: &Motion) -> bool {
        Container::<T>::apply(self, motion)
    }

    fn pack_element(&self, i: usize, buf: &mut Vec<f64>) {
        self.data[i].pack(buf);
    }

    fn unpack_element(&mut self, buf: &[f64]) -> Result<usize> {
        check_width::<T>(buf)?;
        self.data.push(T::unpack(buf));
        Ok(T::WIDTH)
    }

    fn unpack_into(&mut self, i: usize, buf: &[f64]) -> Result<usize> {
        check_width::<T>(buf)?;
        let slot = self.data.get_mut(i).ok_or_else(|| {
            WallMeshError::PropertyError(format!("no element {} to unpack into", i))
        })?;
        *slot = T::unpack(buf);
        Ok(T::WIDTH)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn check_width<T: PropertyValue>(buf: &[f64]) -> Result<()> {
    if buf.len() < T::WIDTH {
        return Err(WallMeshError::PropertyError(format!(
            "exchange buffer too short: need {} words, have {}",
            T::WIDTH,
            buf.len()
        )));
    }
    Ok(())
}
