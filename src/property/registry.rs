//! Named property registry attached to a mesh

use crate::error::{Result, WallMeshError};
use crate::property::container::{
    CommScope, Container, Motion, Property, PropertySpec, PropertyValue,
};
use std::collections::BTreeMap;

/// Named per-element and global properties
///
/// Properties are kept ordered by name so that packing produces the same
/// layout on every process. Motions dispatch only to the containers whose
/// [`crate::property::FrameInvariance`] says they are affected.
#[derive(Debug, Default)]
pub struct PropertyRegistry {
    element: BTreeMap<String, Box<dyn Property>>,
    global: BTreeMap<String, Box<dyn Property>>,
    n_elements: usize,
}

impl PropertyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of elements every element property holds
    pub fn n_elements(&self) -> usize {
        self.n_elements
    }

    /// Register a per-element property, filled with defaults for existing elements
    pub fn add_element_property<T: PropertyValue>(
        &mut self,
        name: &str,
        spec: PropertySpec,
    ) -> Result<()> {
        if self.element.contains_key(name) {
            return Err(WallMeshError::PropertyError(format!(
                "element property '{}' already exists",
                name
            )));
        }

        let mut container = Container::<T>::new(spec);
        for _ in 0..self.n_elements {
            container.push(T::initial());
        }
        self.element.insert(name.to_string(), Box::new(container));
        log::debug!("registered element property '{}'", name);
        Ok(())
    }

    /// Register a global property with `len` default entries
    pub fn add_global_property<T: PropertyValue>(
        &mut self,
        name: &str,
        spec: PropertySpec,
        len: usize,
    ) -> Result<()> {
        if self.global.contains_key(name) {
            return Err(WallMeshError::PropertyError(format!(
                "global property '{}' already exists",
                name
            )));
        }

        let mut container = Container::<T>::new(spec);
        for _ in 0..len {
            container.push(T::initial());
        }
        self.global.insert(name.to_string(), Box::new(container));
        Ok(())
    }

    pub fn remove_element_property(&mut self, name: &str) -> bool {
        self.element.remove(name).is_some()
    }

    pub fn remove_global_property(&mut self, name: &str) -> bool {
        self.global.remove(name).is_some()
    }

    pub fn element_property<T: PropertyValue>(&self, name: &str) -> Result<&Container<T>> {
        lookup(&self.element, name)
    }

    pub fn element_property_mut<T: PropertyValue>(
        &mut self,
        name: &str,
    ) -> Result<&mut Container<T>> {
        lookup_mut(&mut self.element, name)
    }

    pub fn global_property<T: PropertyValue>(&self, name: &str) -> Result<&Container<T>> {
        lookup(&self.global, name)
    }

    pub fn global_property_mut<T: PropertyValue>(
        &mut self,
        name: &str,
    ) -> Result<&mut Container<T>> {
        lookup_mut(&mut self.global, name)
    }

    /// Append one default entry to every element property
    pub fn grow(&mut self) {
        self.element.values_mut().for_each(|p| p.push_default());
        self.n_elements += 1;
    }

    /// Remove element `i` from every element property, preserving order
    pub fn remove(&mut self, i: usize) {
        self.element.values_mut().for_each(|p| p.remove(i));
        self.n_elements -= 1;
    }

    pub fn truncate(&mut self, len: usize) {
        self.element.values_mut().for_each(|p| p.truncate(len));
        self.n_elements = self.n_elements.min(len);
    }

    /// Apply `motion` to every element and global property it affects
    pub fn apply(&mut self, motion: &Motion) {
        for p in self.all_mut() {
            p.apply(motion);
        }
    }

    /// Reset element properties affected by any of the given motions
    pub fn clear(&mut self, scale: bool, translate: bool, rotate: bool) {
        for p in self.element.values_mut() {
            if p.spec().frame.affected_by(scale, translate, rotate) {
                p.reset();
            }
        }
    }

    /// Append the properties of element `i` travelling in `scope` to `buf`
    pub fn pack_element(&self, i: usize, scope: CommScope, buf: &mut Vec<f64>) {
        for p in self.element.values() {
            if p.spec().comm.included_in(scope) {
                p.pack_element(i, buf);
            }
        }
    }

    /// Append one element from `buf`, returns words consumed
    ///
    /// Properties not travelling in `scope` receive defaults.
    pub fn unpack_element(&mut self, buf: &[f64], scope: CommScope) -> Result<usize> {
        let mut offset = 0;
        for p in self.element.values_mut() {
            if p.spec().comm.included_in(scope) {
                offset += p.unpack_element(&buf[offset.min(buf.len())..])?;
            } else {
                p.push_default();
            }
        }
        self.n_elements += 1;
        Ok(offset)
    }

    /// Words per element packed in `scope`
    pub fn element_width(&self, scope: CommScope) -> usize {
        self.element
            .values()
            .filter(|p| p.spec().comm.included_in(scope))
            .map(|p| p.width())
            .sum()
    }

    fn all_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn Property>> {
        self.element.values_mut().chain(self.global.values_mut())
    }
}

fn lookup<'a, T: PropertyValue>(
    map: &'a BTreeMap<String, Box<dyn Property>>,
    name: &str,
) -> Result<&'a Container<T>> {
    map.get(name)
        .ok_or_else(|| WallMeshError::PropertyError(format!("unknown property '{}'", name)))?
        .as_any()
        .downcast_ref::<Container<T>>()
        .ok_or_else(|| {
            WallMeshError::PropertyError(format!("property '{}' has a different type", name))
        })
}

fn lookup_mut<'a, T: PropertyValue>(
    map: &'a mut BTreeMap<String, Box<dyn Property>>,
    name: &str,
) -> Result<&'a mut Container<T>> {
    map.get_mut(name)
        .ok_or_else(|| WallMeshError::PropertyError(format!("unknown property '{}'", name)))?
        .as_any_mut()
        .downcast_mut::<Container<T>>()
        .ok_or_else(|| {
            WallMeshError::PropertyError(format!("property '{}' has a different type", name))
        })
}
