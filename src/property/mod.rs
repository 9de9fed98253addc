//! Property substrate: typed containers with transform and communication tags

pub mod container;
pub mod registry;

pub use container::*;
pub use registry::*;
