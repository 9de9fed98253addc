//! Mesh data structures and operations

pub mod geometry;
pub mod node_store;
pub mod sampling;
pub mod surface;
pub mod types;

pub use geometry::*;
pub use node_store::*;
pub use surface::*;
pub use types::*;
