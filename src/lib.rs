//! DEM Wall Mesh Library
//!
//! Triangulated wall geometry for parallel discrete-element simulations:
//! element storage with rigid motion, neighbour topology with edge and
//! corner ownership, sphere contact resolution and per-particle contact
//! history.

pub mod config;
pub mod contact;
pub mod error;
pub mod mesh;
pub mod parallel;
pub mod property;
pub mod random;

pub use error::{Result, WallMeshError};
