//! Particle-wall contact resolution, candidate search and contact history

pub mod candidates;
pub mod history;
pub mod resolver;
pub mod sweep;
pub mod types;

pub use candidates::*;
pub use history::*;
pub use resolver::*;
pub use sweep::*;
pub use types::*;
