//! Error types for the wall mesh engine
//!
//! Every error in this crate describes an upstream programming or configuration
//! defect. Nothing is retried internally: errors are propagated to the host,
//! which is expected to abort the run.

use crate::mesh::types::ElementId;
use thiserror::Error;

/// Error types for wall mesh operations
#[derive(Error, Debug)]
pub enum WallMeshError {
    /// The global mesh area (sum over all processes) is zero or negative
    ///
    /// Raised by the area reduction in `refresh_owned`. A mesh without area
    /// cannot carry contacts and cannot be sampled.
    #[error("Mesh area must be positive, got {0}")]
    NonPositiveArea(f64),

    /// The Monte-Carlo estimate of the subdomain area did not converge
    #[error(
        "Local mesh area estimate failed after {rounds} rounds: \
         estimate {estimate}, global area {global}"
    )]
    AreaEstimateDiverged {
        rounds: usize,
        estimate: f64,
        global: f64,
    },

    /// A motion operator was called without a matching registration
    #[error("Illegal call to {0}: register the movement first")]
    MotionNotRegistered(&'static str),

    /// An element id is not known on this process (neither owned nor ghost)
    #[error("Unknown element id {0}")]
    UnknownElementId(ElementId),

    /// A contact record expected by the caller is absent
    #[error("Contact slot corrupted: particle {particle} has no record for element {element}")]
    ContactSlotCorrupt { particle: usize, element: ElementId },

    /// Mesh topology is invalid or corrupted
    ///
    /// Duplicate ids, out-of-range indices or owned elements added after ghosts.
    #[error("Invalid mesh topology: {0}")]
    InvalidMeshTopology(String),

    /// Geometric computation error
    ///
    /// Degenerate elements (zero-length edges, zero normals) or a zero
    /// rotation axis.
    #[error("Geometry error: {0}")]
    GeometryError(String),

    /// Property substrate misuse
    ///
    /// Unknown property names, type mismatches or malformed exchange buffers.
    #[error("Property error: {0}")]
    PropertyError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// File I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Convenience type alias for Results with [`WallMeshError`]
///
/// # Example
/// ```
/// use dem_wall_mesh::Result;
///
/// fn my_function() -> Result<()> {
///     Ok(())
/// }
/// ```
pub type Result<T> = std::result::Result<T, WallMeshError>;
