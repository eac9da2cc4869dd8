//! Geometry utilities: SE3 transforms and the geometry solver interface.

pub mod se3;
pub mod solver;

pub use se3::SE3;
pub use solver::{CandidateError, CandidateKind, GeometrySolver, RelativePoseCandidate};
