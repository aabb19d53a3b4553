//! # Wayline Core
//!
//! Piecewise polynomial trajectories in 3D and the segment optimizer that
//! synthesizes them from constrained vertices.
//!
//! This crate is the math collaborator of the dynamic planner: it knows
//! nothing about threads, waypoint editing, or time bases. It turns an
//! ordered set of vertex constraints plus per-segment durations into an
//! immutable [`Trajectory`] that can be evaluated at any derivative order.
//!
//! ## Modules
//!
//! - [`polynomial`]: single-axis polynomials and derivative evaluation
//! - [`trajectory`]: time-parameterized piecewise polynomials in 3D
//! - [`optimizer`]: vertex constraints, segment-time estimation, and the
//!   minimum-derivative segment fit

pub mod optimizer;
pub mod polynomial;
pub mod trajectory;

pub use optimizer::{
    estimate_segment_times, generate_trajectory, Derivative, OptimizeError, Vertex,
};
pub use polynomial::Polynomial;
pub use trajectory::{Segment, Trajectory};

use nalgebra::Vector3;

/// 3D vector type
pub type Vec3 = Vector3<f64>;
