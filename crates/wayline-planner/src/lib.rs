//! # Wayline Planner
//!
//! Dynamic trajectory planner for aerial vehicles: a continuously-evaluable,
//! smooth motion reference (position, velocity, acceleration) through a
//! waypoint sequence that can be edited while the vehicle flies it.
//!
//! A [`DynamicPlanner`] owns the current polynomial trajectory and a
//! background worker. Producer calls (`set_waypoints`, `append_waypoint`,
//! `modify_waypoint`, `set_speed`) queue edits and wake the worker; the
//! worker regenerates a replacement trajectory stitched to the motion in
//! flight and swaps it in when safe. Consumer calls (`evaluate`,
//! `get_min_time`, `get_max_time`) never wait on the worker, so the
//! reference can be sampled at high rate throughout.
//!
//! # Architecture
//!
//! ```text
//! producer ──► pending buckets ──► worker ──► optimizer (wayline-core)
//!                                    │
//! consumer ──► evaluate ──► trajectory handle ◄── safe swap
//! ```
//!
//! # Modules
//!
//! - [`config`]: tuning knobs for stitching and swap safety
//! - [`waypoint`]: named, editable waypoints with derivative constraints
//! - [`handle`]: thread-safe handle to the current trajectory
//! - [`evaluator`]: stateless reference sampling with offset blending
//! - [`planner`]: the public planner facade

pub mod config;
pub mod evaluator;
pub mod handle;
pub mod planner;
pub mod waypoint;

mod modifier;
mod worker;

pub use config::PlannerConfig;
pub use evaluator::References;
pub use planner::{DynamicPlanner, PlannerError};
pub use waypoint::{DynamicWaypoint, WaypointDeque};

/// 3D vector type, re-exported from the core crate.
pub use wayline_core::Vec3;
