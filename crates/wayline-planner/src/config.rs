//! Planner configuration
//!
//! Tuning knobs for stitching, swap safety, and the background worker.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use wayline_core::Derivative;

/// Main planner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Maximum acceleration used by the segment-time estimator [m/s²]
    pub max_acceleration: f64,
    /// How far ahead of the consumer a regeneration stitches into the
    /// current trajectory [s]. Must exceed worst-case optimizer latency.
    pub stitch_horizon: f64,
    /// Fraction of the stitch horizon the optimizer may consume before a
    /// candidate is considered late and discarded.
    pub stitch_safety_coef: f64,
    /// Half-width of the no-swap zone around each waypoint [s].
    /// Disabled at 0.0; reserved knob.
    pub security_zone_width: f64,
    /// Derivative order whose squared norm the optimizer minimizes.
    pub derivative_to_optimize: Derivative,
    /// Worker poll interval while idle.
    pub worker_poll: Duration,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            // 1 g
            max_acceleration: 9.81,
            stitch_horizon: 4.0,
            stitch_safety_coef: 0.9,
            // Disabled; reserved for future use.
            security_zone_width: 0.0,
            derivative_to_optimize: Derivative::Acceleration,
            worker_poll: Duration::from_millis(1),
        }
    }
}
