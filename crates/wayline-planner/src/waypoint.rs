//! Dynamic waypoints
//!
//! A [`DynamicWaypoint`] is a named, mutable target the trajectory must pass
//! through. Besides its base position (and optional derivative constraints)
//! it carries a running positional offset: how far the waypoint has been
//! dragged since the current trajectory was generated. The offset bends
//! evaluation immediately and is absorbed into the base position by the next
//! successful regeneration.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use wayline_core::{Derivative, Vec3, Vertex};

/// Ordered waypoint sequence, head = time-earliest.
pub type WaypointDeque = VecDeque<DynamicWaypoint>;

/// A named, editable 3D waypoint with optional derivative constraints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicWaypoint {
    name: Option<String>,
    position: Vec3,
    velocity: Option<Vec3>,
    acceleration: Option<Vec3>,
    /// Duration from the previous waypoint, populated after optimization [s].
    assigned_segment_time: f64,
    /// Positional offset accumulated by in-flight edits.
    current_offset: Vec3,
}

impl DynamicWaypoint {
    /// Create an unnamed waypoint at a position.
    pub fn new(position: Vec3) -> Self {
        Self {
            name: None,
            position,
            velocity: None,
            acceleration: None,
            assigned_segment_time: 0.0,
            current_offset: Vec3::zeros(),
        }
    }

    /// Create a named waypoint at a position.
    pub fn named(name: impl Into<String>, position: Vec3) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::new(position)
        }
    }

    /// Attach a velocity constraint.
    pub fn with_velocity(mut self, velocity: Vec3) -> Self {
        self.velocity = Some(velocity);
        self
    }

    /// Attach an acceleration constraint.
    pub fn with_acceleration(mut self, acceleration: Vec3) -> Self {
        self.acceleration = Some(acceleration);
        self
    }

    /// Waypoint name, if set.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Base position: the position the current trajectory was optimized for.
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Actual target position: base position plus the in-flight offset.
    pub fn actual_position(&self) -> Vec3 {
        self.position + self.current_offset
    }

    /// Velocity constraint, if any.
    pub fn velocity(&self) -> Option<Vec3> {
        self.velocity
    }

    /// Acceleration constraint, if any.
    pub fn acceleration(&self) -> Option<Vec3> {
        self.acceleration
    }

    /// In-flight positional offset.
    pub fn current_offset(&self) -> Vec3 {
        self.current_offset
    }

    /// Duration from the previous waypoint [s]; 0 until optimized.
    pub fn assigned_segment_time(&self) -> f64 {
        self.assigned_segment_time
    }

    /// Whether every coordinate and constraint is finite.
    pub fn is_finite(&self) -> bool {
        let finite = |v: &Vec3| v.iter().all(|c| c.is_finite());
        finite(&self.position)
            && self.velocity.as_ref().map_or(true, finite)
            && self.acceleration.as_ref().map_or(true, finite)
    }

    pub(crate) fn set_assigned_segment_time(&mut self, time: f64) {
        self.assigned_segment_time = time;
    }

    pub(crate) fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    /// Record an edit as an offset from the base position.
    pub(crate) fn move_to(&mut self, target: Vec3) {
        self.current_offset = target - self.position;
    }

    /// Fold the in-flight offset into the base position.
    pub(crate) fn absorb_offset(&mut self) {
        self.position += self.current_offset;
        self.current_offset = Vec3::zeros();
    }

    /// Optimization vertex for the base position and explicit constraints.
    pub(crate) fn vertex(&self) -> Vertex {
        let mut vertex = Vertex::new(self.position);
        if let Some(v) = self.velocity {
            vertex.add_constraint(Derivative::Velocity, v);
        }
        if let Some(a) = self.acceleration {
            vertex.add_constraint(Derivative::Acceleration, a);
        }
        vertex
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_builder() {
        let wp = DynamicWaypoint::named("w1", Vec3::new(1.0, 2.0, 3.0))
            .with_velocity(Vec3::new(0.5, 0.0, 0.0));
        assert_eq!(wp.name(), Some("w1"));
        assert_eq!(wp.velocity(), Some(Vec3::new(0.5, 0.0, 0.0)));
        assert_eq!(wp.acceleration(), None);
        assert_relative_eq!(wp.assigned_segment_time(), 0.0);
    }

    #[test]
    fn test_move_and_absorb() {
        let mut wp = DynamicWaypoint::new(Vec3::new(2.0, -2.0, 2.0));
        wp.move_to(Vec3::new(2.2, -1.8, 2.2));

        assert_relative_eq!(wp.current_offset().x, 0.2, epsilon = 1e-12);
        assert_relative_eq!(wp.current_offset().y, 0.2, epsilon = 1e-12);
        assert_relative_eq!(wp.position().x, 2.0);
        assert_relative_eq!(wp.actual_position().x, 2.2, epsilon = 1e-12);

        wp.absorb_offset();
        assert_relative_eq!(wp.position().y, -1.8, epsilon = 1e-12);
        assert_relative_eq!(wp.current_offset().norm(), 0.0);
    }

    #[test]
    fn test_vertex_carries_constraints() {
        let wp = DynamicWaypoint::new(Vec3::new(1.0, 0.0, 0.0))
            .with_velocity(Vec3::new(0.0, 1.0, 0.0))
            .with_acceleration(Vec3::new(0.0, 0.0, 1.0));
        let vertex = wp.vertex();
        assert_eq!(vertex.position(), Some(Vec3::new(1.0, 0.0, 0.0)));
        assert_eq!(
            vertex.constraint(Derivative::Velocity),
            Some(Vec3::new(0.0, 1.0, 0.0))
        );
        assert_eq!(
            vertex.constraint(Derivative::Acceleration),
            Some(Vec3::new(0.0, 0.0, 1.0))
        );
    }

    #[test]
    fn test_is_finite() {
        let wp = DynamicWaypoint::new(Vec3::new(1.0, 2.0, 3.0));
        assert!(wp.is_finite());
        let bad = DynamicWaypoint::new(Vec3::new(f64::NAN, 0.0, 0.0));
        assert!(!bad.is_finite());
    }
}
