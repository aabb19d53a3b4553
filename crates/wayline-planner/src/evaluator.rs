//! Stateless reference sampling
//!
//! Samples a trajectory at a local time and blends in the offsets of
//! waypoints that have been dragged since the trajectory was generated. The
//! blend is position-only: velocity and acceleration always come straight
//! from the polynomial.

use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};
use wayline_core::{Trajectory, Vec3};

use crate::modifier::influence;
use crate::waypoint::WaypointDeque;

/// Motion reference returned to the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct References {
    pub position: Vec3,
    pub velocity: Vec3,
    pub acceleration: Vec3,
}

impl Default for References {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            velocity: Vec3::zeros(),
            acceleration: Vec3::zeros(),
        }
    }
}

impl Index<usize> for References {
    type Output = Vec3;

    /// 0 = position, 1 = velocity, 2 = acceleration.
    fn index(&self, index: usize) -> &Vec3 {
        match index {
            0 => &self.position,
            1 => &self.velocity,
            2 => &self.acceleration,
            _ => panic!("invalid reference index {index}"),
        }
    }
}

impl IndexMut<usize> for References {
    fn index_mut(&mut self, index: usize) -> &mut Vec3 {
        match index {
            0 => &mut self.position,
            1 => &mut self.velocity,
            2 => &mut self.acceleration,
            _ => panic!("invalid reference index {index}"),
        }
    }
}

/// One dragged waypoint's contribution, located on the local time axis.
#[derive(Debug, Clone)]
pub(crate) struct OffsetInfluence {
    window_start: f64,
    peak: f64,
    window_end: f64,
    offset: Vec3,
}

/// Extract the influence windows of every waypoint with a nonzero offset.
///
/// Waypoint `i` peaks at its cumulative segment time and covers its two
/// adjacent segments; the first and last waypoint have one-sided windows.
pub(crate) fn collect_influences(deque: &WaypointDeque) -> Vec<OffsetInfluence> {
    let mut cumulative = Vec::with_capacity(deque.len());
    let mut t = 0.0;
    for waypoint in deque {
        t += waypoint.assigned_segment_time();
        cumulative.push(t);
    }

    deque
        .iter()
        .enumerate()
        .filter(|(_, waypoint)| waypoint.current_offset() != Vec3::zeros())
        .map(|(i, waypoint)| OffsetInfluence {
            window_start: if i == 0 { cumulative[0] } else { cumulative[i - 1] },
            peak: cumulative[i],
            window_end: *cumulative.get(i + 1).unwrap_or(&cumulative[i]),
            offset: waypoint.current_offset(),
        })
        .collect()
}

/// Sample the trajectory at local time `t_l` and apply offset blending.
pub(crate) fn sample(
    trajectory: &Trajectory,
    t_l: f64,
    influences: &[OffsetInfluence],
    refs: &mut References,
    only_positions: bool,
) {
    let t = t_l.clamp(0.0, trajectory.max_time());

    refs.position = trajectory.evaluate(t, 0);
    if !only_positions {
        refs.velocity = trajectory.evaluate(t, 1);
        refs.acceleration = trajectory.evaluate(t, 2);
    }

    for inf in influences {
        let phi = influence(t, inf.window_start, inf.peak, inf.window_end);
        if phi > 0.0 {
            refs.position += inf.offset * phi;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::waypoint::DynamicWaypoint;
    use approx::assert_relative_eq;
    use wayline_core::{generate_trajectory, Derivative, Vertex};

    fn straight_line() -> Trajectory {
        let vertices = [
            Vertex::new(Vec3::zeros()),
            Vertex::new(Vec3::new(4.0, 0.0, 0.0)),
        ];
        generate_trajectory(&vertices, &[4.0], Derivative::Acceleration).unwrap()
    }

    fn deque_with_offset(offset: Vec3) -> WaypointDeque {
        let mut first = DynamicWaypoint::new(Vec3::zeros());
        first.set_assigned_segment_time(0.0);
        let mut second = DynamicWaypoint::named("mid", Vec3::new(2.0, 0.0, 0.0));
        second.set_assigned_segment_time(2.0);
        let mut third = DynamicWaypoint::new(Vec3::new(4.0, 0.0, 0.0));
        third.set_assigned_segment_time(2.0);

        second.move_to(Vec3::new(2.0, 0.0, 0.0) + offset);

        let mut deque = WaypointDeque::new();
        deque.push_back(first);
        deque.push_back(second);
        deque.push_back(third);
        deque
    }

    #[test]
    fn test_references_indexing() {
        let mut refs = References::default();
        refs[0] = Vec3::new(1.0, 2.0, 3.0);
        refs[1] = Vec3::new(4.0, 5.0, 6.0);
        assert_eq!(refs.position, refs[0]);
        assert_eq!(refs.velocity, refs[1]);
        assert_eq!(refs.acceleration, refs[2]);
    }

    #[test]
    #[should_panic(expected = "invalid reference index")]
    fn test_references_invalid_index() {
        let refs = References::default();
        let _ = refs[3];
    }

    #[test]
    fn test_offset_peaks_at_waypoint_time() {
        let traj = straight_line();
        let offset = Vec3::new(0.0, 0.5, 0.0);
        let influences = collect_influences(&deque_with_offset(offset));
        assert_eq!(influences.len(), 1);

        let mut refs = References::default();
        sample(&traj, 2.0, &influences, &mut refs, false);
        assert_relative_eq!(refs.position.y, 0.5, epsilon = 1e-9);
        // Velocity is untouched by the blend.
        assert_relative_eq!(refs.velocity.y, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_offset_vanishes_outside_window() {
        let traj = straight_line();
        let influences = collect_influences(&deque_with_offset(Vec3::new(0.0, 0.5, 0.0)));

        let mut refs = References::default();
        sample(&traj, 0.0, &influences, &mut refs, true);
        assert_relative_eq!(refs.position.y, 0.0, epsilon = 1e-12);

        sample(&traj, 4.0, &influences, &mut refs, true);
        assert_relative_eq!(refs.position.y, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_no_offsets_no_influences() {
        let mut deque = WaypointDeque::new();
        deque.push_back(DynamicWaypoint::new(Vec3::zeros()));
        deque.push_back(DynamicWaypoint::new(Vec3::x()));
        assert!(collect_influences(&deque).is_empty());
    }
}
