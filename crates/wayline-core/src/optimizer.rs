//! Vertex constraints and the minimum-derivative segment fit
//!
//! Given an ordered list of [`Vertex`] constraints and per-segment durations,
//! [`generate_trajectory`] synthesizes a piecewise polynomial that passes
//! through every vertex position, honors every explicit derivative
//! constraint, and keeps the interior junctions smooth.
//!
//! The fit solves one dense linear system per axis: endpoint position rows
//! per segment, pinned derivative rows at the first and last vertex, and
//! high-order continuity rows at interior junctions. The polynomial basis is
//! the lowest degree able to hold the requested boundary constraints: quintic
//! for optimize orders up to jerk, degree 7 for snap.

use std::collections::BTreeMap;

use nalgebra::{DMatrix, Vector3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::polynomial::{basis_row, Polynomial};
use crate::trajectory::{Segment, Trajectory};
use crate::Vec3;

/// Shortest segment duration the time estimator will emit [s].
///
/// Coincident vertices would otherwise produce zero-length segments and a
/// degenerate constraint system.
pub const MIN_SEGMENT_TIME: f64 = 0.05;

/// Derivative orders of a position trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Derivative {
    Position,
    Velocity,
    Acceleration,
    Jerk,
    Snap,
}

impl Derivative {
    /// Numeric derivative order (position = 0).
    pub fn order(self) -> usize {
        match self {
            Derivative::Position => 0,
            Derivative::Velocity => 1,
            Derivative::Acceleration => 2,
            Derivative::Jerk => 3,
            Derivative::Snap => 4,
        }
    }
}

/// Optimizer errors
#[derive(Debug, Error)]
pub enum OptimizeError {
    #[error("at least two vertices are required, got {0}")]
    TooFewVertices(usize),
    #[error("expected {expected} segment times for {vertices} vertices, got {got}")]
    SegmentCountMismatch {
        vertices: usize,
        expected: usize,
        got: usize,
    },
    #[error("segment {0} has non-positive or non-finite duration {1}")]
    InvalidSegmentTime(usize, f64),
    #[error("vertex {0} carries no position constraint")]
    MissingPosition(usize),
    #[error("vertex {0} carries a non-finite constraint value")]
    NonFiniteConstraint(usize),
    #[error("vertex {vertex} constrains derivative order {order}, beyond what the basis can hold")]
    UnsupportedConstraint { vertex: usize, order: usize },
    #[error("constraint system is singular")]
    SingularSystem,
}

/// A single vertex of the optimization problem: constraint values keyed by
/// derivative order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Vertex {
    constraints: BTreeMap<usize, Vec3>,
}

impl Vertex {
    /// Create a vertex with a position constraint.
    pub fn new(position: Vec3) -> Self {
        let mut vertex = Self::default();
        vertex.add_constraint(Derivative::Position, position);
        vertex
    }

    /// Add (or replace) a constraint at the given derivative order.
    pub fn add_constraint(&mut self, derivative: Derivative, value: Vec3) {
        self.constraints.insert(derivative.order(), value);
    }

    /// Constraint value at the given derivative order, if any.
    pub fn constraint(&self, derivative: Derivative) -> Option<Vec3> {
        self.constraints.get(&derivative.order()).copied()
    }

    /// Whether a constraint exists at the given derivative order.
    pub fn has_constraint(&self, derivative: Derivative) -> bool {
        self.constraints.contains_key(&derivative.order())
    }

    /// Position constraint, if any.
    pub fn position(&self) -> Option<Vec3> {
        self.constraints.get(&0).copied()
    }

    fn by_order(&self, order: usize) -> Option<Vec3> {
        self.constraints.get(&order).copied()
    }

    fn highest_order(&self) -> usize {
        self.constraints.keys().next_back().copied().unwrap_or(0)
    }

    fn is_finite(&self) -> bool {
        self.constraints
            .values()
            .all(|v| v.iter().all(|c| c.is_finite()))
    }
}

/// Estimate per-segment durations for a vertex position sequence.
///
/// Trapezoidal velocity profile from rest: short segments are acceleration
/// limited, long ones cruise at `v_max`. Durations are clamped below by
/// [`MIN_SEGMENT_TIME`].
pub fn estimate_segment_times(positions: &[Vector3<f64>], v_max: f64, a_max: f64) -> Vec<f64> {
    positions
        .windows(2)
        .map(|pair| {
            let distance = (pair[1] - pair[0]).norm();
            let time = if v_max * v_max >= distance * a_max {
                // v_max is never reached: accelerate to the midpoint, brake after.
                2.0 * (distance / a_max).sqrt()
            } else {
                distance / v_max + v_max / a_max
            };
            time.max(MIN_SEGMENT_TIME)
        })
        .collect()
}

/// Fit a piecewise polynomial trajectory through the given vertices.
///
/// `times` holds one duration per segment (`vertices.len() - 1` entries).
/// Unconstrained derivatives at the first and last vertex are pinned to zero
/// up to the boundary order of the basis; interior vertices keep their free
/// derivatives continuous across the junction. An interior vertex with an
/// explicit derivative constraint pins that order on both adjacent segments,
/// at the cost of the highest-order continuity equation at that junction.
pub fn generate_trajectory(
    vertices: &[Vertex],
    times: &[f64],
    derivative_to_optimize: Derivative,
) -> Result<Trajectory, OptimizeError> {
    if vertices.len() < 2 {
        return Err(OptimizeError::TooFewVertices(vertices.len()));
    }
    let num_segments = vertices.len() - 1;
    if times.len() != num_segments {
        return Err(OptimizeError::SegmentCountMismatch {
            vertices: vertices.len(),
            expected: num_segments,
            got: times.len(),
        });
    }
    for (i, &t) in times.iter().enumerate() {
        if !t.is_finite() || t <= 0.0 {
            return Err(OptimizeError::InvalidSegmentTime(i, t));
        }
    }

    // Lowest basis order able to hold boundary constraints up to k-1.
    let k = derivative_to_optimize.order().max(3);
    let num_coeffs = 2 * k;

    for (i, vertex) in vertices.iter().enumerate() {
        if vertex.position().is_none() {
            return Err(OptimizeError::MissingPosition(i));
        }
        if !vertex.is_finite() {
            return Err(OptimizeError::NonFiniteConstraint(i));
        }
        if vertex.highest_order() > k - 1 {
            return Err(OptimizeError::UnsupportedConstraint {
                vertex: i,
                order: vertex.highest_order(),
            });
        }
    }

    let system = ConstraintSystem::assemble(vertices, times, k, num_coeffs);
    let solution = system.solve()?;

    let segments = (0..num_segments)
        .map(|i| {
            let block = i * num_coeffs;
            let axes = [0, 1, 2].map(|axis| {
                Polynomial::new(
                    (0..num_coeffs)
                        .map(|c| solution[(block + c, axis)])
                        .collect(),
                )
            });
            Segment::new(times[i], axes)
        })
        .collect();

    Ok(Trajectory::new(segments))
}

/// Dense constraint system for one trajectory, shared by all three axes.
struct ConstraintSystem {
    a: DMatrix<f64>,
    b: DMatrix<f64>,
    cursor: usize,
}

impl ConstraintSystem {
    /// Build the system on normalized segment time `tau = t / duration`.
    ///
    /// A real-time derivative constraint of order `d` becomes a normalized
    /// constraint scaled by `duration^d`; continuity rows rescale both sides
    /// so the entries stay of order one regardless of segment length.
    fn assemble(vertices: &[Vertex], times: &[f64], k: usize, num_coeffs: usize) -> Self {
        let num_segments = times.len();
        let n = num_segments * num_coeffs;
        let mut system = Self {
            a: DMatrix::zeros(n, n),
            b: DMatrix::zeros(n, 3),
            cursor: 0,
        };

        // Endpoint positions of every segment.
        for i in 0..num_segments {
            let p_start = vertices[i].position().unwrap_or_else(Vec3::zeros);
            let p_end = vertices[i + 1].position().unwrap_or_else(Vec3::zeros);
            system.push_row(i, num_coeffs, 0, 0.0, times[i], p_start);
            system.push_row(i, num_coeffs, 0, 1.0, times[i], p_end);
        }

        // Boundary derivatives 1..k-1: explicit constraint or zero.
        for order in 1..k {
            let start = vertices[0].by_order(order).unwrap_or_else(Vec3::zeros);
            system.push_row(0, num_coeffs, order, 0.0, times[0], start);

            let last = num_segments - 1;
            let end = vertices[vertices.len() - 1]
                .by_order(order)
                .unwrap_or_else(Vec3::zeros);
            system.push_row(last, num_coeffs, order, 1.0, times[last], end);
        }

        // Interior junctions: pinned derivatives and continuity.
        for junction in 1..num_segments {
            let left = junction - 1;
            let right = junction;
            let vertex = &vertices[junction];

            let pinned: Vec<usize> = (1..k).filter(|&d| vertex.by_order(d).is_some()).collect();
            for &order in &pinned {
                let value = vertex.by_order(order).unwrap_or_else(Vec3::zeros);
                system.push_row(left, num_coeffs, order, 1.0, times[left], value);
                system.push_row(right, num_coeffs, order, 0.0, times[right], value);
            }

            // Pinning consumes a degree of freedom: drop as many of the
            // highest-order continuity equations as orders were pinned.
            let mut to_drop = pinned.len();
            for order in (1..=2 * k - 2).rev() {
                if pinned.contains(&order) {
                    continue;
                }
                if to_drop > 0 {
                    to_drop -= 1;
                    continue;
                }
                system.push_continuity_row(left, right, num_coeffs, order, times[left], times[right]);
            }
        }

        debug_assert_eq!(system.cursor, n);
        system
    }

    /// Constrain the `order`-th real-time derivative of segment `seg` at
    /// normalized time `tau`.
    fn push_row(
        &mut self,
        seg: usize,
        num_coeffs: usize,
        order: usize,
        tau: f64,
        duration: f64,
        value: Vec3,
    ) {
        let row = self.cursor;
        let block = seg * num_coeffs;
        let mut scratch = vec![0.0; num_coeffs];
        basis_row(num_coeffs, order, tau, &mut scratch);
        for (c, &v) in scratch.iter().enumerate() {
            self.a[(row, block + c)] = v;
        }
        let scale = duration.powi(order as i32);
        for axis in 0..3 {
            self.b[(row, axis)] = value[axis] * scale;
        }
        self.cursor += 1;
    }

    /// Equate the `order`-th real-time derivative across a junction: left
    /// segment at its end, right segment at its start.
    fn push_continuity_row(
        &mut self,
        left: usize,
        right: usize,
        num_coeffs: usize,
        order: usize,
        duration_left: f64,
        duration_right: f64,
    ) {
        let row = self.cursor;
        let mut scratch = vec![0.0; num_coeffs];
        let scale = duration_left.min(duration_right).powi(order as i32);

        basis_row(num_coeffs, order, 1.0, &mut scratch);
        let left_block = left * num_coeffs;
        let left_scale = scale / duration_left.powi(order as i32);
        for (c, &v) in scratch.iter().enumerate() {
            self.a[(row, left_block + c)] = v * left_scale;
        }

        basis_row(num_coeffs, order, 0.0, &mut scratch);
        let right_block = right * num_coeffs;
        let right_scale = scale / duration_right.powi(order as i32);
        for (c, &v) in scratch.iter().enumerate() {
            self.a[(row, right_block + c)] -= v * right_scale;
        }
        self.cursor += 1;
    }

    fn solve(self) -> Result<DMatrix<f64>, OptimizeError> {
        self.a
            .lu()
            .solve(&self.b)
            .ok_or(OptimizeError::SingularSystem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn assert_vec_eq(a: Vec3, b: Vec3, eps: f64) {
        assert_relative_eq!(a.x, b.x, epsilon = eps);
        assert_relative_eq!(a.y, b.y, epsilon = eps);
        assert_relative_eq!(a.z, b.z, epsilon = eps);
    }

    #[test]
    fn test_too_few_vertices() {
        let v = vec![Vertex::new(Vec3::zeros())];
        assert!(matches!(
            generate_trajectory(&v, &[], Derivative::Acceleration),
            Err(OptimizeError::TooFewVertices(1))
        ));
    }

    #[test]
    fn test_segment_count_mismatch() {
        let v = vec![Vertex::new(Vec3::zeros()), Vertex::new(Vec3::x())];
        assert!(matches!(
            generate_trajectory(&v, &[1.0, 2.0], Derivative::Acceleration),
            Err(OptimizeError::SegmentCountMismatch { .. })
        ));
    }

    #[test]
    fn test_invalid_segment_time() {
        let v = vec![Vertex::new(Vec3::zeros()), Vertex::new(Vec3::x())];
        assert!(matches!(
            generate_trajectory(&v, &[-1.0], Derivative::Acceleration),
            Err(OptimizeError::InvalidSegmentTime(0, _))
        ));
    }

    #[test]
    fn test_two_vertex_boundary_conditions() {
        let start = Vec3::new(0.0, 0.0, 0.0);
        let end = Vec3::new(2.0, -1.0, 3.0);
        let v = vec![Vertex::new(start), Vertex::new(end)];
        let traj = generate_trajectory(&v, &[2.0], Derivative::Acceleration).unwrap();

        assert_vec_eq(traj.evaluate(0.0, 0), start, 1e-9);
        assert_vec_eq(traj.evaluate(2.0, 0), end, 1e-9);
        // Free boundary derivatives are pinned to zero.
        assert_vec_eq(traj.evaluate(0.0, 1), Vec3::zeros(), 1e-9);
        assert_vec_eq(traj.evaluate(0.0, 2), Vec3::zeros(), 1e-9);
        assert_vec_eq(traj.evaluate(2.0, 1), Vec3::zeros(), 1e-9);
        assert_vec_eq(traj.evaluate(2.0, 2), Vec3::zeros(), 1e-9);
    }

    #[test]
    fn test_explicit_boundary_derivatives() {
        let mut start = Vertex::new(Vec3::zeros());
        start.add_constraint(Derivative::Velocity, Vec3::new(1.0, 0.5, -0.25));
        start.add_constraint(Derivative::Acceleration, Vec3::new(0.0, -1.0, 0.5));
        let end = Vertex::new(Vec3::new(4.0, 4.0, 4.0));

        let traj =
            generate_trajectory(&[start, end], &[3.0], Derivative::Acceleration).unwrap();
        assert_vec_eq(traj.evaluate(0.0, 1), Vec3::new(1.0, 0.5, -0.25), 1e-9);
        assert_vec_eq(traj.evaluate(0.0, 2), Vec3::new(0.0, -1.0, 0.5), 1e-9);
        assert_vec_eq(traj.evaluate(3.0, 0), Vec3::new(4.0, 4.0, 4.0), 1e-9);
    }

    #[test]
    fn test_interior_continuity() {
        let v = vec![
            Vertex::new(Vec3::new(0.0, 0.0, 0.0)),
            Vertex::new(Vec3::new(1.0, 2.0, -1.0)),
            Vertex::new(Vec3::new(3.0, 0.0, 1.0)),
        ];
        let times = [1.5, 2.0];
        let traj = generate_trajectory(&v, &times, Derivative::Acceleration).unwrap();

        // Passes through the interior vertex.
        assert_vec_eq(traj.evaluate(1.5, 0), Vec3::new(1.0, 2.0, -1.0), 1e-9);

        // Derivatives up to order 4 are continuous across the junction.
        let eps = 1e-6;
        for order in 1..=4 {
            let before = traj.evaluate(1.5 - 1e-9, order);
            let after = traj.evaluate(1.5 + 1e-9, order);
            assert_vec_eq(before, after, eps);
        }
    }

    #[test]
    fn test_interior_velocity_pin() {
        let mut mid = Vertex::new(Vec3::new(1.0, 1.0, 1.0));
        mid.add_constraint(Derivative::Velocity, Vec3::new(0.5, 0.0, 0.0));
        let v = vec![Vertex::new(Vec3::zeros()), mid, Vertex::new(Vec3::new(2.0, 0.0, 2.0))];
        let traj = generate_trajectory(&v, &[2.0, 2.0], Derivative::Acceleration).unwrap();

        assert_vec_eq(traj.evaluate(2.0 - 1e-9, 1), Vec3::new(0.5, 0.0, 0.0), 1e-6);
        assert_vec_eq(traj.evaluate(2.0 + 1e-9, 1), Vec3::new(0.5, 0.0, 0.0), 1e-6);
    }

    #[test]
    fn test_snap_basis_order() {
        let v = vec![Vertex::new(Vec3::zeros()), Vertex::new(Vec3::new(1.0, 1.0, 0.0))];
        let traj = generate_trajectory(&v, &[2.0], Derivative::Snap).unwrap();
        // Degree-7 basis pins boundary derivatives up to jerk.
        assert_vec_eq(traj.evaluate(0.0, 3), Vec3::zeros(), 1e-9);
        assert_vec_eq(traj.evaluate(2.0, 3), Vec3::zeros(), 1e-9);
    }

    #[test]
    fn test_estimate_segment_times() {
        let positions = vec![
            Vec3::zeros(),
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::new(10.0, 0.1, 0.0),
            Vec3::new(10.0, 0.1, 0.0),
        ];
        let times = estimate_segment_times(&positions, 2.0, 9.81);

        assert_eq!(times.len(), 3);
        // Long segment: cruise plus acceleration allowance.
        assert_relative_eq!(times[0], 10.0 / 2.0 + 2.0 / 9.81, epsilon = 1e-9);
        // Short segment: acceleration limited, v_max never reached.
        assert_relative_eq!(times[1], 2.0 * (0.1_f64 / 9.81).sqrt(), epsilon = 1e-9);
        // Degenerate segment: clamped.
        assert_relative_eq!(times[2], MIN_SEGMENT_TIME, epsilon = 1e-12);
    }

    #[test]
    fn test_stitch_continuity_between_trajectories() {
        // Build a trajectory, sample it mid-flight, and fit a second one
        // whose first vertex pins the sampled state. The junction must match
        // position, velocity, and acceleration exactly.
        let v = vec![
            Vertex::new(Vec3::new(0.0, 0.0, 0.0)),
            Vertex::new(Vec3::new(-1.0, 1.0, 1.0)),
            Vertex::new(Vec3::new(2.0, -2.0, 2.0)),
        ];
        let times = estimate_segment_times(
            &[
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(-1.0, 1.0, 1.0),
                Vec3::new(2.0, -2.0, 2.0),
            ],
            1.0,
            9.81,
        );
        let first = generate_trajectory(&v, &times, Derivative::Acceleration).unwrap();

        let t_stitch = 0.6 * first.max_time();
        let mut stitch = Vertex::new(first.evaluate(t_stitch, 0));
        stitch.add_constraint(Derivative::Velocity, first.evaluate(t_stitch, 1));
        stitch.add_constraint(Derivative::Acceleration, first.evaluate(t_stitch, 2));

        let second = generate_trajectory(
            &[stitch, Vertex::new(Vec3::new(5.0, 7.0, 2.0))],
            &[3.0],
            Derivative::Acceleration,
        )
        .unwrap();

        for order in 0..=2 {
            assert_vec_eq(
                first.evaluate(t_stitch, order),
                second.evaluate(0.0, order),
                1e-9,
            );
        }
    }
}
