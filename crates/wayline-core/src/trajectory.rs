//! Time-parameterized piecewise polynomials in 3D
//!
//! A [`Trajectory`] is an immutable sequence of [`Segment`]s produced by the
//! optimizer. Local time runs over `[0, max_time()]`; evaluation clamps out
//! of range queries to the domain boundary.

use crate::polynomial::Polynomial;
use crate::Vec3;

/// One polynomial segment between two consecutive vertices.
///
/// The per-axis polynomials are parameterized on normalized time
/// `tau = t / duration`, which keeps the optimizer's constraint system well
/// conditioned for long segments. Derivatives are rescaled back to real time
/// on evaluation.
#[derive(Debug, Clone)]
pub struct Segment {
    duration: f64,
    axes: [Polynomial; 3],
}

impl Segment {
    /// Create a segment from its duration and one normalized-time polynomial
    /// per axis.
    pub fn new(duration: f64, axes: [Polynomial; 3]) -> Self {
        Self { duration, axes }
    }

    /// Segment duration [s].
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Evaluate the `order`-th derivative at segment-local time `t`.
    pub fn evaluate(&self, t: f64, order: usize) -> Vec3 {
        let tau = t / self.duration;
        let scale = self.duration.powi(order as i32);
        Vec3::new(
            self.axes[0].eval_derivative(tau, order) / scale,
            self.axes[1].eval_derivative(tau, order) / scale,
            self.axes[2].eval_derivative(tau, order) / scale,
        )
    }
}

/// An immutable piecewise polynomial trajectory in 3D.
#[derive(Debug, Clone)]
pub struct Trajectory {
    segments: Vec<Segment>,
    /// Start time of each segment on the local time axis.
    start_times: Vec<f64>,
    total_time: f64,
}

impl Trajectory {
    /// Assemble a trajectory from its segments.
    pub fn new(segments: Vec<Segment>) -> Self {
        let mut start_times = Vec::with_capacity(segments.len());
        let mut t = 0.0;
        for segment in &segments {
            start_times.push(t);
            t += segment.duration();
        }
        Self {
            segments,
            start_times,
            total_time: t,
        }
    }

    /// Lower bound of the local time domain (always 0).
    pub fn min_time(&self) -> f64 {
        0.0
    }

    /// Upper bound of the local time domain [s].
    pub fn max_time(&self) -> f64 {
        self.total_time
    }

    /// Number of polynomial segments.
    pub fn num_segments(&self) -> usize {
        self.segments.len()
    }

    /// Per-segment durations [s].
    pub fn segment_times(&self) -> Vec<f64> {
        self.segments.iter().map(Segment::duration).collect()
    }

    /// Cumulative local times of the vertices, including 0 and `max_time()`.
    pub fn waypoint_times(&self) -> Vec<f64> {
        let mut times = self.start_times.clone();
        times.push(self.total_time);
        times
    }

    /// Evaluate the `order`-th derivative at local time `t`.
    ///
    /// `t` is clamped to `[0, max_time()]` before sampling.
    pub fn evaluate(&self, t: f64, order: usize) -> Vec3 {
        let t = t.clamp(0.0, self.total_time);
        let idx = self.segment_index(t);
        let local = t - self.start_times[idx];
        self.segments[idx].evaluate(local, order)
    }

    fn segment_index(&self, t: f64) -> usize {
        // Last segment whose start time is <= t.
        match self.start_times.binary_search_by(|start| start.total_cmp(&t)) {
            Ok(idx) => idx,
            Err(insert) => insert.saturating_sub(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn line_segment(duration: f64, from: f64, to: f64) -> Segment {
        // Normalized time: x(tau) = from + (to - from) * tau.
        Segment::new(
            duration,
            [
                Polynomial::new(vec![from, to - from]),
                Polynomial::zero(),
                Polynomial::zero(),
            ],
        )
    }

    #[test]
    fn test_time_bounds() {
        let traj = Trajectory::new(vec![line_segment(2.0, 0.0, 4.0), line_segment(3.0, 4.0, 1.0)]);
        assert_relative_eq!(traj.min_time(), 0.0);
        assert_relative_eq!(traj.max_time(), 5.0);
        assert_eq!(traj.num_segments(), 2);
    }

    #[test]
    fn test_segment_lookup() {
        let traj = Trajectory::new(vec![line_segment(2.0, 0.0, 4.0), line_segment(3.0, 4.0, 1.0)]);
        // First segment: x(t) = 2t
        assert_relative_eq!(traj.evaluate(1.0, 0).x, 2.0);
        // Junction belongs to the second segment and is continuous
        assert_relative_eq!(traj.evaluate(2.0, 0).x, 4.0);
        // Second segment: x(t) = 4 - (t - 2)
        assert_relative_eq!(traj.evaluate(4.0, 0).x, 2.0);
    }

    #[test]
    fn test_evaluate_clamps() {
        let traj = Trajectory::new(vec![line_segment(2.0, 1.0, 3.0)]);
        assert_relative_eq!(traj.evaluate(-5.0, 0).x, 1.0);
        assert_relative_eq!(traj.evaluate(100.0, 0).x, 3.0);
    }

    #[test]
    fn test_waypoint_times() {
        let traj = Trajectory::new(vec![line_segment(2.0, 0.0, 4.0), line_segment(3.0, 4.0, 1.0)]);
        let times = traj.waypoint_times();
        assert_eq!(times.len(), 3);
        assert_relative_eq!(times[0], 0.0);
        assert_relative_eq!(times[1], 2.0);
        assert_relative_eq!(times[2], 5.0);
    }
}
