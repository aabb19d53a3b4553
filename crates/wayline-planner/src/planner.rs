//! Dynamic trajectory planner
//!
//! [`DynamicPlanner`] is the public face of the crate: it owns the pending
//! waypoint state, the numeric time bases, the current trajectory handle,
//! and the background worker that regenerates trajectories when the waypoint
//! set changes. Producer calls mutate pending state and wake the worker;
//! consumer calls sample the current trajectory and never wait on it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use thiserror::Error;
use tracing::{debug, warn};

use wayline_core::Vec3;

use crate::config::PlannerConfig;
use crate::evaluator::{self, References};
use crate::handle::TrajectoryHandle;
use crate::modifier::ModifierBook;
use crate::waypoint::{DynamicWaypoint, WaypointDeque};
use crate::worker;

/// Planner errors, reported synchronously at the producer call.
#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("at least 2 waypoints are required, got {0}")]
    TooFewWaypoints(usize),
    #[error("speed must be positive and finite, got {0}")]
    InvalidSpeed(f64),
    #[error("waypoint position must be finite")]
    NonFinitePosition,
}

/// Numeric time bases and speed, guarded by the parameters lock.
#[derive(Debug, Clone, Default)]
pub(crate) struct NumericParameters {
    /// Target cruise speed [m/s]; 0 until `set_speed` is called.
    pub speed: f64,
    pub last_local_time_evaluated: f64,
    pub last_global_time_evaluated: f64,
    /// Global time at which the current trajectory's local time is 0.
    pub t_offset: f64,
    pub global_time_last_trajectory_generated: f64,
}

/// Waypoint buckets and the modifier book, guarded by the waypoints lock.
#[derive(Debug, Default)]
pub(crate) struct WaypointBuckets {
    /// Waypoints of the current trajectory, head = time-earliest.
    pub active: WaypointDeque,
    /// Wholesale replacement for the next regeneration.
    pub to_be_set: Vec<DynamicWaypoint>,
    /// Accumulating appends for the next regeneration.
    pub to_be_appended: Vec<DynamicWaypoint>,
    pub modifiers: ModifierBook,
}

impl WaypointBuckets {
    fn knows_name(&self, name: &str) -> bool {
        self.active.iter().any(|w| w.name() == Some(name))
            || self.to_be_set.iter().any(|w| w.name() == Some(name))
            || self.to_be_appended.iter().any(|w| w.name() == Some(name))
    }
}

/// Worker wake signal: a condvar the trigger sites notify.
#[derive(Debug, Default)]
pub(crate) struct WorkerWake {
    pub lock: Mutex<()>,
    pub condvar: Condvar,
}

impl WorkerWake {
    pub fn notify(&self) {
        let _guard = self.lock.lock().expect("worker wake poisoned");
        self.condvar.notify_all();
    }
}

/// State shared between the planner facade and its worker.
///
/// Lock ordering: parameters before waypoints before the trajectory handle.
#[derive(Debug)]
pub(crate) struct PlannerShared {
    pub config: PlannerConfig,
    pub params: Mutex<NumericParameters>,
    pub waypoints: Mutex<WaypointBuckets>,
    pub vehicle_position: Mutex<Vec3>,
    pub trajectory: TrajectoryHandle,
    pub dirty: AtomicBool,
    pub stop: AtomicBool,
    pub regenerated: AtomicBool,
    pub wake: WorkerWake,
}

impl PlannerShared {
    fn new(config: PlannerConfig) -> Self {
        Self {
            config,
            params: Mutex::default(),
            waypoints: Mutex::default(),
            vehicle_position: Mutex::new(Vec3::zeros()),
            trajectory: TrajectoryHandle::new(),
            dirty: AtomicBool::new(false),
            stop: AtomicBool::new(false),
            regenerated: AtomicBool::new(false),
            wake: WorkerWake::default(),
        }
    }
}

/// Continuously-evaluable trajectory reference through an editable waypoint
/// sequence.
///
/// Construction spawns the background worker; dropping the planner stops and
/// joins it. Multiple planners coexist; there is no global state.
#[derive(Debug)]
pub struct DynamicPlanner {
    shared: Arc<PlannerShared>,
    worker: Option<JoinHandle<()>>,
}

impl DynamicPlanner {
    /// Create a planner with the default configuration.
    pub fn new() -> Self {
        Self::with_config(PlannerConfig::default())
    }

    /// Create a planner with an explicit configuration.
    pub fn with_config(config: PlannerConfig) -> Self {
        let shared = Arc::new(PlannerShared::new(config));
        let worker = worker::spawn(Arc::clone(&shared));
        Self {
            shared,
            worker: Some(worker),
        }
    }

    /// Queue a wholesale waypoint replacement and trigger regeneration.
    ///
    /// Any previously queued appends are discarded. Rejected if fewer than
    /// two waypoints or any non-finite position is given; state is unchanged
    /// on rejection.
    pub fn set_waypoints(&self, waypoints: Vec<DynamicWaypoint>) -> Result<(), PlannerError> {
        if waypoints.len() < 2 {
            return Err(PlannerError::TooFewWaypoints(waypoints.len()));
        }
        if !waypoints.iter().all(DynamicWaypoint::is_finite) {
            return Err(PlannerError::NonFinitePosition);
        }
        {
            let mut buckets = self.lock_waypoints();
            buckets.to_be_set = waypoints;
            buckets.to_be_appended.clear();
        }
        self.trigger_regeneration();
        Ok(())
    }

    /// Queue one waypoint to be appended to the tail and trigger
    /// regeneration. Appends accumulate until the next regeneration.
    pub fn append_waypoint(&self, waypoint: DynamicWaypoint) {
        self.lock_waypoints().to_be_appended.push(waypoint);
        self.trigger_regeneration();
    }

    /// Move the named waypoint to a new position.
    ///
    /// The edit is queued for the next regeneration and, when the name is
    /// present in the active deque, immediately applied as a live offset so
    /// evaluations start bending toward the new target. An unknown name is
    /// logged and ignored.
    pub fn modify_waypoint(&self, name: &str, position: Vec3) {
        let known = {
            let mut buckets = self.lock_waypoints();
            if !buckets.knows_name(name) {
                false
            } else {
                buckets.modifiers.push(name, position);
                if let Some(waypoint) = buckets
                    .active
                    .iter_mut()
                    .find(|w| w.name() == Some(name))
                {
                    waypoint.move_to(position);
                }
                true
            }
        };
        if known {
            self.trigger_regeneration();
        } else {
            warn!("ignoring modification for unknown waypoint '{name}'");
        }
    }

    /// Set the target cruise speed [m/s] and trigger regeneration.
    pub fn set_speed(&self, speed: f64) -> Result<(), PlannerError> {
        if !speed.is_finite() || speed <= 0.0 {
            return Err(PlannerError::InvalidSpeed(speed));
        }
        self.lock_params().speed = speed;
        self.trigger_regeneration();
        Ok(())
    }

    /// Target cruise speed [m/s].
    pub fn get_speed(&self) -> f64 {
        self.lock_params().speed
    }

    /// Publish the vehicle pose; used as the initial vertex when no
    /// trajectory exists yet.
    pub fn update_vehicle_position(&self, position: Vec3) {
        *self
            .shared
            .vehicle_position
            .lock()
            .expect("vehicle position lock poisoned") = position;
    }

    /// Sample the reference at global time `t`.
    ///
    /// Returns `false` while no trajectory exists. Velocity and acceleration
    /// are skipped when `only_positions` is set. Samples at a `t` behind the
    /// last one are served but do not move the evaluation watermark.
    pub fn evaluate(&self, t: f64, refs: &mut References, only_positions: bool) -> bool {
        self.evaluate_inner(t, refs, only_positions, false)
    }

    /// Sample the reference without advancing the evaluation watermark.
    ///
    /// Intended for plotting and inspection; the planner behaves as if the
    /// call never happened.
    pub fn sample_for_plotting(&self, t: f64, refs: &mut References) -> bool {
        self.evaluate_inner(t, refs, false, true)
    }

    /// Global-time lower bound of the current trajectory.
    ///
    /// Blocks until a first trajectory exists.
    pub fn get_min_time(&self) -> f64 {
        let mut trajectory = self.shared.trajectory.wait_ready();
        let params = self.lock_params();
        if let Some(current) = self.shared.trajectory.snapshot() {
            trajectory = current;
        }
        params.t_offset + trajectory.min_time()
    }

    /// Global-time upper bound of the current trajectory.
    ///
    /// Blocks until a first trajectory exists.
    pub fn get_max_time(&self) -> f64 {
        let mut trajectory = self.shared.trajectory.wait_ready();
        let params = self.lock_params();
        if let Some(current) = self.shared.trajectory.snapshot() {
            trajectory = current;
        }
        params.t_offset + trajectory.max_time()
    }

    /// Edge flag: `true` exactly once after each successful trajectory swap.
    pub fn was_regenerated(&self) -> bool {
        self.shared.regenerated.swap(false, Ordering::AcqRel)
    }

    /// Snapshot of the active waypoint deque.
    pub fn dynamic_waypoints(&self) -> Vec<DynamicWaypoint> {
        self.lock_waypoints().active.iter().cloned().collect()
    }

    /// Look up an active waypoint by name.
    pub fn waypoint_by_name(&self, name: &str) -> Option<DynamicWaypoint> {
        self.lock_waypoints()
            .active
            .iter()
            .find(|w| w.name() == Some(name))
            .cloned()
    }

    fn evaluate_inner(
        &self,
        t: f64,
        refs: &mut References,
        only_positions: bool,
        for_plotting: bool,
    ) -> bool {
        let mut params = self.lock_params();
        let (trajectory, influences) = {
            let buckets = self.lock_waypoints();
            let Some(trajectory) = self.shared.trajectory.snapshot() else {
                return false;
            };
            (trajectory, evaluator::collect_influences(&buckets.active))
        };

        let t_local = t - params.t_offset;
        if !for_plotting && t > params.last_global_time_evaluated {
            params.last_global_time_evaluated = t;
            params.last_local_time_evaluated = t_local;
        }
        drop(params);

        evaluator::sample(&trajectory, t_local, &influences, refs, only_positions);
        true
    }

    fn trigger_regeneration(&self) {
        debug!("regeneration triggered");
        self.shared.dirty.store(true, Ordering::Release);
        self.shared.wake.notify();
    }

    fn lock_params(&self) -> std::sync::MutexGuard<'_, NumericParameters> {
        self.shared.params.lock().expect("parameters lock poisoned")
    }

    fn lock_waypoints(&self) -> std::sync::MutexGuard<'_, WaypointBuckets> {
        self.shared.waypoints.lock().expect("waypoints lock poisoned")
    }
}

impl Default for DynamicPlanner {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DynamicPlanner {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::Release);
        self.shared.wake.notify();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
