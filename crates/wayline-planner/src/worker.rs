//! Background regeneration worker
//!
//! One long-lived thread per planner. It waits for the dirty flag, composes
//! the next waypoint deque (stitched to the motion currently in flight),
//! runs the optimizer without holding any planner lock, and hands the result
//! over through the safe-swap protocol: a stitched candidate is held pending
//! until the consumer clock reaches its junction, then installed; a candidate
//! that misses its window is dropped and regeneration is re-armed.

use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::{Arc, MutexGuard};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use wayline_core::{
    estimate_segment_times, generate_trajectory, OptimizeError, Trajectory, Vec3,
};

use crate::evaluator::{self, References};
use crate::modifier::WaypointModification;
use crate::planner::{NumericParameters, PlannerShared};
use crate::waypoint::{DynamicWaypoint, WaypointDeque};

/// Time constant of the security-time placeholder [s].
const TIME_CONSTANT: f64 = 1.0;

/// Two vertices coinciding closer than this are treated as one [m].
const COINCIDENT_DISTANCE: f64 = 1e-6;

pub(crate) fn spawn(shared: Arc<PlannerShared>) -> JoinHandle<()> {
    thread::Builder::new()
        .name("wayline-planner-worker".into())
        .spawn(move || run(shared))
        .expect("failed to spawn planner worker")
}

/// A regenerated trajectory waiting for its swap instant.
struct Candidate {
    trajectory: Arc<Trajectory>,
    deque: WaypointDeque,
    /// Global time at which the candidate's local time is 0.
    t_offset: f64,
    /// Whether the candidate was stitched to a trajectory in flight.
    stitched: bool,
}

/// Snapshot of everything a regeneration needs, taken under lock.
struct PlanInputs {
    active: WaypointDeque,
    to_be_set: Vec<DynamicWaypoint>,
    to_be_appended: Vec<DynamicWaypoint>,
    modifiers: Vec<WaypointModification>,
    speed: f64,
    last_global: f64,
    t_offset: f64,
}

enum PendingOutcome {
    Installed,
    Waiting(Candidate),
    Missed,
}

fn run(shared: Arc<PlannerShared>) {
    debug!("planner worker started");
    let mut pending: Option<Candidate> = None;
    let mut failed_once = false;

    loop {
        wait_for_wake(&shared);
        if shared.stop.load(Ordering::Acquire) {
            break;
        }

        if !shared.dirty.swap(false, Ordering::AcqRel) {
            if let Some(candidate) = pending.take() {
                match try_install_pending(&shared, candidate) {
                    PendingOutcome::Installed => {}
                    PendingOutcome::Waiting(candidate) => pending = Some(candidate),
                    PendingOutcome::Missed => {
                        warn!("pending trajectory missed its stitch window, regenerating");
                        shared.dirty.store(true, Ordering::Release);
                    }
                }
            }
            continue;
        }
        // Newer edits win over a not-yet-installed candidate.
        pending = None;

        let Some(inputs) = snapshot_inputs(&shared) else {
            continue;
        };

        let outcome = regenerate(&shared, &inputs);
        if shared.stop.load(Ordering::Acquire) {
            // Drop the result; the planner is shutting down.
            break;
        }
        match outcome {
            Ok(Some(candidate)) => {
                failed_once = false;
                if !candidate.stitched {
                    install(&shared, lock_params(&shared), candidate);
                } else if completed_late(&shared, &candidate) {
                    warn!("optimizer finished too late for its stitch window, regenerating");
                    shared.dirty.store(true, Ordering::Release);
                } else {
                    pending = Some(candidate);
                }
            }
            Ok(None) => {
                failed_once = false;
            }
            Err(error) => {
                warn!("trajectory generation failed: {error}");
                if failed_once {
                    failed_once = false;
                    warn!("second consecutive failure, dropping the pending change");
                } else {
                    failed_once = true;
                    restore_inputs(&shared, inputs);
                    shared.dirty.store(true, Ordering::Release);
                }
            }
        }
    }
    debug!("planner worker stopped");
}

fn wait_for_wake(shared: &PlannerShared) {
    let guard = shared.wake.lock.lock().expect("worker wake poisoned");
    let _ = shared
        .wake
        .condvar
        .wait_timeout(guard, shared.config.worker_poll)
        .expect("worker wake poisoned");
}

fn lock_params(shared: &PlannerShared) -> MutexGuard<'_, NumericParameters> {
    shared.params.lock().expect("parameters lock poisoned")
}

/// Consume the pending buckets and copy what the regeneration needs.
///
/// Returns `None` (leaving all buckets untouched) while no speed is
/// configured, and `None` (buckets consumed) when there is nothing a
/// regeneration could act on.
fn snapshot_inputs(shared: &PlannerShared) -> Option<PlanInputs> {
    let params = lock_params(shared);
    if params.speed <= 0.0 {
        debug!("regeneration deferred: no speed configured");
        return None;
    }
    let speed = params.speed;
    let last_global = params.last_global_time_evaluated;
    let t_offset = params.t_offset;

    let mut buckets = shared.waypoints.lock().expect("waypoints lock poisoned");
    let has_edits = !buckets.to_be_set.is_empty()
        || !buckets.to_be_appended.is_empty()
        || !buckets.modifiers.is_empty();
    if !has_edits && buckets.active.len() < 2 {
        return None;
    }

    Some(PlanInputs {
        active: buckets.active.clone(),
        to_be_set: std::mem::take(&mut buckets.to_be_set),
        to_be_appended: std::mem::take(&mut buckets.to_be_appended),
        modifiers: buckets.modifiers.drain(),
        speed,
        last_global,
        t_offset,
    })
}

/// Put consumed edits back after a failed attempt, behind anything the
/// producer queued meanwhile.
fn restore_inputs(shared: &PlannerShared, inputs: PlanInputs) {
    let mut buckets = shared.waypoints.lock().expect("waypoints lock poisoned");
    if buckets.to_be_set.is_empty() {
        buckets.to_be_set = inputs.to_be_set;
    }
    let newer_appends = std::mem::take(&mut buckets.to_be_appended);
    buckets.to_be_appended = inputs.to_be_appended;
    buckets.to_be_appended.extend(newer_appends);

    let newer_modifiers = buckets.modifiers.drain();
    buckets.modifiers.extend(inputs.modifiers);
    buckets.modifiers.extend(newer_modifiers);
}

/// Compose the next deque, run the optimizer, and package the candidate.
///
/// `Ok(None)` means there was nothing to optimize (for example every
/// remaining waypoint lies before the stitch instant).
fn regenerate(
    shared: &PlannerShared,
    inputs: &PlanInputs,
) -> Result<Option<Candidate>, OptimizeError> {
    let current = shared.trajectory.snapshot();

    let (mut deque, t_stitch_global) = match current {
        Some(trajectory) => compose_stitched(shared, inputs, &trajectory),
        None => (compose_from_scratch(shared, inputs), None),
    };

    migrate_offsets(&mut deque, &inputs.active);
    apply_modifiers(&mut deque, &inputs.modifiers);

    if deque.len() < 2 {
        debug!("regeneration skipped: {} waypoint(s) to optimize", deque.len());
        return Ok(None);
    }

    let positions: Vec<Vec3> = deque.iter().map(DynamicWaypoint::position).collect();
    let times = estimate_segment_times(&positions, inputs.speed, shared.config.max_acceleration);
    let vertices: Vec<_> = deque.iter().map(DynamicWaypoint::vertex).collect();

    let trajectory =
        generate_trajectory(&vertices, &times, shared.config.derivative_to_optimize)?;

    for (i, waypoint) in deque.iter_mut().enumerate() {
        let time = if i == 0 { 0.0 } else { times[i - 1] };
        waypoint.set_assigned_segment_time(time);
    }

    let stitched = t_stitch_global.is_some();
    Ok(Some(Candidate {
        trajectory: Arc::new(trajectory),
        deque,
        t_offset: t_stitch_global.unwrap_or(inputs.last_global),
        stitched,
    }))
}

/// Next deque for a regeneration while a trajectory is in flight: a stitch
/// vertex sampled ahead of the consumer, the surviving tail, then appends.
fn compose_stitched(
    shared: &PlannerShared,
    inputs: &PlanInputs,
    trajectory: &Trajectory,
) -> (WaypointDeque, Option<f64>) {
    let t_stitch_global = inputs.last_global + shared.config.stitch_horizon;
    let t_stitch_local = t_stitch_global - inputs.t_offset;

    let influences = evaluator::collect_influences(&inputs.active);
    let mut refs = References::default();
    evaluator::sample(trajectory, t_stitch_local, &influences, &mut refs, false);

    let stitch = DynamicWaypoint::new(refs.position)
        .with_velocity(refs.velocity)
        .with_acceleration(refs.acceleration);

    let mut deque = VecDeque::new();
    deque.push_back(stitch);

    if !inputs.to_be_set.is_empty() {
        deque.extend(inputs.to_be_set.iter().cloned());
    } else {
        // Keep the waypoints the vehicle has not yet passed at the junction.
        let mut cumulative = 0.0;
        for waypoint in &inputs.active {
            cumulative += waypoint.assigned_segment_time();
            if cumulative > t_stitch_local {
                deque.push_back(waypoint.clone());
            }
        }
    }
    deque.extend(inputs.to_be_appended.iter().cloned());

    (deque, Some(t_stitch_global))
}

/// Next deque when no trajectory exists yet: the published vehicle position
/// (pinned to rest), then the pending waypoints.
fn compose_from_scratch(shared: &PlannerShared, inputs: &PlanInputs) -> WaypointDeque {
    let mut deque: WaypointDeque = if inputs.to_be_set.is_empty() {
        inputs.active.clone()
    } else {
        inputs.to_be_set.iter().cloned().collect()
    };
    deque.extend(inputs.to_be_appended.iter().cloned());

    let vehicle = *shared
        .vehicle_position
        .lock()
        .expect("vehicle position lock poisoned");

    let coincident = deque
        .front()
        .map_or(false, |w| (w.position() - vehicle).norm() < COINCIDENT_DISTANCE);
    if !coincident {
        deque.push_front(
            DynamicWaypoint::new(vehicle)
                .with_velocity(Vec3::zeros())
                .with_acceleration(Vec3::zeros()),
        );
    }
    deque
}

/// Fold in-flight offsets into the next deque: entries cloned from the
/// active deque absorb their own offset, replacement entries inherit the
/// offset of the active waypoint they rename.
fn migrate_offsets(deque: &mut WaypointDeque, active: &WaypointDeque) {
    for waypoint in deque.iter_mut() {
        if waypoint.current_offset() != Vec3::zeros() {
            waypoint.absorb_offset();
        } else if let Some(name) = waypoint.name() {
            if let Some(source) = active.iter().find(|a| a.name() == Some(name)) {
                let offset = source.current_offset();
                if offset != Vec3::zeros() {
                    waypoint.set_position(waypoint.position() + offset);
                }
            }
        }
    }
}

/// Apply queued `modify_waypoint` edits to the base positions. Entries whose
/// name is absent from the next deque are dropped silently.
fn apply_modifiers(deque: &mut WaypointDeque, modifiers: &[WaypointModification]) {
    for modification in modifiers {
        if let Some(waypoint) = deque
            .iter_mut()
            .find(|w| w.name() == Some(modification.name.as_str()))
        {
            waypoint.set_position(modification.position);
        }
    }
}

/// Whether the optimizer consumed more of the stitch horizon than the
/// safety coefficient allows.
fn completed_late(shared: &PlannerShared, candidate: &Candidate) -> bool {
    let last_global = lock_params(shared).last_global_time_evaluated;
    let margin = (1.0 - shared.config.stitch_safety_coef) * shared.config.stitch_horizon;
    last_global > candidate.t_offset - margin
}

/// Decide the fate of a pending candidate against the consumer clock.
fn try_install_pending(shared: &PlannerShared, candidate: Candidate) -> PendingOutcome {
    let params = lock_params(shared);
    let last_global = params.last_global_time_evaluated;
    let grace = (1.0 - shared.config.stitch_safety_coef) * shared.config.stitch_horizon;

    if last_global > candidate.t_offset + grace {
        return PendingOutcome::Missed;
    }
    if last_global < candidate.t_offset {
        return PendingOutcome::Waiting(candidate);
    }
    if in_security_zone(
        &candidate.deque,
        last_global - candidate.t_offset,
        shared.config.security_zone_width,
    ) {
        return PendingOutcome::Waiting(candidate);
    }
    install(shared, params, candidate);
    PendingOutcome::Installed
}

/// Publish a candidate: time base, active deque, then the trajectory handle,
/// in lock order. Sets the regeneration edge flag last.
fn install(
    shared: &PlannerShared,
    mut params: MutexGuard<'_, NumericParameters>,
    candidate: Candidate,
) {
    let t_offset = if candidate.stitched {
        candidate.t_offset
    } else {
        params.last_global_time_evaluated
    };
    params.t_offset = t_offset;
    params.global_time_last_trajectory_generated = params.last_global_time_evaluated;

    {
        let mut buckets = shared.waypoints.lock().expect("waypoints lock poisoned");
        buckets.active = candidate.deque;
    }
    shared.trajectory.install(candidate.trajectory);
    drop(params);

    shared.regenerated.store(true, Ordering::Release);
    debug!("installed trajectory, t_offset = {t_offset:.3} s");
}

/// Swap veto around waypoints. The width is configured to zero today, which
/// disables the zone entirely; the quadratic complexity estimate below is a
/// placeholder and its value is never load-bearing at width zero.
fn in_security_zone(deque: &WaypointDeque, t_local: f64, width: f64) -> bool {
    if width <= 0.0 {
        return false;
    }
    let zone = width * security_time(deque.len(), TIME_CONSTANT);
    let mut cumulative = 0.0;
    for waypoint in deque {
        cumulative += waypoint.assigned_segment_time();
        if (t_local - cumulative).abs() < zone {
            return true;
        }
    }
    false
}

fn security_time(n: usize, time_constant: f64) -> f64 {
    time_constant * (n * n) as f64
}
