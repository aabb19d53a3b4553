//! Thread-safe trajectory handle
//!
//! Shares the current trajectory between the evaluator fast path and the
//! worker's swap. Readers clone the `Arc` under a bounded critical section;
//! the handle is empty until the first successful generation, and a condvar
//! unblocks callers waiting for that first trajectory.

use std::sync::{Arc, Condvar, Mutex};

use wayline_core::Trajectory;

/// Swappable shared-ownership handle to the current trajectory.
#[derive(Debug, Default)]
pub struct TrajectoryHandle {
    current: Mutex<Option<Arc<Trajectory>>>,
    ready: Condvar,
}

impl TrajectoryHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the current trajectory, if one exists.
    pub fn snapshot(&self) -> Option<Arc<Trajectory>> {
        self.current
            .lock()
            .expect("trajectory handle poisoned")
            .clone()
    }

    /// Whether a trajectory has ever been installed.
    pub fn is_ready(&self) -> bool {
        self.current
            .lock()
            .expect("trajectory handle poisoned")
            .is_some()
    }

    /// Publish a new trajectory; readers see either the old or the new one.
    pub fn install(&self, trajectory: Arc<Trajectory>) {
        let mut guard = self.current.lock().expect("trajectory handle poisoned");
        *guard = Some(trajectory);
        self.ready.notify_all();
    }

    /// Block until the first trajectory exists, then snapshot it.
    pub fn wait_ready(&self) -> Arc<Trajectory> {
        let mut guard = self.current.lock().expect("trajectory handle poisoned");
        loop {
            if let Some(trajectory) = guard.as_ref() {
                return Arc::clone(trajectory);
            }
            guard = self
                .ready
                .wait(guard)
                .expect("trajectory handle poisoned");
        }
    }
}
