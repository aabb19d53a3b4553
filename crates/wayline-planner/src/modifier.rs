//! Pending waypoint edits and their local influence on evaluation
//!
//! Edits arriving through `modify_waypoint` are queued here until the next
//! regeneration absorbs them. While queued, the matching waypoint's offset
//! bends evaluation through a compact bump that peaks at the waypoint's
//! segment time and vanishes outside its two adjacent segments.

use wayline_core::Vec3;

/// One pending edit: move the waypoint called `name` to `position`.
#[derive(Debug, Clone)]
pub(crate) struct WaypointModification {
    pub name: String,
    pub position: Vec3,
}

/// Ordered list of pending edits, consumed by the next regeneration.
#[derive(Debug, Default)]
pub(crate) struct ModifierBook {
    entries: Vec<WaypointModification>,
}

impl ModifierBook {
    pub fn push(&mut self, name: impl Into<String>, position: Vec3) {
        self.entries.push(WaypointModification {
            name: name.into(),
            position,
        });
    }

    /// Take every pending entry, leaving the book empty.
    pub fn drain(&mut self) -> Vec<WaypointModification> {
        std::mem::take(&mut self.entries)
    }

    pub fn extend(&mut self, entries: Vec<WaypointModification>) {
        self.entries.extend(entries);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Compact bump: 0 at `window_start`, 1 at `peak`, 0 at `window_end`,
/// smoothstep ramps in between. Zero outside the window.
pub(crate) fn influence(t: f64, window_start: f64, peak: f64, window_end: f64) -> f64 {
    if t <= window_start || t >= window_end {
        // The peak may sit on the window edge (first or last waypoint).
        if t == peak {
            return 1.0;
        }
        return 0.0;
    }
    if t <= peak {
        smoothstep((t - window_start) / (peak - window_start))
    } else {
        1.0 - smoothstep((t - peak) / (window_end - peak))
    }
}

fn smoothstep(x: f64) -> f64 {
    let x = x.clamp(0.0, 1.0);
    x * x * (3.0 - 2.0 * x)
}
