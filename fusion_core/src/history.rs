// fusion_core/src/history.rs

use std::cmp::Ordering;
use std::collections::VecDeque;

use crate::error::StateError;
use crate::state::State;
use log::{trace, warn};

/// Number of snapshots kept by [`StateHistory::default`].
pub const DEFAULT_HISTORY_CAPACITY: usize = 256;

/// A bounded, strictly time-ordered buffer of state snapshots.
///
/// Measurements usually arrive with a delay; the correction step looks up the
/// snapshot closest to the measurement time here instead of reading the live
/// state. Snapshots are copies, so the time, state and covariance in each one
/// always refer to the same instant.
#[derive(Debug, Clone)]
pub struct StateHistory {
    states: VecDeque<State>,
    capacity: usize,
}

impl Default for StateHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl StateHistory {
    /// Creates an empty history. A capacity of zero is treated as one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            states: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }

    /// Appends a snapshot, evicting the oldest one when full.
    ///
    /// The snapshot time must be finite and strictly newer than the latest one;
    /// otherwise the snapshot is rejected and the history is unchanged.
    pub fn push(&mut self, state: State) -> Result<(), StateError> {
        if !state.time.is_finite() {
            warn!("Dropping state snapshot with non-finite time {}", state.time);
            return Err(StateError::NonFinite { field: "time" });
        }
        if let Some(latest) = self.states.back() {
            if state.time.partial_cmp(&latest.time) != Some(Ordering::Greater) {
                warn!(
                    "Dropping out-of-order state snapshot at t = {} (latest is {})",
                    state.time, latest.time
                );
                return Err(StateError::NonMonotonicTime {
                    current: latest.time,
                    requested: state.time,
                });
            }
        }
        if self.states.len() == self.capacity {
            if let Some(evicted) = self.states.pop_front() {
                trace!("State history full, evicting snapshot at t = {}", evicted.time);
            }
        }
        self.states.push_back(state);
        Ok(())
    }

    pub fn latest(&self) -> Option<&State> {
        self.states.back()
    }

    /// The snapshot whose time is nearest to `time`. Ties go to the older one.
    pub fn closest(&self, time: f64) -> Option<&State> {
        // Times are sorted, so find the first snapshot at or after `time` and
        // compare it with its predecessor.
        let idx = self.states.partition_point(|s| s.time < time);
        let after = self.states.get(idx);
        let before = idx.checked_sub(1).and_then(|i| self.states.get(i));
        match (before, after) {
            (Some(b), Some(a)) => {
                if (a.time - time) < (time - b.time) {
                    Some(a)
                } else {
                    Some(b)
                }
            }
            (Some(b), None) => Some(b),
            (None, a) => a,
        }
    }

    /// The newest snapshot not later than `time`.
    pub fn at_or_before(&self, time: f64) -> Option<&State> {
        let idx = self.states.partition_point(|s| s.time <= time);
        idx.checked_sub(1).and_then(|i| self.states.get(i))
    }

    /// Iterates from the oldest to the newest snapshot.
    pub fn iter(&self) -> impl Iterator<Item = &State> {
        self.states.iter()
    }
}
