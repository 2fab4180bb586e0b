//! Time-indexed history of abstract device state snapshots.
//!
//! The driver records one snapshot per reconciliation cycle. Lookups
//! answer "what was the intended state as of time T", which stays correct
//! even when snapshots for later times were recorded first.

use tracing::{debug, trace};

/// Timestamped snapshots of a state value.
#[derive(Debug, Clone)]
pub struct StateHistory<S> {
    entries: Vec<(i64, S)>,
}

impl<S> Default for StateHistory<S> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<S: Clone> StateHistory<S> {
    /// Create an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a snapshot. Ordering is not enforced.
    pub fn record(&mut self, time: i64, state: S) {
        trace!(time, entries = self.entries.len() + 1, "Recording state snapshot");
        self.entries.push((time, state));
    }

    /// Most recent snapshot with `snapshot_time <= time`.
    ///
    /// Among snapshots with the same time, the last recorded wins.
    #[must_use]
    pub fn state_as_of(&self, time: i64) -> Option<&S> {
        self.entry_as_of(time).map(|(_, state)| state)
    }

    /// Like [`state_as_of`](Self::state_as_of), falling back to `default`.
    #[must_use]
    pub fn state_as_of_or(&self, time: i64, default: S) -> S {
        self.state_as_of(time).cloned().unwrap_or(default)
    }

    /// Most recent snapshot with `snapshot_time < time`.
    #[must_use]
    pub fn state_before(&self, time: i64) -> Option<&S> {
        self.state_as_of(time.saturating_sub(1))
    }

    /// Time of the snapshot [`state_as_of`](Self::state_as_of) would return.
    #[must_use]
    pub fn time_as_of(&self, time: i64) -> Option<i64> {
        self.entry_as_of(time).map(|(t, _)| *t)
    }

    /// Latest snapshot by time.
    #[must_use]
    pub fn latest(&self) -> Option<(i64, &S)> {
        self.entry_as_of(i64::MAX).map(|(t, state)| (*t, state))
    }

    /// Drop every snapshot strictly later than `time`.
    ///
    /// Used when the future is re-planned from `time` onward.
    pub fn discard_after(&mut self, time: i64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(t, _)| *t <= time);
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(time, removed, "Discarded future state snapshots");
        }
        removed
    }

    /// Drop every snapshot at or after `time`.
    pub fn discard_from(&mut self, time: i64) -> usize {
        self.discard_after(time.saturating_sub(1))
    }

    /// Drop snapshots older than `time`, keeping the one that
    /// [`state_as_of(time)`](Self::state_as_of) resolves to.
    pub fn prune_before(&mut self, time: i64) -> usize {
        let Some(keep_time) = self.time_as_of(time) else {
            return 0;
        };
        let keep_index = self.index_as_of(time);
        let before = self.entries.len();
        let mut index = 0;
        self.entries.retain(|(t, _)| {
            let keep = *t >= keep_time && (*t > keep_time || Some(index) == keep_index);
            index += 1;
            keep || *t > time
        });
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(time, removed, "Pruned old state snapshots");
        }
        removed
    }

    /// Number of recorded snapshots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn index_as_of(&self, time: i64) -> Option<usize> {
        let mut best: Option<(usize, i64)> = None;
        for (index, (t, _)) in self.entries.iter().enumerate() {
            if *t <= time && best.is_none_or(|(_, best_time)| *t >= best_time) {
                best = Some((index, *t));
            }
        }
        best.map(|(index, _)| index)
    }

    fn entry_as_of(&self, time: i64) -> Option<&(i64, S)> {
        self.index_as_of(time).map(|index| &self.entries[index])
    }
}
