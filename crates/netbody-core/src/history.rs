//! Bounded tick history of snapshots, bracketing render time.
//!
//! Transports with their own snapshot buffers can implement
//! [`SnapshotSource`] directly; this ring buffer is the in-crate default for
//! tests and simple drivers.

use std::collections::VecDeque;

use crate::context::SnapshotSource;
use crate::snapshot::{BodySnapshot, SnapshotPair};

/// Default number of retained snapshots (two seconds at 60Hz).
const DEFAULT_CAPACITY: usize = 120;

#[derive(Debug, Clone)]
pub struct SnapshotHistory {
    entries: VecDeque<(u64, BodySnapshot)>,
    capacity: usize,
    render_time: f64,
}

impl SnapshotHistory {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(2),
            render_time: 0.0,
        }
    }

    /// Records the snapshot for a tick. Out-of-order pushes for an already
    /// recorded tick replace that entry (rollback re-captures).
    pub fn push(&mut self, tick: u64, snapshot: BodySnapshot) {
        if let Some(entry) = self.entries.iter_mut().find(|(t, _)| *t == tick) {
            entry.1 = snapshot;
            return;
        }
        // Drop anything newer than the pushed tick; a rewind invalidated it.
        while matches!(self.entries.back(), Some((t, _)) if *t > tick) {
            self.entries.pop_back();
        }
        self.entries.push_back((tick, snapshot));
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Sets the render time, in ticks, that [`SnapshotSource::snapshot_pair`]
    /// brackets. Fractional values blend between ticks.
    pub fn set_render_time(&mut self, time: f64) {
        self.render_time = time;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn latest(&self) -> Option<&BodySnapshot> {
        self.entries.back().map(|(_, s)| s)
    }

    /// The pair bracketing `time`, clamped to the buffered range. Needs at
    /// least two snapshots; rendering skips the frame otherwise.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn pair_at(&self, time: f64) -> Option<SnapshotPair<'_>> {
        if self.entries.len() < 2 {
            return None;
        }

        let last = self.entries.len() - 1;
        let mut index = 1;
        while index < last && time > self.entries[index].0 as f64 {
            index += 1;
        }

        let (from_tick, from) = &self.entries[index - 1];
        let (to_tick, to) = &self.entries[index];
        let span = (*to_tick as f64 - *from_tick as f64).max(f64::EPSILON);
        let alpha = ((time - *from_tick as f64) / span).clamp(0.0, 1.0) as f32;
        Some(SnapshotPair { from, to, alpha })
    }
}

impl Default for SnapshotHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotSource for SnapshotHistory {
    fn snapshot_pair(&self) -> Option<SnapshotPair<'_>> {
        self.pair_at(self.render_time)
    }
}
