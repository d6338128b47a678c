//! Pending work ordered by `(due, seq)`.
//!
//! Both schedulers keep their not-yet-run work here. Ordering is by due tick
//! first and scheduling sequence second, so actions due on the same tick run
//! in the order they were scheduled no matter how the queue was mutated in
//! between.

use super::Work;
use crate::types::{Seq, Tick};
use std::collections::BTreeMap;
use std::fmt;

/// A unit of work waiting for its due tick.
pub struct ScheduledAction {
    /// Earliest tick at which the work may run.
    pub due: Tick,
    /// Scheduling order, used only to break ties on `due`.
    pub seq: Seq,
    /// The work itself.
    pub work: Work,
}

impl ScheduledAction {
    /// Runs the work, consuming the action.
    pub fn run(self) {
        (self.work)();
    }
}

impl fmt::Debug for ScheduledAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledAction")
            .field("due", &self.due)
            .field("seq", &self.seq)
            .finish_non_exhaustive()
    }
}

/// Ordered collection of [`ScheduledAction`]s.
pub struct PendingQueue {
    entries: BTreeMap<(Tick, Seq), Work>,
    next_seq: Seq,
}

impl PendingQueue {
    /// Creates a new empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_seq: Seq::zero(),
        }
    }

    /// Returns the number of pending actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the sequence number the next insert will receive.
    #[must_use]
    pub fn peek_seq(&self) -> Seq {
        self.next_seq
    }

    /// Adds work due at `due` and returns its sequence number.
    pub fn insert(&mut self, due: Tick, work: Work) -> Seq {
        let seq = self.next_seq;
        self.next_seq = seq.next();
        self.entries.insert((due, seq), work);
        seq
    }

    /// Returns the earliest due tick, if any.
    #[must_use]
    pub fn next_due(&self) -> Option<Tick> {
        self.entries.keys().next().map(|&(due, _)| due)
    }

    /// Removes and returns the first action due at or before `limit`.
    pub fn pop_due(&mut self, limit: Tick) -> Option<ScheduledAction> {
        match self.entries.first_key_value() {
            Some((&(due, _), _)) if due <= limit => self.pop_first(),
            _ => None,
        }
    }

    /// Removes and returns the first action regardless of its due tick.
    pub fn pop_first(&mut self) -> Option<ScheduledAction> {
        self.entries
            .pop_first()
            .map(|((due, seq), work)| ScheduledAction { due, seq, work })
    }

    /// Removes a pending action without running it.
    ///
    /// Returns true if the action was still pending.
    pub fn remove(&mut self, due: Tick, seq: Seq) -> bool {
        self.entries.remove(&(due, seq)).is_some()
    }

    /// Drops all pending actions without running them.
    ///
    /// Sequence numbering continues where it left off.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for PendingQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PendingQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingQueue")
            .field("len", &self.entries.len())
            .field("next_due", &self.next_due())
            .field("next_seq", &self.next_seq)
            .finish()
    }
}
