use std::collections::VecDeque;

use crate::event::MarketEvent;

/// How a batch being merged is ordered on arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOrder {
    /// Ascending chain order, as the backfill walker accumulates it. The
    /// batch is reversed before being prepended.
    OldestFirst,
    /// Push order from a live subscription; prepended as-is.
    NewestFirst,
}

/// Capped, newest-first collection of observed events.
///
/// The buffer only ever grows-then-truncates: a merge prepends one whole
/// batch ahead of everything already present, then drops tail entries beyond
/// `capacity`. There is no global chronological order across merges, only
/// "most recently merged batch is most prepended". Callers are responsible
/// for serializing merges (the feed engine holds a write lock around each
/// one); a single merge is never interleaved with another.
#[derive(Debug)]
pub struct EventBuffer {
    events: VecDeque<MarketEvent>,
    capacity: usize,
}

impl EventBuffer {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { events: VecDeque::with_capacity(capacity), capacity }
    }

    /// Merges one batch, preserving its internal order at the head of the
    /// buffer, then truncates to capacity by dropping the oldest entries.
    pub fn merge(&mut self, mut batch: Vec<MarketEvent>, order: MergeOrder) {
        if batch.is_empty() {
            return;
        }

        if order == MergeOrder::OldestFirst {
            batch.reverse();
        }

        // push_front in reverse keeps the batch's order intact at the head
        for event in batch.into_iter().rev() {
            self.events.push_front(event);
        }

        self.events.truncate(self.capacity);
    }

    /// Read-only copy of the buffer, newest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<MarketEvent> {
        self.events.iter().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
