//! Append-only buffer of cached feedback events for one detailed flow

use crate::domain::feedback::{CachedFeedbackEvent, FeedbackEvents};
use crate::domain::types::EventId;
use rustc_hash::FxHashSet;

/// Ordered, duplicate-free store of the events captured by one detailed flow.
///
/// Insertion order is capture order. The owning session is the only writer and
/// hands the buffer over once, via [`CachedFeedbackBuffer::into_events`].
#[derive(Debug, Default)]
pub struct CachedFeedbackBuffer {
    events: Vec<CachedFeedbackEvent>,
    /// Ids already captured, for O(1) duplicate checks
    seen: FxHashSet<EventId>,
}

impl CachedFeedbackBuffer {
    pub fn new() -> Self {
        Self { events: Vec::with_capacity(8), seen: FxHashSet::default() }
    }

    /// Append an event. Returns false if its id is already buffered.
    pub fn push(&mut self, event: CachedFeedbackEvent) -> bool {
        if !self.seen.insert(event.id) {
            return false;
        }
        self.events.push(event);
        true
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Consume the buffer, transferring the events without copying them
    pub fn into_events(self) -> FeedbackEvents {
        self.events.into()
    }
}
