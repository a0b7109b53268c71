//! Audit sink for queue lifecycle events.
//!
//! Cancellation reasons and state transitions are recorded here so analytics
//! can answer "how many reservations expired last week" without replaying
//! logs. The in-memory sink is bounded and intended for development/testing;
//! production deployments plug their own sink in.

use std::collections::VecDeque;

use crate::util::clock::now_ms;
use crate::util::{EntryId, StationId, UserId};

/// A recorded queue lifecycle event.
#[derive(Debug, Clone)]
pub struct QueueEvent {
    /// Related entry identifier.
    pub entry_id: EntryId,
    /// Owning user.
    pub user_id: UserId,
    /// Station whose line was touched.
    pub station_id: StationId,
    /// Action taken (join, reserve, cancel, start_charging, complete, force_stop).
    pub action: String,
    /// Additional context, e.g. the cancellation reason.
    pub detail: Option<String>,
    /// Timestamp, milliseconds since epoch.
    pub created_at_ms: u128,
}

/// Audit sink abstraction.
pub trait AuditSink: Send {
    /// Record a lifecycle event.
    fn record(&mut self, event: QueueEvent);
}

/// Build a queue event stamped with the current time.
pub fn build_queue_event(
    entry_id: EntryId,
    user_id: UserId,
    station_id: StationId,
    action: impl Into<String>,
    detail: Option<String>,
) -> QueueEvent {
    QueueEvent {
        entry_id,
        user_id,
        station_id,
        action: action.into(),
        detail,
        created_at_ms: now_ms(),
    }
}

/// In-memory audit sink with a bounded buffer.
pub struct InMemoryAuditSink {
    events: VecDeque<QueueEvent>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Create a sink retaining at most `max_events` records.
    pub fn new(max_events: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_events),
            max_events,
        }
    }

    /// Snapshot of stored events, oldest first.
    pub fn events(&self) -> Vec<QueueEvent> {
        self.events.iter().cloned().collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&mut self, event: QueueEvent) {
        if self.events.len() >= self.max_events {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }
}
