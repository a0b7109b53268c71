//! In-memory store for development and testing.
//!
//! Mirrors the conditional-update contract of a relational store: an
//! `update_entry` whose status precondition no longer holds is a no-op
//! returning `None`. A write counter is exposed so idempotence of the
//! maintenance sweeps (zero writes on an already-consistent station) can be
//! asserted directly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::core::{EntryStatus, QueueEntry, QueueError, Station};
use crate::infra::store::{EntryUpdate, QueueStore, StationDerived, StatusFilter};
use crate::util::{Clock, EntryId, StationId, UserId};

/// In-memory [`QueueStore`] backed by hash maps under a `parking_lot` lock.
pub struct InMemoryStore {
    entries: RwLock<HashMap<EntryId, QueueEntry>>,
    stations: RwLock<HashMap<StationId, Station>>,
    clock: Arc<dyn Clock>,
    writes: AtomicUsize,
}

impl InMemoryStore {
    /// Create an empty store stamping rows with the given clock.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            stations: RwLock::new(HashMap::new()),
            clock,
            writes: AtomicUsize::new(0),
        }
    }

    /// Register or replace a station.
    pub fn put_station(&self, station: Station) {
        self.stations.write().insert(station.id.clone(), station);
    }

    /// Number of entry writes (inserts plus successful conditional updates)
    /// performed so far.
    pub fn entry_writes(&self) -> usize {
        self.writes.load(Ordering::Acquire)
    }

    /// Fetch a single entry by id.
    pub fn entry(&self, id: &EntryId) -> Option<QueueEntry> {
        self.entries.read().get(id).cloned()
    }

    fn sort_by_line_order(entries: &mut [QueueEntry]) {
        entries.sort_by(|a, b| {
            a.position
                .cmp(&b.position)
                .then(a.created_at_ms.cmp(&b.created_at_ms))
        });
    }
}

#[async_trait]
impl QueueStore for InMemoryStore {
    async fn queue_entries(
        &self,
        station_id: &StationId,
        filter: StatusFilter,
    ) -> Result<Vec<QueueEntry>, QueueError> {
        let mut found: Vec<QueueEntry> = self
            .entries
            .read()
            .values()
            .filter(|e| &e.station_id == station_id && filter.matches(e.status))
            .cloned()
            .collect();
        Self::sort_by_line_order(&mut found);
        Ok(found)
    }

    async fn entries_for_user(&self, user_id: &UserId) -> Result<Vec<QueueEntry>, QueueError> {
        let mut found: Vec<QueueEntry> = self
            .entries
            .read()
            .values()
            .filter(|e| &e.user_id == user_id)
            .cloned()
            .collect();
        Self::sort_by_line_order(&mut found);
        Ok(found)
    }

    async fn expired_reservations(&self, now_ms: u128) -> Result<Vec<QueueEntry>, QueueError> {
        let mut found: Vec<QueueEntry> = self
            .entries
            .read()
            .values()
            .filter(|e| {
                e.status == EntryStatus::Reserved
                    && e.reservation_expiry_ms.is_some_and(|t| t < now_ms)
            })
            .cloned()
            .collect();
        found.sort_by_key(|e| e.reservation_expiry_ms);
        Ok(found)
    }

    async fn insert_entry(&self, entry: QueueEntry) -> Result<(), QueueError> {
        let mut entries = self.entries.write();
        let already_booked = entries
            .values()
            .any(|e| e.user_id == entry.user_id && e.is_active());
        if already_booked {
            return Err(QueueError::Conflict(format!(
                "user {} already holds an active entry",
                entry.user_id
            )));
        }
        entries.insert(entry.id, entry);
        self.writes.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    async fn update_entry(
        &self,
        id: &EntryId,
        expected_status: EntryStatus,
        update: EntryUpdate,
    ) -> Result<Option<QueueEntry>, QueueError> {
        let mut entries = self.entries.write();
        let Some(entry) = entries.get_mut(id) else {
            return Err(QueueError::NotFound(format!("queue entry {id}")));
        };
        if entry.status != expected_status {
            return Ok(None);
        }
        if let Some(status) = update.status {
            entry.status = status;
        }
        if let Some(position) = update.position {
            entry.position = position;
        }
        if let Some(expiry) = update.reservation_expiry_ms {
            entry.reservation_expiry_ms = expiry;
        }
        if let Some(sent) = update.reminder_sent {
            entry.reminder_sent = sent;
        }
        if let Some(reason) = update.cancel_reason {
            entry.cancel_reason = Some(reason);
        }
        entry.updated_at_ms = self.clock.now_ms();
        self.writes.fetch_add(1, Ordering::AcqRel);
        Ok(Some(entry.clone()))
    }

    async fn station(&self, id: &StationId) -> Result<Option<Station>, QueueError> {
        Ok(self.stations.read().get(id).cloned())
    }

    async fn stations(&self) -> Result<Vec<Station>, QueueError> {
        let mut all: Vec<Station> = self.stations.read().values().cloned().collect();
        all.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        Ok(all)
    }

    async fn update_station_derived(
        &self,
        id: &StationId,
        fields: StationDerived,
    ) -> Result<(), QueueError> {
        let mut stations = self.stations.write();
        let Some(station) = stations.get_mut(id) else {
            return Err(QueueError::NotFound(format!("station {id}")));
        };
        if let Some(available) = fields.available_slots {
            station.available_slots = available;
        }
        if let Some(len) = fields.current_queue_length {
            station.current_queue_length = len;
        }
        Ok(())
    }
}
