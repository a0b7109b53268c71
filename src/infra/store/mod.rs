//! Queue persistence boundary.
//!
//! The store is the single shared resource of the engine. There is no
//! in-process mutex around it: correctness under interleaving relies on
//! [`QueueStore::update_entry`] being a narrow conditional write that fails,
//! rather than overwrites, when the entry's status no longer matches the
//! caller's expectation.

pub mod memory;

pub use memory::InMemoryStore;

use async_trait::async_trait;

use crate::core::{CancelReason, EntryStatus, QueueEntry, QueueError, Station};
use crate::util::{EntryId, StationId, UserId};

/// Status filter for entry queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    /// Every entry regardless of status.
    All,
    /// Entries whose status is not terminal.
    NonTerminal,
    /// Entries with exactly this status.
    Only(EntryStatus),
}

impl StatusFilter {
    /// Whether an entry with the given status passes the filter.
    pub fn matches(self, status: EntryStatus) -> bool {
        match self {
            Self::All => true,
            Self::NonTerminal => !status.is_terminal(),
            Self::Only(wanted) => status == wanted,
        }
    }
}

/// Field-level patch applied by a conditional update. Unset fields are left
/// untouched; `reservation_expiry_ms` distinguishes "leave alone" (`None`)
/// from "clear" (`Some(None)`).
#[derive(Debug, Clone, Default)]
pub struct EntryUpdate {
    /// New status, if transitioning.
    pub status: Option<EntryStatus>,
    /// New 1-based position, if moving.
    pub position: Option<u32>,
    /// New reservation deadline: `Some(Some(t))` sets, `Some(None)` clears.
    pub reservation_expiry_ms: Option<Option<u128>>,
    /// New reminder flag value.
    pub reminder_sent: Option<bool>,
    /// Cancellation reason to record.
    pub cancel_reason: Option<CancelReason>,
}

impl EntryUpdate {
    /// Patch transitioning to a new status.
    pub fn transition(status: EntryStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Patch moving the entry to a new position.
    pub fn reposition(position: u32) -> Self {
        Self {
            position: Some(position),
            ..Self::default()
        }
    }

    /// Set the reservation deadline.
    #[must_use]
    pub fn with_expiry(mut self, expiry_ms: u128) -> Self {
        self.reservation_expiry_ms = Some(Some(expiry_ms));
        self
    }

    /// Clear the reservation deadline.
    #[must_use]
    pub fn clear_expiry(mut self) -> Self {
        self.reservation_expiry_ms = Some(None);
        self
    }

    /// Record a cancellation reason.
    #[must_use]
    pub fn with_cancel_reason(mut self, reason: CancelReason) -> Self {
        self.cancel_reason = Some(reason);
        self
    }

    /// Set the reminder flag.
    #[must_use]
    pub fn with_reminder_sent(mut self, sent: bool) -> Self {
        self.reminder_sent = Some(sent);
        self
    }
}

/// Derived station fields refreshed by maintenance sweeps.
#[derive(Debug, Clone, Copy, Default)]
pub struct StationDerived {
    /// New free-slot count, if recomputed.
    pub available_slots: Option<u32>,
    /// New cached queue length, if recomputed.
    pub current_queue_length: Option<u32>,
}

/// Persistence of queue entries and station slot counts.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Entries at a station passing the filter, ordered by position then
    /// creation time.
    async fn queue_entries(
        &self,
        station_id: &StationId,
        filter: StatusFilter,
    ) -> Result<Vec<QueueEntry>, QueueError>;

    /// Every entry belonging to a user, across all stations.
    async fn entries_for_user(&self, user_id: &UserId) -> Result<Vec<QueueEntry>, QueueError>;

    /// Reserved entries whose deadline passed before `now_ms`, across all
    /// stations, ordered by deadline.
    async fn expired_reservations(&self, now_ms: u128) -> Result<Vec<QueueEntry>, QueueError>;

    /// Persist a freshly created entry. Fails with [`QueueError::Conflict`]
    /// when the user already holds a non-terminal entry at any station, so
    /// two concurrent joins for one user cannot both land: the uniqueness
    /// check and the insert are a single atomic store operation (a partial
    /// unique index over active entries, in a relational store).
    async fn insert_entry(&self, entry: QueueEntry) -> Result<(), QueueError>;

    /// Conditionally update an entry. Applies `update` only while the entry's
    /// current status equals `expected_status`; returns `Ok(None)` without
    /// writing when the precondition no longer holds (the caller lost a race).
    async fn update_entry(
        &self,
        id: &EntryId,
        expected_status: EntryStatus,
        update: EntryUpdate,
    ) -> Result<Option<QueueEntry>, QueueError>;

    /// Look up a station.
    async fn station(&self, id: &StationId) -> Result<Option<Station>, QueueError>;

    /// Every known station.
    async fn stations(&self) -> Result<Vec<Station>, QueueError>;

    /// Overwrite derived station fields.
    async fn update_station_derived(
        &self,
        id: &StationId,
        fields: StationDerived,
    ) -> Result<(), QueueError>;
}
