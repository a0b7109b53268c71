//! Typed records for queue entries and stations.
//!
//! Constructors validate invariants at creation so malformed rows can never
//! enter the store: positions start at 1, identifiers are non-blank, and a
//! reservation expiry exists exactly while an entry is reserved.

use serde::{Deserialize, Serialize};

use crate::core::QueueError;
use crate::util::{EntryId, StationId, UserId};

/// Lifecycle status of a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// Holding a position in line, no slot claimed yet.
    Waiting,
    /// Holding a time-boxed reservation on a free slot.
    Reserved,
    /// Actively charging.
    Charging,
    /// Charging finished normally. Terminal.
    Completed,
    /// Left the line, expired, or was removed. Terminal.
    Cancelled,
}

impl EntryStatus {
    /// Whether the status is terminal (entry is inert).
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl std::fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Waiting => write!(f, "waiting"),
            Self::Reserved => write!(f, "reserved"),
            Self::Charging => write!(f, "charging"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Why an entry was cancelled; recorded for analytics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// The user left the line voluntarily.
    UserCancelled,
    /// The reservation deadline passed without the slot being consumed.
    Expired,
    /// Removed by an operator (including forced session stops).
    Admin,
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UserCancelled => write!(f, "user_cancelled"),
            Self::Expired => write!(f, "expired"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

/// A user's claim on a position in a station's waiting line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Unique entry identifier.
    pub id: EntryId,
    /// Owning user.
    pub user_id: UserId,
    /// Station whose line this entry is in.
    pub station_id: StationId,
    /// 1-based position in the line. Non-terminal entries at a station
    /// occupy exactly `1..=N`.
    pub position: u32,
    /// Lifecycle status.
    pub status: EntryStatus,
    /// Reservation deadline in milliseconds since epoch.
    /// Present if and only if `status` is [`EntryStatus::Reserved`].
    pub reservation_expiry_ms: Option<u128>,
    /// Recorded cancellation reason, once terminal via cancellation.
    pub cancel_reason: Option<CancelReason>,
    /// Whether a reservation-expiry warning has already been sent.
    pub reminder_sent: bool,
    /// Creation timestamp, milliseconds since epoch.
    pub created_at_ms: u128,
    /// Last mutation timestamp, milliseconds since epoch.
    pub updated_at_ms: u128,
}

impl QueueEntry {
    /// Create a new waiting entry at the given position.
    pub fn new(
        user_id: UserId,
        station_id: StationId,
        position: u32,
        now_ms: u128,
    ) -> Result<Self, QueueError> {
        if !user_id.is_valid() {
            return Err(QueueError::Validation(format!(
                "malformed user id `{user_id}`"
            )));
        }
        if !station_id.is_valid() {
            return Err(QueueError::Validation(format!(
                "malformed station id `{station_id}`"
            )));
        }
        if position == 0 {
            return Err(QueueError::Validation("position must be >= 1".into()));
        }
        Ok(Self {
            id: EntryId::random(),
            user_id,
            station_id,
            position,
            status: EntryStatus::Waiting,
            reservation_expiry_ms: None,
            cancel_reason: None,
            reminder_sent: false,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        })
    }

    /// Whether the entry still participates in the line.
    pub const fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }
}

/// Station attributes relevant to queueing. `current_queue_length` is a
/// derived cache refreshed by the analytics process, not authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Station {
    /// Station identifier.
    pub id: StationId,
    /// Whether the station accepts new queue entries.
    pub is_active: bool,
    /// Installed charging slots.
    pub total_slots: u32,
    /// Slots currently free for reservation or walk-up charging.
    pub available_slots: u32,
    /// Cached count of users in line (waiting or reserved).
    pub current_queue_length: u32,
}

impl Station {
    /// Create a station with all slots free and an empty line.
    pub fn new(id: StationId, total_slots: u32) -> Result<Self, QueueError> {
        if !id.is_valid() {
            return Err(QueueError::Validation(format!(
                "malformed station id `{id}`"
            )));
        }
        Ok(Self {
            id,
            is_active: true,
            total_slots,
            available_slots: total_slots,
            current_queue_length: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_entry_starts_waiting() {
        let e = QueueEntry::new("u1".into(), "s1".into(), 1, 42).unwrap();
        assert_eq!(e.status, EntryStatus::Waiting);
        assert!(e.reservation_expiry_ms.is_none());
        assert!(!e.reminder_sent);
        assert!(e.is_active());
        assert_eq!(e.created_at_ms, 42);
    }

    #[test]
    fn constructor_rejects_bad_input() {
        assert!(QueueEntry::new("".into(), "s1".into(), 1, 0).is_err());
        assert!(QueueEntry::new("u1".into(), " ".into(), 1, 0).is_err());
        assert!(QueueEntry::new("u1".into(), "s1".into(), 0, 0).is_err());
    }

    #[test]
    fn terminal_statuses() {
        assert!(EntryStatus::Completed.is_terminal());
        assert!(EntryStatus::Cancelled.is_terminal());
        assert!(!EntryStatus::Waiting.is_terminal());
        assert!(!EntryStatus::Reserved.is_terminal());
        assert!(!EntryStatus::Charging.is_terminal());
    }

    #[test]
    fn cancel_reason_display() {
        assert_eq!(CancelReason::UserCancelled.to_string(), "user_cancelled");
        assert_eq!(CancelReason::Expired.to_string(), "expired");
        assert_eq!(CancelReason::Admin.to_string(), "admin");
    }
}
