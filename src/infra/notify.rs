//! Notification dispatch boundary.
//!
//! Every call is fire-and-forget from the engine's perspective: failures are
//! logged at the call site and never block or fail the surrounding
//! operation. Message formatting and delivery live outside this crate.

use std::future::Future;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::QueueError;
use crate::infra::sessions::SessionStatus;
use crate::util::{SessionId, StationId, UserId};

/// Outbound user notification channel.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Periodic progress update for a waiting user.
    async fn notify_progress(
        &self,
        user_id: &UserId,
        station_id: &StationId,
        position: u32,
        wait_minutes: u32,
    ) -> Result<(), QueueError>;

    /// A user moved up in line or became eligible for a slot.
    async fn notify_promotion(
        &self,
        user_id: &UserId,
        station_id: &StationId,
        new_position: u32,
    ) -> Result<(), QueueError>;

    /// A live reservation is close to its deadline.
    async fn notify_reservation_warning(
        &self,
        user_id: &UserId,
        station_id: &StationId,
        minutes_left: u32,
    ) -> Result<(), QueueError>;

    /// A reservation lapsed and the entry was cancelled.
    async fn notify_reservation_expired(
        &self,
        user_id: &UserId,
        station_id: &StationId,
    ) -> Result<(), QueueError>;

    /// A charging session is behaving anomalously (e.g. low charge rate).
    async fn notify_anomaly(
        &self,
        user_id: &UserId,
        session_id: &SessionId,
        status: &SessionStatus,
    ) -> Result<(), QueueError>;
}

/// Await a dispatch future, logging instead of propagating failure.
pub(crate) async fn dispatch<F>(context: &'static str, fut: F)
where
    F: Future<Output = Result<(), QueueError>>,
{
    if let Err(e) = fut.await {
        tracing::warn!(context, error = %e, "notification dispatch failed");
    }
}

/// Dispatcher that only emits tracing events. Default production stand-in
/// until a real channel is wired.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDispatcher;

#[async_trait]
impl NotificationDispatcher for LogDispatcher {
    async fn notify_progress(
        &self,
        user_id: &UserId,
        station_id: &StationId,
        position: u32,
        wait_minutes: u32,
    ) -> Result<(), QueueError> {
        tracing::info!(%user_id, %station_id, position, wait_minutes, "queue progress");
        Ok(())
    }

    async fn notify_promotion(
        &self,
        user_id: &UserId,
        station_id: &StationId,
        new_position: u32,
    ) -> Result<(), QueueError> {
        tracing::info!(%user_id, %station_id, new_position, "queue promotion");
        Ok(())
    }

    async fn notify_reservation_warning(
        &self,
        user_id: &UserId,
        station_id: &StationId,
        minutes_left: u32,
    ) -> Result<(), QueueError> {
        tracing::info!(%user_id, %station_id, minutes_left, "reservation expiring soon");
        Ok(())
    }

    async fn notify_reservation_expired(
        &self,
        user_id: &UserId,
        station_id: &StationId,
    ) -> Result<(), QueueError> {
        tracing::info!(%user_id, %station_id, "reservation expired");
        Ok(())
    }

    async fn notify_anomaly(
        &self,
        user_id: &UserId,
        session_id: &SessionId,
        status: &SessionStatus,
    ) -> Result<(), QueueError> {
        tracing::warn!(
            %user_id,
            %session_id,
            battery = status.current_battery_level,
            rate_kw = status.charge_rate_kw,
            "charging anomaly"
        );
        Ok(())
    }
}

/// A notification captured by [`RecordingDispatcher`].
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationEvent {
    /// Progress update.
    Progress {
        /// Recipient.
        user_id: UserId,
        /// Station in question.
        station_id: StationId,
        /// Current position.
        position: u32,
        /// Estimated wait in minutes.
        wait_minutes: u32,
    },
    /// Promotion notice.
    Promotion {
        /// Recipient.
        user_id: UserId,
        /// Station in question.
        station_id: StationId,
        /// New position.
        new_position: u32,
    },
    /// Reservation warning.
    ReservationWarning {
        /// Recipient.
        user_id: UserId,
        /// Station in question.
        station_id: StationId,
        /// Minutes until the reservation lapses.
        minutes_left: u32,
    },
    /// Reservation expired notice.
    ReservationExpired {
        /// Recipient.
        user_id: UserId,
        /// Station in question.
        station_id: StationId,
    },
    /// Session anomaly notice.
    Anomaly {
        /// Recipient.
        user_id: UserId,
        /// Affected session.
        session_id: SessionId,
    },
}

/// Dispatcher that records every notification in memory, for development and
/// testing.
#[derive(Default)]
pub struct RecordingDispatcher {
    events: Mutex<Vec<NotificationEvent>>,
}

impl RecordingDispatcher {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded notifications in dispatch order.
    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn notify_progress(
        &self,
        user_id: &UserId,
        station_id: &StationId,
        position: u32,
        wait_minutes: u32,
    ) -> Result<(), QueueError> {
        self.events.lock().push(NotificationEvent::Progress {
            user_id: user_id.clone(),
            station_id: station_id.clone(),
            position,
            wait_minutes,
        });
        Ok(())
    }

    async fn notify_promotion(
        &self,
        user_id: &UserId,
        station_id: &StationId,
        new_position: u32,
    ) -> Result<(), QueueError> {
        self.events.lock().push(NotificationEvent::Promotion {
            user_id: user_id.clone(),
            station_id: station_id.clone(),
            new_position,
        });
        Ok(())
    }

    async fn notify_reservation_warning(
        &self,
        user_id: &UserId,
        station_id: &StationId,
        minutes_left: u32,
    ) -> Result<(), QueueError> {
        self.events
            .lock()
            .push(NotificationEvent::ReservationWarning {
                user_id: user_id.clone(),
                station_id: station_id.clone(),
                minutes_left,
            });
        Ok(())
    }

    async fn notify_reservation_expired(
        &self,
        user_id: &UserId,
        station_id: &StationId,
    ) -> Result<(), QueueError> {
        self.events
            .lock()
            .push(NotificationEvent::ReservationExpired {
                user_id: user_id.clone(),
                station_id: station_id.clone(),
            });
        Ok(())
    }

    async fn notify_anomaly(
        &self,
        user_id: &UserId,
        session_id: &SessionId,
        _status: &SessionStatus,
    ) -> Result<(), QueueError> {
        self.events.lock().push(NotificationEvent::Anomaly {
            user_id: user_id.clone(),
            session_id: session_id.clone(),
        });
        Ok(())
    }
}
