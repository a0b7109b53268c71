//! Expiry monitor: the "cleanup" periodic process.
//!
//! Finds reservations past their deadline and cancels them through the queue
//! service, returning the slot to circulation. Liveness of the whole system
//! depends on this sweep, so every item is handled in isolation and the
//! found/cleaned counts are logged on each run.

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{CancelReason, QueueError, QueueService};
use crate::infra::notify::{dispatch, NotificationDispatcher};
use crate::infra::store::QueueStore;
use crate::scheduler::ProcessHandler;
use crate::util::Clock;

/// Cancels lapsed reservations across all stations.
pub struct ExpiryMonitor {
    service: Arc<QueueService>,
    store: Arc<dyn QueueStore>,
    notifier: Arc<dyn NotificationDispatcher>,
    clock: Arc<dyn Clock>,
}

impl ExpiryMonitor {
    /// Create a monitor delegating cancellations to the queue service.
    pub fn new(
        service: Arc<QueueService>,
        store: Arc<dyn QueueStore>,
        notifier: Arc<dyn NotificationDispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            service,
            store,
            notifier,
            clock,
        }
    }

    /// Run one cleanup pass. Returns the number of reservations cleaned.
    pub async fn run_sweep(&self) -> Result<usize, QueueError> {
        let now = self.clock.now_ms();
        let expired = self.store.expired_reservations(now).await?;
        let found = expired.len();
        let mut cleaned = 0;
        for entry in expired {
            let left = self
                .service
                .leave_queue(&entry.user_id, &entry.station_id, CancelReason::Expired)
                .await;
            if left {
                cleaned += 1;
                dispatch(
                    "reservation_expired",
                    self.notifier
                        .notify_reservation_expired(&entry.user_id, &entry.station_id),
                )
                .await;
            } else {
                tracing::warn!(
                    entry = %entry.id,
                    user = %entry.user_id,
                    station = %entry.station_id,
                    "expired reservation could not be cancelled this pass"
                );
            }
        }
        if found > 0 {
            tracing::info!(found, cleaned, "expiry sweep complete");
        } else {
            tracing::debug!("expiry sweep found nothing to clean");
        }
        Ok(cleaned)
    }
}

#[async_trait]
impl ProcessHandler for ExpiryMonitor {
    async fn run(&self) -> Result<(), QueueError> {
        self.run_sweep().await.map(|_| ())
    }
}
