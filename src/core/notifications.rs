//! Notification and availability-alert sweeps.
//!
//! The notification sweep sends progress updates to waiting users and a
//! one-shot warning to reservations close to their deadline. The warning is
//! claimed through a conditional `reminder_sent` update *before* dispatch,
//! so overlapping sweep runs cannot double-send it.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::QueueConfig;
use crate::core::queue_service::estimated_wait_minutes;
use crate::core::{EntryStatus, QueueError};
use crate::infra::notify::{dispatch, NotificationDispatcher};
use crate::infra::store::{EntryUpdate, QueueStore, StatusFilter};
use crate::scheduler::ProcessHandler;
use crate::util::clock::minutes_to_ms;
use crate::util::Clock;

/// Periodic progress updates and reservation warnings.
pub struct NotificationSweep {
    store: Arc<dyn QueueStore>,
    notifier: Arc<dyn NotificationDispatcher>,
    clock: Arc<dyn Clock>,
    cfg: QueueConfig,
}

impl NotificationSweep {
    /// Create the sweep.
    pub fn new(
        store: Arc<dyn QueueStore>,
        notifier: Arc<dyn NotificationDispatcher>,
        clock: Arc<dyn Clock>,
        cfg: QueueConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            clock,
            cfg,
        }
    }

    /// Run one notification pass over every station.
    pub async fn run_sweep(&self) -> Result<(), QueueError> {
        let now = self.clock.now_ms();
        let warning_ms = minutes_to_ms(self.cfg.reservation_warning_minutes);
        for station in self.store.stations().await? {
            let line = self
                .store
                .queue_entries(&station.id, StatusFilter::NonTerminal)
                .await?;
            for entry in line {
                match entry.status {
                    EntryStatus::Waiting => {
                        let wait = estimated_wait_minutes(
                            entry.position,
                            station.total_slots,
                            self.cfg.avg_session_minutes,
                        );
                        dispatch(
                            "progress",
                            self.notifier.notify_progress(
                                &entry.user_id,
                                &station.id,
                                entry.position,
                                wait,
                            ),
                        )
                        .await;
                    }
                    EntryStatus::Reserved if !entry.reminder_sent => {
                        let Some(expiry) = entry.reservation_expiry_ms else {
                            continue;
                        };
                        if expiry <= now || expiry - now > warning_ms {
                            continue;
                        }
                        // Claim the reminder first; a raced claim means some
                        // other run already owns this warning.
                        let claimed = self
                            .store
                            .update_entry(
                                &entry.id,
                                EntryStatus::Reserved,
                                EntryUpdate::default().with_reminder_sent(true),
                            )
                            .await?;
                        if claimed.is_none() {
                            continue;
                        }
                        let minutes_left =
                            u32::try_from((expiry - now).div_ceil(60_000)).unwrap_or(u32::MAX);
                        dispatch(
                            "reservation_warning",
                            self.notifier.notify_reservation_warning(
                                &entry.user_id,
                                &station.id,
                                minutes_left,
                            ),
                        )
                        .await;
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ProcessHandler for NotificationSweep {
    async fn run(&self) -> Result<(), QueueError> {
        self.run_sweep().await
    }
}

/// Alerts the head-of-line waiting user when a slot is free at their
/// station.
pub struct AvailabilityAlerts {
    store: Arc<dyn QueueStore>,
    notifier: Arc<dyn NotificationDispatcher>,
}

impl AvailabilityAlerts {
    /// Create the alert sweep.
    pub fn new(store: Arc<dyn QueueStore>, notifier: Arc<dyn NotificationDispatcher>) -> Self {
        Self { store, notifier }
    }

    /// Run one alert pass over every active station with free slots.
    pub async fn run_sweep(&self) -> Result<(), QueueError> {
        for station in self.store.stations().await? {
            if !station.is_active || station.available_slots == 0 {
                continue;
            }
            let line = self
                .store
                .queue_entries(&station.id, StatusFilter::Only(EntryStatus::Waiting))
                .await?;
            let Some(head) = line.iter().find(|e| e.position == 1) else {
                continue;
            };
            dispatch(
                "availability",
                self.notifier.notify_promotion(&head.user_id, &station.id, 1),
            )
            .await;
        }
        Ok(())
    }
}

#[async_trait]
impl ProcessHandler for AvailabilityAlerts {
    async fn run(&self) -> Result<(), QueueError> {
        self.run_sweep().await
    }
}
