//! Position rebalancing and stalled-reservation recovery.
//!
//! Restores the line invariant (non-terminal positions are exactly `1..=N`)
//! after removals, writing only the rows whose position actually changes so
//! repeated runs on a consistent station are free. Also promotes past a
//! stalled head-of-line reservation, independently of the expiry monitor, so
//! the line keeps moving even if that process is down.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::QueueConfig;
use crate::core::{CancelReason, EntryStatus, QueueEntry, QueueError};
use crate::infra::notify::{dispatch, NotificationDispatcher};
use crate::infra::store::{EntryUpdate, QueueStore, StatusFilter};
use crate::scheduler::ProcessHandler;
use crate::util::clock::minutes_to_ms;
use crate::util::{Clock, StationId};

/// Recomputes contiguous queue positions and recovers stalled heads.
pub struct PositionRebalancer {
    store: Arc<dyn QueueStore>,
    notifier: Arc<dyn NotificationDispatcher>,
    clock: Arc<dyn Clock>,
    cfg: QueueConfig,
}

impl PositionRebalancer {
    /// Create a rebalancer over the given store.
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

    /// Rewrite positions at one station to `1..=N`. Returns the number of
    /// rows written; an already-consistent station costs zero writes.
    /// Per-row failures are isolated: a raced or failing row is skipped and
    /// the next sweep converges it.
    pub async fn rebalance_station(&self, station_id: &StationId) -> Result<usize, QueueError> {
        let entries = self
            .store
            .queue_entries(station_id, StatusFilter::NonTerminal)
            .await?;
        let mut writes = 0;
        for (idx, entry) in entries.iter().enumerate() {
            let wanted = idx as u32 + 1;
            if entry.position == wanted {
                continue;
            }
            match self
                .store
                .update_entry(&entry.id, entry.status, EntryUpdate::reposition(wanted))
                .await
            {
                Ok(Some(_)) => {
                    writes += 1;
                    if wanted < entry.position {
                        dispatch(
                            "promotion",
                            self.notifier
                                .notify_promotion(&entry.user_id, station_id, wanted),
                        )
                        .await;
                    }
                }
                Ok(None) => {
                    tracing::debug!(
                        entry = %entry.id,
                        %station_id,
                        "entry transitioned mid-rebalance, skipping"
                    );
                }
                Err(e) => {
                    tracing::warn!(entry = %entry.id, %station_id, error = %e, "rebalance write failed");
                }
            }
        }
        if writes > 0 {
            tracing::debug!(%station_id, writes, "rebalanced station");
        }
        Ok(writes)
    }

    /// Detect a head-of-line reservation that lapsed more than the grace
    /// window ago, cancel it, and hand the freed reservation to the next
    /// waiting entry. Returns whether a stalled head was recovered.
    pub async fn recover_stalled_head(&self, station_id: &StationId) -> Result<bool, QueueError> {
        let now = self.clock.now_ms();
        let grace_ms = minutes_to_ms(self.cfg.stall_grace_minutes);
        let entries = self
            .store
            .queue_entries(station_id, StatusFilter::NonTerminal)
            .await?;
        let Some(head) = entries.first() else {
            return Ok(false);
        };
        let stalled = head.status == EntryStatus::Reserved
            && head
                .reservation_expiry_ms
                .is_some_and(|t| t.saturating_add(grace_ms) < now);
        if !stalled {
            return Ok(false);
        }

        let cancelled = self
            .store
            .update_entry(
                &head.id,
                EntryStatus::Reserved,
                EntryUpdate::transition(EntryStatus::Cancelled)
                    .clear_expiry()
                    .with_cancel_reason(CancelReason::Expired),
            )
            .await?;
        if cancelled.is_none() {
            // Lost the race to the expiry monitor; nothing left to do here.
            return Ok(false);
        }
        tracing::warn!(
            entry = %head.id,
            user = %head.user_id,
            %station_id,
            "cancelled stalled head-of-line reservation"
        );
        dispatch(
            "reservation_expired",
            self.notifier
                .notify_reservation_expired(&head.user_id, station_id),
        )
        .await;
        self.rebalance_station(station_id).await?;
        self.promote_next_waiting(station_id, now).await?;
        Ok(true)
    }

    /// Promote the head waiting entry into a fresh reservation if a slot is
    /// free.
    async fn promote_next_waiting(
        &self,
        station_id: &StationId,
        now_ms: u128,
    ) -> Result<(), QueueError> {
        let station = self.store.station(station_id).await?;
        let slot_free = station.is_some_and(|s| s.available_slots > 0);
        if !slot_free {
            return Ok(());
        }
        let entries = self
            .store
            .queue_entries(station_id, StatusFilter::NonTerminal)
            .await?;
        let Some(next) = entries
            .iter()
            .find(|e| e.status == EntryStatus::Waiting && e.position == 1)
        else {
            return Ok(());
        };
        let expiry = now_ms + minutes_to_ms(self.cfg.default_reservation_minutes);
        match self
            .store
            .update_entry(
                &next.id,
                EntryStatus::Waiting,
                EntryUpdate::transition(EntryStatus::Reserved).with_expiry(expiry),
            )
            .await?
        {
            Some(_) => {
                tracing::info!(entry = %next.id, user = %next.user_id, %station_id, "promoted next waiting entry to reserved");
                dispatch(
                    "promotion",
                    self.notifier.notify_promotion(&next.user_id, station_id, 1),
                )
                .await;
            }
            None => {
                tracing::debug!(entry = %next.id, %station_id, "promotion raced, entry no longer waiting");
            }
        }
        Ok(())
    }

    /// Sweep every station: rebalance plus stalled-head recovery, with
    /// per-station failure isolation.
    pub async fn run_sweep(&self) -> Result<(), QueueError> {
        let stations = self.store.stations().await?;
        let mut total_writes = 0;
        for station in &stations {
            match self.rebalance_station(&station.id).await {
                Ok(writes) => total_writes += writes,
                Err(e) => {
                    tracing::warn!(station = %station.id, error = %e, "rebalance sweep failed for station");
                }
            }
            if let Err(e) = self.recover_stalled_head(&station.id).await {
                tracing::warn!(station = %station.id, error = %e, "stalled-head recovery failed for station");
            }
        }
        tracing::debug!(
            stations = stations.len(),
            writes = total_writes,
            "optimization sweep complete"
        );
        Ok(())
    }
}

#[async_trait]
impl ProcessHandler for PositionRebalancer {
    async fn run(&self) -> Result<(), QueueError> {
        self.run_sweep().await
    }
}

/// Check the `1..=N` position invariant over an ordered snapshot of
/// non-terminal entries.
pub fn positions_are_contiguous(entries: &[QueueEntry]) -> bool {
    entries
        .iter()
        .enumerate()
        .all(|(idx, e)| e.position == idx as u32 + 1)
}
