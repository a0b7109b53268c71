//! Queue state machine: join, reserve, leave, start/complete charging.
//!
//! Operations other than `join` resolve every failure mode to a boolean plus
//! a structured log entry; nothing is thrown across the public boundary.
//! Transitions are narrow conditional updates on the entry's current status,
//! so two paths racing on the same entry cannot lose writes — one of them
//! observes the precondition mismatch and backs off.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::QueueConfig;
use crate::core::audit::{build_queue_event, AuditSink};
use crate::core::{CancelReason, EntryStatus, QueueEntry, QueueError};
use crate::core::rebalance::PositionRebalancer;
use crate::infra::notify::NotificationDispatcher;
use crate::infra::store::{EntryUpdate, QueueStore, StationDerived, StatusFilter};
use crate::util::clock::minutes_to_ms;
use crate::util::{Clock, EntryId, StationId, UserId};

/// Successful `join` outcome.
#[derive(Debug, Clone)]
pub struct JoinReceipt {
    /// Identifier of the created entry.
    pub entry_id: EntryId,
    /// Assigned 1-based position.
    pub position: u32,
    /// Rough wait estimate based on line length and slot throughput.
    pub estimated_wait_minutes: u32,
}

/// Estimated wait for a given position: positions ahead divided by slot
/// throughput, rounded up.
pub(crate) fn estimated_wait_minutes(
    position: u32,
    total_slots: u32,
    avg_session_minutes: u32,
) -> u32 {
    let work = u64::from(position) * u64::from(avg_session_minutes);
    let minutes = work.div_ceil(u64::from(total_slots.max(1)));
    u32::try_from(minutes).unwrap_or(u32::MAX)
}

/// Core queue and reservation state machine for all stations.
pub struct QueueService {
    store: Arc<dyn QueueStore>,
    clock: Arc<dyn Clock>,
    rebalancer: PositionRebalancer,
    audit: Option<Arc<Mutex<Box<dyn AuditSink>>>>,
    cfg: QueueConfig,
}

impl QueueService {
    /// Create a service over the given store and collaborators.
    pub fn new(
        store: Arc<dyn QueueStore>,
        notifier: Arc<dyn NotificationDispatcher>,
        clock: Arc<dyn Clock>,
        cfg: QueueConfig,
    ) -> Self {
        let rebalancer = PositionRebalancer::new(
            Arc::clone(&store),
            notifier,
            Arc::clone(&clock),
            cfg.clone(),
        );
        Self {
            store,
            clock,
            rebalancer,
            audit: None,
            cfg,
        }
    }

    /// Attach an audit sink recording lifecycle events.
    #[must_use]
    pub fn with_audit(mut self, audit: Box<dyn AuditSink>) -> Self {
        self.audit = Some(Arc::new(Mutex::new(audit)));
        self
    }

    /// Join a station's waiting line.
    ///
    /// Rejects with [`QueueError::Conflict`] when the user already holds a
    /// non-terminal entry at any station (single active booking, enforced
    /// globally) or the station is inactive; [`QueueError::NotFound`] for an
    /// unknown station; [`QueueError::Validation`] for malformed ids.
    pub async fn join(
        &self,
        user_id: &UserId,
        station_id: &StationId,
    ) -> Result<JoinReceipt, QueueError> {
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
        let station = self
            .store
            .station(station_id)
            .await?
            .ok_or_else(|| QueueError::NotFound(format!("station {station_id}")))?;
        if !station.is_active {
            return Err(QueueError::Conflict(format!(
                "station {station_id} is not accepting new entries"
            )));
        }
        let existing = self.store.entries_for_user(user_id).await?;
        if let Some(active) = existing.iter().find(|e| e.is_active()) {
            return Err(QueueError::Conflict(format!(
                "user {user_id} already holds an active entry at station {}",
                active.station_id
            )));
        }

        let line = self
            .store
            .queue_entries(station_id, StatusFilter::NonTerminal)
            .await?;
        let position = line.iter().map(|e| e.position).max().unwrap_or(0) + 1;
        let entry = QueueEntry::new(
            user_id.clone(),
            station_id.clone(),
            position,
            self.clock.now_ms(),
        )?;
        let entry_id = entry.id;
        self.store.insert_entry(entry).await?;
        self.record_audit(entry_id, user_id, station_id, "join", None);
        tracing::info!(%user_id, %station_id, position, "user joined queue");

        Ok(JoinReceipt {
            entry_id,
            position,
            estimated_wait_minutes: estimated_wait_minutes(
                position,
                station.total_slots,
                self.cfg.avg_session_minutes,
            ),
        })
    }

    /// Grant the head-of-line entry a time-boxed reservation on a free slot.
    /// Returns false on any precondition failure.
    pub async fn reserve_slot(
        &self,
        user_id: &UserId,
        station_id: &StationId,
        duration_minutes: u32,
    ) -> bool {
        match self
            .try_reserve_slot(user_id, station_id, duration_minutes)
            .await
        {
            Ok(reserved) => reserved,
            Err(e) => {
                tracing::error!(%user_id, %station_id, error = %e, "reserve_slot failed");
                false
            }
        }
    }

    async fn try_reserve_slot(
        &self,
        user_id: &UserId,
        station_id: &StationId,
        duration_minutes: u32,
    ) -> Result<bool, QueueError> {
        if duration_minutes == 0 {
            tracing::warn!(%user_id, %station_id, "rejecting zero-length reservation");
            return Ok(false);
        }
        let Some(entry) = self.find_active_entry(user_id, station_id).await? else {
            tracing::warn!(%user_id, %station_id, "reserve_slot: no active entry");
            return Ok(false);
        };
        if entry.status != EntryStatus::Waiting || entry.position != 1 {
            tracing::warn!(
                %user_id, %station_id,
                status = %entry.status,
                position = entry.position,
                "reserve_slot: entry not at head of line in waiting state"
            );
            return Ok(false);
        }
        let slot_free = self
            .store
            .station(station_id)
            .await?
            .is_some_and(|s| s.available_slots > 0);
        if !slot_free {
            tracing::warn!(%user_id, %station_id, "reserve_slot: no free slot");
            return Ok(false);
        }

        let expiry = self.clock.now_ms() + minutes_to_ms(duration_minutes);
        let updated = self
            .store
            .update_entry(
                &entry.id,
                EntryStatus::Waiting,
                EntryUpdate::transition(EntryStatus::Reserved).with_expiry(expiry),
            )
            .await?;
        if updated.is_none() {
            tracing::warn!(%user_id, %station_id, "reserve_slot: entry transitioned concurrently");
            return Ok(false);
        }
        self.record_audit(entry.id, user_id, station_id, "reserve", None);
        tracing::info!(%user_id, %station_id, duration_minutes, "slot reserved");
        Ok(true)
    }

    /// Remove a user from the line, recording the reason, and rebalance the
    /// station before returning so callers observe a consistent queue.
    pub async fn leave_queue(
        &self,
        user_id: &UserId,
        station_id: &StationId,
        reason: CancelReason,
    ) -> bool {
        match self.try_leave_queue(user_id, station_id, reason).await {
            Ok(left) => left,
            Err(e) => {
                tracing::error!(%user_id, %station_id, error = %e, "leave_queue failed");
                false
            }
        }
    }

    async fn try_leave_queue(
        &self,
        user_id: &UserId,
        station_id: &StationId,
        reason: CancelReason,
    ) -> Result<bool, QueueError> {
        let Some(entry) = self.find_active_entry(user_id, station_id).await? else {
            tracing::debug!(%user_id, %station_id, "leave_queue: no active entry");
            return Ok(false);
        };
        let was_charging = entry.status == EntryStatus::Charging;
        let updated = self
            .store
            .update_entry(
                &entry.id,
                entry.status,
                EntryUpdate::transition(EntryStatus::Cancelled)
                    .clear_expiry()
                    .with_cancel_reason(reason),
            )
            .await?;
        if updated.is_none() {
            tracing::debug!(%user_id, %station_id, "leave_queue: entry transitioned concurrently");
            return Ok(false);
        }
        self.record_audit(
            entry.id,
            user_id,
            station_id,
            "cancel",
            Some(reason.to_string()),
        );
        tracing::info!(%user_id, %station_id, %reason, "user left queue");
        if was_charging {
            self.release_slot(station_id).await;
        }
        if let Err(e) = self.rebalancer.rebalance_station(station_id).await {
            tracing::warn!(%station_id, error = %e, "post-leave rebalance failed");
        }
        Ok(true)
    }

    /// Begin charging from a reservation (or directly from the head of an
    /// idle line). Clears the reservation deadline and occupies a slot.
    pub async fn start_charging(&self, user_id: &UserId, station_id: &StationId) -> bool {
        match self.try_start_charging(user_id, station_id).await {
            Ok(started) => started,
            Err(e) => {
                tracing::error!(%user_id, %station_id, error = %e, "start_charging failed");
                false
            }
        }
    }

    async fn try_start_charging(
        &self,
        user_id: &UserId,
        station_id: &StationId,
    ) -> Result<bool, QueueError> {
        let Some(entry) = self.find_active_entry(user_id, station_id).await? else {
            tracing::warn!(%user_id, %station_id, "start_charging: no active entry");
            return Ok(false);
        };
        if !matches!(entry.status, EntryStatus::Reserved | EntryStatus::Waiting) {
            tracing::warn!(%user_id, %station_id, status = %entry.status, "start_charging: invalid source state");
            return Ok(false);
        }
        let updated = self
            .store
            .update_entry(
                &entry.id,
                entry.status,
                EntryUpdate::transition(EntryStatus::Charging).clear_expiry(),
            )
            .await?;
        if updated.is_none() {
            tracing::warn!(%user_id, %station_id, "start_charging: entry transitioned concurrently");
            return Ok(false);
        }
        self.occupy_slot(station_id).await;
        self.record_audit(entry.id, user_id, station_id, "start_charging", None);
        tracing::info!(%user_id, %station_id, "charging started");
        Ok(true)
    }

    /// Finish charging normally, free the slot, and rebalance.
    pub async fn complete_charging(&self, user_id: &UserId, station_id: &StationId) -> bool {
        self.finish_charging(user_id, station_id, EntryStatus::Completed, None)
            .await
    }

    /// Forcibly stop an active charging session (operator action); the entry
    /// is cancelled rather than completed.
    pub async fn force_stop(&self, user_id: &UserId, station_id: &StationId) -> bool {
        self.finish_charging(
            user_id,
            station_id,
            EntryStatus::Cancelled,
            Some(CancelReason::Admin),
        )
        .await
    }

    async fn finish_charging(
        &self,
        user_id: &UserId,
        station_id: &StationId,
        target: EntryStatus,
        reason: Option<CancelReason>,
    ) -> bool {
        match self
            .try_finish_charging(user_id, station_id, target, reason)
            .await
        {
            Ok(done) => done,
            Err(e) => {
                tracing::error!(%user_id, %station_id, error = %e, "finish charging failed");
                false
            }
        }
    }

    async fn try_finish_charging(
        &self,
        user_id: &UserId,
        station_id: &StationId,
        target: EntryStatus,
        reason: Option<CancelReason>,
    ) -> Result<bool, QueueError> {
        let Some(entry) = self.find_active_entry(user_id, station_id).await? else {
            tracing::warn!(%user_id, %station_id, "finish charging: no active entry");
            return Ok(false);
        };
        if entry.status != EntryStatus::Charging {
            tracing::warn!(%user_id, %station_id, status = %entry.status, "finish charging: entry not charging");
            return Ok(false);
        }
        let mut update = EntryUpdate::transition(target).clear_expiry();
        if let Some(reason) = reason {
            update = update.with_cancel_reason(reason);
        }
        let updated = self
            .store
            .update_entry(&entry.id, EntryStatus::Charging, update)
            .await?;
        if updated.is_none() {
            tracing::warn!(%user_id, %station_id, "finish charging: entry transitioned concurrently");
            return Ok(false);
        }
        self.release_slot(station_id).await;
        let action = if target == EntryStatus::Completed {
            "complete"
        } else {
            "force_stop"
        };
        self.record_audit(
            entry.id,
            user_id,
            station_id,
            action,
            reason.map(|r| r.to_string()),
        );
        tracing::info!(%user_id, %station_id, action, "charging finished");
        if let Err(e) = self.rebalancer.rebalance_station(station_id).await {
            tracing::warn!(%station_id, error = %e, "post-completion rebalance failed");
        }
        Ok(true)
    }

    async fn find_active_entry(
        &self,
        user_id: &UserId,
        station_id: &StationId,
    ) -> Result<Option<QueueEntry>, QueueError> {
        let line = self
            .store
            .queue_entries(station_id, StatusFilter::NonTerminal)
            .await?;
        Ok(line.into_iter().find(|e| &e.user_id == user_id))
    }

    async fn occupy_slot(&self, station_id: &StationId) {
        self.adjust_slots(station_id, |available, _total| available.saturating_sub(1))
            .await;
    }

    async fn release_slot(&self, station_id: &StationId) {
        self.adjust_slots(station_id, |available, total| (available + 1).min(total))
            .await;
    }

    async fn adjust_slots(&self, station_id: &StationId, f: impl Fn(u32, u32) -> u32) {
        let result = async {
            let Some(station) = self.store.station(station_id).await? else {
                return Err(QueueError::NotFound(format!("station {station_id}")));
            };
            let fields = StationDerived {
                available_slots: Some(f(station.available_slots, station.total_slots)),
                current_queue_length: None,
            };
            self.store.update_station_derived(station_id, fields).await
        }
        .await;
        if let Err(e) = result {
            // The analytics sweep reconciles the count from charging entries.
            tracing::warn!(%station_id, error = %e, "slot count adjustment failed");
        }
    }

    fn record_audit(
        &self,
        entry_id: EntryId,
        user_id: &UserId,
        station_id: &StationId,
        action: &str,
        detail: Option<String>,
    ) {
        if let Some(audit) = &self.audit {
            audit.lock().record(build_queue_event(
                entry_id,
                user_id.clone(),
                station_id.clone(),
                action,
                detail,
            ));
        }
    }
}
