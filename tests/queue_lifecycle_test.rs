//! Queue and reservation lifecycle tests.
//!
//! Covers the core state machine end to end: FIFO position assignment,
//! duplicate-booking rejection, reservation preconditions, expiry cleanup,
//! rebalancing after removals, stalled-head recovery, and the charging
//! lifecycle including forced stops.

use std::sync::Arc;

use chargeline::config::QueueConfig;
use async_trait::async_trait;
use chargeline::core::{
    positions_are_contiguous, AuditSink, CancelReason, EntryStatus, ExpiryMonitor,
    PositionRebalancer, QueueEntry, QueueError, QueueEvent, QueueService, Station,
};
use chargeline::infra::notify::{NotificationEvent, RecordingDispatcher};
use chargeline::infra::store::{
    EntryUpdate, InMemoryStore, QueueStore, StationDerived, StatusFilter,
};
use chargeline::util::{Clock, EntryId, ManualClock, StationId, UserId};
use parking_lot::Mutex;

const T0: u64 = 1_700_000_000_000;

struct Harness {
    store: Arc<InMemoryStore>,
    notifier: Arc<RecordingDispatcher>,
    clock: Arc<ManualClock>,
    service: Arc<QueueService>,
}

fn harness() -> Harness {
    chargeline::util::init_tracing();
    let clock = Arc::new(ManualClock::new(T0));
    let store = Arc::new(InMemoryStore::new(clock.clone()));
    let notifier = Arc::new(RecordingDispatcher::new());
    let service = Arc::new(QueueService::new(
        store.clone(),
        notifier.clone(),
        clock.clone(),
        QueueConfig::default(),
    ));
    Harness {
        store,
        notifier,
        clock,
        service,
    }
}

fn station(h: &Harness, id: &str, slots: u32) -> StationId {
    let station = Station::new(id.into(), slots).unwrap();
    h.store.put_station(station);
    id.into()
}

async fn line(h: &Harness, station: &StationId) -> Vec<(String, u32, EntryStatus)> {
    h.store
        .queue_entries(station, StatusFilter::NonTerminal)
        .await
        .unwrap()
        .into_iter()
        .map(|e| (e.user_id.as_str().to_string(), e.position, e.status))
        .collect()
}

#[tokio::test]
async fn join_assigns_fifo_positions_and_wait_estimates() {
    let h = harness();
    let s = station(&h, "s1", 2);

    let a = h.service.join(&"alice".into(), &s).await.unwrap();
    let b = h.service.join(&"bob".into(), &s).await.unwrap();
    let c = h.service.join(&"carol".into(), &s).await.unwrap();

    assert_eq!((a.position, b.position, c.position), (1, 2, 3));
    // 30-minute average sessions across 2 slots.
    assert_eq!(a.estimated_wait_minutes, 15);
    assert_eq!(b.estimated_wait_minutes, 30);
    assert_eq!(c.estimated_wait_minutes, 45);

    let entries = h
        .store
        .queue_entries(&s, StatusFilter::NonTerminal)
        .await
        .unwrap();
    assert!(positions_are_contiguous(&entries));
}

#[tokio::test]
async fn join_enforces_single_active_booking() {
    let h = harness();
    let s1 = station(&h, "s1", 2);
    let s2 = station(&h, "s2", 2);

    h.service.join(&"alice".into(), &s1).await.unwrap();

    let same = h.service.join(&"alice".into(), &s1).await;
    assert!(matches!(same, Err(QueueError::Conflict(_))));

    // Single active booking is global, not per-station.
    let other = h.service.join(&"alice".into(), &s2).await;
    assert!(matches!(other, Err(QueueError::Conflict(_))));

    let entries = h.store.entries_for_user(&"alice".into()).await.unwrap();
    assert_eq!(entries.len(), 1);

    // A terminal transition frees the user to rejoin.
    assert!(
        h.service
            .leave_queue(&"alice".into(), &s1, CancelReason::UserCancelled)
            .await
    );
    h.service.join(&"alice".into(), &s2).await.unwrap();
}

#[tokio::test]
async fn join_validates_inputs_and_station_state() {
    let h = harness();
    let s = station(&h, "s1", 2);

    let bad_user = h.service.join(&"".into(), &s).await;
    assert!(matches!(bad_user, Err(QueueError::Validation(_))));

    let unknown = h.service.join(&"alice".into(), &"nowhere".into()).await;
    assert!(matches!(unknown, Err(QueueError::NotFound(_))));

    let mut inactive = Station::new("closed".into(), 2).unwrap();
    inactive.is_active = false;
    h.store.put_station(inactive);
    let closed = h.service.join(&"alice".into(), &"closed".into()).await;
    assert!(matches!(closed, Err(QueueError::Conflict(_))));
}

#[tokio::test]
async fn reserve_requires_head_position_and_free_slot() {
    let h = harness();
    let s = station(&h, "s1", 1);
    h.service.join(&"alice".into(), &s).await.unwrap();
    h.service.join(&"bob".into(), &s).await.unwrap();

    // Not at the head of the line.
    assert!(!h.service.reserve_slot(&"bob".into(), &s, 15).await);
    // Unknown entry.
    assert!(!h.service.reserve_slot(&"mallory".into(), &s, 15).await);
    // Zero-length reservation.
    assert!(!h.service.reserve_slot(&"alice".into(), &s, 0).await);

    assert!(h.service.reserve_slot(&"alice".into(), &s, 15).await);
    let entries = h
        .store
        .queue_entries(&s, StatusFilter::NonTerminal)
        .await
        .unwrap();
    assert_eq!(entries[0].status, EntryStatus::Reserved);
    assert_eq!(
        entries[0].reservation_expiry_ms,
        Some(h.clock.now_ms() + 15 * 60_000)
    );

    // Already reserved: a second reserve is a no-op.
    assert!(!h.service.reserve_slot(&"alice".into(), &s, 15).await);

    // No free slot anywhere.
    let mut full = Station::new("full".into(), 1).unwrap();
    full.available_slots = 0;
    h.store.put_station(full);
    h.service
        .leave_queue(&"alice".into(), &s, CancelReason::UserCancelled)
        .await;
    h.service
        .leave_queue(&"bob".into(), &s, CancelReason::UserCancelled)
        .await;
    h.service.join(&"alice".into(), &"full".into()).await.unwrap();
    assert!(!h.service.reserve_slot(&"alice".into(), &"full".into(), 15).await);
}

#[tokio::test]
async fn expired_reservation_is_cleaned_and_line_rebalanced() {
    let h = harness();
    let s = station(&h, "s1", 2);
    let a = h.service.join(&"alice".into(), &s).await.unwrap();
    h.service.join(&"bob".into(), &s).await.unwrap();
    h.service.join(&"carol".into(), &s).await.unwrap();

    assert!(h.service.reserve_slot(&"alice".into(), &s, 15).await);

    let monitor = ExpiryMonitor::new(
        h.service.clone(),
        h.store.clone(),
        h.notifier.clone(),
        h.clock.clone(),
    );

    // Nothing to clean before the deadline.
    h.clock.advance_minutes(14);
    assert_eq!(monitor.run_sweep().await.unwrap(), 0);

    h.clock.advance_minutes(2);
    assert_eq!(monitor.run_sweep().await.unwrap(), 1);

    let alice = h.store.entry(&a.entry_id).unwrap();
    assert_eq!(alice.status, EntryStatus::Cancelled);
    assert_eq!(alice.cancel_reason, Some(CancelReason::Expired));
    assert!(alice.reservation_expiry_ms.is_none());

    assert_eq!(
        line(&h, &s).await,
        vec![
            ("bob".to_string(), 1, EntryStatus::Waiting),
            ("carol".to_string(), 2, EntryStatus::Waiting),
        ]
    );

    let events = h.notifier.events();
    assert!(events.contains(&NotificationEvent::ReservationExpired {
        user_id: "alice".into(),
        station_id: s.clone(),
    }));

    // A second sweep finds nothing.
    assert_eq!(monitor.run_sweep().await.unwrap(), 0);
}

#[tokio::test]
async fn leave_queue_rebalances_synchronously() {
    let h = harness();
    let s = station(&h, "s1", 2);
    h.service.join(&"alice".into(), &s).await.unwrap();
    h.service.join(&"bob".into(), &s).await.unwrap();
    h.service.join(&"carol".into(), &s).await.unwrap();

    assert!(
        h.service
            .leave_queue(&"bob".into(), &s, CancelReason::UserCancelled)
            .await
    );

    assert_eq!(
        line(&h, &s).await,
        vec![
            ("alice".to_string(), 1, EntryStatus::Waiting),
            ("carol".to_string(), 2, EntryStatus::Waiting),
        ]
    );

    // Carol moved up and was told so.
    assert!(h.notifier.events().contains(&NotificationEvent::Promotion {
        user_id: "carol".into(),
        station_id: s.clone(),
        new_position: 2,
    }));

    // Leaving twice is a no-op.
    assert!(
        !h.service
            .leave_queue(&"bob".into(), &s, CancelReason::UserCancelled)
            .await
    );
}

#[tokio::test]
async fn charging_lifecycle_tracks_slots() {
    let h = harness();
    let s = station(&h, "s1", 4);
    h.service.join(&"alice".into(), &s).await.unwrap();

    assert!(h.service.reserve_slot(&"alice".into(), &s, 15).await);
    assert!(h.service.start_charging(&"alice".into(), &s).await);

    let entries = h
        .store
        .queue_entries(&s, StatusFilter::NonTerminal)
        .await
        .unwrap();
    assert_eq!(entries[0].status, EntryStatus::Charging);
    assert!(entries[0].reservation_expiry_ms.is_none());
    assert_eq!(h.store.station(&s).await.unwrap().unwrap().available_slots, 3);

    // Completing from a non-charging state is rejected.
    assert!(!h.service.complete_charging(&"bob".into(), &s).await);

    assert!(h.service.complete_charging(&"alice".into(), &s).await);
    let all = h.store.queue_entries(&s, StatusFilter::All).await.unwrap();
    assert_eq!(all[0].status, EntryStatus::Completed);
    assert_eq!(h.store.station(&s).await.unwrap().unwrap().available_slots, 4);
}

#[tokio::test]
async fn walk_up_charging_skips_reservation() {
    let h = harness();
    let s = station(&h, "s1", 2);
    h.service.join(&"alice".into(), &s).await.unwrap();

    // Waiting -> Charging directly is a valid transition.
    assert!(h.service.start_charging(&"alice".into(), &s).await);
    let entries = h
        .store
        .queue_entries(&s, StatusFilter::NonTerminal)
        .await
        .unwrap();
    assert_eq!(entries[0].status, EntryStatus::Charging);
}

#[tokio::test]
async fn force_stop_cancels_a_charging_session() {
    let h = harness();
    let s = station(&h, "s1", 2);
    let a = h.service.join(&"alice".into(), &s).await.unwrap();
    assert!(h.service.start_charging(&"alice".into(), &s).await);

    assert!(h.service.force_stop(&"alice".into(), &s).await);
    let alice = h.store.entry(&a.entry_id).unwrap();
    assert_eq!(alice.status, EntryStatus::Cancelled);
    assert_eq!(alice.cancel_reason, Some(CancelReason::Admin));
    assert_eq!(h.store.station(&s).await.unwrap().unwrap().available_slots, 2);

    // Force-stopping a non-charging entry is rejected.
    assert!(!h.service.force_stop(&"alice".into(), &s).await);
}

#[tokio::test]
async fn rebalancer_is_idempotent_with_minimal_writes() {
    let h = harness();
    let s = station(&h, "s1", 2);
    h.service.join(&"alice".into(), &s).await.unwrap();
    let b = h.service.join(&"bob".into(), &s).await.unwrap();
    h.service.join(&"carol".into(), &s).await.unwrap();

    // Cancel bob behind the service's back to open a gap.
    h.store
        .update_entry(
            &b.entry_id,
            EntryStatus::Waiting,
            EntryUpdate::transition(EntryStatus::Cancelled)
                .with_cancel_reason(CancelReason::Admin),
        )
        .await
        .unwrap()
        .unwrap();

    let rebalancer = PositionRebalancer::new(
        h.store.clone(),
        h.notifier.clone(),
        h.clock.clone(),
        QueueConfig::default(),
    );

    // Only carol's row (3 -> 2) needs rewriting.
    assert_eq!(rebalancer.rebalance_station(&s).await.unwrap(), 1);

    // Already consistent: zero additional writes, not even in the store.
    let before = h.store.entry_writes();
    assert_eq!(rebalancer.rebalance_station(&s).await.unwrap(), 0);
    assert_eq!(h.store.entry_writes(), before);

    let entries = h
        .store
        .queue_entries(&s, StatusFilter::NonTerminal)
        .await
        .unwrap();
    assert!(positions_are_contiguous(&entries));
}

/// Store that parks the task around the write path, modeling the await
/// points any networked store has between a read and the following insert.
struct YieldingStore(Arc<InMemoryStore>);

#[async_trait]
impl QueueStore for YieldingStore {
    async fn queue_entries(
        &self,
        station_id: &StationId,
        filter: StatusFilter,
    ) -> Result<Vec<QueueEntry>, QueueError> {
        self.0.queue_entries(station_id, filter).await
    }

    async fn entries_for_user(&self, user_id: &UserId) -> Result<Vec<QueueEntry>, QueueError> {
        let found = self.0.entries_for_user(user_id).await;
        tokio::task::yield_now().await;
        found
    }

    async fn expired_reservations(&self, now_ms: u128) -> Result<Vec<QueueEntry>, QueueError> {
        self.0.expired_reservations(now_ms).await
    }

    async fn insert_entry(&self, entry: QueueEntry) -> Result<(), QueueError> {
        tokio::task::yield_now().await;
        self.0.insert_entry(entry).await
    }

    async fn update_entry(
        &self,
        id: &EntryId,
        expected_status: EntryStatus,
        update: EntryUpdate,
    ) -> Result<Option<QueueEntry>, QueueError> {
        self.0.update_entry(id, expected_status, update).await
    }

    async fn station(&self, id: &StationId) -> Result<Option<Station>, QueueError> {
        self.0.station(id).await
    }

    async fn stations(&self) -> Result<Vec<Station>, QueueError> {
        self.0.stations().await
    }

    async fn update_station_derived(
        &self,
        id: &StationId,
        fields: StationDerived,
    ) -> Result<(), QueueError> {
        self.0.update_station_derived(id, fields).await
    }
}

#[tokio::test]
async fn concurrent_joins_cannot_double_book() {
    let clock = Arc::new(ManualClock::new(T0));
    let inner = Arc::new(InMemoryStore::new(clock.clone()));
    inner.put_station(Station::new("s1".into(), 2).unwrap());
    let service = Arc::new(QueueService::new(
        Arc::new(YieldingStore(inner.clone())),
        Arc::new(RecordingDispatcher::new()),
        clock,
        QueueConfig::default(),
    ));

    // Both calls pass the duplicate check before either insert lands; the
    // store-level uniqueness guard must fail one of them.
    let user = "alice".into();
    let station = "s1".into();
    let (a, b) = tokio::join!(
        service.join(&user, &station),
        service.join(&user, &station),
    );
    assert!(
        a.is_ok() != b.is_ok(),
        "exactly one of two racing joins may win: {a:?} / {b:?}"
    );

    let active = inner
        .entries_for_user(&"alice".into())
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.is_active())
        .count();
    assert_eq!(active, 1);
}

/// Audit sink writing into a shared vector the test can inspect.
struct SharedSink(Arc<Mutex<Vec<QueueEvent>>>);

impl AuditSink for SharedSink {
    fn record(&mut self, event: QueueEvent) {
        self.0.lock().push(event);
    }
}

#[tokio::test]
async fn lifecycle_actions_are_audited() {
    let clock = Arc::new(ManualClock::new(T0));
    let store = Arc::new(InMemoryStore::new(clock.clone()));
    store.put_station(Station::new("s1".into(), 2).unwrap());
    let log = Arc::new(Mutex::new(Vec::new()));
    let service = QueueService::new(
        store.clone(),
        Arc::new(RecordingDispatcher::new()),
        clock,
        QueueConfig::default(),
    )
    .with_audit(Box::new(SharedSink(log.clone())));

    service.join(&"alice".into(), &"s1".into()).await.unwrap();
    assert!(service.reserve_slot(&"alice".into(), &"s1".into(), 15).await);
    assert!(service.start_charging(&"alice".into(), &"s1".into()).await);
    assert!(service.complete_charging(&"alice".into(), &"s1".into()).await);

    let actions: Vec<String> = log.lock().iter().map(|e| e.action.clone()).collect();
    assert_eq!(actions, vec!["join", "reserve", "start_charging", "complete"]);

    // Cancellation records its reason in the detail field.
    service.join(&"bob".into(), &"s1".into()).await.unwrap();
    assert!(
        service
            .leave_queue(&"bob".into(), &"s1".into(), CancelReason::UserCancelled)
            .await
    );
    let last = log.lock().last().cloned().unwrap();
    assert_eq!(last.action, "cancel");
    assert_eq!(last.detail.as_deref(), Some("user_cancelled"));
}

#[tokio::test]
async fn stalled_head_reservation_is_recovered() {
    let h = harness();
    let s = station(&h, "s1", 2);
    let a = h.service.join(&"alice".into(), &s).await.unwrap();
    h.service.join(&"bob".into(), &s).await.unwrap();
    assert!(h.service.reserve_slot(&"alice".into(), &s, 15).await);

    let rebalancer = PositionRebalancer::new(
        h.store.clone(),
        h.notifier.clone(),
        h.clock.clone(),
        QueueConfig::default(),
    );

    // Past expiry but within the grace window: leave it to the expiry monitor.
    h.clock.advance_minutes(18);
    assert!(!rebalancer.recover_stalled_head(&s).await.unwrap());

    // Past expiry plus grace: the rebalancer steps in on its own.
    h.clock.advance_minutes(3);
    assert!(rebalancer.recover_stalled_head(&s).await.unwrap());

    let alice = h.store.entry(&a.entry_id).unwrap();
    assert_eq!(alice.status, EntryStatus::Cancelled);
    assert_eq!(alice.cancel_reason, Some(CancelReason::Expired));

    let entries = h
        .store
        .queue_entries(&s, StatusFilter::NonTerminal)
        .await
        .unwrap();
    assert_eq!(entries[0].user_id.as_str(), "bob");
    assert_eq!(entries[0].position, 1);
    assert_eq!(entries[0].status, EntryStatus::Reserved);
    // Fresh default-length reservation.
    assert_eq!(
        entries[0].reservation_expiry_ms,
        Some(h.clock.now_ms() + 15 * 60_000)
    );

    assert!(h.notifier.events().contains(&NotificationEvent::Promotion {
        user_id: "bob".into(),
        station_id: s.clone(),
        new_position: 1,
    }));
}
