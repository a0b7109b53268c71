//! Session monitor tests: completion at target battery level, charge-rate
//! anomaly detection, and per-session failure isolation.

use std::sync::Arc;
use std::time::Duration;

use chargeline::core::SessionMonitor;
use chargeline::infra::notify::{NotificationEvent, RecordingDispatcher};
use chargeline::infra::sessions::{ChargingSession, InMemorySessions, SessionStatus};

fn session(id: &str, user: &str, target: f64, expected_kw: f64) -> ChargingSession {
    ChargingSession {
        id: id.into(),
        user_id: user.into(),
        station_id: "s1".into(),
        target_battery_level: target,
        expected_rate_kw: expected_kw,
    }
}

fn monitor(
    sessions: &Arc<InMemorySessions>,
    notifier: &Arc<RecordingDispatcher>,
) -> SessionMonitor {
    SessionMonitor::new(
        sessions.clone(),
        notifier.clone(),
        Duration::from_secs(1),
    )
}

#[tokio::test]
async fn session_at_target_battery_is_completed() {
    let sessions = Arc::new(InMemorySessions::new());
    let notifier = Arc::new(RecordingDispatcher::new());
    sessions.upsert(
        session("sess-1", "alice", 80.0, 50.0),
        SessionStatus {
            current_battery_level: 82.5,
            charge_rate_kw: 45.0,
        },
    );

    monitor(&sessions, &notifier).run_sweep().await.unwrap();

    assert_eq!(
        sessions.completed(),
        vec![("alice".into(), "s1".into())]
    );
    assert!(notifier.events().is_empty());
}

#[tokio::test]
async fn low_charge_rate_raises_an_anomaly() {
    let sessions = Arc::new(InMemorySessions::new());
    let notifier = Arc::new(RecordingDispatcher::new());
    // Below half the expected 50 kW.
    sessions.upsert(
        session("sess-1", "alice", 80.0, 50.0),
        SessionStatus {
            current_battery_level: 40.0,
            charge_rate_kw: 20.0,
        },
    );

    monitor(&sessions, &notifier).run_sweep().await.unwrap();

    assert_eq!(
        notifier.events(),
        vec![NotificationEvent::Anomaly {
            user_id: "alice".into(),
            session_id: "sess-1".into(),
        }]
    );
    // The session keeps running; anomalies only notify.
    assert!(sessions.completed().is_empty());
}

#[tokio::test]
async fn healthy_mid_charge_session_is_left_alone() {
    let sessions = Arc::new(InMemorySessions::new());
    let notifier = Arc::new(RecordingDispatcher::new());
    // Exactly half the expected rate is still acceptable.
    sessions.upsert(
        session("sess-1", "alice", 80.0, 50.0),
        SessionStatus {
            current_battery_level: 40.0,
            charge_rate_kw: 25.0,
        },
    );

    monitor(&sessions, &notifier).run_sweep().await.unwrap();

    assert!(notifier.events().is_empty());
    assert!(sessions.completed().is_empty());
}

#[tokio::test]
async fn flaky_session_does_not_block_the_rest_of_the_sweep() {
    let sessions = Arc::new(InMemorySessions::new());
    let notifier = Arc::new(RecordingDispatcher::new());
    sessions.upsert(
        session("sess-1", "alice", 80.0, 50.0),
        SessionStatus {
            current_battery_level: 50.0,
            charge_rate_kw: 48.0,
        },
    );
    sessions.upsert(
        session("sess-2", "bob", 90.0, 50.0),
        SessionStatus {
            current_battery_level: 95.0,
            charge_rate_kw: 10.0,
        },
    );
    sessions.poison(&"sess-1".into());

    // The sweep itself succeeds even though alice's meter is down.
    monitor(&sessions, &notifier).run_sweep().await.unwrap();

    // Bob reached his target and was completed regardless.
    assert_eq!(sessions.completed(), vec![("bob".into(), "s1".into())]);
}
