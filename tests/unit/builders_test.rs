//! Tests for engine construction

use std::sync::Arc;

use chargeline::builders::build_engine;
use chargeline::config::EngineConfig;
use chargeline::core::Station;
use chargeline::infra::{InMemorySessions, InMemoryStore, RecordingDispatcher};
use chargeline::util::ManualClock;

fn wired() -> (Arc<InMemoryStore>, chargeline::builders::Engine) {
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let store = Arc::new(InMemoryStore::new(clock.clone()));
    let engine = build_engine(
        &EngineConfig::default(),
        store.clone(),
        Arc::new(RecordingDispatcher::new()),
        Arc::new(InMemorySessions::new()),
        clock,
    )
    .unwrap();
    (store, engine)
}

#[test]
fn test_build_engine_rejects_invalid_config() {
    let clock = Arc::new(ManualClock::new(0));
    let mut cfg = EngineConfig::default();
    cfg.cadence.sessions_secs = 0;
    let result = build_engine(
        &cfg,
        Arc::new(InMemoryStore::new(clock.clone())),
        Arc::new(RecordingDispatcher::new()),
        Arc::new(InMemorySessions::new()),
        clock,
    );
    assert!(result.is_err());
}

#[tokio::test]
async fn test_built_engine_serves_joins() {
    let (store, engine) = wired();
    store.put_station(Station::new("s1".into(), 2).unwrap());
    let receipt = engine
        .service
        .join(&"alice".into(), &"s1".into())
        .await
        .unwrap();
    assert_eq!(receipt.position, 1);
}

#[tokio::test]
async fn test_built_scheduler_carries_the_default_processes() {
    let (_store, engine) = wired();
    engine.scheduler.start();
    let status = engine.scheduler.status();
    assert_eq!(
        status.active_processes,
        vec![
            "cleanup",
            "optimization",
            "notifications",
            "analytics",
            "sessions",
            "availability-alerts",
            "performance",
        ]
    );
    engine.scheduler.stop();
}
