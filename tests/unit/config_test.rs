//! Tests for configuration validation

use chargeline::config::{CadenceConfig, EngineConfig, QueueConfig};

#[test]
fn test_default_config_is_valid() {
    assert!(EngineConfig::default().validate().is_ok());
}

#[test]
fn test_default_cadences() {
    let cadence = CadenceConfig::default();
    assert_eq!(cadence.cleanup_secs, 120);
    assert_eq!(cadence.optimization_secs, 300);
    assert_eq!(cadence.notifications_secs, 180);
    assert_eq!(cadence.analytics_secs, 600);
    assert_eq!(cadence.sessions_secs, 60);
    assert_eq!(cadence.availability_alerts_secs, 240);
    assert_eq!(cadence.performance_secs, 900);
    assert_eq!(cadence.task_backoff_unit_secs, 60);
}

#[test]
fn test_queue_config_rejects_zero_reservation() {
    let cfg = QueueConfig {
        default_reservation_minutes: 0,
        ..QueueConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_queue_config_rejects_zero_session_average() {
    let cfg = QueueConfig {
        avg_session_minutes: 0,
        ..QueueConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_cadence_config_rejects_zero_interval() {
    let cfg = CadenceConfig {
        cleanup_secs: 0,
        ..CadenceConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_json_roundtrip() {
    let cfg = EngineConfig::default();
    let json = serde_json::to_string(&cfg).unwrap();
    let parsed = EngineConfig::from_json_str(&json).unwrap();
    assert_eq!(parsed.queue.avg_session_minutes, cfg.queue.avg_session_minutes);
    assert_eq!(parsed.cadence.cleanup_secs, cfg.cadence.cleanup_secs);
}

#[test]
fn test_env_overrides() {
    std::env::set_var("CHARGELINE_AVG_SESSION_MINUTES", "42");
    std::env::set_var("CHARGELINE_CLEANUP_SECS", "30");
    let cfg = EngineConfig::from_env().unwrap();
    assert_eq!(cfg.queue.avg_session_minutes, 42);
    assert_eq!(cfg.cadence.cleanup_secs, 30);

    std::env::set_var("CHARGELINE_CLEANUP_SECS", "not-a-number");
    assert!(EngineConfig::from_env().is_err());
    std::env::remove_var("CHARGELINE_AVG_SESSION_MINUTES");
    std::env::remove_var("CHARGELINE_CLEANUP_SECS");
}
