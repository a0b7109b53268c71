//! Tests for utility types

use std::sync::Arc;
use std::time::Duration;

use chargeline::util::{minutes_to_ms, Clock, EntryId, ManualClock, StationId, TaskId, UserId};

#[test]
fn test_string_id_validity() {
    assert!(UserId::new("user-1").is_valid());
    assert!(!UserId::new("").is_valid());
    assert!(!StationId::new("   ").is_valid());
    assert!(!UserId::new("x".repeat(129)).is_valid());
    assert!(UserId::new("x".repeat(128)).is_valid());
}

#[test]
fn test_string_id_display_and_from() {
    let id: StationId = "station-7".into();
    assert_eq!(id.to_string(), "station-7");
    assert_eq!(id.as_str(), "station-7");
}

#[test]
fn test_uuid_ids_are_unique() {
    assert_ne!(EntryId::random(), EntryId::random());
    assert_ne!(TaskId::random(), TaskId::random());
}

#[test]
fn test_minutes_to_ms() {
    assert_eq!(minutes_to_ms(0), 0);
    assert_eq!(minutes_to_ms(1), 60_000);
    assert_eq!(minutes_to_ms(15), 900_000);
}

#[test]
fn test_manual_clock_is_shared() {
    let clock = Arc::new(ManualClock::new(5_000));
    let other = Arc::clone(&clock);
    clock.advance(Duration::from_millis(250));
    assert_eq!(other.now_ms(), 5_250);
    other.set_ms(1_000);
    assert_eq!(clock.now_ms(), 1_000);
}
