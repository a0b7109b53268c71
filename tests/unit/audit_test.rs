//! Tests for the audit sink

use chargeline::core::{build_queue_event, AuditSink, InMemoryAuditSink};
use chargeline::util::EntryId;

#[test]
fn test_build_queue_event_stamps_fields() {
    let event = build_queue_event(
        EntryId::random(),
        "alice".into(),
        "s1".into(),
        "cancel",
        Some("expired".to_string()),
    );
    assert_eq!(event.action, "cancel");
    assert_eq!(event.detail.as_deref(), Some("expired"));
    assert_eq!(event.user_id.as_str(), "alice");
    assert!(event.created_at_ms > 0);
}

#[test]
fn test_in_memory_sink_records_in_order() {
    let mut sink = InMemoryAuditSink::new(10);
    for action in ["join", "reserve", "start_charging"] {
        sink.record(build_queue_event(
            EntryId::random(),
            "alice".into(),
            "s1".into(),
            action,
            None,
        ));
    }
    let events = sink.events();
    assert_eq!(events.len(), 3);
    let actions: Vec<&str> = events.iter().map(|e| e.action.as_str()).collect();
    assert_eq!(actions, vec!["join", "reserve", "start_charging"]);
}

#[test]
fn test_bounded_sink_evicts_oldest() {
    let mut sink = InMemoryAuditSink::new(2);
    for action in ["a", "b", "c"] {
        sink.record(build_queue_event(
            EntryId::random(),
            "alice".into(),
            "s1".into(),
            action,
            None,
        ));
    }
    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].action, "b");
    assert_eq!(events[1].action, "c");
}
