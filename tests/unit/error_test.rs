//! Tests for error types

use chargeline::core::QueueError;

#[test]
fn test_validation_error() {
    let err = QueueError::Validation("bad id".to_string());
    assert_eq!(format!("{}", err), "validation error: bad id");
}

#[test]
fn test_not_found_error() {
    let err = QueueError::NotFound("station s9".to_string());
    assert_eq!(format!("{}", err), "not found: station s9");
}

#[test]
fn test_conflict_error() {
    let err = QueueError::Conflict("duplicate booking".to_string());
    assert_eq!(format!("{}", err), "conflict: duplicate booking");
}

#[test]
fn test_transient_error() {
    let err = QueueError::Transient("store unavailable".to_string());
    assert_eq!(format!("{}", err), "transient error: store unavailable");
}

#[test]
fn test_permanent_error() {
    let err = QueueError::Permanent("retries exhausted".to_string());
    assert_eq!(format!("{}", err), "permanent error: retries exhausted");
}

#[test]
fn test_only_transient_is_retryable() {
    assert!(QueueError::Transient("x".to_string()).is_retryable());
    assert!(!QueueError::Validation("x".to_string()).is_retryable());
    assert!(!QueueError::NotFound("x".to_string()).is_retryable());
    assert!(!QueueError::Conflict("x".to_string()).is_retryable());
    assert!(!QueueError::Permanent("x".to_string()).is_retryable());
}
