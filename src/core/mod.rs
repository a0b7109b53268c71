//! Core queue state machine and maintenance sweeps.

pub mod analytics;
pub mod audit;
pub mod entry;
pub mod error;
pub mod expiry;
pub mod notifications;
pub mod queue_service;
pub mod rebalance;
pub mod session_monitor;

pub use analytics::{AnalyticsSweep, PerformanceSnapshot};
pub use audit::{build_queue_event, AuditSink, InMemoryAuditSink, QueueEvent};
pub use entry::{CancelReason, EntryStatus, QueueEntry, Station};
pub use error::{AppResult, QueueError};
pub use expiry::ExpiryMonitor;
pub use notifications::{AvailabilityAlerts, NotificationSweep};
pub use queue_service::{JoinReceipt, QueueService};
pub use rebalance::{positions_are_contiguous, PositionRebalancer};
pub use session_monitor::SessionMonitor;
