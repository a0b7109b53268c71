//! # Chargeline
//!
//! A per-station queue and reservation engine for shared charging slots.
//!
//! Users join a station's waiting line, advance in strict FIFO order, and —
//! once a slot frees — receive a time-boxed reservation they either consume
//! or lose to the next person in line. The hard part is keeping queue
//! ordering and the reservation lifecycle globally consistent while
//! expirations, cancellations, and promotions race each other continuously.
//!
//! ## How consistency is achieved
//!
//! There is no central lock. Correctness rests on two disciplines:
//!
//! - **Narrow conditional writes**: every entry transition is a single-row
//!   compare-on-status update ([`infra::QueueStore::update_entry`]) that
//!   fails instead of overwriting when another path got there first.
//! - **Idempotent convergence**: a set of independent periodic processes
//!   (expiry cleanup, position rebalancing, session monitoring, analytics)
//!   re-derives the invariants from authoritative rows, so re-running any
//!   sweep — including overlapping runs of the same sweep — is always safe.
//!
//! ## Components
//!
//! - [`core::QueueService`] — join / reserve / leave / start / complete.
//! - [`core::ExpiryMonitor`] — cancels lapsed reservations ("cleanup").
//! - [`core::PositionRebalancer`] — restores contiguous `1..=N` positions
//!   and recovers stalled head-of-line reservations ("optimization").
//! - [`core::SessionMonitor`] — completes sessions at target battery level
//!   and flags charge-rate anomalies ("sessions").
//! - [`scheduler::SchedulerCore`] — owns the seven named periodic processes
//!   with per-process failure isolation, plus ad-hoc one-off tasks with
//!   exponential-backoff retry ([`scheduler::TaskQueue`]).
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use chargeline::builders::build_engine;
//! use chargeline::config::EngineConfig;
//! use chargeline::infra::{InMemorySessions, InMemoryStore, LogDispatcher};
//! use chargeline::util::SystemClock;
//!
//! let clock = Arc::new(SystemClock);
//! let store = Arc::new(InMemoryStore::new(clock.clone()));
//! let engine = build_engine(
//!     &EngineConfig::default(),
//!     store,
//!     Arc::new(LogDispatcher),
//!     Arc::new(InMemorySessions::new()),
//!     clock,
//! )?;
//!
//! engine.scheduler.start();
//! let receipt = engine.service.join(&"user-1".into(), &"station-7".into()).await?;
//! ```

#![deny(warnings)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core queue state machine and maintenance sweeps.
pub mod core;
/// Configuration models for the engine and scheduler cadences.
pub mod config;
/// Builders to construct engine components from configuration.
pub mod builders;
/// Infrastructure adapters for the store, notifications, and sessions.
pub mod infra;
/// Periodic process scheduling and ad-hoc task execution.
pub mod scheduler;
/// Shared utilities: clock, identifiers, telemetry.
pub mod util;
