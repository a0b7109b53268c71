//! Charging session boundary.
//!
//! The engine only consumes this interface; the telemetry simulator behind
//! it is external. `InMemorySessions` is a minimal stand-in for development
//! and testing, including fault injection so per-session failure isolation
//! can be exercised.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::QueueError;
use crate::util::{SessionId, StationId, UserId};

/// An active charging session as reported by the session backend.
#[derive(Debug, Clone)]
pub struct ChargingSession {
    /// Session identifier.
    pub id: SessionId,
    /// Charging user.
    pub user_id: UserId,
    /// Station hosting the session.
    pub station_id: StationId,
    /// Battery percentage at which the session should complete.
    pub target_battery_level: f64,
    /// Expected charge rate in kW for this connector/vehicle pairing.
    pub expected_rate_kw: f64,
}

/// Live telemetry for a session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionStatus {
    /// Current battery percentage.
    pub current_battery_level: f64,
    /// Measured charge rate in kW.
    pub charge_rate_kw: f64,
}

/// Read/command interface of the external charging session system.
#[async_trait]
pub trait SessionInterface: Send + Sync {
    /// Every currently active session.
    async fn active_sessions(&self) -> Result<Vec<ChargingSession>, QueueError>;

    /// Live status for one session, or `None` if it already ended.
    async fn session_status(&self, id: &SessionId) -> Result<Option<SessionStatus>, QueueError>;

    /// Ask the backend to finish a session. Returns whether it accepted.
    async fn complete_session(
        &self,
        user_id: &UserId,
        station_id: &StationId,
    ) -> Result<bool, QueueError>;
}

/// In-memory session backend for development and testing.
#[derive(Default)]
pub struct InMemorySessions {
    sessions: Mutex<HashMap<SessionId, (ChargingSession, SessionStatus)>>,
    poisoned: Mutex<HashSet<SessionId>>,
    completed: Mutex<Vec<(UserId, StationId)>>,
}

impl InMemorySessions {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a session with its current telemetry.
    pub fn upsert(&self, session: ChargingSession, status: SessionStatus) {
        self.sessions
            .lock()
            .insert(session.id.clone(), (session, status));
    }

    /// Make status reads for a session fail, simulating a flaky meter.
    pub fn poison(&self, id: &SessionId) {
        self.poisoned.lock().insert(id.clone());
    }

    /// Sessions completed via [`SessionInterface::complete_session`].
    pub fn completed(&self) -> Vec<(UserId, StationId)> {
        self.completed.lock().clone()
    }
}

#[async_trait]
impl SessionInterface for InMemorySessions {
    async fn active_sessions(&self) -> Result<Vec<ChargingSession>, QueueError> {
        let mut all: Vec<ChargingSession> = self
            .sessions
            .lock()
            .values()
            .map(|(s, _)| s.clone())
            .collect();
        all.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        Ok(all)
    }

    async fn session_status(&self, id: &SessionId) -> Result<Option<SessionStatus>, QueueError> {
        if self.poisoned.lock().contains(id) {
            return Err(QueueError::Transient(format!(
                "session {id}: telemetry unavailable"
            )));
        }
        Ok(self.sessions.lock().get(id).map(|(_, status)| *status))
    }

    async fn complete_session(
        &self,
        user_id: &UserId,
        station_id: &StationId,
    ) -> Result<bool, QueueError> {
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, (s, _)| !(&s.user_id == user_id && &s.station_id == station_id));
        let removed = sessions.len() < before;
        drop(sessions);
        if removed {
            self.completed
                .lock()
                .push((user_id.clone(), station_id.clone()));
        }
        Ok(removed)
    }
}
