//! Session monitor: the "sessions" periodic process.
//!
//! Polls active charging sessions, completes those that reached their target
//! battery level, and raises an anomaly notification when the live charge
//! rate drops below half the expected rate. One failing session never blocks
//! the rest of the sweep, and every external call is time-bounded.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::QueueError;
use crate::infra::notify::{dispatch, NotificationDispatcher};
use crate::infra::sessions::{ChargingSession, SessionInterface};
use crate::scheduler::ProcessHandler;

/// Fraction of the expected charge rate below which a session is anomalous.
const ANOMALY_RATE_FRACTION: f64 = 0.5;

/// Watches active sessions for completion and anomaly conditions.
pub struct SessionMonitor {
    sessions: Arc<dyn SessionInterface>,
    notifier: Arc<dyn NotificationDispatcher>,
    call_timeout: Duration,
}

impl SessionMonitor {
    /// Create a monitor over the external session interface.
    pub fn new(
        sessions: Arc<dyn SessionInterface>,
        notifier: Arc<dyn NotificationDispatcher>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            sessions,
            notifier,
            call_timeout,
        }
    }

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = Result<T, QueueError>>,
    ) -> Result<T, QueueError> {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(QueueError::Transient(format!(
                "session call exceeded {:?}",
                self.call_timeout
            ))),
        }
    }

    async fn check_session(&self, session: &ChargingSession) -> Result<(), QueueError> {
        let status = self
            .bounded(self.sessions.session_status(&session.id))
            .await?;
        let Some(status) = status else {
            tracing::debug!(session = %session.id, "session already ended");
            return Ok(());
        };

        if status.current_battery_level >= session.target_battery_level {
            let accepted = self
                .bounded(
                    self.sessions
                        .complete_session(&session.user_id, &session.station_id),
                )
                .await?;
            tracing::info!(
                session = %session.id,
                user = %session.user_id,
                battery = status.current_battery_level,
                accepted,
                "session reached target battery level"
            );
            return Ok(());
        }

        if status.charge_rate_kw < session.expected_rate_kw * ANOMALY_RATE_FRACTION {
            tracing::warn!(
                session = %session.id,
                user = %session.user_id,
                rate_kw = status.charge_rate_kw,
                expected_kw = session.expected_rate_kw,
                "charge rate below anomaly threshold"
            );
            dispatch(
                "anomaly",
                self.notifier
                    .notify_anomaly(&session.user_id, &session.id, &status),
            )
            .await;
        }
        Ok(())
    }

    /// Run one monitoring pass over every active session.
    pub async fn run_sweep(&self) -> Result<(), QueueError> {
        let active = self.bounded(self.sessions.active_sessions()).await?;
        let mut failures = 0;
        for session in &active {
            if let Err(e) = self.check_session(session).await {
                failures += 1;
                tracing::warn!(session = %session.id, error = %e, "session check failed");
            }
        }
        tracing::debug!(
            checked = active.len(),
            failures,
            "session sweep complete"
        );
        Ok(())
    }
}

#[async_trait]
impl ProcessHandler for SessionMonitor {
    async fn run(&self) -> Result<(), QueueError> {
        self.run_sweep().await
    }
}
