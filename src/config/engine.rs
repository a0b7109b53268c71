//! Engine configuration structures.

use serde::{Deserialize, Serialize};

use crate::core::QueueError;

/// Queue behavior knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Reservation duration granted by stalled-head promotion, in minutes.
    pub default_reservation_minutes: u32,
    /// How long past its deadline a head-of-line reservation may sit before
    /// the rebalancer treats it as stalled, in minutes.
    pub stall_grace_minutes: u32,
    /// Window before the reservation deadline in which a one-shot warning is
    /// sent, in minutes.
    pub reservation_warning_minutes: u32,
    /// Assumed average charging session length used for wait estimates,
    /// in minutes.
    pub avg_session_minutes: u32,
    /// Upper bound on external dispatch/session calls, in seconds.
    pub external_call_timeout_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            default_reservation_minutes: 15,
            stall_grace_minutes: 5,
            reservation_warning_minutes: 5,
            avg_session_minutes: 30,
            external_call_timeout_secs: 10,
        }
    }
}

/// Cadences of the periodic maintenance processes and the ad-hoc task
/// backoff unit, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CadenceConfig {
    /// Expiry monitor ("cleanup") interval.
    pub cleanup_secs: u64,
    /// Rebalancer sweep ("optimization") interval.
    pub optimization_secs: u64,
    /// Notification sweep interval.
    pub notifications_secs: u64,
    /// Derived-field refresh ("analytics") interval.
    pub analytics_secs: u64,
    /// Session monitor interval.
    pub sessions_secs: u64,
    /// Availability alert interval.
    pub availability_alerts_secs: u64,
    /// Performance snapshot interval.
    pub performance_secs: u64,
    /// Base unit of the ad-hoc task exponential backoff.
    pub task_backoff_unit_secs: u64,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            cleanup_secs: 120,
            optimization_secs: 300,
            notifications_secs: 180,
            analytics_secs: 600,
            sessions_secs: 60,
            availability_alerts_secs: 240,
            performance_secs: 900,
            task_backoff_unit_secs: 60,
        }
    }
}

/// Root engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Queue behavior knobs.
    pub queue: QueueConfig,
    /// Periodic process cadences.
    pub cadence: CadenceConfig,
}

impl QueueConfig {
    /// Validate queue configuration values.
    pub fn validate(&self) -> Result<(), QueueError> {
        if self.default_reservation_minutes == 0 {
            return Err(QueueError::Validation(
                "default_reservation_minutes must be greater than 0".into(),
            ));
        }
        if self.avg_session_minutes == 0 {
            return Err(QueueError::Validation(
                "avg_session_minutes must be greater than 0".into(),
            ));
        }
        if self.external_call_timeout_secs == 0 {
            return Err(QueueError::Validation(
                "external_call_timeout_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

impl CadenceConfig {
    /// Validate that every cadence is non-zero.
    pub fn validate(&self) -> Result<(), QueueError> {
        let cadences = [
            ("cleanup_secs", self.cleanup_secs),
            ("optimization_secs", self.optimization_secs),
            ("notifications_secs", self.notifications_secs),
            ("analytics_secs", self.analytics_secs),
            ("sessions_secs", self.sessions_secs),
            ("availability_alerts_secs", self.availability_alerts_secs),
            ("performance_secs", self.performance_secs),
            ("task_backoff_unit_secs", self.task_backoff_unit_secs),
        ];
        for (name, value) in cadences {
            if value == 0 {
                return Err(QueueError::Validation(format!(
                    "{name} must be greater than 0"
                )));
            }
        }
        Ok(())
    }
}

impl EngineConfig {
    /// Validate all sections.
    pub fn validate(&self) -> Result<(), QueueError> {
        self.queue.validate()?;
        self.cadence.validate()
    }

    /// Parse engine configuration from a JSON string and validate. Missing
    /// fields fall back to defaults.
    pub fn from_json_str(input: &str) -> Result<Self, QueueError> {
        let cfg: Self = serde_json::from_str(input)
            .map_err(|e| QueueError::Validation(format!("config parse error: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build configuration from environment variables (after loading `.env`
    /// via dotenvy), falling back to defaults for unset keys.
    ///
    /// Recognized keys: `CHARGELINE_RESERVATION_MINUTES`,
    /// `CHARGELINE_STALL_GRACE_MINUTES`, `CHARGELINE_WARNING_MINUTES`,
    /// `CHARGELINE_AVG_SESSION_MINUTES`, `CHARGELINE_CLEANUP_SECS`,
    /// `CHARGELINE_SESSIONS_SECS`, `CHARGELINE_TASK_BACKOFF_SECS`.
    pub fn from_env() -> Result<Self, QueueError> {
        let _ = dotenvy::dotenv();
        let mut cfg = Self::default();
        if let Some(v) = env_u64("CHARGELINE_RESERVATION_MINUTES")? {
            cfg.queue.default_reservation_minutes = truncate_u32(v);
        }
        if let Some(v) = env_u64("CHARGELINE_STALL_GRACE_MINUTES")? {
            cfg.queue.stall_grace_minutes = truncate_u32(v);
        }
        if let Some(v) = env_u64("CHARGELINE_WARNING_MINUTES")? {
            cfg.queue.reservation_warning_minutes = truncate_u32(v);
        }
        if let Some(v) = env_u64("CHARGELINE_AVG_SESSION_MINUTES")? {
            cfg.queue.avg_session_minutes = truncate_u32(v);
        }
        if let Some(v) = env_u64("CHARGELINE_CLEANUP_SECS")? {
            cfg.cadence.cleanup_secs = v;
        }
        if let Some(v) = env_u64("CHARGELINE_SESSIONS_SECS")? {
            cfg.cadence.sessions_secs = v;
        }
        if let Some(v) = env_u64("CHARGELINE_TASK_BACKOFF_SECS")? {
            cfg.cadence.task_backoff_unit_secs = v;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn truncate_u32(v: u64) -> u32 {
    u32::try_from(v).unwrap_or(u32::MAX)
}

fn env_u64(key: &str) -> Result<Option<u64>, QueueError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<u64>()
            .map(Some)
            .map_err(|e| QueueError::Validation(format!("{key}={raw}: {e}"))),
        Err(_) => Ok(None),
    }
}
