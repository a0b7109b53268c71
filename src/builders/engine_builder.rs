//! Wire an engine from configuration and adapters.

use std::sync::Arc;
use std::time::Duration;

use crate::config::EngineConfig;
use crate::core::{
    AnalyticsSweep, AvailabilityAlerts, ExpiryMonitor, NotificationSweep, PerformanceSnapshot,
    PositionRebalancer, QueueError, QueueService, SessionMonitor,
};
use crate::infra::notify::NotificationDispatcher;
use crate::infra::sessions::SessionInterface;
use crate::infra::store::QueueStore;
use crate::scheduler::{PeriodicProcess, SchedulerCore, TaskQueue};
use crate::util::Clock;

/// A fully wired queue engine: the synchronous service surface plus the
/// background scheduler with the seven default maintenance processes.
pub struct Engine {
    /// Queue and reservation state machine.
    pub service: Arc<QueueService>,
    /// Background scheduler; call `start()` to begin maintenance.
    pub scheduler: SchedulerCore,
}

/// Build an engine from validated configuration and adapter implementations.
pub fn build_engine(
    cfg: &EngineConfig,
    store: Arc<dyn QueueStore>,
    notifier: Arc<dyn NotificationDispatcher>,
    sessions: Arc<dyn SessionInterface>,
    clock: Arc<dyn Clock>,
) -> Result<Engine, QueueError> {
    cfg.validate()?;

    let service = Arc::new(QueueService::new(
        Arc::clone(&store),
        Arc::clone(&notifier),
        Arc::clone(&clock),
        cfg.queue.clone(),
    ));

    let expiry = Arc::new(ExpiryMonitor::new(
        Arc::clone(&service),
        Arc::clone(&store),
        Arc::clone(&notifier),
        Arc::clone(&clock),
    ));
    let rebalancer = Arc::new(PositionRebalancer::new(
        Arc::clone(&store),
        Arc::clone(&notifier),
        Arc::clone(&clock),
        cfg.queue.clone(),
    ));
    let notifications = Arc::new(NotificationSweep::new(
        Arc::clone(&store),
        Arc::clone(&notifier),
        Arc::clone(&clock),
        cfg.queue.clone(),
    ));
    let analytics = Arc::new(AnalyticsSweep::new(Arc::clone(&store)));
    let session_monitor = Arc::new(SessionMonitor::new(
        sessions,
        Arc::clone(&notifier),
        Duration::from_secs(cfg.queue.external_call_timeout_secs),
    ));
    let alerts = Arc::new(AvailabilityAlerts::new(
        Arc::clone(&store),
        Arc::clone(&notifier),
    ));
    let performance = Arc::new(PerformanceSnapshot::new(Arc::clone(&store)));

    let cadence = &cfg.cadence;
    let processes = vec![
        PeriodicProcess::new(
            "cleanup",
            Duration::from_secs(cadence.cleanup_secs),
            expiry,
        ),
        PeriodicProcess::new(
            "optimization",
            Duration::from_secs(cadence.optimization_secs),
            rebalancer,
        ),
        PeriodicProcess::new(
            "notifications",
            Duration::from_secs(cadence.notifications_secs),
            notifications,
        ),
        PeriodicProcess::new(
            "analytics",
            Duration::from_secs(cadence.analytics_secs),
            analytics,
        ),
        PeriodicProcess::new(
            "sessions",
            Duration::from_secs(cadence.sessions_secs),
            session_monitor,
        ),
        PeriodicProcess::new(
            "availability-alerts",
            Duration::from_secs(cadence.availability_alerts_secs),
            alerts,
        ),
        PeriodicProcess::new(
            "performance",
            Duration::from_secs(cadence.performance_secs),
            performance,
        ),
    ];

    let tasks = Arc::new(TaskQueue::new(
        Duration::from_secs(cadence.task_backoff_unit_secs),
        Arc::clone(&clock),
    ));
    let scheduler = SchedulerCore::new(processes, tasks, clock);

    Ok(Engine { service, scheduler })
}
