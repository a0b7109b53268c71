//! Scheduler core: owns the periodic processes and the ad-hoc task queue.
//!
//! All process timers start together and stop together. Each tick spawns
//! its handler and logs any error at the process boundary; one process's
//! failure (or panic) never halts a sibling's timer. Stopping clears every
//! timer, periodic and ad-hoc alike, but lets in-flight runs finish.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::scheduler::process::PeriodicProcess;
use crate::scheduler::tasks::TaskQueue;
use crate::util::{Clock, TaskId};

/// Snapshot of the scheduler's state.
#[derive(Debug, Clone)]
pub struct SchedulerStatus {
    /// Whether the scheduler is running.
    pub is_running: bool,
    /// Milliseconds since `start`, zero when stopped.
    pub uptime_ms: u128,
    /// Names of the running periodic processes.
    pub active_processes: Vec<String>,
    /// Ad-hoc tasks still pending or running.
    pub scheduled_task_count: usize,
}

/// Owns the periodic maintenance processes and ad-hoc tasks.
pub struct SchedulerCore {
    processes: Vec<PeriodicProcess>,
    tasks: Arc<TaskQueue>,
    clock: Arc<dyn Clock>,
    running: Arc<AtomicBool>,
    started_at_ms: Mutex<Option<u128>>,
    tickers: Mutex<Vec<JoinHandle<()>>>,
}

impl SchedulerCore {
    /// Create a scheduler owning the given processes and task queue.
    pub fn new(processes: Vec<PeriodicProcess>, tasks: Arc<TaskQueue>, clock: Arc<dyn Clock>) -> Self {
        Self {
            processes,
            tasks,
            clock,
            running: Arc::new(AtomicBool::new(false)),
            started_at_ms: Mutex::new(None),
            tickers: Mutex::new(Vec::new()),
        }
    }

    /// Start every periodic process. Idempotent; a second call is a no-op.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::AcqRel) {
            tracing::warn!("scheduler already running");
            return;
        }
        *self.started_at_ms.lock() = Some(self.clock.now_ms());
        let mut tickers = self.tickers.lock();
        for process in &self.processes {
            let name = process.name.clone();
            let handler = Arc::clone(&process.handler);
            let interval = process.interval;
            let running = Arc::clone(&self.running);
            tickers.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                // The first tick completes immediately; consume it so the
                // first run happens one full interval after start.
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    if !running.load(Ordering::Acquire) {
                        break;
                    }
                    let handler = Arc::clone(&handler);
                    let name = name.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handler.run().await {
                            tracing::error!(process = %name, error = %e, "periodic process run failed");
                        }
                    });
                }
            }));
        }
        tracing::info!(processes = self.processes.len(), "scheduler started");
    }

    /// Stop every timer, periodic and ad-hoc. Idempotent. In-flight runs
    /// complete; no further ticks fire.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        for ticker in self.tickers.lock().drain(..) {
            ticker.abort();
        }
        self.tasks.abort_all();
        *self.started_at_ms.lock() = None;
        tracing::info!("scheduler stopped");
    }

    /// Current scheduler status.
    pub fn status(&self) -> SchedulerStatus {
        let is_running = self.running.load(Ordering::Acquire);
        let started_at = *self.started_at_ms.lock();
        let uptime_ms = if is_running {
            started_at
                .map(|started| self.clock.now_ms().saturating_sub(started))
                .unwrap_or(0)
        } else {
            0
        };
        let active_processes = if is_running {
            self.processes.iter().map(|p| p.name.clone()).collect()
        } else {
            Vec::new()
        };
        SchedulerStatus {
            is_running,
            uptime_ms,
            active_processes,
            scheduled_task_count: self.tasks.count(),
        }
    }

    /// Schedule a one-off task through the owned task queue.
    pub fn schedule_task(
        &self,
        kind: impl Into<String>,
        scheduled_at_ms: u128,
        max_retries: u32,
    ) -> TaskId {
        self.tasks.schedule(kind, scheduled_at_ms, max_retries)
    }

    /// Access the ad-hoc task queue, e.g. to register handlers.
    pub fn tasks(&self) -> &Arc<TaskQueue> {
        &self.tasks
    }

    /// Liveness probe: true while the scheduler is running.
    pub fn health_check(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Drop for SchedulerCore {
    fn drop(&mut self) {
        self.stop();
    }
}
