//! Ad-hoc one-off tasks with exponential-backoff retry.
//!
//! A scheduled task fires once at its target time. On handler failure it is
//! retried at `now + 2^retries * backoff_unit` until `max_retries` is
//! exhausted, at which point it is dropped permanently with a fatal log
//! record; nothing is resurfaced to the caller. Tasks are ephemeral and do
//! not survive process restarts.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::core::QueueError;
use crate::util::{Clock, TaskId};

/// A one-off, time-targeted job.
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    /// Task identifier.
    pub id: TaskId,
    /// Task kind; selects the registered handler.
    pub kind: String,
    /// Target firing time, milliseconds since epoch.
    pub scheduled_at_ms: u128,
    /// Retries consumed so far.
    pub retries: u32,
    /// Retry budget.
    pub max_retries: u32,
}

/// Handler executing one kind of ad-hoc task.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Execute the task once. An error triggers a backoff retry.
    async fn run(&self, task: &ScheduledTask) -> Result<(), QueueError>;
}

/// Registry and runner for ad-hoc tasks.
pub struct TaskQueue {
    handlers: RwLock<HashMap<String, Arc<dyn TaskHandler>>>,
    live: Arc<Mutex<HashMap<TaskId, JoinHandle<()>>>>,
    backoff_unit: Duration,
    clock: Arc<dyn Clock>,
}

impl TaskQueue {
    /// Create a task queue with the given backoff unit (one minute in
    /// production; shrink it in tests).
    pub fn new(backoff_unit: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            live: Arc::new(Mutex::new(HashMap::new())),
            backoff_unit,
            clock,
        }
    }

    /// Register the handler for a task kind, replacing any previous one.
    pub fn register_handler(&self, kind: impl Into<String>, handler: Arc<dyn TaskHandler>) {
        self.handlers.write().insert(kind.into(), handler);
    }

    /// Schedule a one-shot task. Fire-and-forget: the returned id is only
    /// useful for log correlation.
    pub fn schedule(
        &self,
        kind: impl Into<String>,
        scheduled_at_ms: u128,
        max_retries: u32,
    ) -> TaskId {
        let kind = kind.into();
        let id = TaskId::random();
        let mut task = ScheduledTask {
            id,
            kind: kind.clone(),
            scheduled_at_ms,
            retries: 0,
            max_retries,
        };
        let handler = self.handlers.read().get(&kind).cloned();
        let live = Arc::clone(&self.live);
        let clock = Arc::clone(&self.clock);
        let backoff_unit = self.backoff_unit;

        let mut handles = self.live.lock();
        let handle = tokio::spawn(async move {
            let initial_delay = scheduled_at_ms.saturating_sub(clock.now_ms());
            tokio::time::sleep(Duration::from_millis(
                u64::try_from(initial_delay).unwrap_or(u64::MAX),
            ))
            .await;

            match handler {
                Some(handler) => run_with_backoff(&*handler, &mut task, backoff_unit).await,
                None => {
                    tracing::error!(task = %id, kind = %task.kind, "no handler registered for task kind, dropping");
                }
            }
            live.lock().remove(&id);
        });
        handles.insert(id, handle);
        drop(handles);

        tracing::debug!(task = %id, %kind, scheduled_at_ms, max_retries, "task scheduled");
        id
    }

    /// Number of tasks still pending or running.
    pub fn count(&self) -> usize {
        let mut live = self.live.lock();
        live.retain(|_, handle| !handle.is_finished());
        live.len()
    }

    /// Abort every pending task timer. In-flight handler invocations are not
    /// interrupted mid-write by the runtime guarantees the engine relies on;
    /// only the timers are cleared.
    pub fn abort_all(&self) {
        let mut live = self.live.lock();
        for (id, handle) in live.drain() {
            handle.abort();
            tracing::debug!(task = %id, "task aborted");
        }
    }
}

async fn run_with_backoff(handler: &dyn TaskHandler, task: &mut ScheduledTask, unit: Duration) {
    loop {
        match handler.run(task).await {
            Ok(()) => {
                tracing::debug!(task = %task.id, kind = %task.kind, retries = task.retries, "task completed");
                return;
            }
            Err(e) => {
                task.retries += 1;
                if task.retries > task.max_retries {
                    tracing::error!(
                        task = %task.id,
                        kind = %task.kind,
                        max_retries = task.max_retries,
                        error = %e,
                        "task dropped permanently after exhausting retries"
                    );
                    return;
                }
                let backoff = unit.saturating_mul(1u32 << task.retries.min(20));
                tracing::warn!(
                    task = %task.id,
                    kind = %task.kind,
                    retry = task.retries,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "task failed, backing off"
                );
                tokio::time::sleep(backoff).await;
            }
        }
    }
}
