//! Periodic process abstraction.
//!
//! One named maintenance job with its own cadence. The scheduler catches
//! every handler error at the process boundary, so a failing handler never
//! stops its own timer or a sibling's. Ticks spawn the handler rather than
//! awaiting it inline: a run that outlives its interval overlaps the next
//! one, and handlers are required to be idempotent under that interleaving.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::QueueError;

/// Handler invoked on every tick of a periodic process.
#[async_trait]
pub trait ProcessHandler: Send + Sync {
    /// Perform one run of the process.
    async fn run(&self) -> Result<(), QueueError>;
}

/// A named periodic maintenance job.
pub struct PeriodicProcess {
    /// Process name, used in logs and status reporting.
    pub name: String,
    /// Tick cadence.
    pub interval: Duration,
    /// Work performed on each tick.
    pub handler: Arc<dyn ProcessHandler>,
}

impl PeriodicProcess {
    /// Create a process from its parts.
    pub fn new(
        name: impl Into<String>,
        interval: Duration,
        handler: Arc<dyn ProcessHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            interval,
            handler,
        }
    }
}
