//! Periodic process scheduling and ad-hoc task execution.

pub mod core;
pub mod process;
pub mod tasks;

pub use self::core::{SchedulerCore, SchedulerStatus};
pub use process::{PeriodicProcess, ProcessHandler};
pub use tasks::{ScheduledTask, TaskHandler, TaskQueue};
