//! Configuration models for the queue engine and scheduler cadences.

pub mod engine;

pub use engine::{CadenceConfig, EngineConfig, QueueConfig};
