//! Analytics and performance sweeps.
//!
//! The analytics sweep refreshes derived station fields: the cached queue
//! length and the free-slot count reconciled from the number of charging
//! entries. Both are recomputed from authoritative rows, so re-running the
//! sweep is always safe.

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{EntryStatus, QueueError};
use crate::infra::store::{QueueStore, StationDerived, StatusFilter};
use crate::scheduler::ProcessHandler;

/// Refreshes derived station caches.
pub struct AnalyticsSweep {
    store: Arc<dyn QueueStore>,
}

impl AnalyticsSweep {
    /// Create the sweep.
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self { store }
    }

    /// Recompute derived fields for every station, isolating per-station
    /// failures.
    pub async fn run_sweep(&self) -> Result<(), QueueError> {
        for station in self.store.stations().await? {
            if let Err(e) = self.refresh_station(&station.id, station.total_slots).await {
                tracing::warn!(station = %station.id, error = %e, "analytics refresh failed for station");
            }
        }
        Ok(())
    }

    async fn refresh_station(
        &self,
        station_id: &crate::util::StationId,
        total_slots: u32,
    ) -> Result<(), QueueError> {
        let line = self
            .store
            .queue_entries(station_id, StatusFilter::NonTerminal)
            .await?;
        let charging = line
            .iter()
            .filter(|e| e.status == EntryStatus::Charging)
            .count();
        let queued = line.len() - charging;
        let fields = StationDerived {
            available_slots: Some(total_slots.saturating_sub(truncate_u32(charging))),
            current_queue_length: Some(truncate_u32(queued)),
        };
        self.store.update_station_derived(station_id, fields).await
    }
}

fn truncate_u32(v: usize) -> u32 {
    u32::try_from(v).unwrap_or(u32::MAX)
}

#[async_trait]
impl ProcessHandler for AnalyticsSweep {
    async fn run(&self) -> Result<(), QueueError> {
        self.run_sweep().await
    }
}

/// Logs an engine-wide utilization snapshot.
pub struct PerformanceSnapshot {
    store: Arc<dyn QueueStore>,
}

impl PerformanceSnapshot {
    /// Create the snapshot process.
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self { store }
    }

    /// Log aggregate counts across all stations.
    pub async fn run_sweep(&self) -> Result<(), QueueError> {
        let stations = self.store.stations().await?;
        let mut waiting = 0usize;
        let mut reserved = 0usize;
        let mut charging = 0usize;
        for station in &stations {
            let line = self
                .store
                .queue_entries(&station.id, StatusFilter::NonTerminal)
                .await?;
            for entry in &line {
                match entry.status {
                    EntryStatus::Waiting => waiting += 1,
                    EntryStatus::Reserved => reserved += 1,
                    EntryStatus::Charging => charging += 1,
                    _ => {}
                }
            }
        }
        tracing::info!(
            stations = stations.len(),
            waiting,
            reserved,
            charging,
            "engine performance snapshot"
        );
        Ok(())
    }
}

#[async_trait]
impl ProcessHandler for PerformanceSnapshot {
    async fn run(&self) -> Result<(), QueueError> {
        self.run_sweep().await
    }
}
