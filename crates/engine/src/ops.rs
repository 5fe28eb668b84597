// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operational surface: read-only status and manual recovery actions

use crate::queue::JobQueue;
use crate::sweep::{FailedDeliverySweep, SweepReport};
use cadence_adapters::{EnrollmentStore, InteractionStore};
use cadence_core::{Clock, InteractionLog, JobId, QueueStats, QueuedJob, Result, TaskScheduler};
use cadence_resilience::{CircuitState, HealthRegistry, SystemHealth};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Point-in-time status for a health endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpsReport {
    pub generated_at: DateTime<Utc>,
    pub queue: QueueStats,
    pub circuits: BTreeMap<String, CircuitState>,
    pub health: SystemHealth,
    pub failed_jobs: Vec<QueuedJob>,
    /// Waiting and delayed jobs, in run order
    pub pending_jobs: Vec<QueuedJob>,
}

pub struct Ops<E, L, C: Clock, S: TaskScheduler> {
    queue: JobQueue<C>,
    health: HealthRegistry<C, S>,
    sweep: FailedDeliverySweep<E, L, C>,
    clock: C,
}

impl<E: Clone, L: Clone, C: Clock, S: TaskScheduler> Clone for Ops<E, L, C, S> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            health: self.health.clone(),
            sweep: self.sweep.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl<E, L, C, S> Ops<E, L, C, S>
where
    E: EnrollmentStore,
    L: InteractionStore,
    C: Clock,
    S: TaskScheduler,
{
    pub fn new(
        queue: JobQueue<C>,
        health: HealthRegistry<C, S>,
        sweep: FailedDeliverySweep<E, L, C>,
        clock: C,
    ) -> Self {
        Self {
            queue,
            health,
            sweep,
            clock,
        }
    }

    pub fn snapshot(&self) -> OpsReport {
        OpsReport {
            generated_at: self.clock.utc_now(),
            queue: self.queue.stats(),
            circuits: self.health.breakers().states(),
            health: self.health.system_health(),
            failed_jobs: self.queue.list_failed(),
            pending_jobs: self.queue.list_pending(),
        }
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    pub fn circuit_states(&self) -> BTreeMap<String, CircuitState> {
        self.health.breakers().states()
    }

    pub fn system_health(&self) -> SystemHealth {
        self.health.system_health()
    }

    pub fn failed_jobs(&self) -> Vec<QueuedJob> {
        self.queue.list_failed()
    }

    pub fn pending_jobs(&self) -> Vec<QueuedJob> {
        self.queue.list_pending()
    }

    /// Failed interaction logs within the sweep's lookback window
    pub async fn failed_deliveries(&self) -> Result<Vec<InteractionLog>> {
        self.sweep.failed_deliveries().await
    }

    /// Close a breaker and zero its counters
    pub fn reset_circuit(&self, name: &str) -> Result<()> {
        self.health.breakers().reset(name)?;
        tracing::info!(dependency = %name, "circuit reset by operator");
        Ok(())
    }

    /// Hold a breaker open until it is reset
    pub fn force_open(&self, name: &str) {
        self.health.breakers().force_open(name);
        tracing::warn!(dependency = %name, "circuit forced open by operator");
    }

    /// Requeue every failed job with a fresh attempt budget
    pub fn retry_failed_jobs(&self) -> Vec<JobId> {
        let retried = self.queue.retry_failed();
        tracing::info!(retried = retried.len(), "failed jobs requeued by operator");
        retried
    }

    /// Run the failed-delivery sweep now
    pub async fn retry_failed_deliveries(&self) -> Result<SweepReport> {
        self.sweep.run().await
    }
}

#[cfg(test)]
#[path = "ops_tests.rs"]
mod tests;
