// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Failed-delivery sweep
//!
//! Looks back over `failed` interaction logs and re-submits the step when
//! its most recent delivery failed, the enrollment is still active, and
//! the step has not used up its resubmissions. Each failed log is
//! resubmitted at most once; the queue's dedup key `resubmit:<log id>`
//! records that it was.

use crate::queue::JobQueue;
use cadence_adapters::{EnrollmentStore, InteractionStore};
use cadence_core::{
    Clock, DeliveryJob, EnrollmentId, InteractionLog, InteractionStatus, JobId,
    Result, StepId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// How far back failed logs are considered
    #[serde(with = "humantime_serde")]
    pub lookback: Duration,
    /// Resubmissions allowed per step of an enrollment
    pub max_resubmits: u32,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            lookback: Duration::from_secs(24 * 60 * 60),
            max_resubmits: 3,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Distinct enrollment steps with a failed log in the window
    pub examined: usize,
    pub resubmitted: Vec<JobId>,
    pub skipped: usize,
}

fn resubmit_key(log: &InteractionLog) -> String {
    format!("resubmit:{}", log.id)
}

pub struct FailedDeliverySweep<E, L, C: Clock> {
    enrollments: E,
    logs: L,
    queue: JobQueue<C>,
    clock: C,
    config: SweepConfig,
}

impl<E: Clone, L: Clone, C: Clock> Clone for FailedDeliverySweep<E, L, C> {
    fn clone(&self) -> Self {
        Self {
            enrollments: self.enrollments.clone(),
            logs: self.logs.clone(),
            queue: self.queue.clone(),
            clock: self.clock.clone(),
            config: self.config.clone(),
        }
    }
}

impl<E, L, C> FailedDeliverySweep<E, L, C>
where
    E: EnrollmentStore,
    L: InteractionStore,
    C: Clock,
{
    pub fn new(enrollments: E, logs: L, queue: JobQueue<C>, clock: C, config: SweepConfig) -> Self {
        Self {
            enrollments,
            logs,
            queue,
            clock,
            config,
        }
    }

    /// List failed deliveries within the lookback window, oldest first
    pub async fn failed_deliveries(&self) -> Result<Vec<InteractionLog>> {
        let now = self.clock.utc_now();
        let since = chrono::Duration::from_std(self.config.lookback)
            .ok()
            .and_then(|d| now.checked_sub_signed(d))
            .unwrap_or(chrono::DateTime::<chrono::Utc>::MIN_UTC);
        self.logs
            .logs_with_status(InteractionStatus::Failed, since)
            .await
    }

    pub async fn run(&self) -> Result<SweepReport> {
        let failed = self.failed_deliveries().await?;
        let mut seen: BTreeSet<(EnrollmentId, StepId)> = BTreeSet::new();
        let mut report = SweepReport::default();

        for log in &failed {
            if !seen.insert((log.enrollment_id.clone(), log.step_id.clone())) {
                continue;
            }
            report.examined += 1;
            match self.resubmit(log).await {
                Ok(Some(id)) => report.resubmitted.push(id),
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    report.skipped += 1;
                    tracing::warn!(
                        enrollment_id = %log.enrollment_id,
                        step_id = %log.step_id,
                        error = %e,
                        "failed to resubmit delivery"
                    );
                }
            }
        }
        if !report.resubmitted.is_empty() {
            tracing::info!(
                examined = report.examined,
                resubmitted = report.resubmitted.len(),
                "failed-delivery sweep"
            );
        }
        Ok(report)
    }

    async fn resubmit(&self, log: &InteractionLog) -> Result<Option<JobId>> {
        let history = self
            .logs
            .logs_for_step(&log.enrollment_id, &log.step_id)
            .await?;
        let Some(latest) = history.last() else {
            return Ok(None);
        };
        if latest.status != InteractionStatus::Failed {
            return Ok(None);
        }
        let key = resubmit_key(latest);
        if self.queue.has_dedup_key(&key)
            || self.queue.has_open_job(&log.enrollment_id, &log.step_id)
        {
            return Ok(None);
        }
        let resubmits = history
            .iter()
            .filter(|l| self.queue.has_dedup_key(&resubmit_key(l)))
            .count();
        if resubmits >= self.config.max_resubmits as usize {
            tracing::debug!(
                enrollment_id = %log.enrollment_id,
                step_id = %log.step_id,
                resubmits,
                "step is out of resubmissions"
            );
            return Ok(None);
        }

        let enrollment = self.enrollments.get_enrollment(&log.enrollment_id).await?;
        if !enrollment.is_active() {
            return Ok(None);
        }
        let steps = self.enrollments.program_steps(&enrollment.program_id).await?;
        let Some(step) = steps.iter().find(|s| s.id == log.step_id) else {
            return Ok(None);
        };

        let job = DeliveryJob::for_step(&enrollment, step).with_dedup_key(key);
        let enqueued = self.queue.enqueue_now(job);
        tracing::info!(
            enrollment_id = %enrollment.id,
            step_id = %step.id,
            failed_log = %latest.id,
            job_id = %enqueued.id,
            "resubmitted failed delivery"
        );
        Ok(Some(enqueued.id))
    }
}

#[cfg(test)]
#[path = "sweep_tests.rs"]
mod tests;
