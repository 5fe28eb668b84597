// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic housekeeping
//!
//! - delivered feedback requests left unanswered past the response window
//!   become `missed`
//! - enrollments whose last step is settled become `completed`
//! - dispatch keys of completed enrollments are dropped
//! - the completed-job history is trimmed

use crate::progress::update_enrollment;
use crate::queue::JobQueue;
use cadence_adapters::{EnrollmentStore, InteractionStore};
use cadence_core::{
    time_after, Clock, Enrollment, ErrorKind, InteractionLog, InteractionStatus, Result,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// How long a delivered feedback request waits for an answer
    #[serde(with = "humantime_serde")]
    pub response_window: Duration,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            response_window: Duration::from_secs(24 * 60 * 60),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    pub missed: usize,
    pub completed: usize,
    pub keys_forgotten: usize,
    pub pruned: usize,
}

pub struct Maintenance<E, L, C: Clock> {
    enrollments: E,
    logs: L,
    queue: JobQueue<C>,
    clock: C,
    config: MaintenanceConfig,
}

impl<E: Clone, L: Clone, C: Clock> Clone for Maintenance<E, L, C> {
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

impl<E, L, C> Maintenance<E, L, C>
where
    E: EnrollmentStore,
    L: InteractionStore,
    C: Clock,
{
    pub fn new(
        enrollments: E,
        logs: L,
        queue: JobQueue<C>,
        clock: C,
        config: MaintenanceConfig,
    ) -> Self {
        Self {
            enrollments,
            logs,
            queue,
            clock,
            config,
        }
    }

    pub async fn run(&self) -> Result<MaintenanceReport> {
        let now = self.clock.utc_now();
        let report = MaintenanceReport {
            missed: self.mark_missed(now).await?,
            completed: self.complete_enrollments(now).await?,
            keys_forgotten: self.forget_finished_keys().await,
            pruned: self.queue.prune_completed(),
        };
        tracing::info!(
            missed = report.missed,
            completed = report.completed,
            keys_forgotten = report.keys_forgotten,
            pruned = report.pruned,
            "maintenance finished"
        );
        Ok(report)
    }

    fn window_passed(&self, log: &InteractionLog, now: DateTime<Utc>) -> bool {
        let since = log.delivered_at.unwrap_or(log.sent_at);
        time_after(since, self.config.response_window) <= now
    }

    async fn mark_missed(&self, now: DateTime<Utc>) -> Result<usize> {
        let delivered = self
            .logs
            .logs_with_status(InteractionStatus::Delivered, DateTime::<Utc>::MIN_UTC)
            .await?;
        let mut missed = 0;
        for mut log in delivered {
            if !log.requires_feedback || !self.window_passed(&log, now) {
                continue;
            }
            log.mark_missed();
            match self.logs.update_log(&log).await {
                Ok(()) => missed += 1,
                Err(e) => {
                    tracing::warn!(log_id = %log.id, error = %e, "failed to mark log missed");
                }
            }
        }
        Ok(missed)
    }

    /// Whether the final step has been delivered and its answer settled
    async fn last_step_settled(&self, enrollment: &Enrollment, now: DateTime<Utc>) -> Result<bool> {
        if enrollment.current_step < enrollment.total_steps {
            return Ok(false);
        }
        let steps = self.enrollments.program_steps(&enrollment.program_id).await?;
        let Some(last) = steps.last() else {
            return Ok(false);
        };
        if self.queue.has_open_job(&enrollment.id, &last.id) {
            return Ok(false);
        }
        let logs = self.logs.logs_for_step(&enrollment.id, &last.id).await?;
        let settled = logs.iter().any(|log| match log.status {
            InteractionStatus::Responded | InteractionStatus::Missed => true,
            InteractionStatus::Delivered | InteractionStatus::Read => {
                !log.requires_feedback && self.window_passed(log, now)
            }
            InteractionStatus::Sent | InteractionStatus::Failed => false,
        });
        Ok(settled)
    }

    async fn complete_enrollments(&self, now: DateTime<Utc>) -> Result<usize> {
        let active = self.enrollments.active_enrollments().await?;
        let mut completed = 0;
        for entry in active {
            let id = entry.enrollment.id.clone();
            let settled = match self.last_step_settled(&entry.enrollment, now).await {
                Ok(settled) => settled,
                Err(e) => {
                    tracing::warn!(enrollment_id = %id, error = %e, "failed to check enrollment");
                    continue;
                }
            };
            if !settled {
                continue;
            }
            let result = update_enrollment(&self.enrollments, entry.enrollment, |e| {
                if e.is_terminal() {
                    return false;
                }
                e.complete(now);
                true
            })
            .await;
            match result {
                Ok(_) => {
                    completed += 1;
                    tracing::info!(enrollment_id = %id, "enrollment completed");
                }
                Err(e) => {
                    tracing::warn!(enrollment_id = %id, error = %e, "failed to complete enrollment");
                }
            }
        }
        Ok(completed)
    }

    async fn forget_finished_keys(&self) -> usize {
        let mut forgotten = 0;
        for id in self.queue.dedup_enrollments() {
            let finished = match self.enrollments.get_enrollment(&id).await {
                Ok(enrollment) => enrollment.is_terminal(),
                Err(e) if e.kind == ErrorKind::NotFound => true,
                Err(e) => {
                    tracing::warn!(enrollment_id = %id, error = %e, "failed to read enrollment");
                    false
                }
            };
            if finished {
                forgotten += self.queue.forget_dedup_keys(&id);
            }
        }
        forgotten
    }
}

#[cfg(test)]
#[path = "maintenance_tests.rs"]
mod tests;
