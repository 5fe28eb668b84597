// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Trigger evaluator
//!
//! Each tick scans active enrollments, walks their steps in ascending
//! order, and enqueues one delivery job per due step. Jobs carry a
//! dispatch key, so a step the queue already knows is never enqueued
//! twice no matter how many ticks see it due.

use crate::progress::update_enrollment;
use crate::queue::JobQueue;
use cadence_adapters::{ActiveEnrollment, EnrollmentStore};
use cadence_core::{dispatch_key, Clock, DeliveryJob, Result, TriggerType};
use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Counts from one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub scanned: usize,
    pub dispatched: usize,
    /// Due steps the queue already held a job for
    pub duplicates: usize,
    /// Enrollments whose evaluation failed
    pub failed: usize,
}

#[derive(Debug, Default)]
struct EnrollmentOutcome {
    dispatched: usize,
    duplicates: usize,
}

pub struct TriggerEvaluator<E: EnrollmentStore, C: Clock> {
    store: E,
    queue: JobQueue<C>,
    clock: C,
    offset: FixedOffset,
    /// Serialises ticks
    ticking: Arc<tokio::sync::Mutex<()>>,
}

impl<E: EnrollmentStore, C: Clock> Clone for TriggerEvaluator<E, C> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            queue: self.queue.clone(),
            clock: self.clock.clone(),
            offset: self.offset,
            ticking: Arc::clone(&self.ticking),
        }
    }
}

impl<E: EnrollmentStore, C: Clock> TriggerEvaluator<E, C> {
    /// `offset` is the zone `scheduled` trigger times are read in
    pub fn new(store: E, queue: JobQueue<C>, clock: C, offset: FixedOffset) -> Self {
        Self {
            store,
            queue,
            clock,
            offset,
            ticking: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Scan every active enrollment once.
    ///
    /// Fails only when the enrollment scan itself fails; errors for a
    /// single enrollment are logged and counted in the report.
    pub async fn tick(&self) -> Result<TickReport> {
        let _ticking = self.ticking.lock().await;
        let now = self.clock.utc_now();
        let active = self.store.active_enrollments().await?;
        let mut report = TickReport {
            scanned: active.len(),
            ..TickReport::default()
        };
        for entry in &active {
            match self.evaluate(entry, now).await {
                Ok(outcome) => {
                    report.dispatched += outcome.dispatched;
                    report.duplicates += outcome.duplicates;
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(
                        enrollment_id = %entry.enrollment.id,
                        error = %e,
                        "failed to evaluate enrollment"
                    );
                }
            }
        }
        if report.dispatched > 0 || report.failed > 0 {
            tracing::info!(
                scanned = report.scanned,
                dispatched = report.dispatched,
                failed = report.failed,
                "evaluator tick"
            );
        }
        Ok(report)
    }

    async fn evaluate(
        &self,
        entry: &ActiveEnrollment,
        now: DateTime<Utc>,
    ) -> Result<EnrollmentOutcome> {
        let steps = self
            .store
            .program_steps(&entry.enrollment.program_id)
            .await?;
        let local_date = now.with_timezone(&self.offset).date_naive();

        // working copy, so later steps see the progress of earlier ones
        let mut enrollment = entry.enrollment.clone();
        let mut reached = enrollment.current_step;
        let mut started = false;
        let mut outcome = EnrollmentOutcome::default();

        for step in &steps {
            if let Err(e) = step.validate() {
                tracing::warn!(
                    enrollment_id = %enrollment.id,
                    step_id = %step.id,
                    error = %e,
                    "skipping invalid step"
                );
                continue;
            }
            if !step.is_due(&enrollment, now, self.offset)? {
                continue;
            }

            let key = dispatch_key(&enrollment.id, step, local_date);
            let job = DeliveryJob::for_step(&enrollment, step).with_dedup_key(key);
            let enqueued = self.queue.enqueue_now(job);
            if enqueued.duplicate {
                outcome.duplicates += 1;
            } else {
                outcome.dispatched += 1;
                tracing::info!(
                    enrollment_id = %enrollment.id,
                    step_id = %step.id,
                    order = step.order,
                    trigger = %step.trigger_type,
                    job_id = %enqueued.id,
                    "step dispatched"
                );
            }

            enrollment.advance_to(step.order);
            reached = reached.max(step.order);
            if step.trigger_type == TriggerType::Immediate && enrollment.mark_started(now) {
                started = true;
            }
        }

        if enrollment != entry.enrollment {
            update_enrollment(&self.store, entry.enrollment.clone(), |e| {
                let mut changed = e.advance_to(reached);
                if started {
                    changed |= e.mark_started(now);
                }
                changed
            })
            .await?;
        }
        Ok(outcome)
    }
}

#[cfg(test)]
#[path = "evaluator_tests.rs"]
mod tests;
