// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Async job queue service
//!
//! Wraps [`JobQueueState`] behind a mutex shared by the evaluator, the
//! worker pool and the operational surface. Enqueues wake idle workers.
//! With a snapshot store attached, every mutation is written through.

use cadence_core::{
    Clock, DeliveryJob, EnrollmentId, Enqueued, FailureOutcome, JobId, JobQueueState, QueueConfig,
    QueueStats, QueuedJob, RecurringSchedule, Result, ScheduleId, StepId,
};
use cadence_storage::{SnapshotError, SnapshotStore};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;

const SNAPSHOT_NAME: &str = "queue";

pub struct JobQueue<C: Clock> {
    state: Arc<Mutex<JobQueueState>>,
    wake: Arc<Notify>,
    clock: C,
    snapshots: Option<SnapshotStore>,
}

impl<C: Clock> Clone for JobQueue<C> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            wake: Arc::clone(&self.wake),
            clock: self.clock.clone(),
            snapshots: self.snapshots.clone(),
        }
    }
}

impl<C: Clock> JobQueue<C> {
    /// An empty in-memory queue
    pub fn new(config: QueueConfig, clock: C) -> Self {
        Self {
            state: Arc::new(Mutex::new(JobQueueState::new(config))),
            wake: Arc::new(Notify::new()),
            clock,
            snapshots: None,
        }
    }

    /// A queue persisted to `snapshots`, restored from its last snapshot.
    /// Jobs that were active when the snapshot was taken go back to waiting.
    pub fn open(
        config: QueueConfig,
        clock: C,
        snapshots: SnapshotStore,
    ) -> Result<Self, SnapshotError> {
        let state = match snapshots.load::<JobQueueState>(SNAPSHOT_NAME)? {
            Some(saved) => {
                let mut state = saved.with_config(config);
                let requeued = state.requeue_active();
                let stats = state.stats();
                tracing::info!(
                    requeued,
                    waiting = stats.waiting,
                    delayed = stats.delayed,
                    failed = stats.failed,
                    "restored job queue from snapshot"
                );
                state
            }
            None => JobQueueState::new(config),
        };
        Ok(Self {
            state: Arc::new(Mutex::new(state)),
            wake: Arc::new(Notify::new()),
            clock,
            snapshots: Some(snapshots),
        })
    }

    fn lock(&self) -> MutexGuard<'_, JobQueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply `f` under the lock and write the result through
    fn mutate<R>(&self, f: impl FnOnce(&mut JobQueueState, DateTime<Utc>) -> R) -> R {
        let now = self.clock.utc_now();
        let mut state = self.lock();
        let result = f(&mut state, now);
        self.persist(&state);
        result
    }

    fn persist(&self, state: &JobQueueState) {
        if let Some(store) = &self.snapshots {
            if let Err(e) = store.save(SNAPSHOT_NAME, state) {
                tracing::warn!(error = %e, "failed to write queue snapshot");
            }
        }
    }

    /// Write a snapshot now, reporting failure
    pub fn flush(&self) -> Result<(), SnapshotError> {
        match &self.snapshots {
            Some(store) => store.save(SNAPSHOT_NAME, &*self.lock()),
            None => Ok(()),
        }
    }

    fn woke(&self, enqueued: Enqueued) -> Enqueued {
        if !enqueued.duplicate {
            self.wake.notify_one();
        }
        enqueued
    }

    pub fn enqueue_now(&self, job: DeliveryJob) -> Enqueued {
        let enqueued = self.mutate(|state, now| state.enqueue_now(job, now));
        self.woke(enqueued)
    }

    pub fn enqueue_after(&self, job: DeliveryJob, delay: Duration) -> Enqueued {
        let enqueued = self.mutate(|state, now| state.enqueue_after(job, delay, now));
        self.woke(enqueued)
    }

    pub fn enqueue_at(&self, job: DeliveryJob, at: DateTime<Utc>) -> Enqueued {
        let enqueued = self.mutate(|state, now| state.enqueue_at(job, at, now));
        self.woke(enqueued)
    }

    pub fn enqueue_recurring(&self, job: DeliveryJob, cron: &str) -> Result<ScheduleId> {
        let id = self.mutate(|state, now| state.enqueue_recurring(job, cron, now))?;
        self.wake.notify_one();
        Ok(id)
    }

    /// Claim the next runnable job, if any
    pub fn dequeue(&self) -> Option<QueuedJob> {
        let now = self.clock.utc_now();
        let mut state = self.lock();
        let job = state.dequeue(now)?;
        self.persist(&state);
        Some(job)
    }

    /// Claim the next runnable job, waiting up to `poll` for one to arrive
    /// or for a delayed job to come due
    pub async fn next_job(&self, poll: Duration) -> Option<QueuedJob> {
        if let Some(job) = self.dequeue() {
            return Some(job);
        }
        let wait = match self.lock().next_wake() {
            Some(at) => (at - self.clock.utc_now())
                .to_std()
                .map_or(Duration::ZERO, |until| until.min(poll)),
            None => poll,
        };
        tokio::select! {
            _ = self.wake.notified() => {}
            _ = tokio::time::sleep(wait) => {}
        }
        self.dequeue()
    }

    pub fn ack_success(&self, id: &JobId) -> Result<()> {
        self.mutate(|state, now| state.ack_success(id, now))
    }

    pub fn ack_failure(&self, id: &JobId, error: &str, retryable: bool) -> Result<FailureOutcome> {
        self.mutate(|state, now| state.ack_failure(id, error, retryable, now))
    }

    /// Return jobs whose worker went quiet to the queue
    pub fn reclaim_stalled(&self) -> Vec<(JobId, FailureOutcome)> {
        let reclaimed = self.mutate(|state, now| state.reclaim_stalled(now));
        if !reclaimed.is_empty() {
            self.wake.notify_one();
        }
        reclaimed
    }

    pub fn cancel_by_enrollment(&self, enrollment_id: &EnrollmentId) -> Vec<JobId> {
        let cancelled = self.mutate(|state, _| state.cancel_by_enrollment(enrollment_id));
        if !cancelled.is_empty() {
            tracing::info!(
                enrollment_id = %enrollment_id,
                cancelled = cancelled.len(),
                "cancelled pending jobs"
            );
        }
        cancelled
    }

    pub fn forget_dedup_keys(&self, enrollment_id: &EnrollmentId) -> usize {
        self.mutate(|state, _| state.forget_dedup_keys(enrollment_id))
    }

    pub fn has_dedup_key(&self, key: &str) -> bool {
        self.lock().has_dedup_key(key)
    }

    pub fn has_open_job(&self, enrollment_id: &EnrollmentId, step_id: &StepId) -> bool {
        self.lock().has_open_job(enrollment_id, step_id)
    }

    pub fn dedup_enrollments(&self) -> Vec<EnrollmentId> {
        self.lock().dedup_enrollments()
    }

    pub fn prune_completed(&self) -> usize {
        self.mutate(|state, _| state.prune_completed())
    }

    /// Give every failed job a fresh attempt budget
    pub fn retry_failed(&self) -> Vec<JobId> {
        let retried = self.mutate(|state, now| state.retry_failed(now));
        if !retried.is_empty() {
            self.wake.notify_one();
        }
        retried
    }

    pub fn get(&self, id: &JobId) -> Option<QueuedJob> {
        self.lock().get(id).cloned()
    }

    pub fn stats(&self) -> QueueStats {
        self.lock().stats()
    }

    pub fn list_failed(&self) -> Vec<QueuedJob> {
        self.lock().list_failed()
    }

    pub fn list_pending(&self) -> Vec<QueuedJob> {
        self.lock().list_pending()
    }

    pub fn list_completed(&self) -> Vec<QueuedJob> {
        self.lock().list_completed()
    }

    pub fn schedules(&self) -> Vec<RecurringSchedule> {
        self.lock().schedules().cloned().collect()
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
