// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job queue state machine
//!
//! Priority- and delay-aware queue of delivery jobs with per-job retry,
//! de-duplication, cancellation by enrollment and recurring schedules.
//! Time is always passed in, so the machine is pure and serialisable.
//!
//! Lifecycle: `waiting -> active -> completed`, or on failure back to
//! `delayed` (after backoff) until `max_attempts`, then `failed`. Delayed
//! jobs become `waiting` once their `not_before` passes. An `active` job
//! not acknowledged within the stall timeout goes back to `waiting`.

use crate::cron::CronExpr;
use crate::error::{Error, Result};
use crate::id::{EnrollmentId, JobId, ScheduleId, StepId};
use crate::job::{DeliveryJob, JobPriority, JobState, QueuedJob};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

/// Retry and retention policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub max_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub backoff_base: Duration,
    #[serde(with = "humantime_serde")]
    pub backoff_cap: Duration,
    #[serde(with = "humantime_serde")]
    pub stall_timeout: Duration,
    /// Completed jobs kept for inspection
    pub completed_retention: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(2),
            backoff_cap: Duration::from_secs(300),
            stall_timeout: Duration::from_secs(300),
            completed_retention: 1000,
        }
    }
}

impl QueueConfig {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_backoff(mut self, base: Duration, cap: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_cap = cap;
        self
    }

    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = timeout;
        self
    }

    pub fn with_completed_retention(mut self, retention: usize) -> Self {
        self.completed_retention = retention;
        self
    }

    /// Delay before attempt `attempt + 1`: `min(base * 2^(attempt-1), cap)`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.backoff_base
            .saturating_mul(1u32 << exp)
            .min(self.backoff_cap)
    }
}

/// Counts of jobs per lifecycle state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub waiting: usize,
    pub active: usize,
    /// Total completed since the queue was created
    pub completed: u64,
    pub failed: usize,
    pub delayed: usize,
}

/// A repeating job template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringSchedule {
    pub id: ScheduleId,
    pub job: DeliveryJob,
    pub cron: CronExpr,
    pub next_fire: DateTime<Utc>,
    #[serde(default)]
    pub fired: u64,
}

/// Result of an enqueue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enqueued {
    pub id: JobId,
    /// The dedup key was already known; nothing was added
    pub duplicate: bool,
}

/// What happened to a job after a failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureOutcome {
    Retrying { attempt: u32, retry_at: DateTime<Utc> },
    Failed { attempts: u32 },
}

/// `at + delay`, saturating at the end of time
pub fn time_after(at: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|d| at.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct DedupEntry {
    job_id: JobId,
    enrollment_id: EnrollmentId,
}

/// The job queue
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobQueueState {
    #[serde(skip)]
    config: QueueConfig,
    /// Waiting, delayed, active and failed jobs
    jobs: BTreeMap<JobId, QueuedJob>,
    completed: VecDeque<QueuedJob>,
    #[serde(default)]
    completed_total: u64,
    dedup: HashMap<String, DedupEntry>,
    schedules: BTreeMap<ScheduleId, RecurringSchedule>,
    next_seq: u64,
}

impl JobQueueState {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Apply a config, e.g. after loading a snapshot
    pub fn with_config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    fn next_id(&mut self) -> (JobId, u64) {
        self.next_seq += 1;
        (JobId::new(format!("job-{}", self.next_seq)), self.next_seq)
    }

    fn known(&self, job: &DeliveryJob) -> Option<JobId> {
        let key = job.dedup_key.as_ref()?;
        self.dedup.get(key).map(|e| e.job_id.clone())
    }

    fn insert(
        &mut self,
        job: DeliveryJob,
        priority: JobPriority,
        not_before: Option<DateTime<Utc>>,
        schedule_id: Option<ScheduleId>,
        now: DateTime<Utc>,
    ) -> Enqueued {
        if let Some(id) = self.known(&job) {
            return Enqueued {
                id,
                duplicate: true,
            };
        }
        let (id, seq) = self.next_id();
        if let Some(key) = &job.dedup_key {
            self.dedup.insert(
                key.clone(),
                DedupEntry {
                    job_id: id.clone(),
                    enrollment_id: job.enrollment_id.clone(),
                },
            );
        }
        let state = match not_before {
            Some(at) if at > now => JobState::Delayed,
            _ => JobState::Waiting,
        };
        self.jobs.insert(
            id.clone(),
            QueuedJob {
                id: id.clone(),
                job,
                priority,
                state,
                enqueued_at: now,
                not_before,
                attempts_made: 0,
                max_attempts: self.config.max_attempts,
                claimed_at: None,
                finished_at: None,
                last_error: None,
                schedule_id,
                seq,
            },
        );
        Enqueued {
            id,
            duplicate: false,
        }
    }

    /// Enqueue for immediate processing at the highest priority
    pub fn enqueue_now(&mut self, job: DeliveryJob, now: DateTime<Utc>) -> Enqueued {
        self.insert(job, JobPriority::Immediate, None, None, now)
    }

    pub fn enqueue_after(
        &mut self,
        job: DeliveryJob,
        delay: Duration,
        now: DateTime<Utc>,
    ) -> Enqueued {
        self.insert(job, JobPriority::Delayed, Some(time_after(now, delay)), None, now)
    }

    /// Enqueue for a point in time; a time not in the future behaves as
    /// `enqueue_now`
    pub fn enqueue_at(
        &mut self,
        job: DeliveryJob,
        at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Enqueued {
        if at <= now {
            return self.enqueue_now(job, now);
        }
        self.insert(job, JobPriority::Timed, Some(at), None, now)
    }

    /// Register a schedule that materialises a fresh job at each cron fire
    /// until cancelled. The template's dedup key names the schedule.
    pub fn enqueue_recurring(
        &mut self,
        job: DeliveryJob,
        cron: &str,
        now: DateTime<Utc>,
    ) -> Result<ScheduleId> {
        let cron = CronExpr::parse(cron)?;
        if let Some(key) = &job.dedup_key {
            if let Some(existing) = self
                .schedules
                .values()
                .find(|s| s.job.dedup_key.as_ref() == Some(key))
            {
                return Ok(existing.id.clone());
            }
        }
        let next_fire = cron
            .next_after(now)
            .ok_or_else(|| Error::validation(format!("cron '{cron}' never fires")))?;
        self.next_seq += 1;
        let id = ScheduleId::new(format!("schedule-{}", self.next_seq));
        self.schedules.insert(
            id.clone(),
            RecurringSchedule {
                id: id.clone(),
                job,
                cron,
                next_fire,
                fired: 0,
            },
        );
        Ok(id)
    }

    /// Move due delayed jobs to waiting and materialise due schedules
    pub fn promote(&mut self, now: DateTime<Utc>) {
        for job in self.jobs.values_mut() {
            if job.state == JobState::Delayed && job.ready_at() <= now {
                job.state = JobState::Waiting;
            }
        }

        let mut fires = Vec::new();
        for schedule in self.schedules.values_mut() {
            if schedule.next_fire > now {
                continue;
            }
            // missed fires collapse into one
            let fire_at = schedule.next_fire;
            schedule.fired += 1;
            match schedule.cron.next_after(now) {
                Some(next) => schedule.next_fire = next,
                None => schedule.next_fire = DateTime::<Utc>::MAX_UTC,
            }
            let mut job = schedule.job.clone();
            job.dedup_key = None;
            fires.push((job, schedule.id.clone(), fire_at));
        }
        for (job, schedule_id, fire_at) in fires {
            self.insert(job, JobPriority::Recurring, Some(fire_at), Some(schedule_id), now);
        }
    }

    /// Claim the next runnable job: lowest priority rank, then earliest
    /// ready time, then insertion order
    pub fn dequeue(&mut self, now: DateTime<Utc>) -> Option<QueuedJob> {
        self.promote(now);
        let id = self
            .jobs
            .values()
            .filter(|j| j.state == JobState::Waiting)
            .min_by_key(|j| (j.priority.rank(), j.ready_at(), j.seq))
            .map(|j| j.id.clone())?;
        let job = self.jobs.get_mut(&id)?;
        job.state = JobState::Active;
        job.attempts_made += 1;
        job.claimed_at = Some(now);
        Some(job.clone())
    }

    fn active_mut(&mut self, id: &JobId) -> Result<&mut QueuedJob> {
        match self.jobs.get_mut(id) {
            Some(job) if job.state == JobState::Active => Ok(job),
            Some(job) => Err(Error::conflict(format!(
                "job {id} is {}, not active",
                job.state
            ))),
            None => Err(Error::not_found("job", id)),
        }
    }

    pub fn ack_success(&mut self, id: &JobId, now: DateTime<Utc>) -> Result<()> {
        self.active_mut(id)?;
        if let Some(mut job) = self.jobs.remove(id) {
            job.state = JobState::Completed;
            job.finished_at = Some(now);
            job.claimed_at = None;
            self.completed.push_back(job);
            self.completed_total += 1;
            self.prune_completed();
        }
        Ok(())
    }

    /// Record a failed attempt. Retryable failures with attempts left are
    /// delayed by the backoff; everything else moves to `failed`.
    pub fn ack_failure(
        &mut self,
        id: &JobId,
        error: &str,
        retryable: bool,
        now: DateTime<Utc>,
    ) -> Result<FailureOutcome> {
        let config = self.config.clone();
        let job = self.active_mut(id)?;
        job.last_error = Some(error.to_string());
        job.claimed_at = None;
        Ok(Self::after_failed_attempt(job, &config, retryable, now))
    }

    fn after_failed_attempt(
        job: &mut QueuedJob,
        config: &QueueConfig,
        retryable: bool,
        now: DateTime<Utc>,
    ) -> FailureOutcome {
        if retryable && job.attempts_made < job.max_attempts {
            let delay = config.backoff(job.attempts_made);
            let retry_at = time_after(now, delay);
            job.state = JobState::Delayed;
            job.not_before = Some(retry_at);
            FailureOutcome::Retrying {
                attempt: job.attempts_made,
                retry_at,
            }
        } else {
            job.state = JobState::Failed;
            job.finished_at = Some(now);
            FailureOutcome::Failed {
                attempts: job.attempts_made,
            }
        }
    }

    /// Return active jobs claimed longer than the stall timeout to the
    /// queue; a stall counts as a failed attempt
    pub fn reclaim_stalled(&mut self, now: DateTime<Utc>) -> Vec<(JobId, FailureOutcome)> {
        let config = self.config.clone();
        let mut reclaimed = Vec::new();
        for job in self.jobs.values_mut() {
            let Some(claimed_at) = job.claimed_at else {
                continue;
            };
            if job.state != JobState::Active || time_after(claimed_at, config.stall_timeout) > now {
                continue;
            }
            job.claimed_at = None;
            job.last_error = Some("stalled: not acknowledged in time".to_string());
            let outcome = Self::after_failed_attempt(job, &config, true, now);
            if let FailureOutcome::Retrying { .. } = outcome {
                // a stalled job is picked up again right away
                job.state = JobState::Waiting;
                job.not_before = None;
            }
            reclaimed.push((job.id.clone(), outcome));
        }
        reclaimed
    }

    /// Return every active job to waiting without counting an attempt;
    /// used when a snapshot is loaded after a restart
    pub fn requeue_active(&mut self) -> usize {
        let mut count = 0;
        for job in self.jobs.values_mut() {
            if job.state == JobState::Active {
                job.state = JobState::Waiting;
                job.claimed_at = None;
                job.attempts_made = job.attempts_made.saturating_sub(1);
                count += 1;
            }
        }
        count
    }

    /// Remove every waiting or delayed job and every recurring schedule of
    /// an enrollment. Active jobs are left to finish.
    pub fn cancel_by_enrollment(&mut self, enrollment_id: &EnrollmentId) -> Vec<JobId> {
        let cancelled: Vec<JobId> = self
            .jobs
            .values()
            .filter(|j| j.is_pending() && &j.job.enrollment_id == enrollment_id)
            .map(|j| j.id.clone())
            .collect();
        for id in &cancelled {
            if let Some(job) = self.jobs.remove(id) {
                if let Some(key) = job.job.dedup_key {
                    self.dedup.remove(&key);
                }
            }
        }
        self.schedules
            .retain(|_, s| &s.job.enrollment_id != enrollment_id);
        cancelled
    }

    /// Drop dedup keys of an enrollment so its steps can be dispatched
    /// again
    pub fn forget_dedup_keys(&mut self, enrollment_id: &EnrollmentId) -> usize {
        let before = self.dedup.len();
        self.dedup.retain(|_, e| &e.enrollment_id != enrollment_id);
        before - self.dedup.len()
    }

    pub fn has_dedup_key(&self, key: &str) -> bool {
        self.dedup.contains_key(key)
    }

    /// Enrollments that hold dedup keys
    pub fn dedup_enrollments(&self) -> Vec<EnrollmentId> {
        let mut ids: Vec<EnrollmentId> = self
            .dedup
            .values()
            .map(|e| e.enrollment_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Trim the completed ring to the configured retention
    pub fn prune_completed(&mut self) -> usize {
        let mut pruned = 0;
        while self.completed.len() > self.config.completed_retention {
            self.completed.pop_front();
            pruned += 1;
        }
        pruned
    }

    /// Put failed jobs back in the queue with a fresh attempt budget
    pub fn retry_failed(&mut self, now: DateTime<Utc>) -> Vec<JobId> {
        let max_attempts = self.config.max_attempts;
        let mut retried = Vec::new();
        for job in self.jobs.values_mut() {
            if job.state == JobState::Failed {
                job.state = JobState::Waiting;
                job.attempts_made = 0;
                job.max_attempts = max_attempts;
                job.not_before = Some(now);
                job.finished_at = None;
                retried.push(job.id.clone());
            }
        }
        retried
    }

    /// Whether a job for this step of this enrollment is still waiting,
    /// delayed or running
    pub fn has_open_job(&self, enrollment_id: &EnrollmentId, step_id: &StepId) -> bool {
        self.jobs.values().any(|j| {
            j.state != JobState::Failed
                && &j.job.enrollment_id == enrollment_id
                && &j.job.step_id == step_id
        })
    }

    pub fn get(&self, id: &JobId) -> Option<&QueuedJob> {
        self.jobs
            .get(id)
            .or_else(|| self.completed.iter().find(|j| &j.id == id))
    }

    pub fn stats(&self) -> QueueStats {
        let mut stats = QueueStats {
            completed: self.completed_total,
            ..QueueStats::default()
        };
        for job in self.jobs.values() {
            match job.state {
                JobState::Waiting => stats.waiting += 1,
                JobState::Delayed => stats.delayed += 1,
                JobState::Active => stats.active += 1,
                JobState::Failed => stats.failed += 1,
                JobState::Completed => {}
            }
        }
        stats
    }

    pub fn list_failed(&self) -> Vec<QueuedJob> {
        self.list(|j| j.state == JobState::Failed)
    }

    /// Waiting and delayed jobs, in the order they would run
    pub fn list_pending(&self) -> Vec<QueuedJob> {
        self.list(QueuedJob::is_pending)
    }

    pub fn list_completed(&self) -> Vec<QueuedJob> {
        self.completed.iter().cloned().collect()
    }

    fn list(&self, filter: impl Fn(&QueuedJob) -> bool) -> Vec<QueuedJob> {
        let mut jobs: Vec<QueuedJob> = self.jobs.values().filter(|&j| filter(j)).cloned().collect();
        jobs.sort_by_key(|j| (j.priority.rank(), j.ready_at(), j.seq));
        jobs
    }

    pub fn schedules(&self) -> impl Iterator<Item = &RecurringSchedule> {
        self.schedules.values()
    }

    /// Earliest time a delayed job or schedule becomes runnable
    pub fn next_wake(&self) -> Option<DateTime<Utc>> {
        let delayed = self
            .jobs
            .values()
            .filter(|j| j.state == JobState::Delayed)
            .map(QueuedJob::ready_at);
        let schedules = self.schedules.values().map(|s| s.next_fire);
        delayed.chain(schedules).min()
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
