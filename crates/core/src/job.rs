// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Delivery jobs and their queue bookkeeping

use crate::enrollment::Enrollment;
use crate::id::{EnrollmentId, JobId, ProgramId, ScheduleId, StepId, SubjectId};
use crate::step::{FeedbackSpec, Step, TriggerType};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Queue priority. Lower rank is served first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPriority {
    /// `enqueue_now`
    Immediate,
    /// `enqueue_after`
    Delayed,
    /// `enqueue_at`
    Timed,
    /// Materialised from a recurring schedule
    Recurring,
}

impl JobPriority {
    pub fn rank(self) -> u8 {
        match self {
            JobPriority::Immediate => 1,
            JobPriority::Delayed => 2,
            JobPriority::Timed => 3,
            JobPriority::Recurring => 4,
        }
    }
}

/// Lifecycle of a queued job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Waiting,
    Delayed,
    Active,
    Completed,
    Failed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Waiting => write!(f, "waiting"),
            JobState::Delayed => write!(f, "delayed"),
            JobState::Active => write!(f, "active"),
            JobState::Completed => write!(f, "completed"),
            JobState::Failed => write!(f, "failed"),
        }
    }
}

/// One message send, as handed to a worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryJob {
    pub subject_id: SubjectId,
    pub program_id: ProgramId,
    pub step_id: StepId,
    pub enrollment_id: EnrollmentId,
    pub message_type: String,
    pub content: serde_json::Value,
    #[serde(default)]
    pub requires_feedback: bool,
    #[serde(default)]
    pub feedback: Option<FeedbackSpec>,
    /// Jobs sharing a key collapse into the first one enqueued
    #[serde(default)]
    pub dedup_key: Option<String>,
}

impl DeliveryJob {
    /// Build the job that delivers `step` to the subject of `enrollment`
    pub fn for_step(enrollment: &Enrollment, step: &Step) -> Self {
        Self {
            subject_id: enrollment.subject_id.clone(),
            program_id: enrollment.program_id.clone(),
            step_id: step.id.clone(),
            enrollment_id: enrollment.id.clone(),
            message_type: step.message_type.clone(),
            content: step.payload.clone(),
            requires_feedback: step.requires_feedback,
            feedback: step.feedback.clone(),
            dedup_key: None,
        }
    }

    pub fn with_dedup_key(mut self, key: impl Into<String>) -> Self {
        self.dedup_key = Some(key.into());
        self
    }
}

/// Dispatch key for a step of an enrollment.
///
/// Scheduled steps fire once per local calendar day, so their key carries
/// the date; other triggers fire once per enrollment.
pub fn dispatch_key(enrollment_id: &EnrollmentId, step: &Step, local_date: NaiveDate) -> String {
    match step.trigger_type {
        TriggerType::Scheduled => format!("{}:{}:{}", enrollment_id, step.id, local_date),
        TriggerType::Immediate | TriggerType::Delay => format!("{}:{}", enrollment_id, step.id),
    }
}

/// A job as tracked by the queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedJob {
    pub id: JobId,
    pub job: DeliveryJob,
    pub priority: JobPriority,
    pub state: JobState,
    pub enqueued_at: DateTime<Utc>,
    #[serde(default)]
    pub not_before: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attempts_made: u32,
    pub max_attempts: u32,
    #[serde(default)]
    pub claimed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: Option<String>,
    /// Recurring schedule this instance was materialised from
    #[serde(default)]
    pub schedule_id: Option<ScheduleId>,
    /// Insertion order, breaks priority ties
    pub seq: u64,
}

impl QueuedJob {
    /// When the job becomes eligible to run
    pub fn ready_at(&self) -> DateTime<Utc> {
        self.not_before.unwrap_or(self.enqueued_at)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, JobState::Waiting | JobState::Delayed)
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
