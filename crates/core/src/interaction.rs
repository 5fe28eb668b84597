// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Interaction log: one audit row per send attempt
//!
//! Rows are created as `sent` when a worker starts an attempt, then moved
//! to `delivered` or `failed` by the worker, and later to `responded` or
//! `missed` by response processing and maintenance.

use crate::id::{EnrollmentId, LogId, ProgramId, StepId, SubjectId};
use crate::job::DeliveryJob;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionStatus {
    Sent,
    Delivered,
    Read,
    Responded,
    Missed,
    Failed,
}

impl InteractionStatus {
    /// Whether the row can still receive a response
    pub fn awaits_response(self) -> bool {
        matches!(
            self,
            InteractionStatus::Sent | InteractionStatus::Delivered | InteractionStatus::Read
        )
    }
}

impl fmt::Display for InteractionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InteractionStatus::Sent => "sent",
            InteractionStatus::Delivered => "delivered",
            InteractionStatus::Read => "read",
            InteractionStatus::Responded => "responded",
            InteractionStatus::Missed => "missed",
            InteractionStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionLog {
    pub id: LogId,
    pub subject_id: SubjectId,
    pub program_id: ProgramId,
    pub step_id: StepId,
    pub enrollment_id: EnrollmentId,
    #[serde(default)]
    pub external_message_id: Option<String>,
    pub sent_at: DateTime<Utc>,
    #[serde(default)]
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub responded_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub response_value: Option<String>,
    #[serde(default)]
    pub response_action: Option<String>,
    #[serde(default)]
    pub latency_ms: Option<u64>,
    pub status: InteractionStatus,
    #[serde(default)]
    pub requires_feedback: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl InteractionLog {
    /// A `sent` row for an attempt starting at `sent_at`
    pub fn sent(id: impl Into<LogId>, job: &DeliveryJob, sent_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            subject_id: job.subject_id.clone(),
            program_id: job.program_id.clone(),
            step_id: job.step_id.clone(),
            enrollment_id: job.enrollment_id.clone(),
            external_message_id: None,
            sent_at,
            delivered_at: None,
            responded_at: None,
            response_value: None,
            response_action: None,
            latency_ms: None,
            status: InteractionStatus::Sent,
            requires_feedback: job.requires_feedback,
            error: None,
        }
    }

    pub fn mark_delivered(&mut self, at: DateTime<Utc>, external_message_id: Option<String>) {
        self.status = InteractionStatus::Delivered;
        self.delivered_at = Some(at);
        self.external_message_id = external_message_id;
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = InteractionStatus::Failed;
        self.error = Some(error.into());
    }

    /// Record a response; latency counts from delivery, or from the send
    /// when delivery was never confirmed
    pub fn mark_responded(
        &mut self,
        at: DateTime<Utc>,
        value: impl Into<String>,
        action: Option<String>,
    ) {
        let since = self.delivered_at.unwrap_or(self.sent_at);
        let latency = (at - since).num_milliseconds().max(0);
        self.status = InteractionStatus::Responded;
        self.responded_at = Some(at);
        self.response_value = Some(value.into());
        self.response_action = action;
        self.latency_ms = u64::try_from(latency).ok();
    }

    pub fn mark_missed(&mut self) {
        self.status = InteractionStatus::Missed;
    }
}

#[cfg(test)]
#[path = "interaction_tests.rs"]
mod tests;
