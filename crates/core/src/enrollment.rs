// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Enrollment state machine
//!
//! An enrollment tracks one subject's progress through one program.
//! `current_step` only moves forward; `completed_steps` never exceeds
//! `total_steps`; `adherence_rate` is always derived from the two counters.
//! Every successful write bumps `version`, which stores use for
//! compare-and-set updates.

use crate::id::{EnrollmentId, ProgramId, SubjectId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A message recipient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub id: SubjectId,
    pub display_name: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

/// A multi-step program that subjects enroll in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub id: ProgramId,
    pub name: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

/// Lifecycle of an enrollment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Assigned,
    Active,
    Paused,
    Completed,
}

impl fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnrollmentStatus::Assigned => write!(f, "assigned"),
            EnrollmentStatus::Active => write!(f, "active"),
            EnrollmentStatus::Paused => write!(f, "paused"),
            EnrollmentStatus::Completed => write!(f, "completed"),
        }
    }
}

/// A subject's participation in a program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: EnrollmentId,
    pub subject_id: SubjectId,
    pub program_id: ProgramId,
    pub status: EnrollmentStatus,
    pub current_step: u32,
    pub total_steps: u32,
    pub completed_steps: u32,
    pub adherence_rate: f64,
    pub assigned_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency token, bumped by the store on every write
    #[serde(default)]
    pub version: u64,
}

impl Enrollment {
    /// A freshly assigned enrollment, positioned at step 1
    pub fn new(
        id: impl Into<EnrollmentId>,
        subject_id: impl Into<SubjectId>,
        program_id: impl Into<ProgramId>,
        total_steps: u32,
        assigned_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            subject_id: subject_id.into(),
            program_id: program_id.into(),
            status: EnrollmentStatus::Assigned,
            current_step: 1,
            total_steps,
            completed_steps: 0,
            adherence_rate: 0.0,
            assigned_at,
            started_at: None,
            completed_at: None,
            version: 0,
        }
    }

    pub fn activate(mut self) -> Self {
        self.status = EnrollmentStatus::Active;
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == EnrollmentStatus::Active
    }

    pub fn is_terminal(&self) -> bool {
        self.status == EnrollmentStatus::Completed
    }

    /// Time that delay triggers count from
    pub fn delay_base(&self) -> DateTime<Utc> {
        self.started_at.unwrap_or(self.assigned_at)
    }

    /// Move `current_step` forward to `order`; never moves it back.
    /// Returns whether anything changed.
    pub fn advance_to(&mut self, order: u32) -> bool {
        if order > self.current_step {
            self.current_step = order;
            true
        } else {
            false
        }
    }

    /// Record the enrollment start if it has not started yet
    pub fn mark_started(&mut self, at: DateTime<Utc>) -> bool {
        if self.started_at.is_some() {
            return false;
        }
        self.started_at = Some(at);
        true
    }

    /// Count one answered step and refresh the adherence rate. Reaching
    /// `total_steps` completes the enrollment.
    pub fn record_completed_step(&mut self, at: DateTime<Utc>) {
        if self.completed_steps < self.total_steps {
            self.completed_steps += 1;
        }
        self.adherence_rate = adherence_rate(self.completed_steps, self.total_steps);
        if self.total_steps > 0 && self.completed_steps == self.total_steps {
            self.complete(at);
        }
    }

    /// Move to the terminal state
    pub fn complete(&mut self, at: DateTime<Utc>) {
        if self.status != EnrollmentStatus::Completed {
            self.status = EnrollmentStatus::Completed;
            self.completed_at = Some(at);
        }
    }
}

/// Percentage of steps answered, rounded to two decimals; zero when the
/// program has no steps
pub fn adherence_rate(completed: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let rate = f64::from(completed.min(total)) / f64::from(total) * 100.0;
    (rate * 100.0).round() / 100.0
}

#[cfg(test)]
#[path = "enrollment_tests.rs"]
mod tests;
