// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistence boundary for enrollments and interaction logs
//!
//! Both stores are assumed transactional at the single-row level.
//! Enrollment writes are compare-and-set on `Enrollment::version`.

use async_trait::async_trait;
use cadence_core::{
    Enrollment, EnrollmentId, InteractionLog, InteractionStatus, LogId, Program, ProgramId,
    Result, Step, StepId, Subject,
};
use chrono::{DateTime, Utc};

/// An active enrollment together with its subject and program
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveEnrollment {
    pub enrollment: Enrollment,
    pub subject: Subject,
    pub program: Program,
}

/// Read access to enrollments and steps, plus versioned updates
#[async_trait]
pub trait EnrollmentStore: Clone + Send + Sync + 'static {
    /// Enrollments with status `active` whose subject and program are
    /// both active
    async fn active_enrollments(&self) -> Result<Vec<ActiveEnrollment>>;

    /// Steps of a program in ascending `order`
    async fn program_steps(&self, program_id: &ProgramId) -> Result<Vec<Step>>;

    async fn get_enrollment(&self, id: &EnrollmentId) -> Result<Enrollment>;

    /// Write `enrollment` if the stored version equals `enrollment.version`,
    /// returning the stored row with its new version. A stale version is a
    /// `Conflict` error.
    async fn update_enrollment(&self, enrollment: &Enrollment) -> Result<Enrollment>;
}

/// Append-then-update audit log of send attempts
#[async_trait]
pub trait InteractionStore: Clone + Send + Sync + 'static {
    async fn create_log(&self, log: &InteractionLog) -> Result<()>;

    async fn update_log(&self, log: &InteractionLog) -> Result<()>;

    async fn get_log(&self, id: &LogId) -> Result<InteractionLog>;

    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<InteractionLog>>;

    /// Logs in `status` sent at or after `since`, oldest first
    async fn logs_with_status(
        &self,
        status: InteractionStatus,
        since: DateTime<Utc>,
    ) -> Result<Vec<InteractionLog>>;

    /// Every log of one step of one enrollment, oldest first
    async fn logs_for_step(
        &self,
        enrollment_id: &EnrollmentId,
        step_id: &StepId,
    ) -> Result<Vec<InteractionLog>>;
}
