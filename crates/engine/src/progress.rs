// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Enrollment progress: versioned updates and response processing
//!
//! The evaluator advances `current_step` while response processing
//! advances `completed_steps`. Both go through [`update_enrollment`], which
//! re-reads and reapplies the change when another writer got there first,
//! so neither path overwrites the other.

use cadence_adapters::{EnrollmentStore, InteractionStore};
use cadence_core::{
    Clock, Enrollment, Error, ErrorKind, InteractionLog, InteractionStatus, LogId, Result,
};

/// Attempts before a contended enrollment update gives up
pub const MAX_UPDATE_ATTEMPTS: u32 = 5;

/// Apply `change` to the enrollment and write it with compare-and-set.
///
/// `change` returns whether it modified anything; when it does not, no
/// write happens and the input comes back unchanged. On a version conflict
/// the stored row is re-read and `change` runs again against it.
pub async fn update_enrollment<E, F>(store: &E, base: Enrollment, change: F) -> Result<Enrollment>
where
    E: EnrollmentStore,
    F: Fn(&mut Enrollment) -> bool,
{
    let mut current = base;
    for attempt in 1..=MAX_UPDATE_ATTEMPTS {
        let mut next = current.clone();
        if !change(&mut next) {
            return Ok(current);
        }
        match store.update_enrollment(&next).await {
            Ok(stored) => return Ok(stored),
            Err(e) if e.kind == ErrorKind::Conflict => {
                tracing::debug!(
                    enrollment_id = %current.id,
                    attempt,
                    "enrollment changed underneath us, re-reading"
                );
                current = store.get_enrollment(&current.id).await?;
            }
            Err(e) => return Err(e),
        }
    }
    Err(Error::conflict(format!(
        "enrollment {} kept changing; gave up after {MAX_UPDATE_ATTEMPTS} attempts",
        current.id
    )))
}

/// Which delivery a response answers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseRef {
    /// Id the messaging platform assigned to the message
    External(String),
    Log(LogId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResponseOutcome {
    pub log: InteractionLog,
    pub enrollment: Enrollment,
    /// False when the step already had a response and nothing was counted
    pub counted: bool,
}

/// Records recipient responses against interaction logs and enrollments
#[derive(Clone)]
pub struct ResponseRecorder<E, L, C> {
    enrollments: E,
    logs: L,
    clock: C,
}

impl<E, L, C> ResponseRecorder<E, L, C>
where
    E: EnrollmentStore,
    L: InteractionStore,
    C: Clock,
{
    pub fn new(enrollments: E, logs: L, clock: C) -> Self {
        Self {
            enrollments,
            logs,
            clock,
        }
    }

    /// Mark the referenced delivery as answered and count the step toward
    /// the enrollment's adherence. A step is counted once no matter how
    /// many of its deliveries get answered.
    pub async fn record_response(
        &self,
        reference: &ResponseRef,
        value: &str,
        action: Option<String>,
    ) -> Result<ResponseOutcome> {
        let mut log = match reference {
            ResponseRef::External(id) => self
                .logs
                .find_by_external_id(id)
                .await?
                .ok_or_else(|| Error::not_found("message", id))?,
            ResponseRef::Log(id) => self.logs.get_log(id).await?,
        };

        if log.status == InteractionStatus::Responded {
            let enrollment = self.enrollments.get_enrollment(&log.enrollment_id).await?;
            return Ok(ResponseOutcome {
                log,
                enrollment,
                counted: false,
            });
        }
        if !log.status.awaits_response() {
            return Err(Error::conflict(format!(
                "log {} is {} and cannot take a response",
                log.id, log.status
            )));
        }

        let already_answered = self
            .logs
            .logs_for_step(&log.enrollment_id, &log.step_id)
            .await?
            .iter()
            .any(|l| l.id != log.id && l.status == InteractionStatus::Responded);

        let now = self.clock.utc_now();
        log.mark_responded(now, value, action);
        self.logs.update_log(&log).await?;

        let enrollment = self.enrollments.get_enrollment(&log.enrollment_id).await?;
        if already_answered {
            return Ok(ResponseOutcome {
                log,
                enrollment,
                counted: false,
            });
        }
        let before = enrollment.completed_steps;
        let enrollment = update_enrollment(&self.enrollments, enrollment, |e| {
            if e.is_terminal() {
                return false;
            }
            e.record_completed_step(now);
            true
        })
        .await?;
        let counted = enrollment.completed_steps > before;

        tracing::info!(
            enrollment_id = %enrollment.id,
            step_id = %log.step_id,
            latency_ms = log.latency_ms.unwrap_or(0),
            completed_steps = enrollment.completed_steps,
            adherence_rate = enrollment.adherence_rate,
            counted,
            "response recorded"
        );
        Ok(ResponseOutcome {
            log,
            enrollment,
            counted,
        })
    }
}

#[cfg(test)]
#[path = "progress_tests.rs"]
mod tests;
