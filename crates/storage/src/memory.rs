// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory enrollment and interaction store
//!
//! Every write to an enrollment is compare-and-set on its `version`.
//! Interaction logs keep insertion order, which is also send order.

use crate::seed::Seed;
use async_trait::async_trait;
use cadence_adapters::{ActiveEnrollment, EnrollmentStore, InteractionStore};
use cadence_core::{
    Enrollment, EnrollmentId, Error, InteractionLog, InteractionStatus, LogId, Program, ProgramId,
    Result, Step, StepId, Subject, SubjectId,
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
struct StoreState {
    subjects: BTreeMap<SubjectId, Subject>,
    programs: BTreeMap<ProgramId, Program>,
    steps: BTreeMap<ProgramId, Vec<Step>>,
    enrollments: BTreeMap<EnrollmentId, Enrollment>,
    logs: Vec<InteractionLog>,
    log_index: HashMap<LogId, usize>,
    fail_log_writes: bool,
}

/// Shared in-memory store; clones see the same data
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store holding everything in `seed`
    pub fn from_seed(seed: Seed) -> Self {
        let store = Self::new();
        for subject in seed.subjects {
            store.put_subject(subject);
        }
        for program in seed.programs {
            store.put_program(program);
        }
        for step in seed.steps {
            store.put_step(step);
        }
        for enrollment in seed.enrollments {
            store.put_enrollment(enrollment);
        }
        store
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn put_subject(&self, subject: Subject) {
        self.lock().subjects.insert(subject.id.clone(), subject);
    }

    pub fn put_program(&self, program: Program) {
        self.lock().programs.insert(program.id.clone(), program);
    }

    /// Insert or replace a step, keeping the program's steps in order
    pub fn put_step(&self, step: Step) {
        let mut state = self.lock();
        let steps = state.steps.entry(step.program_id.clone()).or_default();
        steps.retain(|s| s.id != step.id);
        steps.push(step);
        steps.sort_by_key(|s| s.order);
    }

    /// Insert or replace an enrollment without a version check
    pub fn put_enrollment(&self, enrollment: Enrollment) {
        self.lock()
            .enrollments
            .insert(enrollment.id.clone(), enrollment);
    }

    pub fn enrollments(&self) -> Vec<Enrollment> {
        self.lock().enrollments.values().cloned().collect()
    }

    pub fn logs(&self) -> Vec<InteractionLog> {
        self.lock().logs.clone()
    }

    /// Make every interaction-log write fail with a storage error
    #[cfg(any(test, feature = "test-support"))]
    pub fn fail_log_writes(&self, fail: bool) {
        self.lock().fail_log_writes = fail;
    }
}

fn check_log_writes(state: &StoreState) -> Result<()> {
    if state.fail_log_writes {
        return Err(Error::storage("interaction log writes are disabled"));
    }
    Ok(())
}

#[async_trait]
impl EnrollmentStore for MemoryStore {
    async fn active_enrollments(&self) -> Result<Vec<ActiveEnrollment>> {
        let state = self.lock();
        let active = state
            .enrollments
            .values()
            .filter(|e| e.is_active())
            .filter_map(|e| {
                let subject = state.subjects.get(&e.subject_id).filter(|s| s.active)?;
                let program = state.programs.get(&e.program_id).filter(|p| p.active)?;
                Some(ActiveEnrollment {
                    enrollment: e.clone(),
                    subject: subject.clone(),
                    program: program.clone(),
                })
            })
            .collect();
        Ok(active)
    }

    async fn program_steps(&self, program_id: &ProgramId) -> Result<Vec<Step>> {
        Ok(self.lock().steps.get(program_id).cloned().unwrap_or_default())
    }

    async fn get_enrollment(&self, id: &EnrollmentId) -> Result<Enrollment> {
        self.lock()
            .enrollments
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found("enrollment", id))
    }

    async fn update_enrollment(&self, enrollment: &Enrollment) -> Result<Enrollment> {
        let mut state = self.lock();
        let stored = state
            .enrollments
            .get_mut(&enrollment.id)
            .ok_or_else(|| Error::not_found("enrollment", &enrollment.id))?;
        if stored.version != enrollment.version {
            return Err(Error::conflict(format!(
                "enrollment {} is at version {}, update was based on {}",
                enrollment.id, stored.version, enrollment.version
            )));
        }
        let mut next = enrollment.clone();
        next.version += 1;
        *stored = next.clone();
        Ok(next)
    }
}

#[async_trait]
impl InteractionStore for MemoryStore {
    async fn create_log(&self, log: &InteractionLog) -> Result<()> {
        let mut state = self.lock();
        check_log_writes(&state)?;
        if state.log_index.contains_key(&log.id) {
            return Err(Error::conflict(format!("log {} already exists", log.id)));
        }
        let index = state.logs.len();
        state.log_index.insert(log.id.clone(), index);
        state.logs.push(log.clone());
        Ok(())
    }

    async fn update_log(&self, log: &InteractionLog) -> Result<()> {
        let mut state = self.lock();
        check_log_writes(&state)?;
        let index = *state
            .log_index
            .get(&log.id)
            .ok_or_else(|| Error::not_found("log", &log.id))?;
        state.logs[index] = log.clone();
        Ok(())
    }

    async fn get_log(&self, id: &LogId) -> Result<InteractionLog> {
        let state = self.lock();
        state
            .log_index
            .get(id)
            .and_then(|&i| state.logs.get(i))
            .cloned()
            .ok_or_else(|| Error::not_found("log", id))
    }

    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<InteractionLog>> {
        Ok(self
            .lock()
            .logs
            .iter()
            .rev()
            .find(|l| l.external_message_id.as_deref() == Some(external_id))
            .cloned())
    }

    async fn logs_with_status(
        &self,
        status: InteractionStatus,
        since: DateTime<Utc>,
    ) -> Result<Vec<InteractionLog>> {
        let mut logs: Vec<InteractionLog> = self
            .lock()
            .logs
            .iter()
            .filter(|l| l.status == status && l.sent_at >= since)
            .cloned()
            .collect();
        logs.sort_by_key(|l| l.sent_at);
        Ok(logs)
    }

    async fn logs_for_step(
        &self,
        enrollment_id: &EnrollmentId,
        step_id: &StepId,
    ) -> Result<Vec<InteractionLog>> {
        let mut logs: Vec<InteractionLog> = self
            .lock()
            .logs
            .iter()
            .filter(|l| &l.enrollment_id == enrollment_id && &l.step_id == step_id)
            .cloned()
            .collect();
        logs.sort_by_key(|l| l.sent_at);
        Ok(logs)
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
