// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fixtures shared by the engine's unit tests

use crate::queue::JobQueue;
use crate::worker::DeliveryWorker;
use cadence_adapters::FakeSender;
use cadence_core::{
    Enrollment, FakeClock, FakeScheduler, FeedbackSpec, Program, ProgramId, QueueConfig,
    SequentialIdGen, Step, StepId, Subject, SubjectId, TriggerType,
};
use cadence_resilience::{
    CircuitBreakerRegistry, CircuitConfig, HealthRegistry, RetryConfig, RetryExecutor,
};
use cadence_storage::MemoryStore;
use chrono::{DateTime, TimeZone, Utc};
use std::time::Duration;

pub type TestWorker =
    DeliveryWorker<FakeSender, MemoryStore, FakeClock, SequentialIdGen, FakeScheduler>;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 4, 9, 0, 0).unwrap()
}

pub fn clock() -> FakeClock {
    FakeClock::at(t0())
}

pub fn step(id: &str, order: u32, trigger_type: TriggerType, trigger_value: &str) -> Step {
    Step {
        id: StepId::new(id),
        program_id: ProgramId::new("prog-1"),
        order,
        trigger_type,
        trigger_value: trigger_value.to_string(),
        message_type: "text".to_string(),
        payload: serde_json::json!({ "text": id }),
        requires_feedback: false,
        feedback: None,
    }
}

pub fn feedback_step(id: &str, order: u32, trigger_type: TriggerType, trigger_value: &str) -> Step {
    Step {
        requires_feedback: true,
        feedback: Some(FeedbackSpec {
            prompt: "How did it go?".to_string(),
            choices: vec!["good".to_string(), "bad".to_string()],
        }),
        ..step(id, order, trigger_type, trigger_value)
    }
}

pub fn enrollment(id: &str, total_steps: u32) -> Enrollment {
    Enrollment::new(id, "sub-1", "prog-1", total_steps, t0()).activate()
}

/// A store with one active subject (`sub-1`) and program (`prog-1`)
pub fn store_with(steps: Vec<Step>, enrollments: Vec<Enrollment>) -> MemoryStore {
    let store = MemoryStore::new();
    store.put_subject(Subject {
        id: SubjectId::new("sub-1"),
        display_name: "Ada".to_string(),
        active: true,
    });
    store.put_program(Program {
        id: ProgramId::new("prog-1"),
        name: "Onboarding".to_string(),
        active: true,
    });
    for step in steps {
        store.put_step(step);
    }
    for enrollment in enrollments {
        store.put_enrollment(enrollment);
    }
    store
}

pub fn queue(clock: &FakeClock) -> JobQueue<FakeClock> {
    JobQueue::new(QueueConfig::default(), clock.clone())
}

pub fn health(clock: &FakeClock) -> HealthRegistry<FakeClock, FakeScheduler> {
    let breakers = CircuitBreakerRegistry::new(CircuitConfig::default(), clock.clone());
    HealthRegistry::new(clock.clone(), FakeScheduler::new(), breakers)
}

/// Three attempts, 10ms apart, no jitter
pub fn retry() -> RetryExecutor {
    RetryExecutor::new(
        RetryConfig::default()
            .with_base_delay(Duration::from_millis(10))
            .with_jitter(false),
    )
}

pub fn worker(
    sender: &FakeSender,
    store: &MemoryStore,
    clock: &FakeClock,
    health: &HealthRegistry<FakeClock, FakeScheduler>,
) -> TestWorker {
    DeliveryWorker::new(
        sender.clone(),
        store.clone(),
        clock.clone(),
        SequentialIdGen::new("log"),
        health.clone(),
        retry(),
        "messaging",
    )
}
