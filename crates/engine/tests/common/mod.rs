// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared harness for engine integration tests

#![allow(dead_code)]

use cadence_adapters::FakeSender;
use cadence_core::{
    Enrollment, FakeClock, FakeScheduler, Program, ProgramId, QueueConfig, SequentialIdGen, Step,
    StepId, Subject, SubjectId, TriggerType,
};
use cadence_engine::{JobQueue, Runtime, RuntimeConfig, RuntimeDeps};
use cadence_storage::MemoryStore;
use chrono::{DateTime, TimeZone, Utc};
use std::time::Duration;

pub type TestRuntime =
    Runtime<FakeSender, MemoryStore, MemoryStore, FakeClock, SequentialIdGen, FakeScheduler>;

pub struct Harness {
    pub runtime: TestRuntime,
    pub sender: FakeSender,
    pub store: MemoryStore,
    pub clock: FakeClock,
    pub scheduler: FakeScheduler,
}

/// Monday 2026-05-04 09:00 UTC
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 4, 9, 0, 0).unwrap()
}

pub fn step(id: &str, order: u32, trigger_type: TriggerType, trigger_value: &str) -> Step {
    Step {
        id: StepId::new(id),
        program_id: ProgramId::new("prog-1"),
        order,
        trigger_type,
        trigger_value: trigger_value.to_string(),
        message_type: "text".to_string(),
        payload: serde_json::json!({ "text": format!("step {id}") }),
        requires_feedback: false,
        feedback: None,
    }
}

pub fn enrollment(id: &str, total_steps: u32) -> Enrollment {
    Enrollment::new(id, "sub-1", "prog-1", total_steps, t0()).activate()
}

pub fn harness(steps: Vec<Step>, enrollments: Vec<Enrollment>, config: RuntimeConfig) -> Harness {
    harness_at(t0(), steps, enrollments, config)
}

pub fn harness_at(
    now: DateTime<Utc>,
    steps: Vec<Step>,
    enrollments: Vec<Enrollment>,
    config: RuntimeConfig,
) -> Harness {
    let clock = FakeClock::at(now);
    let sender = FakeSender::new();
    let scheduler = FakeScheduler::new();
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

    let deps = RuntimeDeps {
        sender: sender.clone(),
        enrollments: store.clone(),
        logs: store.clone(),
        queue: JobQueue::new(QueueConfig::default(), clock.clone()),
    };
    let runtime = Runtime::new(
        deps,
        clock.clone(),
        SequentialIdGen::new("log"),
        scheduler.clone(),
        config,
    );
    Harness {
        runtime,
        sender,
        store,
        clock,
        scheduler,
    }
}

/// Poll `cond` until it holds, failing the test after five seconds
pub async fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {what}");
}
