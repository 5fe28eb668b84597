// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! cadence-core: data model and pure state machines for cadence
//!
//! This crate provides:
//! - Enrollment, step, delivery-job and interaction-log types
//! - Trigger evaluation (`immediate`, `delay`, `scheduled`) and cron parsing
//! - The job-queue state machine
//! - The tagged error type shared by every crate
//! - Clock, id generation and periodic-task scheduling capabilities

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod clock;
pub mod cron;
pub mod enrollment;
pub mod error;
pub mod id;
pub mod interaction;
pub mod job;
pub mod queue;
pub mod schedule;
pub mod step;

pub use clock::{Clock, FakeClock, SystemClock};
pub use cron::CronExpr;
pub use enrollment::{adherence_rate, Enrollment, EnrollmentStatus, Program, Subject};
pub use error::{Error, ErrorKind, Result};
pub use id::{
    EnrollmentId, IdGen, JobId, LogId, ProgramId, ScheduleId, SequentialIdGen, StepId, SubjectId,
    UuidIdGen,
};
pub use interaction::{InteractionLog, InteractionStatus};
pub use job::{dispatch_key, DeliveryJob, JobPriority, JobState, QueuedJob};
pub use queue::{
    time_after, Enqueued, FailureOutcome, JobQueueState, QueueConfig, QueueStats,
    RecurringSchedule,
};
pub use schedule::{periodic, PeriodicTask, ScheduleHandle, TaskFuture, TaskScheduler, TokioScheduler};
pub use step::{parse_clock_time, parse_delay_ms, parse_utc_offset, FeedbackSpec, Step, TriggerType};

#[cfg(any(test, feature = "test-support"))]
pub use schedule::FakeScheduler;
