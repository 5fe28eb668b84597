// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! cadence delivery engine
//!
//! Trigger evaluation, the async job queue, the delivery worker pool and
//! the periodic jobs around them (failed-delivery sweep, maintenance).

mod evaluator;
mod maintenance;
mod ops;
mod pool;
mod progress;
mod queue;
mod runtime;
mod sweep;
#[cfg(test)]
mod testing;
mod worker;

pub use evaluator::{TickReport, TriggerEvaluator};
pub use maintenance::{Maintenance, MaintenanceConfig, MaintenanceReport};
pub use ops::{Ops, OpsReport};
pub use pool::{PoolConfig, WorkerPool};
pub use progress::{
    update_enrollment, ResponseOutcome, ResponseRecorder, ResponseRef, MAX_UPDATE_ATTEMPTS,
};
pub use queue::JobQueue;
pub use runtime::{
    Runtime, RuntimeConfig, RuntimeDeps, EVALUATOR_TIMER, MAINTENANCE_TIMER, SWEEP_TIMER,
};
pub use sweep::{FailedDeliverySweep, SweepConfig, SweepReport};
pub use worker::{DeliveryOutcome, DeliveryWorker};
