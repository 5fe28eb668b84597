// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime: wires the components together and drives them on timers
//!
//! Timers (via the [`TaskScheduler`]):
//! - `evaluator`: reclaim stalled jobs, then run a trigger-evaluation tick
//! - `maintenance`: housekeeping
//! - `failed-sweep`: re-submit failed deliveries
//! - `health:<dependency>`: sender health check, owned by the health registry

use crate::evaluator::TriggerEvaluator;
use crate::maintenance::{Maintenance, MaintenanceConfig};
use crate::ops::Ops;
use crate::pool::{PoolConfig, WorkerPool};
use crate::progress::ResponseRecorder;
use crate::queue::JobQueue;
use crate::sweep::{FailedDeliverySweep, SweepConfig};
use crate::worker::DeliveryWorker;
use cadence_adapters::{EnrollmentStore, InteractionStore, MessageSender};
use cadence_core::{periodic, Clock, IdGen, ScheduleHandle, TaskScheduler};
use cadence_resilience::{
    health_check, CircuitBreakerRegistry, CircuitConfig, HealthConfig, HealthRegistry,
    RetryConfig, RetryExecutor,
};
use chrono::{FixedOffset, Offset, Utc};
use std::sync::Mutex;
use std::time::Duration;

pub const EVALUATOR_TIMER: &str = "evaluator";
pub const MAINTENANCE_TIMER: &str = "maintenance";
pub const SWEEP_TIMER: &str = "failed-sweep";

/// Runtime timing and policy configuration
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub tick_interval: Duration,
    pub maintenance_interval: Duration,
    pub failed_sweep_interval: Duration,
    /// Zone `scheduled` trigger times are read in
    pub utc_offset: FixedOffset,
    /// Health and circuit-breaker name of the message sender
    pub dependency: String,
    pub pool: PoolConfig,
    pub sweep: SweepConfig,
    pub maintenance: MaintenanceConfig,
    pub retry: RetryConfig,
    pub circuit: CircuitConfig,
    pub health: HealthConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
            maintenance_interval: Duration::from_secs(60 * 60),
            failed_sweep_interval: Duration::from_secs(15 * 60),
            utc_offset: Utc.fix(),
            dependency: "messaging".to_string(),
            pool: PoolConfig::default(),
            sweep: SweepConfig::default(),
            maintenance: MaintenanceConfig::default(),
            retry: RetryConfig::default(),
            circuit: CircuitConfig::default(),
            health: HealthConfig::default(),
        }
    }
}

/// Runtime adapter dependencies
pub struct RuntimeDeps<M, E, L, C: Clock> {
    pub sender: M,
    pub enrollments: E,
    pub logs: L,
    pub queue: JobQueue<C>,
}

/// Runtime that coordinates the system
pub struct Runtime<M, E: EnrollmentStore, L, C: Clock, I, S: TaskScheduler> {
    config: RuntimeConfig,
    sender: M,
    scheduler: S,
    queue: JobQueue<C>,
    health: HealthRegistry<C, S>,
    evaluator: TriggerEvaluator<E, C>,
    worker: DeliveryWorker<M, L, C, I, S>,
    responses: ResponseRecorder<E, L, C>,
    sweep: FailedDeliverySweep<E, L, C>,
    maintenance: Maintenance<E, L, C>,
    ops: Ops<E, L, C, S>,
    timers: Mutex<Vec<ScheduleHandle>>,
    pool: Mutex<Option<WorkerPool>>,
}

impl<M, E, L, C, I, S> Runtime<M, E, L, C, I, S>
where
    M: MessageSender,
    E: EnrollmentStore,
    L: InteractionStore,
    C: Clock,
    I: IdGen,
    S: TaskScheduler,
{
    pub fn new(
        deps: RuntimeDeps<M, E, L, C>,
        clock: C,
        ids: I,
        scheduler: S,
        config: RuntimeConfig,
    ) -> Self {
        let RuntimeDeps {
            sender,
            enrollments,
            logs,
            queue,
        } = deps;
        let breakers = CircuitBreakerRegistry::new(config.circuit.clone(), clock.clone());
        let health = HealthRegistry::new(clock.clone(), scheduler.clone(), breakers);
        let retry = RetryExecutor::new(config.retry.clone());

        let evaluator = TriggerEvaluator::new(
            enrollments.clone(),
            queue.clone(),
            clock.clone(),
            config.utc_offset,
        );
        let worker = DeliveryWorker::new(
            sender.clone(),
            logs.clone(),
            clock.clone(),
            ids,
            health.clone(),
            retry,
            config.dependency.clone(),
        );
        let responses = ResponseRecorder::new(enrollments.clone(), logs.clone(), clock.clone());
        let sweep = FailedDeliverySweep::new(
            enrollments.clone(),
            logs.clone(),
            queue.clone(),
            clock.clone(),
            config.sweep.clone(),
        );
        let maintenance = Maintenance::new(
            enrollments,
            logs,
            queue.clone(),
            clock.clone(),
            config.maintenance.clone(),
        );
        let ops = Ops::new(queue.clone(), health.clone(), sweep.clone(), clock);

        Self {
            config,
            sender,
            scheduler,
            queue,
            health,
            evaluator,
            worker,
            responses,
            sweep,
            maintenance,
            ops,
            timers: Mutex::new(Vec::new()),
            pool: Mutex::new(None),
        }
    }

    /// Register the sender's health check, start the timers and spawn the
    /// worker pool. Calling it again while running does nothing.
    pub fn start(&self) {
        let mut pool = self.pool.lock().unwrap_or_else(|e| e.into_inner());
        if pool.is_some() {
            return;
        }

        let sender = self.sender.clone();
        self.health.register(
            &self.config.dependency,
            health_check(move || {
                let sender = sender.clone();
                async move { sender.ping().await }
            }),
            None,
            self.config.health.clone(),
        );

        let queue = self.queue.clone();
        let evaluator = self.evaluator.clone();
        let tick = periodic(move || {
            let queue = queue.clone();
            let evaluator = evaluator.clone();
            async move {
                for (job_id, outcome) in queue.reclaim_stalled() {
                    tracing::warn!(job_id = %job_id, ?outcome, "reclaimed stalled job");
                }
                if let Err(e) = evaluator.tick().await {
                    tracing::error!(error = %e, "evaluator tick failed");
                }
            }
        });

        let maintenance = self.maintenance.clone();
        let housekeeping = periodic(move || {
            let maintenance = maintenance.clone();
            async move {
                if let Err(e) = maintenance.run().await {
                    tracing::error!(error = %e, "maintenance failed");
                }
            }
        });

        let sweep = self.sweep.clone();
        let resubmit = periodic(move || {
            let sweep = sweep.clone();
            async move {
                if let Err(e) = sweep.run().await {
                    tracing::error!(error = %e, "failed-delivery sweep failed");
                }
            }
        });

        let mut timers = self.timers.lock().unwrap_or_else(|e| e.into_inner());
        timers.push(
            self.scheduler
                .schedule(EVALUATOR_TIMER, self.config.tick_interval, tick),
        );
        timers.push(self.scheduler.schedule(
            MAINTENANCE_TIMER,
            self.config.maintenance_interval,
            housekeeping,
        ));
        timers.push(self.scheduler.schedule(
            SWEEP_TIMER,
            self.config.failed_sweep_interval,
            resubmit,
        ));

        *pool = Some(WorkerPool::start(
            self.worker.clone(),
            self.queue.clone(),
            &self.config.pool,
        ));
        tracing::info!(
            tick_interval_ms = self.config.tick_interval.as_millis() as u64,
            workers = self.config.pool.concurrency,
            "runtime started"
        );
    }

    /// Stop timers and health checks, let workers finish their current
    /// job, then write a final queue snapshot
    pub async fn shutdown(&self) {
        for timer in self
            .timers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
        {
            timer.cancel();
        }
        self.health.shutdown();

        let pool = self.pool.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(pool) = pool {
            pool.shutdown().await;
        }
        if let Err(e) = self.queue.flush() {
            tracing::error!(error = %e, "failed to write final queue snapshot");
        }
        tracing::info!("runtime stopped");
    }

    pub fn is_running(&self) -> bool {
        self.pool
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn queue(&self) -> &JobQueue<C> {
        &self.queue
    }

    pub fn health(&self) -> &HealthRegistry<C, S> {
        &self.health
    }

    pub fn evaluator(&self) -> &TriggerEvaluator<E, C> {
        &self.evaluator
    }

    pub fn worker(&self) -> &DeliveryWorker<M, L, C, I, S> {
        &self.worker
    }

    pub fn responses(&self) -> &ResponseRecorder<E, L, C> {
        &self.responses
    }

    pub fn sweep(&self) -> &FailedDeliverySweep<E, L, C> {
        &self.sweep
    }

    pub fn maintenance(&self) -> &Maintenance<E, L, C> {
        &self.maintenance
    }

    pub fn ops(&self) -> &Ops<E, L, C, S> {
        &self.ops
    }
}
