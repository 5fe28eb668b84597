// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Delivery worker
//!
//! One delivery attempt: write a `sent` audit row, send through
//! health → circuit breaker → retry, then record the outcome. Audit
//! writes are best-effort and never change the delivery result.

use crate::queue::JobQueue;
use cadence_adapters::{InteractionStore, MessageSender, SendReceipt};
use cadence_core::{
    Clock, DeliveryJob, Error, FailureOutcome, IdGen, InteractionLog, LogId, QueuedJob,
    TaskScheduler,
};
use cadence_resilience::{HealthRegistry, RetryExecutor};

/// Result of one delivery attempt
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryOutcome {
    pub success: bool,
    pub log_id: LogId,
    pub external_message_id: Option<String>,
    pub error: Option<Error>,
    /// Whether the queue should try the job again
    pub retryable: bool,
}

/// Sends jobs through the resilience stack and records outcomes
pub struct DeliveryWorker<M, L, C: Clock, I, S: TaskScheduler> {
    sender: M,
    logs: L,
    clock: C,
    ids: I,
    health: HealthRegistry<C, S>,
    retry: RetryExecutor,
    dependency: String,
}

impl<M: Clone, L: Clone, C: Clock, I: Clone, S: TaskScheduler> Clone
    for DeliveryWorker<M, L, C, I, S>
{
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            logs: self.logs.clone(),
            clock: self.clock.clone(),
            ids: self.ids.clone(),
            health: self.health.clone(),
            retry: self.retry.clone(),
            dependency: self.dependency.clone(),
        }
    }
}

impl<M, L, C, I, S> DeliveryWorker<M, L, C, I, S>
where
    M: MessageSender,
    L: InteractionStore,
    C: Clock,
    I: IdGen,
    S: TaskScheduler,
{
    /// `dependency` names both the health entry and the circuit breaker
    /// guarding the sender
    pub fn new(
        sender: M,
        logs: L,
        clock: C,
        ids: I,
        health: HealthRegistry<C, S>,
        retry: RetryExecutor,
        dependency: impl Into<String>,
    ) -> Self {
        Self {
            sender,
            logs,
            clock,
            ids,
            health,
            retry,
            dependency: dependency.into(),
        }
    }

    pub fn dependency(&self) -> &str {
        &self.dependency
    }

    /// Attempt delivery of `job` once, at the job level
    pub async fn deliver(&self, job: &DeliveryJob) -> DeliveryOutcome {
        let log_id = LogId::new(self.ids.next());
        let mut log = InteractionLog::sent(log_id.clone(), job, self.clock.utc_now());
        if let Err(e) = self.logs.create_log(&log).await {
            tracing::warn!(log_id = %log_id, error = %e, "failed to create interaction log");
        }

        let result = if job.requires_feedback && job.feedback.is_none() {
            Err(Error::validation(format!(
                "step {} requires feedback but the job carries no feedback spec",
                job.step_id
            )))
        } else {
            self.send(job).await
        };

        match result {
            Ok(receipt) => {
                log.mark_delivered(self.clock.utc_now(), receipt.message_id.clone());
                self.audit(&log).await;
                tracing::info!(
                    log_id = %log_id,
                    enrollment_id = %job.enrollment_id,
                    step_id = %job.step_id,
                    "message delivered"
                );
                DeliveryOutcome {
                    success: true,
                    log_id,
                    external_message_id: receipt.message_id,
                    error: None,
                    retryable: false,
                }
            }
            Err(e) => {
                log.mark_failed(e.to_string());
                self.audit(&log).await;
                let retryable = e.is_retryable();
                tracing::warn!(
                    log_id = %log_id,
                    enrollment_id = %job.enrollment_id,
                    step_id = %job.step_id,
                    retryable,
                    error = %e,
                    "delivery failed"
                );
                DeliveryOutcome {
                    success: false,
                    log_id,
                    external_message_id: None,
                    error: Some(e),
                    retryable,
                }
            }
        }
    }

    async fn send(&self, job: &DeliveryJob) -> cadence_core::Result<SendReceipt> {
        let sender = &self.sender;
        let retry = &self.retry;
        self.health
            .execute_with_degradation(
                &self.dependency,
                move || async move {
                    retry
                        .run(move || sender.send(&job.subject_id, &job.message_type, &job.content))
                        .await
                },
                None,
            )
            .await
    }

    async fn audit(&self, log: &InteractionLog) {
        if let Err(e) = self.logs.update_log(log).await {
            tracing::warn!(log_id = %log.id, error = %e, "failed to update interaction log");
        }
    }

    /// Deliver a claimed job and acknowledge it to the queue
    pub async fn process(&self, queue: &JobQueue<C>, queued: QueuedJob) -> DeliveryOutcome {
        let outcome = self.deliver(&queued.job).await;
        if outcome.success {
            if let Err(e) = queue.ack_success(&queued.id) {
                tracing::warn!(job_id = %queued.id, error = %e, "failed to acknowledge job");
            }
            return outcome;
        }

        let message = outcome
            .error
            .as_ref()
            .map_or_else(|| "unknown error".to_string(), ToString::to_string);
        match queue.ack_failure(&queued.id, &message, outcome.retryable) {
            Ok(FailureOutcome::Retrying { attempt, retry_at }) => {
                tracing::info!(job_id = %queued.id, attempt, %retry_at, "job will be retried");
            }
            Ok(FailureOutcome::Failed { attempts }) => {
                tracing::warn!(job_id = %queued.id, attempts, "job failed");
            }
            Err(e) => {
                tracing::warn!(job_id = %queued.id, error = %e, "failed to acknowledge job");
            }
        }
        outcome
    }

    /// Claim and process one job; `None` when nothing is runnable
    pub async fn process_next(&self, queue: &JobQueue<C>) -> Option<DeliveryOutcome> {
        let queued = queue.dequeue()?;
        Some(self.process(queue, queued).await)
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
