// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fixed-size pool of delivery workers draining the job queue

use crate::queue::JobQueue;
use crate::worker::DeliveryWorker;
use cadence_adapters::{InteractionStore, MessageSender};
use cadence_core::{Clock, IdGen, TaskScheduler};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub concurrency: usize,
    /// Longest an idle worker waits before polling the queue again
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl PoolConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    shutdown: watch::Sender<bool>,
}

impl WorkerPool {
    /// Spawn `config.concurrency` workers (at least one)
    pub fn start<M, L, C, I, S>(
        worker: DeliveryWorker<M, L, C, I, S>,
        queue: JobQueue<C>,
        config: &PoolConfig,
    ) -> Self
    where
        M: MessageSender,
        L: InteractionStore,
        C: Clock,
        I: IdGen,
        S: TaskScheduler,
    {
        let (shutdown, stop) = watch::channel(false);
        let handles = (0..config.concurrency.max(1))
            .map(|index| {
                tokio::spawn(run_worker(
                    index,
                    worker.clone(),
                    queue.clone(),
                    config.poll_interval,
                    stop.clone(),
                ))
            })
            .collect::<Vec<_>>();
        tracing::info!(workers = handles.len(), "worker pool started");
        Self { handles, shutdown }
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Stop taking new jobs and wait for in-flight deliveries to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "delivery worker ended abnormally");
            }
        }
        tracing::info!("worker pool stopped");
    }
}

async fn run_worker<M, L, C, I, S>(
    index: usize,
    worker: DeliveryWorker<M, L, C, I, S>,
    queue: JobQueue<C>,
    poll_interval: Duration,
    mut stop: watch::Receiver<bool>,
) where
    M: MessageSender,
    L: InteractionStore,
    C: Clock,
    I: IdGen,
    S: TaskScheduler,
{
    tracing::debug!(worker = index, "delivery worker started");
    loop {
        if *stop.borrow() {
            break;
        }
        let claimed = tokio::select! {
            _ = stop.changed() => break,
            job = queue.next_job(poll_interval) => job,
        };
        if let Some(job) = claimed {
            worker.process(&queue, job).await;
        }
    }
    tracing::debug!(worker = index, "delivery worker stopped");
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
