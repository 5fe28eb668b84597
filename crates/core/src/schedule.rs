// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic task scheduling capability
//!
//! Evaluator ticks, maintenance, failed-delivery sweeps and health checks
//! all run through a [`TaskScheduler`], so tests can fire them by hand.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{Instant, MissedTickBehavior};

pub type TaskFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A task run on every tick
pub type PeriodicTask = Arc<dyn Fn() -> TaskFuture + Send + Sync>;

/// Wrap an async closure as a [`PeriodicTask`]
pub fn periodic<F, Fut>(f: F) -> PeriodicTask
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move || Box::pin(f()) as TaskFuture)
}

/// Cancels a scheduled task. Dropping the handle does not cancel.
#[derive(Debug, Clone)]
pub struct ScheduleHandle {
    name: String,
    cancelled: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl ScheduleHandle {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            cancelled: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop further runs; a run in progress finishes
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Runs tasks at a fixed interval until cancelled
pub trait TaskScheduler: Clone + Send + Sync + 'static {
    fn schedule(&self, name: &str, interval: Duration, task: PeriodicTask) -> ScheduleHandle;
}

/// Scheduler backed by tokio timers. The first run happens one interval
/// after scheduling; a run that overruns delays the next tick. Each run is
/// its own tokio task, so a run that panics is logged and the next tick
/// still fires.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioScheduler;

impl TaskScheduler for TokioScheduler {
    fn schedule(&self, name: &str, interval: Duration, task: PeriodicTask) -> ScheduleHandle {
        let handle = ScheduleHandle::new(name);
        let loop_handle = handle.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = loop_handle.wake.notified() => {}
                    _ = ticker.tick() => {
                        if !loop_handle.is_cancelled() {
                            // a panicking run must not end the timer
                            if let Err(e) = tokio::spawn((task)()).await {
                                tracing::error!(
                                    task = %loop_handle.name,
                                    error = %e,
                                    "periodic task run aborted"
                                );
                            }
                        }
                    }
                }
                if loop_handle.is_cancelled() {
                    break;
                }
            }
            tracing::debug!(task = %loop_handle.name, "periodic task stopped");
        });
        tracing::debug!(task = %name, interval_ms = interval.as_millis() as u64, "periodic task scheduled");
        handle
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use std::sync::Mutex;

    struct Entry {
        interval: Duration,
        task: PeriodicTask,
        handle: ScheduleHandle,
    }

    /// Scheduler that only runs tasks when told to
    #[derive(Clone, Default)]
    pub struct FakeScheduler {
        entries: Arc<Mutex<Vec<Entry>>>,
    }

    impl FakeScheduler {
        pub fn new() -> Self {
            Self::default()
        }

        /// Run every live task registered under `name` once; returns how
        /// many ran
        pub async fn fire(&self, name: &str) -> usize {
            let tasks: Vec<PeriodicTask> = {
                let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
                entries
                    .iter()
                    .filter(|e| e.handle.name() == name && !e.handle.is_cancelled())
                    .map(|e| e.task.clone())
                    .collect()
            };
            for task in &tasks {
                (task)().await;
            }
            tasks.len()
        }

        /// Names and intervals of live tasks, in registration order
        pub fn scheduled(&self) -> Vec<(String, Duration)> {
            let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            entries
                .iter()
                .filter(|e| !e.handle.is_cancelled())
                .map(|e| (e.handle.name().to_string(), e.interval))
                .collect()
        }
    }

    impl TaskScheduler for FakeScheduler {
        fn schedule(&self, name: &str, interval: Duration, task: PeriodicTask) -> ScheduleHandle {
            let handle = ScheduleHandle::new(name);
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            entries.push(Entry {
                interval,
                task,
                handle: handle.clone(),
            });
            handle
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeScheduler;

#[cfg(test)]
#[path = "schedule_tests.rs"]
mod tests;
