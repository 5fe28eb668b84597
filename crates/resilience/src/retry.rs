// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retry executor with exponential backoff and jitter

use cadence_core::{Error, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Backoff policy for retried calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    pub backoff_multiplier: f64,
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    /// Scale each delay by a random factor in `[0.5, 1.0]`
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay after failed attempt `attempt` (1-based), before jitter:
    /// `min(base * multiplier^(attempt-1), max)`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let nanos = self.base_delay.as_nanos() as f64 * self.backoff_multiplier.powi(exp);
        if !nanos.is_finite() || nanos >= self.max_delay.as_nanos() as f64 {
            return self.max_delay;
        }
        Duration::from_nanos(nanos.max(0.0) as u64)
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.backoff(attempt);
        if self.jitter {
            let factor: f64 = rand::thread_rng().gen_range(0.5..=1.0);
            delay.mul_f64(factor)
        } else {
            delay
        }
    }
}

/// Structured result of [`RetryExecutor::run_collecting`]
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOutcome<T> {
    pub success: bool,
    pub result: Option<T>,
    pub error: Option<Error>,
    pub attempts: u32,
    pub total_duration: Duration,
}

type Predicate = Arc<dyn Fn(&Error) -> bool + Send + Sync>;
type RetryHook = Arc<dyn Fn(u32, &Error) + Send + Sync>;

/// Runs a fallible async operation with bounded retries
#[derive(Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
    is_retryable: Predicate,
    on_retry: Option<RetryHook>,
}

impl std::fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("config", &self.config)
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl RetryExecutor {
    /// An executor that retries whatever [`Error::is_retryable`] accepts
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            is_retryable: Arc::new(Error::is_retryable),
            on_retry: None,
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Replace the retryability predicate
    pub fn with_predicate(mut self, f: impl Fn(&Error) -> bool + Send + Sync + 'static) -> Self {
        self.is_retryable = Arc::new(f);
        self
    }

    /// Hook called with the failed attempt number and its error, after the
    /// backoff sleep and before the next attempt
    pub fn on_retry(mut self, f: impl Fn(u32, &Error) + Send + Sync + 'static) -> Self {
        self.on_retry = Some(Arc::new(f));
        self
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or
    /// runs out of attempts; the last error is returned
    pub async fn run<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.attempt(op).await.0
    }

    /// Like [`run`](Self::run) but never fails; reports attempts and
    /// elapsed time alongside the result
    pub async fn run_collecting<T, F, Fut>(&self, op: F) -> RetryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let start = Instant::now();
        let (result, attempts) = self.attempt(op).await;
        let total_duration = start.elapsed();
        match result {
            Ok(value) => RetryOutcome {
                success: true,
                result: Some(value),
                error: None,
                attempts,
                total_duration,
            },
            Err(e) => RetryOutcome {
                success: false,
                result: None,
                error: Some(e),
                attempts,
                total_duration,
            },
        }
    }

    /// Wrap `op` into a reusable retrying function
    pub fn wrap<F>(&self, op: F) -> Retrying<F> {
        Retrying {
            executor: self.clone(),
            op,
        }
    }

    async fn attempt<T, F, Fut>(&self, mut op: F) -> (Result<T>, u32)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let err = match op().await {
                Ok(value) => return (Ok(value), attempt),
                Err(e) => e,
            };
            if !(self.is_retryable)(&err) {
                tracing::debug!(attempt, error = %err, "non-retryable failure");
                return (Err(err), attempt);
            }
            if attempt >= max_attempts {
                tracing::debug!(attempt, error = %err, "retries exhausted");
                return (Err(err), attempt);
            }
            let delay = self.config.delay_for(attempt);
            tracing::debug!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retrying after failure"
            );
            tokio::time::sleep(delay).await;
            if let Some(hook) = &self.on_retry {
                hook(attempt, &err);
            }
            attempt += 1;
        }
    }
}

/// A function wrapped by [`RetryExecutor::wrap`]
#[derive(Debug, Clone)]
pub struct Retrying<F> {
    executor: RetryExecutor,
    op: F,
}

impl<F> Retrying<F> {
    pub async fn call<T, Fut>(&self) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.executor.run(&self.op).await
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
