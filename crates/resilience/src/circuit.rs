// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Circuit breaker and per-dependency registry
//!
//! `CLOSED -> OPEN` after `failure_threshold` consecutive failures.
//! `OPEN -> HALF_OPEN` on the first call at or after `next_retry_at`.
//! `HALF_OPEN -> CLOSED` after `half_open_max_calls` successful probes;
//! any probe failure reopens the circuit. Calls refused while open never
//! reach the wrapped operation.

use cadence_core::{Clock, Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitStatus {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitStatus::Closed => write!(f, "CLOSED"),
            CircuitStatus::Open => write!(f, "OPEN"),
            CircuitStatus::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitConfig {
    pub failure_threshold: u32,
    #[serde(with = "humantime_serde")]
    pub recovery_timeout: Duration,
    pub half_open_max_calls: u32,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            half_open_max_calls: 3,
        }
    }
}

impl CircuitConfig {
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = timeout;
        self
    }

    pub fn with_half_open_max_calls(mut self, calls: u32) -> Self {
        self.half_open_max_calls = calls;
        self
    }
}

/// Per-breaker settings that replace the registry defaults
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CircuitOverrides {
    pub failure_threshold: Option<u32>,
    pub recovery_timeout: Option<Duration>,
    pub half_open_max_calls: Option<u32>,
}

impl CircuitOverrides {
    pub fn apply(&self, base: &CircuitConfig) -> CircuitConfig {
        CircuitConfig {
            failure_threshold: self.failure_threshold.unwrap_or(base.failure_threshold),
            recovery_timeout: self.recovery_timeout.unwrap_or(base.recovery_timeout),
            half_open_max_calls: self.half_open_max_calls.unwrap_or(base.half_open_max_calls),
        }
    }
}

/// Point-in-time view of a breaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitState {
    pub state: CircuitStatus,
    pub failure_count: u32,
    pub success_count: u64,
    pub total_calls: u64,
    /// Calls refused without invoking the operation
    pub rejected_calls: u64,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub half_open_calls_made: u32,
    /// Held open by an operator until reset
    pub forced_open: bool,
}

#[derive(Debug)]
struct Inner {
    status: CircuitStatus,
    failure_count: u32,
    success_count: u64,
    total_calls: u64,
    rejected_calls: u64,
    last_failure_at: Option<DateTime<Utc>>,
    next_retry_at: Option<Instant>,
    next_retry_utc: Option<DateTime<Utc>>,
    half_open_calls_made: u32,
    half_open_successes: u32,
    forced_open: bool,
}

impl Inner {
    fn closed() -> Self {
        Self {
            status: CircuitStatus::Closed,
            failure_count: 0,
            success_count: 0,
            total_calls: 0,
            rejected_calls: 0,
            last_failure_at: None,
            next_retry_at: None,
            next_retry_utc: None,
            half_open_calls_made: 0,
            half_open_successes: 0,
            forced_open: false,
        }
    }
}

/// Failure-isolation state machine for one dependency
#[derive(Clone)]
pub struct CircuitBreaker<C: Clock> {
    name: Arc<str>,
    config: CircuitConfig,
    clock: C,
    inner: Arc<Mutex<Inner>>,
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish()
    }
}

impl<C: Clock> CircuitBreaker<C> {
    pub fn new(name: &str, config: CircuitConfig, clock: C) -> Self {
        Self {
            name: Arc::from(name),
            config,
            clock,
            inner: Arc::new(Mutex::new(Inner::closed())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitConfig {
        &self.config
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run `op` if the circuit admits a call, recording its outcome
    pub async fn execute<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.try_acquire()?;
        match op().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(e) => {
                self.record_failure();
                Err(e)
            }
        }
    }

    /// Admit or refuse one call. Moves `OPEN -> HALF_OPEN` once the
    /// recovery timeout has passed.
    pub fn try_acquire(&self) -> Result<()> {
        let now = self.clock.now();
        let mut inner = self.lock();
        if inner.status == CircuitStatus::Open {
            let ready = !inner.forced_open && inner.next_retry_at.is_some_and(|at| now >= at);
            if !ready {
                inner.rejected_calls += 1;
                return Err(Error::circuit_open(&self.name));
            }
            inner.status = CircuitStatus::HalfOpen;
            inner.half_open_calls_made = 0;
            inner.half_open_successes = 0;
            tracing::info!(circuit = %self.name, "circuit half-open, admitting probes");
        }
        if inner.status == CircuitStatus::HalfOpen {
            if inner.half_open_calls_made >= self.config.half_open_max_calls {
                inner.rejected_calls += 1;
                return Err(Error::circuit_open(&self.name));
            }
            inner.half_open_calls_made += 1;
        }
        Ok(())
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        inner.total_calls += 1;
        inner.success_count += 1;
        let status = inner.status;
        match status {
            CircuitStatus::Closed => inner.failure_count = 0,
            CircuitStatus::HalfOpen => {
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.half_open_max_calls {
                    inner.status = CircuitStatus::Closed;
                    inner.failure_count = 0;
                    inner.half_open_calls_made = 0;
                    inner.half_open_successes = 0;
                    inner.next_retry_at = None;
                    inner.next_retry_utc = None;
                    tracing::info!(circuit = %self.name, "circuit closed");
                }
            }
            CircuitStatus::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.total_calls += 1;
        inner.failure_count += 1;
        inner.last_failure_at = Some(self.clock.utc_now());
        let status = inner.status;
        match status {
            CircuitStatus::HalfOpen => self.open(&mut inner, "probe failed"),
            CircuitStatus::Closed if inner.failure_count >= self.config.failure_threshold => {
                self.open(&mut inner, "failure threshold reached")
            }
            _ => {}
        }
    }

    fn open(&self, inner: &mut Inner, reason: &str) {
        inner.status = CircuitStatus::Open;
        inner.next_retry_at = Some(self.clock.now() + self.config.recovery_timeout);
        inner.next_retry_utc = Some(cadence_core::time_after(
            self.clock.utc_now(),
            self.config.recovery_timeout,
        ));
        inner.half_open_calls_made = 0;
        inner.half_open_successes = 0;
        tracing::warn!(
            circuit = %self.name,
            failures = inner.failure_count,
            reason,
            "circuit opened"
        );
    }

    /// Whether calls are currently refused outright
    pub fn is_open(&self) -> bool {
        let now = self.clock.now();
        let inner = self.lock();
        inner.status == CircuitStatus::Open
            && (inner.forced_open || inner.next_retry_at.map_or(true, |at| now < at))
    }

    pub fn state(&self) -> CircuitState {
        let inner = self.lock();
        CircuitState {
            state: inner.status,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            total_calls: inner.total_calls,
            rejected_calls: inner.rejected_calls,
            last_failure_at: inner.last_failure_at,
            next_retry_at: inner.next_retry_utc,
            half_open_calls_made: inner.half_open_calls_made,
            forced_open: inner.forced_open,
        }
    }

    /// Force `CLOSED` and zero every counter
    pub fn reset(&self) {
        *self.lock() = Inner::closed();
        tracing::info!(circuit = %self.name, "circuit reset");
    }

    /// Hold the circuit open until [`reset`](Self::reset)
    pub fn force_open(&self) {
        let mut inner = self.lock();
        self.open(&mut inner, "forced open");
        inner.forced_open = true;
    }
}

/// Breakers keyed by dependency name, created on first use
#[derive(Clone)]
pub struct CircuitBreakerRegistry<C: Clock> {
    defaults: CircuitConfig,
    clock: C,
    breakers: Arc<Mutex<BTreeMap<String, CircuitBreaker<C>>>>,
}

impl<C: Clock> CircuitBreakerRegistry<C> {
    pub fn new(defaults: CircuitConfig, clock: C) -> Self {
        Self {
            defaults,
            clock,
            breakers: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, CircuitBreaker<C>>> {
        self.breakers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The breaker for `name`, created with the defaults if missing
    pub fn get(&self, name: &str) -> CircuitBreaker<C> {
        self.get_with(name, &CircuitOverrides::default())
    }

    /// The breaker for `name`, created with the defaults merged with
    /// `overrides` if missing. An existing breaker keeps its config.
    pub fn get_with(&self, name: &str, overrides: &CircuitOverrides) -> CircuitBreaker<C> {
        let mut breakers = self.lock();
        breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                CircuitBreaker::new(name, overrides.apply(&self.defaults), self.clock.clone())
            })
            .clone()
    }

    /// The breaker for `name` if one exists
    pub fn find(&self, name: &str) -> Option<CircuitBreaker<C>> {
        self.lock().get(name).cloned()
    }

    pub fn states(&self) -> BTreeMap<String, CircuitState> {
        self.lock()
            .iter()
            .map(|(name, breaker)| (name.clone(), breaker.state()))
            .collect()
    }

    pub fn reset(&self, name: &str) -> Result<()> {
        let breaker = self
            .find(name)
            .ok_or_else(|| Error::not_found("circuit", name))?;
        breaker.reset();
        Ok(())
    }

    pub fn reset_all(&self) {
        for breaker in self.lock().values() {
            breaker.reset();
        }
    }

    /// Force the named breaker open, creating it if needed
    pub fn force_open(&self, name: &str) {
        self.get(name).force_open();
    }
}

#[cfg(test)]
#[path = "circuit_tests.rs"]
mod tests;
