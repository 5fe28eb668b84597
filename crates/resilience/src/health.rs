// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dependency health tracking and graceful degradation
//!
//! Each registered dependency is probed on a timer. Health sits upstream
//! of the circuit breaker: an `UNAVAILABLE` dependency or an open breaker
//! short-circuits calls to the fallback without touching the dependency.

use crate::circuit::CircuitBreakerRegistry;
use cadence_core::{Clock, Error, Result, ScheduleHandle, TaskFuture, TaskScheduler};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unavailable,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "HEALTHY"),
            HealthStatus::Degraded => write!(f, "DEGRADED"),
            HealthStatus::Unavailable => write!(f, "UNAVAILABLE"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyHealth {
    pub status: HealthStatus,
    pub last_check_at: Option<DateTime<Utc>>,
    pub consecutive_errors: u32,
    pub last_response_time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl DependencyHealth {
    fn healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            last_check_at: None,
            consecutive_errors: 0,
            last_response_time_ms: None,
            last_error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    #[serde(with = "humantime_serde")]
    pub check_interval: Duration,
    /// Bound on a single health check
    #[serde(with = "humantime_serde")]
    pub check_timeout: Duration,
    /// Consecutive errors that make a dependency unavailable
    pub max_error_threshold: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(30),
            check_timeout: Duration::from_secs(5),
            max_error_threshold: 5,
        }
    }
}

impl HealthConfig {
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    pub fn with_check_timeout(mut self, timeout: Duration) -> Self {
        self.check_timeout = timeout;
        self
    }

    pub fn with_max_error_threshold(mut self, threshold: u32) -> Self {
        self.max_error_threshold = threshold;
        self
    }
}

/// Worst-of status across dependencies, with per-dependency detail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemHealth {
    pub status: HealthStatus,
    pub dependencies: BTreeMap<String, DependencyHealth>,
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

pub type HealthCheckFn = Arc<dyn Fn() -> BoxFuture<Result<()>> + Send + Sync>;
pub type FallbackFn = Arc<dyn Fn() -> BoxFuture<Result<serde_json::Value>> + Send + Sync>;

pub fn health_check<F, Fut>(f: F) -> HealthCheckFn
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move || Box::pin(f()) as BoxFuture<Result<()>>)
}

pub fn fallback_fn<F, Fut>(f: F) -> FallbackFn
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<serde_json::Value>> + Send + 'static,
{
    Arc::new(move || Box::pin(f()) as BoxFuture<Result<serde_json::Value>>)
}

struct Dependency {
    check: HealthCheckFn,
    fallback: Option<FallbackFn>,
    config: HealthConfig,
    health: DependencyHealth,
    timer: Option<ScheduleHandle>,
}

/// Tracks dependency health and routes calls to fallbacks
pub struct HealthRegistry<C: Clock, S: TaskScheduler> {
    clock: C,
    scheduler: S,
    breakers: CircuitBreakerRegistry<C>,
    deps: Arc<Mutex<BTreeMap<String, Dependency>>>,
}

impl<C: Clock, S: TaskScheduler> Clone for HealthRegistry<C, S> {
    fn clone(&self) -> Self {
        Self {
            clock: self.clock.clone(),
            scheduler: self.scheduler.clone(),
            breakers: self.breakers.clone(),
            deps: Arc::clone(&self.deps),
        }
    }
}

impl<C: Clock, S: TaskScheduler> HealthRegistry<C, S> {
    pub fn new(clock: C, scheduler: S, breakers: CircuitBreakerRegistry<C>) -> Self {
        Self {
            clock,
            scheduler,
            breakers,
            deps: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    pub fn breakers(&self) -> &CircuitBreakerRegistry<C> {
        &self.breakers
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Dependency>> {
        self.deps.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start tracking `name`, probing it every `check_interval`.
    /// Registering a name again replaces the previous registration.
    pub fn register(
        &self,
        name: &str,
        check: HealthCheckFn,
        fallback: Option<FallbackFn>,
        config: HealthConfig,
    ) {
        let registry = self.clone();
        let dep_name = name.to_string();
        let timer = self.scheduler.schedule(
            &format!("health:{name}"),
            config.check_interval,
            Arc::new(move || {
                let registry = registry.clone();
                let name = dep_name.clone();
                Box::pin(async move {
                    let _ = registry.run_check(&name).await;
                }) as TaskFuture
            }),
        );
        let previous = self.lock().insert(
            name.to_string(),
            Dependency {
                check,
                fallback,
                config,
                health: DependencyHealth::healthy(),
                timer: Some(timer),
            },
        );
        if let Some(timer) = previous.and_then(|p| p.timer) {
            timer.cancel();
        }
        tracing::info!(dependency = %name, "dependency registered");
    }

    /// Stop tracking `name` and cancel its timer
    pub fn deregister(&self, name: &str) -> bool {
        let removed = self.lock().remove(name);
        match removed {
            Some(dep) => {
                if let Some(timer) = dep.timer {
                    timer.cancel();
                }
                true
            }
            None => false,
        }
    }

    /// Cancel every health-check timer
    pub fn shutdown(&self) {
        for dep in self.lock().values_mut() {
            if let Some(timer) = dep.timer.take() {
                timer.cancel();
            }
        }
    }

    /// Probe `name` once under its timeout and update its health
    pub async fn run_check(&self, name: &str) -> Result<HealthStatus> {
        let (check, timeout) = {
            let deps = self.lock();
            let dep = deps
                .get(name)
                .ok_or_else(|| Error::not_found("dependency", name))?;
            (dep.check.clone(), dep.config.check_timeout)
        };
        let started = tokio::time::Instant::now();
        let result = match tokio::time::timeout(timeout, check()).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout(format!(
                "health check for '{name}' timed out after {}ms",
                timeout.as_millis()
            ))),
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let status = match &result {
            Ok(()) => self.record_success(name, Some(elapsed_ms)),
            Err(e) => self.record_failure(name, e),
        };
        Ok(status)
    }

    fn record_success(&self, name: &str, elapsed_ms: Option<u64>) -> HealthStatus {
        let now = self.clock.utc_now();
        let mut deps = self.lock();
        let Some(dep) = deps.get_mut(name) else {
            return HealthStatus::Healthy;
        };
        let previous = dep.health.status;
        dep.health.status = HealthStatus::Healthy;
        dep.health.consecutive_errors = 0;
        dep.health.last_check_at = Some(now);
        dep.health.last_error = None;
        if elapsed_ms.is_some() {
            dep.health.last_response_time_ms = elapsed_ms;
        }
        if previous != HealthStatus::Healthy {
            tracing::info!(dependency = %name, from = %previous, "dependency recovered");
        }
        HealthStatus::Healthy
    }

    fn record_failure(&self, name: &str, error: &Error) -> HealthStatus {
        let now = self.clock.utc_now();
        let mut deps = self.lock();
        let Some(dep) = deps.get_mut(name) else {
            return HealthStatus::Unavailable;
        };
        let previous = dep.health.status;
        dep.health.consecutive_errors += 1;
        dep.health.last_check_at = Some(now);
        dep.health.last_error = Some(error.to_string());
        dep.health.status = if dep.health.consecutive_errors >= dep.config.max_error_threshold {
            HealthStatus::Unavailable
        } else {
            HealthStatus::Degraded
        };
        if dep.health.status != previous {
            tracing::warn!(
                dependency = %name,
                from = %previous,
                to = %dep.health.status,
                consecutive_errors = dep.health.consecutive_errors,
                error = %error,
                "dependency health changed"
            );
        }
        dep.health.status
    }

    pub fn health(&self, name: &str) -> Option<DependencyHealth> {
        self.lock().get(name).map(|d| d.health.clone())
    }

    /// Run `operation` through the named circuit breaker unless the
    /// dependency is unavailable or its breaker is open; in those cases,
    /// and when the operation fails, resolve through the registered
    /// fallback, then `fallback_value`. With neither, a skipped call fails
    /// with `ServiceUnavailable` and a failed call returns its own error.
    pub async fn execute_with_degradation<T, F, Fut>(
        &self,
        name: &str,
        operation: F,
        fallback_value: Option<T>,
    ) -> Result<T>
    where
        T: DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let (unavailable, fallback) = {
            let deps = self.lock();
            match deps.get(name) {
                Some(dep) => (
                    dep.health.status == HealthStatus::Unavailable,
                    dep.fallback.clone(),
                ),
                None => (false, None),
            }
        };
        let breaker = self.breakers.get(name);

        if unavailable || breaker.is_open() {
            tracing::debug!(
                dependency = %name,
                unavailable,
                "skipping call to degraded dependency"
            );
            return Self::fall_back(name, fallback, fallback_value, Error::service_unavailable(name))
                .await;
        }

        let started = tokio::time::Instant::now();
        match breaker.execute(operation).await {
            Ok(value) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                self.record_success(name, Some(elapsed_ms));
                Ok(value)
            }
            Err(e) => {
                // a refusal by the breaker says nothing new about the dependency
                if e.kind != cadence_core::ErrorKind::CircuitOpen {
                    self.record_failure(name, &e);
                }
                Self::fall_back(name, fallback, fallback_value, e).await
            }
        }
    }

    async fn fall_back<T: DeserializeOwned>(
        name: &str,
        fallback: Option<FallbackFn>,
        fallback_value: Option<T>,
        error: Error,
    ) -> Result<T> {
        if let Some(fallback) = fallback {
            tracing::info!(dependency = %name, "using registered fallback");
            let value = fallback().await?;
            return Ok(serde_json::from_value(value)?);
        }
        if let Some(value) = fallback_value {
            tracing::info!(dependency = %name, "using fallback value");
            return Ok(value);
        }
        Err(error)
    }

    /// Worst status across all registered dependencies
    pub fn system_health(&self) -> SystemHealth {
        let deps = self.lock();
        let dependencies: BTreeMap<String, DependencyHealth> = deps
            .iter()
            .map(|(name, dep)| (name.clone(), dep.health.clone()))
            .collect();
        let status = dependencies
            .values()
            .map(|h| h.status)
            .max()
            .unwrap_or(HealthStatus::Healthy);
        SystemHealth {
            status,
            dependencies,
        }
    }
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;
