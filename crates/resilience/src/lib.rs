// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! cadence-resilience: failure isolation around unreliable dependencies
//!
//! Three primitives, composed outermost first by the delivery worker:
//! [`HealthRegistry`] routes calls away from unavailable dependencies,
//! [`CircuitBreaker`] fails fast once a dependency keeps failing, and
//! [`RetryExecutor`] retries transient failures of the innermost call.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod circuit;
pub mod health;
pub mod retry;

pub use circuit::{
    CircuitBreaker, CircuitBreakerRegistry, CircuitConfig, CircuitOverrides, CircuitState,
    CircuitStatus,
};
pub use health::{
    fallback_fn, health_check, DependencyHealth, FallbackFn, HealthCheckFn, HealthConfig,
    HealthRegistry, HealthStatus, SystemHealth,
};
pub use retry::{RetryConfig, RetryExecutor, RetryOutcome, Retrying};
