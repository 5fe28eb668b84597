// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use cadence_core::{ErrorKind, FakeClock};
use proptest::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};

fn breaker(clock: &FakeClock) -> CircuitBreaker<FakeClock> {
    CircuitBreaker::new(
        "sender",
        CircuitConfig::default()
            .with_failure_threshold(3)
            .with_recovery_timeout(Duration::from_secs(60))
            .with_half_open_max_calls(2),
        clock.clone(),
    )
}

async fn fail(breaker: &CircuitBreaker<FakeClock>) -> Result<()> {
    breaker
        .execute(|| async { Err(Error::from_status(503, "down")) })
        .await
}

async fn succeed(breaker: &CircuitBreaker<FakeClock>) -> Result<()> {
    breaker.execute(|| async { Ok(()) }).await
}

#[tokio::test]
async fn opens_after_threshold_failures() {
    let clock = FakeClock::new();
    let cb = breaker(&clock);
    fail(&cb).await.unwrap_err();
    fail(&cb).await.unwrap_err();
    assert_eq!(cb.state().state, CircuitStatus::Closed);
    fail(&cb).await.unwrap_err();

    let state = cb.state();
    assert_eq!(state.state, CircuitStatus::Open);
    assert_eq!(state.failure_count, 3);
    assert!(state.next_retry_at.is_some());
    assert!(cb.is_open());
}

#[tokio::test]
async fn open_circuit_fails_fast_without_invoking() {
    let clock = FakeClock::new();
    let cb = breaker(&clock);
    for _ in 0..3 {
        fail(&cb).await.unwrap_err();
    }

    let invoked = AtomicU32::new(0);
    let err = cb
        .execute(|| async {
            invoked.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::CircuitOpen);
    assert_eq!(invoked.load(Ordering::SeqCst), 0);
    assert_eq!(cb.state().rejected_calls, 1);
    assert_eq!(cb.state().total_calls, 3);
}

#[tokio::test]
async fn success_in_closed_resets_failure_count() {
    let clock = FakeClock::new();
    let cb = breaker(&clock);
    fail(&cb).await.unwrap_err();
    fail(&cb).await.unwrap_err();
    succeed(&cb).await.unwrap();
    fail(&cb).await.unwrap_err();
    fail(&cb).await.unwrap_err();

    let state = cb.state();
    assert_eq!(state.state, CircuitStatus::Closed);
    assert_eq!(state.failure_count, 2);
    assert_eq!(state.success_count, 1);
}

#[tokio::test]
async fn recovery_timeout_admits_half_open_probe() {
    let clock = FakeClock::new();
    let cb = breaker(&clock);
    for _ in 0..3 {
        fail(&cb).await.unwrap_err();
    }

    clock.advance(Duration::from_secs(59));
    assert!(succeed(&cb).await.is_err());

    clock.advance(Duration::from_secs(1));
    assert!(!cb.is_open());
    succeed(&cb).await.unwrap();
    assert_eq!(cb.state().state, CircuitStatus::HalfOpen);
    succeed(&cb).await.unwrap();
    let state = cb.state();
    assert_eq!(state.state, CircuitStatus::Closed);
    assert_eq!(state.failure_count, 0);
    assert!(state.next_retry_at.is_none());
}

#[tokio::test]
async fn half_open_failure_reopens_immediately() {
    let clock = FakeClock::new();
    let cb = breaker(&clock);
    for _ in 0..3 {
        fail(&cb).await.unwrap_err();
    }
    clock.advance(Duration::from_secs(60));
    succeed(&cb).await.unwrap();
    fail(&cb).await.unwrap_err();

    assert_eq!(cb.state().state, CircuitStatus::Open);
    assert!(cb.is_open());
    clock.advance(Duration::from_secs(30));
    assert!(succeed(&cb).await.is_err());
    clock.advance(Duration::from_secs(30));
    assert!(succeed(&cb).await.is_ok());
}

#[test]
fn half_open_admits_limited_probes() {
    let clock = FakeClock::new();
    let cb = breaker(&clock);
    for _ in 0..3 {
        cb.record_failure();
    }
    clock.advance(Duration::from_secs(60));

    assert!(cb.try_acquire().is_ok());
    assert!(cb.try_acquire().is_ok());
    let err = cb.try_acquire().unwrap_err();
    assert_eq!(err.kind, ErrorKind::CircuitOpen);
    assert_eq!(cb.state().half_open_calls_made, 2);
}

#[tokio::test]
async fn reset_closes_and_zeroes_counters() {
    let clock = FakeClock::new();
    let cb = breaker(&clock);
    for _ in 0..3 {
        fail(&cb).await.unwrap_err();
    }
    cb.reset();
    let state = cb.state();
    assert_eq!(state.state, CircuitStatus::Closed);
    assert_eq!((state.failure_count, state.total_calls), (0, 0));
    succeed(&cb).await.unwrap();
}

#[tokio::test]
async fn forced_open_holds_until_reset() {
    let clock = FakeClock::new();
    let cb = breaker(&clock);
    cb.force_open();
    clock.advance(Duration::from_secs(3600));
    assert!(cb.is_open());
    assert!(succeed(&cb).await.is_err());
    assert!(cb.state().forced_open);

    cb.reset();
    succeed(&cb).await.unwrap();
}

#[test]
fn registry_creates_breakers_lazily_with_overrides() {
    let clock = FakeClock::new();
    let registry = CircuitBreakerRegistry::new(CircuitConfig::default(), clock);
    let overrides = CircuitOverrides {
        failure_threshold: Some(1),
        ..CircuitOverrides::default()
    };
    let sender = registry.get_with("sender", &overrides);
    assert_eq!(sender.config().failure_threshold, 1);
    assert_eq!(sender.config().half_open_max_calls, 3);

    let again = registry.get("sender");
    assert_eq!(again.config().failure_threshold, 1);

    sender.record_failure();
    assert_eq!(registry.states()["sender"].state, CircuitStatus::Open);
}

#[test]
fn registry_reset_and_force_open() {
    let clock = FakeClock::new();
    let registry = CircuitBreakerRegistry::new(CircuitConfig::default(), clock);
    assert_eq!(
        registry.reset("missing").unwrap_err().kind,
        ErrorKind::NotFound
    );

    registry.force_open("sms");
    assert_eq!(registry.states()["sms"].state, CircuitStatus::Open);
    registry.reset("sms").unwrap();
    assert_eq!(registry.states()["sms"].state, CircuitStatus::Closed);

    registry.force_open("sms");
    registry.force_open("email");
    registry.reset_all();
    assert!(registry
        .states()
        .values()
        .all(|s| s.state == CircuitStatus::Closed));
}

proptest! {
    #[test]
    fn opens_exactly_at_threshold(threshold in 1u32..20, extra_calls in 1u32..10) {
        let clock = FakeClock::new();
        let cb = CircuitBreaker::new(
            "dep",
            CircuitConfig::default().with_failure_threshold(threshold),
            clock,
        );
        for i in 1..=threshold {
            prop_assert!(cb.try_acquire().is_ok());
            cb.record_failure();
            let expected = if i == threshold { CircuitStatus::Open } else { CircuitStatus::Closed };
            prop_assert_eq!(cb.state().state, expected);
        }
        for _ in 0..extra_calls {
            prop_assert!(cb.try_acquire().is_err());
        }
        prop_assert_eq!(cb.state().total_calls, u64::from(threshold));
        prop_assert_eq!(cb.state().rejected_calls, u64::from(extra_calls));
    }
}
