// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn breaker() -> CircuitBreaker {
    CircuitBreaker::new(3, Duration::from_secs(30), Duration::from_secs(60))
}

#[test]
fn closed_until_threshold() {
    let mut b = breaker();
    b.record_failure();
    b.record_failure();
    assert_eq!(b.cooldown_remaining(), None);
}

#[test]
fn opens_at_threshold() {
    let mut b = breaker();
    for _ in 0..3 {
        b.record_failure();
    }
    let remaining = b.cooldown_remaining();
    assert!(remaining.is_some());
    assert!(remaining.unwrap_or_default() <= Duration::from_secs(60));
}

#[test]
fn success_resets_window() {
    let mut b = breaker();
    b.record_failure();
    b.record_failure();
    b.record_success();
    b.record_failure();
    b.record_failure();
    assert_eq!(b.cooldown_remaining(), None);
}

#[test]
fn zero_cooldown_closes_immediately() {
    let mut b = CircuitBreaker::new(1, Duration::from_secs(30), Duration::ZERO);
    b.record_failure();
    assert_eq!(b.cooldown_remaining(), None);
}
