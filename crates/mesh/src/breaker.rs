// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Sliding-window failure counter gating adapter starts per provider.
///
/// After `threshold` start/stop failures within `window`, the breaker opens
/// for `cooldown`; starts during the cooldown are refused with the remaining
/// wait so callers can surface a `cooldown_remaining` hint.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: usize,
    window: Duration,
    cooldown: Duration,
    failures: VecDeque<Instant>,
    open_until: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(threshold: usize, window: Duration, cooldown: Duration) -> Self {
        Self { threshold, window, cooldown, failures: VecDeque::new(), open_until: None }
    }

    /// Record a failed start or stop. Opens the breaker when the window
    /// fills.
    pub fn record_failure(&mut self) {
        let now = Instant::now();
        self.failures.push_back(now);
        self.prune(now);
        if self.failures.len() >= self.threshold {
            self.open_until = Some(now + self.cooldown);
            self.failures.clear();
        }
    }

    /// Record a successful start; clears accumulated failures.
    pub fn record_success(&mut self) {
        self.failures.clear();
    }

    /// Remaining cooldown if the breaker is open, `None` when closed.
    pub fn cooldown_remaining(&mut self) -> Option<Duration> {
        let now = Instant::now();
        match self.open_until {
            Some(until) if until > now => Some(until - now),
            Some(_) => {
                self.open_until = None;
                None
            }
            None => None,
        }
    }

    fn prune(&mut self, now: Instant) {
        while let Some(front) = self.failures.front() {
            if now.duration_since(*front) > self.window {
                self.failures.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
#[path = "breaker_tests.rs"]
mod tests;
