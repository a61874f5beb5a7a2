// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Retry backoff for a failed compaction task.
//!
//! Simplified from `examples/dennisss-dacha/pkg/net/src/backoff.rs`'s `ExponentialBackoff`:
//! same doubling-with-cap state machine and `start_attempt`/`end_attempt` shape, minus jitter
//! (no RNG dependency worth pulling in for a background maintenance job) and minus the
//! `max_num_attempts`/cooldown bookkeeping a worker pool retry loop doesn't need.

use std::time::Duration;

/// Tracks the delay before the next retry of a single failing compaction task.
pub struct ExponentialBackoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl ExponentialBackoff {
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            current: Duration::ZERO,
        }
    }

    /// Delay to wait before the next attempt, and advances the internal state for the
    /// attempt after that.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = if self.current.is_zero() {
            self.base
        } else {
            std::cmp::min(self.current * 2, self.max)
        };
        delay
    }

    /// Clears accumulated backoff after a successful attempt.
    pub fn reset(&mut self) {
        self.current = Duration::ZERO;
    }
}
