// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Retry budget and backoff for transient control-plane faults.

use std::time::Duration;

use rand::Rng;

/// Bounded exponential backoff with jitter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Values below 1 behave as 1.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Fraction of each delay that is randomized, in `[0, 1]`.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            jitter: 0.5,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Attempts actually allowed (at least one).
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Nominal delay before retry number `retry` (1-indexed), without jitter.
    ///
    /// Retry 1 waits `base_delay`, retry 2 twice that, and so on, capped at
    /// `max_delay`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let multiplier = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay
            .saturating_mul(multiplier)
            .min(self.max_delay)
    }

    /// Jittered delay before retry number `retry`.
    ///
    /// The result lies in `[backoff * (1 - jitter), backoff]`.
    pub fn delay_for_retry<R: Rng>(&self, retry: u32, rng: &mut R) -> Duration {
        let nominal = self.backoff(retry);
        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 {
            return nominal;
        }
        let factor = 1.0 - jitter * rng.gen_range(0.0..=1.0);
        nominal.mul_f64(factor)
    }

    /// Raise `delay` to a server-supplied retry-after hint, capped at `max_delay`.
    pub fn honor_retry_after(&self, delay: Duration, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(hint) => delay.max(hint.min(self.max_delay)),
            None => delay,
        }
    }

    /// Worst-case wall time for a full retry cycle when each remote call is
    /// bounded by `call_timeout`.
    ///
    /// An attempt makes at most two calls: the create and, on a name
    /// conflict, the read of the existing object. Every wait is at most
    /// `max_delay`, even when raised by a retry-after hint.
    pub fn worst_case(&self, call_timeout: Duration) -> Duration {
        let attempts = self.attempts();
        call_timeout.saturating_mul(2 * attempts) + self.max_delay.saturating_mul(attempts - 1)
    }
}
