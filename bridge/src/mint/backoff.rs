//! Retry backoff with full jitter.
//!
//! The ceiling doubles per attempt up to a cap and the actual delay is
//! drawn uniformly from `[0, ceiling]`. Uniform draws keep a burst of
//! failures from re-synchronizing into repeated thundering herds against
//! the chain endpoint.

use std::time::Duration;

use rand::Rng;

use crate::config::{DEFAULT_BACKOFF_BASE_MS, DEFAULT_BACKOFF_CAP_MS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_ms: u64,
    pub cap_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_ms: DEFAULT_BACKOFF_BASE_MS,
            cap_ms: DEFAULT_BACKOFF_CAP_MS,
        }
    }
}

impl BackoffPolicy {
    pub fn new(base_ms: u64, cap_ms: u64) -> Self {
        Self { base_ms, cap_ms }
    }

    /// Upper bound for the delay before the given attempt (1-based).
    pub fn ceiling_ms(&self, attempt: u32) -> u64 {
        let exponent = attempt.saturating_sub(1).min(32);
        self.base_ms
            .saturating_mul(1u64 << exponent)
            .min(self.cap_ms)
    }

    /// Samples a delay before the given attempt: uniform in
    /// `[0, ceiling_ms(attempt)]`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let ceiling = self.ceiling_ms(attempt);
        let jittered = rand::thread_rng().gen_range(0..=ceiling);
        Duration::from_millis(jittered)
    }
}
