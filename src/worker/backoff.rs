//! Capped exponential backoff between failed attempts.

use std::time::Duration;

/// `delay(k) = min(max, base * 2^(k-1))` for the k-th consecutive failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(30),
        }
    }
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    pub fn from_millis(base_ms: u64, max_ms: u64) -> Self {
        Self::new(Duration::from_millis(base_ms), Duration::from_millis(max_ms))
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Delay before retrying after `consecutive_errors` failures in a row.
    ///
    /// Zero failures means no delay. Overflowing exponents saturate at `max`.
    pub fn delay_for(&self, consecutive_errors: u32) -> Duration {
        if consecutive_errors == 0 {
            return Duration::ZERO;
        }
        2u32.checked_pow(consecutive_errors - 1)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max, |delay| delay.min(self.max))
    }
}
