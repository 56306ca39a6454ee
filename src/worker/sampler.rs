//! Moving-average byte rate over a fixed ring of samples.

use std::collections::VecDeque;
use std::time::Duration;

/// Largest ring; keeps the sampling period at one millisecond or more.
pub const MAX_SAMPLES: usize = 1000;

/// N samples taken every 1/N seconds; the published rate is the
/// N-sample mean scaled back to bytes per second.
///
/// The ring starts zero-filled, so a steady stream of B bytes/sec ramps up
/// over the first second and then reads exactly B.
#[derive(Debug, Clone)]
pub struct ByteRateSampler {
    samples: VecDeque<u64>,
    pending: u64,
    size: usize,
    seen_bytes: bool,
}

impl ByteRateSampler {
    /// `size` is clamped to `1..=MAX_SAMPLES`.
    pub fn new(size: usize) -> Self {
        let size = size.clamp(1, MAX_SAMPLES);
        Self {
            samples: std::iter::repeat(0).take(size).collect(),
            pending: 0,
            size,
            seen_bytes: false,
        }
    }

    /// Sampling cadence: 1/N seconds.
    pub fn period(&self) -> Duration {
        let divisor = u32::try_from(self.size).unwrap_or(u32::MAX);
        (Duration::from_secs(1) / divisor).max(Duration::from_millis(1))
    }

    /// Count bytes produced since the last tick.
    pub fn record(&mut self, bytes: usize) {
        self.pending += bytes as u64;
        if bytes > 0 {
            self.seen_bytes = true;
        }
    }

    /// Close the current sample period.
    ///
    /// Returns `None` until the attempt has produced its first byte; from then
    /// on every tick reports a rate, which may legitimately be zero.
    pub fn tick(&mut self) -> Option<f64> {
        self.samples.pop_front();
        self.samples.push_back(std::mem::take(&mut self.pending));
        self.rate()
    }

    pub fn rate(&self) -> Option<f64> {
        if !self.seen_bytes {
            return None;
        }
        let sum: u64 = self.samples.iter().sum();
        Some(sum as f64 / self.samples.len() as f64 * self.size as f64)
    }
}

impl Default for ByteRateSampler {
    fn default() -> Self {
        Self::new(10)
    }
}
