//! Retry, sampling and display cadence configuration

use crate::worker::Backoff;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Capped exponential backoff between failed attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Delay after the first failure
    pub base_delay_ms: u64,
    /// Ceiling for the doubling delay
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryConfig {
    pub fn backoff(&self) -> Backoff {
        Backoff::from_millis(self.base_delay_ms, self.max_delay_ms)
    }
}

/// Byte-rate sampler ring size; samples are taken every 1/N seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    pub samples: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self { samples: 10 }
    }
}

/// Status line cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub refresh_ms: u64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self { refresh_ms: 1000 }
    }
}

impl DisplayConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_defaults_match_backoff_defaults() {
        assert_eq!(RetryConfig::default().backoff(), Backoff::default());
    }

    #[test]
    fn test_sampler_and_display_defaults() {
        assert_eq!(SamplerConfig::default().samples, 10);
        assert_eq!(
            DisplayConfig::default().refresh_interval(),
            Duration::from_secs(1)
        );
    }
}
