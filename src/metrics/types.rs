//! # Metrics Types
//!
//! Per-worker snapshots and the system-wide figures derived from them.

use serde::Serialize;
use std::time::Duration;

/// Most recent signals published by one worker.
///
/// Written only by the owning worker; everything else reads snapshots.
/// `None` means "unknown", never zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkerStats {
    /// Smoothed output rate in bytes/sec while an attempt is streaming
    pub instantaneous_byte_rate: Option<f64>,
    /// Prompt tokens of the last completed attempt
    pub prompt_tokens: Option<u64>,
    /// Completion tokens of the last completed attempt
    pub completion_tokens: Option<u64>,
    pub prefill_tokens_per_second: Option<f64>,
    pub decode_tokens_per_second: Option<f64>,
    pub time_to_first_token: Option<Duration>,
    pub time_to_first_reasoning_token: Option<Duration>,
    /// Pulse: set when an attempt completes, cleared when the next one starts
    pub is_done: bool,
    /// Attempts started by this worker
    pub attempts: u64,
    pub consecutive_errors: u32,
    /// Last failure, annotated with the chosen retry delay
    pub last_error: Option<String>,
}

impl WorkerStats {
    /// Clear the per-attempt pulse and rate; token figures and timings of
    /// the previous attempt stay visible until replaced.
    pub fn begin_attempt(&mut self) {
        self.is_done = false;
        self.instantaneous_byte_rate = None;
        self.attempts += 1;
    }
}

/// Cumulative counters for the whole run.
///
/// Token totals are added once per attempt, when its usage report arrives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunTotals {
    pub completed_attempts: u64,
    pub failed_attempts: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// System-wide rates, recomputed from the current [`WorkerStats`] set.
///
/// Averages only include workers that define the field; with no such worker
/// the average is `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregateStats {
    /// Sum of every known instantaneous byte rate
    pub aggregate_byte_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_prefill_tps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_decode_tps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_ttft_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_ttfr_ms: Option<f64>,
    pub requests_per_minute: f64,
    pub overall_prompt_tps: f64,
    pub overall_completion_tps: f64,
    pub totals: RunTotals,
    pub elapsed_seconds: f64,
}
