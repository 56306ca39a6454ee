//! # Metrics Aggregation Module
//!
//! Merges per-worker statistics into system-wide rates.
//!
//! ## Overview
//!
//! Each worker owns exactly one entry of the [`StatsBoard`], keyed by its slot
//! id, and is the only writer of that entry. Readers take snapshots and run
//! the pure [`aggregate`] pass over them, so display refreshes never block a
//! worker and worker count changes need no coordination.
//!
//! ## Figures
//!
//! - `aggregate_byte_rate` - sum of known instantaneous byte rates
//! - `average_*` - mean over workers that define the field
//! - `requests_per_minute` - completed attempts per elapsed minute
//! - `overall_*_tps` - cumulative token totals per elapsed second
//!
//! Counters are also mirrored into the `metrics` facade
//! (`loadllm_attempts_total{outcome}`, `loadllm_tokens_total{type}`).

pub mod types;

pub use types::*;

use crate::client::Usage;
use crate::pool::SlotId;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Shared per-slot statistics plus run-wide counters.
pub struct StatsBoard {
    /// Latest stats per active slot
    slots: DashMap<SlotId, WorkerStats>,
    completed_attempts: AtomicU64,
    failed_attempts: AtomicU64,
    prompt_tokens: AtomicU64,
    completion_tokens: AtomicU64,
    /// Run start, the origin of every rate
    started: Instant,
}

impl StatsBoard {
    pub fn new(started: Instant) -> Self {
        Self {
            slots: DashMap::new(),
            completed_attempts: AtomicU64::new(0),
            failed_attempts: AtomicU64::new(0),
            prompt_tokens: AtomicU64::new(0),
            completion_tokens: AtomicU64::new(0),
            started,
        }
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    /// Apply `f` to a slot's entry (creating it if absent) and return the new snapshot.
    pub fn update<F>(&self, slot: SlotId, f: F) -> WorkerStats
    where
        F: FnOnce(&mut WorkerStats),
    {
        let mut entry = self.slots.entry(slot).or_default();
        f(entry.value_mut());
        entry.value().clone()
    }

    pub fn get(&self, slot: SlotId) -> Option<WorkerStats> {
        self.slots.get(&slot).map(|s| s.value().clone())
    }

    /// Drop a retired slot's entry so it no longer contributes to averages.
    pub fn remove(&self, slot: SlotId) -> Option<WorkerStats> {
        self.slots.remove(&slot).map(|(_, stats)| stats)
    }

    /// Add one attempt's usage report to the run totals.
    pub fn record_usage(&self, usage: &Usage) {
        self.prompt_tokens
            .fetch_add(usage.prompt_tokens, Ordering::Relaxed);
        self.completion_tokens
            .fetch_add(usage.completion_tokens, Ordering::Relaxed);
        metrics::counter!("loadllm_tokens_total", "type" => "prompt")
            .increment(usage.prompt_tokens);
        metrics::counter!("loadllm_tokens_total", "type" => "completion")
            .increment(usage.completion_tokens);
    }

    pub fn record_completion(&self) {
        self.completed_attempts.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("loadllm_attempts_total", "outcome" => "success").increment(1);
    }

    pub fn record_failure(&self) {
        self.failed_attempts.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("loadllm_attempts_total", "outcome" => "error").increment(1);
    }

    pub fn totals(&self) -> RunTotals {
        RunTotals {
            completed_attempts: self.completed_attempts.load(Ordering::Relaxed),
            failed_attempts: self.failed_attempts.load(Ordering::Relaxed),
            prompt_tokens: self.prompt_tokens.load(Ordering::Relaxed),
            completion_tokens: self.completion_tokens.load(Ordering::Relaxed),
        }
    }

    /// Snapshot of every slot's stats, ordered by slot id.
    pub fn snapshot(&self) -> Vec<(SlotId, WorkerStats)> {
        let mut slots: Vec<(SlotId, WorkerStats)> = self
            .slots
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        slots.sort_by_key(|(id, _)| *id);
        slots
    }

    /// System-wide figures as of now.
    pub fn aggregate(&self) -> AggregateStats {
        self.aggregate_at(Instant::now())
    }

    pub fn aggregate_at(&self, now: Instant) -> AggregateStats {
        let snapshot = self.snapshot();
        aggregate(
            snapshot.iter().map(|(_, stats)| stats),
            self.totals(),
            now.saturating_duration_since(self.started),
        )
    }
}

/// Pure aggregation over worker snapshots, run totals and elapsed run time.
pub fn aggregate<'a, I>(stats: I, totals: RunTotals, elapsed: Duration) -> AggregateStats
where
    I: IntoIterator<Item = &'a WorkerStats>,
{
    let stats: Vec<&WorkerStats> = stats.into_iter().collect();
    let elapsed_seconds = elapsed.as_secs_f64();

    let aggregate_byte_rate = stats
        .iter()
        .filter_map(|s| s.instantaneous_byte_rate)
        .sum();

    let per_second = |total: u64| {
        if elapsed_seconds > 0.0 {
            total as f64 / elapsed_seconds
        } else {
            0.0
        }
    };

    AggregateStats {
        aggregate_byte_rate,
        average_prefill_tps: mean(stats.iter().filter_map(|s| s.prefill_tokens_per_second)),
        average_decode_tps: mean(stats.iter().filter_map(|s| s.decode_tokens_per_second)),
        average_ttft_ms: mean(
            stats
                .iter()
                .filter_map(|s| s.time_to_first_token)
                .map(as_millis_f64),
        ),
        average_ttfr_ms: mean(
            stats
                .iter()
                .filter_map(|s| s.time_to_first_reasoning_token)
                .map(as_millis_f64),
        ),
        requests_per_minute: per_second(totals.completed_attempts) * 60.0,
        overall_prompt_tps: per_second(totals.prompt_tokens),
        overall_completion_tps: per_second(totals.completion_tokens),
        totals,
        elapsed_seconds,
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

fn as_millis_f64(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn stats_with_rate(rate: Option<f64>) -> WorkerStats {
        WorkerStats {
            instantaneous_byte_rate: rate,
            ..WorkerStats::default()
        }
    }

    #[test]
    fn test_byte_rate_sum_excludes_unknown() {
        let stats = [
            stats_with_rate(Some(100.0)),
            stats_with_rate(None),
            stats_with_rate(Some(50.0)),
        ];
        let agg = aggregate(&stats, RunTotals::default(), Duration::from_secs(1));
        assert_eq!(agg.aggregate_byte_rate, 150.0);
    }

    #[test]
    fn test_averages_only_over_defined_values() {
        let stats = [
            WorkerStats {
                prefill_tokens_per_second: Some(100.0),
                decode_tokens_per_second: Some(40.0),
                time_to_first_token: Some(Duration::from_millis(100)),
                ..WorkerStats::default()
            },
            WorkerStats {
                prefill_tokens_per_second: Some(300.0),
                time_to_first_reasoning_token: Some(Duration::from_millis(20)),
                ..WorkerStats::default()
            },
            WorkerStats::default(),
        ];

        let agg = aggregate(&stats, RunTotals::default(), Duration::from_secs(1));
        assert_eq!(agg.average_prefill_tps, Some(200.0));
        assert_eq!(agg.average_decode_tps, Some(40.0));
        assert_eq!(agg.average_ttft_ms, Some(100.0));
        assert_eq!(agg.average_ttfr_ms, Some(20.0));
    }

    #[test]
    fn test_averages_undefined_when_no_worker_reports() {
        let stats = [WorkerStats::default(), WorkerStats::default()];
        let agg = aggregate(&stats, RunTotals::default(), Duration::from_secs(5));
        assert_eq!(agg.average_prefill_tps, None);
        assert_eq!(agg.average_decode_tps, None);
        assert_eq!(agg.average_ttft_ms, None);
    }

    #[test]
    fn test_rates_from_totals() {
        let totals = RunTotals {
            completed_attempts: 6,
            failed_attempts: 1,
            prompt_tokens: 300,
            completion_tokens: 120,
        };
        let agg = aggregate(&[], totals, Duration::from_secs(30));

        assert_eq!(agg.requests_per_minute, 12.0);
        assert_eq!(agg.overall_prompt_tps, 10.0);
        assert_eq!(agg.overall_completion_tps, 4.0);
        assert_eq!(agg.totals, totals);
    }

    #[test]
    fn test_zero_elapsed_yields_zero_rates() {
        let totals = RunTotals {
            completed_attempts: 3,
            prompt_tokens: 10,
            ..RunTotals::default()
        };
        let agg = aggregate(&[], totals, Duration::ZERO);
        assert_eq!(agg.requests_per_minute, 0.0);
        assert_eq!(agg.overall_prompt_tps, 0.0);
        assert!(!agg.overall_completion_tps.is_nan());
    }

    #[test]
    fn test_board_update_and_remove() {
        let board = StatsBoard::new(Instant::now());
        let snapshot = board.update(3, |s| s.instantaneous_byte_rate = Some(10.0));
        assert_eq!(snapshot.instantaneous_byte_rate, Some(10.0));
        board.update(1, |s| s.attempts += 1);

        let ids: Vec<SlotId> = board.snapshot().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![1, 3]);

        board.remove(3);
        assert!(board.get(3).is_none());
        assert_eq!(board.aggregate().aggregate_byte_rate, 0.0);
    }

    #[test]
    fn test_board_totals() {
        let board = StatsBoard::new(Instant::now());
        board.record_usage(&Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        });
        board.record_completion();
        board.record_failure();

        assert_eq!(
            board.totals(),
            RunTotals {
                completed_attempts: 1,
                failed_attempts: 1,
                prompt_tokens: 10,
                completion_tokens: 5,
            }
        );
    }

    proptest! {
        #[test]
        fn prop_byte_rate_sum_matches_known_rates(
            rates in proptest::collection::vec(proptest::option::of(0.0f64..1e6), 0..32)
        ) {
            let stats: Vec<WorkerStats> = rates.iter().copied().map(stats_with_rate).collect();
            let agg = aggregate(&stats, RunTotals::default(), Duration::from_secs(1));
            let expected: f64 = rates.iter().flatten().sum();
            prop_assert!((agg.aggregate_byte_rate - expected).abs() < 1e-6);
        }
    }
}
