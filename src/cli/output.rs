//! Output formatting helpers for CLI commands

use crate::metrics::{AggregateStats, WorkerStats};
use crate::pool::{RunOutcome, SlotId};
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use serde::Serialize;
use serde_json::json;
use std::time::Duration;

/// View model for one worker slot
#[derive(Debug, Clone, Serialize)]
pub struct SlotView {
    pub slot: SlotId,
    pub attempts: u64,
    pub ttft_ms: Option<u64>,
    pub ttfr_ms: Option<u64>,
    pub prefill_tps: Option<f64>,
    pub decode_tps: Option<f64>,
    pub completion_tokens: Option<u64>,
    pub consecutive_errors: u32,
    pub last_error: Option<String>,
}

impl From<(SlotId, &WorkerStats)> for SlotView {
    fn from((slot, stats): (SlotId, &WorkerStats)) -> Self {
        Self {
            slot,
            attempts: stats.attempts,
            ttft_ms: stats.time_to_first_token.map(|d| d.as_millis() as u64),
            ttfr_ms: stats
                .time_to_first_reasoning_token
                .map(|d| d.as_millis() as u64),
            prefill_tps: stats.prefill_tokens_per_second,
            decode_tps: stats.decode_tokens_per_second,
            completion_tokens: stats.completion_tokens,
            consecutive_errors: stats.consecutive_errors,
            last_error: stats.last_error.clone(),
        }
    }
}

/// Everything printed at the end of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub outcome: String,
    pub model: String,
    pub endpoint: String,
    pub aggregate: AggregateStats,
    pub slots: Vec<SlotView>,
}

pub fn outcome_label(outcome: RunOutcome) -> String {
    match outcome {
        RunOutcome::Completed { completions } => format!("completed ({} workers)", completions),
        RunOutcome::Drained => "drained".to_string(),
        RunOutcome::Cancelled => "cancelled".to_string(),
    }
}

fn fmt_rate(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.1}", v))
}

fn fmt_ms(value: Option<u64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{}ms", v))
}

fn fmt_avg_ms(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.0}ms", v))
}

fn fmt_progress(elapsed_seconds: f64, run_duration: Option<Duration>) -> String {
    match run_duration {
        Some(total) if !total.is_zero() => {
            let total = total.as_secs_f64();
            let pct = (elapsed_seconds / total * 100.0).min(100.0);
            format!("{:.0}s/{:.0}s ({:.0}%)", elapsed_seconds.min(total), total, pct)
        }
        _ => format!("{:.0}s", elapsed_seconds),
    }
}

/// One-line status for periodic reporting
pub fn format_status_line(
    stats: &AggregateStats,
    running: usize,
    target: usize,
    run_duration: Option<Duration>,
) -> String {
    format!(
        "{} | workers {}/{} | {:.0} B/s | {:.1} req/min | prefill {} tok/s | decode {} tok/s | \
         prompt {:.1} tok/s | completion {:.1} tok/s | ttft {} | ttfr {} | errors {}",
        fmt_progress(stats.elapsed_seconds, run_duration),
        running,
        target,
        stats.aggregate_byte_rate,
        stats.requests_per_minute,
        fmt_rate(stats.average_prefill_tps),
        fmt_rate(stats.average_decode_tps),
        stats.overall_prompt_tps,
        stats.overall_completion_tps,
        fmt_avg_ms(stats.average_ttft_ms),
        fmt_avg_ms(stats.average_ttfr_ms),
        stats.totals.failed_attempts,
    )
}

/// Format the run summary as tables
pub fn format_summary_table(summary: &RunSummary) -> String {
    let agg = &summary.aggregate;

    let mut totals = Table::new();
    totals.load_preset(UTF8_FULL);
    totals.set_content_arrangement(ContentArrangement::Dynamic);
    totals.set_header(vec!["Metric", "Value"]);

    let outcome = match summary.outcome.as_str() {
        "cancelled" => summary.outcome.yellow().to_string(),
        _ => summary.outcome.green().to_string(),
    };
    let failed = if agg.totals.failed_attempts > 0 {
        agg.totals.failed_attempts.to_string().red().to_string()
    } else {
        agg.totals.failed_attempts.to_string()
    };

    let rows: Vec<(&str, String)> = vec![
        ("Outcome", outcome),
        ("Model", summary.model.clone()),
        ("Endpoint", summary.endpoint.clone()),
        ("Elapsed", format!("{:.1}s", agg.elapsed_seconds)),
        ("Completed requests", agg.totals.completed_attempts.to_string()),
        ("Failed requests", failed),
        ("Requests/min", format!("{:.1}", agg.requests_per_minute)),
        ("Prompt tokens", agg.totals.prompt_tokens.to_string()),
        ("Completion tokens", agg.totals.completion_tokens.to_string()),
        ("Prompt tok/s (overall)", format!("{:.1}", agg.overall_prompt_tps)),
        (
            "Completion tok/s (overall)",
            format!("{:.1}", agg.overall_completion_tps),
        ),
        ("Avg prefill tok/s", fmt_rate(agg.average_prefill_tps)),
        ("Avg decode tok/s", fmt_rate(agg.average_decode_tps)),
        ("Avg TTFT", fmt_avg_ms(agg.average_ttft_ms)),
        ("Avg TTFR", fmt_avg_ms(agg.average_ttfr_ms)),
    ];
    for (name, value) in rows {
        totals.add_row(vec![Cell::new(name), Cell::new(value)]);
    }

    if summary.slots.is_empty() {
        return totals.to_string();
    }

    let mut slots = Table::new();
    slots.load_preset(UTF8_FULL);
    slots.set_content_arrangement(ContentArrangement::Dynamic);
    slots.set_header(vec![
        "Slot", "Attempts", "TTFT", "TTFR", "Prefill", "Decode", "Tokens", "Errors",
    ]);
    for s in &summary.slots {
        let errors = match &s.last_error {
            Some(e) if s.consecutive_errors > 0 => e.red().to_string(),
            _ => s.consecutive_errors.to_string(),
        };
        slots.add_row(vec![
            Cell::new(s.slot),
            Cell::new(s.attempts),
            Cell::new(fmt_ms(s.ttft_ms)),
            Cell::new(fmt_ms(s.ttfr_ms)),
            Cell::new(fmt_rate(s.prefill_tps)),
            Cell::new(fmt_rate(s.decode_tps)),
            Cell::new(s.completion_tokens.map_or("-".to_string(), |t| t.to_string())),
            Cell::new(errors),
        ]);
    }

    format!("{}\n{}", totals, slots)
}

/// Format the run summary as JSON
pub fn format_summary_json(summary: &RunSummary) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&json!({ "summary": summary }))
}
