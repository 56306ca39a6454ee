//! Worker pool scenarios driven by a scripted transport on a paused clock.

mod common;

use common::{drain, lifecycle, settings, wait_for, ScriptedTransport};
use loadllm::pool::{PoolEvent, RunOutcome, WorkerPool};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

const LONG_RUN: Option<Duration> = Some(Duration::from_secs(3600));

fn position(events: &[PoolEvent], f: impl Fn(&PoolEvent) -> bool) -> Option<usize> {
    events.iter().position(f)
}

#[tokio::test(start_paused = true)]
async fn test_three_workers_complete_once_without_duration() {
    let transport = Arc::new(ScriptedTransport::ok());
    let (pool, handle) = WorkerPool::new(settings(transport.clone(), None), 3);
    let mut events = handle.subscribe();

    let outcome = pool.run(CancellationToken::new()).await;

    assert_eq!(outcome, RunOutcome::Completed { completions: 3 });
    assert_eq!(transport.calls(), 3);

    let snapshot = handle.board().snapshot();
    assert_eq!(snapshot.len(), 3);
    for (_, stats) in &snapshot {
        assert_eq!(stats.time_to_first_token, Some(Duration::from_millis(100)));
        assert_eq!(stats.prefill_tokens_per_second, Some(100.0));
        assert_eq!(stats.decode_tokens_per_second, Some(50.0));
        assert_eq!(stats.prompt_tokens, Some(10));
        assert_eq!(stats.completion_tokens, Some(5));
        assert!(stats.is_done);
    }

    let agg = handle.board().aggregate();
    assert_eq!(agg.average_prefill_tps, Some(100.0));
    assert_eq!(agg.average_decode_tps, Some(50.0));
    assert_eq!(agg.average_ttfr_ms, None);
    assert_eq!(agg.totals.completed_attempts, 3);
    assert_eq!(agg.totals.prompt_tokens, 30);
    assert_eq!(agg.totals.completion_tokens, 15);

    let completions = lifecycle(&drain(&mut events))
        .into_iter()
        .filter(|e| e.starts_with("completed"))
        .count();
    assert_eq!(completions, 3);
}

#[tokio::test(start_paused = true)]
async fn test_lowering_target_retires_after_in_flight_attempt() {
    let transport = Arc::new(ScriptedTransport::ok());
    let (pool, handle) = WorkerPool::new(settings(transport, LONG_RUN), 3);
    let mut events = handle.subscribe();
    let cancel = CancellationToken::new();
    let run = tokio::spawn(pool.run(cancel.clone()));

    sleep(Duration::from_millis(50)).await;
    handle.set_target_concurrency(1).unwrap();
    sleep(Duration::from_millis(1050)).await;

    let seen = drain(&mut events);
    let stopping: Vec<String> = lifecycle(&seen)
        .into_iter()
        .filter(|e| e.starts_with("stopping"))
        .collect();
    assert_eq!(stopping, vec!["stopping 1", "stopping 2"]);

    for slot in [1, 2] {
        let completed = position(&seen, |e| {
            matches!(e, PoolEvent::AttemptCompleted { slot: s, .. } if *s == slot)
        })
        .expect("stopping slot finishes its attempt");
        let retired = position(&seen, |e| matches!(e, PoolEvent::SlotRetired(s) if *s == slot))
            .expect("stopping slot retires");
        assert!(completed < retired);
        assert!(handle.board().get(slot).is_none());
    }

    let status = handle.status();
    assert_eq!((status.running, status.stopping), (1, 0));
    let ids: Vec<u64> = handle.board().snapshot().into_iter().map(|(id, _)| id).collect();
    assert_eq!(ids, vec![0]);
    // the remaining slot keeps looping back to back
    assert!(handle.board().get(0).unwrap().attempts >= 5);

    cancel.cancel();
    assert_eq!(run.await.unwrap(), RunOutcome::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn test_raising_target_spawns_fresh_slots() {
    let transport = Arc::new(ScriptedTransport::ok());
    let (pool, handle) = WorkerPool::new(settings(transport, LONG_RUN), 1);
    let mut events = handle.subscribe();
    let cancel = CancellationToken::new();
    let run = tokio::spawn(pool.run(cancel.clone()));

    sleep(Duration::from_millis(50)).await;
    handle.set_target_concurrency(3).unwrap();
    sleep(Duration::from_millis(10)).await;

    assert_eq!(
        lifecycle(&drain(&mut events)),
        vec!["spawned 0", "spawned 1", "spawned 2"]
    );
    assert_eq!(handle.status().running, 3);

    cancel.cancel();
    run.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_revival_keeps_slot_and_in_flight_attempt() {
    let transport = Arc::new(ScriptedTransport::ok());
    let (pool, handle) = WorkerPool::new(settings(transport, LONG_RUN), 3);
    let mut events = handle.subscribe();
    let cancel = CancellationToken::new();
    let run = tokio::spawn(pool.run(cancel.clone()));

    sleep(Duration::from_millis(50)).await;
    handle.set_target_concurrency(1).unwrap();
    sleep(Duration::from_millis(50)).await;
    handle.set_target_concurrency(3).unwrap();
    sleep(Duration::from_millis(1000)).await;

    let seen = lifecycle(&drain(&mut events));
    assert_eq!(
        seen,
        vec![
            "spawned 0",
            "spawned 1",
            "spawned 2",
            "stopping 1",
            "stopping 2",
            "revived 1",
            "revived 2",
        ]
    );

    // no attempt was dropped or duplicated: every slot ran the same schedule
    let attempts: Vec<u64> = handle
        .board()
        .snapshot()
        .into_iter()
        .map(|(_, stats)| stats.attempts)
        .collect();
    assert_eq!(attempts.len(), 3);
    assert!(attempts.iter().all(|&a| a == attempts[0]));

    cancel.cancel();
    run.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_slot_ids_never_reused_after_retirement() {
    let transport = Arc::new(ScriptedTransport::ok());
    let (pool, handle) = WorkerPool::new(settings(transport, LONG_RUN), 3);
    let mut events = handle.subscribe();
    let cancel = CancellationToken::new();
    let run = tokio::spawn(pool.run(cancel.clone()));

    sleep(Duration::from_millis(50)).await;
    handle.set_target_concurrency(1).unwrap();
    sleep(Duration::from_millis(500)).await;
    handle.set_target_concurrency(3).unwrap();
    sleep(Duration::from_millis(10)).await;

    let spawned: Vec<String> = lifecycle(&drain(&mut events))
        .into_iter()
        .filter(|e| e.starts_with("spawned"))
        .collect();
    assert_eq!(
        spawned,
        vec!["spawned 0", "spawned 1", "spawned 2", "spawned 3", "spawned 4"]
    );

    cancel.cancel();
    run.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_zero_target_drains_after_attempts_finish() {
    let transport = Arc::new(ScriptedTransport::ok());
    let (pool, handle) = WorkerPool::new(settings(transport, LONG_RUN), 2);
    let run = tokio::spawn(pool.run(CancellationToken::new()));
    let started = Instant::now();

    sleep(Duration::from_millis(50)).await;
    handle.set_target_concurrency(0).unwrap();

    assert_eq!(run.await.unwrap(), RunOutcome::Drained);
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert_eq!(handle.board().totals().completed_attempts, 2);
    assert!(handle.board().snapshot().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_backoff_grows_then_resets_on_success() {
    let transport = Arc::new(ScriptedTransport::ok().refusing_first(3));
    let (pool, handle) = WorkerPool::new(settings(transport, LONG_RUN), 1);
    let mut events = handle.subscribe();
    let cancel = CancellationToken::new();
    let started = Instant::now();
    let run = tokio::spawn(pool.run(cancel.clone()));

    let mut delays = Vec::new();
    wait_for(&mut events, |e| {
        if let PoolEvent::AttemptFailed { retry_in, .. } = e {
            delays.push(*retry_in);
        }
        matches!(e, PoolEvent::AttemptCompleted { .. })
    })
    .await;

    assert_eq!(
        delays,
        vec![
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(4)
        ]
    );
    assert!(started.elapsed() >= Duration::from_millis(7200));

    let stats = handle.board().get(0).unwrap();
    assert_eq!(stats.consecutive_errors, 0);
    assert!(stats.last_error.is_none());
    assert_eq!(handle.board().totals().failed_attempts, 3);

    cancel.cancel();
    run.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_failed_attempt_without_duration_completes_run() {
    let transport = Arc::new(ScriptedTransport::ok().refusing_first(1));
    let (pool, handle) = WorkerPool::new(settings(transport.clone(), None), 1);

    let outcome = pool.run(CancellationToken::new()).await;

    assert_eq!(outcome, RunOutcome::Completed { completions: 1 });
    assert_eq!(transport.calls(), 1);
    let stats = handle.board().get(0).unwrap();
    assert_eq!(
        stats.last_error.as_deref(),
        Some("Server error 503: overloaded (retrying in 1s)")
    );
    let totals = handle.board().totals();
    assert_eq!((totals.completed_attempts, totals.failed_attempts), (0, 1));
}

#[tokio::test(start_paused = true)]
async fn test_duration_bounds_the_run() {
    let transport = Arc::new(ScriptedTransport::ok());
    let (pool, handle) = WorkerPool::new(settings(transport, Some(Duration::from_millis(1100))), 2);
    let started = Instant::now();

    let outcome = pool.run(CancellationToken::new()).await;

    assert_eq!(outcome, RunOutcome::Completed { completions: 2 });
    assert!(started.elapsed() > Duration::from_millis(1100));
    // 200ms attempts, last one started before the deadline
    assert_eq!(handle.board().totals().completed_attempts, 12);
}
