//! Shared test utilities for loadllm integration tests.
//!
//! Provides a scripted in-process transport, pool settings builders and
//! helpers for waiting on pool events.

#![allow(dead_code)]

use async_trait::async_trait;
use loadllm::client::{ChatCompletionChunk, ChatTransport, ChunkStream, TransportError};
use loadllm::pool::{PoolEvent, PoolSettings};
use loadllm::stream::{EventLogTarget, Interpreter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// One step of a scripted response: wait, then yield.
pub type ScriptStep = (Duration, Result<ChatCompletionChunk, TransportError>);

/// Canonical attempt: "ok" after 100ms, usage 10/5 after 200ms.
pub fn ok_script() -> Vec<ScriptStep> {
    vec![
        (
            Duration::from_millis(100),
            Ok(ChatCompletionChunk::content("ok")),
        ),
        (
            Duration::from_millis(100),
            Ok(ChatCompletionChunk::usage(10, 5)),
        ),
    ]
}

/// Replays the same script for every request, optionally refusing the first few.
pub struct ScriptedTransport {
    script: Vec<ScriptStep>,
    refuse_first: usize,
    calls: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new(script: Vec<ScriptStep>) -> Self {
        Self {
            script,
            refuse_first: 0,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn ok() -> Self {
        Self::new(ok_script())
    }

    /// Answer the first `n` requests with a 503.
    pub fn refusing_first(mut self, n: usize) -> Self {
        self.refuse_first = n;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    fn target(&self) -> &str {
        "scripted"
    }

    async fn stream_chat(&self, _model: &str, _prompt: &str) -> Result<ChunkStream, TransportError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.refuse_first {
            return Err(TransportError::Upstream {
                status: 503,
                message: "overloaded".to_string(),
            });
        }

        let script = self.script.clone();
        Ok(Box::pin(async_stream::stream! {
            for (delay, item) in script {
                tokio::time::sleep(delay).await;
                yield item;
            }
        }))
    }
}

/// Pool settings around a transport with default backoff and sampling.
pub fn settings(transport: Arc<dyn ChatTransport>, run_duration: Option<Duration>) -> PoolSettings {
    PoolSettings {
        run_duration,
        ..PoolSettings::new(Interpreter::new(transport, "test-model", "p", None))
    }
}

/// Same as [`settings`] with a JSON-lines event log.
pub fn settings_with_log(
    transport: Arc<dyn ChatTransport>,
    run_duration: Option<Duration>,
    log: EventLogTarget,
) -> PoolSettings {
    PoolSettings {
        run_duration,
        ..PoolSettings::new(Interpreter::new(transport, "test-model", "p", Some(log)))
    }
}

/// Receive events until one matches, skipping lag. Panics after a minute of
/// (virtual) time.
pub async fn wait_for<F>(events: &mut broadcast::Receiver<PoolEvent>, mut matches: F) -> PoolEvent
where
    F: FnMut(&PoolEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            match events.recv().await {
                Ok(event) if matches(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("pool event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for pool event")
}

/// Everything currently buffered on the receiver.
pub fn drain(events: &mut broadcast::Receiver<PoolEvent>) -> Vec<PoolEvent> {
    let mut out = Vec::new();
    loop {
        match events.try_recv() {
            Ok(event) => out.push(event),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => return out,
        }
    }
}

/// Lifecycle events only (no stats or attempt traffic), in order.
pub fn lifecycle(events: &[PoolEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            PoolEvent::SlotSpawned(id) => Some(format!("spawned {}", id)),
            PoolEvent::SlotStopping(id) => Some(format!("stopping {}", id)),
            PoolEvent::SlotRevived(id) => Some(format!("revived {}", id)),
            PoolEvent::SlotRetired(id) => Some(format!("retired {}", id)),
            PoolEvent::RunCompleted(id) => Some(format!("completed {}", id)),
            _ => None,
        })
        .collect()
}
