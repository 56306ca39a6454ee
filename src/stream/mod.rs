//! Stream interpretation.
//!
//! Turns the raw chunk stream of one request attempt into typed
//! [`StreamEvent`]s: first-token timings, content and reasoning deltas with
//! their UTF-8 byte lengths, the usage report, and a terminal `Done`.
//! Optionally mirrors every event into a JSON-lines [`EventLog`].

pub mod events;
pub mod log;

pub use events::StreamEvent;
pub use log::{EventLog, EventLogTarget, LogEntry, LogEntryKind};

use crate::client::{ChatTransport, TransportError};
use futures_util::stream::{BoxStream, StreamExt};
use std::sync::Arc;
use tokio::time::Instant;

/// Lazy, finite, non-restartable sequence of events for one attempt.
pub type EventStream = BoxStream<'static, Result<StreamEvent, TransportError>>;

/// Produces one [`EventStream`] per attempt for a fixed model and prompt.
#[derive(Clone)]
pub struct Interpreter {
    transport: Arc<dyn ChatTransport>,
    model: Arc<str>,
    prompt: Arc<str>,
    log_target: Option<EventLogTarget>,
}

impl Interpreter {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        model: &str,
        prompt: &str,
        log_target: Option<EventLogTarget>,
    ) -> Self {
        Self {
            transport,
            model: Arc::from(model),
            prompt: Arc::from(prompt),
            log_target,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Start interpreting a new attempt.
    ///
    /// Nothing happens until the returned stream is polled. Timings are
    /// measured from `started`. A transport failure is yielded as a single
    /// `Err` and ends the stream; the event log is closed on every path
    /// (dropping the stream early drops and closes the file handle).
    pub fn interpret(&self, request_id: &str, started: Instant) -> EventStream {
        let transport = Arc::clone(&self.transport);
        let model = Arc::clone(&self.model);
        let prompt = Arc::clone(&self.prompt);
        let log_target = self.log_target.clone();
        let request_id = request_id.to_string();

        Box::pin(async_stream::stream! {
            let mut log = match &log_target {
                Some(target) => EventLog::open(target).await,
                None => None,
            };
            if let Some(log) = log.as_mut() {
                log.record(&LogEntry::start(&request_id, &prompt)).await;
            }

            let mut chunks = match transport.stream_chat(&model, &prompt).await {
                Ok(chunks) => chunks,
                Err(e) => {
                    if let Some(log) = log.take() {
                        log.close().await;
                    }
                    yield Err(e);
                    return;
                }
            };

            let mut seen_content = false;
            let mut seen_reasoning = false;
            let mut seen_usage = false;

            while let Some(next) = chunks.next().await {
                let chunk = match next {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        if let Some(log) = log.take() {
                            log.close().await;
                        }
                        yield Err(e);
                        return;
                    }
                };

                if let Some(delta) = chunk.first_delta() {
                    if let Some(text) = delta.content.as_deref().filter(|t| !t.is_empty()) {
                        if !seen_content {
                            seen_content = true;
                            yield Ok(StreamEvent::FirstToken(started.elapsed()));
                        }
                        if let Some(log) = log.as_mut() {
                            log.record(&LogEntry::content(&request_id, text)).await;
                        }
                        yield Ok(StreamEvent::content(text));
                    }

                    if let Some(text) = delta.reasoning.as_deref().filter(|t| !t.is_empty()) {
                        if !seen_reasoning {
                            seen_reasoning = true;
                            yield Ok(StreamEvent::FirstReasoningToken(started.elapsed()));
                        }
                        if let Some(log) = log.as_mut() {
                            log.record(&LogEntry::reasoning(&request_id, text)).await;
                        }
                        yield Ok(StreamEvent::reasoning(text));
                    }
                }

                if let Some(usage) = chunk.usage {
                    if !seen_usage {
                        seen_usage = true;
                        if let Some(log) = log.as_mut() {
                            log.record(&LogEntry::usage(&request_id, usage)).await;
                        }
                        yield Ok(StreamEvent::Usage(usage));
                    }
                }
            }

            if let Some(mut log) = log.take() {
                log.record(&LogEntry::done(&request_id)).await;
                log.close().await;
            }
            yield Ok(StreamEvent::Done);
        })
    }
}
