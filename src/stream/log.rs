//! Append-only JSON-lines event log.
//!
//! Each attempt opens its own handle in append mode, so concurrent workers
//! sharing one destination never rewrite each other's lines. Log failures are
//! reported through `tracing` and never fail the attempt.

use crate::client::Usage;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::path::PathBuf;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Where raw stream events are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventLogTarget {
    /// Append to a file, creating it if needed
    File(PathBuf),
    /// Pass through to the process stdout
    Stdout,
}

impl EventLogTarget {
    /// Interpret a user-supplied output destination; `stdout` selects the console.
    pub fn from_output(output: &str) -> Self {
        if output == "stdout" {
            EventLogTarget::Stdout
        } else {
            EventLogTarget::File(PathBuf::from(output))
        }
    }
}

/// Event-type discriminator of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogEntryKind {
    Start,
    Content,
    Reasoning,
    Usage,
    Done,
}

/// One line of the event log.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry<'a> {
    pub timestamp: String,
    pub request_id: &'a str,
    #[serde(rename = "type")]
    pub kind: LogEntryKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl<'a> LogEntry<'a> {
    fn new(request_id: &'a str, kind: LogEntryKind) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            request_id,
            kind,
            prompt: None,
            content: None,
            reasoning: None,
            usage: None,
        }
    }

    pub fn start(request_id: &'a str, prompt: &'a str) -> Self {
        Self {
            prompt: Some(prompt),
            ..Self::new(request_id, LogEntryKind::Start)
        }
    }

    pub fn content(request_id: &'a str, content: &'a str) -> Self {
        Self {
            content: Some(content),
            ..Self::new(request_id, LogEntryKind::Content)
        }
    }

    pub fn reasoning(request_id: &'a str, reasoning: &'a str) -> Self {
        Self {
            reasoning: Some(reasoning),
            ..Self::new(request_id, LogEntryKind::Reasoning)
        }
    }

    pub fn usage(request_id: &'a str, usage: Usage) -> Self {
        Self {
            usage: Some(usage),
            ..Self::new(request_id, LogEntryKind::Usage)
        }
    }

    pub fn done(request_id: &'a str) -> Self {
        Self::new(request_id, LogEntryKind::Done)
    }
}

/// Open event-log sink for a single attempt.
pub struct EventLog {
    writer: Box<dyn AsyncWrite + Send + Unpin>,
    target: EventLogTarget,
}

impl EventLog {
    /// Open the destination. Returns `None` (after logging a warning) when the
    /// file can't be opened; the attempt proceeds without an event log.
    pub async fn open(target: &EventLogTarget) -> Option<Self> {
        let writer: Box<dyn AsyncWrite + Send + Unpin> = match target {
            EventLogTarget::Stdout => Box::new(tokio::io::stdout()),
            EventLogTarget::File(path) => {
                match tokio::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .await
                {
                    Ok(file) => Box::new(file),
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "Failed to open event log");
                        return None;
                    }
                }
            }
        };

        Some(Self {
            writer,
            target: target.clone(),
        })
    }

    /// Append one entry as a single JSON line.
    pub async fn record(&mut self, entry: &LogEntry<'_>) {
        let mut line = match serde_json::to_string(entry) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize event log entry");
                return;
            }
        };
        line.push('\n');

        if let Err(e) = self.writer.write_all(line.as_bytes()).await {
            tracing::warn!(target_sink = ?self.target, error = %e, "Failed to write event log entry");
        }
    }

    /// Flush buffered lines and release the handle. Stdout is flushed, not closed.
    pub async fn close(mut self) {
        if let Err(e) = self.writer.flush().await {
            tracing::warn!(target_sink = ?self.target, error = %e, "Failed to close event log");
        }
        if let EventLogTarget::File(_) = self.target {
            if let Err(e) = self.writer.shutdown().await {
                tracing::warn!(target_sink = ?self.target, error = %e, "Failed to close event log");
            }
        }
    }
}
