//! Typed signals produced by the stream interpreter.

use crate::client::Usage;
use std::time::Duration;

/// One signal extracted from a chat completion stream.
///
/// Per attempt: `FirstToken` / `FirstReasoningToken` occur at most once each
/// and precede the first corresponding delta, `Usage` occurs at most once,
/// and exactly one `Done` ends the sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Time from attempt start to the first content fragment
    FirstToken(Duration),
    /// Time from attempt start to the first reasoning fragment
    FirstReasoningToken(Duration),
    /// Generated answer text
    Content { text: String, byte_len: usize },
    /// Generated reasoning text
    Reasoning { text: String, byte_len: usize },
    /// Final token accounting reported by the server
    Usage(Usage),
    /// The stream closed normally
    Done,
}

impl StreamEvent {
    pub fn content(text: &str) -> Self {
        StreamEvent::Content {
            text: text.to_string(),
            byte_len: text.len(),
        }
    }

    pub fn reasoning(text: &str) -> Self {
        StreamEvent::Reasoning {
            text: text.to_string(),
            byte_len: text.len(),
        }
    }

    /// Bytes contributed to throughput by this event.
    pub fn byte_len(&self) -> usize {
        match self {
            StreamEvent::Content { byte_len, .. } | StreamEvent::Reasoning { byte_len, .. } => {
                *byte_len
            }
            _ => 0,
        }
    }
}
