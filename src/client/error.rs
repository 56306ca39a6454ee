//! Error types for transport operations.

use thiserror::Error;

/// Errors raised while opening or consuming a chat completion stream.
///
/// Every variant is a transient attempt failure: the owning worker backs
/// off and retries, nothing escalates beyond the attempt.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    /// Network connectivity error (DNS, connection refused, reset mid-body).
    #[error("Network error: {0}")]
    Network(String),

    /// Request exceeded deadline.
    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    /// Server returned an error response (4xx, 5xx) before streaming started.
    #[error("Server error {status}: {message}")]
    Upstream { status: u16, message: String },

    /// Server sent an error frame in the middle of the event stream.
    #[error("Stream error: {0}")]
    Stream(String),

    /// Frame doesn't match the expected chunk format.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}
