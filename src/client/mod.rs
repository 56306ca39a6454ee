//! Chat completion transport.
//!
//! This module provides the `ChatTransport` trait that workers drive once per
//! attempt, plus the OpenAI-compatible implementation used by the CLI.

use async_trait::async_trait;
use futures_util::stream::BoxStream;

pub mod error;
pub mod openai;
pub mod sse;
pub mod types;

pub use error::TransportError;
pub use openai::OpenAiTransport;
pub use types::{ChatCompletionChunk, ChatCompletionRequest, ChunkDelta, Usage};

/// Stream of decoded chunks for one request.
pub type ChunkStream = BoxStream<'static, Result<ChatCompletionChunk, TransportError>>;

/// Source of incremental chat completion chunks.
///
/// # Object Safety
///
/// This trait is object-safe and designed to be used as `Arc<dyn ChatTransport>`.
///
/// # Contract
///
/// The returned stream yields chunks in arrival order and ends when the server
/// closes the stream. A delivery failure surfaces as a single `Err` item, after
/// which the stream must be considered terminated.
#[async_trait]
pub trait ChatTransport: Send + Sync + 'static {
    /// Human-readable target for logging and UI (e.g., the base URL).
    fn target(&self) -> &str;

    /// Open a streaming chat completion for a single user prompt.
    ///
    /// # Returns
    ///
    /// - `Ok(ChunkStream)` once the server accepted the request
    /// - `Err(TransportError::Upstream)` if the server answered with 4xx/5xx
    /// - `Err(TransportError::Network | Timeout)` if the request could not be sent
    async fn stream_chat(&self, model: &str, prompt: &str) -> Result<ChunkStream, TransportError>;
}
