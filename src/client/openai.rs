//! OpenAI-compatible transport implementation.

use super::sse::{SseDecoder, SseFrame};
use super::types::{ChatCompletionChunk, ChatCompletionRequest, ErrorFrame};
use super::{ChatTransport, ChunkStream, TransportError};
use async_trait::async_trait;
use futures_util::stream::StreamExt;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

/// OpenAI-compatible streaming transport.
///
/// Sends `POST {base_url}/chat/completions` with `stream: true` and decodes the
/// server-sent event body into [`ChatCompletionChunk`]s. Works against vLLM,
/// llama.cpp, SGLang, OpenRouter and the OpenAI API itself.
pub struct OpenAiTransport {
    /// Base URL including the API prefix (e.g., "http://localhost:8000/v1")
    base_url: String,
    /// Optional API key for Bearer authentication
    api_key: Option<String>,
    /// Per-request deadline, covering the whole streamed body
    timeout: Duration,
    /// Shared HTTP client for connection pooling
    client: Arc<Client>,
}

impl OpenAiTransport {
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        timeout: Duration,
        client: Arc<Client>,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            timeout,
            client,
        }
    }

    fn map_request_error(timeout: Duration, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout(timeout.as_millis() as u64)
        } else {
            TransportError::Network(e.to_string())
        }
    }
}

/// Parse one `data:` payload into a chunk, surfacing error frames.
pub fn parse_chunk(data: &str) -> Result<ChatCompletionChunk, TransportError> {
    let value: serde_json::Value = serde_json::from_str(data).map_err(|e| {
        TransportError::InvalidResponse(format!("Failed to parse stream chunk: {}", e))
    })?;

    if value.get("error").is_some() {
        let frame: ErrorFrame = serde_json::from_value(value).map_err(|e| {
            TransportError::InvalidResponse(format!("Failed to parse error frame: {}", e))
        })?;
        return Err(TransportError::Stream(frame.error.message));
    }

    serde_json::from_value(value).map_err(|e| {
        TransportError::InvalidResponse(format!("Failed to parse stream chunk: {}", e))
    })
}

#[async_trait]
impl ChatTransport for OpenAiTransport {
    fn target(&self) -> &str {
        &self.base_url
    }

    async fn stream_chat(&self, model: &str, prompt: &str) -> Result<ChunkStream, TransportError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatCompletionRequest::streaming(model, prompt);
        let timeout = self.timeout;

        let mut builder = self
            .client
            .post(&url)
            .json(&request)
            .timeout(timeout);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Self::map_request_error(timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(TransportError::Upstream {
                status: status.as_u16(),
                message: error_body,
            });
        }

        let mut bytes = response.bytes_stream();
        let stream = async_stream::stream! {
            let mut decoder = SseDecoder::new();
            let mut finished = false;

            while !finished {
                let Some(next) = bytes.next().await else {
                    break;
                };
                let bytes = match next {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        yield Err(Self::map_request_error(timeout, e));
                        return;
                    }
                };

                for frame in decoder.push(&bytes) {
                    match frame {
                        SseFrame::Done => {
                            finished = true;
                            break;
                        }
                        SseFrame::Data(data) => match parse_chunk(&data) {
                            Ok(chunk) => yield Ok(chunk),
                            Err(e) => {
                                yield Err(e);
                                return;
                            }
                        },
                    }
                }
            }

            if !finished {
                if let Some(SseFrame::Data(data)) = decoder.finish() {
                    yield parse_chunk(&data);
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
