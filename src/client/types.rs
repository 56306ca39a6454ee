//! Wire types for OpenAI-compatible streaming chat completions.

use serde::{Deserialize, Serialize};

/// Chat completion request matching OpenAI format.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<StreamOptions>,
    /// Ask reasoning-capable servers to stream their reasoning deltas
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<ReasoningOptions>,
}

impl ChatCompletionRequest {
    /// Single-turn streaming request with usage reporting enabled.
    pub fn streaming(model: &str, prompt: &str) -> Self {
        Self {
            model: model.to_string(),
            messages: vec![ChatMessage::user(prompt)],
            stream: true,
            stream_options: Some(StreamOptions {
                include_usage: true,
            }),
            reasoning: Some(ReasoningOptions { enabled: true }),
        }
    }
}

/// A single message in the conversation.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: content.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct StreamOptions {
    pub include_usage: bool,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct ReasoningOptions {
    pub enabled: bool,
}

/// Token usage statistics, reported once at the end of a stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// Chat completion chunk for streaming responses.
///
/// Identity fields are optional because OpenAI-compatible servers disagree on
/// which of them the final usage-only chunk carries.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl ChatCompletionChunk {
    /// Chunk carrying a single content delta.
    pub fn content(text: &str) -> Self {
        Self::with_delta(ChunkDelta {
            content: Some(text.to_string()),
            ..ChunkDelta::default()
        })
    }

    /// Chunk carrying a single reasoning delta.
    pub fn reasoning(text: &str) -> Self {
        Self::with_delta(ChunkDelta {
            reasoning: Some(text.to_string()),
            ..ChunkDelta::default()
        })
    }

    /// Final usage-only chunk (no choices).
    pub fn usage(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            usage: Some(Usage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            }),
            ..Self::default()
        }
    }

    fn with_delta(delta: ChunkDelta) -> Self {
        Self {
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason: None,
            }],
            ..Self::default()
        }
    }

    /// Delta of the first choice, if the chunk carries one.
    pub fn first_delta(&self) -> Option<&ChunkDelta> {
        self.choices.first().map(|c| &c.delta)
    }
}

/// A single choice in a streaming chunk.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub delta: ChunkDelta,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// Delta content in a streaming chunk.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChunkDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// `reasoning` (OpenRouter style) or `reasoning_content` (vLLM, DeepSeek)
    #[serde(
        default,
        alias = "reasoning_content",
        skip_serializing_if = "Option::is_none"
    )]
    pub reasoning: Option<String>,
}

/// Error frame some servers emit in place of a chunk.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorFrame {
    pub error: ErrorFrameBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorFrameBody {
    pub message: String,
    #[serde(default)]
    pub code: Option<serde_json::Value>,
}
