//! Inference endpoint configuration

use serde::{Deserialize, Serialize};

/// Default OpenAI-compatible base URL (a local vLLM server)
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/v1";

/// Endpoint configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Base URL; `/chat/completions` is appended
    pub base_url: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    /// Per-request timeout, covering the whole streamed response
    pub timeout_seconds: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_seconds: 300,
        }
    }
}

impl EndpointConfig {
    /// Read the API key from the configured environment variable.
    ///
    /// Unset or empty means requests are sent without authorization.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.is_empty())
    }
}
