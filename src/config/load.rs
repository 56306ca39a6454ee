//! Load shape configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_PROMPT: &str = "Tell me about the history of Tokyo.";

/// What to send and how many streams to keep open
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    /// Model identifier sent with every request (required)
    pub model: String,
    /// Initial target concurrency
    pub concurrency: usize,
    pub prompt: String,
    /// Keep looping attempts for this long; unset runs one attempt per worker
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u64>,
    /// Event log destination: a file path, or `stdout`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            concurrency: 1,
            prompt: DEFAULT_PROMPT.to_string(),
            duration_seconds: None,
            output: None,
        }
    }
}

impl LoadConfig {
    pub fn run_duration(&self) -> Option<Duration> {
        self.duration_seconds.map(Duration::from_secs)
    }
}
