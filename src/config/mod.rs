//! Configuration module for loadllm
//!
//! Provides layered configuration loading from files, environment variables, and defaults.
//!
//! # Configuration Precedence
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables (`OPENAI_API_BASE`, `LOADLLM_*`)
//! 3. Configuration file (TOML)
//! 4. Default values (lowest priority)
//!
//! # Example
//!
//! ```rust
//! use loadllm::config::LoadllmConfig;
//!
//! let toml = r#"
//! [load]
//! model = "gpt-oss-20b"
//! concurrency = 8
//! "#;
//! let config: LoadllmConfig = toml::from_str(toml).unwrap();
//! assert_eq!(config.load.concurrency, 8);
//! assert_eq!(config.endpoint.base_url, "http://localhost:8000/v1");
//! ```

pub mod endpoint;
pub mod error;
pub mod load;
pub mod logging;
pub mod retry;

pub use endpoint::{EndpointConfig, DEFAULT_BASE_URL};
pub use error::ConfigError;
pub use load::{LoadConfig, DEFAULT_PROMPT};
pub use logging::{LogFormat, LoggingConfig};
pub use retry::{DisplayConfig, RetryConfig, SamplerConfig};

use crate::worker::MAX_SAMPLES;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Unified configuration for a load run.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoadllmConfig {
    /// Target server
    pub endpoint: EndpointConfig,
    /// Model, prompt, concurrency and run length
    pub load: LoadConfig,
    /// Backoff between failed attempts
    pub retry: RetryConfig,
    /// Byte-rate sampling
    pub sampler: SamplerConfig,
    /// Status line cadence
    pub display: DisplayConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl LoadllmConfig {
    /// Load configuration from a TOML file
    ///
    /// If path is None, returns default configuration.
    /// If path doesn't exist, returns NotFound error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => {
                if !p.exists() {
                    return Err(ConfigError::NotFound(p.to_path_buf()));
                }
                let content = std::fs::read_to_string(p)?;
                Ok(toml::from_str(&content)?)
            }
            None => Ok(Self::default()),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Invalid values are silently ignored (defaults are kept).
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(base_url) = std::env::var("OPENAI_API_BASE") {
            if !base_url.is_empty() {
                self.endpoint.base_url = base_url;
            }
        }

        if let Ok(model) = std::env::var("LOADLLM_MODEL") {
            self.load.model = model;
        }
        if let Ok(concurrency) = std::env::var("LOADLLM_CONCURRENCY") {
            if let Ok(c) = concurrency.parse() {
                self.load.concurrency = c;
            }
        }

        if let Ok(level) = std::env::var("LOADLLM_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("LOADLLM_LOG_FORMAT") {
            if let Ok(f) = format.parse() {
                self.logging.format = f;
            }
        }

        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.load.model.trim().is_empty() {
            return Err(ConfigError::MissingField("load.model".to_string()));
        }
        if self.endpoint.base_url.trim().is_empty() {
            return Err(validation("endpoint.base_url", "URL cannot be empty"));
        }
        if self.retry.base_delay_ms == 0 {
            return Err(validation("retry.base_delay_ms", "must be non-zero"));
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(validation(
                "retry.max_delay_ms",
                "must be at least retry.base_delay_ms",
            ));
        }
        if self.sampler.samples == 0 || self.sampler.samples > MAX_SAMPLES {
            return Err(validation(
                "sampler.samples",
                &format!("must be between 1 and {}", MAX_SAMPLES),
            ));
        }
        if self.display.refresh_ms == 0 {
            return Err(validation("display.refresh_ms", "must be non-zero"));
        }
        if self.load.duration_seconds == Some(0) {
            return Err(validation(
                "load.duration_seconds",
                "must be non-zero when set",
            ));
        }

        Ok(())
    }
}

fn validation(field: &str, message: &str) -> ConfigError {
    ConfigError::Validation {
        field: field.to_string(),
        message: message.to_string(),
    }
}
