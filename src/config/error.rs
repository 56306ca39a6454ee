//! Errors raised while loading or validating a run configuration

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is present but outside its allowed range
    #[error("Invalid value for '{field}': {message}")]
    Validation { field: String, message: String },

    /// Required for a run, but not set by file, environment or flags
    #[error("Missing required field: {0}")]
    MissingField(String),
}
