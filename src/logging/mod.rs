//! Structured logging helpers
//!
//! Filter directive construction for the tracing subscriber, request id
//! generation for attempt correlation, and a privacy-safe prompt preview.

use uuid::Uuid;

/// Maximum characters of the prompt shown in log lines
const PROMPT_PREVIEW_CHARS: usize = 100;

/// Build filter directives string from LoggingConfig
///
/// Constructs a tracing filter string that includes the base log level
/// and any component-specific log levels configured in the LoggingConfig.
///
/// # Returns
///
/// A filter string in the format: "base_level,loadllm::component1=level1,loadllm::component2=level2"
///
/// # Examples
///
/// ```
/// use loadllm::config::logging::{LogFormat, LoggingConfig};
/// use loadllm::logging::build_filter_directives;
/// use std::collections::HashMap;
///
/// let mut component_levels = HashMap::new();
/// component_levels.insert("worker".to_string(), "debug".to_string());
///
/// let config = LoggingConfig {
///     level: "info".to_string(),
///     format: LogFormat::Pretty,
///     component_levels: Some(component_levels),
/// };
///
/// let filter_str = build_filter_directives(&config);
/// assert_eq!(filter_str, "info,loadllm::worker=debug");
/// ```
pub fn build_filter_directives(config: &crate::config::LoggingConfig) -> String {
    let mut filter_str = config.level.clone();

    if let Some(component_levels) = &config.component_levels {
        let mut components: Vec<_> = component_levels.iter().collect();
        components.sort();
        for (component, level) in components {
            filter_str.push_str(&format!(",loadllm::{}={}", component, level));
        }
    }

    filter_str
}

/// Generate a new request ID using UUID v4
///
/// Fresh per attempt; correlates event-log lines and diagnostics.
pub fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// First ~100 characters of the prompt, with an ellipsis when cut.
pub fn preview_prompt(prompt: &str) -> String {
    let mut chars = prompt.chars();
    let preview: String = chars.by_ref().take(PROMPT_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", preview)
    } else {
        preview
    }
}
