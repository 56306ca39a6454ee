//! CLI module for loadllm
//!
//! Command-line interface definitions and handlers for the load harness.
//!
//! # Commands
//!
//! - `run` - Generate load against a streaming chat completion endpoint
//! - `config` - Configuration utilities (init)
//! - `completions` - Generate shell completions
//!
//! # Example
//!
//! ```bash
//! # Four concurrent streams for one minute, raw events to a file
//! loadllm run -m gpt-oss-20b -c 4 -d 60 -o events.jsonl
//!
//! # Generate shell completions
//! loadllm completions bash > ~/.bash_completion.d/loadllm
//! ```

pub mod completions;
pub mod config;
pub mod output;
pub mod run;

pub use completions::handle_completions;
pub use config::handle_config_init;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// loadllm - Load generator for streaming LLM endpoints
#[derive(Parser, Debug)]
#[command(
    name = "loadllm",
    version,
    about = "Load generator for OpenAI-compatible streaming chat endpoints"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a load test
    Run(RunArgs),
    /// Configuration utilities
    #[command(subcommand)]
    Config(ConfigCommands),
    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Model to request
    #[arg(short, long)]
    pub model: Option<String>,

    /// Initial number of concurrent streams
    #[arg(short, long)]
    pub concurrency: Option<usize>,

    /// Prompt sent with every request
    #[arg(short, long)]
    pub prompt: Option<String>,

    /// Keep issuing requests for this many seconds (default: one request per worker)
    #[arg(short, long)]
    pub duration: Option<u64>,

    /// Write raw stream events as JSON lines to a file, or `stdout`
    #[arg(short, long)]
    pub output: Option<String>,

    /// Path to configuration file
    #[arg(long, default_value = "loadllm.toml")]
    pub config: PathBuf,

    /// Override the endpoint base URL
    #[arg(long)]
    pub base_url: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Print the final summary as JSON
    #[arg(long)]
    pub json: bool,

    /// Ignore stdin; concurrency stays at its initial value
    #[arg(long)]
    pub no_input: bool,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Initialize a new configuration file
    Init(ConfigInitArgs),
}

#[derive(Args, Debug)]
pub struct ConfigInitArgs {
    /// Output file path
    #[arg(short, long, default_value = "loadllm.toml")]
    pub output: PathBuf,

    /// Overwrite existing file
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}
