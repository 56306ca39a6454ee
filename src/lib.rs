//! loadllm - Load generation for streaming chat completion endpoints
//!
//! This library keeps a user-adjustable number of concurrent request loops
//! running against an OpenAI-compatible server and aggregates latency and
//! throughput signals across all of them.
//!
//! - [`pool`] reconciles live workers against a target concurrency
//! - [`worker`] runs one retrying request loop per slot
//! - [`stream`] turns a chunk stream into typed timing and delta events
//! - [`metrics`] merges per-worker stats into system-wide rates

pub mod cli;
pub mod client;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod pool;
pub mod stream;
pub mod worker;
