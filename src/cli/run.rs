//! Run command implementation

use crate::cli::output::{
    format_status_line, format_summary_json, format_summary_table, outcome_label, RunSummary,
    SlotView,
};
use crate::cli::RunArgs;
use crate::client::{ChatTransport, OpenAiTransport};
use crate::config::{LogFormat, LoadllmConfig};
use crate::pool::{PoolEvent, PoolHandle, PoolSettings, RunOutcome, WorkerPool};
use crate::stream::{EventLogTarget, Interpreter};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Load configuration with CLI overrides
pub fn load_config_with_overrides(
    args: &RunArgs,
) -> Result<LoadllmConfig, Box<dyn std::error::Error>> {
    // Load from file if it exists, otherwise use defaults
    let mut config = if args.config.exists() {
        LoadllmConfig::load(Some(&args.config))?
    } else {
        tracing::debug!("Config file not found, using defaults");
        LoadllmConfig::default()
    };

    // Apply environment variable overrides
    config = config.with_env_overrides();

    // Apply CLI overrides (highest priority)
    if let Some(ref model) = args.model {
        config.load.model = model.clone();
    }
    if let Some(concurrency) = args.concurrency {
        config.load.concurrency = concurrency;
    }
    if let Some(ref prompt) = args.prompt {
        config.load.prompt = prompt.clone();
    }
    if let Some(duration) = args.duration {
        config.load.duration_seconds = Some(duration);
    }
    if let Some(ref output) = args.output {
        config.load.output = Some(output.clone());
    }
    if let Some(ref base_url) = args.base_url {
        config.endpoint.base_url = base_url.clone();
    }
    if let Some(ref log_level) = args.log_level {
        config.logging.level = log_level.clone();
    }

    Ok(config)
}

/// Initialize tracing based on configuration
///
/// Diagnostics go to stderr; stdout is reserved for the summary and, with
/// `--output stdout`, the raw event log.
pub fn init_tracing(
    config: &crate::config::LoggingConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    // Build filter directives using helper function
    let filter_str = crate::logging::build_filter_directives(config);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    match config.format {
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .compact()
                        .with_writer(std::io::stderr),
                )
                .try_init()?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .try_init()?;
        }
    }

    Ok(())
}

/// Build the OpenAI-compatible transport from the endpoint section
pub fn build_transport(
    config: &LoadllmConfig,
) -> Result<Arc<dyn ChatTransport>, Box<dyn std::error::Error>> {
    let client = reqwest::Client::builder().build()?;
    Ok(Arc::new(OpenAiTransport::new(
        config.endpoint.base_url.clone(),
        config.endpoint.api_key(),
        Duration::from_secs(config.endpoint.timeout_seconds),
        Arc::new(client),
    )))
}

/// Pool settings derived from the load, retry and sampler sections
pub fn pool_settings(config: &LoadllmConfig, transport: Arc<dyn ChatTransport>) -> PoolSettings {
    let log_target = config.load.output.as_deref().map(EventLogTarget::from_output);
    PoolSettings {
        interpreter: Interpreter::new(
            transport,
            &config.load.model,
            &config.load.prompt,
            log_target,
        ),
        backoff: config.retry.backoff(),
        samples: config.sampler.samples,
        run_duration: config.load.run_duration(),
    }
}

/// A line of user input while a run is in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlInput {
    Adjust(i64),
    Set(usize),
    Quit,
}

/// Parse one stdin line; unknown input yields `None`.
pub fn parse_control(line: &str) -> Option<ControlInput> {
    match line.trim() {
        "+" | "up" | "k" => Some(ControlInput::Adjust(1)),
        "-" | "down" | "j" => Some(ControlInput::Adjust(-1)),
        "q" | "quit" | "exit" => Some(ControlInput::Quit),
        other => other.parse().ok().map(ControlInput::Set),
    }
}

/// Forward stdin lines to the pool until EOF or quit.
///
/// Stdin is read on a plain thread: a pending blocking read can't be
/// cancelled and must not hold up runtime shutdown.
async fn read_control(handle: PoolHandle, cancel: CancellationToken) {
    let (tx, mut lines) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => return,
            line = lines.recv() => match line {
                Some(line) => line,
                None => return,
            },
        };

        let result = match parse_control(&line) {
            Some(ControlInput::Adjust(delta)) => handle.adjust_target(delta),
            Some(ControlInput::Set(target)) => handle.set_target_concurrency(target),
            Some(ControlInput::Quit) => {
                tracing::info!("Quit requested");
                cancel.cancel();
                return;
            }
            None => {
                tracing::warn!(input = %line.trim(), "Unknown command (use +, -, a number, or q)");
                Ok(())
            }
        };
        if result.is_err() {
            return;
        }
    }
}

/// Log a status line every `every` until cancelled; surface notable pool events.
async fn report_status(
    handle: PoolHandle,
    every: Duration,
    run_duration: Option<Duration>,
    cancel: CancellationToken,
) {
    let mut events = handle.subscribe();
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = interval.tick() => {
                let status = handle.status();
                let stats = handle.board().aggregate();
                tracing::info!(
                    target_concurrency = status.target,
                    running = status.running,
                    stopping = status.stopping,
                    "{}",
                    format_status_line(&stats, status.running, status.target, run_duration)
                );
            }
            event = events.recv() => match event {
                Ok(PoolEvent::TargetChanged { target }) => {
                    tracing::info!(target_concurrency = target, "Target concurrency set");
                }
                Ok(PoolEvent::SlotRetired(slot)) => {
                    tracing::info!(slot, "Worker retired");
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Status reporter lagged behind pool events");
                }
                Err(broadcast::error::RecvError::Closed) => return,
            },
        }
    }
}

/// Wait for Ctrl-C (or SIGTERM) and cancel the run
async fn shutdown_signal(cancel_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, stopping run...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, stopping run...");
        }
        _ = cancel_token.cancelled() => return,
    }

    cancel_token.cancel();
}

/// Collect the final summary from the pool's stats board
pub fn build_summary(
    handle: &PoolHandle,
    config: &LoadllmConfig,
    outcome: RunOutcome,
) -> RunSummary {
    let board = handle.board();
    RunSummary {
        outcome: outcome_label(outcome),
        model: config.load.model.clone(),
        endpoint: config.endpoint.base_url.clone(),
        aggregate: board.aggregate(),
        slots: board
            .snapshot()
            .iter()
            .map(|(slot, stats)| SlotView::from((*slot, stats)))
            .collect(),
    }
}

/// Main run command handler
pub async fn run_load(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load and merge configuration
    let config = load_config_with_overrides(&args)?;

    // 2. Initialize tracing
    init_tracing(&config.logging)?;

    // Validate configuration
    config.validate()?;
    tracing::debug!(?config, "Loaded configuration");

    // 3. Build transport and pool
    let transport = build_transport(&config)?;
    tracing::info!(
        endpoint = transport.target(),
        model = %config.load.model,
        concurrency = config.load.concurrency,
        duration_seconds = ?config.load.duration_seconds,
        prompt = %crate::logging::preview_prompt(&config.load.prompt),
        "Starting load run"
    );

    let (pool, handle) = WorkerPool::new(pool_settings(&config, transport), config.load.concurrency);

    // 4. Control surface: stdin, signals, periodic status
    let cancel_token = CancellationToken::new();
    let helpers = CancellationToken::new();
    let status_handle = tokio::spawn(report_status(
        handle.clone(),
        config.display.refresh_interval(),
        config.load.run_duration(),
        helpers.clone(),
    ));
    let signal_handle = tokio::spawn(shutdown_signal(cancel_token.clone()));
    let input_handle = if args.no_input {
        None
    } else {
        Some(tokio::spawn(read_control(handle.clone(), cancel_token.clone())))
    };

    // 5. Drive the pool to completion
    let outcome = pool.run(cancel_token.clone()).await;

    // 6. Cleanup
    helpers.cancel();
    cancel_token.cancel();
    status_handle.await?;
    signal_handle.await?;
    if let Some(handle) = input_handle {
        handle.await?;
    }

    let summary = build_summary(&handle, &config, outcome);
    if args.json {
        println!("{}", format_summary_json(&summary)?);
    } else {
        println!("{}", format_summary_table(&summary));
    }

    tracing::info!(outcome = %summary.outcome, "Load run finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::NamedTempFile;

    #[test]
    fn test_run_config_loading() {
        let temp = NamedTempFile::new().unwrap();
        std::fs::write(
            temp.path(),
            "[load]\nmodel = \"file-model\"\nconcurrency = 5\n[endpoint]\nbase_url = \"http://gpu:8000/v1\"",
        )
        .unwrap();

        let args = RunArgs {
            config: temp.path().to_path_buf(),
            ..RunArgs::default()
        };
        let config = load_config_with_overrides(&args).unwrap();
        assert_eq!(config.load.model, "file-model");
        assert_eq!(config.load.concurrency, 5);
        assert_eq!(config.endpoint.base_url, "http://gpu:8000/v1");
    }

    #[test]
    fn test_run_cli_overrides_config() {
        let temp = NamedTempFile::new().unwrap();
        std::fs::write(temp.path(), "[load]\nmodel = \"file-model\"\nconcurrency = 5").unwrap();

        let args = RunArgs {
            config: temp.path().to_path_buf(),
            model: Some("cli-model".to_string()),
            concurrency: Some(2),
            duration: Some(30),
            output: Some("stdout".to_string()),
            base_url: Some("http://other:9000/v1".to_string()),
            ..RunArgs::default()
        };
        let config = load_config_with_overrides(&args).unwrap();
        assert_eq!(config.load.model, "cli-model");
        assert_eq!(config.load.concurrency, 2);
        assert_eq!(config.load.duration_seconds, Some(30));
        assert_eq!(config.load.output.as_deref(), Some("stdout"));
        assert_eq!(config.endpoint.base_url, "http://other:9000/v1");
    }

    #[test]
    fn test_run_works_without_config_file() {
        let args = RunArgs {
            config: PathBuf::from("/nonexistent/loadllm.toml"),
            model: Some("m".to_string()),
            ..RunArgs::default()
        };
        let config = load_config_with_overrides(&args).unwrap();
        assert_eq!(config.load.concurrency, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_control() {
        assert_eq!(parse_control("+"), Some(ControlInput::Adjust(1)));
        assert_eq!(parse_control(" up \n"), Some(ControlInput::Adjust(1)));
        assert_eq!(parse_control("-"), Some(ControlInput::Adjust(-1)));
        assert_eq!(parse_control("down"), Some(ControlInput::Adjust(-1)));
        assert_eq!(parse_control("12"), Some(ControlInput::Set(12)));
        assert_eq!(parse_control("q"), Some(ControlInput::Quit));
        assert_eq!(parse_control("-3"), None);
        assert_eq!(parse_control("faster"), None);
    }

    #[test]
    fn test_pool_settings_from_config() {
        let mut config = LoadllmConfig::default();
        config.load.model = "m".to_string();
        config.load.duration_seconds = Some(10);
        config.load.output = Some("stdout".to_string());
        config.retry.base_delay_ms = 250;
        config.sampler.samples = 4;

        let transport = build_transport(&config).unwrap();
        let settings = pool_settings(&config, transport);
        assert_eq!(settings.samples, 4);
        assert_eq!(settings.run_duration, Some(Duration::from_secs(10)));
        assert_eq!(settings.backoff.base(), Duration::from_millis(250));
        assert_eq!(settings.interpreter.model(), "m");
    }

    #[tokio::test]
    async fn test_shutdown_signal_returns_on_cancel() {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(shutdown_signal(cancel.clone()));
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
