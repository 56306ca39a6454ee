//! `loadllm config init`

use crate::cli::ConfigInitArgs;
use crate::config::LoadllmConfig;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const EXAMPLE_CONFIG: &str = include_str!("../../loadllm.example.toml");

#[derive(Debug, Error)]
pub enum InitError {
    #[error("{} already exists (pass --force to replace it)", .0.display())]
    Exists(PathBuf),

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Write the example run configuration to `path`, creating parent
/// directories. An existing file is only replaced with `force`.
pub fn write_example_config(path: &Path, force: bool) -> Result<(), InitError> {
    if path.exists() && !force {
        return Err(InitError::Exists(path.to_path_buf()));
    }

    let write_err = |source| InitError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    fs::write(path, EXAMPLE_CONFIG).map_err(write_err)
}

pub fn handle_config_init(args: &ConfigInitArgs) -> Result<(), Box<dyn std::error::Error>> {
    write_example_config(&args.output, args.force)?;

    let example: LoadllmConfig = toml::from_str(EXAMPLE_CONFIG)?;
    println!("✓ Configuration file created: {}", args.output.display());
    println!(
        "  model = {:?}, concurrency = {}, endpoint = {}",
        example.load.model, example.load.concurrency, example.endpoint.base_url
    );
    println!("  Start a run with: loadllm run --config {}", args.output.display());

    Ok(())
}
