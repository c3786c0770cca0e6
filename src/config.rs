use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use crate::ai::{resolve_model, ModelSpec};

/// Settings shared by the commands that talk to the model.
#[derive(Debug, Clone)]
pub struct Settings {
    pub model: ModelSpec,
    pub timeout: Option<Duration>,
}

impl Settings {
    /// A timeout of zero means wait forever.
    pub fn new(model: &str, timeout_secs: u64) -> Result<Self> {
        let model = resolve_model(model)?;
        let timeout = (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs));
        Ok(Self { model, timeout })
    }
}

/// Load `.env` from the working directory if present. Runs before argument
/// parsing and logging setup, so the caller logs the returned path.
pub fn load_dotenv() -> Option<PathBuf> {
    dotenvy::dotenv().ok()
}

pub enum LogTarget {
    Stderr,
    /// Used while the TUI owns the terminal.
    File(PathBuf),
}

fn env_filter(verbose: bool) -> EnvFilter {
    let level = if verbose { "debug" } else { "info" };
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), level)))
}

pub fn init_logging(verbose: bool, target: LogTarget) -> Result<()> {
    match target {
        LogTarget::Stderr => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter(verbose))
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogTarget::File(path) => {
            let file = open_log_file(&path)?;
            tracing_subscriber::fmt()
                .with_env_filter(env_filter(verbose))
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .init();
        }
    }
    Ok(())
}

fn open_log_file(path: &Path) -> Result<std::fs::File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}
