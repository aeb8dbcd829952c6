use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use super::formatter::BracketedFormatter;

/// Install the global subscriber: a timestamped log file under `log_dir`
/// plus stderr, both filtered by `RUST_LOG` when set.
///
/// Stdout stays free for command output such as `plan --json`.
pub fn setup_logging(log_dir: &Path, verbose: bool) -> io::Result<PathBuf> {
    fs::create_dir_all(log_dir)?;

    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let log_path = log_dir.join(format!("corpus_balancer_{}.log", timestamp));

    let file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&log_path)?;

    let file_layer = fmt::layer()
        .event_format(BracketedFormatter)
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false);

    let stderr_layer = fmt::layer()
        .event_format(BracketedFormatter)
        .with_writer(io::stderr);

    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("corpus_balancer={}", default_level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

    info!("Starting corpus balancer");
    info!("Log file created at: {:?}", log_path);

    Ok(log_path)
}

/// `./logs` under the working directory
pub fn default_log_dir() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("logs")
}
