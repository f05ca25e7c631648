//! Shared logging setup for the clockr binary.
//!
//! Logs always go to a daily-rolling file under `~/.config/clockr/logs`.
//! Stderr output is restricted to warnings while the TUI owns the terminal,
//! otherwise it mirrors the file filter.

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "clockr=info,clockr_logging=info";
const VERBOSE_LOG_FILTER: &str = "clockr=debug,clockr_logging=debug";

/// Environment variable that relocates the clockr home directory.
pub const HOME_ENV: &str = "CLOCKR_HOME";

/// Logging configuration for the clockr binary.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    pub verbose: bool,
    pub tui_mode: bool,
}

/// Initialize tracing with a rolling file writer and stderr output.
///
/// The returned guard flushes the file writer on drop; keep it alive for the
/// whole process.
pub fn init_logging(config: LogConfig<'_>) -> Result<WorkerGuard> {
    let log_dir = ensure_logs_dir().context("Failed to ensure log directory")?;
    let appender = tracing_appender::rolling::daily(
        &log_dir,
        format!("{}.log", sanitize_name(config.app_name)),
    );
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let file_level = file_filter(config.verbose);
    let console_level = if config.tui_mode && !config.verbose {
        EnvFilter::new("warn")
    } else {
        file_filter(config.verbose)
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_target(true)
                .with_filter(file_level),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_level),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

fn file_filter(verbose: bool) -> EnvFilter {
    if verbose {
        return EnvFilter::new(VERBOSE_LOG_FILTER);
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Get the clockr home directory: `$CLOCKR_HOME` or `~/.config/clockr`.
pub fn clockr_home() -> Result<PathBuf> {
    if let Ok(override_path) = std::env::var(HOME_ENV) {
        if !override_path.is_empty() {
            return Ok(PathBuf::from(override_path));
        }
    }
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("clockr"))
}

/// Get the logs directory: `<clockr home>/logs`.
pub fn logs_dir() -> Result<PathBuf> {
    Ok(clockr_home()?.join("logs"))
}

/// Ensure the logs directory exists.
pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir()?;
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .collect()
}
