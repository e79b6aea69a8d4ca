//! Structured logging setup.
//!
//! Logs always go to stderr (stdout carries the user-facing report) and may be
//! mirrored to a file through a non-blocking `tracing-appender` writer.
//!
//! Filter priority (highest to lowest):
//! 1. `AWP_LOG` environment variable (full `EnvFilter` syntax)
//! 2. `--verbose` on the command line (`debug`)
//! 3. `[logging].level` in awp.toml
//! 4. `info`

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Environment variable that overrides every other level setting.
pub const LOG_ENV: &str = "AWP_LOG";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// trace, debug, info, warn, error, off
    #[serde(default = "default_level")]
    pub level: String,
    /// text or json
    #[serde(default = "default_format")]
    pub format: String,
    /// Optional log file, relative paths resolve against the project directory
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
            file: None,
        }
    }
}

/// Build the filter directive string from config and CLI.
fn filter_directive(config: &LoggingConfig, verbose: bool) -> String {
    if let Ok(env) = std::env::var(LOG_ENV)
        && !env.trim().is_empty()
    {
        return env;
    }
    if verbose {
        return "debug".to_string();
    }
    config.level.clone()
}

/// Initialize the global subscriber.
///
/// The returned guard must be held for the life of the process when a log
/// file is configured, otherwise buffered lines are lost.
pub fn init_logging(
    config: &LoggingConfig,
    project_dir: &Path,
    verbose: bool,
) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_new(filter_directive(config, verbose))
        .context("Invalid log filter")?;
    let json = config.format.eq_ignore_ascii_case("json");

    let stderr_layer = if json {
        fmt::layer()
            .json()
            .with_target(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_timer(ChronoUtc::rfc_3339())
            .with_writer(std::io::stderr)
            .boxed()
    };

    let (file_layer, guard) = match &config.file {
        Some(file) => {
            let path = if file.is_absolute() {
                file.clone()
            } else {
                project_dir.join(file)
            };
            let dir = path.parent().unwrap_or(project_dir);
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            let file_name = path
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| "awp.log".into());
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_target(true)
                .with_timer(ChronoUtc::rfc_3339())
                .with_ansi(false)
                .with_writer(writer)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    Registry::default()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}
