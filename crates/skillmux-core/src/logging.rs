//! Tracing setup for hosts embedding the manager
//!
//! - Console: colored, compact
//! - File (optional): daily rotation, no colors, file/line info
//!
//! `RUST_LOG` takes precedence; otherwise SkillMux crates log at `debug` and
//! everything else at `info`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Prefix of rotated log files (`skillmux.2026-01-22.log`)
pub const LOG_PREFIX: &str = "skillmux";

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Directory for rotated log files; `None` disables file logging
    pub log_dir: Option<PathBuf>,
    /// Filter used when `RUST_LOG` is unset
    pub default_filter: String,
    /// Load `.env` from the working directory before reading `RUST_LOG`
    pub load_dotenv: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            default_filter: "info,skillmux_core=debug,skillmux_mcp=debug".to_string(),
            load_dotenv: true,
        }
    }
}

impl LoggingConfig {
    /// Log to `<data dir>/skillmux/logs` in addition to the console.
    pub fn with_default_log_dir(mut self) -> Self {
        self.log_dir = dirs::data_local_dir().map(|d| d.join("skillmux").join("logs"));
        self
    }
}

/// Install the global subscriber.
///
/// Keep the returned guard alive for the lifetime of the program, otherwise
/// buffered file output is lost.
pub fn init_logging(config: LoggingConfig) -> Result<Option<WorkerGuard>> {
    if config.load_dotenv {
        dotenvy::dotenv().ok();
    }

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.default_filter))
        .context("Invalid log filter")?;

    let console_layer = fmt::layer()
        .with_ansi(true)
        .compact()
        .with_line_number(false)
        .with_file(false)
        .with_target(true);

    match config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix(LOG_PREFIX)
                .filename_suffix("log")
                .build(&dir)
                .context("Failed to create log file appender")?;
            let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

            let file_layer = fmt::layer()
                .with_writer(non_blocking_file)
                .with_ansi(false)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_file(true)
                .with_target(true);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .with(file_layer)
                .try_init()
                .context("Global tracing subscriber already installed")?;

            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .try_init()
                .context("Global tracing subscriber already installed")?;
            Ok(None)
        }
    }
}
