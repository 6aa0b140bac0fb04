//! # Logging Setup
//!
//! Installs the global `tracing` subscriber for binaries that embed the sync
//! layer. The library itself only emits through the `tracing` macros; nothing
//! is printed unless a subscriber is installed.
//!
//! Output goes to stdout and, when `log_dir` is set, to a daily-rolling file
//! in JSON format. `RUST_LOG` takes precedence over the configured level.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::SyncError;

/// Where and how much to log.
#[derive(Debug, Clone)]
pub struct LoggingOptions {
    /// Default filter directive, e.g. `info` or `lib_realtime=debug,warn`.
    pub level: String,
    /// Directory for the rolling log file; `None` disables file output.
    pub log_dir: Option<PathBuf>,
    /// File name prefix; the date is appended by the appender.
    pub file_prefix: String,
    pub ansi: bool,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
            file_prefix: "realtime-sync".to_string(),
            ansi: true,
        }
    }
}

fn build_filter(level: &str) -> Result<EnvFilter, SyncError> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| SyncError::Config(format!("invalid log filter '{}': {}", level, e)))
}

/// Installs the subscriber. Keep the returned guard alive for as long as the
/// file layer should keep flushing.
///
/// Fails if the filter does not parse, the log directory cannot be created
/// or a global subscriber is already set.
pub fn init_tracing(options: LoggingOptions) -> Result<Option<WorkerGuard>, SyncError> {
    let filter = build_filter(&options.level)?;
    let console_layer = fmt::layer().with_target(true).with_ansi(options.ansi);

    let (file_layer, guard) = match &options.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| {
                SyncError::Config(format!("cannot create log directory {}: {}", dir.display(), e))
            })?;
            let (writer, guard) = non_blocking(rolling::daily(dir, &options.file_prefix));
            let layer = fmt::layer().with_ansi(false).with_writer(writer).json();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| SyncError::Config(format!("tracing subscriber already set: {}", e)))?;

    tracing::info!("Logging initialized with level: {}", options.level);
    Ok(guard)
}
