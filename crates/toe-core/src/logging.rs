//! Logging setup.
//!
//! Human-readable output goes to stderr so stdout stays clean for prompts and
//! `--json` output. With `logging.file` enabled, a daily-rotated copy is kept
//! under `~/.config/toe/logs/`.

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use crate::error::ConfigError;
use crate::storage::{config::LoggingConfig, log_dir};

const LOG_FILE_PREFIX: &str = "toe.log";

/// Install the global subscriber.
///
/// `RUST_LOG` overrides the configured level.
pub fn init(config: &LoggingConfig) -> Result<LoggingGuard, ConfigError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| ConfigError::InvalidValue {
            key: "logging.level".into(),
            message: e.to_string(),
        })?;

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    let (file_layer, guard) = if config.file {
        let dir = log_dir()?;
        std::fs::create_dir_all(&dir).map_err(|e| ConfigError::DataDir(e.to_string()))?;
        let appender = RollingFileAppender::new(Rotation::DAILY, &dir, LOG_FILE_PREFIX);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| ConfigError::InvalidValue {
            key: "logging".into(),
            message: e.to_string(),
        })?;

    tracing::debug!(level = %config.level, file = config.file, "logging initialized");
    Ok(LoggingGuard { _guard: guard })
}

/// Keeps the file writer alive; dropping it flushes pending lines.
pub struct LoggingGuard {
    _guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}
