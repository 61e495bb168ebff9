//! Logging setup for the soradb binary.
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to the application. `init_logging` is what the CLI uses.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const LOG_FILE_NAME: &str = "soradb.log";

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive
    pub level: String,
    /// Emit JSON lines on stderr instead of human-readable output
    pub json: bool,
    /// Also write logs into this directory
    pub dir: Option<PathBuf>,
    /// File rotation when `dir` is set
    pub rotation: LogRotation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Daily,
    Hourly,
    Never,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            dir: None,
            rotation: LogRotation::Daily,
        }
    }
}

impl LogConfig {
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    pub fn with_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// `RUST_LOG` wins over the configured level.
    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Install the global subscriber.
///
/// Returns the guard of the background file writer when file output is on;
/// keep it alive until exit or buffered lines are lost. Calling this again
/// after a subscriber is installed is a no-op.
pub fn init_logging(config: &LogConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let console_layer = if config.json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = match &config.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let file_appender = match config.rotation {
                LogRotation::Daily => rolling::daily(dir, LOG_FILE_NAME),
                LogRotation::Hourly => rolling::hourly(dir, LOG_FILE_NAME),
                LogRotation::Never => rolling::never(dir, LOG_FILE_NAME),
            };
            let (writer, guard) = non_blocking(file_appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let installed = tracing_subscriber::registry()
        .with(config.env_filter())
        .with(console_layer)
        .with(file_layer)
        .try_init();

    match installed {
        Ok(()) => {
            tracing::debug!(level = %config.level, json = config.json, "logging initialized");
            Ok(guard)
        }
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_log_config_default() {
        let config = LogConfig::default();
        assert_eq!(config.level, "info");
        assert!(!config.json);
        assert!(config.dir.is_none());
        assert_eq!(config.rotation, LogRotation::Daily);
    }

    #[test]
    fn test_log_config_builders() {
        let config = LogConfig::default()
            .with_level("debug")
            .with_json(true)
            .with_dir("/tmp/soradb-logs");
        assert_eq!(config.level, "debug");
        assert!(config.json);
        assert_eq!(config.dir, Some(PathBuf::from("/tmp/soradb-logs")));
    }

    #[test]
    fn test_init_logging_twice_is_harmless() {
        let temp_dir = tempdir().unwrap();
        let log_dir = temp_dir.path().join("logs");
        let config = LogConfig::default()
            .with_level("warn")
            .with_dir(&log_dir)
            .with_json(false);

        assert!(init_logging(&config).is_ok());
        assert!(log_dir.exists());
        assert!(init_logging(&LogConfig::default()).is_ok());
    }
}
