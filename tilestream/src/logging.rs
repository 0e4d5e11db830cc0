//! Logging setup for hosts embedding the engine.
//!
//! The engine only emits `tracing` events. Hosts that do not install their
//! own subscriber can call [`init_logging`], which writes formatted events
//! with local timestamps to stderr, or to a daily rolling file when a log
//! directory is configured.
//!
//! `RUST_LOG` takes precedence over the configured level.

use std::path::PathBuf;

use thiserror::Error;
use time::macros::format_description;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::EnvFilter;

/// Default prefix of rolling log files.
pub const DEFAULT_LOG_FILE_PREFIX: &str = "tilestream.log";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Failed to install log subscriber: {0}")]
    Init(String),
}

/// Logging options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Level for `tilestream` targets when `RUST_LOG` is unset.
    pub level: Level,
    /// Directory for rolling log files; stderr when `None`.
    pub directory: Option<PathBuf>,
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            directory: None,
            file_prefix: DEFAULT_LOG_FILE_PREFIX.to_string(),
        }
    }
}

impl LoggingConfig {
    fn filter(&self) -> EnvFilter {
        if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::builder().from_env_lossy()
        } else {
            EnvFilter::builder().parse_lossy(filter_directive(self.level))
        }
    }
}

/// Installs the global subscriber.
///
/// # Returns
///
/// The guard of the background file writer when logging to a file. Dropping
/// it flushes and stops the writer, so hosts keep it for the program's
/// lifetime.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>, LoggingError> {
    let timer = LocalTime::new(format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]"
    ));

    match &config.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(config.filter())
                .with_timer(timer)
                .with_writer(writer)
                .with_ansi(false)
                .try_init()
                .map_err(|e| LoggingError::Init(e.to_string()))?;
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(config.filter())
                .with_timer(timer)
                .with_target(false)
                .with_writer(std::io::stderr)
                .try_init()
                .map_err(|e| LoggingError::Init(e.to_string()))?;
            Ok(None)
        }
    }
}

fn filter_directive(level: Level) -> String {
    format!("tilestream={}", level.as_str().to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directive() {
        assert_eq!(filter_directive(Level::DEBUG), "tilestream=debug");
        assert_eq!(filter_directive(Level::WARN), "tilestream=warn");
    }

    #[test]
    fn test_default_config_logs_to_stderr() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, Level::INFO);
        assert!(config.directory.is_none());
    }
}
