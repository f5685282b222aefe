//! Logging setup: stderr plus a log file in the working directory.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Log file name inside the log directory.
pub const LOG_FILE: &str = "assetforge.log";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to create log directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to install subscriber: {0}")]
    Init(String),
}

/// Keeps the file writer alive; buffered lines are flushed on drop.
pub struct LoggingGuard {
    _file: WorkerGuard,
    path: PathBuf,
}

impl LoggingGuard {
    pub fn log_file(&self) -> &Path {
        &self.path
    }
}

/// Default filter for a verbosity level (number of `-v` flags).
pub fn default_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "assetforge=info,assetforge_cli=info",
        1 => "assetforge=debug,assetforge_cli=debug",
        _ => "assetforge=trace,assetforge_cli=trace",
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` overrides the verbosity-derived filter. Fails if a subscriber
/// is already installed.
pub fn init_logging(log_dir: &Path, verbosity: u8) -> Result<LoggingGuard, LoggingError> {
    std::fs::create_dir_all(log_dir).map_err(|source| LoggingError::CreateDir {
        path: log_dir.to_path_buf(),
        source,
    })?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)));

    let appender = tracing_appender::rolling::never(log_dir, LOG_FILE);
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_timer(LocalTime::rfc_3339())
                .with_target(false),
        )
        .with(
            fmt::layer()
                .with_writer(file_writer)
                .with_timer(LocalTime::rfc_3339())
                .with_ansi(false),
        )
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))?;

    tracing::debug!(version = crate::VERSION, log_dir = %log_dir.display(), "Logging initialized");
    Ok(LoggingGuard {
        _file: guard,
        path: log_dir.join(LOG_FILE),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_levels() {
        assert!(default_filter(0).contains("=info"));
        assert!(default_filter(1).contains("=debug"));
        assert!(default_filter(5).contains("=trace"));
    }

    #[test]
    fn test_log_dir_must_be_creatable() {
        let temp = tempfile::TempDir::new().unwrap();
        let blocker = temp.path().join("file");
        std::fs::write(&blocker, b"").unwrap();

        assert!(matches!(
            init_logging(&blocker.join("logs"), 0),
            Err(LoggingError::CreateDir { .. })
        ));
    }
}
