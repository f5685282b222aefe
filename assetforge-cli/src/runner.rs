//! Shared command setup: configuration, logging and Ctrl-C handling.

use std::path::PathBuf;

use assetforge::config::{config_file_path, ConfigFile};
use assetforge::logging::{init_logging, LoggingGuard};
use tokio_util::sync::CancellationToken;

use crate::error::CliError;

/// Per-invocation state every command starts from.
pub struct CliRunner {
    config: ConfigFile,
    _logging: LoggingGuard,
}

impl CliRunner {
    /// Load the config file, apply the working directory override and
    /// initialize logging.
    pub fn new(working_dir: Option<PathBuf>, verbosity: u8) -> Result<Self, CliError> {
        let mut config = ConfigFile::load()?;
        if let Some(dir) = working_dir {
            config = config.with_working_directory(dir);
        }
        let logging = init_logging(&config.log_dir(), verbosity)?;

        Ok(Self {
            config,
            _logging: logging,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn log_startup(&self, command: &str) {
        tracing::info!(
            version = assetforge::VERSION,
            command,
            working_dir = %self.config.general.working_directory.display(),
            config = %config_file_path().map(|p| p.display().to_string()).unwrap_or_default(),
            "assetforge starting"
        );
    }

    /// Token cancelled on the first Ctrl-C.
    pub fn cancel_on_interrupt(&self) -> Result<CancellationToken, CliError> {
        let cancel = CancellationToken::new();
        let handler_token = cancel.clone();

        ctrlc::set_handler(move || {
            if !handler_token.is_cancelled() {
                eprintln!();
                eprintln!("Interrupted, stopping at the next checkpoint...");
                handler_token.cancel();
            }
        })
        .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

        Ok(cancel)
    }
}
