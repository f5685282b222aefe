//! CLI error type.

use std::fmt;

use assetforge::config::ConfigError;
use assetforge::logging::LoggingError;
use assetforge::processor::ProcessorError;
use assetforge::workflow::WorkflowError;

/// Errors surfaced to the user by CLI commands.
#[derive(Debug)]
pub enum CliError {
    /// Configuration could not be loaded or is invalid.
    Config(String),
    /// Logging could not be set up.
    Logging(LoggingError),
    /// A download or processing workflow failed.
    Workflow(WorkflowError),
    /// Invalid processor selection.
    Processor(ProcessorError),
    /// No downloaded version to work on.
    NoVersion(String),
    /// The run finished with unresolved failures.
    Incomplete(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Logging(e) => write!(f, "Logging error: {}", e),
            CliError::Workflow(e) => write!(f, "{}", e),
            CliError::Processor(e) => write!(f, "{}", e),
            CliError::NoVersion(msg) => write!(f, "{}", msg),
            CliError::Incomplete(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for CliError {}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e)
    }
}

impl From<WorkflowError> for CliError {
    fn from(e: WorkflowError) -> Self {
        CliError::Workflow(e)
    }
}

impl From<ProcessorError> for CliError {
    fn from(e: ProcessorError) -> Self {
        CliError::Processor(e)
    }
}

impl CliError {
    /// Print the error and exit with a failure status.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);
        std::process::exit(1);
    }
}
