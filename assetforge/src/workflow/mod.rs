//! End-to-end flows: acquiring a version and processing it.
//!
//! Both workflows are blocking and honour a shared
//! [`CancellationToken`](tokio_util::sync::CancellationToken); the CLI cancels
//! it on Ctrl-C and every stage stops at its next checkpoint.

mod download;
mod process;

use std::path::PathBuf;

use thiserror::Error;

use crate::download::DownloadError;
use crate::manifest::ManifestError;
use crate::processor::ProcessorError;

pub use download::{DownloadPlan, DownloadSummary, DownloadWorkflow};
pub use process::ProcessWorkflow;

/// Result type for workflow operations.
pub type WorkflowResult<T> = Result<T, WorkflowError>;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Processor(#[from] ProcessorError),

    #[error("{action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("no unpacked resources at {0}; download the version first")]
    MissingResources(PathBuf),
}
