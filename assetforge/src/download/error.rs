//! Error types for item downloads.

use std::io;
use std::path::PathBuf;

use crate::progress::ProgressError;

/// Result type for download operations.
pub type DownloadResult<T> = Result<T, DownloadError>;

/// Errors that can occur while transferring one item.
///
/// All of these are per-item: they are reported and leave the item
/// resumable for a later run.
#[derive(Debug)]
pub enum DownloadError {
    /// Failed to build the HTTP client.
    ClientBuild(String),

    /// The request could not be sent or the connection dropped.
    RequestFailed { url: String, reason: String },

    /// Server answered with an unexpected status.
    BadStatus { url: String, status: u16 },

    /// Network timeout.
    Timeout { url: String, timeout_secs: u64 },

    /// Reading the response body failed mid-stream.
    ReadFailed { url: String, reason: String },

    /// Failed to open or write the sink file.
    WriteFailed { path: PathBuf, source: io::Error },

    /// The stream ended before the expected length was reached.
    Truncated {
        name: String,
        position: u64,
        length: u64,
    },

    /// Progress bookkeeping failed (overrun or commit error).
    Progress(ProgressError),
}

impl std::fmt::Display for DownloadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ClientBuild(msg) => write!(f, "failed to create HTTP client: {}", msg),
            Self::RequestFailed { url, reason } => {
                write!(f, "request to {} failed: {}", url, reason)
            }
            Self::BadStatus { url, status } => {
                write!(f, "GET {} returned status {}", url, status)
            }
            Self::Timeout { url, timeout_secs } => {
                write!(f, "request to {} timed out after {}s", url, timeout_secs)
            }
            Self::ReadFailed { url, reason } => {
                write!(f, "read error while downloading {}: {}", url, reason)
            }
            Self::WriteFailed { path, source } => {
                write!(f, "failed to write {}: {}", path.display(), source)
            }
            Self::Truncated {
                name,
                position,
                length,
            } => {
                write!(
                    f,
                    "{} ended after {} of {} bytes",
                    name, position, length
                )
            }
            Self::Progress(e) => write!(f, "progress error: {}", e),
        }
    }
}

impl std::error::Error for DownloadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::WriteFailed { source, .. } => Some(source),
            Self::Progress(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ProgressError> for DownloadError {
    fn from(e: ProgressError) -> Self {
        Self::Progress(e)
    }
}
