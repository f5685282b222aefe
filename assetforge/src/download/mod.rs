//! Resumable concurrent downloads.
//!
//! Every item is fetched with a ranged request starting at the offset stored
//! in its [`ProgressRecord`](crate::progress::ProgressRecord), so a run that
//! was interrupted (ctrl-c, network loss, crash) continues exactly where the
//! last commit left off.
//!
//! # Architecture
//!
//! ```text
//! DownloadScheduler::run
//!   ├── AdmissionGate (C permits, acquired in task order)
//!   ├── scoped thread per admitted task
//!   │     └── DownloadTask::run ── RangeFetcher::fetch(url, position)
//!   │             └── 64 KiB chunks → sink, ProgressStore::commit
//!   └── ProgressReporter ◄── ProgressBoard (atomics)
//! ```
//!
//! Cancellation is cooperative: it is polled at admission and at every chunk
//! boundary. A cancelled task commits its position and returns; nothing is
//! rolled back.

mod error;
mod fetch;
mod gate;
mod http;
mod progress;
mod scheduler;
mod task;

pub use error::{DownloadError, DownloadResult};
pub use fetch::{RangeBody, RangeFetcher};
pub use gate::{AdmissionGate, GatePermit};
pub use http::{HttpFetcher, DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT};
pub use progress::{ProgressBoard, ProgressCallback, ProgressReporter, ProgressSnapshot};
pub use scheduler::{DownloadReport, DownloadScheduler, DEFAULT_COMMIT_INTERVAL, DEFAULT_PARALLEL};
pub use task::{DownloadTask, TaskOutcome, CHUNK_SIZE};
