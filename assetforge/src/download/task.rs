//! A single resumable item transfer.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use super::error::{DownloadError, DownloadResult};
use super::fetch::RangeFetcher;
use super::progress::ProgressBoard;
use crate::progress::{ProgressRecord, ProgressStore};

/// Size of one streamed chunk.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// One item to download: where from, where to, and how far it got.
#[derive(Debug, Clone)]
pub struct DownloadTask {
    pub name: String,
    pub url: String,
    pub sink: PathBuf,
    pub record: ProgressRecord,
}

/// How a task ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Transfer reached the expected length.
    Completed,
    /// Record was already done; nothing was fetched.
    AlreadyDone,
    /// Cancellation observed; partial progress committed.
    Cancelled,
}

/// Collaborators shared by every task of one scheduler run.
pub(crate) struct TransferEnv<'a> {
    pub fetcher: &'a dyn RangeFetcher,
    pub store: &'a ProgressStore,
    pub cancel: &'a CancellationToken,
    pub board: &'a ProgressBoard,
    pub commit_interval: Duration,
}

impl DownloadTask {
    /// Create a task; the name is taken from the record.
    pub fn new(url: impl Into<String>, sink: impl Into<PathBuf>, record: ProgressRecord) -> Self {
        Self {
            name: record.name.clone(),
            url: url.into(),
            sink: sink.into(),
            record,
        }
    }

    /// Run the transfer to completion, cancellation or failure.
    ///
    /// The record is committed before every return that touched the sink.
    pub(crate) fn run(&mut self, index: usize, env: &TransferEnv<'_>) -> DownloadResult<TaskOutcome> {
        if self.record.done {
            return Ok(TaskOutcome::AlreadyDone);
        }

        let mut file = self.open_sink()?;
        env.board.update(index, self.record.position, self.record.length);

        if self.record.position > 0 {
            tracing::debug!(
                item = %self.name,
                position = self.record.position,
                length = self.record.length,
                "Resuming download"
            );
        }

        let body = match env.fetcher.fetch(&self.url, self.record.position) {
            Ok(body) => body,
            Err(e) => {
                env.store.commit(&self.record)?;
                return Err(e);
            }
        };

        if body.start != self.record.position {
            if body.start != 0 {
                env.store.commit(&self.record)?;
                return Err(DownloadError::RequestFailed {
                    url: self.url.clone(),
                    reason: format!(
                        "server resumed at byte {}, expected {}",
                        body.start, self.record.position
                    ),
                });
            }
            tracing::info!(item = %self.name, "Range not honoured, restarting from 0");
            self.record.restart();
            self.rewind(&mut file, 0)?;
        }

        if let Some(total) = body.total {
            if self.record.length != total && self.record.length > 0 {
                tracing::debug!(
                    item = %self.name,
                    expected = self.record.length,
                    reported = total,
                    "Server length differs from manifest"
                );
            }
            if self.record.position > total {
                self.record.restart();
                self.rewind(&mut file, 0)?;
            }
            self.record.length = total;
        }

        let mut writer = BufWriter::with_capacity(CHUNK_SIZE, file);
        let result = self.stream(body.reader, &mut writer, index, env);

        // Whatever happened, persist what is on disk
        self.checkpoint(&mut writer, env.store)?;
        let outcome = result?;

        if outcome == TaskOutcome::Completed {
            env.board.mark_done(index, self.record.length);
            tracing::debug!(item = %self.name, bytes = self.record.length, "Download complete");
        }
        Ok(outcome)
    }

    fn stream(
        &mut self,
        mut reader: Box<dyn Read + Send>,
        writer: &mut BufWriter<File>,
        index: usize,
        env: &TransferEnv<'_>,
    ) -> DownloadResult<TaskOutcome> {
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut last_commit = Instant::now();

        loop {
            if env.cancel.is_cancelled() {
                return Ok(TaskOutcome::Cancelled);
            }

            let n = match reader.read(&mut buf) {
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(DownloadError::ReadFailed {
                        url: self.url.clone(),
                        reason: e.to_string(),
                    })
                }
            };

            // Bytes read after cancellation are dropped
            if env.cancel.is_cancelled() {
                return Ok(TaskOutcome::Cancelled);
            }

            if n == 0 {
                break;
            }

            writer.write_all(&buf[..n]).map_err(|source| DownloadError::WriteFailed {
                path: self.sink.clone(),
                source,
            })?;
            self.record.advance(n as u64)?;
            env.board.update(index, self.record.position, self.record.length);

            if last_commit.elapsed() >= env.commit_interval {
                self.checkpoint(writer, env.store)?;
                last_commit = Instant::now();
            }
        }

        self.record.finish();
        if !self.record.done {
            return Err(DownloadError::Truncated {
                name: self.name.clone(),
                position: self.record.position,
                length: self.record.length,
            });
        }
        Ok(TaskOutcome::Completed)
    }

    /// Flush buffered bytes, then commit the record describing them.
    fn checkpoint(&self, writer: &mut BufWriter<File>, store: &ProgressStore) -> DownloadResult<()> {
        writer.flush().map_err(|source| DownloadError::WriteFailed {
            path: self.sink.clone(),
            source,
        })?;
        store.commit(&self.record)?;
        Ok(())
    }

    /// Open the sink positioned at the committed offset.
    ///
    /// Bytes past the committed position are dropped. A sink shorter than
    /// the record (e.g. deleted by hand) restarts the item.
    fn open_sink(&mut self) -> DownloadResult<File> {
        let path = self.sink.clone();
        let write_failed = |source: io::Error| DownloadError::WriteFailed {
            path: path.clone(),
            source,
        };

        if let Some(parent) = self.sink.parent() {
            fs::create_dir_all(parent).map_err(write_failed)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&self.sink)
            .map_err(write_failed)?;

        let on_disk = file.metadata().map_err(write_failed)?.len();
        if on_disk < self.record.position {
            tracing::warn!(
                item = %self.name,
                on_disk,
                position = self.record.position,
                "Sink shorter than recorded progress, restarting"
            );
            self.record.restart();
        }

        let position = self.record.position;
        self.rewind(&mut file, position)?;
        Ok(file)
    }

    fn rewind(&self, file: &mut File, position: u64) -> DownloadResult<()> {
        let write_failed = |source| DownloadError::WriteFailed {
            path: self.sink.clone(),
            source,
        };
        file.set_len(position).map_err(write_failed)?;
        file.seek(SeekFrom::Start(position)).map_err(write_failed)?;
        Ok(())
    }
}
