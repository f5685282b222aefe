//! Bounded-parallelism download scheduler.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::error::DownloadError;
use super::fetch::RangeFetcher;
use super::gate::AdmissionGate;
use super::progress::{ProgressBoard, ProgressCallback, ProgressReporter};
use super::task::{DownloadTask, TaskOutcome, TransferEnv};
use crate::progress::ProgressStore;

/// Default number of simultaneous downloads.
pub const DEFAULT_PARALLEL: usize = 4;

/// Default minimum spacing of progress commits.
pub const DEFAULT_COMMIT_INTERVAL: Duration = Duration::from_millis(1000);

/// Outcome of one scheduler run, by item name.
#[derive(Debug, Default)]
pub struct DownloadReport {
    /// Items transferred to completion in this run.
    pub completed: Vec<String>,
    /// Items already done before the run.
    pub skipped: Vec<String>,
    /// Items stopped by cancellation, including those never admitted.
    pub cancelled: Vec<String>,
    /// Items that failed; they stay resumable.
    pub failed: Vec<(String, DownloadError)>,
}

impl DownloadReport {
    /// Every item is done, either now or previously.
    pub fn all_done(&self) -> bool {
        self.cancelled.is_empty() && self.failed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.completed.len() + self.skipped.len() + self.cancelled.len() + self.failed.len()
    }
}

/// Runs many [`DownloadTask`]s with at most `parallel` in flight.
pub struct DownloadScheduler {
    fetcher: Arc<dyn RangeFetcher>,
    parallel: usize,
    commit_interval: Duration,
}

impl DownloadScheduler {
    pub fn new(fetcher: Arc<dyn RangeFetcher>) -> Self {
        Self {
            fetcher,
            parallel: DEFAULT_PARALLEL,
            commit_interval: DEFAULT_COMMIT_INTERVAL,
        }
    }

    /// Set the concurrency limit (minimum 1).
    pub fn with_parallel(mut self, parallel: usize) -> Self {
        self.parallel = parallel.max(1);
        self
    }

    /// Set the minimum time between progress commits of one item.
    pub fn with_commit_interval(mut self, interval: Duration) -> Self {
        self.commit_interval = interval;
        self
    }

    pub fn parallel(&self) -> usize {
        self.parallel
    }

    /// Download every task.
    ///
    /// Admission is requested in task order from the calling thread; each
    /// admitted task runs on its own scoped thread holding its gate permit.
    /// Blocks until every admitted task has returned.
    pub fn run(
        &self,
        tasks: Vec<DownloadTask>,
        store: &ProgressStore,
        cancel: &CancellationToken,
        on_progress: Option<ProgressCallback>,
    ) -> DownloadReport {
        let board = Arc::new(ProgressBoard::new(tasks.len()));
        for (index, task) in tasks.iter().enumerate() {
            if task.record.done {
                board.mark_done(index, task.record.length);
            } else {
                board.update(index, task.record.position, task.record.length);
            }
        }
        let reporter = on_progress.map(|cb| ProgressReporter::start_default(Arc::clone(&board), cb));

        tracing::info!(
            items = tasks.len(),
            parallel = self.parallel,
            "Starting downloads"
        );

        let gate = AdmissionGate::new(self.parallel);
        let env = TransferEnv {
            fetcher: self.fetcher.as_ref(),
            store,
            cancel,
            board: &board,
            commit_interval: self.commit_interval,
        };
        let report = Mutex::new(DownloadReport::default());

        thread::scope(|scope| {
            for (index, mut task) in tasks.into_iter().enumerate() {
                if task.record.done {
                    report.lock().skipped.push(task.name);
                    continue;
                }

                let Some(permit) = gate.acquire(cancel) else {
                    report.lock().cancelled.push(task.name);
                    continue;
                };

                let env = &env;
                let report = &report;
                scope.spawn(move || {
                    let _permit = permit;
                    let result = task.run(index, env);
                    let mut report = report.lock();
                    match result {
                        Ok(TaskOutcome::Completed) => report.completed.push(task.name),
                        Ok(TaskOutcome::AlreadyDone) => report.skipped.push(task.name),
                        Ok(TaskOutcome::Cancelled) => report.cancelled.push(task.name),
                        Err(e) => {
                            tracing::warn!(item = %task.name, error = %e, "Download failed");
                            report.failed.push((task.name, e));
                        }
                    }
                });
            }
        });

        if let Some(reporter) = reporter {
            reporter.stop();
        }

        let report = report.into_inner();
        tracing::info!(
            completed = report.completed.len(),
            skipped = report.skipped.len(),
            cancelled = report.cancelled.len(),
            failed = report.failed.len(),
            "Downloads finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::error::DownloadResult;
    use crate::download::fetch::RangeBody;
    use crate::progress::ProgressRecord;
    use std::fs;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Serves `len` bytes per url; urls containing "broken" fail.
    struct MemoryFetcher {
        len: usize,
        calls: AtomicUsize,
    }

    impl RangeFetcher for MemoryFetcher {
        fn fetch(&self, url: &str, offset: u64) -> DownloadResult<RangeBody> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if url.contains("broken") {
                return Err(DownloadError::BadStatus {
                    url: url.to_string(),
                    status: 500,
                });
            }
            let data = vec![7u8; self.len - offset as usize];
            Ok(RangeBody {
                start: offset,
                total: Some(self.len as u64),
                reader: Box::new(Cursor::new(data)),
            })
        }
    }

    fn task(temp: &TempDir, name: &str, url: &str) -> DownloadTask {
        DownloadTask::new(url, temp.path().join(format!("{}.dat", name)), ProgressRecord::new(name))
    }

    #[test]
    fn test_failure_does_not_abort_siblings() {
        let temp = TempDir::new().unwrap();
        let store = ProgressStore::new(temp.path().join("progress"));
        let fetcher = Arc::new(MemoryFetcher {
            len: 1000,
            calls: AtomicUsize::new(0),
        });
        let scheduler = DownloadScheduler::new(fetcher).with_parallel(2);

        let tasks = vec![
            task(&temp, "a", "mem://a"),
            task(&temp, "b", "mem://broken"),
            task(&temp, "c", "mem://c"),
        ];
        let report = scheduler.run(tasks, &store, &CancellationToken::new(), None);

        assert_eq!(report.completed.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "b");
        assert!(!report.all_done());
        assert!(store.load("a").done);
        assert!(!store.load("b").done);
        assert_eq!(fs::metadata(temp.path().join("c.dat")).unwrap().len(), 1000);
    }

    #[test]
    fn test_done_items_skipped_without_fetch() {
        let temp = TempDir::new().unwrap();
        let store = ProgressStore::new(temp.path().join("progress"));
        let fetcher = Arc::new(MemoryFetcher {
            len: 10,
            calls: AtomicUsize::new(0),
        });
        let scheduler = DownloadScheduler::new(Arc::clone(&fetcher) as Arc<dyn RangeFetcher>);

        let mut done = task(&temp, "a", "mem://a");
        done.record.length = 10;
        done.record.position = 10;
        done.record.done = true;

        let report = scheduler.run(vec![done], &store, &CancellationToken::new(), None);
        assert_eq!(report.skipped, vec!["a".to_string()]);
        assert!(report.all_done());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cancelled_run_admits_nothing() {
        let temp = TempDir::new().unwrap();
        let store = ProgressStore::new(temp.path().join("progress"));
        let fetcher = Arc::new(MemoryFetcher {
            len: 10,
            calls: AtomicUsize::new(0),
        });
        let scheduler = DownloadScheduler::new(Arc::clone(&fetcher) as Arc<dyn RangeFetcher>);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = scheduler.run(
            vec![task(&temp, "a", "mem://a"), task(&temp, "b", "mem://b")],
            &store,
            &cancel,
            None,
        );
        assert_eq!(report.cancelled.len(), 2);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_progress_callback_sees_final_totals() {
        let temp = TempDir::new().unwrap();
        let store = ProgressStore::new(temp.path().join("progress"));
        let fetcher = Arc::new(MemoryFetcher {
            len: 500,
            calls: AtomicUsize::new(0),
        });
        let scheduler = DownloadScheduler::new(fetcher);

        let last = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&last);
        let callback: ProgressCallback = Arc::new(move |snap| *sink.lock() = Some(snap));

        scheduler.run(
            vec![task(&temp, "a", "mem://a"), task(&temp, "b", "mem://b")],
            &store,
            &CancellationToken::new(),
            Some(callback),
        );

        let snap = last.lock().unwrap();
        assert_eq!(snap.bytes, 1000);
        assert_eq!(snap.total_bytes, 1000);
        assert_eq!(snap.items_done, 2);
    }
}
