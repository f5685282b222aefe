//! Fixed-size worker pool over container files.
//!
//! Workers pull the next unclaimed file index from a shared [`ClaimCursor`];
//! nothing else is shared between them. Each worker owns one
//! [`ContainerReader`](crate::bundle::ContainerReader) for the whole run and
//! drops every container before claiming the next one.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use tokio_util::sync::CancellationToken;

use crate::bundle::ReaderFactory;
use crate::paths::VersionLayout;
use crate::processor::{BundleContext, BundleOutcome, ProcessorPipeline};

/// Hands out each index in `0..len` exactly once across threads.
#[derive(Debug)]
pub struct ClaimCursor {
    next: AtomicUsize,
    len: usize,
}

impl ClaimCursor {
    pub fn new(len: usize) -> Self {
        Self {
            next: AtomicUsize::new(0),
            len,
        }
    }

    /// Claim the next index, or `None` once every index is taken.
    pub fn claim(&self) -> Option<usize> {
        let index = self.next.fetch_add(1, Ordering::Relaxed);
        (index < self.len).then_some(index)
    }
}

/// Totals of a pool run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolReport {
    /// Containers opened and run through the pipeline.
    pub containers: usize,
    /// Containers that could not be opened, with the reason.
    pub failed_containers: Vec<(PathBuf, String)>,
    pub records: usize,
    pub record_failures: usize,
    /// Cancellation stopped the run before every container was processed.
    pub cancelled: bool,
}

#[derive(Default)]
struct Counters {
    containers: AtomicUsize,
    records: AtomicUsize,
    record_failures: AtomicUsize,
    interrupted: AtomicUsize,
}

/// Runs containers through a [`ProcessorPipeline`] on a fixed number of threads.
#[derive(Debug, Clone, Copy)]
pub struct WorkPool {
    threads: usize,
}

impl WorkPool {
    /// Pool of `threads` workers; 0 uses the available parallelism.
    pub fn new(threads: usize) -> Self {
        let threads = if threads == 0 {
            thread::available_parallelism().map_or(1, |n| n.get())
        } else {
            threads
        };
        Self { threads }
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Process `files` (relative to the layout's resource tree).
    ///
    /// Cancellation is polled before each claim and, inside the pipeline,
    /// before each record.
    pub fn run(
        &self,
        files: &[PathBuf],
        layout: &VersionLayout,
        factory: &ReaderFactory,
        pipeline: &ProcessorPipeline,
        cancel: &CancellationToken,
    ) -> PoolReport {
        let cursor = ClaimCursor::new(files.len());
        let counters = Counters::default();
        let resources = layout.resources();
        let workers = self.threads.min(files.len()).max(1);

        tracing::info!(containers = files.len(), workers, "Processing containers");

        let failed: Vec<(PathBuf, String)> = thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|worker| {
                    let (cursor, counters, resources) = (&cursor, &counters, &resources);
                    scope.spawn(move || {
                        Self::work(worker, files, resources, layout, factory, pipeline, cursor, counters, cancel)
                    })
                })
                .collect();

            handles
                .into_iter()
                .flat_map(|h| match h.join() {
                    Ok(failed) => failed,
                    Err(_) => {
                        tracing::error!("Worker thread panicked");
                        Vec::new()
                    }
                })
                .collect()
        });

        let report = PoolReport {
            containers: counters.containers.load(Ordering::Relaxed),
            failed_containers: failed,
            records: counters.records.load(Ordering::Relaxed),
            record_failures: counters.record_failures.load(Ordering::Relaxed),
            cancelled: cancel.is_cancelled()
                && (counters.interrupted.load(Ordering::Relaxed) > 0
                    || counters.containers.load(Ordering::Relaxed) < files.len()),
        };
        tracing::info!(
            containers = report.containers,
            failed = report.failed_containers.len(),
            records = report.records,
            record_failures = report.record_failures,
            cancelled = report.cancelled,
            "Processing finished"
        );
        report
    }

    #[allow(clippy::too_many_arguments)]
    fn work(
        worker: usize,
        files: &[PathBuf],
        resources: &Path,
        layout: &VersionLayout,
        factory: &ReaderFactory,
        pipeline: &ProcessorPipeline,
        cursor: &ClaimCursor,
        counters: &Counters,
        cancel: &CancellationToken,
    ) -> Vec<(PathBuf, String)> {
        let mut reader = factory();
        let mut failed = Vec::new();

        while !cancel.is_cancelled() {
            let Some(index) = cursor.claim() else {
                break;
            };
            let relative = &files[index];

            let container = match reader.open(&resources.join(relative)) {
                Ok(container) => container,
                Err(e) => {
                    tracing::warn!(worker, container = %relative.display(), error = %e, "Container skipped");
                    failed.push((relative.clone(), e.to_string()));
                    continue;
                }
            };

            let ctx = BundleContext {
                container: container.as_ref(),
                relative_path: relative,
                output_dir: layout.processed_dir_for(relative),
            };
            let report = pipeline.run_bundle(&ctx, cancel);
            tracing::debug!(worker, container = %relative.display(), records = report.records, "Container done");

            counters.containers.fetch_add(1, Ordering::Relaxed);
            counters.records.fetch_add(report.records, Ordering::Relaxed);
            counters.record_failures.fetch_add(report.failures, Ordering::Relaxed);
            if report.outcome == BundleOutcome::Interrupted {
                counters.interrupted.fetch_add(1, Ordering::Relaxed);
            }
        }
        failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::{packed_reader_factory, PackedBundleWriter, RecordInfo};
    use crate::processor::{BundleState, ProcessorResult, RecordProcessor};
    use parking_lot::Mutex;
    use proptest::prelude::*;
    use std::collections::HashSet;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn claims_are_unique_and_complete(len in 0usize..4000, threads in 1usize..=64) {
            let cursor = ClaimCursor::new(len);
            let claimed: Vec<Vec<usize>> = thread::scope(|scope| {
                let handles: Vec<_> = (0..threads)
                    .map(|_| scope.spawn(|| std::iter::from_fn(|| cursor.claim()).collect::<Vec<_>>()))
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });

            let all: Vec<usize> = claimed.into_iter().flatten().collect();
            let unique: HashSet<usize> = all.iter().copied().collect();
            prop_assert_eq!(all.len(), len);
            prop_assert_eq!(unique.len(), len);
            prop_assert!(all.iter().all(|&i| i < len));
        }
    }

    #[test]
    fn test_claim_exhausts() {
        let cursor = ClaimCursor::new(2);
        assert_eq!(cursor.claim(), Some(0));
        assert_eq!(cursor.claim(), Some(1));
        assert_eq!(cursor.claim(), None);
        assert_eq!(cursor.claim(), None);
    }

    /// Records every (container, record) pair it sees.
    struct Seen(Arc<Mutex<Vec<(PathBuf, String)>>>);

    impl RecordProcessor for Seen {
        fn key(&self) -> &'static str {
            "seen"
        }
        fn description(&self) -> &'static str {
            "test"
        }
        fn process(
            &self,
            ctx: &BundleContext<'_>,
            record: &RecordInfo,
            _state: &mut BundleState,
        ) -> ProcessorResult<()> {
            self.0
                .lock()
                .push((ctx.relative_path.to_path_buf(), record.name.clone()));
            Ok(())
        }
    }

    fn version_with(containers: usize) -> (TempDir, VersionLayout, Vec<PathBuf>) {
        let temp = TempDir::new().unwrap();
        let layout = VersionLayout::new(temp.path(), "CN_1");
        let mut files = Vec::new();
        for i in 0..containers {
            let relative = PathBuf::from(format!("group{}/c{}.ab", i % 3, i));
            let path = layout.resources().join(&relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            let mut writer = PackedBundleWriter::new();
            writer.other(1, "a", 1).other(2, "b", 1);
            writer.write_to(&path).unwrap();
            files.push(relative);
        }
        (temp, layout, files)
    }

    #[test]
    fn test_every_container_processed_once() {
        let (_temp, layout, files) = version_with(10);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let pipeline = ProcessorPipeline::new(vec![Box::new(Seen(seen.clone()))]);

        let report = WorkPool::new(4).run(
            &files,
            &layout,
            &packed_reader_factory(),
            &pipeline,
            &CancellationToken::new(),
        );

        assert_eq!(report.containers, 10);
        assert_eq!(report.records, 20);
        assert!(!report.cancelled);
        let seen = seen.lock();
        let unique: HashSet<_> = seen.iter().collect();
        assert_eq!(seen.len(), 20);
        assert_eq!(unique.len(), 20);
    }

    #[test]
    fn test_unopenable_container_reported() {
        let (_temp, layout, mut files) = version_with(2);
        let bad = PathBuf::from("bad.ab");
        fs::write(layout.resources().join(&bad), b"not a container").unwrap();
        files.push(bad.clone());
        let pipeline = ProcessorPipeline::new(vec![Box::new(Seen(Arc::default()))]);

        let report = WorkPool::new(2).run(
            &files,
            &layout,
            &packed_reader_factory(),
            &pipeline,
            &CancellationToken::new(),
        );

        assert_eq!(report.containers, 2);
        assert_eq!(report.failed_containers.len(), 1);
        assert_eq!(report.failed_containers[0].0, bad);
    }

    #[test]
    fn test_cancelled_before_start() {
        let (_temp, layout, files) = version_with(3);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let pipeline = ProcessorPipeline::new(vec![Box::new(Seen(seen.clone()))]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = WorkPool::new(2).run(&files, &layout, &packed_reader_factory(), &pipeline, &cancel);

        assert!(report.cancelled);
        assert_eq!(report.containers, 0);
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_zero_threads_uses_parallelism() {
        assert!(WorkPool::new(0).threads() >= 1);
        assert_eq!(WorkPool::new(3).threads(), 3);
    }
}
