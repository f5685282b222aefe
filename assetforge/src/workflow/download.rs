//! Download, unpack and finalize one version.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rayon::prelude::*;
use tokio_util::sync::CancellationToken;

use super::{WorkflowError, WorkflowResult};
use crate::download::{DownloadReport, DownloadScheduler, HttpFetcher, ProgressCallback, RangeFetcher};
use crate::manifest::PackManifest;
use crate::paths::{touch_file, VersionLayout};
use crate::progress::ProgressStore;
use crate::server::{ExtraArchive, Server, ServerInfo};
use crate::unpack::unpack_zip;

/// Everything needed to download one version.
#[derive(Debug, Clone)]
pub struct DownloadPlan {
    pub layout: VersionLayout,
    /// Base URL the pack names are appended to.
    pub assets_url: String,
    pub manifest: PackManifest,
    pub extras: Vec<ExtraArchive>,
}

impl DownloadPlan {
    /// Resolve the current version of `server` and fetch its manifest.
    pub fn resolve(fetcher: &HttpFetcher, server: Server, working_dir: &Path) -> WorkflowResult<Self> {
        let info = ServerInfo::fetch(fetcher, server)?;
        let assets_url = info.assets_url();
        let manifest = PackManifest::fetch(fetcher, &assets_url)?;
        Ok(Self {
            layout: VersionLayout::new(working_dir, info.folder_name()),
            assets_url,
            manifest,
            extras: server.extra_archives(),
        })
    }
}

/// What a download run achieved.
#[derive(Debug, Default)]
pub struct DownloadSummary {
    pub report: DownloadReport,
    /// Archives unpacked in this run.
    pub unpacked: usize,
    pub unpack_failures: Vec<(String, String)>,
    /// The completion marker exists after this run.
    pub complete: bool,
    pub cancelled: bool,
}

/// An archive to unpack once its transfer is done.
struct UnpackItem {
    name: String,
    archive: PathBuf,
    prefix: String,
}

/// Downloads every pack of a [`DownloadPlan`], unpacks finished archives and
/// writes the completion marker when nothing is left.
pub struct DownloadWorkflow {
    scheduler: DownloadScheduler,
    keep_archives: bool,
}

impl DownloadWorkflow {
    pub fn new(fetcher: Arc<dyn RangeFetcher>) -> Self {
        Self {
            scheduler: DownloadScheduler::new(fetcher),
            keep_archives: true,
        }
    }

    pub fn with_parallel(mut self, parallel: usize) -> Self {
        self.scheduler = self.scheduler.with_parallel(parallel);
        self
    }

    pub fn with_commit_interval(mut self, interval: Duration) -> Self {
        self.scheduler = self.scheduler.with_commit_interval(interval);
        self
    }

    /// Whether archives stay in `raw_resources/` after unpacking.
    pub fn with_keep_archives(mut self, keep: bool) -> Self {
        self.keep_archives = keep;
        self
    }

    pub fn run(
        &self,
        plan: &DownloadPlan,
        cancel: &CancellationToken,
        on_progress: Option<ProgressCallback>,
    ) -> WorkflowResult<DownloadSummary> {
        let layout = &plan.layout;
        if layout.is_complete() {
            tracing::info!(version = layout.name(), "Version already downloaded");
            return Ok(DownloadSummary {
                complete: true,
                ..Default::default()
            });
        }

        layout.create_dirs().map_err(|source| WorkflowError::Io {
            action: "create",
            path: layout.root().to_path_buf(),
            source,
        })?;
        let store = ProgressStore::new(layout.progress());

        let mut tasks = plan.manifest.tasks(&plan.assets_url, layout, &store);
        let mut items: Vec<UnpackItem> = tasks
            .iter()
            .map(|t| UnpackItem {
                name: t.name.clone(),
                archive: t.sink.clone(),
                prefix: String::new(),
            })
            .collect();
        for extra in &plan.extras {
            let task = extra.task(layout, &store);
            items.push(UnpackItem {
                name: task.name.clone(),
                archive: task.sink.clone(),
                prefix: extra.prefix.clone(),
            });
            tasks.push(task);
        }

        let report = self.scheduler.run(tasks, &store, cancel, on_progress);

        let mut summary = DownloadSummary {
            report,
            ..Default::default()
        };
        if cancel.is_cancelled() {
            summary.cancelled = true;
            return Ok(summary);
        }

        let (unpacked, failures) = self.unpack_all(&items, layout, &store, cancel);
        summary.unpacked = unpacked;
        summary.unpack_failures = failures;
        if cancel.is_cancelled() {
            summary.cancelled = true;
            return Ok(summary);
        }

        let finished = items.iter().all(|item| {
            let record = store.load(&item.name);
            record.done && record.unpacked
        });
        if finished {
            self.finalize(layout, &store)?;
            summary.complete = true;
        }
        Ok(summary)
    }

    /// Unpack every done, not yet unpacked archive on the rayon pool.
    fn unpack_all(
        &self,
        items: &[UnpackItem],
        layout: &VersionLayout,
        store: &ProgressStore,
        cancel: &CancellationToken,
    ) -> (usize, Vec<(String, String)>) {
        let resources = layout.resources();
        let keep_archives = self.keep_archives;
        let failures = Mutex::new(Vec::new());

        let unpacked = items
            .par_iter()
            .filter(|item| {
                let mut record = store.load(&item.name);
                if !record.done || record.unpacked || cancel.is_cancelled() {
                    return false;
                }

                let stats = match unpack_zip(&item.archive, &resources, &item.prefix, cancel) {
                    Ok(stats) => stats,
                    Err(e) => {
                        tracing::warn!(item = %item.name, error = %e, "Unpack failed");
                        failures.lock().push((item.name.clone(), e.to_string()));
                        return false;
                    }
                };
                if stats.cancelled {
                    return false;
                }

                record.unpacked = true;
                if let Err(e) = store.commit(&record) {
                    failures.lock().push((item.name.clone(), e.to_string()));
                    return false;
                }
                tracing::debug!(item = %item.name, extracted = stats.extracted, skipped = stats.skipped, "Unpacked");

                if !keep_archives {
                    if let Err(e) = fs::remove_file(&item.archive) {
                        tracing::warn!(item = %item.name, error = %e, "Failed to delete archive");
                    }
                }
                true
            })
            .count();

        (unpacked, failures.into_inner())
    }

    /// Write the completion marker, then drop the progress records.
    fn finalize(&self, layout: &VersionLayout, store: &ProgressStore) -> WorkflowResult<()> {
        let marker = layout.completion_marker();
        touch_file(&marker).map_err(|source| WorkflowError::Io {
            action: "create",
            path: marker.clone(),
            source,
        })?;
        store.clear().map_err(|source| WorkflowError::Io {
            action: "remove",
            path: store.dir().to_path_buf(),
            source,
        })?;
        if !self.keep_archives {
            if let Err(e) = fs::remove_dir_all(layout.raw_resources()) {
                tracing::debug!(error = %e, "Could not remove archive directory");
            }
        }
        tracing::info!(version = layout.name(), "Version complete");
        Ok(())
    }
}
