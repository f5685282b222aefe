//! Integration tests for resumable downloads and the download workflow.
//!
//! All transfers use in-memory fetchers; no network access.
//!
//! Run with: `cargo test --test download_integration`

use std::collections::HashMap;
use std::fs;
use std::io::{self, Cursor, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use assetforge::download::{
    DownloadError, DownloadResult, DownloadScheduler, DownloadTask, RangeBody, RangeFetcher,
};
use assetforge::manifest::{PackEntry, PackManifest};
use assetforge::paths::VersionLayout;
use assetforge::progress::ProgressStore;
use assetforge::server::ExtraArchive;
use assetforge::workflow::{DownloadPlan, DownloadWorkflow};

// ============================================================================
// Helper Functions
// ============================================================================

fn payload(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

/// Serves named items, honouring offsets. Items may hide their length.
#[derive(Default)]
struct MemoryFetcher {
    items: HashMap<String, (Vec<u8>, bool)>,
}

impl MemoryFetcher {
    fn with(mut self, url: &str, data: Vec<u8>, announce_length: bool) -> Self {
        self.items.insert(url.to_string(), (data, announce_length));
        self
    }
}

impl RangeFetcher for MemoryFetcher {
    fn fetch(&self, url: &str, offset: u64) -> DownloadResult<RangeBody> {
        let (data, announce) = self.items.get(url).ok_or_else(|| DownloadError::BadStatus {
            url: url.to_string(),
            status: 404,
        })?;
        let start = (offset as usize).min(data.len());
        Ok(RangeBody {
            start: start as u64,
            total: announce.then_some(data.len() as u64),
            reader: Box::new(Cursor::new(data[start..].to_vec())),
        })
    }
}

/// Yields `first` bytes, raises `started`, then stalls until cancelled.
struct StallingReader {
    first: Option<Vec<u8>>,
    started: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl Read for StallingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(chunk) = self.first.take() {
            let n = chunk.len().min(buf.len());
            buf[..n].copy_from_slice(&chunk[..n]);
            return Ok(n);
        }
        self.started.store(true, Ordering::SeqCst);
        while !self.cancel.is_cancelled() {
            thread::sleep(Duration::from_millis(5));
        }
        Ok(0)
    }
}

/// item1 completes, item2 (unknown length) stalls after 30 bytes, item3
/// (if it gets past the admission gate at all) stalls before its first byte.
struct InterruptingFetcher {
    item1: Vec<u8>,
    item2: Vec<u8>,
    item2_started: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl RangeFetcher for InterruptingFetcher {
    fn fetch(&self, url: &str, offset: u64) -> DownloadResult<RangeBody> {
        assert_eq!(offset, 0);
        let (first, total) = match url {
            "mem://item1" => {
                return Ok(RangeBody {
                    start: 0,
                    total: Some(self.item1.len() as u64),
                    reader: Box::new(Cursor::new(self.item1.clone())),
                })
            }
            "mem://item2" => (Some(self.item2[..30].to_vec()), None),
            _ => (None, Some(50)),
        };
        let started = if first.is_some() {
            Arc::clone(&self.item2_started)
        } else {
            Arc::new(AtomicBool::new(false))
        };
        Ok(RangeBody {
            start: 0,
            total,
            reader: Box::new(StallingReader {
                first,
                started,
                cancel: self.cancel.clone(),
            }),
        })
    }
}

fn tasks(layout: &VersionLayout, store: &ProgressStore) -> Vec<DownloadTask> {
    ["item1", "item2", "item3"]
        .iter()
        .map(|name| {
            DownloadTask::new(
                format!("mem://{}", name),
                layout.archive_path(name),
                store.load(name),
            )
        })
        .collect()
}

fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(5));
    }
}

fn zip_archive(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in files {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

// ============================================================================
// Integration Tests
// ============================================================================

/// Three items of 100, unknown and 50 bytes under a limit of two: cancel
/// once item1 is done and item2 is mid-transfer, then resume to
/// byte-identical files.
#[test]
fn test_interrupted_run_resumes_exactly() {
    let temp = TempDir::new().unwrap();
    let layout = VersionLayout::new(temp.path(), "CN_test");
    let store = ProgressStore::new(layout.progress());

    let item1 = payload(100, 1);
    let item2 = payload(50, 2);
    let item3 = payload(50, 3);

    // First run: item3 only starts once item1 frees its slot
    let cancel = CancellationToken::new();
    let item2_started = Arc::new(AtomicBool::new(false));
    let fetcher = Arc::new(InterruptingFetcher {
        item1: item1.clone(),
        item2: item2.clone(),
        item2_started: Arc::clone(&item2_started),
        cancel: cancel.clone(),
    });
    let scheduler = DownloadScheduler::new(fetcher)
        .with_parallel(2)
        .with_commit_interval(Duration::from_secs(3600));

    let report = thread::scope(|scope| {
        let run = scope.spawn(|| scheduler.run(tasks(&layout, &store), &store, &cancel, None));
        wait_until("item1 to finish", || store.load("item1").done);
        wait_until("item2 to stall", || item2_started.load(Ordering::SeqCst));
        cancel.cancel();
        run.join().unwrap()
    });

    assert_eq!(report.completed, vec!["item1".to_string()]);
    assert_eq!(report.cancelled.len(), 2);
    assert!(report.failed.is_empty());

    let r1 = store.load("item1");
    let r2 = store.load("item2");
    let r3 = store.load("item3");
    assert!(r1.done);
    assert_eq!(r1.position, 100);
    assert!(!r2.done);
    assert_eq!(r2.position, 30);
    assert!(!r3.done);
    assert_eq!(r3.position, 0);

    // Committed position never exceeds what is on disk
    assert_eq!(fs::read(layout.archive_path("item2")).unwrap(), item2[..30].to_vec());

    // Second run: resumes from the committed offsets
    let fetcher = Arc::new(
        MemoryFetcher::default()
            .with("mem://item1", item1.clone(), true)
            .with("mem://item2", item2.clone(), false)
            .with("mem://item3", item3.clone(), true),
    );
    let report = DownloadScheduler::new(fetcher).with_parallel(2).run(
        tasks(&layout, &store),
        &store,
        &CancellationToken::new(),
        None,
    );

    assert!(report.all_done());
    assert_eq!(report.skipped, vec!["item1".to_string()]);
    assert_eq!(fs::read(layout.archive_path("item1")).unwrap(), item1);
    assert_eq!(fs::read(layout.archive_path("item2")).unwrap(), item2);
    assert_eq!(fs::read(layout.archive_path("item3")).unwrap(), item3);

    for (name, len) in [("item1", 100), ("item2", 50), ("item3", 50)] {
        let record = store.load(name);
        assert!(record.done, "{} not done", name);
        assert_eq!(record.position, record.length, "{}", name);
        assert_eq!(record.length, len, "{}", name);
    }
}

/// Full workflow: download, unpack (with prefix for the extra archive),
/// completion marker, progress cleanup.
#[test]
fn test_workflow_downloads_unpacks_and_finalizes() {
    let temp = TempDir::new().unwrap();
    let layout = VersionLayout::new(temp.path(), "CN_24-01-01");

    let ui = zip_archive(&[("ui/icons.ab", b"icons"), ("ui/font.ab", b"font")]);
    let audio = zip_archive(&[("audio/voice.ab", b"voice")]);
    let client = zip_archive(&[
        ("assets/AB/Android/base/init.ab", b"init"),
        ("classes.dex", b"dex"),
    ]);

    let fetcher = Arc::new(
        MemoryFetcher::default()
            .with("mem://assets/lpack_ui.dat", ui.clone(), true)
            .with("mem://assets/lpack_audio.dat", audio, true)
            .with("mem://client", client, true),
    );
    let plan = DownloadPlan {
        layout: layout.clone(),
        assets_url: "mem://assets".to_string(),
        manifest: PackManifest {
            entries: vec![
                PackEntry {
                    name: "lpack_ui".to_string(),
                    content_hash: "a".to_string(),
                    total_size: ui.len() as u64,
                },
                PackEntry {
                    name: "lpack_audio".to_string(),
                    content_hash: "b".to_string(),
                    total_size: 0,
                },
            ],
        },
        extras: vec![ExtraArchive {
            name: "game.apk".to_string(),
            url: "mem://client".to_string(),
            prefix: "assets/AB/Android/".to_string(),
        }],
    };

    let workflow = DownloadWorkflow::new(fetcher).with_keep_archives(false);
    let summary = workflow.run(&plan, &CancellationToken::new(), None).unwrap();

    assert!(summary.complete);
    assert_eq!(summary.unpacked, 3);
    assert!(summary.unpack_failures.is_empty());

    let resources = layout.resources();
    assert_eq!(fs::read(resources.join("ui/icons.ab")).unwrap(), b"icons");
    assert_eq!(fs::read(resources.join("audio/voice.ab")).unwrap(), b"voice");
    assert_eq!(fs::read(resources.join("base/init.ab")).unwrap(), b"init");
    assert!(!resources.join("classes.dex").exists());

    assert!(layout.is_complete());
    assert!(!layout.progress().exists());
    assert!(!layout.archive_path("lpack_ui").exists());

    // A finished version is left alone
    let again = workflow.run(&plan, &CancellationToken::new(), None).unwrap();
    assert!(again.complete);
    assert_eq!(again.report.total(), 0);
}

/// A failed item keeps the version unfinished but its siblings unpack.
#[test]
fn test_workflow_partial_failure_not_finalized() {
    let temp = TempDir::new().unwrap();
    let layout = VersionLayout::new(temp.path(), "GL_1");

    let fetcher = Arc::new(MemoryFetcher::default().with(
        "mem://a/good.dat",
        zip_archive(&[("good.ab", b"ok")]),
        true,
    ));
    let plan = DownloadPlan {
        layout: layout.clone(),
        assets_url: "mem://a".to_string(),
        manifest: PackManifest {
            entries: ["good", "missing"]
                .iter()
                .map(|name| PackEntry {
                    name: name.to_string(),
                    content_hash: String::new(),
                    total_size: 0,
                })
                .collect(),
        },
        extras: Vec::new(),
    };

    let summary = DownloadWorkflow::new(fetcher)
        .run(&plan, &CancellationToken::new(), None)
        .unwrap();

    assert!(!summary.complete);
    assert_eq!(summary.report.failed.len(), 1);
    assert_eq!(summary.unpacked, 1);
    assert!(layout.resources().join("good.ab").is_file());
    assert!(!layout.is_complete());

    let store = ProgressStore::new(layout.progress());
    assert!(store.load("good").unpacked);
    assert!(!store.load("missing").done);
}
