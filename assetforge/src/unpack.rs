//! Idempotent extraction of downloaded pack archives.
//!
//! Packs are zip files. Extraction is resumable at file granularity: an entry
//! whose destination already exists is skipped. Entries are written to a
//! `.part` file and renamed into place, so an existing destination is always
//! a complete one.

use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use zip::ZipArchive;

/// Result type for unpack operations.
pub type UnpackResult<T> = Result<T, UnpackError>;

/// Errors raised while extracting an archive.
#[derive(Debug, Error)]
pub enum UnpackError {
    #[error("failed to open archive {path}: {source}")]
    Open { path: PathBuf, source: io::Error },

    #[error("invalid archive {path}: {source}")]
    Archive {
        path: PathBuf,
        source: zip::result::ZipError,
    },

    #[error("failed to extract to {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

/// What an extraction did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnpackStats {
    /// Entries written in this call.
    pub extracted: usize,
    /// Entries whose destination already existed.
    pub skipped: usize,
    /// Extraction stopped early because of cancellation.
    pub cancelled: bool,
}

/// Extract every file entry of `archive` whose name starts with `prefix`
/// into `dest`, with the prefix stripped.
///
/// Directory entries, entries outside the prefix and entries that would
/// escape `dest` are ignored. Cancellation is polled before every entry.
pub fn unpack_zip(
    archive: &Path,
    dest: &Path,
    prefix: &str,
    cancel: &CancellationToken,
) -> UnpackResult<UnpackStats> {
    let file = File::open(archive).map_err(|source| UnpackError::Open {
        path: archive.to_path_buf(),
        source,
    })?;
    let mut zip = ZipArchive::new(file).map_err(|source| UnpackError::Archive {
        path: archive.to_path_buf(),
        source,
    })?;

    let mut stats = UnpackStats::default();
    for index in 0..zip.len() {
        if cancel.is_cancelled() {
            stats.cancelled = true;
            break;
        }

        let mut entry = zip.by_index(index).map_err(|source| UnpackError::Archive {
            path: archive.to_path_buf(),
            source,
        })?;
        if entry.is_dir() || entry.enclosed_name().is_none() {
            continue;
        }
        let Some(relative) = entry.name().strip_prefix(prefix).and_then(safe_relative) else {
            continue;
        };

        let target = dest.join(&relative);
        if target.exists() {
            stats.skipped += 1;
            continue;
        }

        let write_failed = |source| UnpackError::Write {
            path: target.clone(),
            source,
        };
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(write_failed)?;
        }

        let mut part = target.clone().into_os_string();
        part.push(".part");
        let part = PathBuf::from(part);
        {
            let mut out = File::create(&part).map_err(write_failed)?;
            io::copy(&mut entry, &mut out).map_err(write_failed)?;
        }
        fs::rename(&part, &target).map_err(write_failed)?;
        stats.extracted += 1;
    }

    tracing::debug!(
        archive = %archive.display(),
        extracted = stats.extracted,
        skipped = stats.skipped,
        cancelled = stats.cancelled,
        "Unpacked archive"
    );
    Ok(stats)
}

/// Reject empty, absolute and parent-escaping paths.
fn safe_relative(name: &str) -> Option<PathBuf> {
    let path = Path::new(name);
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    (!out.as_os_str().is_empty()).then_some(out)
}
