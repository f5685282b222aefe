//! On-disk layout of a working directory.
//!
//! ```text
//! <working_dir>/
//! ├── assets/
//! │   └── CN_24-01-01-00-00-00_abcdef/      (version folder)
//! │       ├── raw_resources/<item>.dat
//! │       ├── downloading_progress/<item>
//! │       ├── resources/…
//! │       ├── processed_resources/…
//! │       └── downloaded                     (completion marker)
//! └── fbs_files/<branch>/…
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Folder holding every version folder.
pub const ASSETS: &str = "assets";
/// Downloaded, still packed archives.
pub const RAW_RESOURCES: &str = "raw_resources";
/// Unpacked container tree.
pub const RESOURCES: &str = "resources";
/// Per-item progress records.
pub const DOWNLOAD_PROGRESS: &str = "downloading_progress";
/// Zero-byte marker written once a version is fully downloaded and unpacked.
pub const DOWNLOAD_FINISH_TAG: &str = "downloaded";
/// Decoded output tree.
pub const PROCESSED: &str = "processed_resources";
/// Cached schema files for the schema processor.
pub const FBS: &str = "fbs_files";

/// Paths of one version folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionLayout {
    root: PathBuf,
    name: String,
}

impl VersionLayout {
    /// Layout for `<working_dir>/assets/<name>`.
    pub fn new(working_dir: &Path, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            root: working_dir.join(ASSETS).join(&name),
            name,
        }
    }

    /// Layout rooted at an explicit version folder.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Self { root, name }
    }

    /// Version folder name, e.g. `GL_24-01-01`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn raw_resources(&self) -> PathBuf {
        self.root.join(RAW_RESOURCES)
    }

    pub fn resources(&self) -> PathBuf {
        self.root.join(RESOURCES)
    }

    pub fn progress(&self) -> PathBuf {
        self.root.join(DOWNLOAD_PROGRESS)
    }

    pub fn processed(&self) -> PathBuf {
        self.root.join(PROCESSED)
    }

    pub fn completion_marker(&self) -> PathBuf {
        self.root.join(DOWNLOAD_FINISH_TAG)
    }

    /// Destination of a downloaded pack archive.
    pub fn archive_path(&self, item: &str) -> PathBuf {
        self.raw_resources().join(format!("{}.dat", item))
    }

    /// Output directory for records of a container.
    ///
    /// `relative` is the container path relative to `resources/`; its
    /// extension is dropped so `ui/icons.ab` maps to `processed_resources/ui/icons`.
    pub fn processed_dir_for(&self, relative: &Path) -> PathBuf {
        self.processed().join(relative.with_extension(""))
    }

    /// Whether the completion marker exists.
    pub fn is_complete(&self) -> bool {
        self.completion_marker().is_file()
    }

    /// Create the directories needed before downloading.
    pub fn create_dirs(&self) -> io::Result<()> {
        fs::create_dir_all(self.raw_resources())?;
        fs::create_dir_all(self.resources())?;
        fs::create_dir_all(self.progress())
    }
}

/// Create an empty file, along with its parent directories, if it does not exist.
pub fn touch_file(path: &Path) -> io::Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::File::create(path).map(|_| ())
}

/// List completed version folders under `<working_dir>/assets`, sorted by name.
pub fn list_versions(working_dir: &Path) -> io::Result<Vec<VersionLayout>> {
    let assets = working_dir.join(ASSETS);
    if !assets.is_dir() {
        return Ok(Vec::new());
    }

    let mut versions: Vec<VersionLayout> = fs::read_dir(&assets)?
        .flatten()
        .filter(|e| e.path().is_dir())
        .map(|e| VersionLayout::at(e.path()))
        .filter(VersionLayout::is_complete)
        .collect();
    versions.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(versions)
}
