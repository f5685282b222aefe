//! File-backed progress store.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::record::{ProgressError, ProgressRecord, ProgressResult};

/// Directory of progress records, one file per item.
#[derive(Debug, Clone)]
pub struct ProgressStore {
    dir: PathBuf,
}

impl ProgressStore {
    /// Create a store rooted at `dir`. The directory is created lazily.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Load the record for `name`.
    ///
    /// Missing, unreadable or corrupt records come back zeroed; the worst
    /// outcome is a redundant re-download.
    pub fn load(&self, name: &str) -> ProgressRecord {
        let path = self.record_path(name);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return ProgressRecord::new(name);
            }
            Err(e) => {
                tracing::warn!(item = %name, error = %e, "Unreadable progress record, starting over");
                return ProgressRecord::new(name);
            }
        };

        match ProgressRecord::decode(name, &raw) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(item = %name, error = %e, "Corrupt progress record, starting over");
                ProgressRecord::new(name)
            }
        }
    }

    /// Persist `record`, replacing the previous version atomically.
    pub fn commit(&self, record: &ProgressRecord) -> ProgressResult<()> {
        let path = self.record_path(&record.name);
        let write_failed = |source| ProgressError::WriteFailed {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_failed)?;
        }

        // Write to temp file first, then rename for atomicity
        let mut temp_path = path.clone().into_os_string();
        temp_path.push(".tmp");
        let temp_path = PathBuf::from(temp_path);
        {
            let mut file = fs::File::create(&temp_path).map_err(write_failed)?;
            file.write_all(record.encode().as_bytes())
                .map_err(write_failed)?;
            file.sync_all().map_err(write_failed)?;
        }
        fs::rename(&temp_path, &path).map_err(write_failed)?;

        tracing::trace!(
            item = %record.name,
            position = record.position,
            length = record.length,
            done = record.done,
            "Committed progress"
        );
        Ok(())
    }

    /// Remove every record. Called once a whole version is finalized.
    pub fn clear(&self) -> io::Result<()> {
        match fs::remove_dir_all(&self.dir) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_is_zeroed() {
        let temp = TempDir::new().unwrap();
        let store = ProgressStore::new(temp.path().join("progress"));
        let record = store.load("lpack_ui");
        assert_eq!(record, ProgressRecord::new("lpack_ui"));
    }

    #[test]
    fn test_commit_then_load() {
        let temp = TempDir::new().unwrap();
        let store = ProgressStore::new(temp.path().join("progress"));

        let mut record = ProgressRecord::new("lpack_ui");
        record.length = 100;
        record.advance(60).unwrap();
        store.commit(&record).unwrap();

        assert_eq!(store.load("lpack_ui"), record);
        let raw = fs::read_to_string(temp.path().join("progress/lpack_ui")).unwrap();
        assert_eq!(raw, "0|0|60|100");
    }

    #[test]
    fn test_commit_overwrites_whole_file() {
        let temp = TempDir::new().unwrap();
        let store = ProgressStore::new(temp.path());

        let mut record = ProgressRecord::new("a");
        record.length = 123_456_789;
        record.position = 123_456_789;
        record.done = true;
        store.commit(&record).unwrap();

        let small = ProgressRecord::new("a");
        store.commit(&small).unwrap();

        assert_eq!(fs::read_to_string(temp.path().join("a")).unwrap(), "0|0|0|0");
        assert!(!temp.path().join("a.tmp").exists());
    }

    #[test]
    fn test_partial_file_treated_as_absent() {
        let temp = TempDir::new().unwrap();
        let store = ProgressStore::new(temp.path());
        fs::write(temp.path().join("a"), "0|1|5").unwrap();

        assert_eq!(store.load("a"), ProgressRecord::new("a"));
    }

    #[test]
    fn test_garbage_file_treated_as_absent() {
        let temp = TempDir::new().unwrap();
        let store = ProgressStore::new(temp.path());
        fs::write(temp.path().join("a"), [0xff, 0xfe, 0x00]).unwrap();

        assert_eq!(store.load("a"), ProgressRecord::new("a"));
    }

    #[test]
    fn test_clear_removes_directory() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("progress");
        let store = ProgressStore::new(&dir);
        store.commit(&ProgressRecord::new("a")).unwrap();
        assert!(dir.exists());

        store.clear().unwrap();
        assert!(!dir.exists());

        // Clearing twice is fine
        store.clear().unwrap();
    }
}
