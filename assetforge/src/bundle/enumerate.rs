//! Container discovery in a resource tree.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Side files that hold streamed payloads of another container.
const SIDE_FILE_EXTENSIONS: &[&str] = &["resS", "resource"];

/// List every container file under `root`, relative to it, sorted.
pub fn enumerate_containers(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    walk(root, root, &mut found)?;
    found.sort();
    Ok(found)
}

fn walk(root: &Path, dir: &Path, found: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            walk(root, &path, found)?;
        } else if file_type.is_file() && !is_side_file(&path) {
            if let Ok(relative) = path.strip_prefix(root) {
                found.push(relative.to_path_buf());
            }
        }
    }
    Ok(())
}

fn is_side_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| SIDE_FILE_EXTENSIONS.contains(&ext))
}
