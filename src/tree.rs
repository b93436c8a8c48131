//! Source tree helpers shared by the apply and rebuild stages.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Version control metadata, never copied or diffed.
pub const VCS_DIR: &str = ".git";

/// Delete `path` recursively if it exists, then recreate it empty.
pub fn ensure_clean(path: &Path) -> io::Result<()> {
    if path.exists() {
        if path.is_dir() {
            fs::remove_dir_all(path)?;
        } else {
            fs::remove_file(path)?;
        }
    }
    fs::create_dir_all(path)
}

/// Sorted relative paths of every regular file under `root`, skipping `.git`.
pub fn list_files(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.file_name() != VCS_DIR);
    for entry in walker {
        let entry = entry.map_err(io::Error::other)?;
        if entry.file_type().is_file() {
            if let Ok(relative) = entry.path().strip_prefix(root) {
                files.push(relative.to_path_buf());
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Copy every file under `from` into `to`, preserving relative layout.
pub fn copy_tree(from: &Path, to: &Path) -> io::Result<usize> {
    let files = list_files(from)?;
    for relative in &files {
        let target = to.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(from.join(relative), &target)?;
    }
    Ok(files.len())
}

/// Relative path with `/` separators, as used in patch headers.
pub fn slash_path(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
