//! Directory-tree enumeration and empty-directory removal.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{io_err, walk_err, SyncError};
use crate::executor::RetryPolicy;

/// Files and directories found below a root, as root-relative paths in
/// walk order (parents before children, siblings by name).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    /// The root did not exist; `files` and `dirs` are empty.
    pub root_missing: bool,
    pub files: Vec<PathBuf>,
    pub dirs: Vec<PathBuf>,
}

/// Enumerate everything below `root`.
///
/// Symlinks are not followed into directories, but a symlink that resolves
/// to a file is listed as a file. An entry that fails with an error `policy`
/// treats as transient fails the whole walk so the caller can decide about
/// the root; any other entry error is logged and the entry skipped.
pub fn walk(root: &Path, policy: &RetryPolicy) -> Result<Listing, SyncError> {
    match std::fs::metadata(root) {
        Ok(_) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Ok(Listing {
                root_missing: true,
                ..Listing::default()
            });
        }
        Err(err) => return Err(io_err(root, err)),
    }

    let mut listing = Listing::default();
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let err = walk_err(root, err);
                if policy.classify(&err) {
                    return Err(err);
                }
                tracing::warn!(error = %err, "skipping unreadable entry");
                continue;
            }
        };

        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        let file_type = entry.file_type();
        if file_type.is_dir() {
            listing.dirs.push(rel.to_path_buf());
        } else if file_type.is_file() || symlink_to_file(entry.path()) {
            listing.files.push(rel.to_path_buf());
        }
    }
    Ok(listing)
}

fn symlink_to_file(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

/// Remove `dir` if it exists and has no entries. Returns whether it was removed.
pub fn remove_if_empty(dir: &Path) -> Result<bool, SyncError> {
    let mut entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(io_err(dir, err)),
    };
    if entries.next().is_some() {
        return Ok(false);
    }
    std::fs::remove_dir(dir).map_err(|e| io_err(dir, e))?;
    tracing::info!(path = %dir.display(), "removed empty directory");
    Ok(true)
}

/// Remove every empty directory below `root` (never `root` itself),
/// repeating bottom-up passes until one removes nothing.
///
/// Returns the number of directories removed. Failures are logged and the
/// directory left in place.
pub fn collapse_empty(root: &Path) -> usize {
    let mut removed = 0;
    loop {
        let mut this_pass = 0;
        let dirs = WalkDir::new(root)
            .min_depth(1)
            .contents_first(true)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_dir());
        for entry in dirs {
            match remove_if_empty(entry.path()) {
                Ok(true) => this_pass += 1,
                Ok(false) => {}
                Err(err) => tracing::error!(error = %err, "could not remove empty directory"),
            }
        }
        removed += this_pass;
        if this_pass == 0 {
            return removed;
        }
    }
}

/// Remove `start` and then its ancestors while they are empty, stopping
/// below `stop`. Returns the number of directories removed.
pub fn collapse_upward(start: &Path, stop: &Path) -> Result<usize, SyncError> {
    let mut removed = 0;
    let mut current = start;
    while current != stop && current.starts_with(stop) {
        if !remove_if_empty(current)? {
            break;
        }
        removed += 1;
        match current.parent() {
            Some(parent) => current = parent,
            None => break,
        }
    }
    Ok(removed)
}
