//! Atomic artifact writer.
//!
//! ## Write protocol
//!
//! 1. Create the destination's parent directories.
//! 2. Fill a tmp file next to `dest` (pointer text, or a copy of the sidecar).
//!    Every write gets its own tmp name, so concurrent writers of one
//!    artifact never share a half-filled file.
//! 3. Stamp the tmp file with the source mtime.
//! 4. Rename over `dest` (atomic on POSIX within one filesystem).
//!
//! A reader of `dest` sees either the previous artifact or the complete new
//! one. When the rename fails the tmp file is removed and the old artifact is
//! left as it was.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use filetime::{set_file_mtime, FileTime};

use strm_core::{EntryKind, SyncPolicy};

use crate::error::{io_err, SyncError};
use crate::mapper::PathMapper;
use crate::staleness::{needs_metadata, needs_pointer};

const TMP_SUFFIX: &str = ".strm-mirror.tmp";

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Outcome of one artifact write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteResult {
    /// Artifact was (re)written.
    Written { path: PathBuf },
    /// Existing artifact judged current; nothing touched.
    Unchanged { path: PathBuf },
}

impl WriteResult {
    pub fn is_written(&self) -> bool {
        matches!(self, WriteResult::Written { .. })
    }
}

/// What single-file generation did for one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileAction {
    Pointer(WriteResult),
    Metadata(WriteResult),
    /// Not a qualifying file, or its kind is disabled for the mapping.
    Ignored,
}

impl FileAction {
    pub fn is_written(&self) -> bool {
        match self {
            FileAction::Pointer(result) | FileAction::Metadata(result) => result.is_written(),
            FileAction::Ignored => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Single-file generation
// ---------------------------------------------------------------------------

/// Generate the artifact for `source` (found at `rel` below its root) if it
/// is missing or stale.
///
/// Safe to call any number of times for the same file.
pub fn sync_source_file(
    mapper: &PathMapper<'_>,
    policy: &SyncPolicy,
    source: &Path,
    rel: &Path,
) -> Result<FileAction, SyncError> {
    let mapping = mapper.mapping();
    match mapper.classify(rel) {
        EntryKind::Video if mapping.create_pointers => {
            let dest = mapper.pointer_path(rel);
            if !needs_pointer(&dest, policy.overwrite_existing)?.needs_write() {
                tracing::debug!(path = %dest.display(), "pointer current");
                return Ok(FileAction::Pointer(WriteResult::Unchanged { path: dest }));
            }
            refresh_pointer(mapper, source, rel).map(FileAction::Pointer)
        }
        EntryKind::Metadata if mapping.copy_metadata => {
            let dest = mapper.dest_path(rel);
            if !needs_metadata(source, &dest, policy.overwrite_existing)?.needs_write() {
                tracing::debug!(path = %dest.display(), "metadata current");
                return Ok(FileAction::Metadata(WriteResult::Unchanged { path: dest }));
            }
            copy_metadata(source, &dest).map(FileAction::Metadata)
        }
        _ => Ok(FileAction::Ignored),
    }
}

/// Unconditionally (re)write the pointer for the video at `rel`.
pub fn refresh_pointer(
    mapper: &PathMapper<'_>,
    source: &Path,
    rel: &Path,
) -> Result<WriteResult, SyncError> {
    let dest = mapper.pointer_path(rel);
    let mtime = source_mtime(source)?;
    write_pointer(&dest, &mapper.pointer_content(rel), mtime)
}

// ---------------------------------------------------------------------------
// Primitive writes
// ---------------------------------------------------------------------------

/// Atomically write a pointer artifact whose entire content is `target`.
pub fn write_pointer(dest: &Path, target: &Path, mtime: FileTime) -> Result<WriteResult, SyncError> {
    replace_with(dest, mtime, |tmp| {
        std::fs::write(tmp, target.as_os_str().as_encoded_bytes())
    })?;
    tracing::info!(path = %dest.display(), target = %target.display(), "wrote pointer");
    Ok(WriteResult::Written {
        path: dest.to_path_buf(),
    })
}

/// Atomically copy `source` to `dest`, carrying the source mtime across.
pub fn copy_metadata(source: &Path, dest: &Path) -> Result<WriteResult, SyncError> {
    let mtime = source_mtime(source)?;
    replace_with(dest, mtime, |tmp| std::fs::copy(source, tmp).map(|_| ()))?;
    tracing::info!(from = %source.display(), to = %dest.display(), "copied metadata");
    Ok(WriteResult::Written {
        path: dest.to_path_buf(),
    })
}

/// `<dest>.<pid>-<n>.strm-mirror.tmp`, next to `dest` so the rename stays on
/// one filesystem. Unique per call within and across processes.
fn tmp_path_for(dest: &Path) -> PathBuf {
    let seq = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut name = OsString::from(dest.as_os_str());
    name.push(format!(".{}-{seq}{TMP_SUFFIX}", std::process::id()));
    PathBuf::from(name)
}

/// True for in-flight tmp files of the writer; full passes leave them alone.
pub(crate) fn is_tmp_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(TMP_SUFFIX))
}

pub(crate) fn source_mtime(source: &Path) -> Result<FileTime, SyncError> {
    let meta = std::fs::metadata(source).map_err(|e| io_err(source, e))?;
    Ok(FileTime::from_last_modification_time(&meta))
}

fn replace_with<F>(dest: &Path, mtime: FileTime, fill: F) -> Result<(), SyncError>
where
    F: FnOnce(&Path) -> std::io::Result<()>,
{
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let tmp = &tmp_path_for(dest);

    let staged = fill(tmp)
        .map_err(|e| io_err(tmp, e))
        .and_then(|()| set_file_mtime(tmp, mtime).map_err(|e| io_err(tmp, e)));
    if let Err(err) = staged {
        let _ = std::fs::remove_file(tmp);
        return Err(err);
    }

    if let Err(e) = std::fs::rename(tmp, dest) {
        let _ = std::fs::remove_file(tmp);
        return Err(io_err(dest, e));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
