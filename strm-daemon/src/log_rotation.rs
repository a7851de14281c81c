//! Size-based rotation for the mirror log file.
//!
//! Rotates `strm-mirror.log` once it reaches 100 MiB, keeping at most 5
//! rotated copies:
//!   strm-mirror.log → strm-mirror.log.1 → … → strm-mirror.log.5
//!
//! The tracing file writer reopens the log for every event, so renaming the
//! live file away is safe while the daemon keeps logging.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Size at which the live log is rotated (100 MiB).
pub const MAX_LOG_BYTES: u64 = 100 * 1024 * 1024;

/// Rotated copies kept next to the live log.
pub const MAX_ROTATED_FILES: usize = 5;

/// Rotate `log_path` if it is at least `max_bytes` long.
///
/// Returns `true` when a rotation happened. A missing log is not an error.
pub fn rotate_if_needed(log_path: &Path, max_bytes: u64, max_files: usize) -> io::Result<bool> {
    let size = match fs::metadata(log_path) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };
    if size < max_bytes {
        return Ok(false);
    }

    let oldest = numbered_path(log_path, max_files);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for n in (1..max_files).rev() {
        let src = numbered_path(log_path, n);
        if src.exists() {
            fs::rename(&src, numbered_path(log_path, n + 1))?;
        }
    }
    fs::rename(log_path, numbered_path(log_path, 1))?;
    Ok(true)
}

/// Rotate the mirror log under `log_dir`, logging the outcome.
pub fn rotate_log(log_dir: &Path) {
    let log_path = crate::paths::log_file_path(log_dir);
    match rotate_if_needed(&log_path, MAX_LOG_BYTES, MAX_ROTATED_FILES) {
        Ok(true) => tracing::info!(path = %log_path.display(), "log file rotated"),
        Ok(false) => {}
        Err(err) => tracing::warn!(path = %log_path.display(), error = %err, "log rotation failed"),
    }
}

/// `strm-mirror.log` → `strm-mirror.log.<n>`
fn numbered_path(base: &Path, n: usize) -> PathBuf {
    let mut name = base
        .file_name()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| crate::paths::LOG_FILE_NAME.into());
    name.push(format!(".{n}"));
    base.with_file_name(name)
}
