//! Error types for strm-sync.

use std::path::{Path, PathBuf};

use thiserror::Error;

use strm_core::MappingId;

/// All errors that can arise from sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Directory traversal hit a symlink cycle.
    #[error("filesystem loop detected at {path}")]
    Loop { path: PathBuf },

    /// A mapping index outside `monitor_confs`.
    #[error("no such mapping: {0}")]
    UnknownMapping(MappingId),
}

impl SyncError {
    /// The underlying OS error, if this is an I/O failure.
    pub fn io_source(&self) -> Option<&std::io::Error> {
        match self {
            SyncError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

/// Map a walkdir failure onto [`SyncError`], keeping the OS error when there is one.
pub(crate) fn walk_err(root: &Path, err: walkdir::Error) -> SyncError {
    let path = err
        .path()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| root.to_path_buf());
    match err.into_io_error() {
        Some(source) => SyncError::Io { path, source },
        None => SyncError::Loop { path },
    }
}
