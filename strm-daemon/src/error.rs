use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the daemon runtime, scheduler and watchers.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("config error: {0}")]
    Config(#[from] strm_core::ConfigError),

    #[error("sync error: {0}")]
    Sync(#[from] strm_sync::SyncError),

    #[error("invalid cron expression {expression:?}: {reason}")]
    Schedule { expression: String, reason: String },

    #[error("{task} task failed: {reason}")]
    Task { task: String, reason: String },

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
