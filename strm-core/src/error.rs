//! Error types for strm-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while loading or validating configuration.
///
/// Every variant is fatal at startup; nothing here is retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error, including missing or mistyped required keys.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The document parsed but violates a structural rule.
    #[error("invalid config at {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },

    /// `dirs::config_dir()` returned `None` and no explicit path was given.
    #[error("cannot determine config directory; pass --config or set STRM_MIRROR_CONFIG")]
    ConfigDirNotFound,
}

pub(crate) fn invalid(path: impl Into<PathBuf>, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        path: path.into(),
        reason: reason.into(),
    }
}
