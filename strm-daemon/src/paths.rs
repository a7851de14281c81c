use std::path::{Path, PathBuf};
use std::time::Duration;

pub const LOG_FILE_NAME: &str = "strm-mirror.log";

/// Wait before a supervised task that exited is started again.
pub const RESTART_DELAY: Duration = Duration::from_secs(5);

/// How often the log file size is checked.
pub const ROTATION_INTERVAL: Duration = Duration::from_secs(60);

pub fn log_file_path(log_dir: &Path) -> PathBuf {
    log_dir.join(LOG_FILE_NAME)
}
