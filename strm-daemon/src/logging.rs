//! tracing subscriber setup: stdout, plus an append-only log file when a log
//! directory is configured.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{io_err, DaemonError};
use crate::paths::log_file_path;

/// Install the global subscriber. `RUST_LOG` overrides the `info` default.
///
/// Calling this more than once is harmless; later calls keep the first
/// subscriber.
pub fn init_tracing(log_dir: Option<&Path>) -> Result<(), DaemonError> {
    let file_layer = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(LogFile::new(log_file_path(dir))),
            )
        }
        None => None,
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .try_init();
    Ok(())
}

/// Opens the log file in append mode for every event, so rotation can rename
/// the live file without coordinating with the subscriber.
#[derive(Debug, Clone)]
pub struct LogFile {
    path: PathBuf,
}

impl LogFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

pub enum LogFileWriter {
    Open(File),
    /// The file could not be opened; the event is dropped from the file copy.
    Unavailable,
}

impl Write for LogFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            LogFileWriter::Open(file) => file.write(buf),
            LogFileWriter::Unavailable => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            LogFileWriter::Open(file) => file.flush(),
            LogFileWriter::Unavailable => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for LogFile {
    type Writer = LogFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        match OpenOptions::new().create(true).append(true).open(&self.path) {
            Ok(file) => LogFileWriter::Open(file),
            Err(_) => LogFileWriter::Unavailable,
        }
    }
}
