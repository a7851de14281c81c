//! Artifact staleness decisions.
//!
//! Signal precedence:
//! 1. `Missing` (destination absent)
//! 2. `Forced` (`overwrite_existing`)
//! 3. `SourceNewer` (metadata only: source mtime after destination mtime)
//! 4. `SizeChanged` (metadata only: lengths differ)
//! 5. `Current`
//!
//! Pointer artifacts never reach 3 or 4: an existing pointer is current until
//! an overwrite is forced. Every call reads fresh metadata; a `NotFound` on
//! the destination means `Missing`, any other error is returned for the
//! caller's retry policy to classify.

use std::fs::Metadata;
use std::io::ErrorKind;
use std::path::Path;

use crate::error::{io_err, SyncError};

/// Whether a destination artifact must be (re)written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    Missing,
    Forced,
    SourceNewer,
    SizeChanged,
    Current,
}

impl Staleness {
    pub fn needs_write(self) -> bool {
        !matches!(self, Staleness::Current)
    }
}

/// Decide whether the pointer at `dest` must be written.
pub fn needs_pointer(dest: &Path, overwrite: bool) -> Result<Staleness, SyncError> {
    if stat_optional(dest)?.is_none() {
        return Ok(Staleness::Missing);
    }
    if overwrite {
        return Ok(Staleness::Forced);
    }
    Ok(Staleness::Current)
}

/// Decide whether `source` must be copied over `dest`.
///
/// Also used in reverse (destination → source) with the arguments swapped.
pub fn needs_metadata(source: &Path, dest: &Path, overwrite: bool) -> Result<Staleness, SyncError> {
    let Some(dest_meta) = stat_optional(dest)? else {
        return Ok(Staleness::Missing);
    };
    if overwrite {
        return Ok(Staleness::Forced);
    }

    let source_meta = std::fs::metadata(source).map_err(|e| io_err(source, e))?;
    let source_mtime = source_meta.modified().map_err(|e| io_err(source, e))?;
    let dest_mtime = dest_meta.modified().map_err(|e| io_err(dest, e))?;
    if source_mtime > dest_mtime {
        return Ok(Staleness::SourceNewer);
    }
    // Remote filesystems do not always propagate mtimes; length catches the rest.
    if source_meta.len() != dest_meta.len() {
        return Ok(Staleness::SizeChanged);
    }
    Ok(Staleness::Current)
}

pub(crate) fn stat_optional(path: &Path) -> Result<Option<Metadata>, SyncError> {
    match std::fs::metadata(path) {
        Ok(meta) => Ok(Some(meta)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(io_err(path, err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{Duration, SystemTime};

    use filetime::{set_file_mtime, FileTime};
    use tempfile::TempDir;

    fn at(offset_secs: i64) -> FileTime {
        let base = SystemTime::now() - Duration::from_secs(3600);
        let time = if offset_secs >= 0 {
            base + Duration::from_secs(offset_secs as u64)
        } else {
            base - Duration::from_secs(offset_secs.unsigned_abs())
        };
        FileTime::from_system_time(time)
    }

    #[test]
    fn pointer_missing_then_current() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("e1.strm");
        assert_eq!(needs_pointer(&dest, false).unwrap(), Staleness::Missing);

        fs::write(&dest, "/src/e1.mp4").unwrap();
        assert_eq!(needs_pointer(&dest, false).unwrap(), Staleness::Current);
        assert_eq!(needs_pointer(&dest, true).unwrap(), Staleness::Forced);
    }

    #[test]
    fn pointer_content_is_not_inspected() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("e1.strm");
        fs::write(&dest, "stale content").unwrap();
        assert!(!needs_pointer(&dest, false).unwrap().needs_write());
    }

    #[test]
    fn metadata_equal_mtime_and_size_is_current() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src.nfo");
        let dst = tmp.path().join("dst.nfo");
        fs::write(&src, "<movie/>").unwrap();
        fs::write(&dst, "<movie/>").unwrap();
        set_file_mtime(&src, at(0)).unwrap();
        set_file_mtime(&dst, at(0)).unwrap();
        assert_eq!(needs_metadata(&src, &dst, false).unwrap(), Staleness::Current);
        assert_eq!(needs_metadata(&src, &dst, true).unwrap(), Staleness::Forced);
    }

    #[test]
    fn metadata_newer_source_is_stale() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src.nfo");
        let dst = tmp.path().join("dst.nfo");
        fs::write(&src, "same").unwrap();
        fs::write(&dst, "same").unwrap();
        set_file_mtime(&dst, at(0)).unwrap();
        set_file_mtime(&src, at(60)).unwrap();
        assert_eq!(
            needs_metadata(&src, &dst, false).unwrap(),
            Staleness::SourceNewer
        );
    }

    #[test]
    fn metadata_size_change_with_older_source_is_stale() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src.nfo");
        let dst = tmp.path().join("dst.nfo");
        fs::write(&src, "longer content").unwrap();
        fs::write(&dst, "short").unwrap();
        set_file_mtime(&src, at(-60)).unwrap();
        set_file_mtime(&dst, at(0)).unwrap();
        assert_eq!(
            needs_metadata(&src, &dst, false).unwrap(),
            Staleness::SizeChanged
        );
    }

    #[test]
    fn metadata_missing_source_is_an_error_when_dest_exists() {
        let tmp = TempDir::new().unwrap();
        let dst = tmp.path().join("dst.nfo");
        fs::write(&dst, "x").unwrap();
        let err = needs_metadata(&tmp.path().join("gone.nfo"), &dst, false).unwrap_err();
        assert_eq!(err.io_source().map(|e| e.kind()), Some(ErrorKind::NotFound));
    }
}
