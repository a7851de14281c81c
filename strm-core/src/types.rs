//! Domain types for a validated strm-mirror configuration.
//!
//! All path fields use `PathBuf` and are already normalized (absolute, no `.`
//! or `..` components) by the time a value of these types exists. Values are
//! immutable after [`crate::config::load_at`] returns them.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Position of a mapping inside `monitor_confs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MappingId(pub usize);

impl fmt::Display for MappingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mapping[{}]", self.0)
    }
}

/// A set of file extensions, stored as `.ext` in ASCII lowercase.
///
/// Matching is case-insensitive; only the final extension of a file name is
/// considered (`a.b.MKV` matches `.mkv`).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExtensionSet(Vec<String>);

impl ExtensionSet {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = extensions
            .into_iter()
            .filter_map(|ext| normalize_extension(ext.as_ref()))
            .collect();
        normalized.sort();
        normalized.dedup();
        Self(normalized)
    }

    /// True when the final extension of `path` is in the set.
    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.contains(ext))
            .unwrap_or(false)
    }

    /// True when `ext` (with or without a leading dot, any case) is in the set.
    pub fn contains(&self, ext: &str) -> bool {
        match normalize_extension(ext) {
            Some(ext) => self.0.binary_search(&ext).is_ok(),
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// `"MKV"` → `".mkv"`, `".Nfo"` → `".nfo"`; blank input yields `None`.
pub fn normalize_extension(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_start_matches('.');
    if trimmed.is_empty() {
        return None;
    }
    Some(format!(".{}", trimmed.to_ascii_lowercase()))
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// How a source file participates in a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Projected into a pointer artifact.
    Video,
    /// Mirrored byte-for-byte.
    Metadata,
    /// Ignored by generation.
    Other,
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// One configured source → destination projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoredMapping {
    pub id: MappingId,
    /// Scanned roots, in configuration order. Never empty.
    pub source_roots: Vec<PathBuf>,
    pub dest_root: PathBuf,
    /// Path basis written inside pointer files.
    pub library_root: PathBuf,
    pub video_extensions: ExtensionSet,
    pub metadata_extensions: ExtensionSet,
    pub create_pointers: bool,
    pub copy_metadata: bool,
}

impl MonitoredMapping {
    /// Video wins when an extension appears in both sets.
    pub fn classify(&self, path: &Path) -> EntryKind {
        if self.video_extensions.matches(path) {
            EntryKind::Video
        } else if self.metadata_extensions.matches(path) {
            EntryKind::Metadata
        } else {
            EntryKind::Other
        }
    }
}

/// Pass-wide behaviour flags shared by every mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPolicy {
    pub full_generate: bool,
    pub overwrite_existing: bool,
    pub sync_source_dest: bool,
    pub cleanup_empty_dirs: bool,
    pub preserve_extra_metadata: bool,
    pub sync_metadata_to_source: bool,
    pub stop_on_mount_loss: bool,
    /// Sleep after each processed file; zero means unthrottled.
    pub throttle: Duration,
    /// Wait between retries of a unit hit by a transient disconnect.
    pub retry_backoff: Duration,
    /// Extension given to pointer artifacts, normalized like [`ExtensionSet`].
    pub pointer_extension: String,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            full_generate: true,
            overwrite_existing: false,
            sync_source_dest: true,
            cleanup_empty_dirs: true,
            preserve_extra_metadata: false,
            sync_metadata_to_source: false,
            stop_on_mount_loss: true,
            throttle: Duration::ZERO,
            retry_backoff: Duration::from_secs(10),
            pointer_extension: ".strm".to_string(),
        }
    }
}

/// Periodic full-pass trigger settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSettings {
    pub enable: bool,
    pub expression: String,
}

/// Fully validated configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub real_time_monitor: bool,
    pub run_full_task_on_startup: bool,
    pub cron: CronSettings,
    pub policy: SyncPolicy,
    /// Directory for the rotating log file; `None` logs to stdout only.
    pub log_dir: Option<PathBuf>,
    pub mappings: Vec<MonitoredMapping>,
}

impl Config {
    pub fn mapping(&self, id: MappingId) -> Option<&MonitoredMapping> {
        self.mappings.get(id.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("mp4", Some(".mp4"))]
    #[case(".MKV", Some(".mkv"))]
    #[case("  .Nfo ", Some(".nfo"))]
    #[case("", None)]
    #[case(".", None)]
    fn extension_normalization(#[case] raw: &str, #[case] expected: Option<&str>) {
        assert_eq!(normalize_extension(raw).as_deref(), expected);
    }

    #[test]
    fn extension_matching_is_case_insensitive() {
        let set = ExtensionSet::new([".mp4", "mkv"]);
        assert!(set.matches(Path::new("/src/show/E1.MP4")));
        assert!(set.matches(Path::new("movie.Mkv")));
        assert!(!set.matches(Path::new("movie.nfo")));
        assert!(!set.matches(Path::new("README")));
    }

    #[test]
    fn extension_set_dedups() {
        let set = ExtensionSet::new([".mp4", "MP4", "mp4"]);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![".mp4"]);
    }

    #[test]
    fn classify_prefers_video() {
        let mapping = MonitoredMapping {
            id: MappingId(0),
            source_roots: vec![PathBuf::from("/src")],
            dest_root: PathBuf::from("/dst"),
            library_root: PathBuf::from("/src"),
            video_extensions: ExtensionSet::new([".mp4", ".ts"]),
            metadata_extensions: ExtensionSet::new([".nfo", ".ts"]),
            create_pointers: true,
            copy_metadata: true,
        };
        assert_eq!(mapping.classify(Path::new("a.ts")), EntryKind::Video);
        assert_eq!(mapping.classify(Path::new("a.NFO")), EntryKind::Metadata);
        assert_eq!(mapping.classify(Path::new("a.txt")), EntryKind::Other);
    }

    #[test]
    fn mapping_id_display() {
        assert_eq!(MappingId(3).to_string(), "mapping[3]");
    }
}
