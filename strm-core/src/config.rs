//! YAML configuration loading.
//!
//! # File layout
//!
//! ```text
//! sync:
//!   real_time_monitor: true
//!   cron_full_process: { enable: true, cron_expression: "0 3 * * *" }
//!   monitor_confs:
//!     - source_dir: /mnt/media
//!       dest_dir: /strm
//!       library_dir: /media
//!       video_extensions: [.mp4]
//!       metadata_extensions: [.nfo]
//!       create_strm: true
//!       copy_metadata: true
//! ```
//!
//! # API pattern
//!
//! - `load_at(path, base)`: explicit base directory for relative roots; used in tests
//! - `load(path)`: resolves relative roots against the process working directory
//!
//! Required keys have no default: a missing one is a [`ConfigError::Parse`].
//! Optional keys take their defaults from [`SyncPolicy::default`].

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{invalid, ConfigError};
use crate::types::{
    normalize_extension, Config, CronSettings, ExtensionSet, MappingId, MonitoredMapping,
    SyncPolicy,
};

/// Environment variable consulted by the CLI before [`default_config_path`].
pub const CONFIG_ENV: &str = "STRM_MIRROR_CONFIG";

// ---------------------------------------------------------------------------
// 1. Raw schema
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ConfigDocument {
    sync: RawSync,
}

#[derive(Debug, Deserialize)]
struct RawSync {
    real_time_monitor: bool,
    #[serde(default)]
    run_full_task_on_startup: bool,
    cron_full_process: RawCron,
    #[serde(default = "defaults::full_generate")]
    full_generate: bool,
    #[serde(default = "defaults::overwrite_existing")]
    overwrite_existing: bool,
    #[serde(default = "defaults::sync_source_dest")]
    sync_source_dest: bool,
    #[serde(default = "defaults::cleanup_empty_dirs")]
    cleanup_empty_dirs: bool,
    #[serde(default = "defaults::preserve_extra_metadata")]
    preserve_extra_metadata: bool,
    #[serde(default = "defaults::sync_metadata_to_source")]
    sync_metadata_to_source: bool,
    #[serde(default = "defaults::stop_on_mount_loss")]
    stop_on_mount_loss: bool,
    #[serde(default = "defaults::retry_backoff_secs")]
    retry_backoff_secs: u64,
    #[serde(default = "defaults::pointer_extension")]
    pointer_extension: String,
    #[serde(default)]
    log_dir: Option<PathBuf>,
    monitor_confs: Vec<RawMapping>,
}

#[derive(Debug, Deserialize)]
struct RawCron {
    enable: bool,
    cron_expression: String,
    #[serde(default)]
    files_per_second_limit: u32,
}

#[derive(Debug, Deserialize)]
struct RawMapping {
    source_dir: OneOrMany,
    dest_dir: PathBuf,
    library_dir: PathBuf,
    video_extensions: Vec<String>,
    metadata_extensions: Vec<String>,
    create_strm: bool,
    copy_metadata: bool,
}

/// `source_dir` accepts a single path or a list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(PathBuf),
    Many(Vec<PathBuf>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<PathBuf> {
        match self {
            OneOrMany::One(path) => vec![path],
            OneOrMany::Many(paths) => paths,
        }
    }
}

mod defaults {
    use crate::types::SyncPolicy;

    pub(super) fn full_generate() -> bool {
        SyncPolicy::default().full_generate
    }
    pub(super) fn overwrite_existing() -> bool {
        SyncPolicy::default().overwrite_existing
    }
    pub(super) fn sync_source_dest() -> bool {
        SyncPolicy::default().sync_source_dest
    }
    pub(super) fn cleanup_empty_dirs() -> bool {
        SyncPolicy::default().cleanup_empty_dirs
    }
    pub(super) fn preserve_extra_metadata() -> bool {
        SyncPolicy::default().preserve_extra_metadata
    }
    pub(super) fn sync_metadata_to_source() -> bool {
        SyncPolicy::default().sync_metadata_to_source
    }
    pub(super) fn stop_on_mount_loss() -> bool {
        SyncPolicy::default().stop_on_mount_loss
    }
    pub(super) fn retry_backoff_secs() -> u64 {
        SyncPolicy::default().retry_backoff.as_secs()
    }
    pub(super) fn pointer_extension() -> String {
        SyncPolicy::default().pointer_extension
    }
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

/// `<config_dir>/strm-mirror/config.yaml`.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let dir = dirs::config_dir().ok_or(ConfigError::ConfigDirNotFound)?;
    Ok(dir.join("strm-mirror").join("config.yaml"))
}

/// Load and validate the config at `path`, resolving relative roots against `base`.
pub fn load_at(path: &Path, base: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    from_yaml_str(&contents, path, base)
}

/// `load_at` with the process working directory as base.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|source| ConfigError::Io {
        path: PathBuf::from("."),
        source,
    })?;
    load_at(path, &cwd)
}

/// Parse and validate an in-memory document. `origin` is only used in errors.
pub fn from_yaml_str(contents: &str, origin: &Path, base: &Path) -> Result<Config, ConfigError> {
    let document: ConfigDocument =
        serde_yaml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
    build(document.sync, origin, base)
}

// ---------------------------------------------------------------------------
// 3. Normalize + validate
// ---------------------------------------------------------------------------

fn build(raw: RawSync, origin: &Path, base: &Path) -> Result<Config, ConfigError> {
    if raw.monitor_confs.is_empty() {
        return Err(invalid(origin, "monitor_confs must contain at least one mapping"));
    }
    if raw.cron_full_process.enable && raw.cron_full_process.cron_expression.trim().is_empty() {
        return Err(invalid(
            origin,
            "cron_full_process.cron_expression is empty but cron is enabled",
        ));
    }

    let pointer_extension = normalize_extension(&raw.pointer_extension)
        .ok_or_else(|| invalid(origin, "pointer_extension must not be empty"))?;

    let throttle = match raw.cron_full_process.files_per_second_limit {
        0 => Duration::ZERO,
        limit => Duration::from_secs(1) / limit,
    };

    let policy = SyncPolicy {
        full_generate: raw.full_generate,
        overwrite_existing: raw.overwrite_existing,
        sync_source_dest: raw.sync_source_dest,
        cleanup_empty_dirs: raw.cleanup_empty_dirs,
        preserve_extra_metadata: raw.preserve_extra_metadata,
        sync_metadata_to_source: raw.sync_metadata_to_source,
        stop_on_mount_loss: raw.stop_on_mount_loss,
        throttle,
        retry_backoff: Duration::from_secs(raw.retry_backoff_secs),
        pointer_extension,
    };

    let mut mappings = Vec::with_capacity(raw.monitor_confs.len());
    for (idx, conf) in raw.monitor_confs.into_iter().enumerate() {
        mappings.push(build_mapping(MappingId(idx), conf, origin, base)?);
    }
    check_overlaps(&mappings, origin)?;

    Ok(Config {
        real_time_monitor: raw.real_time_monitor,
        run_full_task_on_startup: raw.run_full_task_on_startup,
        cron: CronSettings {
            enable: raw.cron_full_process.enable,
            expression: raw.cron_full_process.cron_expression.trim().to_string(),
        },
        policy,
        log_dir: raw.log_dir.map(|dir| normalize_root(&dir, base)),
        mappings,
    })
}

fn build_mapping(
    id: MappingId,
    raw: RawMapping,
    origin: &Path,
    base: &Path,
) -> Result<MonitoredMapping, ConfigError> {
    let sources = raw.source_dir.into_vec();
    if sources.is_empty() {
        return Err(invalid(origin, format!("{id}: source_dir must not be empty")));
    }
    for (key, path) in sources
        .iter()
        .map(|p| ("source_dir", p))
        .chain([("dest_dir", &raw.dest_dir), ("library_dir", &raw.library_dir)])
    {
        if path.as_os_str().is_empty() {
            return Err(invalid(origin, format!("{id}: {key} must not be empty")));
        }
    }

    let mut source_roots: Vec<PathBuf> = Vec::with_capacity(sources.len());
    for source in &sources {
        let root = normalize_root(source, base);
        if !source_roots.contains(&root) {
            source_roots.push(root);
        }
    }
    let dest_root = normalize_root(&raw.dest_dir, base);

    if let Some(root) = source_roots.iter().find(|root| dest_root.starts_with(root)) {
        return Err(invalid(
            origin,
            format!(
                "{id}: dest_dir {} lies inside source_dir {}",
                dest_root.display(),
                root.display()
            ),
        ));
    }

    Ok(MonitoredMapping {
        id,
        source_roots,
        dest_root,
        library_root: normalize_root(&raw.library_dir, base),
        video_extensions: ExtensionSet::new(&raw.video_extensions),
        metadata_extensions: ExtensionSet::new(&raw.metadata_extensions),
        create_pointers: raw.create_strm,
        copy_metadata: raw.copy_metadata,
    })
}

/// Destination subtrees of distinct mappings must be disjoint.
fn check_overlaps(mappings: &[MonitoredMapping], origin: &Path) -> Result<(), ConfigError> {
    for (i, a) in mappings.iter().enumerate() {
        for b in &mappings[i + 1..] {
            if a.dest_root.starts_with(&b.dest_root) || b.dest_root.starts_with(&a.dest_root) {
                return Err(invalid(
                    origin,
                    format!(
                        "{} dest_dir {} overlaps {} dest_dir {}",
                        a.id,
                        a.dest_root.display(),
                        b.id,
                        b.dest_root.display()
                    ),
                ));
            }
        }
    }
    Ok(())
}

/// Absolute, lexically normalized form of `path` (no `.`/`..`, no trailing
/// separator). Symlinks are not resolved.
pub fn normalize_root(path: &Path, base: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };
    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(segment) => out.push(segment),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
