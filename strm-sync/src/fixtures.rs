//! Shared test fixtures: a temp directory laid out as `src/` + `dst/`.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use strm_core::{Config, CronSettings, ExtensionSet, MappingId, MonitoredMapping, SyncPolicy};
use tempfile::TempDir;

pub(crate) struct Fixture {
    pub tmp: TempDir,
    pub config: Config,
}

impl Fixture {
    /// One mapping, `src/` → `dst/`, library root equal to the source root,
    /// `.mp4` videos and `.nfo` metadata.
    pub fn new() -> Self {
        let tmp = TempDir::new().expect("tempdir");
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        fs::create_dir_all(&src).expect("src");
        let mapping = MonitoredMapping {
            id: MappingId(0),
            source_roots: vec![src.clone()],
            dest_root: dst,
            library_root: src,
            video_extensions: ExtensionSet::new([".mp4"]),
            metadata_extensions: ExtensionSet::new([".nfo"]),
            create_pointers: true,
            copy_metadata: true,
        };
        let config = Config {
            real_time_monitor: false,
            run_full_task_on_startup: false,
            cron: CronSettings {
                enable: false,
                expression: String::new(),
            },
            policy: SyncPolicy {
                retry_backoff: Duration::ZERO,
                ..SyncPolicy::default()
            },
            log_dir: None,
            mappings: vec![mapping],
        };
        Self { tmp, config }
    }

    pub fn policy_mut(&mut self) -> &mut SyncPolicy {
        &mut self.config.policy
    }

    pub fn mapping_mut(&mut self) -> &mut MonitoredMapping {
        &mut self.config.mappings[0]
    }

    pub fn shared(&self) -> Arc<Config> {
        Arc::new(self.config.clone())
    }

    pub fn src(&self, rel: &str) -> PathBuf {
        self.config.mappings[0].source_roots[0].join(rel)
    }

    pub fn dst(&self, rel: &str) -> PathBuf {
        self.config.mappings[0].dest_root.join(rel)
    }

    /// Add a second source root at `<tmp>/<name>`.
    pub fn add_root(&mut self, name: &str) -> PathBuf {
        let root = self.tmp.path().join(name);
        fs::create_dir_all(&root).expect("root");
        self.config.mappings[0].source_roots.push(root.clone());
        root
    }
}

pub(crate) fn write(path: &Path, contents: impl AsRef<[u8]>) {
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(path, contents).expect("write");
}
