pub mod check;
pub mod diff;
pub mod reconcile;
pub mod run;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use strm_core::{config, Config, MappingId};
use strm_sync::SyncScope;

pub(crate) fn load_config(path: &Path) -> Result<Arc<Config>> {
    let config = config::load(path)
        .with_context(|| format!("failed to load config {}", path.display()))?;
    Ok(Arc::new(config))
}

pub(crate) fn scope(mapping: Option<usize>) -> SyncScope {
    match mapping {
        Some(index) => SyncScope::Mapping(MappingId(index)),
        None => SyncScope::All,
    }
}
