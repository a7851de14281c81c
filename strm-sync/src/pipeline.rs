//! Shared full-pass entrypoint used by the CLI and the daemon scheduler.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use strm_core::{Config, MappingId};

use crate::reconcile::{FullReconciler, PassPlan, ReconcileReport};
use crate::SyncError;

/// Which mappings a pass covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncScope {
    /// Every configured mapping, in configuration order.
    All,
    /// One mapping by index.
    Mapping(MappingId),
}

impl SyncScope {
    /// Mapping ids the scope resolves to against `config`.
    pub fn resolve(self, config: &Config) -> Result<Vec<MappingId>, SyncError> {
        match self {
            SyncScope::All => Ok((0..config.mappings.len()).map(MappingId).collect()),
            SyncScope::Mapping(id) if config.mapping(id).is_some() => Ok(vec![id]),
            SyncScope::Mapping(id) => Err(SyncError::UnknownMapping(id)),
        }
    }
}

/// Run full passes for every mapping in `scope`, one after another.
///
/// Stops early (returning the reports gathered so far) when `cancel` fires.
pub fn run(
    config: Arc<Config>,
    scope: SyncScope,
    cancel: &CancellationToken,
) -> Result<Vec<ReconcileReport>, SyncError> {
    let ids = scope.resolve(&config)?;
    let mut reports = Vec::with_capacity(ids.len());
    for id in ids {
        if cancel.is_cancelled() {
            break;
        }
        reports.push(FullReconciler::new(Arc::clone(&config), id)?.run(cancel));
    }
    Ok(reports)
}

/// Read-only previews for every mapping in `scope`.
pub fn plan(config: Arc<Config>, scope: SyncScope) -> Result<Vec<PassPlan>, SyncError> {
    scope
        .resolve(&config)?
        .into_iter()
        .map(|id| FullReconciler::new(Arc::clone(&config), id)?.plan())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::fixtures::{write, Fixture};

    #[test]
    fn unknown_mapping_scope_is_an_error() {
        let fx = Fixture::new();
        let err = run(fx.shared(), SyncScope::Mapping(MappingId(9)), &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, SyncError::UnknownMapping(MappingId(9))));
    }

    #[test]
    fn run_all_returns_one_report_per_mapping() {
        let mut fx = Fixture::new();
        let mut second = fx.config.mappings[0].clone();
        second.id = MappingId(1);
        second.source_roots = vec![fx.tmp.path().join("src2")];
        second.dest_root = fx.tmp.path().join("dst2");
        fx.config.mappings.push(second);
        write(&fx.src("a.mp4"), b"v");
        write(&fx.tmp.path().join("src2/b.mp4"), b"v");

        let reports = run(fx.shared(), SyncScope::All, &CancellationToken::new()).expect("run");
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[1].mapping, 1);
        assert!(fx.tmp.path().join("dst2/b.strm").exists());
        assert!(!fx.tmp.path().join("dst2/a.strm").exists());
    }

    #[test]
    fn cancelled_run_produces_no_reports() {
        let fx = Fixture::new();
        let token = CancellationToken::new();
        token.cancel();
        let reports = run(fx.shared(), SyncScope::All, &token).expect("run");
        assert!(reports.is_empty());
    }

    #[test]
    fn plan_for_single_mapping() {
        let fx = Fixture::new();
        write(&fx.src("a.mp4"), b"v");
        let plans = plan(fx.shared(), SyncScope::Mapping(MappingId(0))).expect("plan");
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].generate, vec![fx.dst("a.strm")]);
    }
}
