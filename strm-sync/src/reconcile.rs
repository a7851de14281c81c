//! Full-tree reconciliation of one mapping.
//!
//! ## Pass order
//!
//! 1. Reverse metadata sync (`sync_metadata_to_source`): destination sidecars
//!    that are newer, differently sized, or missing at the source are copied
//!    back before anything can delete them.
//! 2. Generation (`full_generate`): every qualifying source file gets its
//!    pointer or metadata artifact if missing or stale.
//! 3. Orphan removal (`sync_source_dest`): destination files with no source
//!    counterpart are deleted, then destination directories that are empty
//!    and have no source counterpart.
//! 4. Empty-directory collapse (`cleanup_empty_dirs`).
//!
//! The pass is not transactional. Whatever was written before a failure
//! stays written; the next pass or incremental event converges the rest.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Local};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use strm_core::{Config, EntryKind, MappingId, MonitoredMapping, SyncPolicy};

use crate::error::{io_err, SyncError};
use crate::executor::{ResilientExecutor, RetryPolicy, UnitOutcome};
use crate::mapper::PathMapper;
use crate::staleness::{needs_metadata, needs_pointer};
use crate::tree::{self, Listing};
use crate::writer::{self, FileAction};

// ---------------------------------------------------------------------------
// Reports and plans
// ---------------------------------------------------------------------------

/// Destination entries a pass would remove. Computed fresh every pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationDiff {
    /// Orphaned destination files.
    pub files: BTreeSet<PathBuf>,
    /// Destination directories with no source counterpart that will be empty
    /// once `files` are gone.
    pub dirs: BTreeSet<PathBuf>,
}

impl ReconciliationDiff {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.dirs.is_empty()
    }
}

/// Read-only preview of a pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PassPlan {
    pub mapping: usize,
    /// Destination artifacts generation would write.
    pub generate: Vec<PathBuf>,
    /// Source sidecars reverse metadata sync would overwrite.
    pub reverse: Vec<PathBuf>,
    /// Orphans removal would delete. Empty when removal is disabled or a
    /// source root is unavailable.
    pub diff: ReconciliationDiff,
}

/// Summary of one completed (or cancelled) pass.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub mapping: usize,
    pub started_at: DateTime<Local>,
    pub duration_ms: u64,
    pub pointers_written: usize,
    pub metadata_copied: usize,
    pub reverse_copied: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub files_removed: usize,
    pub dirs_removed: usize,
    /// Roots abandoned for this pass after an enumeration failure.
    pub aborted_roots: Vec<PathBuf>,
    pub missing_roots: Vec<PathBuf>,
    pub cancelled: bool,
}

impl ReconcileReport {
    fn start(mapping: MappingId) -> Self {
        Self {
            mapping: mapping.0,
            started_at: Local::now(),
            duration_ms: 0,
            pointers_written: 0,
            metadata_copied: 0,
            reverse_copied: 0,
            unchanged: 0,
            skipped: 0,
            files_removed: 0,
            dirs_removed: 0,
            aborted_roots: Vec::new(),
            missing_roots: Vec::new(),
            cancelled: false,
        }
    }

    /// Destination or source entries this pass created, replaced or removed.
    pub fn mutations(&self) -> usize {
        self.pointers_written
            + self.metadata_copied
            + self.reverse_copied
            + self.files_removed
            + self.dirs_removed
    }

    fn record(&mut self, action: &FileAction) {
        match action {
            FileAction::Pointer(result) if result.is_written() => self.pointers_written += 1,
            FileAction::Metadata(result) if result.is_written() => self.metadata_copied += 1,
            FileAction::Pointer(_) | FileAction::Metadata(_) => self.unchanged += 1,
            FileAction::Ignored => {}
        }
    }
}

// ---------------------------------------------------------------------------
// FullReconciler
// ---------------------------------------------------------------------------

pub struct FullReconciler {
    config: Arc<Config>,
    id: MappingId,
}

impl FullReconciler {
    pub fn new(config: Arc<Config>, id: MappingId) -> Result<Self, SyncError> {
        if config.mapping(id).is_none() {
            return Err(SyncError::UnknownMapping(id));
        }
        Ok(Self { config, id })
    }

    fn mapping(&self) -> &MonitoredMapping {
        &self.config.mappings[self.id.0]
    }

    fn policy(&self) -> &SyncPolicy {
        &self.config.policy
    }

    fn mapper(&self) -> PathMapper<'_> {
        PathMapper::new(self.mapping(), &self.policy().pointer_extension)
    }

    /// Run a complete pass. Cancellation ends it after the current unit.
    pub fn run(&self, cancel: &CancellationToken) -> ReconcileReport {
        let exec = ResilientExecutor::from_policy(self.policy(), cancel.clone());
        self.run_with(&exec)
    }

    /// Run a complete pass with a caller-supplied executor.
    pub fn run_with(&self, exec: &ResilientExecutor) -> ReconcileReport {
        let started = Instant::now();
        let mut report = ReconcileReport::start(self.id);
        let policy = self.policy();
        let mapping = self.mapping();
        tracing::info!(mapping = %self.id, dest = %mapping.dest_root.display(), "full pass started");

        if policy.sync_metadata_to_source && mapping.copy_metadata {
            self.reverse_sync(exec, &mut report);
        }
        if policy.full_generate && !exec.is_cancelled() {
            self.generate(exec, &mut report);
        }
        if policy.sync_source_dest && !exec.is_cancelled() {
            match self.plan_orphans(exec) {
                Some(diff) => self.remove_orphans(exec, &diff, &mut report),
                None => tracing::warn!(
                    mapping = %self.id,
                    "source root unavailable, orphan removal skipped this pass",
                ),
            }
        }
        if policy.cleanup_empty_dirs && !exec.is_cancelled() {
            report.dirs_removed += tree::collapse_empty(&mapping.dest_root);
        }

        report.cancelled = exec.is_cancelled();
        report.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::info!(
            mapping = %self.id,
            pointers = report.pointers_written,
            metadata = report.metadata_copied,
            reverse = report.reverse_copied,
            removed_files = report.files_removed,
            removed_dirs = report.dirs_removed,
            skipped = report.skipped,
            cancelled = report.cancelled,
            duration_ms = report.duration_ms,
            "full pass finished",
        );
        report
    }

    // -- generation ---------------------------------------------------------

    fn generate(&self, exec: &ResilientExecutor, report: &mut ReconcileReport) {
        let mapper = self.mapper();
        let policy = self.policy();
        for root in &self.mapping().source_roots {
            let Some(listing) = self.list_source_root(exec, root, report) else {
                continue;
            };
            for rel in &listing.files {
                if exec.is_cancelled() {
                    return;
                }
                if !qualifies(self.mapping(), mapper.classify(rel)) {
                    continue;
                }
                let source = root.join(rel);
                match exec.run(&source, || writer::sync_source_file(&mapper, policy, &source, rel)) {
                    UnitOutcome::Done(action) => report.record(&action),
                    UnitOutcome::Skipped => report.skipped += 1,
                    UnitOutcome::Cancelled => return,
                }
            }
        }
    }

    /// Enumerate one source root, recording missing or aborted roots.
    fn list_source_root(
        &self,
        exec: &ResilientExecutor,
        root: &Path,
        report: &mut ReconcileReport,
    ) -> Option<Listing> {
        let stop = self.policy().stop_on_mount_loss;
        let Some(listing) = exec.enumerate(root, stop, || tree::walk(root, exec.policy())) else {
            if !exec.is_cancelled() {
                report.aborted_roots.push(root.to_path_buf());
            }
            return None;
        };
        if listing.root_missing {
            tracing::warn!(root = %root.display(), "source root does not exist");
            report.missing_roots.push(root.to_path_buf());
            return None;
        }
        Some(listing)
    }

    // -- reverse metadata sync ---------------------------------------------

    fn reverse_sync(&self, exec: &ResilientExecutor, report: &mut ReconcileReport) {
        let mapping = self.mapping();
        let roots: Vec<&PathBuf> = mapping.source_roots.iter().filter(|r| r.is_dir()).collect();
        if roots.is_empty() {
            tracing::warn!(mapping = %self.id, "no source root reachable, reverse sync skipped");
            return;
        }
        let stop = self.policy().stop_on_mount_loss;
        let dest = &mapping.dest_root;
        let Some(listing) = exec.enumerate(dest, stop, || tree::walk(dest, exec.policy())) else {
            return;
        };

        for rel in &listing.files {
            if exec.is_cancelled() {
                return;
            }
            if mapping.classify(rel) != EntryKind::Metadata {
                continue;
            }
            let staged = dest.join(rel);
            let target = reverse_target(&roots, rel);
            let outcome = exec.run_unthrottled(&staged, || {
                if needs_metadata(&staged, &target, false)?.needs_write() {
                    writer::copy_metadata(&staged, &target).map(|_| true)
                } else {
                    Ok(false)
                }
            });
            match outcome {
                UnitOutcome::Done(true) => report.reverse_copied += 1,
                UnitOutcome::Done(false) => {}
                UnitOutcome::Skipped => report.skipped += 1,
                UnitOutcome::Cancelled => return,
            }
        }
    }

    // -- orphan removal -----------------------------------------------------

    /// Compute the orphan diff from fresh listings of every source root and
    /// the destination. `None` when a source root could not be trusted.
    fn plan_orphans(&self, exec: &ResilientExecutor) -> Option<ReconciliationDiff> {
        let mapping = self.mapping();
        let stop = self.policy().stop_on_mount_loss;
        let mut sources = Vec::with_capacity(mapping.source_roots.len());
        for root in &mapping.source_roots {
            let listing = exec.enumerate(root, stop, || tree::walk(root, exec.policy()))?;
            if listing.root_missing && stop {
                tracing::warn!(root = %root.display(), "source root missing, treating as unmounted");
                return None;
            }
            sources.push(listing);
        }
        let dest = &mapping.dest_root;
        let dest_listing = exec.enumerate(dest, stop, || tree::walk(dest, exec.policy()))?;
        Some(compute_diff(&self.mapper(), self.policy(), &sources, &dest_listing))
    }

    fn remove_orphans(
        &self,
        exec: &ResilientExecutor,
        diff: &ReconciliationDiff,
        report: &mut ReconcileReport,
    ) {
        let dest = &self.mapping().dest_root;
        for rel in &diff.files {
            if exec.is_cancelled() {
                return;
            }
            let path = dest.join(rel);
            match exec.run_unthrottled(&path, || remove_file_if_present(&path)) {
                UnitOutcome::Done(true) => {
                    tracing::info!(path = %path.display(), "removed orphan");
                    report.files_removed += 1;
                }
                UnitOutcome::Done(false) => {}
                UnitOutcome::Skipped => report.skipped += 1,
                UnitOutcome::Cancelled => return,
            }
        }
        // Reverse order visits children before their parents.
        for rel in diff.dirs.iter().rev() {
            if exec.is_cancelled() {
                return;
            }
            let path = dest.join(rel);
            match exec.run_unthrottled(&path, || tree::remove_if_empty(&path)) {
                UnitOutcome::Done(true) => report.dirs_removed += 1,
                UnitOutcome::Done(false) => {}
                UnitOutcome::Skipped => report.skipped += 1,
                UnitOutcome::Cancelled => return,
            }
        }
    }

    // -- read-only preview --------------------------------------------------

    /// What a pass would do right now, without mutating anything.
    ///
    /// Unreadable files are logged and left out of the plan.
    pub fn plan(&self) -> Result<PassPlan, SyncError> {
        let mapping = self.mapping();
        let policy = self.policy();
        let mapper = self.mapper();
        let retry = &RetryPolicy::new(policy.retry_backoff);
        let mut plan = PassPlan {
            mapping: self.id.0,
            ..PassPlan::default()
        };

        let mut sources = Vec::with_capacity(mapping.source_roots.len());
        let mut trusted = true;
        for root in &mapping.source_roots {
            let listing = tree::walk(root, retry)?;
            trusted &= !(listing.root_missing && policy.stop_on_mount_loss);
            sources.push(listing);
        }
        let dest_listing = tree::walk(&mapping.dest_root, retry)?;

        if policy.sync_metadata_to_source && mapping.copy_metadata {
            let roots: Vec<&PathBuf> = mapping.source_roots.iter().filter(|r| r.is_dir()).collect();
            if !roots.is_empty() {
                for rel in &dest_listing.files {
                    if mapping.classify(rel) != EntryKind::Metadata {
                        continue;
                    }
                    let target = reverse_target(&roots, rel);
                    match needs_metadata(&mapping.dest_root.join(rel), &target, false) {
                        Ok(staleness) if staleness.needs_write() => plan.reverse.push(target),
                        Ok(_) => {}
                        Err(err) => tracing::warn!(error = %err, "left out of plan"),
                    }
                }
            }
        }

        if policy.full_generate {
            for (root, listing) in mapping.source_roots.iter().zip(&sources) {
                for rel in &listing.files {
                    let decision = match mapper.classify(rel) {
                        EntryKind::Video if mapping.create_pointers => {
                            let dest = mapper.pointer_path(rel);
                            needs_pointer(&dest, policy.overwrite_existing).map(|s| (dest, s))
                        }
                        EntryKind::Metadata if mapping.copy_metadata => {
                            let dest = mapper.dest_path(rel);
                            needs_metadata(&root.join(rel), &dest, policy.overwrite_existing)
                                .map(|s| (dest, s))
                        }
                        _ => continue,
                    };
                    match decision {
                        Ok((dest, staleness)) if staleness.needs_write() => plan.generate.push(dest),
                        Ok(_) => {}
                        Err(err) => tracing::warn!(error = %err, "left out of plan"),
                    }
                }
            }
            plan.generate.sort();
            plan.generate.dedup();
        }

        if policy.sync_source_dest && trusted {
            plan.diff = compute_diff(&mapper, policy, &sources, &dest_listing);
        }
        Ok(plan)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn qualifies(mapping: &MonitoredMapping, kind: EntryKind) -> bool {
    match kind {
        EntryKind::Video => mapping.create_pointers,
        EntryKind::Metadata => mapping.copy_metadata,
        EntryKind::Other => false,
    }
}

/// Orphan files and removable directories of `dest` given the source listings.
pub fn compute_diff(
    mapper: &PathMapper<'_>,
    policy: &SyncPolicy,
    sources: &[Listing],
    dest: &Listing,
) -> ReconciliationDiff {
    let mapping = mapper.mapping();
    let mut valid_files = BTreeSet::new();
    let mut valid_dirs = BTreeSet::new();
    for listing in sources {
        valid_files.extend(listing.files.iter().map(|rel| mapper.valid_dest_rel(rel)));
        valid_dirs.extend(listing.dirs.iter().cloned());
    }

    let mut diff = ReconciliationDiff::default();
    // Directories that still hold something after removal.
    let mut occupied: BTreeSet<&Path> = BTreeSet::new();
    for rel in &dest.files {
        if writer::is_tmp_file(rel) {
            occupied.extend(rel.ancestors().skip(1));
            continue;
        }
        let orphan = !valid_files.contains(rel)
            && !(policy.preserve_extra_metadata && mapping.metadata_extensions.matches(rel));
        if orphan {
            diff.files.insert(rel.clone());
        } else {
            occupied.extend(rel.ancestors().skip(1));
        }
    }
    for rel in &dest.dirs {
        if valid_dirs.contains(rel) {
            occupied.extend(rel.ancestors());
        }
    }
    for rel in &dest.dirs {
        if !valid_dirs.contains(rel) && !occupied.contains(rel.as_path()) {
            diff.dirs.insert(rel.clone());
        }
    }
    diff
}

/// Where a staged destination sidecar goes back to: the existing counterpart
/// in any root, else the first root whose parent directory exists, else the
/// first root.
fn reverse_target(roots: &[&PathBuf], rel: &Path) -> PathBuf {
    let candidates: Vec<PathBuf> = roots.iter().map(|root| root.join(rel)).collect();
    candidates
        .iter()
        .find(|c| c.exists())
        .or_else(|| candidates.iter().find(|c| c.parent().map(Path::is_dir).unwrap_or(false)))
        .or_else(|| candidates.first())
        .cloned()
        .unwrap_or_else(|| rel.to_path_buf())
}

pub(crate) fn remove_file_if_present(path: &Path) -> Result<bool, SyncError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(io_err(path, err)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
