//! Single-entry sync driven by change notifications.
//!
//! Events are hints, not facts: the watcher may repeat, reorder or drop them.
//! Every handler re-reads the source and destination before acting, so
//! applying the same event twice (or an event whose effect a full pass has
//! already produced) is a no-op.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use strm_core::{Config, EntryKind, MappingId, MonitoredMapping, SyncPolicy};

use crate::error::{io_err, SyncError};
use crate::executor::{ResilientExecutor, UnitOutcome};
use crate::mapper::{PathMapper, SourceEntry};
use crate::reconcile::remove_file_if_present;
use crate::staleness::stat_optional;
use crate::tree;
use crate::writer;

/// A change observed below one of a mapping's source roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    Created(PathBuf),
    Modified(PathBuf),
    Deleted(PathBuf),
    Moved { from: PathBuf, to: PathBuf },
}

/// What applying one event changed at the destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    /// Outside every root, not a qualifying file, or already in sync.
    Ignored,
    Synced { written: usize },
    Removed { removed: usize },
    Renamed { from: PathBuf, to: PathBuf },
    /// A non-transient error; logged by the executor.
    Skipped,
    Cancelled,
}

impl Applied {
    fn from_outcome(outcome: UnitOutcome<Applied>) -> Applied {
        match outcome {
            UnitOutcome::Done(applied) => applied,
            UnitOutcome::Skipped => Applied::Skipped,
            UnitOutcome::Cancelled => Applied::Cancelled,
        }
    }
}

pub struct IncrementalSync {
    config: Arc<Config>,
    id: MappingId,
    exec: ResilientExecutor,
}

impl IncrementalSync {
    pub fn new(config: Arc<Config>, id: MappingId, exec: ResilientExecutor) -> Result<Self, SyncError> {
        if config.mapping(id).is_none() {
            return Err(SyncError::UnknownMapping(id));
        }
        Ok(Self { config, id, exec })
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

    pub fn apply(&self, event: SourceEvent) -> Applied {
        tracing::debug!(mapping = %self.id, ?event, "applying");
        match event {
            SourceEvent::Created(path) | SourceEvent::Modified(path) => self.on_upsert(&path),
            SourceEvent::Deleted(path) => self.on_deleted(&path),
            SourceEvent::Moved { from, to } => self.on_moved(&from, &to),
        }
    }

    // -- created / modified -------------------------------------------------

    fn on_upsert(&self, path: &Path) -> Applied {
        let Some(entry) = self.mapper().locate(path) else {
            tracing::debug!(path = %path.display(), "outside watched roots");
            return Applied::Ignored;
        };
        let meta = match self.exec.run_unthrottled(path, || stat_optional(path)) {
            UnitOutcome::Done(Some(meta)) => meta,
            UnitOutcome::Done(None) => return self.remove_for(&entry),
            UnitOutcome::Skipped => return Applied::Skipped,
            UnitOutcome::Cancelled => return Applied::Cancelled,
        };
        if meta.is_dir() {
            self.mirror_directory(&entry, false)
        } else {
            self.sync_file(&entry, false)
        }
    }

    fn sync_file(&self, entry: &SourceEntry, refresh: bool) -> Applied {
        let mapper = self.mapper();
        if !qualifies(self.mapping(), mapper.classify(&entry.rel)) {
            return Applied::Ignored;
        }
        let source = entry.root.join(&entry.rel);
        Applied::from_outcome(self.exec.run_unthrottled(&source, || {
            self.write_file(&mapper, &source, &entry.rel, refresh)
                .map(|written| Applied::Synced { written })
        }))
    }

    fn write_file(
        &self,
        mapper: &PathMapper<'_>,
        source: &Path,
        rel: &Path,
        refresh: bool,
    ) -> Result<usize, SyncError> {
        if refresh && mapper.classify(rel) == EntryKind::Video && self.mapping().create_pointers {
            return writer::refresh_pointer(mapper, source, rel).map(|r| usize::from(r.is_written()));
        }
        writer::sync_source_file(mapper, self.policy(), source, rel)
            .map(|action| usize::from(action.is_written()))
    }

    /// Mirror a source directory and generate artifacts for everything below
    /// it. Directories moved in from outside a watched root arrive as one
    /// event with no events for their children.
    fn mirror_directory(&self, entry: &SourceEntry, refresh: bool) -> Applied {
        let mapper = self.mapper();
        let dir = entry.root.join(&entry.rel);
        let dest = mapper.dest_path(&entry.rel);
        let created = self.exec.run_unthrottled(&dest, || {
            std::fs::create_dir_all(&dest).map_err(|e| io_err(&dest, e))
        });
        match created {
            UnitOutcome::Done(()) => {}
            UnitOutcome::Skipped => return Applied::Skipped,
            UnitOutcome::Cancelled => return Applied::Cancelled,
        }

        let stop = self.policy().stop_on_mount_loss;
        let Some(listing) = self
            .exec
            .enumerate(&dir, stop, || tree::walk(&dir, self.exec.policy()))
        else {
            return Applied::Skipped;
        };

        for sub in &listing.dirs {
            let sub_dest = dest.join(sub);
            if let UnitOutcome::Cancelled = self.exec.run_unthrottled(&sub_dest, || {
                std::fs::create_dir_all(&sub_dest).map_err(|e| io_err(&sub_dest, e))
            }) {
                return Applied::Cancelled;
            }
        }

        let mut written = 0;
        for file in &listing.files {
            let rel = entry.rel.join(file);
            if !qualifies(self.mapping(), mapper.classify(&rel)) {
                continue;
            }
            let source = dir.join(file);
            match self
                .exec
                .run(&source, || self.write_file(&mapper, &source, &rel, refresh))
            {
                UnitOutcome::Done(n) => written += n,
                UnitOutcome::Skipped => {}
                UnitOutcome::Cancelled => return Applied::Cancelled,
            }
        }
        Applied::Synced { written }
    }

    // -- deleted ------------------------------------------------------------

    fn on_deleted(&self, path: &Path) -> Applied {
        let Some(entry) = self.mapper().locate(path) else {
            tracing::debug!(path = %path.display(), "outside watched roots");
            return Applied::Ignored;
        };
        match self.exec.run_unthrottled(path, || stat_optional(path)) {
            UnitOutcome::Done(Some(_)) => {
                tracing::debug!(path = %path.display(), "deleted path exists again");
                self.on_upsert(path)
            }
            UnitOutcome::Done(None) => self.remove_for(&entry),
            UnitOutcome::Skipped => Applied::Skipped,
            UnitOutcome::Cancelled => Applied::Cancelled,
        }
    }

    fn remove_for(&self, entry: &SourceEntry) -> Applied {
        if entry.is_root() {
            tracing::warn!(root = %entry.root.display(), "source root disappeared, leaving destination alone");
            return Applied::Ignored;
        }
        let label = entry.root.join(&entry.rel);
        Applied::from_outcome(self.exec.run_unthrottled(&label, || {
            self.remove_mapped(&entry.rel).map(|removed| {
                if removed == 0 {
                    Applied::Ignored
                } else {
                    Applied::Removed { removed }
                }
            })
        }))
    }

    /// Remove the destination entries for a source path that no longer exists.
    fn remove_mapped(&self, rel: &Path) -> Result<usize, SyncError> {
        let mapper = self.mapper();
        let policy = self.policy();
        let mapping = self.mapping();

        // Another root still provides the same path.
        for candidate in mapper.source_candidates(rel) {
            if stat_optional(&candidate)?.is_some() {
                tracing::debug!(path = %candidate.display(), "still provided by another root");
                return Ok(0);
            }
        }

        let mirrored = mapper.dest_path(rel);
        let mut removed = 0;
        let mut touched: Option<PathBuf> = None;
        match dest_file_type(&mirrored)? {
            Some(kind) if kind.is_dir() => {
                removed += remove_tree(&mirrored, policy.preserve_extra_metadata, mapping)?;
                // Preserved sidecars can keep the directory itself alive.
                touched = if mirrored.exists() {
                    Some(mirrored.clone())
                } else {
                    mirrored.parent().map(Path::to_path_buf)
                };
            }
            Some(_) => match mapper.classify(rel) {
                EntryKind::Metadata if policy.preserve_extra_metadata => {}
                _ => {
                    if remove_file_if_present(&mirrored)? {
                        tracing::info!(path = %mirrored.display(), "removed artifact");
                        removed += 1;
                        touched = mirrored.parent().map(Path::to_path_buf);
                    }
                }
            },
            None => {}
        }

        if mapper.classify(rel) == EntryKind::Video {
            let pointer = mapper.pointer_path(rel);
            if pointer != mirrored && !self.video_still_backs(rel)? && remove_file_if_present(&pointer)? {
                tracing::info!(path = %pointer.display(), "removed pointer");
                removed += 1;
                touched = pointer.parent().map(Path::to_path_buf);
            }
        }

        if policy.cleanup_empty_dirs {
            if let Some(start) = touched {
                removed += tree::collapse_upward(&start, &mapping.dest_root)?;
            }
        }
        Ok(removed)
    }

    /// True when some root still holds a video with the same stem as `rel`
    /// under any configured video extension, compared case-insensitively.
    fn video_still_backs(&self, rel: &Path) -> Result<bool, SyncError> {
        let mapping = self.mapping();
        let (Some(stem), parent) = (rel.file_stem(), rel.parent().unwrap_or(Path::new(""))) else {
            return Ok(false);
        };
        for root in &mapping.source_roots {
            let dir = root.join(parent);
            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(io_err(&dir, err)),
            };
            for dirent in entries {
                let dirent = dirent.map_err(|e| io_err(&dir, e))?;
                let name = PathBuf::from(dirent.file_name());
                if name.file_stem() == Some(stem) && mapping.video_extensions.matches(&name) {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    // -- moved --------------------------------------------------------------

    fn on_moved(&self, from: &Path, to: &Path) -> Applied {
        let mapper = self.mapper();
        let (old, new) = match (mapper.locate(from), mapper.locate(to)) {
            (None, None) => return Applied::Ignored,
            (None, Some(_)) => return self.on_upsert(to),
            (Some(_), None) => return self.on_deleted(from),
            (Some(old), Some(new)) => (old, new),
        };
        if old.is_root() || new.is_root() {
            return self.delete_then_create(from, to);
        }

        let meta = match self.exec.run_unthrottled(to, || stat_optional(to)) {
            UnitOutcome::Done(Some(meta)) => meta,
            UnitOutcome::Done(None) => return self.on_deleted(from),
            UnitOutcome::Skipped => return Applied::Skipped,
            UnitOutcome::Cancelled => return Applied::Cancelled,
        };

        if meta.is_dir() {
            self.move_directory(&old, &new, from, to)
        } else {
            self.move_file(&old, &new, from, to)
        }
    }

    fn move_directory(&self, old: &SourceEntry, new: &SourceEntry, from: &Path, to: &Path) -> Applied {
        let mapper = self.mapper();
        let old_dest = mapper.dest_path(&old.rel);
        let new_dest = mapper.dest_path(&new.rel);
        let renamed = self.exec.run_unthrottled(&old_dest, || {
            let movable = dest_file_type(&old_dest)?.map(|t| t.is_dir()).unwrap_or(false)
                && dest_file_type(&new_dest)?.is_none()
                && !new_dest.starts_with(&old_dest);
            if movable {
                self.rename_artifact(&old_dest, &new_dest)?;
            }
            Ok(movable)
        });
        match renamed {
            UnitOutcome::Done(true) => {}
            UnitOutcome::Done(false) => return self.delete_then_create(from, to),
            UnitOutcome::Skipped => return Applied::Skipped,
            UnitOutcome::Cancelled => return Applied::Cancelled,
        }

        // Pointer content embeds the source path, so everything moved needs rewriting.
        match self.mirror_directory(new, true) {
            Applied::Cancelled => Applied::Cancelled,
            _ => Applied::Renamed {
                from: old_dest,
                to: new_dest,
            },
        }
    }

    fn move_file(&self, old: &SourceEntry, new: &SourceEntry, from: &Path, to: &Path) -> Applied {
        let mapper = self.mapper();
        let mapping = self.mapping();
        let old_kind = mapper.classify(&old.rel);
        let new_kind = mapper.classify(&new.rel);
        if old_kind != new_kind || !qualifies(mapping, new_kind) {
            return self.delete_then_create(from, to);
        }
        let (Some(old_art), Some(new_art)) = (mapper.artifact_path(&old.rel), mapper.artifact_path(&new.rel))
        else {
            return self.delete_then_create(from, to);
        };
        if old_art == new_art {
            // Extension-only rename between video formats keeps the pointer path.
            return self.sync_file(new, true);
        }

        let renamed = self.exec.run_unthrottled(&old_art, || {
            let movable = dest_file_type(&old_art)?.map(|t| t.is_file()).unwrap_or(false)
                && !(old_kind == EntryKind::Video && self.video_still_backs(&old.rel)?);
            if movable {
                self.rename_artifact(&old_art, &new_art)?;
            }
            Ok(movable)
        });
        match renamed {
            UnitOutcome::Done(true) => {}
            UnitOutcome::Done(false) => return self.delete_then_create(from, to),
            UnitOutcome::Skipped => return Applied::Skipped,
            UnitOutcome::Cancelled => return Applied::Cancelled,
        }

        match self.sync_file(new, true) {
            Applied::Cancelled => Applied::Cancelled,
            _ => Applied::Renamed {
                from: old_art,
                to: new_art,
            },
        }
    }

    fn rename_artifact(&self, from: &Path, to: &Path) -> Result<(), SyncError> {
        if let Some(parent) = to.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        std::fs::rename(from, to).map_err(|e| io_err(from, e))?;
        tracing::info!(from = %from.display(), to = %to.display(), "renamed artifact");
        if self.policy().cleanup_empty_dirs {
            if let Some(parent) = from.parent() {
                tree::collapse_upward(parent, &self.mapping().dest_root)?;
            }
        }
        Ok(())
    }

    fn delete_then_create(&self, from: &Path, to: &Path) -> Applied {
        let removed = self.on_deleted(from);
        if removed == Applied::Cancelled {
            return removed;
        }
        match self.on_upsert(to) {
            Applied::Ignored => removed,
            created => created,
        }
    }
}

fn qualifies(mapping: &MonitoredMapping, kind: EntryKind) -> bool {
    match kind {
        EntryKind::Video => mapping.create_pointers,
        EntryKind::Metadata => mapping.copy_metadata,
        EntryKind::Other => false,
    }
}

fn dest_file_type(path: &Path) -> Result<Option<std::fs::FileType>, SyncError> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) => Ok(Some(meta.file_type())),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(io_err(path, err)),
    }
}

/// Remove a mirrored directory. With `keep_metadata`, sidecars survive and
/// only the directories left empty are removed.
fn remove_tree(dir: &Path, keep_metadata: bool, mapping: &MonitoredMapping) -> Result<usize, SyncError> {
    if !keep_metadata {
        std::fs::remove_dir_all(dir).map_err(|e| io_err(dir, e))?;
        tracing::info!(path = %dir.display(), "removed mirrored directory");
        return Ok(1);
    }

    let mut removed = 0;
    for entry in walkdir::WalkDir::new(dir).contents_first(true) {
        let entry = entry.map_err(|e| crate::error::walk_err(dir, e))?;
        let path = entry.path();
        if entry.file_type().is_dir() {
            if tree::remove_if_empty(path)? {
                removed += 1;
            }
        } else if !mapping.metadata_extensions.matches(path) && remove_file_if_present(path)? {
            removed += 1;
        }
    }
    Ok(removed)
}
