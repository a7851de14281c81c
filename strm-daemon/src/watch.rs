//! Per-mapping watch task: notify events in, incremental sync out.

use std::sync::Arc;

use notify::{recommended_watcher, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use strm_core::{Config, MappingId};
use strm_sync::{IncrementalSync, ResilientExecutor};

use crate::error::DaemonError;
use crate::events;

/// Watch every existing source root of mapping `id` recursively and apply
/// the resulting events one at a time, until cancelled.
///
/// The watcher is dropped on return, which releases its OS handles.
pub async fn watch_task(
    config: Arc<Config>,
    id: MappingId,
    cancel: CancellationToken,
) -> Result<(), DaemonError> {
    let exec = ResilientExecutor::from_policy(&config.policy, cancel.clone());
    let sync = Arc::new(IncrementalSync::new(Arc::clone(&config), id, exec)?);
    let roots = config
        .mapping(id)
        .map(|m| m.source_roots.clone())
        .unwrap_or_default();

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher: RecommendedWatcher = recommended_watcher(move |event: notify::Result<Event>| {
        let _ = event_tx.send(event);
    })?;

    let mut watched = 0;
    for root in &roots {
        if !root.is_dir() {
            tracing::warn!(mapping = %id, root = %root.display(), "source root missing, not watched");
            continue;
        }
        watcher.watch(root, RecursiveMode::Recursive)?;
        tracing::info!(mapping = %id, root = %root.display(), "watching");
        watched += 1;
    }
    if watched == 0 {
        tracing::warn!(mapping = %id, "no source root could be watched");
    }

    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = event_rx.recv() => match event {
                Some(event) => event,
                None => return Err(DaemonError::ChannelClosed("watch events")),
            },
        };
        let event = match event {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(mapping = %id, error = %err, "watcher event error");
                continue;
            }
        };

        for source_event in events::classify(event) {
            let sync = Arc::clone(&sync);
            let applied = tokio::task::spawn_blocking(move || sync.apply(source_event))
                .await
                .map_err(|err| DaemonError::Task {
                    task: format!("incremental sync {id}"),
                    reason: err.to_string(),
                })?;
            tracing::debug!(mapping = %id, ?applied, "event applied");
        }
    }

    drop(watcher);
    tracing::info!(mapping = %id, "watcher stopped");
    Ok(())
}
