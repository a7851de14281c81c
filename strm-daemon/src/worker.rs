//! Per-mapping full-pass worker.
//!
//! Each mapping owns one worker fed through a capacity-1 channel: a trigger
//! that arrives while a pass is running or already queued is dropped, so
//! bursts of cron ticks and startup requests coalesce into one pending pass.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use strm_core::{Config, MappingId};
use strm_sync::FullReconciler;

use crate::error::DaemonError;

/// Why a full pass was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Startup,
    Cron,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Startup => f.write_str("startup"),
            Trigger::Cron => f.write_str("cron"),
        }
    }
}

/// Queue a pass unless one is already pending.
pub fn request_pass(worker: &mpsc::Sender<Trigger>, trigger: Trigger) {
    match worker.try_send(trigger) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(_)) => {
            tracing::debug!(%trigger, "full pass already pending");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            tracing::warn!(%trigger, "full-pass worker is gone");
        }
    }
}

/// Shared receiving end, so a restarted worker picks up the same queue.
pub type TriggerQueue = Arc<Mutex<mpsc::Receiver<Trigger>>>;

pub fn trigger_channel() -> (mpsc::Sender<Trigger>, TriggerQueue) {
    let (tx, rx) = mpsc::channel(1);
    (tx, Arc::new(Mutex::new(rx)))
}

/// Run full passes for mapping `id` as triggers arrive, until cancelled.
pub async fn full_pass_worker(
    config: Arc<Config>,
    id: MappingId,
    queue: TriggerQueue,
    cancel: CancellationToken,
) -> Result<(), DaemonError> {
    let reconciler = Arc::new(FullReconciler::new(config, id)?);
    let mut queue = queue.lock().await;
    loop {
        let trigger = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            trigger = queue.recv() => match trigger {
                Some(trigger) => trigger,
                None => return Ok(()),
            },
        };

        tracing::info!(mapping = %id, %trigger, "full pass requested");
        let reconciler = Arc::clone(&reconciler);
        let token = cancel.clone();
        let report = tokio::task::spawn_blocking(move || reconciler.run(&token))
            .await
            .map_err(|err| DaemonError::Task {
                task: format!("full pass {id}"),
                reason: err.to_string(),
            })?;
        if !report.aborted_roots.is_empty() {
            tracing::warn!(mapping = %id, roots = ?report.aborted_roots, "pass finished with aborted roots");
        }
    }
}
