use std::path::Path;
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use strm_core::{config, Config};

use crate::error::{io_err, DaemonError};
use crate::logging::init_tracing;
use crate::paths::{RESTART_DELAY, ROTATION_INTERVAL};
use crate::scheduler::{scheduler_task, CronSchedule};
use crate::supervisor::supervise;
use crate::watch::watch_task;
use crate::worker::{full_pass_worker, request_pass, trigger_channel, Trigger};

/// Load the config, install logging, and run the daemon on a fresh
/// multi-threaded runtime until a shutdown signal arrives.
pub fn start_blocking(config_path: &Path) -> Result<(), DaemonError> {
    let config = config::load(config_path)?;
    init_tracing(config.log_dir.as_deref())?;
    tracing::info!(config = %config_path.display(), mappings = config.mappings.len(), "strm-mirror starting");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(Arc::new(config), CancellationToken::new()))
}

/// Run the daemon until `cancel` fires (or Ctrl-C / SIGTERM cancels it).
///
/// Returns once every task has stopped. In-flight units of work finish
/// before their task observes the token.
pub async fn run(config: Arc<Config>, cancel: CancellationToken) -> Result<(), DaemonError> {
    let schedule = if config.cron.enable {
        Some(CronSchedule::parse(&config.cron.expression)?)
    } else {
        tracing::warn!("cron full pass disabled");
        None
    };

    let mut tasks: JoinSet<Result<(), DaemonError>> = JoinSet::new();
    let mut workers = Vec::with_capacity(config.mappings.len());

    for mapping in &config.mappings {
        let id = mapping.id;
        if !mapping.create_pointers && !mapping.copy_metadata {
            tracing::warn!(mapping = %id, "create_strm and copy_metadata are both off; passes only clean up");
        }

        let (tx, queue) = trigger_channel();
        workers.push(tx);
        {
            let config = Arc::clone(&config);
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let token = cancel.clone();
                supervise(format!("full pass {id}"), cancel, RESTART_DELAY, move || {
                    full_pass_worker(Arc::clone(&config), id, Arc::clone(&queue), token.clone())
                })
                .await;
                Ok(())
            });
        }

        if config.real_time_monitor {
            let config = Arc::clone(&config);
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let token = cancel.clone();
                supervise(format!("watch {id}"), cancel, RESTART_DELAY, move || {
                    watch_task(Arc::clone(&config), id, token.clone())
                })
                .await;
                Ok(())
            });
        }
    }
    if !config.real_time_monitor {
        tracing::info!("real-time monitor disabled");
    }

    if config.run_full_task_on_startup {
        for worker in &workers {
            request_pass(worker, Trigger::Startup);
        }
    }

    if let Some(schedule) = schedule {
        tasks.spawn(scheduler_task(schedule, workers.clone(), cancel.clone()));
    }

    if let Some(log_dir) = config.log_dir.clone() {
        tasks.spawn(log_rotation_task(log_dir, cancel.clone()));
    }

    tasks.spawn(signal_task(cancel.clone()));

    let mut first_error = None;
    while let Some(joined) = tasks.join_next().await {
        let result = match joined {
            Ok(result) => result,
            Err(err) => Err(DaemonError::Task {
                task: "daemon".to_string(),
                reason: err.to_string(),
            }),
        };
        if let Err(err) = result {
            tracing::error!(error = %err, "daemon task failed");
            cancel.cancel();
            first_error.get_or_insert(err);
        }
    }
    tracing::info!("strm-mirror stopped");
    first_error.map_or(Ok(()), Err)
}

async fn log_rotation_task(
    log_dir: std::path::PathBuf,
    cancel: CancellationToken,
) -> Result<(), DaemonError> {
    let mut interval = tokio::time::interval(ROTATION_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    interval.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = interval.tick() => {
                let log_dir = log_dir.clone();
                // Rotation failures are logged inside rotate_log.
                let _ = tokio::task::spawn_blocking(move || crate::log_rotation::rotate_log(&log_dir)).await;
            }
        }
    }
}

async fn signal_task(cancel: CancellationToken) -> Result<(), DaemonError> {
    tokio::select! {
        _ = cancel.cancelled() => return Ok(()),
        _ = shutdown_signal() => {}
    }
    tracing::info!("shutdown signal received, stopping");
    cancel.cancel();
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(err) => {
            tracing::warn!(error = %err, "SIGTERM handler unavailable");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
