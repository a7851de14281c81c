//! Restart loop for long-running daemon tasks.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::DaemonError;

/// Keep a task running until `cancel` fires.
///
/// `start` builds a fresh task body for every attempt. A body that returns
/// (with or without an error) or panics while the token is still live is
/// logged and started again after `delay`.
pub async fn supervise<F, Fut>(name: String, cancel: CancellationToken, delay: Duration, mut start: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), DaemonError>> + Send + 'static,
{
    loop {
        if cancel.is_cancelled() {
            return;
        }
        match tokio::spawn(start()).await {
            Ok(Ok(())) if cancel.is_cancelled() => return,
            Ok(Ok(())) => tracing::warn!(task = %name, "task exited, restarting"),
            Ok(Err(err)) => tracing::error!(task = %name, error = %err, "task failed, restarting"),
            Err(err) => tracing::error!(task = %name, error = %err, "task panicked, restarting"),
        }
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn failing_task_is_restarted_after_delay() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        let handle = {
            let attempts = Arc::clone(&attempts);
            let cancel = cancel.clone();
            tokio::spawn(supervise(
                "flaky".to_string(),
                cancel.clone(),
                Duration::from_secs(5),
                move || {
                    let attempt = attempts.fetch_add(1, Ordering::SeqCst);
                    let cancel = cancel.clone();
                    async move {
                        if attempt < 2 {
                            return Err(DaemonError::ChannelClosed("test"));
                        }
                        cancel.cancelled().await;
                        Ok(())
                    }
                },
            ))
        };

        tokio::time::sleep(Duration::from_secs(12)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 3);

        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_task_is_restarted() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();
        let handle = {
            let attempts = Arc::clone(&attempts);
            let cancel = cancel.clone();
            tokio::spawn(supervise(
                "panicky".to_string(),
                cancel.clone(),
                Duration::from_secs(1),
                move || {
                    let attempt = attempts.fetch_add(1, Ordering::SeqCst);
                    let cancel = cancel.clone();
                    async move {
                        if attempt == 0 {
                            panic!("boom");
                        }
                        cancel.cancelled().await;
                        Ok::<(), DaemonError>(())
                    }
                },
            ))
        };

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        cancel.cancel();
        handle.await.unwrap();
    }
}
