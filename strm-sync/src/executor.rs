//! Retry policy around single units of work.
//!
//! A unit is one file's staleness decision plus its mutation. Two tiers:
//!
//! - transient storage disconnect: `warn!`, sleep the backoff, retry the same
//!   unit until it stops failing that way (or the pass is cancelled);
//! - any other error: `error!`, skip this unit, carry on with the next.
//!
//! Executors run on blocking threads. Sleeps are sliced so a cancelled token
//! is observed within [`PAUSE_SLICE`].

use std::io;
use std::path::Path;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use strm_core::SyncPolicy;

use crate::error::SyncError;

const PAUSE_SLICE: Duration = Duration::from_millis(250);

/// Which I/O errors count as a transient disconnect, and how long to wait.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub backoff: Duration,
    pub is_transient: fn(&io::Error) -> bool,
}

impl RetryPolicy {
    pub fn new(backoff: Duration) -> Self {
        Self {
            backoff,
            is_transient: is_storage_disconnect,
        }
    }

    /// True when `err` is an I/O failure this policy retries.
    pub fn classify(&self, err: &SyncError) -> bool {
        err.io_source().map(self.is_transient).unwrap_or(false)
    }
}

/// Errors a network or FUSE mount reports while its backend is unreachable.
pub fn is_storage_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotConnected
            | io::ErrorKind::StaleNetworkFileHandle
            | io::ErrorKind::HostUnreachable
            | io::ErrorKind::NetworkUnreachable
            | io::ErrorKind::NetworkDown
    )
}

/// Result of one unit run through the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome<T> {
    Done(T),
    /// Failed with a non-transient error; already logged.
    Skipped,
    /// The token fired while the unit was waiting to retry.
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct ResilientExecutor {
    policy: RetryPolicy,
    throttle: Duration,
    cancel: CancellationToken,
}

impl ResilientExecutor {
    pub fn new(policy: RetryPolicy, throttle: Duration, cancel: CancellationToken) -> Self {
        Self {
            policy,
            throttle,
            cancel,
        }
    }

    /// Executor configured from the pass-wide policy flags.
    pub fn from_policy(policy: &SyncPolicy, cancel: CancellationToken) -> Self {
        Self::new(RetryPolicy::new(policy.retry_backoff), policy.throttle, cancel)
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run `unit`, then sleep the throttle interval.
    pub fn run<T, F>(&self, label: &Path, unit: F) -> UnitOutcome<T>
    where
        F: FnMut() -> Result<T, SyncError>,
    {
        let outcome = self.run_unthrottled(label, unit);
        if !matches!(outcome, UnitOutcome::Cancelled) && !self.throttle.is_zero() {
            self.pause(self.throttle);
        }
        outcome
    }

    /// Same retry contract as [`run`](Self::run) without the throttle sleep.
    pub fn run_unthrottled<T, F>(&self, label: &Path, mut unit: F) -> UnitOutcome<T>
    where
        F: FnMut() -> Result<T, SyncError>,
    {
        loop {
            match unit() {
                Ok(value) => return UnitOutcome::Done(value),
                Err(err) if self.policy.classify(&err) => {
                    tracing::warn!(
                        path = %label.display(),
                        error = %err,
                        backoff_secs = self.policy.backoff.as_secs_f64(),
                        "storage disconnected, retrying",
                    );
                    if !self.pause(self.policy.backoff) {
                        return UnitOutcome::Cancelled;
                    }
                }
                Err(err) => {
                    tracing::error!(path = %label.display(), error = %err, "skipping");
                    return UnitOutcome::Skipped;
                }
            }
        }
    }

    /// Wrap the enumeration of a source root.
    ///
    /// Returns `None` when the root is abandoned for this pass: a transient
    /// disconnect with `stop_on_mount_loss`, any other enumeration failure,
    /// or cancellation. Without `stop_on_mount_loss` a disconnect is retried
    /// after the backoff.
    pub fn enumerate<T, F>(&self, root: &Path, stop_on_mount_loss: bool, mut f: F) -> Option<T>
    where
        F: FnMut() -> Result<T, SyncError>,
    {
        loop {
            if self.is_cancelled() {
                return None;
            }
            match f() {
                Ok(value) => return Some(value),
                Err(err) if self.policy.classify(&err) && !stop_on_mount_loss => {
                    tracing::warn!(
                        root = %root.display(),
                        error = %err,
                        "source root unreachable, retrying enumeration",
                    );
                    if !self.pause(self.policy.backoff) {
                        return None;
                    }
                }
                Err(err) => {
                    tracing::error!(
                        severity = "critical",
                        root = %root.display(),
                        error = %err,
                        "aborting source root for this pass",
                    );
                    return None;
                }
            }
        }
    }

    /// Sleep for `duration`; false if the token fired first.
    pub fn pause(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(PAUSE_SLICE));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    use crate::error::io_err;

    fn not_connected() -> SyncError {
        io_err(
            "/mnt/cloud/a.mkv",
            io::Error::new(io::ErrorKind::NotConnected, "transport endpoint is not connected"),
        )
    }

    fn denied() -> SyncError {
        io_err(
            "/mnt/cloud/b.mkv",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        )
    }

    fn executor() -> ResilientExecutor {
        ResilientExecutor::new(
            RetryPolicy::new(Duration::ZERO),
            Duration::ZERO,
            CancellationToken::new(),
        )
    }

    #[test]
    fn transient_failures_retry_the_same_unit_until_success() {
        let exec = executor();
        let calls = Cell::new(0);
        let outcome = exec.run(Path::new("a.mkv"), || {
            calls.set(calls.get() + 1);
            if calls.get() <= 3 {
                Err(not_connected())
            } else {
                Ok("written")
            }
        });
        assert_eq!(outcome, UnitOutcome::Done("written"));
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn non_transient_failure_skips_only_that_item() {
        let exec = executor();
        let mut done = Vec::new();
        for n in 0..3 {
            let outcome = exec.run(Path::new("item"), || {
                if n == 1 {
                    Err(denied())
                } else {
                    Ok(n)
                }
            });
            if let UnitOutcome::Done(n) = outcome {
                done.push(n);
            } else {
                assert_eq!(outcome, UnitOutcome::Skipped);
            }
        }
        assert_eq!(done, vec![0, 2]);
    }

    #[test]
    fn non_io_errors_are_not_transient() {
        let policy = RetryPolicy::new(Duration::ZERO);
        assert!(!policy.classify(&SyncError::Loop {
            path: "/x".into()
        }));
        assert!(policy.classify(&not_connected()));
    }

    #[test]
    fn injected_predicate_overrides_classification() {
        let policy = RetryPolicy {
            backoff: Duration::ZERO,
            is_transient: |err| err.kind() == io::ErrorKind::PermissionDenied,
        };
        assert!(policy.classify(&denied()));
        assert!(!policy.classify(&not_connected()));
    }

    #[test]
    fn cancellation_ends_retry_loop() {
        let token = CancellationToken::new();
        let exec = ResilientExecutor::new(
            RetryPolicy::new(Duration::from_secs(60)),
            Duration::ZERO,
            token.clone(),
        );
        let calls = Cell::new(0);
        let outcome: UnitOutcome<()> = exec.run(Path::new("a.mkv"), || {
            calls.set(calls.get() + 1);
            token.cancel();
            Err(not_connected())
        });
        assert_eq!(outcome, UnitOutcome::Cancelled);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn enumeration_disconnect_aborts_root_when_stopping_on_mount_loss() {
        let exec = executor();
        let calls = Cell::new(0);
        let listed: Option<()> = exec.enumerate(Path::new("/mnt/cloud"), true, || {
            calls.set(calls.get() + 1);
            Err(not_connected())
        });
        assert!(listed.is_none());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn enumeration_disconnect_retries_without_stop_on_mount_loss() {
        let exec = executor();
        let calls = Cell::new(0);
        let listed = exec.enumerate(Path::new("/mnt/cloud"), false, || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(not_connected())
            } else {
                Ok(vec!["a.mkv"])
            }
        });
        assert_eq!(listed, Some(vec!["a.mkv"]));
        assert_eq!(calls.get(), 3);
    }
}
