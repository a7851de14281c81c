//! Long-running strm-mirror daemon: watchers, cron passes, log rotation.

mod error;
pub mod events;
pub mod log_rotation;
mod logging;
pub mod paths;
pub mod scheduler;
pub mod supervisor;
mod runtime;
mod watch;
pub mod worker;

pub use error::DaemonError;
pub use logging::init_tracing;
pub use runtime::{run, start_blocking};
pub use scheduler::CronSchedule;
pub use watch::watch_task;
pub use worker::{request_pass, trigger_channel, Trigger};
