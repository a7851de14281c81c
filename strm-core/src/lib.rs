//! strm-mirror core library: configuration schema, mapping types, errors.
//!
//! Public API surface:
//! - [`types`]: [`MonitoredMapping`], [`ExtensionSet`], [`SyncPolicy`], [`Config`]
//! - [`error`]: [`ConfigError`]
//! - [`config`]: load / validate / normalize

pub mod config;
pub mod error;
pub mod types;

pub use error::ConfigError;
pub use types::{
    Config, CronSettings, EntryKind, ExtensionSet, MappingId, MonitoredMapping, SyncPolicy,
};
