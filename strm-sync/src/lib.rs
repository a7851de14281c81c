//! # strm-sync
//!
//! Destination-tree reconciliation for strm-mirror.
//!
//! A destination tree mirrors one or more source roots: video files become
//! pointer artifacts (a text file holding the path the media server should
//! open) and sidecar metadata is copied byte-for-byte.
//!
//! - [`reconcile::FullReconciler`] runs a complete pass over one mapping.
//! - [`incremental::IncrementalSync`] applies one change notification.
//! - [`pipeline::run`] drives full passes over every configured mapping.
//!
//! Both paths route per-file decisions through [`mapper::PathMapper`] and
//! [`staleness`], and run every mutation inside
//! [`executor::ResilientExecutor`].

pub mod error;
pub mod executor;
pub mod incremental;
pub mod mapper;
pub mod pipeline;
pub mod reconcile;
pub mod staleness;
pub mod tree;
pub mod writer;

#[cfg(test)]
mod fixtures;

pub use error::SyncError;
pub use executor::{ResilientExecutor, RetryPolicy, UnitOutcome};
pub use incremental::{Applied, IncrementalSync, SourceEvent};
pub use mapper::PathMapper;
pub use pipeline::SyncScope;
pub use reconcile::{FullReconciler, PassPlan, ReconcileReport, ReconciliationDiff};
pub use writer::{FileAction, WriteResult};
