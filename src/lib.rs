//! # snapvol
//!
//! A volume and snapshot catalog with dependency tracking:
//! - Volumes are named storage units, optionally cloned from a snapshot
//! - Snapshots are point-in-time copies of one parent volume
//! - A volume cannot be removed while snapshots depend on it
//! - Every mutation persists through a pluggable metadata backend
//!
//! ## Architecture

#![allow(clippy::result_large_err)]
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │               VolumeHost                  │
//! │   VolumeManager        SnapshotManager    │
//! └──────┬──────────────────────────┬─────────┘
//!        │ reserve / commit         │ capture / restore / release
//! ┌──────▼────────────┐      ┌──────▼─────────────┐
//! │   CatalogStore    │      │  SnapshotProvider  │
//! │ (one RwLock over  │      │  noop | local      │
//! │  both namespaces) │      └────────────────────┘
//! └──────┬────────────┘
//!        │ atomic batches
//! ┌──────▼────────────┐
//! │ MetadataBackend   │
//! │ memory | rocksdb  │
//! └───────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! snapvol volume create --name test
//! snapvol snapshot create --volume test --name test-snap
//! snapvol volume create --name clone --snapshot test-snap
//! snapvol snapshot inspect test-snap
//! snapvol volume rm test   # fails: Volume still has 1 dependent snapshots
//! ```

pub mod catalog;
pub mod common;
pub mod host;
pub mod provider;
pub mod service;

// Re-export commonly used types
pub use catalog::{CatalogStore, Record, RecordKind, Snapshot, Volume};
pub use common::{Config, Error, Result};
pub use host::VolumeHost;
pub use provider::{LocalProvider, NoopProvider, SnapshotProvider};
pub use service::{InspectReport, SnapshotManager, VolumeManager};

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
