//! User-facing volume and snapshot operations
//!
//! Requests validate their arguments, go through the catalog store for every
//! invariant check, and call the snapshot provider outside the catalog lock.

pub mod inspect;
pub mod snapshots;
pub mod volumes;

pub use inspect::{InspectEntry, InspectReport};
pub use snapshots::SnapshotManager;
pub use volumes::VolumeManager;
