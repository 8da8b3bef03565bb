//! Volume and snapshot catalog
//!
//! The catalog is responsible for:
//! - Record identity (ids and unique names per namespace)
//! - Name-or-id resolution, id first
//! - Dependency counts between volumes and their snapshots
//! - Reservations for creates that wait on the snapshot provider
//! - Persisting committed records

pub mod backend;
pub mod ids;
mod state;
pub mod store;
pub mod types;

pub use backend::{LoadedCatalog, MemoryBackend, MetadataBackend, Mutation, RocksBackend};
pub use ids::{IdGenerator, RandomIds};
pub use store::{CatalogStore, SnapshotReservation, VolumeReservation};
pub use types::{ContentHandle, Record, RecordKind, Snapshot, SnapshotId, Volume, VolumeId};
