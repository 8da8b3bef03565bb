//! Metadata persistence for the catalog
//!
//! Stores:
//! - Volume records (volume id → bincode record)
//! - Snapshot records (snapshot id → bincode record)
//!
//! Only committed records reach a backend. In-flight reservations live in
//! memory and vanish with the process.

use crate::catalog::types::{Snapshot, SnapshotId, Volume, VolumeId};
use crate::common::{Error, Result};
use rocksdb::{ColumnFamily, IteratorMode, Options, WriteBatch, DB};
use serde::de::DeserializeOwned;
use std::path::Path;

const CF_VOLUMES: &str = "volumes";
const CF_SNAPSHOTS: &str = "snapshots";

/// A single persisted change. A set of mutations is applied atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    PutVolume(Volume),
    DeleteVolume(VolumeId),
    PutSnapshot(Snapshot),
    DeleteSnapshot(SnapshotId),
}

/// Everything a backend holds, as read back at startup
#[derive(Debug, Default)]
pub struct LoadedCatalog {
    pub volumes: Vec<Volume>,
    pub snapshots: Vec<Snapshot>,
}

pub trait MetadataBackend: Send + Sync {
    /// Read every stored record
    fn load(&self) -> Result<LoadedCatalog>;

    /// Apply all mutations or none of them
    fn apply(&self, mutations: &[Mutation]) -> Result<()>;

    /// Flush to durable storage
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Keeps nothing; the catalog lives only as long as the process
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryBackend;

impl MetadataBackend for MemoryBackend {
    fn load(&self) -> Result<LoadedCatalog> {
        Ok(LoadedCatalog::default())
    }

    fn apply(&self, _mutations: &[Mutation]) -> Result<()> {
        Ok(())
    }
}

/// RocksDB-backed catalog metadata
pub struct RocksBackend {
    db: DB,
}

impl RocksBackend {
    /// Open or create the catalog database
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let db = DB::open_cf(&opts, path, vec![CF_VOLUMES, CF_SNAPSHOTS])?;
        tracing::debug!("Opened catalog database at {}", path.display());

        Ok(Self { db })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::MetadataCorrupted(format!("missing column family {}", name)))
    }

    fn read_all<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<T>> {
        let cf = self.cf(name)?;
        let mut records = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value_bytes) = item?;
            let record: T = bincode::deserialize(&value_bytes)
                .map_err(|e| Error::MetadataCorrupted(e.to_string()))?;
            records.push(record);
        }
        Ok(records)
    }
}

fn encode<T: serde::Serialize>(record: &T) -> Result<Vec<u8>> {
    bincode::serialize(record).map_err(|e| Error::Internal(format!("Serialize error: {}", e)))
}

impl MetadataBackend for RocksBackend {
    fn load(&self) -> Result<LoadedCatalog> {
        Ok(LoadedCatalog {
            volumes: self.read_all(CF_VOLUMES)?,
            snapshots: self.read_all(CF_SNAPSHOTS)?,
        })
    }

    fn apply(&self, mutations: &[Mutation]) -> Result<()> {
        let volumes = self.cf(CF_VOLUMES)?;
        let snapshots = self.cf(CF_SNAPSHOTS)?;

        let mut batch = WriteBatch::default();
        for mutation in mutations {
            match mutation {
                Mutation::PutVolume(volume) => {
                    batch.put_cf(volumes, volume.id.as_str().as_bytes(), encode(volume)?)
                }
                Mutation::DeleteVolume(id) => batch.delete_cf(volumes, id.as_str().as_bytes()),
                Mutation::PutSnapshot(snapshot) => {
                    batch.put_cf(snapshots, snapshot.id.as_str().as_bytes(), encode(snapshot)?)
                }
                Mutation::DeleteSnapshot(id) => batch.delete_cf(snapshots, id.as_str().as_bytes()),
            }
        }

        self.db.write(batch)?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}
