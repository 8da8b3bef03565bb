//! Snapshot providers
//!
//! A provider performs the data side of snapshots: capturing a volume's
//! content, materialising a new volume from a snapshot, and releasing storage.
//! The catalog never holds its lock across a provider call.

pub mod local;

use crate::catalog::{ContentHandle, Snapshot, Volume};
use crate::common::Result;
use async_trait::async_trait;

pub use local::LocalProvider;

#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Capture the content of `volume` as `snapshot`.
    ///
    /// The returned handle is stored on the snapshot record and handed back
    /// on `restore` and `release`.
    async fn capture(&self, volume: &Volume, snapshot: &Snapshot) -> Result<ContentHandle>;

    /// Fill the newly reserved `volume` with the content of `snapshot`
    async fn restore(&self, snapshot: &Snapshot, volume: &Volume) -> Result<()>;

    /// Free the storage behind a removed snapshot
    async fn release(&self, snapshot: &Snapshot) -> Result<()>;

    /// Free the storage behind a removed volume
    async fn destroy_volume(&self, _volume: &Volume) -> Result<()> {
        Ok(())
    }
}

/// Metadata-only provider: nothing is copied or freed
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProvider;

#[async_trait]
impl SnapshotProvider for NoopProvider {
    fn name(&self) -> &str {
        "noop"
    }

    async fn capture(&self, _volume: &Volume, snapshot: &Snapshot) -> Result<ContentHandle> {
        Ok(ContentHandle::new(format!("noop:{}", snapshot.id)))
    }

    async fn restore(&self, _snapshot: &Snapshot, _volume: &Volume) -> Result<()> {
        Ok(())
    }

    async fn release(&self, _snapshot: &Snapshot) -> Result<()> {
        Ok(())
    }
}
