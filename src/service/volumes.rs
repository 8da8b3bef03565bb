//! Volume manager

use crate::catalog::{CatalogStore, Volume};
use crate::common::{Error, Result};
use crate::provider::SnapshotProvider;
use crate::service::inspect::InspectReport;
use std::sync::Arc;

pub struct VolumeManager {
    store: Arc<CatalogStore>,
    provider: Arc<dyn SnapshotProvider>,
}

impl VolumeManager {
    pub fn new(store: Arc<CatalogStore>, provider: Arc<dyn SnapshotProvider>) -> Self {
        Self { store, provider }
    }

    /// Create a volume, optionally cloned from a snapshot.
    ///
    /// A clone reserves its name first, lets the provider copy the snapshot
    /// content without the catalog lock held, then commits. If the provider
    /// fails or the future is dropped, the reservation is rolled back. A
    /// restored tree whose commit fails is destroyed again.
    pub async fn create(&self, name: Option<&str>, source_snapshot: Option<&str>) -> Result<Volume> {
        let Some(source) = source_snapshot else {
            return self.store.put_volume(name);
        };

        let snapshot = self.store.get_snapshot(source)?;
        let reservation = self.store.reserve_volume(name, &snapshot)?;

        self.provider
            .restore(&snapshot, reservation.volume())
            .await
            .map_err(|e| Error::provider("restore snapshot", e))?;

        let reserved = reservation.volume().clone();
        let volume = match reservation.commit() {
            Ok(volume) => volume,
            Err(e) => {
                self.destroy_storage(&reserved).await;
                return Err(e);
            }
        };
        tracing::info!(
            "Created volume {} ({}) from snapshot {}",
            volume.name,
            volume.id,
            snapshot.name
        );
        Ok(volume)
    }

    /// Remove a volume that has no dependent snapshots.
    ///
    /// Backing storage is released after the record is gone; a failed release
    /// is logged and does not fail the removal.
    pub async fn remove(&self, token: &str) -> Result<Volume> {
        let volume = self.store.remove_volume(token)?;
        self.destroy_storage(&volume).await;
        Ok(volume)
    }

    async fn destroy_storage(&self, volume: &Volume) {
        if let Err(e) = self.provider.destroy_volume(volume).await {
            tracing::warn!(
                "Storage of volume {} was not released by {}: {}",
                volume.name,
                self.provider.name(),
                e
            );
        }
    }

    pub fn list(&self) -> Vec<Volume> {
        self.store.list_volumes()
    }

    pub fn inspect(&self, token: &str) -> Result<Volume> {
        self.store.get_volume(token)
    }

    pub fn inspect_many<I>(&self, tokens: I) -> InspectReport<Volume>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        InspectReport::resolve(tokens, |token| self.store.get_volume(token))
    }
}
