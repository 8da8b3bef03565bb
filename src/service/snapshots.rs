//! Snapshot manager

use crate::catalog::{CatalogStore, Snapshot};
use crate::common::{Error, Result};
use crate::provider::SnapshotProvider;
use crate::service::inspect::InspectReport;
use std::sync::Arc;

pub struct SnapshotManager {
    store: Arc<CatalogStore>,
    provider: Arc<dyn SnapshotProvider>,
}

impl SnapshotManager {
    pub fn new(store: Arc<CatalogStore>, provider: Arc<dyn SnapshotProvider>) -> Self {
        Self { store, provider }
    }

    /// Snapshot a volume, all or nothing.
    ///
    /// The snapshot is reserved (name taken, parent pinned) under the catalog
    /// lock, captured by the provider outside it, then committed together with
    /// the parent's dependent count. Provider failure or cancellation leaves
    /// the catalog as it was before the call. Content captured for a commit
    /// that then fails is released again.
    pub async fn create(&self, volume: &str, name: Option<&str>) -> Result<Snapshot> {
        let reservation = self.store.reserve_snapshot(volume, name)?;

        let content = self
            .provider
            .capture(reservation.parent(), reservation.snapshot())
            .await
            .map_err(|e| Error::provider("capture snapshot", e))?;

        let parent = reservation.parent().name.clone();
        let mut captured = reservation.snapshot().clone();
        captured.content = Some(content.clone());

        let snapshot = match reservation.commit(content) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.release_content(&captured).await;
                return Err(e);
            }
        };
        tracing::info!(
            "Created snapshot {} ({}) of volume {}",
            snapshot.name,
            snapshot.id,
            parent
        );
        Ok(snapshot)
    }

    /// Remove a snapshot and release its backing storage.
    ///
    /// Volumes already cloned from the snapshot are unaffected. A failed
    /// release is logged and does not fail the removal.
    pub async fn remove(&self, token: &str) -> Result<Snapshot> {
        let snapshot = self.store.remove_snapshot(token)?;
        self.release_content(&snapshot).await;
        Ok(snapshot)
    }

    /// Best-effort release of captured content that no record owns any more
    async fn release_content(&self, snapshot: &Snapshot) {
        if let Err(e) = self.provider.release(snapshot).await {
            tracing::warn!(
                "Storage of snapshot {} was not released by {}: {}",
                snapshot.name,
                self.provider.name(),
                e
            );
        }
    }

    pub fn list(&self) -> Vec<Snapshot> {
        self.store.list_snapshots()
    }

    pub fn inspect(&self, token: &str) -> Result<Snapshot> {
        self.store.get_snapshot(token)
    }

    /// Resolve every token, collecting per-token failures
    pub fn inspect_many<I>(&self, tokens: I) -> InspectReport<Snapshot>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        InspectReport::resolve(tokens, |token| self.store.get_snapshot(token))
    }
}
