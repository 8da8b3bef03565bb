//! Volume host: the catalog, its provider and both managers

use crate::catalog::{CatalogStore, MemoryBackend, MetadataBackend, RocksBackend};
use crate::common::{BackendKind, Config, ProviderKind, Result};
use crate::provider::{LocalProvider, NoopProvider, SnapshotProvider};
use crate::service::{SnapshotManager, VolumeManager};
use std::sync::Arc;

/// Owns the catalog for one process.
///
/// Built once at startup with [`VolumeHost::open`] and torn down with
/// [`VolumeHost::shutdown`]. Request handlers share it by reference.
pub struct VolumeHost {
    store: Arc<CatalogStore>,
    provider: Arc<dyn SnapshotProvider>,
    volumes: VolumeManager,
    snapshots: SnapshotManager,
}

impl VolumeHost {
    /// Open the backend and provider named by the config
    pub fn open(config: &Config) -> Result<Self> {
        config.validate()?;

        let backend: Box<dyn MetadataBackend> = match config.backend {
            BackendKind::Memory => Box::new(MemoryBackend),
            BackendKind::Rocksdb => Box::new(RocksBackend::open(config.catalog_path())?),
        };
        let provider: Arc<dyn SnapshotProvider> = match config.provider {
            ProviderKind::Noop => Arc::new(NoopProvider),
            ProviderKind::Local => Arc::new(LocalProvider::new(config.storage_path())),
        };

        tracing::info!("Opening volume host in {}", config.data_dir.display());
        tracing::info!("  Backend: {:?}", config.backend);
        tracing::info!("  Provider: {}", provider.name());

        let store = Arc::new(CatalogStore::open(backend)?);
        Ok(Self::new(store, provider))
    }

    pub fn new(store: Arc<CatalogStore>, provider: Arc<dyn SnapshotProvider>) -> Self {
        Self {
            volumes: VolumeManager::new(store.clone(), provider.clone()),
            snapshots: SnapshotManager::new(store.clone(), provider.clone()),
            store,
            provider,
        }
    }

    /// In-memory catalog over the given provider
    pub fn in_memory(provider: Arc<dyn SnapshotProvider>) -> Self {
        Self::new(Arc::new(CatalogStore::in_memory()), provider)
    }

    pub fn store(&self) -> &CatalogStore {
        &self.store
    }

    pub fn provider(&self) -> &dyn SnapshotProvider {
        self.provider.as_ref()
    }

    pub fn volumes(&self) -> &VolumeManager {
        &self.volumes
    }

    pub fn snapshots(&self) -> &SnapshotManager {
        &self.snapshots
    }

    /// Flush the catalog and release it
    pub fn shutdown(self) -> Result<()> {
        self.store.flush()?;
        tracing::debug!("Volume host shut down");
        Ok(())
    }
}
