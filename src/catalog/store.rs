//! Catalog store
//!
//! The authoritative volume/snapshot catalog. One `RwLock` covers both
//! namespaces: lookups share the read lock, every mutation takes the write
//! lock for its whole validate → persist → apply sequence.
//!
//! Creates that need the snapshot provider are split around the slow call:
//! the record is reserved under the lock, the provider runs unlocked, and the
//! reservation is committed (or dropped) afterwards. A reservation that is
//! dropped without being committed rolls itself back, which covers both
//! provider failures and cancelled futures.

use crate::catalog::backend::{MemoryBackend, MetadataBackend, Mutation};
use crate::catalog::ids::{IdGenerator, RandomIds};
use crate::catalog::state::CatalogState;
use crate::catalog::types::{
    ContentHandle, Record, RecordKind, Snapshot, SnapshotId, Volume, VolumeId,
};
use crate::common::{validate_name, Error, Result};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Attempts at drawing an unused id before giving up
const MAX_ID_ATTEMPTS: usize = 16;

pub struct CatalogStore {
    state: RwLock<CatalogState>,
    backend: Box<dyn MetadataBackend>,
    ids: Box<dyn IdGenerator>,
}

impl CatalogStore {
    /// A catalog that is not persisted anywhere
    pub fn in_memory() -> Self {
        Self {
            state: RwLock::new(CatalogState::default()),
            backend: Box::new(MemoryBackend),
            ids: Box::new(RandomIds),
        }
    }

    /// Open a catalog over a backend, loading whatever it already holds
    pub fn open(backend: Box<dyn MetadataBackend>) -> Result<Self> {
        let state = CatalogState::restore(backend.load()?)?;
        tracing::info!(
            "Catalog loaded: {} volumes, {} snapshots",
            state.volumes().count(),
            state.snapshots().count()
        );

        Ok(Self {
            state: RwLock::new(state),
            backend,
            ids: Box::new(RandomIds),
        })
    }

    /// Replace the identity generator
    pub fn with_id_generator(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.ids = Box::new(ids);
        self
    }

    fn read(&self) -> RwLockReadGuard<'_, CatalogState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CatalogState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Persist staged mutations, then make them visible
    fn commit(&self, state: &mut CatalogState, mutations: Vec<Mutation>) -> Result<()> {
        self.backend.apply(&mutations)?;
        for mutation in mutations {
            state.apply(mutation);
        }
        Ok(())
    }

    fn fresh_id(&self, state: &CatalogState) -> Result<String> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = self.ids.generate();
            if !state.id_in_use(&id) {
                return Ok(id);
            }
        }
        Err(Error::Internal(
            "identity generator keeps returning ids in use".into(),
        ))
    }

    // === Reads ===

    pub fn get_volume(&self, token: &str) -> Result<Volume> {
        self.read().volume(token).cloned()
    }

    pub fn get_snapshot(&self, token: &str) -> Result<Snapshot> {
        self.read().snapshot(token).cloned()
    }

    /// Resolve a name or id of the given kind
    pub fn get(&self, token: &str, kind: RecordKind) -> Result<Record> {
        match kind {
            RecordKind::Volume => self.get_volume(token).map(Record::from),
            RecordKind::Snapshot => self.get_snapshot(token).map(Record::from),
        }
    }

    /// All live volumes, in no particular order
    pub fn list_volumes(&self) -> Vec<Volume> {
        self.read().volumes().cloned().collect()
    }

    /// All live snapshots, in no particular order
    pub fn list_snapshots(&self) -> Vec<Snapshot> {
        self.read().snapshots().cloned().collect()
    }

    pub fn list(&self, kind: RecordKind) -> Vec<Record> {
        match kind {
            RecordKind::Volume => self.list_volumes().into_iter().map(Record::from).collect(),
            RecordKind::Snapshot => self
                .list_snapshots()
                .into_iter()
                .map(Record::from)
                .collect(),
        }
    }

    // === Volumes ===

    /// Insert a fresh volume, or fail with `Conflict` if the name is taken
    pub fn put_volume(&self, name: Option<&str>) -> Result<Volume> {
        let name = checked_name(RecordKind::Volume, name)?;

        let mut state = self.write();
        let id = self.fresh_id(&state)?;
        let volume = Volume::new(VolumeId::new(id.clone()), name.unwrap_or(id), None);

        state.reserve_volume(volume.clone())?;
        let staged = state.stage_volume_commit(&volume.id)?;
        if let Err(e) = self.commit(&mut state, staged) {
            state.discard_volume(&volume.id);
            return Err(e);
        }

        tracing::info!("Created volume {} ({})", volume.name, volume.id);
        Ok(volume)
    }

    /// Hold a name for a volume that will be cloned from `source`
    pub fn reserve_volume(
        &self,
        name: Option<&str>,
        source: &Snapshot,
    ) -> Result<VolumeReservation<'_>> {
        let name = checked_name(RecordKind::Volume, name)?;

        let mut state = self.write();
        let id = self.fresh_id(&state)?;
        let volume = Volume::new(
            VolumeId::new(id.clone()),
            name.unwrap_or(id),
            Some(source.id.clone()),
        );
        state.reserve_volume(volume.clone())?;

        tracing::debug!(
            "Reserved volume {} ({}) from snapshot {}",
            volume.name,
            volume.id,
            source.name
        );
        Ok(VolumeReservation {
            store: self,
            volume,
            committed: false,
        })
    }

    fn commit_volume(&self, id: &VolumeId) -> Result<Volume> {
        let mut state = self.write();
        let staged = state.stage_volume_commit(id)?;
        self.commit(&mut state, staged)?;
        state.volume(id.as_str()).cloned()
    }

    fn discard_volume(&self, id: &VolumeId) {
        if let Some(volume) = self.write().discard_volume(id) {
            tracing::debug!("Rolled back volume {} ({})", volume.name, volume.id);
        }
    }

    /// Delete a volume that no snapshot depends on
    pub fn remove_volume(&self, token: &str) -> Result<Volume> {
        let mut state = self.write();
        let (volume, staged) = state.stage_volume_removal(token)?;
        self.commit(&mut state, staged)?;

        tracing::info!("Removed volume {} ({})", volume.name, volume.id);
        Ok(volume)
    }

    // === Snapshots ===

    /// Hold a name for a snapshot of `volume` while its content is captured.
    ///
    /// The parent cannot be removed until the reservation is committed and
    /// the snapshot removed again, or the reservation is dropped.
    pub fn reserve_snapshot(
        &self,
        volume: &str,
        name: Option<&str>,
    ) -> Result<SnapshotReservation<'_>> {
        let name = checked_name(RecordKind::Snapshot, name)?;

        let mut state = self.write();
        let parent = state.volume(volume)?.clone();
        let id = self.fresh_id(&state)?;
        let snapshot = Snapshot::new(
            SnapshotId::new(id.clone()),
            name.unwrap_or(id),
            parent.id.clone(),
        );
        state.reserve_snapshot(snapshot.clone())?;

        tracing::debug!(
            "Reserved snapshot {} ({}) of volume {}",
            snapshot.name,
            snapshot.id,
            parent.name
        );
        Ok(SnapshotReservation {
            store: self,
            snapshot,
            parent,
            committed: false,
        })
    }

    fn commit_snapshot(&self, id: &SnapshotId, content: ContentHandle) -> Result<Snapshot> {
        let mut state = self.write();
        let staged = state.stage_snapshot_commit(id, content)?;
        self.commit(&mut state, staged)?;
        state.snapshot(id.as_str()).cloned()
    }

    fn discard_snapshot(&self, id: &SnapshotId) {
        if let Some(snapshot) = self.write().discard_snapshot(id) {
            tracing::debug!("Rolled back snapshot {} ({})", snapshot.name, snapshot.id);
        }
    }

    /// Delete a snapshot and release its hold on the parent volume
    pub fn remove_snapshot(&self, token: &str) -> Result<Snapshot> {
        let mut state = self.write();
        let (snapshot, staged) = state.stage_snapshot_removal(token)?;
        self.commit(&mut state, staged)?;

        tracing::info!("Removed snapshot {} ({})", snapshot.name, snapshot.id);
        Ok(snapshot)
    }

    /// Flush the backend
    pub fn flush(&self) -> Result<()> {
        self.backend.flush()
    }

    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        self.read().assert_consistent();
    }
}

/// Empty names mean "use the generated id"
fn checked_name(kind: RecordKind, name: Option<&str>) -> Result<Option<String>> {
    match name.filter(|n| !n.is_empty()) {
        Some(name) => {
            validate_name(kind, name)?;
            Ok(Some(name.to_string()))
        }
        None => Ok(None),
    }
}

/// A volume name held while its content is materialised
#[must_use = "an uncommitted reservation is rolled back when dropped"]
pub struct VolumeReservation<'a> {
    store: &'a CatalogStore,
    volume: Volume,
    committed: bool,
}

impl VolumeReservation<'_> {
    /// The record as it will be committed
    pub fn volume(&self) -> &Volume {
        &self.volume
    }

    /// Make the volume visible
    pub fn commit(mut self) -> Result<Volume> {
        let volume = self.store.commit_volume(&self.volume.id)?;
        self.committed = true;
        Ok(volume)
    }
}

impl std::fmt::Debug for VolumeReservation<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolumeReservation")
            .field("volume", &self.volume)
            .field("committed", &self.committed)
            .finish_non_exhaustive()
    }
}

impl Drop for VolumeReservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.store.discard_volume(&self.volume.id);
        }
    }
}

/// A snapshot name held while the provider captures its content
#[must_use = "an uncommitted reservation is rolled back when dropped"]
pub struct SnapshotReservation<'a> {
    store: &'a CatalogStore,
    snapshot: Snapshot,
    parent: Volume,
    committed: bool,
}

impl SnapshotReservation<'_> {
    /// The record as it will be committed, without content
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// The parent volume as it was when the reservation was taken
    pub fn parent(&self) -> &Volume {
        &self.parent
    }

    /// Record the captured content and make the snapshot visible
    pub fn commit(mut self, content: ContentHandle) -> Result<Snapshot> {
        let snapshot = self.store.commit_snapshot(&self.snapshot.id, content)?;
        self.committed = true;
        Ok(snapshot)
    }
}

impl Drop for SnapshotReservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.store.discard_snapshot(&self.snapshot.id);
        }
    }
}
