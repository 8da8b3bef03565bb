//! Catalog maps and invariant checks
//!
//! `CatalogState` is the unlocked core of the store. Every change goes through
//! two steps: a `stage_*` method validates against the current maps and
//! describes the change as a list of [`Mutation`]s, then [`CatalogState::apply`]
//! performs them. The store persists the staged mutations in between, so the
//! in-memory maps never run ahead of the backend.
//!
//! Reserved entries hold their name and id but are invisible to lookups.

use crate::catalog::backend::{LoadedCatalog, Mutation};
use crate::catalog::types::{ContentHandle, RecordKind, Snapshot, SnapshotId, Volume, VolumeId};
use crate::common::{Error, Result};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Reserved,
    Live,
}

#[derive(Debug)]
struct VolumeEntry {
    volume: Volume,
    slot: Slot,
    /// Snapshots of this volume still being captured
    pending: u32,
}

impl VolumeEntry {
    fn is_live(&self) -> bool {
        self.slot == Slot::Live
    }
}

#[derive(Debug)]
struct SnapshotEntry {
    snapshot: Snapshot,
    slot: Slot,
}

impl SnapshotEntry {
    fn is_live(&self) -> bool {
        self.slot == Slot::Live
    }
}

#[derive(Debug, Default)]
pub(crate) struct CatalogState {
    volumes: HashMap<VolumeId, VolumeEntry>,
    volume_names: HashMap<String, VolumeId>,
    snapshots: HashMap<SnapshotId, SnapshotEntry>,
    snapshot_names: HashMap<String, SnapshotId>,
    /// Snapshot ids still named as the source of a volume, reserved or live
    source_refs: HashMap<SnapshotId, u32>,
}

impl CatalogState {
    /// Rebuild the maps from persisted records, re-deriving dependent counts
    pub(crate) fn restore(loaded: LoadedCatalog) -> Result<Self> {
        let mut state = Self::default();

        for mut volume in loaded.volumes {
            if state.volume_names.contains_key(&volume.name) {
                return Err(Error::MetadataCorrupted(format!(
                    "duplicate volume name {}",
                    volume.name
                )));
            }
            if volume.dependent_snapshots != 0 {
                tracing::debug!(
                    "Re-deriving dependent count of volume {} (stored {})",
                    volume.name,
                    volume.dependent_snapshots
                );
            }
            volume.dependent_snapshots = 0;
            state.apply(Mutation::PutVolume(volume));
        }

        for snapshot in loaded.snapshots {
            if state.snapshot_names.contains_key(&snapshot.name) {
                return Err(Error::MetadataCorrupted(format!(
                    "duplicate snapshot name {}",
                    snapshot.name
                )));
            }
            let parent = state.volumes.get_mut(&snapshot.volume).ok_or_else(|| {
                Error::MetadataCorrupted(format!(
                    "snapshot {} references missing volume {}",
                    snapshot.name, snapshot.volume
                ))
            })?;
            parent.volume.dependent_snapshots += 1;
            state.apply(Mutation::PutSnapshot(snapshot));
        }

        Ok(state)
    }

    // === Lookups ===

    /// Resolve by id first, then by name. Reserved records never match.
    fn volume_entry(&self, token: &str) -> Option<&VolumeEntry> {
        self.volumes
            .get(token)
            .filter(|e| e.is_live())
            .or_else(|| {
                self.volume_names
                    .get(token)
                    .and_then(|id| self.volumes.get(id))
                    .filter(|e| e.is_live())
            })
    }

    fn snapshot_entry(&self, token: &str) -> Option<&SnapshotEntry> {
        self.snapshots
            .get(token)
            .filter(|e| e.is_live())
            .or_else(|| {
                self.snapshot_names
                    .get(token)
                    .and_then(|id| self.snapshots.get(id))
                    .filter(|e| e.is_live())
            })
    }

    pub(crate) fn volume(&self, token: &str) -> Result<&Volume> {
        self.volume_entry(token)
            .map(|e| &e.volume)
            .ok_or_else(|| Error::no_such_volume(token))
    }

    pub(crate) fn snapshot(&self, token: &str) -> Result<&Snapshot> {
        self.snapshot_entry(token)
            .map(|e| &e.snapshot)
            .ok_or_else(|| Error::no_such_snapshot(token))
    }

    pub(crate) fn volumes(&self) -> impl Iterator<Item = &Volume> + '_ {
        self.volumes
            .values()
            .filter(|e| e.is_live())
            .map(|e| &e.volume)
    }

    pub(crate) fn snapshots(&self) -> impl Iterator<Item = &Snapshot> + '_ {
        self.snapshots
            .values()
            .filter(|e| e.is_live())
            .map(|e| &e.snapshot)
    }

    /// Is the id held by any record of either kind, reserved or live, or
    /// still referenced as the source of a volume?
    pub(crate) fn id_in_use(&self, id: &str) -> bool {
        self.volumes.contains_key(id)
            || self.snapshots.contains_key(id)
            || self.source_refs.contains_key(id)
    }

    fn hold_source(&mut self, source: Option<&SnapshotId>) {
        if let Some(id) = source {
            *self.source_refs.entry(id.clone()).or_default() += 1;
        }
    }

    fn release_source(&mut self, source: Option<&SnapshotId>) {
        let Some(id) = source else { return };
        if let Some(count) = self.source_refs.get_mut(id) {
            *count -= 1;
            if *count == 0 {
                self.source_refs.remove(id);
            }
        }
    }

    // === Dependency counters ===

    /// The parent record as it reads with one more live dependent
    pub(crate) fn increment_dependents(&self, id: &VolumeId) -> Result<Volume> {
        let mut volume = self.live_volume_by_id(id)?.clone();
        volume.dependent_snapshots += 1;
        Ok(volume)
    }

    /// The parent record as it reads with one fewer live dependent
    pub(crate) fn decrement_dependents(&self, id: &VolumeId) -> Result<Volume> {
        let mut volume = self.live_volume_by_id(id)?.clone();
        volume.dependent_snapshots = volume.dependent_snapshots.saturating_sub(1);
        Ok(volume)
    }

    fn live_volume_by_id(&self, id: &VolumeId) -> Result<&Volume> {
        self.volumes
            .get(id)
            .filter(|e| e.is_live())
            .map(|e| &e.volume)
            .ok_or_else(|| Error::no_such_volume(id.as_str()))
    }

    // === Reservations ===

    pub(crate) fn reserve_volume(&mut self, volume: Volume) -> Result<()> {
        if self.volume_names.contains_key(&volume.name) {
            return Err(Error::Conflict {
                kind: RecordKind::Volume,
                name: volume.name,
            });
        }

        self.hold_source(volume.source_snapshot.as_ref());
        self.volume_names
            .insert(volume.name.clone(), volume.id.clone());
        self.volumes.insert(
            volume.id.clone(),
            VolumeEntry {
                volume,
                slot: Slot::Reserved,
                pending: 0,
            },
        );
        Ok(())
    }

    pub(crate) fn reserve_snapshot(&mut self, snapshot: Snapshot) -> Result<()> {
        if self.snapshot_names.contains_key(&snapshot.name) {
            return Err(Error::Conflict {
                kind: RecordKind::Snapshot,
                name: snapshot.name,
            });
        }

        let parent = self
            .volumes
            .get_mut(&snapshot.volume)
            .filter(|e| e.is_live())
            .ok_or_else(|| Error::no_such_volume(snapshot.volume.as_str()))?;
        parent.pending += 1;

        self.snapshot_names
            .insert(snapshot.name.clone(), snapshot.id.clone());
        self.snapshots.insert(
            snapshot.id.clone(),
            SnapshotEntry {
                snapshot,
                slot: Slot::Reserved,
            },
        );
        Ok(())
    }

    /// Drop a reservation that will not be committed
    pub(crate) fn discard_volume(&mut self, id: &VolumeId) -> Option<Volume> {
        if self.volumes.get(id)?.is_live() {
            return None;
        }
        let entry = self.volumes.remove(id)?;
        self.volume_names.remove(&entry.volume.name);
        self.release_source(entry.volume.source_snapshot.as_ref());
        Some(entry.volume)
    }

    /// Drop a reservation that will not be committed, releasing the parent
    pub(crate) fn discard_snapshot(&mut self, id: &SnapshotId) -> Option<Snapshot> {
        if self.snapshots.get(id)?.is_live() {
            return None;
        }
        let entry = self.snapshots.remove(id)?;
        self.snapshot_names.remove(&entry.snapshot.name);
        if let Some(parent) = self.volumes.get_mut(&entry.snapshot.volume) {
            parent.pending = parent.pending.saturating_sub(1);
        }
        Some(entry.snapshot)
    }

    // === Staging ===

    pub(crate) fn stage_volume_commit(&self, id: &VolumeId) -> Result<Vec<Mutation>> {
        let entry = self
            .volumes
            .get(id)
            .filter(|e| !e.is_live())
            .ok_or_else(|| Error::Internal(format!("volume {} is not reserved", id)))?;
        Ok(vec![Mutation::PutVolume(entry.volume.clone())])
    }

    pub(crate) fn stage_snapshot_commit(
        &self,
        id: &SnapshotId,
        content: ContentHandle,
    ) -> Result<Vec<Mutation>> {
        let entry = self
            .snapshots
            .get(id)
            .filter(|e| !e.is_live())
            .ok_or_else(|| Error::Internal(format!("snapshot {} is not reserved", id)))?;

        let mut snapshot = entry.snapshot.clone();
        snapshot.content = Some(content);
        let parent = self.increment_dependents(&snapshot.volume)?;

        Ok(vec![
            Mutation::PutSnapshot(snapshot),
            Mutation::PutVolume(parent),
        ])
    }

    /// A volume may go only once no snapshot, live or in flight, depends on it
    pub(crate) fn stage_volume_removal(&self, token: &str) -> Result<(Volume, Vec<Mutation>)> {
        let entry = self
            .volume_entry(token)
            .ok_or_else(|| Error::no_such_volume(token))?;

        let dependents = entry.volume.dependent_snapshots + entry.pending;
        if dependents > 0 {
            return Err(Error::InvalidState {
                volume: entry.volume.name.clone(),
                dependents,
            });
        }

        Ok((
            entry.volume.clone(),
            vec![Mutation::DeleteVolume(entry.volume.id.clone())],
        ))
    }

    pub(crate) fn stage_snapshot_removal(
        &self,
        token: &str,
    ) -> Result<(Snapshot, Vec<Mutation>)> {
        let snapshot = self.snapshot(token)?.clone();
        let mut mutations = vec![Mutation::DeleteSnapshot(snapshot.id.clone())];

        match self.decrement_dependents(&snapshot.volume) {
            Ok(parent) => mutations.push(Mutation::PutVolume(parent)),
            Err(e) => tracing::warn!(
                "Snapshot {} has no parent to release: {}",
                snapshot.name,
                e
            ),
        }

        Ok((snapshot, mutations))
    }

    // === Apply ===

    pub(crate) fn apply(&mut self, mutation: Mutation) {
        match mutation {
            Mutation::PutVolume(volume) => {
                let previous = self
                    .volumes
                    .get(&volume.id)
                    .and_then(|e| e.volume.source_snapshot.clone());
                self.release_source(previous.as_ref());
                self.hold_source(volume.source_snapshot.as_ref());

                self.volume_names
                    .insert(volume.name.clone(), volume.id.clone());
                match self.volumes.get_mut(&volume.id) {
                    Some(entry) => {
                        entry.volume = volume;
                        entry.slot = Slot::Live;
                    }
                    None => {
                        self.volumes.insert(
                            volume.id.clone(),
                            VolumeEntry {
                                volume,
                                slot: Slot::Live,
                                pending: 0,
                            },
                        );
                    }
                }
            }
            Mutation::DeleteVolume(id) => {
                if let Some(entry) = self.volumes.remove(&id) {
                    self.volume_names.remove(&entry.volume.name);
                    self.release_source(entry.volume.source_snapshot.as_ref());
                }
            }
            Mutation::PutSnapshot(snapshot) => {
                let was_reserved = self
                    .snapshots
                    .get(&snapshot.id)
                    .is_some_and(|e| !e.is_live());
                if was_reserved {
                    if let Some(parent) = self.volumes.get_mut(&snapshot.volume) {
                        parent.pending = parent.pending.saturating_sub(1);
                    }
                }
                self.snapshot_names
                    .insert(snapshot.name.clone(), snapshot.id.clone());
                self.snapshots.insert(
                    snapshot.id.clone(),
                    SnapshotEntry {
                        snapshot,
                        slot: Slot::Live,
                    },
                );
            }
            Mutation::DeleteSnapshot(id) => {
                if let Some(entry) = self.snapshots.remove(&id) {
                    self.snapshot_names.remove(&entry.snapshot.name);
                }
            }
        }
    }

    /// Check every catalog invariant, panicking on the first violation
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        for (id, entry) in &self.volumes {
            assert_eq!(&entry.volume.id, id);
            assert_eq!(self.volume_names.get(&entry.volume.name), Some(id));
            if entry.is_live() {
                let live = self
                    .snapshots
                    .values()
                    .filter(|s| s.is_live() && &s.snapshot.volume == id)
                    .count() as u32;
                assert_eq!(
                    entry.volume.dependent_snapshots, live,
                    "dependent count drifted for {}",
                    entry.volume.name
                );
                let reserved = self
                    .snapshots
                    .values()
                    .filter(|s| !s.is_live() && &s.snapshot.volume == id)
                    .count() as u32;
                assert_eq!(entry.pending, reserved);
            }
        }
        for (id, entry) in &self.snapshots {
            assert_eq!(&entry.snapshot.id, id);
            assert_eq!(self.snapshot_names.get(&entry.snapshot.name), Some(id));
            assert!(
                self.volumes.contains_key(&entry.snapshot.volume),
                "snapshot {} outlived its parent",
                entry.snapshot.name
            );
        }
        let mut sources: HashMap<SnapshotId, u32> = HashMap::new();
        for entry in self.volumes.values() {
            if let Some(id) = &entry.volume.source_snapshot {
                *sources.entry(id.clone()).or_default() += 1;
            }
        }
        assert_eq!(sources, self.source_refs, "source references drifted");
        assert_eq!(self.volume_names.len(), self.volumes.len());
        assert_eq!(self.snapshot_names.len(), self.snapshots.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volume(id: &str, name: &str) -> Volume {
        Volume::new(VolumeId::new(id), name.into(), None)
    }

    fn snapshot(id: &str, name: &str, parent: &str) -> Snapshot {
        Snapshot::new(SnapshotId::new(id), name.into(), VolumeId::new(parent))
    }

    fn apply_all(state: &mut CatalogState, mutations: Vec<Mutation>) {
        for m in mutations {
            state.apply(m);
        }
    }

    fn live_snapshot(state: &mut CatalogState, s: Snapshot) {
        let id = s.id.clone();
        state.reserve_snapshot(s).unwrap();
        let staged = state
            .stage_snapshot_commit(&id, ContentHandle::new("h"))
            .unwrap();
        apply_all(state, staged);
    }

    #[test]
    fn test_id_wins_over_name() {
        let mut state = CatalogState::default();
        state.apply(Mutation::PutVolume(volume("aaa", "bbb")));
        state.apply(Mutation::PutVolume(volume("bbb", "ccc")));

        // "bbb" is both the name of the first volume and the id of the second
        assert_eq!(state.volume("bbb").unwrap().name, "ccc");
        assert_eq!(state.volume("aaa").unwrap().name, "bbb");
        assert!(state.volume("zzz").unwrap_err().is_not_found());
    }

    #[test]
    fn test_reserved_records_are_invisible() {
        let mut state = CatalogState::default();
        state.reserve_volume(volume("v1", "test")).unwrap();

        assert!(state.volume("test").is_err());
        assert!(state.volume("v1").is_err());
        assert_eq!(state.volumes().count(), 0);
        assert!(state.id_in_use("v1"));

        // but the name is taken
        let err = state.reserve_volume(volume("v2", "test")).unwrap_err();
        assert!(err.is_conflict());

        assert!(state.discard_volume(&VolumeId::new("v1")).is_some());
        assert!(state.reserve_volume(volume("v2", "test")).is_ok());
        state.assert_consistent();
    }

    #[test]
    fn test_snapshot_commit_counts_dependent() {
        let mut state = CatalogState::default();
        state.apply(Mutation::PutVolume(volume("v1", "test")));

        state.reserve_snapshot(snapshot("s1", "snap", "v1")).unwrap();
        assert_eq!(state.volume("test").unwrap().dependent_snapshots, 0);
        state.assert_consistent();

        let staged = state
            .stage_snapshot_commit(&SnapshotId::new("s1"), ContentHandle::new("h1"))
            .unwrap();
        apply_all(&mut state, staged);

        assert_eq!(state.volume("test").unwrap().dependent_snapshots, 1);
        assert_eq!(
            state.snapshot("snap").unwrap().content,
            Some(ContentHandle::new("h1"))
        );
        state.assert_consistent();
    }

    #[test]
    fn test_pending_snapshot_blocks_volume_removal() {
        let mut state = CatalogState::default();
        state.apply(Mutation::PutVolume(volume("v1", "test")));
        state.reserve_snapshot(snapshot("s1", "snap", "v1")).unwrap();

        let err = state.stage_volume_removal("test").unwrap_err();
        assert!(matches!(err, Error::InvalidState { dependents: 1, .. }));

        state.discard_snapshot(&SnapshotId::new("s1")).unwrap();
        assert!(state.stage_volume_removal("test").is_ok());
        state.assert_consistent();
    }

    #[test]
    fn test_removal_releases_parent() {
        let mut state = CatalogState::default();
        state.apply(Mutation::PutVolume(volume("v1", "test")));
        live_snapshot(&mut state, snapshot("s1", "a", "v1"));
        live_snapshot(&mut state, snapshot("s2", "b", "v1"));

        let err = state.stage_volume_removal("v1").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid volume: Volume still has 2 dependent snapshots"
        );

        let (removed, staged) = state.stage_snapshot_removal("a").unwrap();
        assert_eq!(removed.id.as_str(), "s1");
        apply_all(&mut state, staged);
        assert_eq!(state.volume("test").unwrap().dependent_snapshots, 1);
        state.assert_consistent();
    }

    #[test]
    fn test_counter_requires_live_parent() {
        let state = CatalogState::default();
        assert!(state
            .increment_dependents(&VolumeId::new("gone"))
            .unwrap_err()
            .is_not_found());
        assert!(state
            .decrement_dependents(&VolumeId::new("gone"))
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_restore_rederives_counts() {
        let mut stale = volume("v1", "test");
        stale.dependent_snapshots = 7;

        let state = CatalogState::restore(LoadedCatalog {
            volumes: vec![stale, volume("v2", "other")],
            snapshots: vec![snapshot("s1", "a", "v1"), snapshot("s2", "b", "v1")],
        })
        .unwrap();

        assert_eq!(state.volume("test").unwrap().dependent_snapshots, 2);
        assert_eq!(state.volume("other").unwrap().dependent_snapshots, 0);
        state.assert_consistent();
    }

    #[test]
    fn test_restore_rejects_dangling_parent() {
        let err = CatalogState::restore(LoadedCatalog {
            volumes: vec![],
            snapshots: vec![snapshot("s1", "a", "missing")],
        })
        .unwrap_err();
        assert!(matches!(err, Error::MetadataCorrupted(_)));
    }

    #[test]
    fn test_restore_rejects_duplicate_names() {
        let err = CatalogState::restore(LoadedCatalog {
            volumes: vec![volume("v1", "test"), volume("v2", "test")],
            snapshots: vec![],
        })
        .unwrap_err();
        assert!(matches!(err, Error::MetadataCorrupted(_)));
    }

    #[test]
    fn test_namespaces_are_separate() {
        let mut state = CatalogState::default();
        state.apply(Mutation::PutVolume(volume("v1", "shared")));
        live_snapshot(&mut state, snapshot("s1", "shared", "v1"));

        assert_eq!(state.volume("shared").unwrap().id.as_str(), "v1");
        assert_eq!(state.snapshot("shared").unwrap().id.as_str(), "s1");
        state.assert_consistent();
    }

    #[test]
    fn test_restore_holds_ids_of_removed_sources() {
        let clone = Volume::new(VolumeId::new("c1"), "c".into(), Some(SnapshotId::new("s1")));
        let mut state = CatalogState::restore(LoadedCatalog {
            volumes: vec![volume("v1", "test"), clone],
            snapshots: vec![],
        })
        .unwrap();

        assert!(state.snapshot("s1").is_err());
        assert!(state.id_in_use("s1"));
        state.assert_consistent();

        state.apply(Mutation::DeleteVolume(VolumeId::new("c1")));
        assert!(!state.id_in_use("s1"));
        state.assert_consistent();
    }
}
