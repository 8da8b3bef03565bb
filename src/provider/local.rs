//! Directory-tree snapshot provider
//!
//! Layout under the provider root:
//!
//! ```text
//! volumes/<volume id>/...                 volume content
//! snapshots/<snapshot id>/data/...        captured copy
//! snapshots/<snapshot id>/manifest.json   size, file count, blake3 digest
//! ```
//!
//! Restores verify the digest before anything is copied into the new volume.

use crate::catalog::{ContentHandle, Snapshot, SnapshotId, Volume, VolumeId};
use crate::common::{Error, Result};
use crate::provider::SnapshotProvider;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const VOLUMES_DIR: &str = "volumes";
const SNAPSHOTS_DIR: &str = "snapshots";
const DATA_DIR: &str = "data";
const MANIFEST: &str = "manifest.json";

/// Written next to every captured tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub snapshot_id: String,
    pub volume_id: String,
    pub file_count: u64,
    pub total_size: u64,
    pub blake3: String,
}

impl SnapshotManifest {
    fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Internal(format!("Serialize error: {}", e)))?;
        fs::write(path, json)?;
        Ok(())
    }

    fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| Error::MetadataCorrupted(format!("{}: {}", path.display(), e)))
    }
}

pub struct LocalProvider {
    root: PathBuf,
}

impl LocalProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding a volume's content
    pub fn volume_path(&self, id: &VolumeId) -> PathBuf {
        self.root.join(VOLUMES_DIR).join(id.as_str())
    }

    fn snapshot_locator(id: &SnapshotId) -> String {
        format!("{}/{}", SNAPSHOTS_DIR, id)
    }

    /// Directory holding a snapshot's captured tree and manifest
    pub fn snapshot_path(&self, snapshot: &Snapshot) -> PathBuf {
        match &snapshot.content {
            Some(handle) => self.root.join(handle.as_str()),
            None => self.root.join(Self::snapshot_locator(&snapshot.id)),
        }
    }

    pub fn read_manifest(&self, snapshot: &Snapshot) -> Result<SnapshotManifest> {
        SnapshotManifest::read(&self.snapshot_path(snapshot).join(MANIFEST))
    }
}

#[async_trait]
impl SnapshotProvider for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    async fn capture(&self, volume: &Volume, snapshot: &Snapshot) -> Result<ContentHandle> {
        let locator = Self::snapshot_locator(&snapshot.id);
        let source = self.volume_path(&volume.id);
        let dir = self.root.join(&locator);
        let (snapshot_id, volume_id) = (snapshot.id.to_string(), volume.id.to_string());

        let manifest = blocking(move || {
            let captured = capture_tree(&source, &dir, snapshot_id, volume_id);
            if captured.is_err() {
                let _ = fs::remove_dir_all(&dir);
            }
            captured
        })
        .await?;

        tracing::debug!(
            "Captured {} files ({} bytes) for snapshot {}",
            manifest.file_count,
            manifest.total_size,
            snapshot.name
        );
        Ok(ContentHandle::new(locator))
    }

    async fn restore(&self, snapshot: &Snapshot, volume: &Volume) -> Result<()> {
        if snapshot.content.is_none() {
            return Err(Error::Internal(format!(
                "snapshot {} has no captured content",
                snapshot.name
            )));
        }
        let dir = self.snapshot_path(snapshot);
        let target = self.volume_path(&volume.id);

        blocking(move || {
            let manifest = SnapshotManifest::read(&dir.join(MANIFEST))?;
            let actual = digest_tree(&dir.join(DATA_DIR))?;
            if actual != manifest.blake3 {
                return Err(Error::ChecksumMismatch {
                    expected: manifest.blake3,
                    actual,
                });
            }

            let copied = copy_tree(&dir.join(DATA_DIR), &target);
            if copied.is_err() {
                let _ = fs::remove_dir_all(&target);
            }
            copied.map(|_| ())
        })
        .await
    }

    async fn release(&self, snapshot: &Snapshot) -> Result<()> {
        remove_dir_if_exists(self.snapshot_path(snapshot)).await
    }

    async fn destroy_volume(&self, volume: &Volume) -> Result<()> {
        remove_dir_if_exists(self.volume_path(&volume.id)).await
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Internal(format!("blocking task failed: {}", e)))?
}

async fn remove_dir_if_exists(path: PathBuf) -> Result<()> {
    match tokio::fs::remove_dir_all(&path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn capture_tree(
    source: &Path,
    dir: &Path,
    snapshot_id: String,
    volume_id: String,
) -> Result<SnapshotManifest> {
    let data = dir.join(DATA_DIR);
    let (file_count, total_size) = copy_tree(source, &data)?;

    let manifest = SnapshotManifest {
        snapshot_id,
        volume_id,
        file_count,
        total_size,
        blake3: digest_tree(&data)?,
    };
    manifest.write(&dir.join(MANIFEST))?;
    Ok(manifest)
}

/// Copy regular files and directories from `src` into `dst`.
///
/// A missing `src` is an empty volume. Returns (files, bytes) copied.
fn copy_tree(src: &Path, dst: &Path) -> Result<(u64, u64)> {
    fs::create_dir_all(dst)?;
    if !src.exists() {
        return Ok((0, 0));
    }

    let mut files = 0;
    let mut bytes = 0;
    for entry in WalkDir::new(src).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        let target = dst.join(relative(src, entry.path())?);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            bytes += fs::copy(entry.path(), &target)?;
            files += 1;
        } else {
            tracing::debug!("Skipping special file {}", entry.path().display());
        }
    }

    Ok((files, bytes))
}

/// blake3 over relative paths, entry types and file contents, in name order
fn digest_tree(root: &Path) -> Result<String> {
    let mut hasher = blake3::Hasher::new();
    if root.exists() {
        for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(std::io::Error::from)?;
            let rel = relative(root, entry.path())?;
            hasher.update(rel.to_string_lossy().as_bytes());
            hasher.update(b"\0");

            if entry.file_type().is_dir() {
                hasher.update(b"d");
            } else if entry.file_type().is_file() {
                hasher.update(b"f");
                let mut file = fs::File::open(entry.path())?;
                std::io::copy(&mut file, &mut hasher)?;
            }
        }
    }
    Ok(hasher.finalize().to_hex().to_string())
}

fn relative<'a>(root: &Path, path: &'a Path) -> Result<&'a Path> {
    path.strip_prefix(root).map_err(|e| {
        Error::Internal(format!(
            "{} escaped {}: {}",
            path.display(),
            root.display(),
            e
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn volume(id: &str) -> Volume {
        Volume::new(VolumeId::new(id), id.into(), None)
    }

    fn snapshot(id: &str, parent: &str) -> Snapshot {
        Snapshot::new(SnapshotId::new(id), id.into(), VolumeId::new(parent))
    }

    fn seed(provider: &LocalProvider, id: &str) -> PathBuf {
        let path = provider.volume_path(&VolumeId::new(id));
        fs::create_dir_all(path.join("dir")).unwrap();
        fs::create_dir_all(path.join("empty")).unwrap();
        fs::write(path.join("a.txt"), "alpha").unwrap();
        fs::write(path.join("dir/b.txt"), "bravo").unwrap();
        path
    }

    #[tokio::test]
    async fn test_capture_and_restore() {
        let root = tempdir().unwrap();
        let provider = LocalProvider::new(root.path());
        seed(&provider, "v1");

        let mut snap = snapshot("s1", "v1");
        let handle = provider.capture(&volume("v1"), &snap).await.unwrap();
        assert_eq!(handle.as_str(), "snapshots/s1");
        snap.content = Some(handle);

        let manifest = provider.read_manifest(&snap).unwrap();
        assert_eq!(manifest.file_count, 2);
        assert_eq!(manifest.total_size, 10);
        assert_eq!(manifest.volume_id, "v1");

        // later writes to the source do not leak into the snapshot
        fs::write(provider.volume_path(&VolumeId::new("v1")).join("a.txt"), "changed").unwrap();

        provider.restore(&snap, &volume("v2")).await.unwrap();
        let restored = provider.volume_path(&VolumeId::new("v2"));
        assert_eq!(fs::read_to_string(restored.join("a.txt")).unwrap(), "alpha");
        assert_eq!(fs::read_to_string(restored.join("dir/b.txt")).unwrap(), "bravo");
        assert!(restored.join("empty").is_dir());
    }

    #[tokio::test]
    async fn test_capture_missing_volume_dir_is_empty() {
        let root = tempdir().unwrap();
        let provider = LocalProvider::new(root.path());

        let mut snap = snapshot("s1", "v1");
        snap.content = Some(provider.capture(&volume("v1"), &snap).await.unwrap());
        assert_eq!(provider.read_manifest(&snap).unwrap().file_count, 0);

        provider.restore(&snap, &volume("v2")).await.unwrap();
        assert!(provider.volume_path(&VolumeId::new("v2")).is_dir());
    }

    #[tokio::test]
    async fn test_restore_detects_tampering() {
        let root = tempdir().unwrap();
        let provider = LocalProvider::new(root.path());
        seed(&provider, "v1");

        let mut snap = snapshot("s1", "v1");
        snap.content = Some(provider.capture(&volume("v1"), &snap).await.unwrap());
        fs::write(provider.snapshot_path(&snap).join("data/a.txt"), "tampered").unwrap();

        let err = provider.restore(&snap, &volume("v2")).await.unwrap_err();
        assert!(matches!(err, Error::ChecksumMismatch { .. }));
        assert!(!provider.volume_path(&VolumeId::new("v2")).exists());
    }

    #[tokio::test]
    async fn test_restore_without_content_fails() {
        let root = tempdir().unwrap();
        let provider = LocalProvider::new(root.path());
        assert!(provider
            .restore(&snapshot("s1", "v1"), &volume("v2"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_release_and_destroy() {
        let root = tempdir().unwrap();
        let provider = LocalProvider::new(root.path());
        let volume_dir = seed(&provider, "v1");

        let mut snap = snapshot("s1", "v1");
        snap.content = Some(provider.capture(&volume("v1"), &snap).await.unwrap());
        let snapshot_dir = provider.snapshot_path(&snap);
        assert!(snapshot_dir.exists());

        provider.release(&snap).await.unwrap();
        assert!(!snapshot_dir.exists());
        // releasing twice is fine
        provider.release(&snap).await.unwrap();

        provider.destroy_volume(&volume("v1")).await.unwrap();
        assert!(!volume_dir.exists());
    }
}
