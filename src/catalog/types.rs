//! Catalog records
//!
//! Volumes and snapshots are handed out as owned copies; the catalog store
//! keeps the only mutable instances.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

opaque_id!(
    /// Unique, immutable volume identifier
    VolumeId
);
opaque_id!(
    /// Unique, immutable snapshot identifier
    SnapshotId
);
opaque_id!(
    /// Provider-defined locator for captured snapshot content
    ContentHandle
);

/// The two record namespaces held by the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Volume,
    Snapshot,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Volume => write!(f, "volume"),
            RecordKind::Snapshot => write!(f, "snapshot"),
        }
    }
}

/// Volume record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub id: VolumeId,
    pub name: String,
    /// Snapshot this volume was cloned from, if any
    pub source_snapshot: Option<SnapshotId>,
    /// Live snapshots whose parent is this volume
    pub dependent_snapshots: u32,
    pub created_at: DateTime<Utc>,
}

impl Volume {
    pub(crate) fn new(id: VolumeId, name: String, source_snapshot: Option<SnapshotId>) -> Self {
        Self {
            id,
            name,
            source_snapshot,
            dependent_snapshots: 0,
            created_at: Utc::now(),
        }
    }
}

/// Snapshot record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: SnapshotId,
    pub name: String,
    /// Volume the snapshot was taken from
    pub volume: VolumeId,
    /// Set once the provider has captured the content
    pub content: Option<ContentHandle>,
    pub created_at: DateTime<Utc>,
}

impl Snapshot {
    pub(crate) fn new(id: SnapshotId, name: String, volume: VolumeId) -> Self {
        Self {
            id,
            name,
            volume,
            content: None,
            created_at: Utc::now(),
        }
    }
}

/// A record of either kind, as returned by the kind-generic accessors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Record {
    Volume(Volume),
    Snapshot(Snapshot),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Volume(_) => RecordKind::Volume,
            Record::Snapshot(_) => RecordKind::Snapshot,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Record::Volume(v) => v.id.as_str(),
            Record::Snapshot(s) => s.id.as_str(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Record::Volume(v) => &v.name,
            Record::Snapshot(s) => &s.name,
        }
    }
}

impl From<Volume> for Record {
    fn from(volume: Volume) -> Self {
        Record::Volume(volume)
    }
}

impl From<Snapshot> for Record {
    fn from(snapshot: Snapshot) -> Self {
        Record::Snapshot(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_ids_lookup_by_str() {
        let mut map = HashMap::new();
        map.insert(VolumeId::new("abc"), 1);
        assert_eq!(map.get("abc"), Some(&1));
        assert_eq!(VolumeId::new("abc").to_string(), "abc");
    }

    #[test]
    fn test_record_accessors() {
        let volume = Volume::new(VolumeId::new("v1"), "test".into(), None);
        let record = Record::from(volume);
        assert_eq!(record.kind(), RecordKind::Volume);
        assert_eq!(record.id(), "v1");
        assert_eq!(record.name(), "test");

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "volume");
        assert_eq!(json["name"], "test");
    }
}
