//! Error types for snapvol

use crate::catalog::RecordKind;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Catalog Errors ===
    #[error("No such {kind}: {token}")]
    NotFound { kind: RecordKind, token: String },

    #[error("conflict {kind} name({name}) is already assigned")]
    Conflict { kind: RecordKind, name: String },

    #[error("Invalid volume: Volume still has {dependents} dependent snapshots")]
    InvalidState { volume: String, dependents: u32 },

    #[error("Invalid {kind} name {name:?}: {reason}")]
    InvalidName {
        kind: RecordKind,
        name: String,
        reason: String,
    },

    // === Provider Errors ===
    #[error("Snapshot provider failed to {op}: {reason}")]
    ProviderFailure { op: &'static str, reason: String },

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    // === Metadata Errors ===
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    #[error("Metadata corrupted: {0}")]
    MetadataCorrupted(String),

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Generic ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn no_such_volume(token: impl Into<String>) -> Self {
        Error::NotFound {
            kind: RecordKind::Volume,
            token: token.into(),
        }
    }

    pub fn no_such_snapshot(token: impl Into<String>) -> Self {
        Error::NotFound {
            kind: RecordKind::Snapshot,
            token: token.into(),
        }
    }

    /// Wrap a failure raised by the snapshot provider.
    ///
    /// Errors that already carry the provider context are passed through.
    pub fn provider(op: &'static str, err: Error) -> Self {
        match err {
            Error::ProviderFailure { .. } => err,
            other => Error::ProviderFailure {
                op,
                reason: other.to_string(),
            },
        }
    }

    /// Did the name or id fail to resolve?
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Was a name already taken?
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::InvalidConfig(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_messages_are_stable() {
        assert_eq!(
            Error::no_such_snapshot("doesntexist").to_string(),
            "No such snapshot: doesntexist"
        );
        assert_eq!(
            Error::no_such_volume("vol").to_string(),
            "No such volume: vol"
        );
        assert_eq!(
            Error::Conflict {
                kind: RecordKind::Snapshot,
                name: "test-snap".into()
            }
            .to_string(),
            "conflict snapshot name(test-snap) is already assigned"
        );
        assert_eq!(
            Error::InvalidState {
                volume: "test".into(),
                dependents: 1
            }
            .to_string(),
            "Invalid volume: Volume still has 1 dependent snapshots"
        );
    }

    #[test]
    fn test_provider_wrapping() {
        let err = Error::provider("capture", Error::Internal("disk full".into()));
        assert_eq!(
            err.to_string(),
            "Snapshot provider failed to capture: Internal error: disk full"
        );

        // Already wrapped errors keep their original operation
        let again = Error::provider("release", err);
        assert!(matches!(
            again,
            Error::ProviderFailure { op: "capture", .. }
        ));
    }

    #[test]
    fn test_predicates() {
        assert!(Error::no_such_volume("x").is_not_found());
        assert!(!Error::no_such_volume("x").is_conflict());
        assert!(Error::Conflict {
            kind: RecordKind::Volume,
            name: "x".into()
        }
        .is_conflict());
    }
}
