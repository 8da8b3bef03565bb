//! Utility functions for snapvol

use crate::catalog::RecordKind;
use crate::common::{Error, Result};

/// Longest accepted volume or snapshot name
pub const MAX_NAME_LEN: usize = 255;

/// Validate a caller-supplied volume or snapshot name.
///
/// Names start with an ASCII letter or digit and continue with letters,
/// digits, `_`, `.` or `-`.
pub fn validate_name(kind: RecordKind, name: &str) -> Result<()> {
    let invalid = |reason: &str| Error::InvalidName {
        kind,
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let mut chars = name.chars();
    match chars.next() {
        None => return Err(invalid("name cannot be empty")),
        Some(c) if !c.is_ascii_alphanumeric() => {
            return Err(invalid("name must start with a letter or digit"))
        }
        Some(_) => {}
    }

    if name.len() > MAX_NAME_LEN {
        return Err(invalid("name too long (max 255 bytes)"));
    }

    if !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')) {
        return Err(invalid("only [a-zA-Z0-9_.-] are allowed"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert!(validate_name(RecordKind::Volume, "test").is_ok());
        assert!(validate_name(RecordKind::Volume, "snap-vol").is_ok());
        assert!(validate_name(RecordKind::Snapshot, "test-snap.2_b").is_ok());
        assert!(validate_name(RecordKind::Snapshot, "a").is_ok());

        assert!(validate_name(RecordKind::Volume, "").is_err());
        assert!(validate_name(RecordKind::Volume, "-lead").is_err());
        assert!(validate_name(RecordKind::Volume, "has space").is_err());
        assert!(validate_name(RecordKind::Volume, "path/like").is_err());
        assert!(validate_name(RecordKind::Volume, &"x".repeat(300)).is_err());
    }

    #[test]
    fn test_invalid_name_message() {
        let err = validate_name(RecordKind::Snapshot, "bad name").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid snapshot name \"bad name\": only [a-zA-Z0-9_.-] are allowed"
        );
    }
}
