//! Identity generation for volumes and snapshots

use uuid::Uuid;

/// Produces opaque identifiers for new records.
///
/// The catalog re-draws an id that is already held by a live or reserved
/// record, so generators only need to be unique with high probability.
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Random 128-bit ids rendered as 32 lowercase hex characters
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIds;

impl IdGenerator for RandomIds {
    fn generate(&self) -> String {
        Uuid::new_v4().simple().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_random_ids_format() {
        let id = RandomIds.generate();
        assert_eq!(id.len(), 32);
        assert!(id
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn test_random_ids_unique() {
        let ids: HashSet<String> = (0..1000).map(|_| RandomIds.generate()).collect();
        assert_eq!(ids.len(), 1000);
    }
}
