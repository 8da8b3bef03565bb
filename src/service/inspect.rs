//! Multi-token inspection
//!
//! Each token is resolved independently; a failure is recorded against its
//! token and the remaining tokens are still resolved.

use crate::common::{Error, Result};

/// Outcome for one requested token
#[derive(Debug)]
pub struct InspectEntry<T> {
    pub token: String,
    pub outcome: Result<T>,
}

/// Per-token outcomes, in the order the tokens were given
#[derive(Debug)]
pub struct InspectReport<T> {
    entries: Vec<InspectEntry<T>>,
}

impl<T> InspectReport<T> {
    pub(crate) fn resolve<I, F>(tokens: I, mut lookup: F) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        F: FnMut(&str) -> Result<T>,
    {
        let entries = tokens
            .into_iter()
            .map(|token| {
                let token = token.as_ref();
                InspectEntry {
                    token: token.to_string(),
                    outcome: lookup(token),
                }
            })
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[InspectEntry<T>] {
        &self.entries
    }

    /// Successfully resolved records, in request order
    pub fn records(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().filter_map(|e| e.outcome.as_ref().ok())
    }

    /// Per-token failures, in request order
    pub fn errors(&self) -> impl Iterator<Item = &Error> {
        self.entries.iter().filter_map(|e| e.outcome.as_ref().err())
    }

    /// True only if every token resolved
    pub fn is_success(&self) -> bool {
        self.entries.iter().all(|e| e.outcome.is_ok())
    }

    pub fn into_parts(self) -> (Vec<T>, Vec<Error>) {
        let mut records = Vec::new();
        let mut errors = Vec::new();
        for entry in self.entries {
            match entry.outcome {
                Ok(record) => records.push(record),
                Err(e) => errors.push(e),
            }
        }
        (records, errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(token: &str) -> Result<String> {
        match token {
            "missing" => Err(Error::no_such_snapshot(token)),
            other => Ok(other.to_uppercase()),
        }
    }

    #[test]
    fn test_partial_failure_keeps_order() {
        let report = InspectReport::resolve(["a", "b", "missing", "c"], lookup);

        assert!(!report.is_success());
        assert_eq!(
            report.records().cloned().collect::<Vec<_>>(),
            vec!["A", "B", "C"]
        );
        let errors: Vec<String> = report.errors().map(|e| e.to_string()).collect();
        assert_eq!(errors, vec!["No such snapshot: missing"]);
        assert_eq!(report.entries()[2].token, "missing");

        let (records, errors) = report.into_parts();
        assert_eq!(records.len(), 3);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_all_resolved() {
        let report = InspectReport::resolve(vec!["x".to_string()], lookup);
        assert!(report.is_success());
        assert_eq!(report.errors().count(), 0);
    }

    #[test]
    fn test_no_tokens_is_success() {
        let report = InspectReport::resolve(Vec::<&str>::new(), lookup);
        assert!(report.is_success());
        assert!(report.entries().is_empty());
    }
}
