//! Edition registry: witness code to edition descriptor.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ConfigError;

const BUILTIN_EDITIONS: &str = include_str!("../editions.yaml");

/// Immutable description of one edition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edition {
    /// Unique code (`1818`, `MS`, ...).
    pub code: String,
    /// Display name.
    pub name: String,
    /// Chunk numbers this edition provides.
    #[serde(default)]
    pub chunks: BTreeSet<u32>,
}

/// Returned when no edition has the requested code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown edition code {0:?}")]
pub struct UnknownEdition(pub String);

/// Read-only lookup from edition code to [`Edition`].
#[derive(Debug, Clone, Default)]
pub struct EditionRegistry {
    editions: BTreeMap<String, Arc<Edition>>,
}

impl EditionRegistry {
    /// Builds a registry; later duplicates of a code replace earlier ones.
    pub fn new(editions: impl IntoIterator<Item = Edition>) -> Self {
        Self { editions: editions.into_iter().map(|e| (e.code.clone(), Arc::new(e))).collect() }
    }

    /// The registry shipped with the crate.
    ///
    /// # Panics
    ///
    /// Panics if the bundled `editions.yaml` is invalid, which the test
    /// suite rules out.
    #[must_use]
    pub fn builtin() -> Self {
        Self::from_yaml(BUILTIN_EDITIONS).expect("bundled editions.yaml must parse")
    }

    /// Parses a YAML list of editions.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML does not describe a list of editions, or
    /// if two entries share a code.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let editions: Vec<Edition> = serde_yaml::from_str(yaml)?;
        let mut codes = BTreeSet::new();
        if let Some(duplicate) = editions.iter().find(|e| !codes.insert(e.code.as_str())) {
            return Err(ConfigError::DuplicateEdition(duplicate.code.clone()));
        }
        Ok(Self::new(editions))
    }

    /// Loads a YAML registry file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::from_yaml(&yaml)
    }

    /// Looks up an edition by code.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownEdition`] if no edition has `code`.
    pub fn lookup(&self, code: &str) -> Result<Arc<Edition>, UnknownEdition> {
        self.editions.get(code).cloned().ok_or_else(|| UnknownEdition(code.to_string()))
    }

    /// Editions in code order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Edition>> {
        self.editions.values()
    }

    /// Editions that provide the given chunk.
    #[must_use]
    pub fn providing(&self, chunk: u32) -> Vec<Arc<Edition>> {
        self.iter().filter(|e| e.chunks.contains(&chunk)).cloned().collect()
    }

    /// Number of editions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.editions.len()
    }

    /// Returns `true` if the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.editions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_codes_are_rejected() {
        let err = EditionRegistry::from_yaml(
            "- {code: '1818', name: First}\n- {code: MS, name: Notebooks}\n- {code: '1818', name: Again}\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateEdition(ref code) if code == "1818"));
        assert_eq!(err.to_string(), "duplicate edition code \"1818\"");
    }

    #[test]
    fn builtin_registry_parses() {
        let registry = EditionRegistry::builtin();
        assert_eq!(registry.len(), 5);
        assert_eq!(registry.lookup("1818").unwrap().code, "1818");
        assert_eq!(registry.lookup("MS").unwrap().name, "Manuscript notebooks");
    }

    #[test]
    fn unknown_code_fails() {
        let registry = EditionRegistry::builtin();
        assert_eq!(registry.lookup("1999"), Err(UnknownEdition("1999".into())));
    }

    #[test]
    fn providing_filters_by_chunk() {
        let registry = EditionRegistry::from_yaml(
            "- {code: a, name: A, chunks: [1, 2]}\n- {code: b, name: B, chunks: [2]}\n- {code: c, name: C}\n",
        )
        .unwrap();
        let codes: Vec<String> = registry.providing(2).iter().map(|e| e.code.clone()).collect();
        assert_eq!(codes, vec!["a", "b"]);
        assert_eq!(registry.providing(1).len(), 1);
        assert!(registry.providing(3).is_empty());
    }

    #[test]
    fn rejects_invalid_yaml() {
        assert!(EditionRegistry::from_yaml("code: not-a-list").is_err());
    }
}
