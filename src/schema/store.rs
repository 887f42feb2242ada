//! Locating and loading per-component schema documents.

use super::SchemaComponent;
use crate::error::{ExtractError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Source of schema documents, one per component.
///
/// Documents registered in memory take precedence; otherwise the store looks
/// for `<name>.json` and then `<name>.schema.json` in its directory. The store
/// is immutable once built, so it can be shared across documents freely.
#[derive(Debug, Clone, Default)]
pub struct SchemaStore {
    dir: Option<PathBuf>,
    documents: HashMap<String, Value>,
}

impl SchemaStore {
    /// A store backed by a directory of schema files.
    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            documents: HashMap::new(),
        }
    }

    /// An empty in-memory store.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Register a document for `name`.
    pub fn with_document(mut self, name: impl Into<String>, document: Value) -> Self {
        self.documents.insert(name.into(), document);
        self
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    fn candidate_paths(&self, name: &str) -> Vec<PathBuf> {
        match &self.dir {
            Some(dir) => vec![
                dir.join(format!("{}.json", name)),
                dir.join(format!("{}.schema.json", name)),
            ],
            None => Vec::new(),
        }
    }

    /// Load and build the component called `name`.
    ///
    /// Any failure to find, read or parse the document is a
    /// [`ExtractError::Setup`].
    pub fn load(&self, name: &str) -> Result<Arc<SchemaComponent>> {
        if let Some(doc) = self.documents.get(name) {
            return SchemaComponent::from_document(name, doc.clone()).map(Arc::new);
        }

        let candidates = self.candidate_paths(name);
        let Some(path) = candidates.iter().find(|p| p.is_file()) else {
            let searched = match &self.dir {
                Some(dir) => format!("not found in {}", dir.display()),
                None => "no schema directory configured".to_string(),
            };
            return Err(ExtractError::setup(name, searched));
        };

        debug!(component = name, path = %path.display(), "loading schema document");
        let text = std::fs::read_to_string(path)
            .map_err(|e| ExtractError::setup(name, format!("{}: {}", path.display(), e)))?;
        let document: Value = serde_json::from_str(&text)
            .map_err(|e| ExtractError::setup(name, format!("{}: {}", path.display(), e)))?;
        SchemaComponent::from_document(name, document).map(Arc::new)
    }

    /// Load every named component, failing on the first that cannot be loaded.
    pub fn load_all<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<Arc<SchemaComponent>>> {
        names.iter().map(|n| self.load(n.as_ref())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::pericardium_schema;
    use std::fs;

    #[test]
    fn test_loads_plain_and_schema_suffixed_files() {
        let dir = tempfile::tempdir().unwrap();
        let doc = pericardium_schema().to_string();
        fs::write(dir.path().join("Pericardium.json"), &doc).unwrap();
        fs::write(dir.path().join("Aorta.schema.json"), &doc).unwrap();

        let store = SchemaStore::from_dir(dir.path());
        assert_eq!(store.load("Pericardium").unwrap().name(), "Pericardium");
        assert_eq!(store.load("Aorta").unwrap().fields().len(), 2);
    }

    #[test]
    fn test_missing_document_is_setup_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = SchemaStore::from_dir(dir.path());
        match store.load("LeftAtrium") {
            Err(ExtractError::Setup { component, message }) => {
                assert_eq!(component, "LeftAtrium");
                assert!(message.contains("not found"));
            }
            other => panic!("expected setup error, got {other:?}"),
        }
    }

    #[test]
    fn test_unparseable_document_is_setup_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("IVC.json"), "{ not json").unwrap();
        let store = SchemaStore::from_dir(dir.path());
        assert!(matches!(store.load("IVC"), Err(ExtractError::Setup { .. })));
    }

    #[test]
    fn test_in_memory_documents_take_precedence() {
        let store = SchemaStore::in_memory().with_document("Pericardium", pericardium_schema());
        assert!(store.load("Pericardium").is_ok());
        assert!(matches!(store.load("PFO"), Err(ExtractError::Setup { .. })));
    }

    #[test]
    fn test_load_all_stops_at_first_missing() {
        let store = SchemaStore::in_memory().with_document("Pericardium", pericardium_schema());
        let err = store.load_all(&["Pericardium", "VSD"]).unwrap_err();
        assert!(err.to_string().contains("VSD"));
    }
}
