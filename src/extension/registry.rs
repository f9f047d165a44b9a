//! Extension registry store
//!
//! Holds the static catalog of known extensions, parsed once from a registry
//! document. A broken document never prevents construction: the store just
//! comes up empty and the failure is logged.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use super::fetcher::SourceLocation;
use super::types::{Category, ExtensionManifest, RegistryDocument, RegistryMetadata};
use crate::core::config::RegistryConfig;
use crate::core::error::{ReelError, Result};

const BUNDLED_REGISTRY: &str = include_str!("../../registry/extensions.json");

/// Registry store
///
/// Manifests keep document order; the index maps ids to positions.
#[derive(Debug, Clone, Default)]
pub struct RegistryStore {
    metadata: RegistryMetadata,
    manifests: Vec<ExtensionManifest>,
    index: HashMap<String, usize>,
    /// Directory relative `main` paths are resolved against
    base_dir: Option<PathBuf>,
}

impl RegistryStore {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry document shipped with the crate
    pub fn bundled() -> Self {
        let base_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("registry");
        Self::from_document(BUNDLED_REGISTRY, Some(base_dir))
    }

    /// Registry selected by configuration: the configured file, else the bundled one
    pub fn from_config(config: &RegistryConfig) -> Self {
        match &config.path {
            Some(path) => Self::load(path),
            None => Self::bundled(),
        }
    }

    /// Read a registry document from disk
    ///
    /// Missing or malformed documents yield an empty registry.
    pub fn load(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to read registry document");
                return Self::new();
            }
        };
        Self::from_document(&text, path.parent().map(Path::to_path_buf))
    }

    /// Build a registry from document text, logging instead of failing
    pub fn from_document(text: &str, base_dir: Option<PathBuf>) -> Self {
        match Self::parse(text) {
            Ok(document) => Self::from_parsed(document, base_dir),
            Err(e) => {
                error!(error = %e, "Registry document rejected, continuing without extensions");
                Self::new()
            }
        }
    }

    /// Parse a registry document strictly
    pub fn parse(text: &str) -> Result<RegistryDocument> {
        serde_json::from_str(text).map_err(|e| ReelError::Registry(e.to_string()))
    }

    fn from_parsed(document: RegistryDocument, base_dir: Option<PathBuf>) -> Self {
        let mut store = Self {
            metadata: document.metadata,
            manifests: Vec::with_capacity(document.extensions.len()),
            index: HashMap::new(),
            base_dir,
        };

        for manifest in document.extensions {
            if manifest.id.is_empty() || manifest.main.is_empty() || manifest.factory_name.is_empty() {
                warn!(extension = %manifest.id, "Skipping manifest with empty id, main or factoryName");
                continue;
            }
            if store.index.contains_key(&manifest.id) {
                warn!(extension = %manifest.id, "Duplicate extension id, keeping the first entry");
                continue;
            }
            store.index.insert(manifest.id.clone(), store.manifests.len());
            store.manifests.push(manifest);
        }

        info!(
            registry = %store.metadata.name,
            version = %store.metadata.version,
            extensions = store.manifests.len(),
            "Registry loaded"
        );
        store
    }

    /// All manifests in document order
    pub fn get_all(&self) -> &[ExtensionManifest] {
        &self.manifests
    }

    /// Manifests of one category, in document order
    pub fn get_by_category(&self, category: Category) -> Vec<&ExtensionManifest> {
        self.manifests
            .iter()
            .filter(|m| m.category == category)
            .collect()
    }

    pub fn get_metadata(&self, id: &str) -> Option<&ExtensionManifest> {
        self.index.get(id).map(|&i| &self.manifests[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Document header
    pub fn registry_metadata(&self) -> &RegistryMetadata {
        &self.metadata
    }

    pub fn len(&self) -> usize {
        self.manifests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manifests.is_empty()
    }

    /// Source location for a manifest's `main`
    ///
    /// URLs and absolute paths pass through; relative paths are taken
    /// relative to the registry document.
    pub fn resolve_main(&self, manifest: &ExtensionManifest) -> String {
        match (SourceLocation::parse(&manifest.main), &self.base_dir) {
            (SourceLocation::Local(path), Some(base)) if path.is_relative() => {
                base.join(path).to_string_lossy().into_owned()
            }
            _ => manifest.main.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use std::io::Write;

    fn document(entries: serde_json::Value) -> String {
        json!({
            "metadata": { "name": "test-registry", "version": "1.0.0" },
            "extensions": entries
        })
        .to_string()
    }

    #[test]
    fn test_lookup_and_category_views() {
        let store = RegistryStore::from_document(
            &document(json!([
                { "id": "zoro", "category": "anime", "main": "zoro.js", "factoryName": "createZoro" },
                { "id": "flixhq", "category": "movies", "main": "flixhq.js", "factoryName": "createFlixHQ" },
                { "id": "gogo", "category": "anime", "main": "gogo.js", "factoryName": "createGogo" }
            ])),
            None,
        );

        assert_eq!(store.len(), 3);
        assert_eq!(store.registry_metadata().name, "test-registry");
        let anime: Vec<_> = store
            .get_by_category(Category::Anime)
            .into_iter()
            .map(|m| m.id.as_str())
            .collect();
        assert_eq!(anime, vec!["zoro", "gogo"]);
        assert_eq!(store.get_metadata("flixhq").unwrap().category, Category::Movies);
        assert!(store.get_metadata("nope").is_none());
        assert!(store.get_by_category(Category::Manga).is_empty());
    }

    #[test]
    fn test_malformed_document_yields_empty_registry() {
        assert!(RegistryStore::from_document("{ not json", None).is_empty());
        assert!(RegistryStore::from_document(r#"{"metadata":{}}"#, None).is_empty());
        assert!(RegistryStore::from_document(
            &document(json!([{ "id": "x", "category": "podcasts", "main": "x.js", "factoryName": "f" }])),
            None
        )
        .is_empty());
        assert!(matches!(RegistryStore::parse("[]"), Err(ReelError::Registry(_))));
    }

    #[test]
    fn test_missing_file_yields_empty_registry() {
        assert!(RegistryStore::load(Path::new("/nonexistent/extensions.json")).is_empty());
    }

    #[test]
    fn test_duplicate_ids_keep_first() {
        let store = RegistryStore::from_document(
            &document(json!([
                { "id": "dup", "category": "anime", "main": "a.js", "factoryName": "createA" },
                { "id": "dup", "category": "movies", "main": "b.js", "factoryName": "createB" }
            ])),
            None,
        );
        assert_eq!(store.len(), 1);
        assert_eq!(store.get_metadata("dup").unwrap().main, "a.js");
    }

    #[test]
    fn test_relative_main_resolves_against_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("extensions.json");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(
            document(json!([
                { "id": "local", "category": "anime", "main": "sources/local.js", "factoryName": "createLocal" },
                { "id": "remote", "category": "anime", "main": "https://cdn.example.org/r.js", "factoryName": "createRemote" }
            ]))
            .as_bytes(),
        )
        .unwrap();

        let store = RegistryStore::load(&path);
        let local = store.get_metadata("local").unwrap();
        let remote = store.get_metadata("remote").unwrap();
        assert_eq!(
            PathBuf::from(store.resolve_main(local)),
            dir.path().join("sources/local.js")
        );
        assert_eq!(store.resolve_main(remote), "https://cdn.example.org/r.js");
    }

    #[test]
    fn test_bundled_registry_parses() {
        let store = RegistryStore::bundled();
        assert!(!store.is_empty());
        for manifest in store.get_all() {
            let main = store.resolve_main(manifest);
            assert!(Path::new(&main).exists(), "missing bundled source {}", main);
        }
    }

    fn category_strategy() -> impl Strategy<Value = Category> {
        prop::sample::select(Category::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn prop_category_view_is_ordered_filter(categories in prop::collection::vec(category_strategy(), 0..24)) {
            let entries: Vec<_> = categories
                .iter()
                .enumerate()
                .map(|(i, c)| json!({
                    "id": format!("ext-{}", i),
                    "category": c.as_str(),
                    "main": format!("ext-{}.js", i),
                    "factoryName": "create"
                }))
                .collect();
            let store = RegistryStore::from_document(&document(json!(entries)), None);

            for category in Category::ALL {
                let view: Vec<&str> = store.get_by_category(category).iter().map(|m| m.id.as_str()).collect();
                let expected: Vec<&str> = store
                    .get_all()
                    .iter()
                    .filter(|m| m.category == category)
                    .map(|m| m.id.as_str())
                    .collect();
                prop_assert_eq!(view, expected);
            }
        }
    }
}
