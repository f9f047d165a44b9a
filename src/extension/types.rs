//! Extension type definitions
//!
//! Manifests and registry documents as they appear on disk, the lifecycle
//! states an extension id moves through, and the method surface a loaded
//! instance reports back from its script.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::core::error::{ReelError, Result};

/// Unique identifier for an extension
pub type ExtensionId = String;

/// Content category an extension serves
///
/// The category decides which methods an instance must expose:
/// - Anime: adds `fetchAnimeInfo`
/// - Movies: adds `fetchMediaInfo`
/// - Manga, LightNovels, Meta: universal methods only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Anime,
    Movies,
    Manga,
    LightNovels,
    Meta,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Anime,
        Category::Movies,
        Category::Manga,
        Category::LightNovels,
        Category::Meta,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Anime => "anime",
            Category::Movies => "movies",
            Category::Manga => "manga",
            Category::LightNovels => "light-novels",
            Category::Meta => "meta",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ReelError;

    fn from_str(s: &str) -> Result<Self> {
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ReelError::Registry(format!("unknown category: {}", s)))
    }
}

/// Maintenance status advertised by the registry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtensionStatus {
    Working,
    Broken,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Static descriptor of one extension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionManifest {
    /// Unique key within a registry
    pub id: ExtensionId,

    /// Display name
    #[serde(default)]
    pub name: String,

    pub category: Category,

    /// URL or path of the source text
    pub main: String,

    /// Identifier of the constructor function inside the source
    pub factory_name: String,

    #[serde(default)]
    pub status: ExtensionStatus,

    /// Extension version (informational)
    #[serde(default)]
    pub version: Option<String>,

    /// Settings schema, passed through untouched
    #[serde(default)]
    pub settings: Option<Value>,

    /// Oldest host version able to run this extension
    #[serde(default)]
    pub min_host_version: Option<String>,

    /// Newest host version able to run this extension
    #[serde(default)]
    pub max_host_version: Option<String>,
}

impl ExtensionManifest {
    pub fn new(
        id: impl Into<String>,
        category: Category,
        main: impl Into<String>,
        factory_name: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            category,
            main: main.into(),
            factory_name: factory_name.into(),
            status: ExtensionStatus::Unknown,
            version: None,
            settings: None,
            min_host_version: None,
            max_host_version: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_host_bounds(mut self, min: Option<&str>, max: Option<&str>) -> Self {
        self.min_host_version = min.map(str::to_string);
        self.max_host_version = max.map(str::to_string);
        self
    }

    /// Name to show for this extension, falling back to its id
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    /// Check the manifest's host version bounds against `host`
    pub fn check_host_version(&self, host: &semver::Version) -> Result<()> {
        let mut comparators = Vec::new();
        if let Some(min) = &self.min_host_version {
            comparators.push(format!(">={}", min));
        }
        if let Some(max) = &self.max_host_version {
            comparators.push(format!("<={}", max));
        }
        if comparators.is_empty() {
            return Ok(());
        }

        let required = comparators.join(", ");
        let req = semver::VersionReq::parse(&required).map_err(|e| {
            ReelError::Registry(format!("invalid host version bounds for {}: {}", self.id, e))
        })?;

        if req.matches(host) {
            Ok(())
        } else {
            Err(ReelError::Incompatible {
                id: self.id.clone(),
                required,
                running: host.to_string(),
            })
        }
    }
}

/// Descriptive header of a registry document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Registry document: `{ metadata, extensions: [...] }`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryDocument {
    #[serde(default)]
    pub metadata: RegistryMetadata,
    pub extensions: Vec<ExtensionManifest>,
}

/// Lifecycle of one extension id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionState {
    /// Not present in the registry and never loaded
    Unregistered,
    /// Manifest known, nothing loaded yet
    Registered,
    /// Source text is being retrieved
    Fetching,
    /// Source evaluated and factory resolved
    Sandboxed,
    /// Factory returned an instance
    Instantiated,
    /// Instance passed its method checks
    Validated,
    /// Instance is live in the cache
    Cached,
    FetchFailed,
    EvalFailed,
    ValidationFailed,
}

impl ExtensionState {
    /// Terminal failure of the last load attempt
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            ExtensionState::FetchFailed
                | ExtensionState::EvalFailed
                | ExtensionState::ValidationFailed
        )
    }

    /// Failure state matching an error raised by the load pipeline
    pub fn from_error(err: &ReelError) -> Self {
        match err {
            ReelError::Fetch { .. } | ReelError::Io(_) | ReelError::Network(_) => {
                ExtensionState::FetchFailed
            }
            ReelError::Validation(_) => ExtensionState::ValidationFailed,
            _ => ExtensionState::EvalFailed,
        }
    }
}

impl fmt::Display for ExtensionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExtensionState::Unregistered => "unregistered",
            ExtensionState::Registered => "registered",
            ExtensionState::Fetching => "fetching",
            ExtensionState::Sandboxed => "sandboxed",
            ExtensionState::Instantiated => "instantiated",
            ExtensionState::Validated => "validated",
            ExtensionState::Cached => "cached",
            ExtensionState::FetchFailed => "fetch_failed",
            ExtensionState::EvalFailed => "eval_failed",
            ExtensionState::ValidationFailed => "validation_failed",
        };
        f.write_str(s)
    }
}

/// Method surface and descriptive fields of a live script instance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSurface {
    /// Callable members, own and inherited
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(default)]
    pub class_path: Option<String>,
}

impl InstanceSurface {
    pub fn has_method(&self, method: &str) -> bool {
        self.methods.iter().any(|m| m == method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_wire_names() {
        assert_eq!(serde_json::to_string(&Category::LightNovels).unwrap(), "\"light-novels\"");
        assert_eq!("movies".parse::<Category>().unwrap(), Category::Movies);
        assert!("tv".parse::<Category>().is_err());
    }

    #[test]
    fn test_manifest_minimal_fields() {
        let manifest: ExtensionManifest = serde_json::from_value(serde_json::json!({
            "id": "demo-anime",
            "category": "anime",
            "main": "https://cdn.example.org/demo.js",
            "factoryName": "createDemo"
        }))
        .unwrap();

        assert_eq!(manifest.display_name(), "demo-anime");
        assert_eq!(manifest.status, ExtensionStatus::Unknown);
        assert!(manifest.settings.is_none());
    }

    #[test]
    fn test_unknown_status_is_lenient() {
        let status: ExtensionStatus = serde_json::from_str("\"deprecated\"").unwrap();
        assert_eq!(status, ExtensionStatus::Unknown);
    }

    #[test]
    fn test_host_version_bounds() {
        let host = semver::Version::new(0, 4, 0);
        let open = ExtensionManifest::new("a", Category::Anime, "a.js", "createA");
        assert!(open.check_host_version(&host).is_ok());

        let inside = open.clone().with_host_bounds(Some("0.3.0"), Some("0.5.0"));
        assert!(inside.check_host_version(&host).is_ok());

        let too_new = open.clone().with_host_bounds(Some("1.0.0"), None);
        assert!(matches!(
            too_new.check_host_version(&host),
            Err(ReelError::Incompatible { .. })
        ));

        let garbage = open.with_host_bounds(Some("soon"), None);
        assert!(matches!(garbage.check_host_version(&host), Err(ReelError::Registry(_))));
    }

    #[test]
    fn test_state_from_error() {
        let err = ReelError::Validation("missing search".into());
        assert_eq!(ExtensionState::from_error(&err), ExtensionState::ValidationFailed);
        assert!(ExtensionState::from_error(&ReelError::Eval("boom".into())).is_failure());
        assert!(!ExtensionState::Cached.is_failure());
    }
}
