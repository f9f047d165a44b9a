//! Extension manager
//!
//! Public entry point of the runtime. Owns the registry, the shared context
//! pieces, the instance cache and the per-id load state, and runs the load
//! pipeline: fetch, sandbox, instantiate, validate, cache.

use futures::future::join_all;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::cache::ExtensionCache;
use super::context::{ContextKind, NativeBridge, NoNativeBridge, ProviderContext};
use super::enums::StreamingServer;
use super::extractor::{ExtractorFactory, ExtractorRegistry};
use super::fetcher::CodeFetcher;
use super::http::HttpClient;
use super::instance::{AnimeProvider, ExtensionInstance, MovieProvider, ScriptExtractor};
use super::models::{ProviderSearch, SearchPage};
use super::registry::RegistryStore;
use super::types::{Category, ExtensionManifest, ExtensionState};
use super::validator::{self, ValidationMode};
use super::worker::{ScriptWorker, WorkerSpec};
use crate::core::config::Config;
use crate::core::error::{ReelError, Result};

/// Where the source text of a load comes from
enum SourceInput {
    /// URL or path, retrieved by the code fetcher
    Location(String),
    /// Source text handed in directly
    Inline(String),
}

/// One run of the load pipeline
struct LoadRequest {
    id: String,
    source: SourceInput,
    factory_name: String,
    category: Option<Category>,
    kind: ContextKind,
    mode: ValidationMode,
}

/// Builder for [`ExtensionManager`]
pub struct ExtensionManagerBuilder {
    config: Config,
    registry: Option<RegistryStore>,
    extractors: ExtractorRegistry,
    native: Arc<dyn NativeBridge>,
}

impl ExtensionManagerBuilder {
    /// Use this registry instead of the configured one
    pub fn registry(mut self, registry: RegistryStore) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Register a host extractor for a streaming server
    pub fn extractor(mut self, server: StreamingServer, factory: ExtractorFactory) -> Self {
        self.extractors.register(server, factory);
        self
    }

    pub fn native_bridge(mut self, bridge: Arc<dyn NativeBridge>) -> Self {
        self.native = bridge;
        self
    }

    pub fn build(self) -> Result<ExtensionManager> {
        let host_version = semver::Version::parse(crate::VERSION)
            .map_err(|e| ReelError::Config(format!("invalid host version {}: {}", crate::VERSION, e)))?;
        let http = HttpClient::new(&self.config.http)?;
        let registry = self
            .registry
            .unwrap_or_else(|| RegistryStore::from_config(&self.config.registry));

        let states = registry
            .get_all()
            .iter()
            .map(|m| (m.id.clone(), ExtensionState::Registered))
            .collect();

        info!(
            extensions = registry.len(),
            extractors = self.extractors.len(),
            validation = self.config.runtime.validation.as_str(),
            "Extension manager ready"
        );

        Ok(ExtensionManager {
            fetcher: CodeFetcher::new(http.clone()),
            context: ProviderContext::new(http, self.extractors, self.native),
            registry,
            cache: ExtensionCache::new(),
            states: RwLock::new(states),
            host_version,
            config: self.config,
        })
    }
}

/// Loads, caches and hands out extension instances
pub struct ExtensionManager {
    config: Config,
    registry: RegistryStore,
    fetcher: CodeFetcher,
    context: ProviderContext,
    cache: ExtensionCache<ExtensionInstance>,
    states: RwLock<HashMap<String, ExtensionState>>,
    host_version: semver::Version,
}

impl ExtensionManager {
    pub fn builder(config: Config) -> ExtensionManagerBuilder {
        ExtensionManagerBuilder {
            config,
            registry: None,
            extractors: ExtractorRegistry::new(),
            native: Arc::new(NoNativeBridge),
        }
    }

    /// Manager with the configured registry and no host extractors
    pub fn new(config: Config) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &RegistryStore {
        &self.registry
    }

    pub fn context(&self) -> &ProviderContext {
        &self.context
    }

    pub fn get_available_extensions(&self) -> &[ExtensionManifest] {
        self.registry.get_all()
    }

    pub fn get_extensions_by_category(&self, category: Category) -> Vec<&ExtensionManifest> {
        self.registry.get_by_category(category)
    }

    pub fn get_extension_metadata(&self, id: &str) -> Option<&ExtensionManifest> {
        self.registry.get_metadata(id)
    }

    /// Where an id stands in its load lifecycle
    pub fn extension_state(&self, id: &str) -> ExtensionState {
        self.states
            .read()
            .get(id)
            .copied()
            .unwrap_or(ExtensionState::Unregistered)
    }

    fn set_state(&self, id: &str, state: ExtensionState) {
        debug!(extension = %id, state = %state, "Extension state");
        self.states.write().insert(id.to_string(), state);
    }

    /// Load a registry extension, or return the cached instance
    pub async fn load_extension(&self, id: &str) -> Result<Arc<ExtensionInstance>> {
        let manifest = self
            .registry
            .get_metadata(id)
            .ok_or_else(|| ReelError::NotFound(id.to_string()))?;

        if let Some(instance) = self.cache.get(id) {
            debug!(extension = %id, "Extension cache hit");
            return Ok(instance);
        }

        manifest.check_host_version(&self.host_version)?;

        let request = LoadRequest {
            id: manifest.id.clone(),
            source: SourceInput::Location(self.registry.resolve_main(manifest)),
            factory_name: manifest.factory_name.clone(),
            category: Some(manifest.category),
            kind: ContextKind::Provider,
            mode: ValidationMode::Strict,
        };
        self.cache.get_or_load(id, || self.run_pipeline(request)).await
    }

    /// Load a registry extension as an anime provider
    pub async fn get_anime_provider(&self, id: &str) -> Result<AnimeProvider> {
        self.expect_category(id, Category::Anime)?;
        Ok(AnimeProvider::new(self.load_extension(id).await?))
    }

    /// Load a registry extension as a movie provider
    pub async fn get_movie_provider(&self, id: &str) -> Result<MovieProvider> {
        self.expect_category(id, Category::Movies)?;
        Ok(MovieProvider::new(self.load_extension(id).await?))
    }

    fn expect_category(&self, id: &str, expected: Category) -> Result<()> {
        let manifest = self
            .registry
            .get_metadata(id)
            .ok_or_else(|| ReelError::NotFound(id.to_string()))?;
        if manifest.category != expected {
            return Err(ReelError::CategoryMismatch {
                id: id.to_string(),
                expected,
                actual: manifest.category,
            });
        }
        Ok(())
    }

    /// Load provider source text directly, bypassing the registry
    ///
    /// Without an id, one is derived from the code and factory name, so the
    /// same code is only evaluated once. Ids of registry extensions are
    /// refused, so an inline load never stands in for a manifest-checked one.
    /// Missing universal methods are
    /// tolerated with a warning when the manager runs in permissive mode.
    pub async fn load_provider_code(
        &self,
        code: &str,
        factory_name: &str,
        id: Option<&str>,
    ) -> Result<Arc<ExtensionInstance>> {
        let id = id
            .map(str::to_string)
            .unwrap_or_else(|| adhoc_id(code, factory_name));
        if self.registry.contains(&id) {
            return Err(ReelError::Registry(format!(
                "{} belongs to a registry extension and cannot be loaded from inline code",
                id
            )));
        }

        let request = LoadRequest {
            id: id.clone(),
            source: SourceInput::Inline(code.to_string()),
            factory_name: factory_name.to_string(),
            category: None,
            kind: ContextKind::Provider,
            mode: self.config.runtime.validation,
        };
        self.cache.get_or_load(&id, || self.run_pipeline(request)).await
    }

    /// Load extractor source text against the extractor context
    pub async fn load_extractor_code(
        &self,
        code: &str,
        factory_name: &str,
        id: Option<&str>,
    ) -> Result<ScriptExtractor> {
        let id = id
            .map(str::to_string)
            .unwrap_or_else(|| adhoc_id(code, factory_name));
        let key = format!("extractor:{}", id);

        let request = LoadRequest {
            id: key.clone(),
            source: SourceInput::Inline(code.to_string()),
            factory_name: factory_name.to_string(),
            category: None,
            kind: ContextKind::Extractor,
            mode: ValidationMode::Strict,
        };
        let instance = self.cache.get_or_load(&key, || self.run_pipeline(request)).await?;
        Ok(ScriptExtractor::new(instance))
    }

    /// Search every provider of a category concurrently
    ///
    /// Returns one entry per provider in registry order. A provider that
    /// fails to load or to search contributes an empty page.
    pub async fn search_across_providers(
        &self,
        category: Category,
        query: &str,
        page: Option<u32>,
    ) -> Vec<ProviderSearch> {
        let searches = self.registry.get_by_category(category).into_iter().map(|manifest| {
            let id = manifest.id.clone();
            async move {
                let outcome = match self.load_extension(&id).await {
                    Ok(instance) => instance.search(query, page).await,
                    Err(e) => Err(e),
                };
                let results = outcome.unwrap_or_else(|e| {
                    warn!(extension = %id, error = %e, "Provider search failed");
                    SearchPage::empty()
                });
                ProviderSearch {
                    extension_id: id,
                    results,
                }
            }
        });

        join_all(searches).await
    }

    /// Drop the cached instance for an id
    ///
    /// Returns whether an instance was cached. The next load runs the whole
    /// pipeline again.
    pub fn evict(&self, id: &str) -> bool {
        let evicted = self.cache.evict(id).is_some();
        if evicted {
            let state = if self.registry.contains(id) {
                ExtensionState::Registered
            } else {
                ExtensionState::Unregistered
            };
            self.set_state(id, state);
            info!(extension = %id, "Extension evicted");
        }
        evicted
    }

    /// Drop every cached instance
    pub fn clear(&self) {
        self.cache.clear();
        let mut states = self.states.write();
        states.clear();
        for manifest in self.registry.get_all() {
            states.insert(manifest.id.clone(), ExtensionState::Registered);
        }
        info!("Extension cache cleared");
    }

    /// Ids of every live instance, extractors included
    pub fn loaded_extensions(&self) -> Vec<String> {
        self.cache.ids()
    }

    async fn run_pipeline(&self, request: LoadRequest) -> Result<Arc<ExtensionInstance>> {
        let id = request.id.clone();
        match self.pipeline(request).await {
            Ok(instance) => {
                self.set_state(&id, ExtensionState::Cached);
                info!(extension = %id, name = %instance.name(), "Extension loaded");
                Ok(instance)
            }
            Err(e) => {
                self.set_state(&id, ExtensionState::from_error(&e));
                warn!(extension = %id, error = %e, error_type = e.error_type(), "Extension load failed");
                Err(e)
            }
        }
    }

    async fn pipeline(&self, request: LoadRequest) -> Result<Arc<ExtensionInstance>> {
        let LoadRequest {
            id,
            source,
            factory_name,
            category,
            kind,
            mode,
        } = request;

        self.set_state(&id, ExtensionState::Fetching);
        let code = match source {
            SourceInput::Location(location) => self.fetcher.fetch(&location).await?,
            SourceInput::Inline(code) => code,
        };

        let worker = ScriptWorker::spawn(WorkerSpec {
            extension_id: id.clone(),
            kind,
            context: self.context.clone(),
            source: code,
            factory_name,
            stack_size: self.config.runtime.worker_stack_size,
            channel_capacity: self.config.runtime.channel_capacity,
        })
        .await?;
        self.set_state(&id, ExtensionState::Sandboxed);

        let surface = worker.instantiate().await?;
        self.set_state(&id, ExtensionState::Instantiated);

        match kind {
            ContextKind::Provider => validator::validate_provider(&id, &surface, category, mode)?,
            ContextKind::Extractor => validator::validate_extractor(&id, &surface)?,
        }
        self.set_state(&id, ExtensionState::Validated);

        Ok(Arc::new(ExtensionInstance::new(id, category, surface, worker)))
    }
}

/// Stable id for code loaded without one
fn adhoc_id(code: &str, factory_name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    hasher.update([0u8]);
    hasher.update(factory_name.as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().take(6).map(|b| format!("{:02x}", b)).collect();
    format!("adhoc-{}", hex)
}
