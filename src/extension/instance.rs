//! Live extension instances
//!
//! An `ExtensionInstance` is a validated script object parked inside its
//! worker isolate. Typed wrappers narrow it to a category so callers get
//! category-specific methods without another runtime check.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::ops::Deref;
use std::sync::Arc;

use super::enums::StreamingServer;
use super::extractor::Extractor;
use super::models::{AnimeInfo, EpisodeServer, EpisodeSources, MediaInfo, SearchPage};
use super::types::{Category, InstanceSurface};
use super::worker::ScriptWorker;
use crate::core::error::{ReelError, Result};

/// A validated extension instance
#[derive(Debug)]
pub struct ExtensionInstance {
    id: String,
    category: Option<Category>,
    surface: InstanceSurface,
    worker: ScriptWorker,
}

impl ExtensionInstance {
    pub(crate) fn new(
        id: impl Into<String>,
        category: Option<Category>,
        surface: InstanceSurface,
        worker: ScriptWorker,
    ) -> Self {
        Self {
            id: id.into(),
            category,
            surface,
            worker,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Category from the manifest; ad-hoc loads have none
    pub fn category(&self) -> Option<Category> {
        self.category
    }

    /// Display name reported by the instance, falling back to the id
    pub fn name(&self) -> &str {
        self.surface.name.as_deref().unwrap_or(&self.id)
    }

    pub fn base_url(&self) -> Option<&str> {
        self.surface.base_url.as_deref()
    }

    pub fn logo(&self) -> Option<&str> {
        self.surface.logo.as_deref()
    }

    pub fn surface(&self) -> &InstanceSurface {
        &self.surface
    }

    pub fn has_method(&self, method: &str) -> bool {
        self.surface.has_method(method)
    }

    /// Call any method by name with JSON arguments
    pub async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        if !self.surface.has_method(method) {
            return Err(ReelError::Runtime(format!(
                "{} has no method {}",
                self.id, method
            )));
        }
        self.worker.call(method, args).await
    }

    async fn call_as<T: DeserializeOwned>(&self, method: &str, args: Vec<Value>) -> Result<T> {
        let value = self.call(method, args).await?;
        serde_json::from_value(value).map_err(|e| {
            ReelError::Serialization(format!("{}.{} returned an unexpected shape: {}", self.id, method, e))
        })
    }

    pub async fn search(&self, query: &str, page: Option<u32>) -> Result<SearchPage> {
        let mut args = vec![json!(query)];
        if let Some(page) = page {
            args.push(json!(page));
        }
        self.call_as("search", args).await
    }

    pub async fn fetch_episode_sources(
        &self,
        episode_id: &str,
        server: Option<StreamingServer>,
    ) -> Result<EpisodeSources> {
        let mut args = vec![json!(episode_id)];
        if let Some(server) = server {
            args.push(json!(server.as_str()));
        }
        self.call_as("fetchEpisodeSources", args).await
    }

    pub async fn fetch_episode_servers(&self, episode_id: &str) -> Result<Vec<EpisodeServer>> {
        self.call_as("fetchEpisodeServers", vec![json!(episode_id)]).await
    }

    /// Let the isolate reclaim memory after heavy calls
    pub async fn release_memory(&self) -> Result<()> {
        self.worker.garbage_collect().await
    }
}

/// An instance known to be an anime provider
#[derive(Debug, Clone)]
pub struct AnimeProvider(Arc<ExtensionInstance>);

impl AnimeProvider {
    pub(crate) fn new(instance: Arc<ExtensionInstance>) -> Self {
        Self(instance)
    }

    pub async fn fetch_anime_info(&self, id: &str) -> Result<AnimeInfo> {
        self.0.call_as("fetchAnimeInfo", vec![json!(id)]).await
    }

    pub fn instance(&self) -> &Arc<ExtensionInstance> {
        &self.0
    }
}

impl Deref for AnimeProvider {
    type Target = ExtensionInstance;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// An instance known to be a movie provider
#[derive(Debug, Clone)]
pub struct MovieProvider(Arc<ExtensionInstance>);

impl MovieProvider {
    pub(crate) fn new(instance: Arc<ExtensionInstance>) -> Self {
        Self(instance)
    }

    pub async fn fetch_media_info(&self, media_id: &str) -> Result<MediaInfo> {
        self.0.call_as("fetchMediaInfo", vec![json!(media_id)]).await
    }

    pub fn instance(&self) -> &Arc<ExtensionInstance> {
        &self.0
    }
}

impl Deref for MovieProvider {
    type Target = ExtensionInstance;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// A script-defined extractor
///
/// Implements `Extractor`, so a loaded script can be registered as the
/// extractor for a server in another manager.
#[derive(Debug, Clone)]
pub struct ScriptExtractor(Arc<ExtensionInstance>);

impl ScriptExtractor {
    pub(crate) fn new(instance: Arc<ExtensionInstance>) -> Self {
        Self(instance)
    }

    pub fn id(&self) -> &str {
        self.0.id()
    }

    pub fn instance(&self) -> &Arc<ExtensionInstance> {
        &self.0
    }
}

#[async_trait]
impl Extractor for ScriptExtractor {
    async fn extract(&self, url: &str) -> Result<EpisodeSources> {
        self.0.call_as("extract", vec![json!(url)]).await
    }
}
