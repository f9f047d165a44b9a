//! Stream extractors
//!
//! An extractor turns an embed url on a known video host into playable
//! sources. Providers never construct them directly; they reach them through
//! `ctx.extractors`, which routes back to the registry here.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::context::ExtractorContext;
use super::enums::StreamingServer;
use super::models::EpisodeSources;
use crate::core::error::{ReelError, Result};

/// Resolves an embed url to playable sources
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, url: &str) -> Result<EpisodeSources>;
}

/// Builds an extractor bound to an extractor context
pub type ExtractorFactory = Arc<dyn Fn(&ExtractorContext) -> Arc<dyn Extractor> + Send + Sync>;

/// Extractor factories keyed by streaming server
#[derive(Clone, Default)]
pub struct ExtractorRegistry {
    factories: HashMap<StreamingServer, ExtractorFactory>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory, replacing any previous one for the server
    pub fn register(&mut self, server: StreamingServer, factory: ExtractorFactory) {
        self.factories.insert(server, factory);
    }

    pub fn contains(&self, server: StreamingServer) -> bool {
        self.factories.contains_key(&server)
    }

    /// Registered servers in declaration order
    pub fn servers(&self) -> Vec<StreamingServer> {
        StreamingServer::ALL
            .iter()
            .copied()
            .filter(|s| self.factories.contains_key(s))
            .collect()
    }

    /// Instantiate the extractor for a server
    pub fn create(&self, server: StreamingServer, ctx: &ExtractorContext) -> Result<Arc<dyn Extractor>> {
        self.factories
            .get(&server)
            .map(|factory| factory(ctx))
            .ok_or_else(|| ReelError::NotFound(format!("no extractor registered for {}", server)))
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractorRegistry")
            .field("servers", &self.servers())
            .finish()
    }
}
