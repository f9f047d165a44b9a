//! Capability contexts handed to extension factories
//!
//! A provider factory receives a `ProviderContext`, an extractor factory an
//! `ExtractorContext`. Inside the sandbox both are mirrored as plain objects
//! whose functions call back into these structs through host ops.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::enums::{self, StreamingServer};
use super::extractor::{Extractor, ExtractorRegistry};
use super::http::HttpClient;
use crate::core::error::{ReelError, Result};

/// Host services that cannot live inside the script sandbox
///
/// Every method defaults to `Unsupported`, so an embedder only overrides
/// what it can actually provide.
#[async_trait]
pub trait NativeBridge: Send + Sync {
    /// Solve an anti-bot challenge and return the resulting cookies
    async fn cookie_bypass(&self, url: &str) -> Result<HashMap<String, String>> {
        Err(ReelError::Unsupported(format!("cookie bypass for {}", url)))
    }

    /// Render a page in a headless browser and return its markup
    async fn headless_fetch(&self, url: &str) -> Result<String> {
        Err(ReelError::Unsupported(format!("headless fetch of {}", url)))
    }

    /// Undo packer-style script obfuscation
    fn deobfuscate(&self, _script: &str) -> Result<String> {
        Err(ReelError::Unsupported("script deobfuscation".to_string()))
    }
}

/// Bridge with no native services
#[derive(Debug, Clone, Copy, Default)]
pub struct NoNativeBridge;

impl NativeBridge for NoNativeBridge {}

/// Which context shape a script is booted with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    Provider,
    Extractor,
}

impl ContextKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextKind::Provider => "provider",
            ContextKind::Extractor => "extractor",
        }
    }
}

/// Resolve a provider's base url, preferring a user override
///
/// Blank overrides fall back to the default. Overrides without a scheme are
/// assumed to be https. Trailing slashes are dropped.
pub fn create_custom_base_url(default_url: &str, custom_url: Option<&str>) -> String {
    let url = match custom_url.map(str::trim).filter(|u| !u.is_empty()) {
        Some(custom) if custom.starts_with("http://") || custom.starts_with("https://") => {
            custom.to_string()
        }
        Some(custom) => format!("https://{}", custom),
        None => default_url.to_string(),
    };
    url.trim_end_matches('/').to_string()
}

/// Capabilities available to extractors
#[derive(Clone)]
pub struct ExtractorContext {
    pub http: HttpClient,
    pub native: Arc<dyn NativeBridge>,
}

impl ExtractorContext {
    pub fn new(http: HttpClient, native: Arc<dyn NativeBridge>) -> Self {
        Self { http, native }
    }

    pub fn user_agent(&self) -> &str {
        self.http.user_agent()
    }
}

impl fmt::Debug for ExtractorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractorContext")
            .field("user_agent", &self.user_agent())
            .finish()
    }
}

/// Capabilities available to providers
#[derive(Clone)]
pub struct ProviderContext {
    pub http: HttpClient,
    pub extractors: ExtractorRegistry,
    pub native: Arc<dyn NativeBridge>,
}

impl ProviderContext {
    pub fn new(http: HttpClient, extractors: ExtractorRegistry, native: Arc<dyn NativeBridge>) -> Self {
        Self {
            http,
            extractors,
            native,
        }
    }

    pub fn user_agent(&self) -> &str {
        self.http.user_agent()
    }

    /// Context handed to extractors created on behalf of this provider
    pub fn extractor_context(&self) -> ExtractorContext {
        ExtractorContext::new(self.http.clone(), Arc::clone(&self.native))
    }

    /// Extractor for a server, bound to this provider's http client
    pub fn extractor(&self, server: StreamingServer) -> Result<Arc<dyn Extractor>> {
        self.extractors.create(server, &self.extractor_context())
    }

    /// Plain description the script prelude builds `ctx` from
    pub(crate) fn script_descriptor(&self, extension_id: &str, kind: ContextKind) -> Value {
        let extractors: Vec<Value> = match kind {
            ContextKind::Provider => self
                .extractors
                .servers()
                .into_iter()
                .map(|s| json!({ "key": s.key(), "value": s.as_str() }))
                .collect(),
            ContextKind::Extractor => Vec::new(),
        };

        json!({
            "kind": kind.as_str(),
            "extensionId": extension_id,
            "userAgent": self.user_agent(),
            "enums": enums::namespace(),
            "extractors": extractors,
        })
    }
}

impl fmt::Debug for ProviderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderContext")
            .field("user_agent", &self.user_agent())
            .field("extractors", &self.extractors)
            .finish()
    }
}
