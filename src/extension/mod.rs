//! Extension runtime
//!
//! Loads untrusted provider scripts from a registry, runs each one in its own
//! JavaScript isolate, validates the object its factory returns, and hands
//! out cached typed handles.

pub mod cache;
pub mod context;
pub mod enums;
pub mod extractor;
pub mod fetcher;
pub mod html;
pub mod http;
pub mod instance;
pub(crate) mod js_bindings;
pub mod manager;
pub mod models;
pub mod registry;
pub(crate) mod sandbox;
pub mod types;
pub mod validator;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use context::{create_custom_base_url, ExtractorContext, NativeBridge, NoNativeBridge, ProviderContext};
pub use enums::StreamingServer;
pub use extractor::{Extractor, ExtractorFactory, ExtractorRegistry};
pub use instance::{AnimeProvider, ExtensionInstance, MovieProvider, ScriptExtractor};
pub use manager::{ExtensionManager, ExtensionManagerBuilder};
pub use models::{AnimeInfo, EpisodeServer, EpisodeSources, MediaInfo, ProviderSearch, SearchItem, SearchPage};
pub use registry::RegistryStore;
pub use types::{Category, ExtensionManifest, ExtensionState};
pub use validator::ValidationMode;
