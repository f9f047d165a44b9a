//! ReelHub extension runtime
//!
//! Plugin host for streaming-content providers: a registry of third-party
//! JavaScript extensions, a sandboxed loader, and typed anime and movie
//! provider handles on top.

pub mod core;
pub mod extension;

// Re-export commonly used types
pub use crate::core::{Config, Logger, ReelError};
pub use extension::{
    AnimeProvider, Category, ExtensionManager, ExtensionState, MovieProvider, RegistryStore,
};

/// Host version, checked against manifest version bounds
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Result type alias for the library
pub type Result<T> = crate::core::error::Result<T>;
