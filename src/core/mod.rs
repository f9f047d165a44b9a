//! Ambient layer shared by the extension runtime:
//! - Configuration management
//! - Structured logging
//! - Error types

pub mod config;
pub mod error;
pub mod logging;

pub use config::Config;
pub use error::{ErrorContext, ReelError, Result};
pub use logging::Logger;
