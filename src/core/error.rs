//! Error type system for the extension runtime
//!
//! Every failure a caller of the manager can observe maps onto one
//! [`ReelError`] variant:
//! - Registry, lookup and category errors raised before any code runs
//! - Fetch and evaluation errors raised while bringing source text to life
//! - Validation errors raised after the factory hands back an instance
//! - Runtime errors raised by calls into an already loaded instance

use std::fmt;

use crate::extension::types::Category;

/// Main error type for the extension runtime
#[derive(Debug, thiserror::Error)]
pub enum ReelError {
    // Registry errors
    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Extension not found: {0}")]
    NotFound(String),

    #[error("Extension {id} is a {actual} extension, not {expected}")]
    CategoryMismatch {
        id: String,
        expected: Category,
        actual: Category,
    },

    #[error("Extension {id} requires host version {required}, running {running}")]
    Incompatible {
        id: String,
        required: String,
        running: String,
    },

    // Loading errors
    #[error("Failed to fetch {location}: {status}")]
    Fetch { location: String, status: FetchStatus },

    #[error("Failed to evaluate extension source: {0}")]
    Eval(String),

    #[error("Factory function not found: {0}")]
    FactoryMissing(String),

    #[error("Validation error: {0}")]
    Validation(String),

    // Execution errors
    #[error("Script runtime error: {0}")]
    Runtime(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unsupported host capability: {0}")]
    Unsupported(String),

    // I/O and data errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// What went wrong at the transport level while fetching source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStatus {
    /// The server answered with a non-success status code
    Http(u16),
    /// The request never produced a response
    Transport(String),
}

impl fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchStatus::Http(code) => write!(f, "HTTP status {}", code),
            FetchStatus::Transport(msg) => write!(f, "transport error ({})", msg),
        }
    }
}

impl ReelError {
    /// Get the error type name
    pub fn error_type(&self) -> &'static str {
        match self {
            ReelError::Registry(_) => "RegistryError",
            ReelError::NotFound(_) => "NotFoundError",
            ReelError::CategoryMismatch { .. } => "CategoryMismatchError",
            ReelError::Incompatible { .. } => "IncompatibleError",
            ReelError::Fetch { .. } => "FetchError",
            ReelError::Eval(_) => "EvalError",
            ReelError::FactoryMissing(_) => "FactoryMissingError",
            ReelError::Validation(_) => "ValidationError",
            ReelError::Runtime(_) => "RuntimeError",
            ReelError::Network(_) => "NetworkError",
            ReelError::Unsupported(_) => "UnsupportedError",
            ReelError::Io(_) => "IoError",
            ReelError::Serialization(_) => "SerializationError",
            ReelError::Config(_) => "ConfigError",
        }
    }

    /// Check if this error is retryable
    ///
    /// The runtime itself never retries; this only tells callers whether
    /// issuing the same load again can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ReelError::Network(_) | ReelError::Fetch { .. })
    }
}

impl From<serde_json::Error> for ReelError {
    fn from(err: serde_json::Error) -> Self {
        ReelError::Serialization(err.to_string())
    }
}

/// Result type alias for operations that can fail with ReelError
pub type Result<T> = std::result::Result<T, ReelError>;

/// Context extension trait for turning foreign errors into runtime errors
pub trait ErrorContext<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context to an error using a closure
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::fmt::Display,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| ReelError::Runtime(format!("{}: {}", context.into(), e)))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| ReelError::Runtime(format!("{}: {}", f(), e)))
    }
}
