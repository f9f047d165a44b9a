//! Configuration management

use config::{Config as ConfigBuilder, ConfigBuilder as Builder, ConfigError as BuilderError, Environment, File};
use config::builder::DefaultState;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::extension::validator::ValidationMode;

/// Default user agent presented by the shared HTTP client
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid http configuration: {0}")]
    InvalidHttp(String),

    #[error("Invalid runtime configuration: {0}")]
    InvalidRuntime(String),

    #[error("Invalid logging configuration: {0}")]
    InvalidLogging(String),

    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),
}

impl From<BuilderError> for ConfigError {
    fn from(err: BuilderError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

impl From<ConfigError> for crate::core::error::ReelError {
    fn from(err: ConfigError) -> Self {
        crate::core::error::ReelError::Config(err.to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub http: HttpConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    pub runtime: RuntimeConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http: HttpConfig {
                user_agent: DEFAULT_USER_AGENT.to_string(),
                timeout: 20,
                connect_timeout: 10,
                proxy: None,
            },
            registry: RegistryConfig { path: None },
            runtime: RuntimeConfig {
                validation: ValidationMode::Strict,
                worker_stack_size: 8 * 1024 * 1024,
                channel_capacity: 32,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "text".to_string(),
                output: "stdout".to_string(),
                log_file: None,
            },
        }
    }
}

impl Config {
    /// Load configuration with precedence: Environment variables > Config file > Defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = with_defaults(ConfigBuilder::builder())?;

        if let Some(config_path) = path {
            if !config_path.exists() {
                return Err(ConfigError::FileNotFound(config_path.display().to_string()));
            }
            builder = builder.add_source(File::from(config_path));
        }

        // Environment variables are prefixed with REELHUB_ and use __ for nesting
        // Example: REELHUB_HTTP__TIMEOUT=30
        let config: Config = builder
            .add_source(env_source())
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let config: Config = with_defaults(ConfigBuilder::builder())?
            .add_source(File::from(path))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Result<Self, ConfigError> {
        let config: Config = with_defaults(ConfigBuilder::builder())?
            .add_source(env_source())
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.http.validate()?;
        self.runtime.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

fn env_source() -> Environment {
    Environment::with_prefix("REELHUB")
        .separator("__")
        .try_parsing(true)
}

fn with_defaults(builder: Builder<DefaultState>) -> Result<Builder<DefaultState>, ConfigError> {
    let defaults = Config::default();
    Ok(builder
        .set_default("http.user_agent", defaults.http.user_agent)?
        .set_default("http.timeout", defaults.http.timeout)?
        .set_default("http.connect_timeout", defaults.http.connect_timeout)?
        .set_default("runtime.validation", defaults.runtime.validation.as_str())?
        .set_default("runtime.worker_stack_size", defaults.runtime.worker_stack_size as u64)?
        .set_default("runtime.channel_capacity", defaults.runtime.channel_capacity as u64)?
        .set_default("logging.level", defaults.logging.level)?
        .set_default("logging.format", defaults.logging.format)?
        .set_default("logging.output", defaults.logging.output)?)
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub user_agent: String,
    pub timeout: u64,         // seconds
    pub connect_timeout: u64, // seconds
    #[serde(default)]
    pub proxy: Option<String>,
}

impl HttpConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::InvalidHttp("user_agent cannot be empty".to_string()));
        }

        if self.timeout == 0 {
            return Err(ConfigError::InvalidHttp("timeout must be greater than 0".to_string()));
        }

        if self.connect_timeout == 0 || self.connect_timeout > self.timeout {
            return Err(ConfigError::InvalidHttp(
                "connect_timeout must be between 1 and timeout".to_string(),
            ));
        }

        if let Some(proxy) = &self.proxy {
            url::Url::parse(proxy)
                .map_err(|e| ConfigError::InvalidHttp(format!("invalid proxy url: {}", e)))?;
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistryConfig {
    /// Registry document to read instead of the bundled one
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    pub validation: ValidationMode,
    pub worker_stack_size: usize, // bytes
    pub channel_capacity: usize,
}

impl RuntimeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_stack_size < 1024 * 1024 {
            return Err(ConfigError::InvalidRuntime(
                "worker_stack_size must be at least 1 MiB".to_string(),
            ));
        }

        if self.channel_capacity == 0 {
            return Err(ConfigError::InvalidRuntime(
                "channel_capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub output: String,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.level.as_str()) {
            return Err(ConfigError::InvalidLogging(format!(
                "level must be one of: {:?}",
                valid_levels
            )));
        }

        let valid_formats = ["json", "text"];
        if !valid_formats.contains(&self.format.as_str()) {
            return Err(ConfigError::InvalidLogging(format!(
                "format must be one of: {:?}",
                valid_formats
            )));
        }

        let valid_outputs = ["stdout", "file"];
        if !valid_outputs.contains(&self.output.as_str()) {
            return Err(ConfigError::InvalidLogging(format!(
                "output must be one of: {:?}",
                valid_outputs
            )));
        }

        if self.output == "file" && self.log_file.is_none() {
            return Err(ConfigError::InvalidLogging(
                "log_file must be specified when output is 'file'".to_string(),
            ));
        }

        Ok(())
    }
}
