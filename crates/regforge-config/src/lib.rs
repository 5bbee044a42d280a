//! Configuration system for RegForge.
//!
//! Load engine configuration from TOML or YAML files to control the
//! compile cache and code generation without code changes.
//!
//! # Examples
//!
//! Load configuration from a TOML string:
//!
//! ```
//! use regforge_config::{EngineConfig, OptLevelConfig};
//!
//! let config = EngineConfig::from_toml_str(r#"
//!     cache_max_size = 16
//!     opt_level = "none"
//!     dump_ir_on_error = true
//! "#).unwrap();
//!
//! assert_eq!(config.cache_max_size, 16);
//! assert_eq!(config.opt_level, OptLevelConfig::None);
//! assert!(config.dump_ir_on_error);
//! ```
//!
//! Use the defaults when no file is present:
//!
//! ```
//! use regforge_config::EngineConfig;
//!
//! let config = EngineConfig::load("regforge.toml").unwrap_or_default();
//! assert_eq!(config.cache_max_size, 64);
//! ```


use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Default capacity of the compile cache.
pub const DEFAULT_CACHE_MAX_SIZE: usize = 64;

/// Main engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct EngineConfig {
    /// Maximum number of compiled patterns kept by the cache.
    #[serde(default = "default_cache_max_size")]
    pub cache_max_size: usize,

    /// Optimization level applied before installing a compiled pattern.
    #[serde(default)]
    pub opt_level: OptLevelConfig,

    /// Log the generated IR during compiles (debug diagnostics).
    #[serde(default)]
    pub dump_ir_on_error: bool,
}

fn default_cache_max_size() -> usize {
    DEFAULT_CACHE_MAX_SIZE
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_max_size: DEFAULT_CACHE_MAX_SIZE,
            opt_level: OptLevelConfig::default(),
            dump_ir_on_error: false,
        }
    }
}

/// Optimization level selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OptLevelConfig {
    /// Skip the optimizing pipeline.
    None,
    /// Optimize for execution speed (the default).
    #[default]
    Speed,
}

impl EngineConfig {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file doesn't exist or contains invalid
    /// TOML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_toml_file(path)
    }

    /// Loads configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Parses configuration from a YAML string.
    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_max_size == 0 {
            return Err(ConfigError::Invalid(
                "cache_max_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
