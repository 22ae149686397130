//! Engine configuration.
//! Limits can be loaded from `kiln.json`, `kiln.yml` or `kiln.yaml`; any
//! field left out keeps its default.

use crate::constants::{CONFIG_FILES, DEFAULT_MAX_INCLUDE_DEPTH, DEFAULT_MAX_ITERATIONS};
use crate::error::{Error, Result};
use log::debug;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Maximum nesting of `<%include>` before `RecursionLimitExceeded`.
    pub max_include_depth: usize,
    /// Maximum size of a `range()` and iterations of one `% for` loop.
    pub max_iterations: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_include_depth: DEFAULT_MAX_INCLUDE_DEPTH,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

impl EngineConfig {
    /// Parses configuration content, trying JSON first and YAML second.
    ///
    /// # Errors
    /// * `Error::ConfigError` if the content is neither valid JSON nor YAML
    pub fn from_content(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        match serde_json::from_str(content) {
            Ok(config) => Ok(config),
            Err(_) => serde_yaml::from_str(content)
                .map_err(|e| Error::ConfigError(format!("Invalid configuration format: {e}"))),
        }
    }

    /// Reads and parses a configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading configuration from {}", path.display());
        let content = std::fs::read_to_string(path).map_err(Error::IoError)?;
        Self::from_content(&content)
    }
}

/// Loads configuration from a directory, trying each of [`CONFIG_FILES`]
/// in order and falling back to defaults when none exists.
///
/// # Arguments
/// * `dir` - Directory that may contain a configuration file
///
/// # Returns
/// * `Result<EngineConfig>` - Parsed configuration or the defaults
pub fn load_config<P: AsRef<Path>>(dir: P) -> Result<EngineConfig> {
    for file in CONFIG_FILES {
        let config_path = dir.as_ref().join(file);
        if config_path.exists() {
            return EngineConfig::from_file(&config_path);
        }
    }
    debug!("No configuration file found (tried: {}), using defaults", CONFIG_FILES.join(", "));
    Ok(EngineConfig::default())
}
