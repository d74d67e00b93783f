//! TOML run configuration.
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration. CLI flags override what is loaded here.

use crate::catalog::{Catalog, CatalogError};
use crate::circuit_breaker::CircuitBreaker;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

const MAX_BASE_DELAY_MS: u64 = 60_000;

/// Provider transport settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Per-request timeout. A timed-out fetch counts as absent data.
    pub timeout_secs: u64,

    /// Retries after the first attempt. Zero disables retrying.
    pub max_retries: u32,

    /// First backoff delay; doubles on each further retry.
    pub base_delay_ms: u64,

    /// Consecutive failures before the circuit breaker opens.
    pub breaker_threshold: u32,

    pub breaker_cooldown_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 0,
            base_delay_ms: 500,
            breaker_threshold: 3,
            breaker_cooldown_secs: 30 * 60,
        }
    }
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn circuit_breaker(&self) -> CircuitBreaker {
        CircuitBreaker::new(
            self.breaker_threshold,
            Duration::from_secs(self.breaker_cooldown_secs),
        )
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "provider.timeout_secs must be greater than zero".into(),
            ));
        }
        if self.base_delay_ms > MAX_BASE_DELAY_MS {
            return Err(ConfigError::Invalid(format!(
                "provider.base_delay_ms must be at most {MAX_BASE_DELAY_MS}"
            )));
        }
        if self.breaker_threshold == 0 {
            return Err(ConfigError::Invalid(
                "provider.breaker_threshold must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Top-level configuration for a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// SQLite database file.
    pub database: PathBuf,

    /// Catalog TOML file. `None` means the built-in catalog.
    pub catalog: Option<PathBuf>,

    pub provider: ProviderConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("data/pricevault.db"),
            catalog: None,
            provider: ProviderConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.provider.validate()?;
        Ok(config)
    }

    /// The catalog file if one is configured, else the built-in list.
    pub fn load_catalog(&self) -> Result<Catalog, CatalogError> {
        match &self.catalog {
            Some(path) => Catalog::from_file(path),
            None => Ok(Catalog::default_catalog()),
        }
    }
}
