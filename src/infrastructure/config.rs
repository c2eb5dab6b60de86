//! Configuration loading with hierarchical merging.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::CheckConfig;

/// Configuration validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Retry budget must allow at least one attempt.
    #[error("invalid retries: {0}. Must be at least 1")]
    InvalidRetries(u32),

    /// Concurrency bound must be positive.
    #[error("invalid concurrency: {0}. Must be at least 1")]
    InvalidConcurrency(usize),

    /// Batch size must be positive.
    #[error("invalid chunk_size: {0}. Must be at least 1")]
    InvalidChunkSize(usize),

    /// At least one entity type must be audited.
    #[error("entity_types cannot be empty")]
    EmptyEntityTypes,

    /// Sampling is a percentage.
    #[error("invalid content_sample_percent: {0}. Must be between 0 and 100")]
    InvalidSamplePercent(u8),

    /// Backoff window must be ordered.
    #[error("invalid backoff window: min_backoff_ms ({0}) must be <= max_backoff_ms ({1})")]
    InvalidBackoff(u64, u64),
}

/// Configuration loader with hierarchical merging.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. `replicheck.yaml` in the working directory
    /// 3. Environment variables (`RC_*` prefix)
    ///
    /// CLI flags are applied on top by the command layer.
    pub fn load() -> Result<CheckConfig> {
        let config: CheckConfig = Figment::new()
            .merge(Serialized::defaults(CheckConfig::default()))
            .merge(Yaml::file("replicheck.yaml"))
            .merge(Env::prefixed("RC_").split("__"))
            .extract()
            .context("failed to extract configuration")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<CheckConfig> {
        let config: CheckConfig = Figment::new()
            .merge(Serialized::defaults(CheckConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading.
    pub fn validate(config: &CheckConfig) -> Result<(), ConfigError> {
        if config.retries == 0 {
            return Err(ConfigError::InvalidRetries(config.retries));
        }
        if config.concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency(config.concurrency));
        }
        if config.chunk_size == 0 {
            return Err(ConfigError::InvalidChunkSize(config.chunk_size));
        }
        if config.entity_types.is_empty() {
            return Err(ConfigError::EmptyEntityTypes);
        }
        if config.content_sample_percent > 100 {
            return Err(ConfigError::InvalidSamplePercent(
                config.content_sample_percent,
            ));
        }
        if config.min_backoff_ms > config.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                config.min_backoff_ms,
                config.max_backoff_ms,
            ));
        }
        Ok(())
    }
}
