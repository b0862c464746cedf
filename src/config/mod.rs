//! Configuration management for the distribution core.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support
//! - Environment variable overrides
mod cluster;
mod coordination;
mod partitioner;
mod region;
mod retry;
pub use cluster::*;
pub use coordination::*;
pub use partitioner::*;
pub use region::*;
pub use retry::*;
#[cfg(test)]
mod config_test;
use std::env;
use std::fmt::Debug;
use std::path::Path;

use config::Config;
use config::ConfigError;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Environment prefix, e.g. `SPACEDIST__CLUSTER__NAME=prod`
pub const ENV_PREFIX: &str = "SPACEDIST";

/// Main configuration container of one process
///
/// Combines all subsystem configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct NodeConfig {
    /// Cluster name and local instance identity
    #[serde(default)]
    pub cluster: ClusterConfig,
    /// Coordination client behaviour
    #[serde(default)]
    pub coordination: CoordinationConfig,
    /// Retry policies for remote reads and local lookups
    #[serde(default)]
    pub retry: RetryPolicies,
    /// Region wait primitives
    #[serde(default)]
    pub region: RegionConfig,
    /// Defaults applied to newly created distribution groups
    #[serde(default)]
    pub partitioner: PartitionerConfig,
}

impl Debug for NodeConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("NodeConfig")
            .field("cluster", &self.cluster)
            .field("partitioner", &self.partitioner)
            .finish()
    }
}

impl NodeConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Sources are merged in the following order (later sources override earlier):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `CONFIG_PATH` environment variable (if set)
    /// 3. Environment variables with `SPACEDIST__` prefix (highest priority)
    ///
    /// Callers MUST call `validate()` before using the configuration.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("SPACEDIST__CLUSTER__NAME", "prod");
    /// let cfg = NodeConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .ignore_empty(true)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates configuration and returns validated instance.
    ///
    /// # Errors
    /// Returns validation errors from any subsystem:
    /// - Malformed cluster name or local instance address
    /// - Zero retry attempts
    /// - Out of range partitioner knobs
    pub fn validate(self) -> Result<Self> {
        self.cluster.validate()?;
        self.coordination.validate()?;
        self.retry.validate()?;
        self.region.validate()?;
        self.partitioner.validate()?;
        Ok(self)
    }
}

/// Ensures a directory path is usable: non-empty and not an existing regular file
pub(super) fn validate_directory(
    path: &Path,
    name: &str,
) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(Error::Config(ConfigError::Message(format!(
            "{name} path cannot be empty"
        ))));
    }

    if path.exists() && !path.is_dir() {
        return Err(Error::Config(ConfigError::Message(format!(
            "{} path {} is not a directory",
            name,
            path.display()
        ))));
    }

    Ok(())
}
