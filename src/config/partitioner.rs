use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Policy knobs used when a distribution group is created without explicit values
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PartitionerConfig {
    /// Number of systems holding a replica of every region
    #[serde(default = "default_replication_factor")]
    pub replication_factor: usize,

    /// Upper bound of leaf regions per group, 0 = unlimited
    #[serde(default)]
    pub target_cell_count: usize,

    /// Smallest sibling group that may be merged back into its parent
    #[serde(default = "default_min_merge_size")]
    pub min_merge_size: usize,

    /// Share of the provided sample points a split considers, in (0, 1]
    #[serde(default = "default_sample_fraction")]
    pub sample_fraction: f64,
}

impl Default for PartitionerConfig {
    fn default() -> Self {
        Self {
            replication_factor: default_replication_factor(),
            target_cell_count: 0,
            min_merge_size: default_min_merge_size(),
            sample_fraction: default_sample_fraction(),
        }
    }
}

impl PartitionerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.replication_factor == 0 {
            return Err(Error::Config(ConfigError::Message(
                "replication_factor must be at least 1".into(),
            )));
        }

        if self.min_merge_size < 2 {
            return Err(Error::Config(ConfigError::Message(format!(
                "min_merge_size must be at least 2, got {}",
                self.min_merge_size
            ))));
        }

        if !(self.sample_fraction > 0.0 && self.sample_fraction <= 1.0) {
            return Err(Error::Config(ConfigError::Message(format!(
                "sample_fraction must be in (0, 1], got {}",
                self.sample_fraction
            ))));
        }

        Ok(())
    }
}

fn default_replication_factor() -> usize {
    1
}
fn default_min_merge_size() -> usize {
    2
}
fn default_sample_fraction() -> f64 {
    1.0
}
