use std::path::PathBuf;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use super::validate_directory;
use crate::Error;
use crate::InstanceAddr;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ClusterConfig {
    /// Name of the cluster, used as the coordination root (`/<name>`)
    #[serde(default = "default_cluster_name")]
    pub name: String,

    /// `host:port` this process serves regions as. `None` for pure clients.
    #[serde(default)]
    pub local_instance: Option<String>,

    /// Storage directories reported in the instance details
    #[serde(default = "default_storage_directories")]
    pub storage_directories: Vec<PathBuf>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            name: default_cluster_name(),
            local_instance: None,
            storage_directories: default_storage_directories(),
        }
    }
}

impl ClusterConfig {
    /// Validates cluster configuration consistency
    /// # Errors
    /// Returns `Error::Config` if any configuration rules are violated
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() || self.name.contains('/') {
            return Err(Error::Config(ConfigError::Message(format!(
                "cluster name {:?} must be non-empty and must not contain '/'",
                self.name
            ))));
        }

        if let Some(addr) = &self.local_instance {
            addr.parse::<InstanceAddr>()
                .map_err(|e| Error::Config(ConfigError::Message(format!("local_instance: {e}"))))?;
        }

        for dir in &self.storage_directories {
            validate_directory(dir, "storage_directories")?;
        }

        Ok(())
    }

    /// Parsed local instance address, if configured
    pub fn local_instance_addr(&self) -> Option<InstanceAddr> {
        self.local_instance.as_ref().and_then(|a| a.parse().ok())
    }

    /// Coordination root path for this cluster
    pub fn root_path(&self) -> String {
        format!("/{}", self.name)
    }
}

fn default_cluster_name() -> String {
    "spacedist".to_string()
}
fn default_storage_directories() -> Vec<PathBuf> {
    vec![PathBuf::from("/tmp/spacedist/data")]
}
