use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;
use tracing::error;

use super::leaf_path;
use super::read_string;
use super::CoordinationClient;
use super::CoordinationPaths;
use super::Watcher;
use crate::constants::DETAIL_CPU_CORES;
use crate::constants::DETAIL_DISKSPACE;
use crate::constants::DETAIL_FREE;
use crate::constants::DETAIL_MEMORY;
use crate::constants::DETAIL_TOTAL;
use crate::constants::DETAIL_VERSION;
use crate::constants::QUOTED_PATH_SEPARATOR;
use crate::constants::UNKNOWN_VERSION;
use crate::DiskSpace;
use crate::Instance;
use crate::InstanceAddr;
use crate::InstanceState;
use crate::Result;

/// Reads and writes instance liveness and details
#[derive(Clone)]
pub struct InstanceAdapter {
    client: Arc<dyn CoordinationClient>,
    paths: CoordinationPaths,
}

impl InstanceAdapter {
    pub fn new(
        client: Arc<dyn CoordinationClient>,
        paths: CoordinationPaths,
    ) -> Self {
        Self { client, paths }
    }

    pub fn paths(&self) -> &CoordinationPaths {
        &self.paths
    }

    /// Creates the membership directories so watches can be armed on them
    pub fn ensure_layout(&self) -> Result<()> {
        for dir in [self.paths.nodes_active_dir(), self.paths.nodes_details_dir()] {
            if !self.client.exists(&dir)? {
                self.client.replace_persistent_node(&dir, b"")?;
            }
        }
        Ok(())
    }

    /// Publishes version, cpu cores, memory and per storage disk space
    pub fn update_node_info(
        &self,
        instance: &Instance,
    ) -> Result<()> {
        let details = self.paths.instance_details_path(instance.addr());

        self.client.replace_persistent_node(
            &leaf_path(&details, DETAIL_VERSION),
            instance.version().as_bytes(),
        )?;
        self.client.replace_persistent_node(
            &leaf_path(&details, DETAIL_CPU_CORES),
            instance.cpu_cores().to_string().as_bytes(),
        )?;
        self.client.replace_persistent_node(
            &leaf_path(&details, DETAIL_MEMORY),
            instance.memory().to_string().as_bytes(),
        )?;

        let diskspace = leaf_path(&details, DETAIL_DISKSPACE);
        self.client.replace_persistent_node(&diskspace, b"")?;
        for (path, space) in instance.storages() {
            let storage = leaf_path(&diskspace, &quote_path(path));
            self.client
                .replace_persistent_node(&leaf_path(&storage, DETAIL_FREE), space.free.to_string().as_bytes())?;
            self.client
                .replace_persistent_node(&leaf_path(&storage, DETAIL_TOTAL), space.total.to_string().as_bytes())?;
        }

        debug!(instance = %instance.addr(), "Published instance details");
        Ok(())
    }

    /// Writes the ephemeral liveness leaf
    pub fn update_state(
        &self,
        addr: &InstanceAddr,
        state: InstanceState,
    ) -> Result<()> {
        let path = self.paths.active_instance_path(addr);
        self.client.replace_ephemeral_node(&path, state.as_str().as_bytes())
    }

    /// All instances that ever published details, with their current liveness.
    ///
    /// Arms a child watch on the active directory and a data watch on every
    /// liveness leaf read.
    pub fn read_instances(
        &self,
        watcher: Option<Arc<dyn Watcher>>,
    ) -> Result<Vec<Instance>> {
        self.client
            .get_children(&self.paths.nodes_active_dir(), watcher.clone())?;

        let names = self.client.get_children(&self.paths.nodes_details_dir(), None)?;
        let mut instances = Vec::with_capacity(names.len());
        for name in names {
            let addr = match name.parse::<InstanceAddr>() {
                Ok(addr) => addr,
                Err(e) => {
                    error!("Skipping malformed instance entry {:?}: {}", name, e);
                    continue;
                }
            };
            instances.push(self.read_instance(addr, watcher.clone())?);
        }
        Ok(instances)
    }

    pub fn read_instance(
        &self,
        addr: InstanceAddr,
        watcher: Option<Arc<dyn Watcher>>,
    ) -> Result<Instance> {
        let details = self.paths.instance_details_path(&addr);
        let mut instance = Instance::new(addr);

        instance.set_state(self.read_state(instance.addr(), watcher));

        let version = match read_string(self.client.as_ref(), &leaf_path(&details, DETAIL_VERSION), None) {
            Ok(v) => v,
            Err(e) => {
                error!("Unable to read version of {}: {}", instance.addr(), e);
                UNKNOWN_VERSION.to_string()
            }
        };
        instance.set_version(version);

        instance.set_cpu_cores(self.read_number(&leaf_path(&details, DETAIL_CPU_CORES)).unwrap_or(-1));
        instance.set_memory(self.read_number(&leaf_path(&details, DETAIL_MEMORY)).unwrap_or(-1));

        let diskspace = leaf_path(&details, DETAIL_DISKSPACE);
        if self.client.exists(&diskspace)? {
            for quoted in self.client.get_children(&diskspace, None)? {
                let storage = leaf_path(&diskspace, &quoted);
                let free = self.read_number::<u64>(&leaf_path(&storage, DETAIL_FREE));
                let total = self.read_number::<u64>(&leaf_path(&storage, DETAIL_TOTAL));
                match (free, total) {
                    (Some(free), Some(total)) => {
                        instance.add_storage(unquote_path(&quoted), DiskSpace { free, total })
                    }
                    _ => error!("Incomplete disk space entry {} of {}", quoted, instance.addr()),
                }
            }
        }

        Ok(instance)
    }

    fn read_state(
        &self,
        addr: &InstanceAddr,
        watcher: Option<Arc<dyn Watcher>>,
    ) -> InstanceState {
        let path = self.paths.active_instance_path(addr);
        match read_string(self.client.as_ref(), &path, watcher) {
            Ok(value) => InstanceState::from_leaf(&value),
            // absent liveness leaf
            Err(_) => InstanceState::Failed,
        }
    }

    fn read_number<T: std::str::FromStr>(
        &self,
        path: &str,
    ) -> Option<T> {
        let value = match read_string(self.client.as_ref(), path, None) {
            Ok(v) => v,
            Err(e) => {
                error!("Unable to read {}: {}", path, e);
                return None;
            }
        };
        match value.parse::<T>() {
            Ok(n) => Some(n),
            Err(_) => {
                error!("Unable to parse {:?} at {} as a number", value, path);
                None
            }
        }
    }
}

/// Storage directory as a single node name
pub fn quote_path(path: &Path) -> String {
    path.to_string_lossy().replace('/', QUOTED_PATH_SEPARATOR)
}

pub fn unquote_path(quoted: &str) -> PathBuf {
    PathBuf::from(quoted.replace(QUOTED_PATH_SEPARATOR, "/"))
}
