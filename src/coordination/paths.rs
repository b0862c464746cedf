use crate::constants::CHILDREN_DIR;
use crate::constants::DISTRIBUTION_DIR;
use crate::constants::GROUP_CONFIG_DIR;
use crate::constants::LEAF_VERSION;
use crate::constants::NODES_ACTIVE_DIR;
use crate::constants::NODES_DETAILS_DIR;
use crate::constants::NODES_DIR;
use crate::constants::REGION_ID_COUNTER;
use crate::InstanceAddr;

/// Builds and parses the coordination path layout below one cluster root.
///
/// ```text
/// <root>/distribution/<group>/{version,state,systems,bbox,regionid}
/// <root>/distribution/<group>/children/<n>/...
/// <root>/nodes/active/<host:port>
/// <root>/nodes/details/<host:port>/...
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinationPaths {
    root: String,
}

impl CoordinationPaths {
    /// `root` is the cluster root, e.g. `/spacedist`
    pub fn new(root: impl Into<String>) -> Self {
        let root: String = root.into();
        let trimmed = root.trim_end_matches('/');
        let root = if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{trimmed}")
        };
        Self { root }
    }

    pub fn for_cluster(cluster_name: &str) -> Self {
        Self::new(format!("/{cluster_name}"))
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn distribution_dir(&self) -> String {
        format!("{}/{}", self.root, DISTRIBUTION_DIR)
    }

    pub fn group_path(
        &self,
        group: &str,
    ) -> String {
        format!("{}/{}", self.distribution_dir(), group)
    }

    pub fn group_config_dir(
        &self,
        group: &str,
    ) -> String {
        format!("{}/{}", self.group_path(group), GROUP_CONFIG_DIR)
    }

    pub fn region_id_counter(
        &self,
        group: &str,
    ) -> String {
        format!("{}/{}", self.group_path(group), REGION_ID_COUNTER)
    }

    /// Path of the region reached from the group root via `child_numbers`
    pub fn region_path(
        &self,
        group: &str,
        child_numbers: &[u64],
    ) -> String {
        child_numbers
            .iter()
            .fold(self.group_path(group), |path, n| child_path(&path, *n))
    }

    /// Inverse of [`Self::region_path`]. `None` for paths outside of any
    /// region (config leaves, counters, foreign subtrees).
    pub fn parse_region_path(
        &self,
        path: &str,
    ) -> Option<(String, Vec<u64>)> {
        let prefix = format!("{}/", self.distribution_dir());
        let rest = path.strip_prefix(&prefix)?;
        let mut parts = rest.split('/');
        let group = parts.next().filter(|g| !g.is_empty())?.to_string();

        let mut child_numbers = Vec::new();
        loop {
            match parts.next() {
                None => return Some((group, child_numbers)),
                Some(dir) if dir == CHILDREN_DIR => {
                    let n = parts.next()?.parse::<u64>().ok()?;
                    child_numbers.push(n);
                }
                Some(_) => return None,
            }
        }
    }

    /// Maps the path of a region's version leaf back to its region
    pub fn parse_version_path(
        &self,
        path: &str,
    ) -> Option<(String, Vec<u64>)> {
        let region_path = path.strip_suffix(&format!("/{LEAF_VERSION}"))?;
        self.parse_region_path(region_path)
    }

    pub fn nodes_active_dir(&self) -> String {
        format!("{}/{}/{}", self.root, NODES_DIR, NODES_ACTIVE_DIR)
    }

    pub fn nodes_details_dir(&self) -> String {
        format!("{}/{}/{}", self.root, NODES_DIR, NODES_DETAILS_DIR)
    }

    pub fn active_instance_path(
        &self,
        addr: &InstanceAddr,
    ) -> String {
        format!("{}/{}", self.nodes_active_dir(), addr)
    }

    pub fn instance_details_path(
        &self,
        addr: &InstanceAddr,
    ) -> String {
        format!("{}/{}", self.nodes_details_dir(), addr)
    }
}

pub fn child_path(
    parent_path: &str,
    child_number: u64,
) -> String {
    format!("{parent_path}/{CHILDREN_DIR}/{child_number}")
}

pub fn leaf_path(
    node_path: &str,
    leaf: &str,
) -> String {
    format!("{node_path}/{leaf}")
}

/// Parent directory of `path`, `None` for the root
pub fn parent_of(path: &str) -> Option<&str> {
    let idx = path.rfind('/')?;
    if idx == 0 {
        if path.len() > 1 {
            Some("/")
        } else {
            None
        }
    } else {
        Some(&path[..idx])
    }
}

/// Last path component
pub fn node_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
