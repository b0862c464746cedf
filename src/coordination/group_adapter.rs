use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use tracing::debug;
use tracing::info;
use tracing::warn;

use super::child_path;
use super::leaf_path;
use super::node_name;
use super::read_string;
use super::CoordinationClient;
use super::CoordinationPaths;
use super::Watcher;
use crate::constants::CHILDREN_DIR;
use crate::constants::CONFIG_DIMENSIONS;
use crate::constants::CONFIG_MIN_MERGE_SIZE;
use crate::constants::CONFIG_PARTITIONER;
use crate::constants::CONFIG_PARTITIONER_CONFIG;
use crate::constants::CONFIG_REPLICATION;
use crate::constants::CONFIG_SAMPLE_FRACTION;
use crate::constants::CONFIG_TARGET_CELLS;
use crate::constants::LEAF_BBOX;
use crate::constants::LEAF_REGION_ID;
use crate::constants::LEAF_STATE;
use crate::constants::LEAF_SYSTEMS;
use crate::constants::LEAF_VERSION;
use crate::constants::SYSTEMS_SEPARATOR;
use crate::CoordinationError;
use crate::Hyperrectangle;
use crate::InstanceAddr;
use crate::MalformedRemoteState;
use crate::PartitionerConfig;
use crate::PartitionerError;
use crate::RegionError;
use crate::RegionState;
use crate::Result;

/// Space partitioning strategy of a distribution group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartitionerKind {
    KdTree,
    Quadtree,
    StaticGrid,
}

impl PartitionerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartitionerKind::KdTree => "kdtree",
            PartitionerKind::Quadtree => "quadtree",
            PartitionerKind::StaticGrid => "staticgrid",
        }
    }
}

impl fmt::Display for PartitionerKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PartitionerKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "kdtree" => Ok(PartitionerKind::KdTree),
            "quadtree" => Ok(PartitionerKind::Quadtree),
            "staticgrid" => Ok(PartitionerKind::StaticGrid),
            other => Err(PartitionerError::InvalidConfig(format!("unknown partitioner {other:?}")).into()),
        }
    }
}

/// Per group configuration stored below `<group>/config`
#[derive(Debug, Clone, PartialEq)]
pub struct GroupConfig {
    pub dimensions: usize,
    pub replication_factor: usize,
    pub partitioner: PartitionerKind,
    /// Root box for tree partitioners, `<box>;<size0>;<size1>...` for the grid
    pub partitioner_config: String,
    pub target_cell_count: usize,
    pub min_merge_size: usize,
    pub sample_fraction: f64,
}

impl GroupConfig {
    /// Group using the process wide partitioner defaults
    pub fn new(
        dimensions: usize,
        partitioner: PartitionerKind,
        partitioner_config: impl Into<String>,
        defaults: &PartitionerConfig,
    ) -> Self {
        Self {
            dimensions,
            replication_factor: defaults.replication_factor,
            partitioner,
            partitioner_config: partitioner_config.into(),
            target_cell_count: defaults.target_cell_count,
            min_merge_size: defaults.min_merge_size,
            sample_fraction: defaults.sample_fraction,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.dimensions == 0 {
            return Err(PartitionerError::InvalidConfig("dimensions must be at least 1".into()).into());
        }
        PartitionerConfig {
            replication_factor: self.replication_factor,
            target_cell_count: self.target_cell_count,
            min_merge_size: self.min_merge_size,
            sample_fraction: self.sample_fraction,
        }
        .validate()
        .map_err(|e| PartitionerError::InvalidConfig(e.to_string()).into())
    }
}

/// Reads and writes the region subtree of distribution groups.
///
/// Every mutation of a region node ends with [`GroupAdapter::mark_complete`],
/// which bumps the node's `version` leaf. Nodes without that leaf are still
/// being written and are ignored by readers.
#[derive(Clone)]
pub struct GroupAdapter {
    client: Arc<dyn CoordinationClient>,
    paths: CoordinationPaths,
}

impl GroupAdapter {
    pub fn new(
        client: Arc<dyn CoordinationClient>,
        paths: CoordinationPaths,
    ) -> Self {
        Self { client, paths }
    }

    pub fn client(&self) -> &Arc<dyn CoordinationClient> {
        &self.client
    }

    pub fn paths(&self) -> &CoordinationPaths {
        &self.paths
    }

    pub fn group_path(
        &self,
        group: &str,
    ) -> String {
        self.paths.group_path(group)
    }

    // -
    // Groups

    pub fn list_groups(&self) -> Result<Vec<String>> {
        match self.client.get_children(&self.paths.distribution_dir(), None) {
            Ok(groups) => Ok(groups),
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    pub fn group_exists(
        &self,
        group: &str,
    ) -> Result<bool> {
        self.client.exists(&self.paths.group_path(group))
    }

    /// Writes the group configuration and region id counter. The root region
    /// is created by the group's space partitioner.
    pub fn create_distribution_group(
        &self,
        group: &str,
        config: &GroupConfig,
    ) -> Result<()> {
        config.validate()?;
        if group.is_empty() || group.contains('/') {
            return Err(PartitionerError::InvalidConfig(format!("invalid group name {group:?}")).into());
        }

        let group_path = self.paths.group_path(group);
        if self.client.exists(&group_path)? {
            return Err(CoordinationError::AlreadyExists { path: group_path }.into());
        }

        let config_dir = self.paths.group_config_dir(group);
        let leaves = [
            (CONFIG_DIMENSIONS, config.dimensions.to_string()),
            (CONFIG_REPLICATION, config.replication_factor.to_string()),
            (CONFIG_PARTITIONER, config.partitioner.to_string()),
            (CONFIG_PARTITIONER_CONFIG, config.partitioner_config.clone()),
            (CONFIG_TARGET_CELLS, config.target_cell_count.to_string()),
            (CONFIG_MIN_MERGE_SIZE, config.min_merge_size.to_string()),
            (CONFIG_SAMPLE_FRACTION, config.sample_fraction.to_string()),
        ];
        for (leaf, value) in leaves {
            self.client
                .replace_persistent_node(&leaf_path(&config_dir, leaf), value.as_bytes())?;
        }
        self.client
            .replace_persistent_node(&self.paths.region_id_counter(group), b"0")?;

        info!(group, partitioner = %config.partitioner, "Created distribution group");
        Ok(())
    }

    pub fn delete_distribution_group(
        &self,
        group: &str,
    ) -> Result<()> {
        info!(group, "Deleting distribution group");
        self.client.delete_recursive(&self.paths.group_path(group))
    }

    pub fn read_group_config(
        &self,
        group: &str,
    ) -> Result<GroupConfig> {
        let dir = self.paths.group_config_dir(group);
        let read = |leaf: &str| read_string(self.client.as_ref(), &leaf_path(&dir, leaf), None);

        Ok(GroupConfig {
            dimensions: parse_leaf(&leaf_path(&dir, CONFIG_DIMENSIONS), &read(CONFIG_DIMENSIONS)?)?,
            replication_factor: parse_leaf(&leaf_path(&dir, CONFIG_REPLICATION), &read(CONFIG_REPLICATION)?)?,
            partitioner: read(CONFIG_PARTITIONER)?.parse()?,
            partitioner_config: read(CONFIG_PARTITIONER_CONFIG)?,
            target_cell_count: parse_leaf(&leaf_path(&dir, CONFIG_TARGET_CELLS), &read(CONFIG_TARGET_CELLS)?)?,
            min_merge_size: parse_leaf(&leaf_path(&dir, CONFIG_MIN_MERGE_SIZE), &read(CONFIG_MIN_MERGE_SIZE)?)?,
            sample_fraction: parse_leaf(
                &leaf_path(&dir, CONFIG_SAMPLE_FRACTION),
                &read(CONFIG_SAMPLE_FRACTION)?,
            )?,
        })
    }

    /// Allocates the next region id of the group.
    ///
    /// Read-modify-write on the counter leaf; concurrent splitters of the same
    /// group are not supported.
    pub fn next_region_id(
        &self,
        group: &str,
    ) -> Result<u64> {
        let path = self.paths.region_id_counter(group);
        let current: u64 = parse_leaf(&path, &read_string(self.client.as_ref(), &path, None)?)?;
        self.client
            .replace_persistent_node(&path, (current + 1).to_string().as_bytes())?;
        Ok(current)
    }

    // -
    // Region nodes

    /// Writes a complete region node at `path` (used for roots and grid cells)
    pub fn create_region_node(
        &self,
        path: &str,
        region_id: u64,
        bbox: &Hyperrectangle,
        systems: &[InstanceAddr],
        state: RegionState,
    ) -> Result<()> {
        self.client
            .replace_persistent_node(&leaf_path(path, LEAF_REGION_ID), region_id.to_string().as_bytes())?;
        self.client
            .replace_persistent_node(&leaf_path(path, LEAF_SYSTEMS), encode_systems(systems).as_bytes())?;
        self.client
            .replace_persistent_node(&leaf_path(path, LEAF_BBOX), bbox.to_compact_string().as_bytes())?;
        self.client
            .replace_persistent_node(&leaf_path(path, LEAF_STATE), state.as_str().as_bytes())?;
        self.mark_complete(path)?;
        Ok(())
    }

    /// Creates child `child_number` below `parent_path` in state `Creating`
    /// and returns its path. The parent version is bumped afterwards so
    /// watchers of the parent see the new child.
    pub fn create_child(
        &self,
        parent_path: &str,
        child_number: u64,
        region_id: u64,
        bbox: &Hyperrectangle,
    ) -> Result<String> {
        let path = child_path(parent_path, child_number);
        if self.client.exists(&path)? {
            let parent_region_id = self.read_region_id(parent_path).unwrap_or_default();
            return Err(RegionError::ChildExists {
                parent_region_id,
                child_number,
            }
            .into());
        }

        self.create_region_node(&path, region_id, bbox, &[], RegionState::Creating)?;
        self.mark_complete(parent_path)?;

        debug!(path = %path, region_id, "Created child region");
        Ok(path)
    }

    /// Removes the child subtree and bumps the parent version
    pub fn delete_child(
        &self,
        child_path: &str,
    ) -> Result<()> {
        self.client.delete_recursive(child_path)?;
        if let Some(parent) = region_parent_path(child_path) {
            self.mark_complete(parent)?;
        }
        debug!(path = %child_path, "Deleted child region");
        Ok(())
    }

    pub fn set_state(
        &self,
        path: &str,
        state: RegionState,
    ) -> Result<()> {
        self.ensure_complete(path)?;
        self.client
            .replace_persistent_node(&leaf_path(path, LEAF_STATE), state.as_str().as_bytes())?;
        self.mark_complete(path)?;
        Ok(())
    }

    /// ACTIVE -> ACTIVE_FULL. `false` when the region was in another state.
    pub fn set_to_full(
        &self,
        path: &str,
    ) -> Result<bool> {
        if self.read_state(path)? != RegionState::Active {
            return Ok(false);
        }
        self.set_state(path, RegionState::ActiveFull)?;
        Ok(true)
    }

    pub fn set_systems(
        &self,
        path: &str,
        systems: &[InstanceAddr],
    ) -> Result<()> {
        self.ensure_complete(path)?;
        self.client
            .replace_persistent_node(&leaf_path(path, LEAF_SYSTEMS), encode_systems(systems).as_bytes())?;
        self.mark_complete(path)?;
        Ok(())
    }

    /// Bumps the version leaf of the node at `path`: `max(now_ms, old + 1)`
    pub fn mark_complete(
        &self,
        path: &str,
    ) -> Result<u64> {
        let version_path = leaf_path(path, LEAF_VERSION);
        let old = match read_string(self.client.as_ref(), &version_path, None) {
            Ok(v) => v.parse::<u64>().unwrap_or(0),
            Err(e) if e.is_not_found() => 0,
            Err(e) => return Err(e),
        };
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let version = now.max(old.saturating_add(1));
        self.client
            .replace_persistent_node(&version_path, version.to_string().as_bytes())?;
        Ok(version)
    }

    fn ensure_complete(
        &self,
        path: &str,
    ) -> Result<()> {
        if self.is_completely_created(path)? {
            Ok(())
        } else {
            Err(CoordinationError::NotFound { path: path.to_string() }.into())
        }
    }

    // -
    // Readers

    /// Version leaf, optionally arming a watch on it. Unparsable content is
    /// logged and reported as 0.
    pub fn read_version(
        &self,
        path: &str,
        watcher: Option<Arc<dyn Watcher>>,
    ) -> Result<u64> {
        let version_path = leaf_path(path, LEAF_VERSION);
        let value = read_string(self.client.as_ref(), &version_path, watcher)?;
        match value.parse::<u64>() {
            Ok(v) => Ok(v),
            Err(e) => {
                warn!(
                    "{}",
                    MalformedRemoteState {
                        path: version_path,
                        value,
                        reason: e.to_string(),
                    }
                );
                Ok(0)
            }
        }
    }

    pub fn read_state(
        &self,
        path: &str,
    ) -> Result<RegionState> {
        let state_path = leaf_path(path, LEAF_STATE);
        let value = read_string(self.client.as_ref(), &state_path, None)?;
        Ok(RegionState::from_leaf(&state_path, &value))
    }

    /// Replica holders; malformed entries are logged and skipped
    pub fn read_systems(
        &self,
        path: &str,
    ) -> Result<Vec<InstanceAddr>> {
        let systems_path = leaf_path(path, LEAF_SYSTEMS);
        let value = read_string(self.client.as_ref(), &systems_path, None)?;
        Ok(value
            .split(SYSTEMS_SEPARATOR)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|s| match s.parse::<InstanceAddr>() {
                Ok(addr) => Some(addr),
                Err(e) => {
                    warn!(path = %systems_path, "Skipping malformed system entry: {}", e);
                    None
                }
            })
            .collect())
    }

    pub fn read_box(
        &self,
        path: &str,
    ) -> Result<Hyperrectangle> {
        let box_path = leaf_path(path, LEAF_BBOX);
        let value = read_string(self.client.as_ref(), &box_path, None)?;
        value.parse::<Hyperrectangle>().map_err(|e| {
            MalformedRemoteState {
                path: box_path,
                value,
                reason: e.to_string(),
            }
            .into()
        })
    }

    pub fn read_region_id(
        &self,
        path: &str,
    ) -> Result<u64> {
        let id_path = leaf_path(path, LEAF_REGION_ID);
        let value = read_string(self.client.as_ref(), &id_path, None)?;
        parse_leaf(&id_path, &value)
    }

    /// `(child number, path)` of every child node, ordered by number
    pub fn list_children(
        &self,
        path: &str,
    ) -> Result<Vec<(u64, String)>> {
        let dir = leaf_path(path, CHILDREN_DIR);
        let names = match self.client.get_children(&dir, None) {
            Ok(names) => names,
            Err(e) if e.is_not_found() => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut children: Vec<(u64, String)> = names
            .iter()
            .filter_map(|name| match name.parse::<u64>() {
                Ok(n) => Some((n, child_path(path, n))),
                Err(_) => {
                    warn!(path = %dir, "Ignoring unexpected child node {:?}", name);
                    None
                }
            })
            .collect();
        children.sort_by_key(|(n, _)| *n);
        Ok(children)
    }

    /// A node is completely created once its version leaf exists
    pub fn is_completely_created(
        &self,
        path: &str,
    ) -> Result<bool> {
        self.client.exists(&leaf_path(path, LEAF_VERSION))
    }
}

/// Region path of the parent, `None` for a group root
pub fn region_parent_path(path: &str) -> Option<&str> {
    let (children_dir, _) = path.rsplit_once('/')?;
    if node_name(children_dir) != CHILDREN_DIR {
        return None;
    }
    children_dir.rsplit_once('/').map(|(parent, _)| parent)
}

pub(crate) fn encode_systems(systems: &[InstanceAddr]) -> String {
    systems
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(&SYSTEMS_SEPARATOR.to_string())
}

fn parse_leaf<T>(
    path: &str,
    value: &str,
) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    value.trim().parse::<T>().map_err(|e| {
        MalformedRemoteState {
            path: path.to_string(),
            value: value.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}
