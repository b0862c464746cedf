//! State and protocol steps shared by every partitioner of a group.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use tracing::info;
use tracing::warn;

use super::ResourcePlacementStrategy;
use crate::coordination::GroupAdapter;
use crate::coordination::GroupConfig;
use crate::membership::MembershipManager;
use crate::metrics::PARTITIONER_OPERATIONS;
use crate::region::RegionNode;
use crate::region::RegionSyncer;
use crate::region::RegionTree;
use crate::Hyperrectangle;
use crate::InstanceAddr;
use crate::PartitionerError;
use crate::RegionError;
use crate::RegionState;
use crate::Result;

pub struct PartitionerCore {
    group: String,
    config: GroupConfig,
    adapter: GroupAdapter,
    syncer: Arc<RegionSyncer>,
    membership: Arc<MembershipManager>,
    placement: Arc<dyn ResourcePlacementStrategy>,
    wait_timeout: Duration,
    active: AtomicBool,
}

impl fmt::Debug for PartitionerCore {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("PartitionerCore")
            .field("group", &self.group)
            .field("config", &self.config)
            .field("active", &self.active.load(Ordering::Relaxed))
            .finish()
    }
}

impl PartitionerCore {
    pub fn new(
        group: impl Into<String>,
        config: GroupConfig,
        adapter: GroupAdapter,
        syncer: Arc<RegionSyncer>,
        membership: Arc<MembershipManager>,
        placement: Arc<dyn ResourcePlacementStrategy>,
        wait_timeout: Duration,
    ) -> Self {
        Self {
            group: group.into(),
            config,
            adapter,
            syncer,
            membership,
            placement,
            wait_timeout,
            active: AtomicBool::new(true),
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn config(&self) -> &GroupConfig {
        &self.config
    }

    pub fn adapter(&self) -> &GroupAdapter {
        &self.adapter
    }

    pub fn syncer(&self) -> &Arc<RegionSyncer> {
        &self.syncer
    }

    pub fn ensure_active(&self) -> Result<()> {
        if self.active.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(PartitionerError::Inactive(self.group.clone()).into())
        }
    }

    pub fn shutdown(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            info!(group = %self.group, "Shutting down space partitioner");
            self.syncer.shutdown();
        }
    }

    pub fn record(
        &self,
        operation: &str,
        phase: &str,
    ) {
        PARTITIONER_OPERATIONS.with_label_values(&[operation, phase]).inc();
    }

    /// Current tree of the group
    pub fn tree(&self) -> Result<Arc<RegionTree>> {
        self.syncer
            .root()
            .ok_or_else(|| RegionError::NoRootRegion(self.group.clone()).into())
    }

    /// Blocks until the local tree reflects the group's own writes
    pub fn await_tree<P>(
        &self,
        predicate: P,
    ) -> Result<Arc<RegionTree>>
    where
        P: Fn(&RegionTree) -> bool,
    {
        self.syncer.wait_for(predicate, self.wait_timeout)
    }

    /// Fresh view of `region` and its coordination path
    pub fn locate(
        &self,
        tree: &RegionTree,
        region: &RegionNode,
    ) -> Result<(RegionNode, String)> {
        let node = tree.region(region.region_id())?.clone();
        let path = self.adapter.paths().region_path(&self.group, &tree.path_of(node.id()));
        Ok((node, path))
    }

    /// Moves `region` to `to` unless it is already there
    pub fn transition(
        &self,
        tree: &RegionTree,
        region: &RegionNode,
        to: RegionState,
    ) -> Result<()> {
        let (node, path) = self.locate(tree, region)?;
        if node.state().check_transition(to)? {
            debug!(group = %self.group, region_id = node.region_id(), from = %node.state(), %to, "Changing region state");
            self.adapter.set_state(&path, to)?;
        }
        Ok(())
    }

    /// Replica holders for a new region; `fallback` is used when placement
    /// fails
    pub fn allocate_systems(
        &self,
        utilization: &HashMap<InstanceAddr, usize>,
        fallback: &[InstanceAddr],
    ) -> Result<Vec<InstanceAddr>> {
        let candidates = self.membership.instances();
        match self
            .placement
            .place(&candidates, utilization, self.config.replication_factor, &[])
        {
            Ok(systems) => Ok(systems),
            Err(e) if !fallback.is_empty() => {
                warn!(group = %self.group, "Unable to place region, using the parent systems: {}", e);
                Ok(fallback.to_vec())
            }
            Err(e) => Err(e),
        }
    }

    /// Writes the group root in `Active` state and waits until it is visible
    pub fn create_root(
        &self,
        bbox: &Hyperrectangle,
    ) -> Result<RegionNode> {
        self.ensure_active()?;
        let systems = self.allocate_systems(&HashMap::new(), &[])?;
        let region_id = self.adapter.next_region_id(&self.group)?;
        let path = self.adapter.group_path(&self.group);

        self.adapter
            .create_region_node(&path, region_id, bbox, &systems, RegionState::Active)?;
        info!(group = %self.group, region_id, %bbox, "Created root region");

        let tree = self.await_tree(|t| {
            let root = t.root_node();
            root.region_id() == region_id && root.state() == RegionState::Active
        })?;
        Ok(tree.root_node().clone())
    }

    // -
    // Merging of sibling leaves

    /// All siblings of `region`, when they can be merged into their parent
    pub fn merge_candidates(
        &self,
        region: &RegionNode,
    ) -> Vec<Vec<RegionNode>> {
        let Ok(tree) = self.tree() else {
            return Vec::new();
        };
        let Ok(node) = tree.region(region.region_id()) else {
            return Vec::new();
        };
        if node.is_root() || !node.state().is_write_eligible() {
            return Vec::new();
        }
        let Some(parent) = node.parent().and_then(|p| tree.get(p)) else {
            return Vec::new();
        };
        if parent.state() != RegionState::Split {
            return Vec::new();
        }

        let siblings = tree.direct_children(parent.id());
        let mergeable = siblings.len() >= self.config.min_merge_size
            && siblings
                .iter()
                .all(|s| s.is_leaf() && s.state().is_write_eligible());
        if !mergeable {
            return Vec::new();
        }
        vec![siblings.into_iter().cloned().collect()]
    }

    /// The common parent of `sources`
    pub fn destination_for_merge(
        &self,
        sources: &[RegionNode],
    ) -> Result<RegionNode> {
        let tree = self.tree()?;
        let not_mergeable = |reason: &str| -> crate::Error {
            PartitionerError::NotMergeable {
                region_ids: sources.iter().map(RegionNode::region_id).collect(),
                reason: reason.to_string(),
            }
            .into()
        };

        let mut parents = Vec::with_capacity(sources.len());
        for source in sources {
            let node = tree.region(source.region_id())?;
            parents.push(node.parent().ok_or_else(|| not_mergeable("the root can not be merged"))?);
        }
        let Some(first) = parents.first().copied() else {
            return Err(not_mergeable("no regions given"));
        };
        if parents.iter().any(|p| *p != first) {
            return Err(not_mergeable("regions have different parents"));
        }
        tree.get(first)
            .cloned()
            .ok_or_else(|| not_mergeable("parent is unknown"))
    }

    /// Sources -> MERGING
    pub fn prepare_merge(
        &self,
        sources: &[RegionNode],
        destination: &RegionNode,
    ) -> Result<()> {
        self.ensure_active()?;
        self.check_merge_group(sources, destination)?;
        self.record("merge", "prepare");

        let tree = self.tree()?;
        for source in sources {
            self.transition(&tree, source, RegionState::Merging)?;
        }
        let ids: Vec<u64> = sources.iter().map(RegionNode::region_id).collect();
        self.await_tree(|t| {
            ids.iter()
                .all(|id| t.region(*id).map(|n| n.state() == RegionState::Merging).unwrap_or(false))
        })?;
        Ok(())
    }

    /// Parent SPLIT -> ACTIVE, sources deleted
    pub fn merge_complete(
        &self,
        sources: &[RegionNode],
        destination: &RegionNode,
    ) -> Result<()> {
        self.ensure_active()?;
        self.check_merge_group(sources, destination)?;
        self.record("merge", "complete");

        let tree = self.tree()?;
        self.transition(&tree, destination, RegionState::Active)?;
        for source in sources {
            let (_, path) = self.locate(&tree, source)?;
            self.adapter.delete_child(&path)?;
        }

        let ids: Vec<u64> = sources.iter().map(RegionNode::region_id).collect();
        let destination_id = destination.region_id();
        self.await_tree(|t| {
            ids.iter().all(|id| t.find_by_region_id(*id).is_none())
                && t.region(destination_id).map(|n| n.state() == RegionState::Active).unwrap_or(false)
        })?;
        info!(group = %self.group, region_id = destination_id, merged = ?ids, "Merge complete");
        Ok(())
    }

    /// Sources MERGING -> ACTIVE
    pub fn merge_failed(
        &self,
        sources: &[RegionNode],
        destination: &RegionNode,
    ) -> Result<()> {
        self.ensure_active()?;
        self.check_merge_group(sources, destination)?;
        self.record("merge", "failed");

        let tree = self.tree()?;
        for source in sources {
            self.transition(&tree, source, RegionState::Active)?;
        }
        let ids: Vec<u64> = sources.iter().map(RegionNode::region_id).collect();
        self.await_tree(|t| {
            ids.iter()
                .all(|id| t.region(*id).map(|n| n.state() == RegionState::Active).unwrap_or(false))
        })?;
        warn!(group = %self.group, region_id = destination.region_id(), "Merge failed, regions are active again");
        Ok(())
    }

    fn check_merge_group(
        &self,
        sources: &[RegionNode],
        destination: &RegionNode,
    ) -> Result<()> {
        let parent = self.destination_for_merge(sources)?;
        if parent.region_id() != destination.region_id() {
            return Err(PartitionerError::NotMergeable {
                region_ids: sources.iter().map(RegionNode::region_id).collect(),
                reason: format!("destination {} is not the common parent", destination.region_id()),
            }
            .into());
        }
        Ok(())
    }
}
