//! Arena backed region tree of one distribution group.
//!
//! Nodes live in a map keyed by [`NodeId`]; the parent link is an id, children
//! are kept per child number. Ids are never reused within one tree.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::fmt;

use super::RegionState;
use crate::Hyperrectangle;
use crate::InstanceAddr;
use crate::RegionError;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl fmt::Display for NodeId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegionNode {
    id: NodeId,
    region_id: u64,
    group: String,
    child_number: u64,
    bbox: Hyperrectangle,
    state: RegionState,
    systems: Vec<InstanceAddr>,
    parent: Option<NodeId>,
    children: BTreeMap<u64, NodeId>,
}

impl RegionNode {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn region_id(&self) -> u64 {
        self.region_id
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// Index below the parent, 0 for the root
    pub fn child_number(&self) -> u64 {
        self.child_number
    }

    pub fn bbox(&self) -> &Hyperrectangle {
        &self.bbox
    }

    pub fn state(&self) -> RegionState {
        self.state
    }

    pub fn systems(&self) -> &[InstanceAddr] {
        &self.systems
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn child_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.children.values().copied()
    }

    pub fn child_numbers(&self) -> impl Iterator<Item = u64> + '_ {
        self.children.keys().copied()
    }

    /// `<group>_<regionId>`
    pub fn identifier(&self) -> String {
        format!("{}_{}", self.group, self.region_id)
    }

    pub fn is_served_by(
        &self,
        addr: &InstanceAddr,
    ) -> bool {
        self.systems.contains(addr)
    }
}

/// Regions of one instance touched by a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingHop {
    pub instance: InstanceAddr,
    pub region_ids: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegionTree {
    group: String,
    root: NodeId,
    nodes: HashMap<NodeId, RegionNode>,
    next_id: u64,
}

impl RegionTree {
    /// Tree consisting of a root in state `Creating`
    pub fn new(
        group: impl Into<String>,
        region_id: u64,
        bbox: Hyperrectangle,
    ) -> Self {
        let group = group.into();
        let root = NodeId(0);
        let mut nodes = HashMap::new();
        nodes.insert(
            root,
            RegionNode {
                id: root,
                region_id,
                group: group.clone(),
                child_number: 0,
                bbox,
                state: RegionState::Creating,
                systems: Vec::new(),
                parent: None,
                children: BTreeMap::new(),
            },
        );
        Self {
            group,
            root,
            nodes,
            next_id: 1,
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn root_node(&self) -> &RegionNode {
        &self.nodes[&self.root]
    }

    pub fn get(
        &self,
        id: NodeId,
    ) -> Option<&RegionNode> {
        self.nodes.get(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(
        &self,
        id: NodeId,
    ) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn find_by_region_id(
        &self,
        region_id: u64,
    ) -> Option<NodeId> {
        self.nodes.values().find(|n| n.region_id == region_id).map(|n| n.id)
    }

    pub fn region(
        &self,
        region_id: u64,
    ) -> Result<&RegionNode> {
        self.find_by_region_id(region_id)
            .and_then(|id| self.nodes.get(&id))
            .ok_or_else(|| {
                RegionError::NotFound {
                    group: self.group.clone(),
                    region_id,
                }
                .into()
            })
    }

    pub fn child(
        &self,
        parent: NodeId,
        child_number: u64,
    ) -> Option<NodeId> {
        self.nodes.get(&parent)?.children.get(&child_number).copied()
    }

    /// Follows child numbers from the root
    pub fn resolve_path(
        &self,
        child_numbers: &[u64],
    ) -> Option<NodeId> {
        child_numbers
            .iter()
            .try_fold(self.root, |id, n| self.child(id, *n))
    }

    /// Child numbers leading from the root to `id`
    pub fn path_of(
        &self,
        id: NodeId,
    ) -> Vec<u64> {
        let mut path = Vec::new();
        let mut current = self.nodes.get(&id);
        while let Some(node) = current {
            match node.parent {
                Some(parent) => {
                    path.push(node.child_number);
                    current = self.nodes.get(&parent);
                }
                None => break,
            }
        }
        path.reverse();
        path
    }

    /// Attaches a new child in state `Creating`
    pub fn add_child(
        &mut self,
        parent: NodeId,
        child_number: u64,
        region_id: u64,
        bbox: Hyperrectangle,
    ) -> Result<NodeId> {
        let parent_node = self.nodes.get(&parent).ok_or_else(|| RegionError::NotFound {
            group: self.group.clone(),
            region_id,
        })?;

        if parent_node.children.contains_key(&child_number) {
            return Err(RegionError::ChildExists {
                parent_region_id: parent_node.region_id,
                child_number,
            }
            .into());
        }

        if !parent_node.bbox.covers(&bbox) {
            return Err(RegionError::BoxNotContained { region_id }.into());
        }

        let id = NodeId(self.next_id);
        self.next_id += 1;

        let node = RegionNode {
            id,
            region_id,
            group: self.group.clone(),
            child_number,
            bbox,
            state: RegionState::Creating,
            systems: Vec::new(),
            parent: Some(parent),
            children: BTreeMap::new(),
        };
        self.nodes.insert(id, node);
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.children.insert(child_number, id);
        }
        Ok(id)
    }

    /// Detaches `id` and drops its subtree. Returns the removed nodes, the
    /// subtree root first. The tree root can not be removed.
    pub fn remove_child(
        &mut self,
        id: NodeId,
    ) -> Vec<RegionNode> {
        let parent = match self.nodes.get(&id).and_then(|n| n.parent) {
            Some(parent) => parent,
            None => return Vec::new(),
        };

        let subtree = self.this_and_descendants(id);
        let mut removed = Vec::with_capacity(subtree.len());
        for node_id in subtree {
            if let Some(node) = self.nodes.remove(&node_id) {
                removed.push(node);
            }
        }

        if let (Some(first), Some(p)) = (removed.first(), self.nodes.get_mut(&parent)) {
            p.children.remove(&first.child_number);
        }
        removed
    }

    pub(crate) fn set_state(
        &mut self,
        id: NodeId,
        state: RegionState,
    ) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.state = state;
        }
    }

    pub(crate) fn set_systems(
        &mut self,
        id: NodeId,
        systems: Vec<InstanceAddr>,
    ) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.systems = systems;
        }
    }

    pub fn direct_children(
        &self,
        id: NodeId,
    ) -> Vec<&RegionNode> {
        self.nodes
            .get(&id)
            .map(|n| n.children.values().filter_map(|c| self.nodes.get(c)).collect())
            .unwrap_or_default()
    }

    /// Breadth first, `id` first
    pub fn this_and_descendants(
        &self,
        id: NodeId,
    ) -> Vec<NodeId> {
        let mut result = Vec::new();
        if !self.nodes.contains_key(&id) {
            return result;
        }
        let mut queue = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            result.push(current);
            if let Some(node) = self.nodes.get(&current) {
                queue.extend(node.children.values().copied());
            }
        }
        result
    }

    pub fn descendants(
        &self,
        id: NodeId,
    ) -> Vec<NodeId> {
        let mut all = self.this_and_descendants(id);
        if !all.is_empty() {
            all.remove(0);
        }
        all
    }

    /// All nodes, breadth first from the root
    pub fn iter(&self) -> impl Iterator<Item = &RegionNode> + '_ {
        self.this_and_descendants(self.root)
            .into_iter()
            .filter_map(move |id| self.nodes.get(&id))
    }

    pub fn leaves(&self) -> Vec<&RegionNode> {
        self.iter().filter(|n| n.is_leaf()).collect()
    }

    /// Root = 0
    pub fn level(
        &self,
        id: NodeId,
    ) -> usize {
        self.path_of(id).len()
    }

    /// Number of levels of the tree, 1 for a lone root
    pub fn total_level(&self) -> usize {
        self.iter().map(|n| self.level(n.id)).max().unwrap_or(0) + 1
    }

    pub fn highest_child_number(
        &self,
        id: NodeId,
    ) -> Option<u64> {
        self.nodes.get(&id)?.children.keys().next_back().copied()
    }

    pub fn is_leaf(
        &self,
        id: NodeId,
    ) -> bool {
        self.nodes.get(&id).map(RegionNode::is_leaf).unwrap_or(false)
    }

    pub fn identifier(
        &self,
        id: NodeId,
    ) -> Option<String> {
        self.nodes.get(&id).map(RegionNode::identifier)
    }

    /// Regions intersecting `bbox` whose state passes `predicate`. Subtrees
    /// not intersecting the box are skipped.
    pub fn regions_for_box<P>(
        &self,
        bbox: &Hyperrectangle,
        predicate: P,
    ) -> Vec<&RegionNode>
    where
        P: Fn(RegionState) -> bool,
    {
        let mut result = Vec::new();
        let mut queue = VecDeque::from([self.root]);
        while let Some(id) = queue.pop_front() {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            if !node.bbox.intersects(bbox) {
                continue;
            }
            if predicate(node.state) {
                result.push(node);
            }
            queue.extend(node.children.values().copied());
        }
        result
    }

    /// Regions of [`Self::regions_for_box`] grouped per replica holder
    pub fn routing_hops<P>(
        &self,
        bbox: &Hyperrectangle,
        predicate: P,
    ) -> Vec<RoutingHop>
    where
        P: Fn(RegionState) -> bool,
    {
        let mut hops: BTreeMap<InstanceAddr, Vec<u64>> = BTreeMap::new();
        for region in self.regions_for_box(bbox, predicate) {
            for system in &region.systems {
                hops.entry(system.clone()).or_default().push(region.region_id);
            }
        }
        hops.into_iter()
            .map(|(instance, mut region_ids)| {
                region_ids.sort_unstable();
                RoutingHop { instance, region_ids }
            })
            .collect()
    }

    /// Number of regions each instance holds a replica of
    pub fn system_utilization(&self) -> HashMap<InstanceAddr, usize> {
        let mut utilization = HashMap::new();
        for node in self.nodes.values() {
            for system in &node.systems {
                *utilization.entry(system.clone()).or_insert(0) += 1;
            }
        }
        utilization
    }

    /// `(region id, box)` of every write eligible region served by `local`
    pub fn local_write_regions(
        &self,
        local: &InstanceAddr,
    ) -> Vec<(u64, Hyperrectangle)> {
        self.nodes
            .values()
            .filter(|n| n.state.is_write_eligible() && n.is_served_by(local))
            .map(|n| (n.region_id, n.bbox.clone()))
            .collect()
    }
}
