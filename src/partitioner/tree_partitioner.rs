use std::sync::Arc;

use rand::seq::SliceRandom;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::PartitionerCore;
use super::SpacePartitioner;
use crate::membership::ListenerHandle;
use crate::region::RegionIdMapper;
use crate::region::RegionListener;
use crate::region::RegionNode;
use crate::region::RegionTree;
use crate::Hyperrectangle;
use crate::PartitionerError;
use crate::RegionError;
use crate::RegionState;
use crate::Result;

/// Computes the child boxes of a region that is split
pub trait ChildBoxStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Boxes partitioning `bbox`, in child number order. `level` is the depth
    /// of the region (root = 0), `samples` is never empty.
    fn child_boxes(
        &self,
        bbox: &Hyperrectangle,
        level: usize,
        samples: &[Hyperrectangle],
    ) -> Result<Vec<Hyperrectangle>>;
}

/// Median of `values`, `None` when empty
pub(crate) fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    Some(values[values.len() / 2])
}

/// Random subset of `samples` of `fraction` of its size, at least one element
pub(crate) fn sample_boxes(
    samples: &[Hyperrectangle],
    fraction: f64,
) -> Vec<Hyperrectangle> {
    if samples.is_empty() {
        return Vec::new();
    }
    let wanted = ((samples.len() as f64) * fraction).ceil() as usize;
    let amount = wanted.clamp(1, samples.len());
    samples
        .choose_multiple(&mut rand::thread_rng(), amount)
        .cloned()
        .collect()
}

/// Children must lie inside the parent, be pairwise disjoint and fill it
pub(crate) fn validate_partition(
    region_id: u64,
    parent: &Hyperrectangle,
    children: &[Hyperrectangle],
) -> Result<()> {
    let invalid = |reason: String| -> crate::Error { PartitionerError::InvalidSplit { region_id, reason }.into() };

    if children.len() < 2 {
        return Err(invalid(format!("{} child box(es)", children.len())));
    }
    for (i, child) in children.iter().enumerate() {
        if !parent.covers(child) {
            return Err(invalid(format!("child {i} {child} is not inside {parent}")));
        }
        for (j, other) in children.iter().enumerate().skip(i + 1) {
            if child.intersects(other) {
                return Err(invalid(format!("children {i} and {j} overlap")));
            }
        }
    }

    let parent_volume = parent.volume();
    let children_volume: f64 = children.iter().map(Hyperrectangle::volume).sum();
    if (parent_volume - children_volume).abs() > parent_volume.abs() * 1e-9 {
        return Err(invalid(format!(
            "children volume {children_volume} differs from parent volume {parent_volume}"
        )));
    }
    Ok(())
}

/// Two phase split/merge of a hierarchical partition; the geometry of a split
/// comes from the [`ChildBoxStrategy`].
pub struct TreePartitioner<S> {
    core: PartitionerCore,
    strategy: S,
}

impl<S: ChildBoxStrategy> TreePartitioner<S> {
    pub fn new(
        core: PartitionerCore,
        strategy: S,
    ) -> Self {
        Self { core, strategy }
    }

    pub fn core(&self) -> &PartitionerCore {
        &self.core
    }

    fn root_box(&self) -> Result<Hyperrectangle> {
        let config = self.core.config();
        let bbox: Hyperrectangle = config
            .partitioner_config
            .trim()
            .parse()
            .map_err(|e| PartitionerError::InvalidConfig(format!("root box: {e}")))?;
        if bbox.dimension() != config.dimensions {
            return Err(PartitionerError::InvalidConfig(format!(
                "root box {} has {} dimension(s), the group has {}",
                bbox,
                bbox.dimension(),
                config.dimensions
            ))
            .into());
        }
        Ok(bbox)
    }

    /// `Err` with the reason when `node` can not be split
    fn check_splittable(
        &self,
        tree: &RegionTree,
        node: &RegionNode,
    ) -> std::result::Result<(), String> {
        if !node.is_leaf() {
            return Err("region is already split".into());
        }
        if !node.state().is_write_eligible() {
            return Err(format!("region is {}", node.state()));
        }
        if node.bbox().dimension() == 0 {
            return Err("region box is unbounded".into());
        }
        let cap = self.core.config().target_cell_count;
        if !node.is_root() && cap > 0 && tree.leaves().len() >= cap {
            return Err(format!("target cell count {cap} reached"));
        }
        Ok(())
    }

    fn write_children(
        &self,
        tree: &RegionTree,
        parent: &RegionNode,
        parent_path: &str,
        boxes: &[Hyperrectangle],
        created: &mut Vec<String>,
    ) -> Result<Vec<u64>> {
        let adapter = self.core.adapter();
        let mut utilization = tree.system_utilization();
        let mut region_ids = Vec::with_capacity(boxes.len());

        for (number, bbox) in boxes.iter().enumerate() {
            let region_id = adapter.next_region_id(self.core.group())?;
            let path = adapter.create_child(parent_path, number as u64, region_id, bbox)?;
            created.push(path.clone());

            // child 0 keeps the data of the parent
            let systems = if number == 0 {
                parent.systems().to_vec()
            } else {
                self.core.allocate_systems(&utilization, parent.systems())?
            };
            for system in &systems {
                *utilization.entry(system.clone()).or_insert(0) += 1;
            }
            adapter.set_systems(&path, &systems)?;
            region_ids.push(region_id);
        }
        Ok(region_ids)
    }
}

impl<S: ChildBoxStrategy> SpacePartitioner for TreePartitioner<S> {
    fn group(&self) -> &str {
        self.core.group()
    }

    fn create_root_node(&self) -> Result<RegionNode> {
        let bbox = self.root_box()?;
        self.core.create_root(&bbox)
    }

    fn root_node(&self) -> Option<Arc<RegionTree>> {
        self.core.syncer().root()
    }

    fn is_splittable(
        &self,
        region: &RegionNode,
    ) -> bool {
        let Ok(tree) = self.core.tree() else {
            return false;
        };
        match tree.region(region.region_id()) {
            Ok(node) => self.check_splittable(&tree, node).is_ok(),
            Err(_) => false,
        }
    }

    fn split_region(
        &self,
        region: &RegionNode,
        samples: &[Hyperrectangle],
    ) -> Result<Vec<RegionNode>> {
        self.core.ensure_active()?;
        let tree = self.core.tree()?;
        let (node, path) = self.core.locate(&tree, region)?;
        self.check_splittable(&tree, &node)
            .map_err(|reason| PartitionerError::NotSplittable {
                region_id: node.region_id(),
                reason,
            })?;

        let mut sampled = sample_boxes(samples, self.core.config().sample_fraction);
        if sampled.is_empty() {
            sampled.push(Hyperrectangle::from_point(&node.bbox().center())?);
        }
        let level = tree.level(node.id());
        let boxes = self.strategy.child_boxes(node.bbox(), level, &sampled)?;
        validate_partition(node.region_id(), node.bbox(), &boxes)?;

        self.core.record("split", "prepare");
        self.core.transition(&tree, &node, RegionState::Splitting)?;

        let mut created = Vec::new();
        let region_ids = match self.write_children(&tree, &node, &path, &boxes, &mut created) {
            Ok(ids) => ids,
            Err(e) => {
                warn!(group = %self.core.group(), region_id = node.region_id(), "Unable to write children, rolling back: {}", e);
                for child in created.iter().rev() {
                    if let Err(cleanup) = self.core.adapter().delete_child(child) {
                        warn!(path = %child, "Unable to remove child: {}", cleanup);
                    }
                }
                if let Err(rollback) = self.core.adapter().set_state(&path, RegionState::Active) {
                    warn!(path = %path, "Unable to reactivate region: {}", rollback);
                }
                return Err(e);
            }
        };

        let parent_id = node.region_id();
        let expect_systems = !node.systems().is_empty();
        let tree = self.core.await_tree(|t| {
            let parent_ready = t
                .region(parent_id)
                .map(|p| p.state() == RegionState::Splitting)
                .unwrap_or(false);
            let children_ready = region_ids.iter().all(|id| {
                t.region(*id)
                    .map(|c| !expect_systems || !c.systems().is_empty())
                    .unwrap_or(false)
            });
            parent_ready && children_ready
        })?;

        let children: Vec<RegionNode> = region_ids
            .iter()
            .filter_map(|id| tree.region(*id).ok().cloned())
            .collect();
        info!(
            group = %self.core.group(),
            region_id = parent_id,
            strategy = self.strategy.name(),
            children = ?region_ids,
            "Split region"
        );
        Ok(children)
    }

    fn split_complete(
        &self,
        region: &RegionNode,
        children: &[RegionNode],
    ) -> Result<()> {
        self.core.ensure_active()?;
        self.core.record("split", "complete");

        let tree = self.core.tree()?;
        self.core.transition(&tree, region, RegionState::Split)?;
        for child in children {
            self.core.transition(&tree, child, RegionState::Active)?;
        }

        let parent_id = region.region_id();
        let ids: Vec<u64> = children.iter().map(RegionNode::region_id).collect();
        self.core.await_tree(|t| {
            t.region(parent_id).map(|p| p.state() == RegionState::Split).unwrap_or(false)
                && ids
                    .iter()
                    .all(|id| t.region(*id).map(|c| c.state() == RegionState::Active).unwrap_or(false))
        })?;
        debug!(group = %self.core.group(), region_id = parent_id, "Split complete");
        Ok(())
    }

    fn split_failed(
        &self,
        region: &RegionNode,
        children: &[RegionNode],
    ) -> Result<()> {
        self.core.ensure_active()?;
        self.core.record("split", "failed");

        let tree = self.core.tree()?;
        for child in children {
            match self.core.locate(&tree, child) {
                Ok((_, path)) => self.core.adapter().delete_child(&path)?,
                Err(crate::Error::Region(RegionError::NotFound { .. })) => {
                    debug!(region_id = child.region_id(), "Child already removed");
                }
                Err(e) => return Err(e),
            }
        }
        self.core.transition(&tree, region, RegionState::Active)?;

        let parent_id = region.region_id();
        let ids: Vec<u64> = children.iter().map(RegionNode::region_id).collect();
        self.core.await_tree(|t| {
            t.region(parent_id).map(|p| p.state() == RegionState::Active).unwrap_or(false)
                && ids.iter().all(|id| t.find_by_region_id(*id).is_none())
        })?;
        warn!(group = %self.core.group(), region_id = parent_id, "Split failed, children removed");
        Ok(())
    }

    fn merge_candidates(
        &self,
        region: &RegionNode,
    ) -> Vec<Vec<RegionNode>> {
        self.core.merge_candidates(region)
    }

    fn destination_for_merge(
        &self,
        sources: &[RegionNode],
    ) -> Result<RegionNode> {
        self.core.destination_for_merge(sources)
    }

    fn prepare_merge(
        &self,
        sources: &[RegionNode],
        destination: &RegionNode,
    ) -> Result<()> {
        self.core.prepare_merge(sources, destination)
    }

    fn merge_complete(
        &self,
        sources: &[RegionNode],
        destination: &RegionNode,
    ) -> Result<()> {
        self.core.merge_complete(sources, destination)
    }

    fn merge_failed(
        &self,
        sources: &[RegionNode],
        destination: &RegionNode,
    ) -> Result<()> {
        self.core.merge_failed(sources, destination)
    }

    fn region_id_mapper(&self) -> Arc<RegionIdMapper> {
        self.core.syncer().mapper().clone()
    }

    fn register_listener(
        &self,
        listener: RegionListener,
    ) -> ListenerHandle {
        self.core.syncer().register_listener(listener)
    }

    fn unregister_listener(
        &self,
        handle: ListenerHandle,
    ) -> bool {
        self.core.syncer().unregister_listener(handle)
    }

    fn shutdown(&self) {
        self.core.shutdown();
    }
}
