//! Space partitioners: the split/merge protocol of a distribution group and
//! the strategies deciding the geometry of new regions.
//!
//! Both protocols run in two phases. `split_region` writes the children in
//! state CREATING and moves the parent to SPLITTING; the caller then moves the
//! data and ends with `split_complete` or `split_failed`. Merging works the
//! same way with `prepare_merge`, `merge_complete` and `merge_failed`. Every
//! step waits until the local tree reflects its own writes before returning.
//! Nothing is retried automatically.

mod base;
mod grid;
mod kdtree;
mod placement;
mod quadtree;
mod tree_partitioner;

pub use base::*;
pub use grid::*;
pub use kdtree::*;
pub use placement::*;
pub use quadtree::*;
pub use tree_partitioner::*;


use std::sync::Arc;

use crate::coordination::PartitionerKind;
use crate::membership::ListenerHandle;
use crate::region::RegionIdMapper;
use crate::region::RegionListener;
use crate::region::RegionNode;
use crate::region::RegionTree;
use crate::Hyperrectangle;
use crate::Result;

/// Split/merge protocol of one distribution group.
///
/// Regions passed in are looked up again by region id in the current tree,
/// so stale copies are fine.
pub trait SpacePartitioner: Send + Sync {
    fn group(&self) -> &str;

    /// Writes the initial region(s) of the group and returns the root
    fn create_root_node(&self) -> Result<RegionNode>;

    /// Current tree, `None` while the group has no root
    fn root_node(&self) -> Option<Arc<RegionTree>>;

    fn is_splittable(
        &self,
        region: &RegionNode,
    ) -> bool;

    /// Proposes children for `region` from recently seen data. The children
    /// are CREATING, the region SPLITTING.
    fn split_region(
        &self,
        region: &RegionNode,
        samples: &[Hyperrectangle],
    ) -> Result<Vec<RegionNode>>;

    fn split_complete(
        &self,
        region: &RegionNode,
        children: &[RegionNode],
    ) -> Result<()>;

    fn split_failed(
        &self,
        region: &RegionNode,
        children: &[RegionNode],
    ) -> Result<()>;

    fn merge_candidates(
        &self,
        region: &RegionNode,
    ) -> Vec<Vec<RegionNode>>;

    fn destination_for_merge(
        &self,
        sources: &[RegionNode],
    ) -> Result<RegionNode>;

    fn prepare_merge(
        &self,
        sources: &[RegionNode],
        destination: &RegionNode,
    ) -> Result<()>;

    fn merge_complete(
        &self,
        sources: &[RegionNode],
        destination: &RegionNode,
    ) -> Result<()>;

    fn merge_failed(
        &self,
        sources: &[RegionNode],
        destination: &RegionNode,
    ) -> Result<()>;

    fn region_id_mapper(&self) -> Arc<RegionIdMapper>;

    fn register_listener(
        &self,
        listener: RegionListener,
    ) -> ListenerHandle;

    fn unregister_listener(
        &self,
        handle: ListenerHandle,
    ) -> bool;

    fn shutdown(&self);
}

/// Partitioner of the kind stored in the group configuration
pub fn build_partitioner(core: PartitionerCore) -> Arc<dyn SpacePartitioner> {
    match core.config().partitioner {
        PartitionerKind::KdTree => Arc::new(TreePartitioner::new(core, KdTreeStrategy)),
        PartitionerKind::Quadtree => Arc::new(TreePartitioner::new(core, QuadtreeStrategy)),
        PartitionerKind::StaticGrid => Arc::new(StaticGridPartitioner::new(core)),
    }
}
