use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;
use tracing::info;

use super::PartitionerCore;
use super::SpacePartitioner;
use crate::coordination::child_path;
use crate::membership::ListenerHandle;
use crate::region::RegionIdMapper;
use crate::region::RegionListener;
use crate::region::RegionNode;
use crate::region::RegionTree;
use crate::Hyperrectangle;
use crate::InstanceAddr;
use crate::PartitionerError;
use crate::RegionState;
use crate::Result;

/// Parsed `<box>;<size0>;<size1>...` grid configuration
#[derive(Debug, Clone, PartialEq)]
pub struct GridSpec {
    pub bbox: Hyperrectangle,
    pub cell_sizes: Vec<f64>,
}

impl GridSpec {
    pub fn parse(
        value: &str,
        dimensions: usize,
    ) -> Result<Self> {
        let mut parts = value.split(';').map(str::trim);
        let bbox: Hyperrectangle = parts
            .next()
            .unwrap_or_default()
            .parse()
            .map_err(|e| PartitionerError::InvalidConfig(format!("grid box: {e}")))?;

        let cell_sizes = parts
            .map(|s| {
                s.parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite() && *v > 0.0)
                    .ok_or_else(|| PartitionerError::InvalidConfig(format!("invalid cell size {s:?}")))
            })
            .collect::<std::result::Result<Vec<f64>, PartitionerError>>()?;

        if bbox.dimension() != dimensions || cell_sizes.len() != dimensions {
            return Err(PartitionerError::InvalidConfig(format!(
                "grid {value:?} does not match {dimensions} dimension(s)"
            ))
            .into());
        }
        Ok(Self { bbox, cell_sizes })
    }

    /// Cuts `bbox` along `dimension` into slabs of `size`; the last slab
    /// takes the remainder.
    pub fn slabs(
        bbox: &Hyperrectangle,
        dimension: usize,
        size: f64,
    ) -> Result<Vec<Hyperrectangle>> {
        let mut slabs = Vec::new();
        let mut remaining = bbox.clone();
        loop {
            let low = remaining.low(dimension).unwrap_or_default();
            let high = remaining.high(dimension).unwrap_or_default();
            let position = low + size;
            if position <= low {
                return Err(PartitionerError::InvalidConfig(format!(
                    "cell size {size} is below the resolution of {low} in dimension {dimension}"
                ))
                .into());
            }
            if position >= high {
                slabs.push(remaining);
                return Ok(slabs);
            }
            slabs.push(remaining.split_left(position, dimension, true)?);
            remaining = remaining.split_right(position, dimension, false)?;
        }
    }
}

/// Fixed grid created in one go; nothing is ever split or merged
pub struct StaticGridPartitioner {
    core: PartitionerCore,
}

impl StaticGridPartitioner {
    pub fn new(core: PartitionerCore) -> Self {
        Self { core }
    }

    pub fn core(&self) -> &PartitionerCore {
        &self.core
    }

    /// Writes the subtree of `bbox` below `path`, children before their
    /// parent. Dimensions are cut from the last one down to 0.
    fn write_cell(
        &self,
        spec: &GridSpec,
        path: &str,
        bbox: &Hyperrectangle,
        remaining_dimensions: usize,
        parent_systems: &[InstanceAddr],
        utilization: &mut HashMap<InstanceAddr, usize>,
        cells: &mut usize,
    ) -> Result<()> {
        let adapter = self.core.adapter();
        let region_id = adapter.next_region_id(self.core.group())?;

        if remaining_dimensions == 0 {
            let systems = self.core.allocate_systems(utilization, parent_systems)?;
            for system in &systems {
                *utilization.entry(system.clone()).or_insert(0) += 1;
            }
            adapter.create_region_node(path, region_id, bbox, &systems, RegionState::Active)?;
            *cells += 1;
            return Ok(());
        }

        let dimension = remaining_dimensions - 1;
        for (number, slab) in GridSpec::slabs(bbox, dimension, spec.cell_sizes[dimension])?
            .iter()
            .enumerate()
        {
            self.write_cell(
                spec,
                &child_path(path, number as u64),
                slab,
                dimension,
                parent_systems,
                utilization,
                cells,
            )?;
        }
        adapter.create_region_node(path, region_id, bbox, parent_systems, RegionState::Split)?;
        Ok(())
    }

    fn refuse_merge(
        &self,
        sources: &[RegionNode],
    ) -> crate::Error {
        PartitionerError::NotMergeable {
            region_ids: sources.iter().map(RegionNode::region_id).collect(),
            reason: "static grid regions are never merged".into(),
        }
        .into()
    }
}

impl SpacePartitioner for StaticGridPartitioner {
    fn group(&self) -> &str {
        self.core.group()
    }

    fn create_root_node(&self) -> Result<RegionNode> {
        self.core.ensure_active()?;
        let config = self.core.config();
        let spec = GridSpec::parse(&config.partitioner_config, config.dimensions)?;

        let root_systems = self.core.allocate_systems(&HashMap::new(), &[])?;
        let mut utilization = HashMap::new();
        let mut cells = 0;
        let root_path = self.core.adapter().group_path(self.core.group());

        self.write_cell(
            &spec,
            &root_path,
            &spec.bbox,
            config.dimensions,
            &root_systems,
            &mut utilization,
            &mut cells,
        )?;
        info!(group = %self.core.group(), cells, "Created static grid");

        let expected = cells;
        let tree = self.core.await_tree(|t| {
            t.leaves()
                .iter()
                .filter(|n| n.state().is_write_eligible())
                .count()
                == expected
        })?;
        Ok(tree.root_node().clone())
    }

    fn root_node(&self) -> Option<Arc<RegionTree>> {
        self.core.syncer().root()
    }

    fn is_splittable(
        &self,
        _region: &RegionNode,
    ) -> bool {
        false
    }

    fn split_region(
        &self,
        region: &RegionNode,
        _samples: &[Hyperrectangle],
    ) -> Result<Vec<RegionNode>> {
        Err(PartitionerError::NotSplittable {
            region_id: region.region_id(),
            reason: "static grid regions are never split".into(),
        }
        .into())
    }

    fn split_complete(
        &self,
        region: &RegionNode,
        _children: &[RegionNode],
    ) -> Result<()> {
        self.split_region(region, &[]).map(|_| ())
    }

    fn split_failed(
        &self,
        region: &RegionNode,
        _children: &[RegionNode],
    ) -> Result<()> {
        self.split_region(region, &[]).map(|_| ())
    }

    fn merge_candidates(
        &self,
        region: &RegionNode,
    ) -> Vec<Vec<RegionNode>> {
        debug!(region_id = region.region_id(), "Static grid has no merge candidates");
        Vec::new()
    }

    fn destination_for_merge(
        &self,
        sources: &[RegionNode],
    ) -> Result<RegionNode> {
        Err(self.refuse_merge(sources))
    }

    fn prepare_merge(
        &self,
        sources: &[RegionNode],
        _destination: &RegionNode,
    ) -> Result<()> {
        Err(self.refuse_merge(sources))
    }

    fn merge_complete(
        &self,
        sources: &[RegionNode],
        _destination: &RegionNode,
    ) -> Result<()> {
        Err(self.refuse_merge(sources))
    }

    fn merge_failed(
        &self,
        sources: &[RegionNode],
        _destination: &RegionNode,
    ) -> Result<()> {
        Err(self.refuse_merge(sources))
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
