use std::collections::HashMap;

#[cfg(test)]
use mockall::automock;
use tracing::trace;

use crate::Instance;
use crate::InstanceAddr;
use crate::InstanceState;
use crate::PartitionerError;
use crate::Result;

/// Chooses the replica holders of a new region
#[cfg_attr(test, automock)]
pub trait ResourcePlacementStrategy: Send + Sync {
    /// `count` distinct instances out of `candidates`, none of them in
    /// `blacklist`. `utilization` holds the number of regions per instance.
    fn place(
        &self,
        candidates: &[Instance],
        utilization: &HashMap<InstanceAddr, usize>,
        count: usize,
        blacklist: &[InstanceAddr],
    ) -> Result<Vec<InstanceAddr>>;
}

/// Picks the READY instances holding the fewest regions; ties are broken
/// by address.
#[derive(Debug, Clone, Copy, Default)]
pub struct LowestUtilizationPlacement;

impl ResourcePlacementStrategy for LowestUtilizationPlacement {
    fn place(
        &self,
        candidates: &[Instance],
        utilization: &HashMap<InstanceAddr, usize>,
        count: usize,
        blacklist: &[InstanceAddr],
    ) -> Result<Vec<InstanceAddr>> {
        let mut usable: Vec<(usize, &InstanceAddr)> = candidates
            .iter()
            .filter(|i| i.state() == InstanceState::Ready)
            .filter(|i| !blacklist.contains(i.addr()))
            .map(|i| (utilization.get(i.addr()).copied().unwrap_or(0), i.addr()))
            .collect();
        usable.sort();
        usable.dedup_by(|a, b| a.1 == b.1);

        if usable.len() < count {
            return Err(PartitionerError::ResourceAllocation {
                required: count,
                available: usable.len(),
            }
            .into());
        }

        let chosen: Vec<InstanceAddr> = usable.into_iter().take(count).map(|(_, a)| a.clone()).collect();
        trace!(?chosen, "Placed region replicas");
        Ok(chosen)
    }
}
