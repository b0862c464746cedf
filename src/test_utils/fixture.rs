use std::sync::Arc;
use std::time::Duration;

use super::addr;
use super::coordinator;
use super::fast_retry;
use super::group_adapter;
use super::ready_instance;
use crate::coordination::GroupAdapter;
use crate::coordination::GroupConfig;
use crate::coordination::InMemoryCoordinator;
use crate::coordination::PartitionerKind;
use crate::membership::MembershipManager;
use crate::partitioner::build_partitioner;
use crate::partitioner::LowestUtilizationPlacement;
use crate::partitioner::PartitionerCore;
use crate::partitioner::ResourcePlacementStrategy;
use crate::partitioner::SpacePartitioner;
use crate::region::RegionIdMapper;
use crate::region::RegionSyncer;
use crate::InstanceAddr;
use crate::PartitionerConfig;

pub(crate) const LOCAL_PORT: u16 = 9001;

/// One distribution group wired to an inline coordinator, with three READY
/// instances and `127.0.0.1:9001` as the local instance. The root region is
/// not created.
pub(crate) struct GroupFixture {
    pub coordinator: Arc<InMemoryCoordinator>,
    pub adapter: GroupAdapter,
    pub membership: Arc<MembershipManager>,
    pub syncer: Arc<RegionSyncer>,
    pub partitioner: Arc<dyn SpacePartitioner>,
}

impl GroupFixture {
    pub(crate) fn new(
        group: &str,
        partitioner: PartitionerKind,
        partitioner_config: &str,
        dimensions: usize,
    ) -> Self {
        let config = GroupConfig::new(
            dimensions,
            partitioner,
            partitioner_config,
            &PartitionerConfig::default(),
        );
        Self::with_config(group, config)
    }

    pub(crate) fn with_config(
        group: &str,
        config: GroupConfig,
    ) -> Self {
        Self::with_placement(group, config, Arc::new(LowestUtilizationPlacement))
    }

    pub(crate) fn with_placement(
        group: &str,
        config: GroupConfig,
        placement: Arc<dyn ResourcePlacementStrategy>,
    ) -> Self {
        let coordinator = coordinator();
        let adapter = group_adapter(&coordinator);
        adapter.create_distribution_group(group, &config).unwrap();

        let membership = Arc::new(MembershipManager::new());
        membership.update_instance_list((LOCAL_PORT..LOCAL_PORT + 3).map(ready_instance));

        let mapper = Arc::new(RegionIdMapper::new(group, fast_retry()));
        let syncer = RegionSyncer::new(
            group,
            adapter.clone(),
            mapper,
            Some(Self::local()),
            fast_retry(),
        );
        let core = PartitionerCore::new(
            group,
            config,
            adapter.clone(),
            syncer.clone(),
            membership.clone(),
            placement,
            Duration::from_secs(2),
        );

        Self {
            coordinator,
            adapter,
            membership,
            syncer,
            partitioner: build_partitioner(core),
        }
    }

    pub(crate) fn local() -> InstanceAddr {
        addr(LOCAL_PORT)
    }
}
