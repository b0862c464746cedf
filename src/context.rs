//! Process wide collaborators, built once and passed around explicitly.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::info;

use crate::coordination::CoordinationPaths;
use crate::coordination::GroupAdapter;
use crate::coordination::GroupConfig;
use crate::coordination::InstanceAdapter;
use crate::membership::MembershipManager;
use crate::membership::MembershipObserver;
use crate::partitioner::build_partitioner;
use crate::partitioner::LowestUtilizationPlacement;
use crate::partitioner::PartitionerCore;
use crate::partitioner::ResourcePlacementStrategy;
use crate::partitioner::SpacePartitioner;
use crate::region::RegionIdMapper;
use crate::region::RegionSyncer;
use crate::CoordinationClient;
use crate::Instance;
use crate::InstanceAddr;
use crate::InstanceState;
use crate::NodeConfig;
use crate::Result;

struct GroupHandle {
    partitioner: Arc<dyn SpacePartitioner>,
    syncer: Arc<RegionSyncer>,
}

/// Owns the coordination client, the membership and one space partitioner
/// per distribution group.
pub struct DistributionContext {
    config: NodeConfig,
    client: Arc<dyn CoordinationClient>,
    groups: GroupAdapter,
    instances: InstanceAdapter,
    membership: Arc<MembershipManager>,
    observer: Arc<MembershipObserver>,
    local_instance: Option<InstanceAddr>,
    placement: Arc<dyn ResourcePlacementStrategy>,
    partitioners: Mutex<HashMap<String, GroupHandle>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl fmt::Debug for DistributionContext {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("DistributionContext")
            .field("cluster", &self.config.cluster.name)
            .field("local_instance", &self.local_instance)
            .field("groups", &self.partitioners.lock().keys().cloned().collect::<Vec<_>>())
            .finish()
    }
}

impl DistributionContext {
    pub fn new(
        config: NodeConfig,
        client: Arc<dyn CoordinationClient>,
    ) -> Arc<Self> {
        Self::with_placement(config, client, Arc::new(LowestUtilizationPlacement))
    }

    pub fn with_placement(
        config: NodeConfig,
        client: Arc<dyn CoordinationClient>,
        placement: Arc<dyn ResourcePlacementStrategy>,
    ) -> Arc<Self> {
        let paths = CoordinationPaths::new(config.cluster.root_path());
        let groups = GroupAdapter::new(client.clone(), paths.clone());
        let instances = InstanceAdapter::new(client.clone(), paths);
        let membership = Arc::new(MembershipManager::new());
        let observer = MembershipObserver::new(client.clone(), instances.clone(), membership.clone());
        let local_instance = config.cluster.local_instance_addr();

        Arc::new(Self {
            config,
            client,
            groups,
            instances,
            membership,
            observer,
            local_instance,
            placement,
            partitioners: Mutex::new(HashMap::new()),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn client(&self) -> &Arc<dyn CoordinationClient> {
        &self.client
    }

    pub fn paths(&self) -> &CoordinationPaths {
        self.groups.paths()
    }

    pub fn group_adapter(&self) -> &GroupAdapter {
        &self.groups
    }

    pub fn instance_adapter(&self) -> &InstanceAdapter {
        &self.instances
    }

    pub fn membership(&self) -> &Arc<MembershipManager> {
        &self.membership
    }

    pub fn local_instance(&self) -> Option<&InstanceAddr> {
        self.local_instance.as_ref()
    }

    /// Reads the membership once and arms its watches
    pub fn init(&self) -> bool {
        self.observer.init()
    }

    /// Publishes `instance` as a READY member of the cluster
    pub fn register_instance(
        &self,
        instance: &Instance,
    ) -> Result<()> {
        self.instances.ensure_layout()?;
        self.instances.update_node_info(instance)?;
        self.instances.update_state(instance.addr(), InstanceState::Ready)?;
        info!(instance = %instance.addr(), "Registered instance");
        Ok(())
    }

    /// Follows the coordination lifecycle on the current tokio runtime:
    /// a lost connection drops the membership and every local region tree.
    pub fn spawn_lifecycle_tasks(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock();
        tasks.push(self.observer.spawn_lifecycle_task());

        let mut state_rx = self.client.service_state();
        let context = Arc::downgrade(self);
        tasks.push(tokio::spawn(async move {
            loop {
                let state = *state_rx.borrow_and_update();
                if state.is_disconnected() {
                    match context.upgrade() {
                        Some(context) => context.reset_region_trees(),
                        None => break,
                    }
                }
                if state_rx.changed().await.is_err() {
                    debug!("Coordination lifecycle channel closed");
                    break;
                }
            }
        }));
    }

    /// Drops every local region tree and mapping; they are read again on
    /// next use.
    pub fn reset_region_trees(&self) {
        let syncers: Vec<Arc<RegionSyncer>> = self.partitioners.lock().values().map(|h| h.syncer.clone()).collect();
        for syncer in syncers {
            syncer.reset();
        }
    }

    pub fn list_groups(&self) -> Result<Vec<String>> {
        self.groups.list_groups()
    }

    /// Partitioner of `group`, built from the stored group configuration on
    /// first use
    pub fn space_partitioner(
        &self,
        group: &str,
    ) -> Result<Arc<dyn SpacePartitioner>> {
        let mut partitioners = self.partitioners.lock();
        if let Some(handle) = partitioners.get(group) {
            return Ok(handle.partitioner.clone());
        }

        let group_config = self.groups.read_group_config(group)?;
        let mapper = Arc::new(RegionIdMapper::new(group, self.config.retry.mapping_lookup));
        let syncer = RegionSyncer::new(
            group,
            self.groups.clone(),
            mapper,
            self.local_instance.clone(),
            self.config.retry.coordination_read,
        );
        let core = PartitionerCore::new(
            group,
            group_config,
            self.groups.clone(),
            syncer.clone(),
            self.membership.clone(),
            self.placement.clone(),
            self.config.region.wait_timeout(),
        );
        let partitioner = build_partitioner(core);
        // reading the tree arms the version watches, the mapper relies on them
        if syncer.root().is_none() {
            debug!(group, "Group has no root region yet");
        }
        debug!(group, "Created space partitioner");

        partitioners.insert(
            group.to_string(),
            GroupHandle {
                partitioner: partitioner.clone(),
                syncer,
            },
        );
        Ok(partitioner)
    }

    /// Writes the group and its initial regions
    pub fn create_distribution_group(
        &self,
        group: &str,
        config: &GroupConfig,
    ) -> Result<Arc<dyn SpacePartitioner>> {
        self.groups.create_distribution_group(group, config)?;
        let partitioner = self.space_partitioner(group)?;
        partitioner.create_root_node()?;
        Ok(partitioner)
    }

    pub fn delete_distribution_group(
        &self,
        group: &str,
    ) -> Result<()> {
        if let Some(handle) = self.partitioners.lock().remove(group) {
            handle.partitioner.shutdown();
        }
        self.groups.delete_distribution_group(group)
    }

    pub fn shutdown(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        let handles: Vec<(String, GroupHandle)> = self.partitioners.lock().drain().collect();
        for (group, handle) in handles {
            debug!(group = %group, "Shutting down partitioner");
            handle.partitioner.shutdown();
        }
    }
}
