use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use spacedist::coordination::GroupConfig;
use spacedist::coordination::InMemoryCoordinator;
use spacedist::coordination::PartitionerKind;
use spacedist::CoordinationClient;
use spacedist::DistributionContext;
use spacedist::Hyperrectangle;
use spacedist::Instance;
use spacedist::InstanceAddr;
use spacedist::InstanceState;
use spacedist::NodeConfig;
use spacedist::RetryPolicy;

pub const CLUSTER: &str = "integration";

pub const WAIT_TIMEOUT: Duration = Duration::from_secs(3);

pub fn addr(port: u16) -> InstanceAddr {
    InstanceAddr::new("127.0.0.1", port)
}

/// Configuration of a process serving regions as `127.0.0.1:<port>`
pub fn node_config(port: u16) -> NodeConfig {
    let mut config = NodeConfig::default();
    config.cluster.name = CLUSTER.to_string();
    config.cluster.local_instance = Some(addr(port).to_string());
    config.retry.coordination_read = RetryPolicy::new(3, 5);
    config.retry.mapping_lookup = RetryPolicy::new(3, 5);
    config.region.wait_timeout_ms = WAIT_TIMEOUT.as_millis() as u64;
    config
}

/// Starts a process on `port`: publishes it as READY and reads the membership
pub fn start_process(
    coordinator: &Arc<InMemoryCoordinator>,
    port: u16,
) -> Arc<DistributionContext> {
    let client: Arc<dyn CoordinationClient> = coordinator.clone();
    let context = DistributionContext::new(node_config(port), client);
    context
        .register_instance(&Instance::with_state(addr(port), InstanceState::Ready))
        .unwrap();
    assert!(context.init());
    context
}

pub fn quadtree_group(context: &DistributionContext) -> GroupConfig {
    GroupConfig::new(
        2,
        PartitionerKind::Quadtree,
        "[[0,100]:[0,100]]",
        &context.config().partitioner,
    )
}

pub fn points(coordinates: &[[f64; 2]]) -> Vec<Hyperrectangle> {
    coordinates
        .iter()
        .map(|c| Hyperrectangle::from_point(c).unwrap())
        .collect()
}

/// Polls `condition` until it holds or `timeout` passes
pub async fn eventually<F>(
    timeout: Duration,
    condition: F,
) -> bool
where
    F: Fn() -> bool,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
