use std::sync::Arc;

use spacedist::coordination::InMemoryCoordinator;
use spacedist::Instance;
use spacedist::InstanceState;
use tracing_test::traced_test;

use crate::common::addr;
use crate::common::eventually;
use crate::common::quadtree_group;
use crate::common::start_process;
use crate::common::WAIT_TIMEOUT;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[traced_test]
async fn test_disconnect_and_reconnect() {
    let coordinator = Arc::new(InMemoryCoordinator::new());
    let context = start_process(&coordinator, 7301);
    let partitioner = context
        .create_distribution_group("points", &quadtree_group(&context))
        .unwrap();
    context.spawn_lifecycle_tasks();
    assert_eq!(context.membership().len(), 1);
    assert_eq!(partitioner.region_id_mapper().len(), 1);

    coordinator.simulate_disconnect();

    assert!(eventually(WAIT_TIMEOUT, || context.membership().is_empty()).await);
    assert!(eventually(WAIT_TIMEOUT, || partitioner.region_id_mapper().is_empty()).await);
    assert!(partitioner.root_node().is_none());

    coordinator.reconnect();

    // the liveness node ended with the old session
    assert!(
        eventually(WAIT_TIMEOUT, || {
            context.membership().instances_with_state(InstanceState::Failed).len() == 1
        })
        .await
    );

    context
        .register_instance(&Instance::with_state(addr(7301), InstanceState::Ready))
        .unwrap();
    assert!(
        eventually(WAIT_TIMEOUT, || {
            context.membership().instances_with_state(InstanceState::Ready).len() == 1
        })
        .await
    );

    // persistent region nodes survived
    let tree = partitioner.root_node().unwrap();
    assert_eq!(tree.len(), 1);
    assert_eq!(
        partitioner.region_id_mapper().all_region_ids(),
        vec![tree.root_node().region_id()]
    );

    context.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_writes_fail_while_disconnected() {
    let coordinator = Arc::new(InMemoryCoordinator::new());
    let context = start_process(&coordinator, 7302);
    context.spawn_lifecycle_tasks();

    coordinator.simulate_disconnect();

    match context.create_distribution_group("points", &quadtree_group(&context)) {
        Err(e) => assert!(e.is_retryable(), "unexpected error: {e}"),
        Ok(_) => panic!("group creation succeeded without a coordination session"),
    }
    assert!(context.list_groups().is_err());

    context.shutdown();
}
