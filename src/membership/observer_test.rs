use std::sync::Arc;
use std::time::Duration;

use tracing_test::traced_test;

use super::*;
use crate::coordination::InMemoryCoordinator;
use crate::coordination::InstanceAdapter;
use crate::coordination::Watcher;
use crate::test_utils::addr;
use crate::test_utils::coordinator;
use crate::test_utils::test_paths;
use crate::CoordinationClient;
use crate::InstanceState;

fn observer(coordinator: &Arc<InMemoryCoordinator>) -> (Arc<MembershipObserver>, InstanceAdapter) {
    let client: Arc<dyn CoordinationClient> = coordinator.clone();
    let adapter = InstanceAdapter::new(client.clone(), test_paths());
    let manager = Arc::new(MembershipManager::new());
    (MembershipObserver::new(client, adapter.clone(), manager), adapter)
}

fn publish(
    adapter: &InstanceAdapter,
    port: u16,
    state: InstanceState,
) {
    adapter.update_node_info(&Instance::new(addr(port))).unwrap();
    adapter.update_state(&addr(port), state).unwrap();
}

async fn wait_for_len(
    manager: &MembershipManager,
    len: usize,
) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while manager.len() != len {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("membership did not reach the expected size");
}

#[test]
#[traced_test]
fn test_init_reads_current_membership() {
    let coordinator = coordinator();
    let (observer, adapter) = observer(&coordinator);
    adapter.ensure_layout().unwrap();
    publish(&adapter, 9001, InstanceState::Ready);
    publish(&adapter, 9002, InstanceState::Ready);

    assert!(observer.init());
    assert_eq!(observer.manager().len(), 2);
}

#[test]
fn test_watch_follows_liveness_changes() {
    let coordinator = coordinator();
    let (observer, adapter) = observer(&coordinator);
    assert!(observer.init());
    assert!(observer.manager().is_empty());

    publish(&adapter, 9001, InstanceState::Ready);
    assert!(observer.manager().contains(&addr(9001)));

    adapter.update_state(&addr(9001), InstanceState::Outdated).unwrap();
    assert_eq!(
        observer.manager().instance(&addr(9001)).map(|i| i.state()),
        Some(InstanceState::Outdated)
    );
}

#[test]
#[traced_test]
fn test_read_fails_when_coordination_is_down() {
    let coordinator = coordinator();
    let (observer, _) = observer(&coordinator);
    coordinator.set_service_state(crate::coordination::ServiceState::Starting);

    assert!(!observer.init());
    assert!(logs_contain("Unable to create membership directories"));
}

#[test]
fn test_events_ignored_while_not_running() {
    let coordinator = coordinator();
    let (observer, adapter) = observer(&coordinator);
    adapter.ensure_layout().unwrap();
    publish(&adapter, 9001, InstanceState::Ready);

    coordinator.set_service_state(crate::coordination::ServiceState::Starting);
    observer.process(crate::coordination::WatchedEvent::new(
        test_paths().nodes_active_dir(),
        crate::coordination::EventType::NodeChildrenChanged,
    ));

    assert!(observer.manager().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[traced_test]
async fn test_lifecycle_task_follows_connection() {
    let coordinator = coordinator();
    let (observer, adapter) = observer(&coordinator);
    adapter.ensure_layout().unwrap();
    publish(&adapter, 9001, InstanceState::Ready);
    publish(&adapter, 9002, InstanceState::Ready);

    let task = observer.spawn_lifecycle_task();
    wait_for_len(observer.manager(), 2).await;

    // liveness leaves are ephemeral, details survive as FAILED instances
    coordinator.simulate_disconnect();
    wait_for_len(observer.manager(), 0).await;

    coordinator.reconnect();
    wait_for_len(observer.manager(), 2).await;
    assert!(observer
        .manager()
        .instances()
        .iter()
        .all(|i| i.state() == InstanceState::Failed));

    task.abort();
}
