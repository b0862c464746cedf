use std::sync::Arc;

use parking_lot::Mutex;

use crate::coordination::CoordinationPaths;
use crate::coordination::GroupAdapter;
use crate::coordination::InMemoryCoordinator;
use crate::coordination::WatchedEvent;
use crate::coordination::Watcher;
use crate::CoordinationClient;
use crate::Hyperrectangle;
use crate::Instance;
use crate::InstanceAddr;
use crate::InstanceState;
use crate::RetryPolicy;

pub(crate) const TEST_CLUSTER: &str = "testcluster";

pub(crate) fn addr(port: u16) -> InstanceAddr {
    InstanceAddr::new("127.0.0.1", port)
}

pub(crate) fn ready_instance(port: u16) -> Instance {
    Instance::with_state(addr(port), InstanceState::Ready)
}

/// `bounds` holds `begin, end` pairs, one per dimension
pub(crate) fn bbox(bounds: &[f64]) -> Hyperrectangle {
    Hyperrectangle::from_bounds(bounds).unwrap()
}

pub(crate) fn test_paths() -> CoordinationPaths {
    CoordinationPaths::for_cluster(TEST_CLUSTER)
}

/// Connected coordinator delivering watches inline
pub(crate) fn coordinator() -> Arc<InMemoryCoordinator> {
    Arc::new(InMemoryCoordinator::new())
}

pub(crate) fn group_adapter(coordinator: &Arc<InMemoryCoordinator>) -> GroupAdapter {
    let client: Arc<dyn CoordinationClient> = coordinator.clone();
    GroupAdapter::new(client, test_paths())
}

pub(crate) fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(3, 1)
}

/// Watcher remembering every event it receives
#[derive(Default)]
pub(crate) struct RecordingWatcher {
    events: Mutex<Vec<WatchedEvent>>,
}

impl RecordingWatcher {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn events(&self) -> Vec<WatchedEvent> {
        self.events.lock().clone()
    }

    pub(crate) fn count(&self) -> usize {
        self.events.lock().len()
    }
}

impl Watcher for RecordingWatcher {
    fn process(
        &self,
        event: WatchedEvent,
    ) {
        self.events.lock().push(event);
    }
}
