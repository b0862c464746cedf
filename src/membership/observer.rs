use std::sync::Arc;
use std::sync::Weak;

use tokio::task::JoinHandle;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::MembershipManager;
use crate::coordination::EventType;
use crate::coordination::InstanceAdapter;
use crate::coordination::ServiceState;
use crate::coordination::WatchedEvent;
use crate::coordination::Watcher;
use crate::CoordinationClient;

/// Feeds the membership manager from the coordination service.
///
/// Re-reads all instances whenever a watch below the nodes directory fires,
/// and follows the coordination lifecycle: a running connection triggers a
/// full re-read, a lost one the manager's disconnect handler.
pub struct MembershipObserver {
    adapter: InstanceAdapter,
    client: Arc<dyn CoordinationClient>,
    manager: Arc<MembershipManager>,
    this: Weak<MembershipObserver>,
}

impl MembershipObserver {
    pub fn new(
        client: Arc<dyn CoordinationClient>,
        adapter: InstanceAdapter,
        manager: Arc<MembershipManager>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            adapter,
            client,
            manager,
            this: this.clone(),
        })
    }

    pub fn manager(&self) -> &Arc<MembershipManager> {
        &self.manager
    }

    /// Reads the membership once and arms the watches
    pub fn init(&self) -> bool {
        if let Err(e) = self.adapter.ensure_layout() {
            warn!("Unable to create membership directories: {}", e);
            return false;
        }
        self.read_membership_and_register_watch()
    }

    /// Re-reads every instance and hands the set to the manager.
    /// Returns `false` when the coordination read failed.
    pub fn read_membership_and_register_watch(&self) -> bool {
        let watcher: Option<Arc<dyn Watcher>> = self.this.upgrade().map(|s| s as Arc<dyn Watcher>);
        match self.adapter.read_instances(watcher) {
            Ok(instances) => {
                self.manager.update_instance_list(instances);
                true
            }
            Err(e) => {
                warn!("Unable to read membership and create a watch: {}", e);
                false
            }
        }
    }

    /// Follows the coordination lifecycle until the client goes away.
    pub fn spawn_lifecycle_task(self: &Arc<Self>) -> JoinHandle<()> {
        let mut state_rx = self.client.service_state();
        let observer = self.clone();

        tokio::spawn(async move {
            loop {
                let state = *state_rx.borrow_and_update();
                observer.on_service_state(state).await;

                if state_rx.changed().await.is_err() {
                    debug!("Coordination lifecycle channel closed");
                    break;
                }
            }
        })
    }

    async fn on_service_state(
        self: &Arc<Self>,
        state: ServiceState,
    ) {
        debug!(%state, "Coordination service state changed");
        if state.is_running() {
            let observer = self.clone();
            let refreshed = tokio::task::spawn_blocking(move || observer.init()).await;
            if let Err(e) = refreshed {
                warn!("Membership refresh task failed: {}", e);
            }
        } else if state.is_disconnected() {
            info!(%state, "Coordination connection lost");
            self.manager.handle_disconnect();
        }
    }
}

impl Watcher for MembershipObserver {
    fn process(
        &self,
        event: WatchedEvent,
    ) {
        let state = *self.client.service_state().borrow();
        if !state.is_running() {
            debug!(?event, %state, "Ignoring event, coordination is not running");
            return;
        }

        if event.event_type == EventType::None {
            return;
        }

        let nodes_root = self.adapter.paths().nodes_active_dir();
        let details_root = self.adapter.paths().nodes_details_dir();
        if event.path.starts_with(&nodes_root) || event.path.starts_with(&details_root) {
            self.read_membership_and_register_watch();
        } else {
            debug!(path = %event.path, "Ignoring unrelated event");
        }
    }
}
