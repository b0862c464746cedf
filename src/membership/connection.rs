use std::sync::Arc;
use std::sync::Weak;

use dashmap::DashMap;
use dashmap::DashSet;
#[cfg(test)]
use mockall::automock;
use parking_lot::Mutex;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::Instance;
use super::InstanceAddr;
use super::ListenerHandle;
use super::MembershipEvent;
use super::MembershipManager;
use crate::Result;

/// Open connection to one peer instance
#[cfg_attr(test, automock)]
pub trait Session: Send + Sync {
    /// Graceful close
    fn disconnect(&self);

    /// Immediate close of a session to an instance that is gone
    fn terminate(&self);
}

/// Opens sessions; the wire protocol lives behind this seam
#[cfg_attr(test, automock)]
pub trait SessionFactory: Send + Sync {
    fn connect(
        &self,
        instance: &Instance,
    ) -> Result<Arc<dyn Session>>;
}

/// Keeps one session per live, non-blacklisted instance.
///
/// ADD and CHANGED events open a session (or close it, when the instance is
/// FAILED); DELETED closes it.
pub struct ConnectionService {
    factory: Arc<dyn SessionFactory>,
    manager: Arc<MembershipManager>,
    sessions: DashMap<InstanceAddr, Arc<dyn Session>>,
    known_instances: DashMap<InstanceAddr, Instance>,
    blacklist: DashSet<InstanceAddr>,
    listener: Mutex<Option<ListenerHandle>>,
    /// Serializes open/close decisions per service
    op_lock: Mutex<()>,
    this: Weak<ConnectionService>,
}

impl ConnectionService {
    pub fn new(
        factory: Arc<dyn SessionFactory>,
        manager: Arc<MembershipManager>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            factory,
            manager,
            sessions: DashMap::new(),
            known_instances: DashMap::new(),
            blacklist: DashSet::new(),
            listener: Mutex::new(None),
            op_lock: Mutex::new(()),
            this: this.clone(),
        })
    }

    /// Subscribes to membership changes and connects to the known instances
    pub fn init(&self) {
        let mut listener = self.listener.lock();
        if listener.is_none() {
            let this = self.this.clone();
            let handle = self.manager.register_listener(Arc::new(move |event, instance| {
                if let Some(service) = this.upgrade() {
                    service.handle_event(event, instance);
                }
            }));
            *listener = Some(handle);
        }
        drop(listener);

        let instances = self.manager.instances();
        if instances.is_empty() {
            warn!("The list of instances is empty");
        }
        for instance in &instances {
            self.create_or_terminate(instance);
        }
    }

    /// Unsubscribes and closes every session
    pub fn shutdown(&self) {
        if let Some(handle) = self.listener.lock().take() {
            self.manager.unregister_listener(handle);
        }

        let _guard = self.op_lock.lock();
        let addrs: Vec<InstanceAddr> = self.sessions.iter().map(|e| e.key().clone()).collect();
        for addr in addrs {
            if let Some((_, session)) = self.sessions.remove(&addr) {
                info!("Closing connection to server: {}", addr);
                session.disconnect();
            }
        }
        self.known_instances.clear();
    }

    pub fn handle_event(
        &self,
        event: MembershipEvent,
        instance: &Instance,
    ) {
        match event {
            MembershipEvent::Add | MembershipEvent::Changed => self.create_or_terminate(instance),
            MembershipEvent::Deleted => {
                let _guard = self.op_lock.lock();
                self.terminate_locked(instance.addr());
            }
        }
    }

    fn create_or_terminate(
        &self,
        instance: &Instance,
    ) {
        let _guard = self.op_lock.lock();
        if instance.is_failed() {
            self.terminate_locked(instance.addr());
        } else {
            self.connect_locked(instance);
        }
    }

    fn connect_locked(
        &self,
        instance: &Instance,
    ) {
        let addr = instance.addr();
        if self.sessions.contains_key(addr) {
            debug!("We have already a connection to: {}", addr);
            self.known_instances.insert(addr.clone(), instance.clone());
            return;
        }

        if self.blacklist.contains(addr) {
            info!("Not creating a connection to the blacklisted system: {}", addr);
            return;
        }

        info!("Opening connection to instance: {}", addr);
        match self.factory.connect(instance) {
            Ok(session) => {
                info!("Connection successfully established: {}", addr);
                self.sessions.insert(addr.clone(), session);
                self.known_instances.insert(addr.clone(), instance.clone());
            }
            Err(e) => {
                warn!("Unable to open connection to {}: {}", addr, e);
            }
        }
    }

    fn terminate_locked(
        &self,
        addr: &InstanceAddr,
    ) {
        self.known_instances.remove(addr);
        if let Some((_, session)) = self.sessions.remove(addr) {
            info!("Closing connection to dead instance: {}", addr);
            session.terminate();
        }
    }

    /// Blacklisted instances never get a session. An existing session is kept.
    pub fn add_to_blacklist(
        &self,
        addr: InstanceAddr,
    ) {
        self.blacklist.insert(addr);
    }

    pub fn remove_from_blacklist(
        &self,
        addr: &InstanceAddr,
    ) -> bool {
        self.blacklist.remove(addr).is_some()
    }

    pub fn clear_blacklist(&self) {
        self.blacklist.clear();
    }

    pub fn is_blacklisted(
        &self,
        addr: &InstanceAddr,
    ) -> bool {
        self.blacklist.contains(addr)
    }

    pub fn session(
        &self,
        addr: &InstanceAddr,
    ) -> Option<Arc<dyn Session>> {
        self.sessions.get(addr).map(|s| s.value().clone())
    }

    pub fn connection_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn connected_instances(&self) -> Vec<Instance> {
        let mut instances: Vec<Instance> = self.known_instances.iter().map(|e| e.value().clone()).collect();
        instances.sort_by(|a, b| a.addr().cmp(b.addr()));
        instances
    }
}
