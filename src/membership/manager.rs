use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use parking_lot::RwLock;
use tracing::debug;
use tracing::info;

use super::Instance;
use super::InstanceAddr;
use super::InstanceState;
use crate::metrics::MEMBERSHIP_EVENTS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MembershipEvent {
    Add,
    Changed,
    Deleted,
}

impl MembershipEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipEvent::Add => "add",
            MembershipEvent::Changed => "changed",
            MembershipEvent::Deleted => "deleted",
        }
    }
}

impl fmt::Display for MembershipEvent {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type MembershipListener = Arc<dyn Fn(MembershipEvent, &Instance) + Send + Sync>;

/// Returned by `register_listener`, used to unregister again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(pub(crate) u64);

type InstanceMap = HashMap<InstanceAddr, Instance>;

/// Canonical set of known cluster instances.
///
/// Every coordination read replaces the whole set; the manager diffs it
/// against the previous snapshot and reports ADD/CHANGED/DELETED to the
/// registered listeners. Readers load a point-in-time snapshot and never
/// block the single mutator.
///
/// Listeners run synchronously on the mutating thread, in event order, and
/// must not modify the membership themselves.
pub struct MembershipManager {
    snapshot: ArcSwap<InstanceMap>,
    mutator: Mutex<()>,
    listeners: RwLock<Vec<(u64, MembershipListener)>>,
    next_listener_id: AtomicU64,
}

impl fmt::Debug for MembershipManager {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("MembershipManager")
            .field("instances", &self.snapshot.load().len())
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}

impl Default for MembershipManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MembershipManager {
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(HashMap::new()),
            mutator: Mutex::new(()),
            listeners: RwLock::new(Vec::new()),
            next_listener_id: AtomicU64::new(1),
        }
    }

    /// Provides read access to the current snapshot
    pub fn blocking_read<R>(
        &self,
        f: impl FnOnce(&HashMap<InstanceAddr, Instance>) -> R,
    ) -> R {
        let guard = self.snapshot.load();
        f(&guard)
    }

    /// All known instances ordered by address
    pub fn instances(&self) -> Vec<Instance> {
        self.blocking_read(|map| {
            let mut instances: Vec<Instance> = map.values().cloned().collect();
            instances.sort_by(|a, b| a.addr().cmp(b.addr()));
            instances
        })
    }

    pub fn instances_with_state(
        &self,
        state: InstanceState,
    ) -> Vec<Instance> {
        let mut instances = self.instances();
        instances.retain(|i| i.state() == state);
        instances
    }

    pub fn instance(
        &self,
        addr: &InstanceAddr,
    ) -> Option<Instance> {
        self.blocking_read(|map| map.get(addr).cloned())
    }

    pub fn contains(
        &self,
        addr: &InstanceAddr,
    ) -> bool {
        self.blocking_read(|map| map.contains_key(addr))
    }

    pub fn len(&self) -> usize {
        self.blocking_read(|map| map.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn register_listener(
        &self,
        listener: MembershipListener,
    ) -> ListenerHandle {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.write().push((id, listener));
        ListenerHandle(id)
    }

    /// `false` when the handle was not registered
    pub fn unregister_listener(
        &self,
        handle: ListenerHandle,
    ) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(id, _)| *id != handle.0);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Replaces the instance set and reports the difference
    pub fn update_instance_list(
        &self,
        instances: impl IntoIterator<Item = Instance>,
    ) {
        let _guard = self.mutator.lock();
        let next: InstanceMap = instances.into_iter().map(|i| (i.addr().clone(), i)).collect();
        let previous = self.snapshot.load_full();

        let mut events = Vec::new();
        for (addr, old) in previous.iter() {
            if !next.contains_key(addr) {
                events.push((MembershipEvent::Deleted, old.clone()));
            }
        }
        for (addr, instance) in next.iter() {
            match previous.get(addr) {
                None => events.push((MembershipEvent::Add, instance.clone())),
                Some(old) if old != instance => events.push((MembershipEvent::Changed, instance.clone())),
                Some(_) => {}
            }
        }
        // deterministic delivery order
        events.sort_by(|(ea, a), (eb, b)| a.addr().cmp(b.addr()).then((*ea as u8).cmp(&(*eb as u8))));

        self.snapshot.store(Arc::new(next));
        debug!("Membership updated, {} change(s)", events.len());
        self.fire(&events);
    }

    /// Fail-safe on coordination disconnect: every known instance is reported
    /// deleted and the set is emptied.
    pub fn handle_disconnect(&self) {
        let _guard = self.mutator.lock();
        let previous = self.snapshot.swap(Arc::new(HashMap::new()));

        let mut events: Vec<(MembershipEvent, Instance)> = previous
            .values()
            .map(|i| (MembershipEvent::Deleted, i.clone()))
            .collect();
        events.sort_by(|(_, a), (_, b)| a.addr().cmp(b.addr()));

        info!("Coordination disconnected, dropping {} instance(s)", events.len());
        self.fire(&events);
    }

    fn fire(
        &self,
        events: &[(MembershipEvent, Instance)],
    ) {
        if events.is_empty() {
            return;
        }
        let listeners: Vec<MembershipListener> = self.listeners.read().iter().map(|(_, l)| l.clone()).collect();
        for (event, instance) in events {
            MEMBERSHIP_EVENTS.with_label_values(&[event.as_str()]).inc();
            debug!(event = %event, instance = %instance, "Membership event");
            for listener in &listeners {
                listener(*event, instance);
            }
        }
    }
}
