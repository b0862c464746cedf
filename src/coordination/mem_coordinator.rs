//! Process local coordination service.
//!
//! Keeps persistent and ephemeral nodes in an ordered map and implements
//! one-shot data and child watches with the usual semantics:
//!
//! - a data watch (armed by `read_leaf`) fires `NodeDataChanged` when the node
//!   is overwritten and `NodeDeleted` when it is removed
//! - a child watch (armed by `get_children`) fires `NodeChildrenChanged` when a
//!   direct child is created or removed and `NodeDeleted` when the node goes
//! - every watch fires at most once and is dropped afterwards
//!
//! Notifications are delivered after the store lock is released, either on the
//! writing thread or on a dedicated dispatcher thread (see [`DispatchMode`]).

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use std::time::Instant;

use crossbeam_channel::bounded;
use crossbeam_channel::unbounded;
use crossbeam_channel::Receiver;
use crossbeam_channel::Sender;
use parking_lot::Condvar;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::parent_of;
use super::CoordinationClient;
use super::EventType;
use super::ServiceState;
use super::WatchedEvent;
use super::Watcher;
use crate::CoordinationConfig;
use crate::CoordinationError;
use crate::DispatchMode;
use crate::Result;

struct ZNode {
    data: Vec<u8>,
    ephemeral: bool,
}

type Notification = (Arc<dyn Watcher>, WatchedEvent);

#[derive(Default)]
struct Store {
    nodes: BTreeMap<String, ZNode>,
    data_watches: HashMap<String, Vec<Arc<dyn Watcher>>>,
    child_watches: HashMap<String, Vec<Arc<dyn Watcher>>>,
}

impl Store {
    fn contains(
        &self,
        path: &str,
    ) -> bool {
        path == "/" || self.nodes.contains_key(path)
    }

    fn children(
        &self,
        path: &str,
    ) -> Vec<String> {
        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{path}/")
        };
        self.nodes
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter_map(|(k, _)| {
                let rest = &k[prefix.len()..];
                (!rest.contains('/')).then(|| rest.to_string())
            })
            .collect()
    }

    fn descendants_and_self(
        &self,
        path: &str,
    ) -> Vec<String> {
        let prefix = format!("{path}/");
        let mut paths: Vec<String> = self
            .nodes
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(k, _)| k.clone())
            .collect();
        if self.nodes.contains_key(path) {
            paths.push(path.to_string());
        }
        paths
    }

    fn add_watch(
        watches: &mut HashMap<String, Vec<Arc<dyn Watcher>>>,
        path: &str,
        watcher: Arc<dyn Watcher>,
    ) {
        let entry = watches.entry(path.to_string()).or_default();
        if !entry.iter().any(|w| Arc::ptr_eq(w, &watcher)) {
            entry.push(watcher);
        }
    }

    fn take_data_watches(
        &mut self,
        path: &str,
        event_type: EventType,
        out: &mut Vec<Notification>,
    ) {
        if let Some(watchers) = self.data_watches.remove(path) {
            out.extend(watchers.into_iter().map(|w| (w, WatchedEvent::new(path, event_type))));
        }
    }

    fn take_child_watches(
        &mut self,
        path: &str,
        event_type: EventType,
        out: &mut Vec<Notification>,
    ) {
        if let Some(watchers) = self.child_watches.remove(path) {
            out.extend(watchers.into_iter().map(|w| (w, WatchedEvent::new(path, event_type))));
        }
    }

    /// Creates `path` and missing ancestors or overwrites its content
    fn put(
        &mut self,
        path: &str,
        data: &[u8],
        ephemeral: bool,
        out: &mut Vec<Notification>,
    ) {
        let mut missing = Vec::new();
        let mut current = parent_of(path);
        while let Some(p) = current {
            if self.contains(p) {
                break;
            }
            missing.push(p.to_string());
            current = parent_of(p);
        }
        for p in missing.into_iter().rev() {
            self.create(&p, Vec::new(), false, out);
        }

        if let Some(node) = self.nodes.get_mut(path) {
            node.data = data.to_vec();
            node.ephemeral = ephemeral;
            self.take_data_watches(path, EventType::NodeDataChanged, out);
        } else {
            self.create(path, data.to_vec(), ephemeral, out);
        }
    }

    fn create(
        &mut self,
        path: &str,
        data: Vec<u8>,
        ephemeral: bool,
        out: &mut Vec<Notification>,
    ) {
        self.nodes.insert(path.to_string(), ZNode { data, ephemeral });
        if let Some(parent) = parent_of(path) {
            self.take_child_watches(parent, EventType::NodeChildrenChanged, out);
        }
    }

    fn delete(
        &mut self,
        path: &str,
        out: &mut Vec<Notification>,
    ) {
        let paths = self.descendants_and_self(path);
        if paths.is_empty() {
            return;
        }
        // deepest first
        for p in paths.iter().rev() {
            self.nodes.remove(p);
            self.take_data_watches(p, EventType::NodeDeleted, out);
            self.take_child_watches(p, EventType::NodeDeleted, out);
        }
        if let Some(parent) = parent_of(path) {
            self.take_child_watches(parent, EventType::NodeChildrenChanged, out);
        }
    }
}

struct Dispatcher {
    sender: Sender<Notification>,
    handle: Option<JoinHandle<()>>,
}

/// Outstanding notifications of the background dispatcher
#[derive(Default)]
struct Pending {
    count: Mutex<usize>,
    idle: Condvar,
}

pub struct InMemoryCoordinator {
    store: Mutex<Store>,
    state_tx: watch::Sender<ServiceState>,
    dispatcher: Mutex<Option<Dispatcher>>,
    pending: Arc<Pending>,
}

impl std::fmt::Debug for InMemoryCoordinator {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("InMemoryCoordinator")
            .field("nodes", &self.store.lock().nodes.len())
            .field("state", &*self.state_tx.borrow())
            .finish_non_exhaustive()
    }
}

impl InMemoryCoordinator {
    /// Connected coordinator delivering watches on the writing thread
    pub fn new() -> Self {
        Self::with_config(&CoordinationConfig {
            dispatch_mode: DispatchMode::Inline,
            dispatch_queue_size: 0,
        })
    }

    pub fn with_config(config: &CoordinationConfig) -> Self {
        let (state_tx, _) = watch::channel(ServiceState::Running);
        let pending = Arc::new(Pending::default());

        let dispatcher = match config.dispatch_mode {
            DispatchMode::Inline => None,
            DispatchMode::Background => Some(Self::start_dispatcher(
                config.dispatch_queue_size,
                pending.clone(),
            )),
        };

        Self {
            store: Mutex::new(Store::default()),
            state_tx,
            dispatcher: Mutex::new(dispatcher),
            pending,
        }
    }

    fn start_dispatcher(
        queue_size: usize,
        pending: Arc<Pending>,
    ) -> Dispatcher {
        let (sender, receiver): (Sender<Notification>, Receiver<Notification>) = if queue_size > 0 {
            bounded(queue_size)
        } else {
            unbounded()
        };

        let handle = std::thread::spawn(move || {
            debug!("Coordination watch dispatcher started");
            // Exits once every sender is dropped
            while let Ok((watcher, event)) = receiver.recv() {
                trace!(path = %event.path, event_type = ?event.event_type, "dispatching watch");
                watcher.process(event);

                let mut count = pending.count.lock();
                *count = count.saturating_sub(1);
                if *count == 0 {
                    pending.idle.notify_all();
                }
            }
            debug!("Coordination watch dispatcher stopped");
        });

        Dispatcher {
            sender,
            handle: Some(handle),
        }
    }

    fn ensure_running(&self) -> Result<()> {
        let state = *self.state_tx.borrow();
        if state.is_running() {
            Ok(())
        } else {
            Err(CoordinationError::Unavailable(format!("coordinator is {state}")).into())
        }
    }

    fn deliver(
        &self,
        notifications: Vec<Notification>,
    ) {
        if notifications.is_empty() {
            return;
        }

        let sender = self.dispatcher.lock().as_ref().map(|d| d.sender.clone());
        match sender {
            Some(sender) => {
                for notification in notifications {
                    *self.pending.count.lock() += 1;
                    if sender.send(notification).is_err() {
                        warn!("Watch dispatcher is gone, dropping notification");
                        *self.pending.count.lock() -= 1;
                    }
                }
            }
            None => {
                for (watcher, event) in notifications {
                    watcher.process(event);
                }
            }
        }
    }

    /// Blocks until the background dispatcher delivered every queued
    /// notification. Returns `false` on timeout.
    pub fn await_quiescence(
        &self,
        timeout: Duration,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.pending.count.lock();
        while *count > 0 {
            if self.pending.idle.wait_until(&mut count, deadline).timed_out() {
                return *count == 0;
            }
        }
        true
    }

    /// Ends the session: ephemeral nodes vanish, armed watches are dropped and
    /// the lifecycle moves to `Terminated`.
    pub fn simulate_disconnect(&self) {
        let mut out = Vec::new();
        {
            let mut store = self.store.lock();
            let ephemerals: Vec<String> = store
                .nodes
                .iter()
                .filter(|(_, n)| n.ephemeral)
                .map(|(k, _)| k.clone())
                .collect();
            for path in ephemerals {
                store.delete(&path, &mut out);
            }
            store.data_watches.clear();
            store.child_watches.clear();
        }
        // Watches of a dead session never fire
        drop(out);

        debug!("Coordinator session terminated");
        self.state_tx.send_replace(ServiceState::Terminated);
    }

    /// Starts a new session
    pub fn reconnect(&self) {
        self.state_tx.send_replace(ServiceState::Starting);
        self.state_tx.send_replace(ServiceState::Running);
        debug!("Coordinator session re-established");
    }

    pub fn set_service_state(
        &self,
        state: ServiceState,
    ) {
        self.state_tx.send_replace(state);
    }

    /// Number of nodes currently stored
    pub fn node_count(&self) -> usize {
        self.store.lock().nodes.len()
    }

    pub fn shutdown(&self) {
        let dispatcher = self.dispatcher.lock().take();
        if let Some(mut d) = dispatcher {
            drop(d.sender);
            if let Some(handle) = d.handle.take() {
                if handle.thread().id() != std::thread::current().id() {
                    let _ = handle.join();
                }
            }
        }
        self.state_tx.send_replace(ServiceState::Terminated);
    }
}

impl Default for InMemoryCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InMemoryCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl CoordinationClient for InMemoryCoordinator {
    fn get_children(
        &self,
        path: &str,
        watcher: Option<Arc<dyn Watcher>>,
    ) -> Result<Vec<String>> {
        self.ensure_running()?;
        let mut store = self.store.lock();
        if !store.contains(path) {
            return Err(CoordinationError::NotFound { path: path.to_string() }.into());
        }
        if let Some(w) = watcher {
            Store::add_watch(&mut store.child_watches, path, w);
        }
        Ok(store.children(path))
    }

    fn read_leaf(
        &self,
        path: &str,
        watcher: Option<Arc<dyn Watcher>>,
    ) -> Result<Vec<u8>> {
        self.ensure_running()?;
        let mut store = self.store.lock();
        let data = match store.nodes.get(path) {
            Some(node) => node.data.clone(),
            None => return Err(CoordinationError::NotFound { path: path.to_string() }.into()),
        };
        if let Some(w) = watcher {
            Store::add_watch(&mut store.data_watches, path, w);
        }
        Ok(data)
    }

    fn exists(
        &self,
        path: &str,
    ) -> Result<bool> {
        self.ensure_running()?;
        Ok(self.store.lock().contains(path))
    }

    fn replace_persistent_node(
        &self,
        path: &str,
        data: &[u8],
    ) -> Result<()> {
        self.ensure_running()?;
        let mut out = Vec::new();
        self.store.lock().put(path, data, false, &mut out);
        self.deliver(out);
        Ok(())
    }

    fn replace_ephemeral_node(
        &self,
        path: &str,
        data: &[u8],
    ) -> Result<()> {
        self.ensure_running()?;
        let mut out = Vec::new();
        self.store.lock().put(path, data, true, &mut out);
        self.deliver(out);
        Ok(())
    }

    fn delete_recursive(
        &self,
        path: &str,
    ) -> Result<()> {
        self.ensure_running()?;
        let mut out = Vec::new();
        self.store.lock().delete(path, &mut out);
        self.deliver(out);
        Ok(())
    }

    fn service_state(&self) -> watch::Receiver<ServiceState> {
        self.state_tx.subscribe()
    }
}
