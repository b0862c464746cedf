//! Keeps a local [`RegionTree`] of one distribution group in step with the
//! coordination service.
//!
//! Every region node carries a version leaf; the syncer watches it and
//! re-reads a node only when its remote version is newer than the one it last
//! applied. Watches are re-armed before an event handler returns, whatever
//! the outcome. After each settled update the local region id mapping is
//! recomputed from the tree, a new snapshot is published and waiters are
//! woken. Listeners are called after the internal lock has been released.

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;
use std::time::Instant;

use arc_swap::ArcSwapOption;
use parking_lot::Condvar;
use parking_lot::Mutex;
use parking_lot::RwLock;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::NodeId;
use super::RegionIdMapper;
use super::RegionNode;
use super::RegionTree;
use crate::coordination::leaf_path;
use crate::coordination::EventType;
use crate::coordination::GroupAdapter;
use crate::coordination::WatchedEvent;
use crate::coordination::Watcher;
use crate::constants::LEAF_VERSION;
use crate::metrics::SYNCER_EVENTS;
use crate::membership::ListenerHandle;
use crate::InstanceAddr;
use crate::PartitionerError;
use crate::RegionError;
use crate::Result;
use crate::RetryPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionEvent {
    Added,
    Changed,
    Removed,
    GroupRemoved,
}

impl RegionEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegionEvent::Added => "added",
            RegionEvent::Changed => "changed",
            RegionEvent::Removed => "removed",
            RegionEvent::GroupRemoved => "group_removed",
        }
    }
}

impl fmt::Display for RegionEvent {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Change notification; `region` is `None` only for `GroupRemoved`
#[derive(Debug, Clone, PartialEq)]
pub struct RegionChange {
    pub event: RegionEvent,
    pub group: String,
    pub region: Option<RegionNode>,
}

pub type RegionListener = Arc<dyn Fn(&RegionChange) + Send + Sync>;

#[derive(Default)]
struct SyncState {
    tree: Option<RegionTree>,
    /// Last applied remote version per node
    versions: HashMap<NodeId, u64>,
}

pub struct RegionSyncer {
    group: String,
    adapter: GroupAdapter,
    mapper: Arc<RegionIdMapper>,
    local_instance: Option<InstanceAddr>,
    read_retry: RetryPolicy,
    state: Mutex<SyncState>,
    snapshot: ArcSwapOption<RegionTree>,
    settled_generation: Mutex<u64>,
    settled: Condvar,
    listeners: RwLock<Vec<(u64, RegionListener)>>,
    next_listener_id: AtomicU64,
    closed: AtomicBool,
    this: Weak<RegionSyncer>,
}

impl fmt::Debug for RegionSyncer {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("RegionSyncer")
            .field("group", &self.group)
            .field("regions", &self.snapshot.load().as_ref().map(|t| t.len()))
            .field("local_instance", &self.local_instance)
            .finish()
    }
}

/// Re-arms the version watch of a node when an event handler returns
struct RearmGuard<'a> {
    syncer: &'a RegionSyncer,
    node_path: String,
}

impl Drop for RearmGuard<'_> {
    fn drop(&mut self) {
        self.syncer.rearm(&self.node_path);
    }
}

impl RegionSyncer {
    pub fn new(
        group: impl Into<String>,
        adapter: GroupAdapter,
        mapper: Arc<RegionIdMapper>,
        local_instance: Option<InstanceAddr>,
        read_retry: RetryPolicy,
    ) -> Arc<Self> {
        let group = group.into();
        Arc::new_cyclic(|this| Self {
            group,
            adapter,
            mapper,
            local_instance,
            read_retry,
            state: Mutex::new(SyncState::default()),
            snapshot: ArcSwapOption::empty(),
            settled_generation: Mutex::new(0),
            settled: Condvar::new(),
            listeners: RwLock::new(Vec::new()),
            next_listener_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            this: this.clone(),
        })
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn mapper(&self) -> &Arc<RegionIdMapper> {
        &self.mapper
    }

    /// Current tree, reading it from the coordination service on first use.
    /// `None` while the group has no completely created root.
    pub fn root(&self) -> Option<Arc<RegionTree>> {
        if let Some(tree) = self.snapshot.load_full() {
            return Some(tree);
        }
        if self.is_closed() {
            return None;
        }

        let changes = {
            let mut state = self.state.lock();
            let mut changes = Vec::new();
            if state.tree.is_none() {
                if let Err(e) = self.bootstrap(&mut state, &mut changes) {
                    warn!(group = %self.group, "Unable to read region tree: {}", e);
                    SYNCER_EVENTS.with_label_values(&["failed"]).inc();
                }
            }
            self.settle(&state);
            changes
        };
        self.fire(&changes);
        self.snapshot.load_full()
    }

    /// Last published tree without touching the coordination service
    pub fn snapshot(&self) -> Option<Arc<RegionTree>> {
        self.snapshot.load_full()
    }

    /// Blocks until a published tree satisfies `predicate`
    pub fn wait_for<P>(
        &self,
        predicate: P,
        timeout: Duration,
    ) -> Result<Arc<RegionTree>>
    where
        P: Fn(&RegionTree) -> bool,
    {
        let started = Instant::now();
        let deadline = started + timeout;
        // a missing root is polled since no watch can be armed on it yet
        let poll = self.read_retry.delay().max(Duration::from_millis(10));

        loop {
            if self.is_closed() {
                return Err(PartitionerError::Inactive(self.group.clone()).into());
            }
            let current = match self.snapshot.load_full() {
                Some(tree) => Some(tree),
                None => self.root(),
            };
            if let Some(tree) = &current {
                if predicate(tree) {
                    return Ok(tree.clone());
                }
            }

            let mut generation = self.settled_generation.lock();
            let seen = *generation;
            // re-check under the lock so a settle in between is not missed
            if let Some(tree) = self.snapshot.load_full() {
                if predicate(&tree) {
                    return Ok(tree);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(self.wait_timeout(current.as_deref(), started));
            }
            let wake_at = if current.is_none() { deadline.min(now + poll) } else { deadline };
            while *generation == seen {
                if self.settled.wait_until(&mut generation, wake_at).timed_out() {
                    break;
                }
            }
        }
    }

    fn wait_timeout(
        &self,
        tree: Option<&RegionTree>,
        started: Instant,
    ) -> crate::Error {
        RegionError::WaitTimeout {
            region_id: tree.map(|t| t.root_node().region_id()).unwrap_or_default(),
            waited: started.elapsed(),
        }
        .into()
    }

    pub fn register_listener(
        &self,
        listener: RegionListener,
    ) -> ListenerHandle {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.write().push((id, listener));
        ListenerHandle(id)
    }

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

    /// Drops the local tree, e.g. after the coordination session was lost.
    /// The next [`Self::root`] call reads it again.
    pub fn reset(&self) {
        let changes = {
            let mut state = self.state.lock();
            let mut changes = Vec::new();
            if state.tree.take().is_some() {
                info!(group = %self.group, "Discarding local region tree");
                changes.push(self.group_removed());
            }
            state.versions.clear();
            self.settle(&state);
            changes
        };
        self.fire(&changes);
    }

    /// Stops processing events and drops the local tree and mapping
    pub fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(group = %self.group, "Shutting down region syncer");
            self.reset();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    // -
    // Event handling

    fn handle(
        &self,
        event: &WatchedEvent,
        child_numbers: &[u64],
    ) {
        let changes = {
            let mut state = self.state.lock();
            let mut changes = Vec::new();
            let outcome = match event.event_type {
                EventType::NodeDeleted => self.handle_deleted(&mut state, child_numbers, &mut changes),
                _ => self.handle_changed(&mut state, child_numbers, &mut changes),
            };
            match outcome {
                Ok(()) if changes.is_empty() => {
                    SYNCER_EVENTS.with_label_values(&["ignored"]).inc();
                }
                Ok(()) => {
                    SYNCER_EVENTS.with_label_values(&["applied"]).inc();
                }
                Err(e) => {
                    warn!(group = %self.group, path = %event.path, "Unable to apply region update: {}", e);
                    SYNCER_EVENTS.with_label_values(&["failed"]).inc();
                }
            }
            self.settle(&state);
            changes
        };
        self.fire(&changes);
    }

    fn handle_deleted(
        &self,
        state: &mut SyncState,
        child_numbers: &[u64],
        changes: &mut Vec<RegionChange>,
    ) -> Result<()> {
        if child_numbers.is_empty() {
            if state.tree.take().is_some() {
                info!(group = %self.group, "Distribution group was deleted");
                changes.push(self.group_removed());
            }
            state.versions.clear();
            return Ok(());
        }

        let Some(id) = state.tree.as_ref().and_then(|t| t.resolve_path(child_numbers)) else {
            return Ok(());
        };
        let Some(parent) = state.tree.as_ref().and_then(|t| t.get(id)).and_then(RegionNode::parent) else {
            return Ok(());
        };

        // the slot may have been filled again since the delete happened
        let path = self.adapter.paths().region_path(&self.group, child_numbers);
        if self.adapter.is_completely_created(&path)? {
            debug!(path = %path, "Region exists again, reconciling its parent instead of removing it");
            let parent_path = self
                .adapter
                .paths()
                .region_path(&self.group, &child_numbers[..child_numbers.len() - 1]);
            return self.reconcile_children(state, parent, &parent_path, changes);
        }

        let Some(tree) = state.tree.as_mut() else {
            return Ok(());
        };

        for node in tree.remove_child(id) {
            state.versions.remove(&node.id());
            changes.push(self.change(RegionEvent::Removed, node));
        }
        if let Some(parent) = tree.get(parent) {
            changes.push(self.change(RegionEvent::Changed, parent.clone()));
        }
        Ok(())
    }

    fn handle_changed(
        &self,
        state: &mut SyncState,
        child_numbers: &[u64],
        changes: &mut Vec<RegionChange>,
    ) -> Result<()> {
        if state.tree.is_none() {
            return self.bootstrap(state, changes);
        }

        let Some(id) = state.tree.as_ref().and_then(|t| t.resolve_path(child_numbers)) else {
            debug!(group = %self.group, ?child_numbers, "Region not known yet, parent will pick it up");
            return Ok(());
        };
        let path = self.adapter.paths().region_path(&self.group, child_numbers);
        self.update_node(state, id, &path, changes)
    }

    /// Reads the group root and everything below it
    fn bootstrap(
        &self,
        state: &mut SyncState,
        changes: &mut Vec<RegionChange>,
    ) -> Result<()> {
        let path = self.adapter.group_path(&self.group);
        if !self.adapter.is_completely_created(&path)? {
            debug!(group = %self.group, "Root region does not exist yet");
            return Ok(());
        }

        let region_id = self.read_retry.run("read root region id", || self.adapter.read_region_id(&path))?;
        let bbox = self.read_retry.run("read root box", || self.adapter.read_box(&path))?;

        let tree = RegionTree::new(self.group.clone(), region_id, bbox);
        let root = tree.root();
        changes.push(self.change(RegionEvent::Added, tree.root_node().clone()));
        state.tree = Some(tree);
        state.versions.clear();

        info!(group = %self.group, region_id, "Reading region tree");
        self.update_node(state, root, &path, changes)
    }

    /// Applies the remote content of one node when its version is newer and
    /// reconciles its children
    fn update_node(
        &self,
        state: &mut SyncState,
        id: NodeId,
        path: &str,
        changes: &mut Vec<RegionChange>,
    ) -> Result<()> {
        let remote_version = match self.adapter.read_version(path, self.watcher()) {
            Ok(version) => version,
            Err(e) if e.is_not_found() => {
                debug!(path = %path, "Region node vanished, waiting for the delete event");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        let local_version = state.versions.get(&id).copied().unwrap_or(0);
        if remote_version <= local_version {
            if remote_version < local_version {
                debug!(path = %path, remote_version, local_version, "Ignoring outdated region version");
            }
            return Ok(());
        }

        let systems = self.read_retry.run("read systems", || self.adapter.read_systems(path))?;
        let region_id = self.read_retry.run("read region id", || self.adapter.read_region_id(path))?;
        let region_state = self.read_retry.run("read region state", || self.adapter.read_state(path))?;

        let Some(tree) = state.tree.as_mut() else {
            return Ok(());
        };
        let Some((is_root, local_region_id)) = tree.get(id).map(|n| (n.is_root(), n.region_id())) else {
            return Ok(());
        };
        if local_region_id != region_id {
            if is_root {
                // group was deleted and created again between two events
                warn!(group = %self.group, "Root region id changed, reading the tree again");
                state.tree = None;
                state.versions.clear();
                changes.push(self.group_removed());
                return self.bootstrap(state, changes);
            }
            error!(
                path = %path,
                local = local_region_id,
                remote = region_id,
                "Region id mismatch, not applying update"
            );
            return Ok(());
        }

        tree.set_systems(id, systems);
        tree.set_state(id, region_state);

        self.reconcile_children(state, id, path, changes)?;

        state.versions.insert(id, remote_version);
        if let Some(node) = state.tree.as_ref().and_then(|t| t.get(id)) {
            changes.push(self.change(RegionEvent::Changed, node.clone()));
        }
        Ok(())
    }

    fn reconcile_children(
        &self,
        state: &mut SyncState,
        id: NodeId,
        path: &str,
        changes: &mut Vec<RegionChange>,
    ) -> Result<()> {
        let remote_children = self.adapter.list_children(path)?;
        let remote_numbers: BTreeSet<u64> = remote_children.iter().map(|(n, _)| *n).collect();

        let local_numbers: Vec<u64> = match state.tree.as_ref().and_then(|t| t.get(id)) {
            Some(node) => node.child_numbers().collect(),
            None => return Ok(()),
        };
        for number in local_numbers {
            if !remote_numbers.contains(&number) {
                self.remove_local_child(state, id, number, changes);
            }
        }

        for (number, child_path) in remote_children {
            if !self.adapter.is_completely_created(&child_path)? {
                debug!(path = %child_path, "Skipping child that is not completely created");
                continue;
            }
            let region_id = self.read_retry.run("read region id", || self.adapter.read_region_id(&child_path))?;

            let existing = state
                .tree
                .as_ref()
                .and_then(|t| t.child(id, number).and_then(|c| t.get(c)))
                .map(|c| (c.id(), c.region_id()));
            let child_id = match existing {
                Some((child_id, local_region_id)) if local_region_id == region_id => child_id,
                existing => {
                    if existing.is_some() {
                        debug!(path = %child_path, "Child slot was reused for another region");
                        self.remove_local_child(state, id, number, changes);
                    }
                    let bbox = self.read_retry.run("read box", || self.adapter.read_box(&child_path))?;
                    let Some(tree) = state.tree.as_mut() else {
                        return Ok(());
                    };
                    let child_id = match tree.add_child(id, number, region_id, bbox) {
                        Ok(child_id) => child_id,
                        Err(e) => {
                            error!(path = %child_path, "Unable to add child region: {}", e);
                            continue;
                        }
                    };
                    if let Some(node) = tree.get(child_id) {
                        changes.push(self.change(RegionEvent::Added, node.clone()));
                    }
                    child_id
                }
            };

            if let Err(e) = self.update_node(state, child_id, &child_path, changes) {
                warn!(path = %child_path, "Unable to read child region: {}", e);
            }
        }
        Ok(())
    }

    fn remove_local_child(
        &self,
        state: &mut SyncState,
        parent: NodeId,
        number: u64,
        changes: &mut Vec<RegionChange>,
    ) {
        let Some(tree) = state.tree.as_mut() else {
            return;
        };
        let Some(child_id) = tree.child(parent, number) else {
            return;
        };
        for node in tree.remove_child(child_id) {
            state.versions.remove(&node.id());
            changes.push(self.change(RegionEvent::Removed, node));
        }
    }

    /// Publishes the tree and recomputes the local mapping. Called with the
    /// state lock held so mapping updates follow tree order.
    fn settle(
        &self,
        state: &SyncState,
    ) {
        let expected = match (&state.tree, &self.local_instance) {
            (Some(tree), Some(local)) => tree.local_write_regions(local),
            _ => Vec::new(),
        };
        self.mapper.reconcile(expected);

        self.snapshot.store(state.tree.clone().map(Arc::new));

        *self.settled_generation.lock() += 1;
        self.settled.notify_all();
    }

    fn fire(
        &self,
        changes: &[RegionChange],
    ) {
        if changes.is_empty() {
            return;
        }
        let listeners: Vec<RegionListener> = self.listeners.read().iter().map(|(_, l)| l.clone()).collect();
        for change in changes {
            debug!(
                event = %change.event,
                group = %change.group,
                region_id = ?change.region.as_ref().map(RegionNode::region_id),
                "Region event"
            );
            for listener in &listeners {
                listener(change);
            }
        }
    }

    fn rearm(
        &self,
        node_path: &str,
    ) {
        let version_path = leaf_path(node_path, LEAF_VERSION);
        if let Err(e) = self.adapter.client().read_leaf(&version_path, self.watcher()) {
            debug!(path = %version_path, "Unable to re-arm watch: {}", e);
        }
    }

    fn watcher(&self) -> Option<Arc<dyn Watcher>> {
        self.this.upgrade().map(|s| s as Arc<dyn Watcher>)
    }

    fn change(
        &self,
        event: RegionEvent,
        region: RegionNode,
    ) -> RegionChange {
        RegionChange {
            event,
            group: self.group.clone(),
            region: Some(region),
        }
    }

    fn group_removed(&self) -> RegionChange {
        RegionChange {
            event: RegionEvent::GroupRemoved,
            group: self.group.clone(),
            region: None,
        }
    }
}

impl Watcher for RegionSyncer {
    fn process(
        &self,
        event: WatchedEvent,
    ) {
        if event.event_type == EventType::None || self.is_closed() {
            return;
        }
        let Some((group, child_numbers)) = self.adapter.paths().parse_version_path(&event.path) else {
            return;
        };
        if group != self.group {
            return;
        }

        let node_path = self.adapter.paths().region_path(&self.group, &child_numbers);
        let _rearm = RearmGuard {
            syncer: self,
            node_path,
        };
        self.handle(&event, &child_numbers);
    }
}
