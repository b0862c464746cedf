//! Path addressed coordination service facade.
//!
//! The coordination service is the single source of truth for region trees and
//! cluster membership. Everything in this crate talks to it through
//! [`CoordinationClient`]; [`InMemoryCoordinator`] is a process local
//! implementation used by tests and single process deployments.
mod group_adapter;
mod instance_adapter;
mod mem_coordinator;
mod paths;

pub use group_adapter::*;
pub use instance_adapter::*;
pub use mem_coordinator::*;
pub use paths::*;


use std::fmt;
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;
use tokio::sync::watch;

use crate::Result;

/// Kind of change a one-shot watch reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// Session level notification without a node change
    None,
    NodeDeleted,
    NodeDataChanged,
    NodeChildrenChanged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedEvent {
    pub path: String,
    pub event_type: EventType,
}

impl WatchedEvent {
    pub fn new(
        path: impl Into<String>,
        event_type: EventType,
    ) -> Self {
        Self {
            path: path.into(),
            event_type,
        }
    }
}

/// Receiver of one-shot watch notifications.
///
/// A watch fires at most once; receivers that want further notifications
/// must register again while processing the event.
pub trait Watcher: Send + Sync {
    fn process(
        &self,
        event: WatchedEvent,
    );
}

/// Lifecycle of the coordination client connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceState {
    New,
    Starting,
    Running,
    Stopping,
    Terminated,
    Failed,
}

impl ServiceState {
    pub fn is_running(&self) -> bool {
        matches!(self, ServiceState::Running)
    }

    /// Connection lost or closed: all ephemeral state of this process is gone
    pub fn is_disconnected(&self) -> bool {
        matches!(
            self,
            ServiceState::Stopping | ServiceState::Terminated | ServiceState::Failed
        )
    }
}

impl fmt::Display for ServiceState {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Operations consumed from the coordination service.
///
/// Paths are absolute and `/` separated. Writes create missing parent nodes.
#[cfg_attr(test, automock)]
pub trait CoordinationClient: Send + Sync {
    /// Names of the direct children of `path`, optionally arming a child watch
    fn get_children(
        &self,
        path: &str,
        watcher: Option<Arc<dyn Watcher>>,
    ) -> Result<Vec<String>>;

    /// Content of the node at `path`, optionally arming a data watch
    fn read_leaf(
        &self,
        path: &str,
        watcher: Option<Arc<dyn Watcher>>,
    ) -> Result<Vec<u8>>;

    fn exists(
        &self,
        path: &str,
    ) -> Result<bool>;

    /// Creates or overwrites a persistent node
    fn replace_persistent_node(
        &self,
        path: &str,
        data: &[u8],
    ) -> Result<()>;

    /// Creates or overwrites a node removed when the session ends
    fn replace_ephemeral_node(
        &self,
        path: &str,
        data: &[u8],
    ) -> Result<()>;

    /// Removes `path` and everything below it. Absent paths are ignored.
    fn delete_recursive(
        &self,
        path: &str,
    ) -> Result<()>;

    /// Lifecycle observable of the underlying connection
    fn service_state(&self) -> watch::Receiver<ServiceState>;
}

/// Reads a leaf as UTF-8 text, trimmed
pub(crate) fn read_string(
    client: &dyn CoordinationClient,
    path: &str,
    watcher: Option<Arc<dyn Watcher>>,
) -> Result<String> {
    let bytes = client.read_leaf(path, watcher)?;
    Ok(String::from_utf8_lossy(&bytes).trim().to_string())
}
