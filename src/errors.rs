//! Error hierarchy for the region tree, coordination and partitioning layers.
//!
//! Errors are grouped by the layer that produces them. Every sub-enum converts
//! into the top-level [`Error`] so call sites can use `?` freely.

use std::time::Duration;

use config::ConfigError;

use crate::RegionState;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failures talking to the coordination service
    #[error(transparent)]
    Coordination(#[from] CoordinationError),

    /// Region tree and state machine violations
    #[error(transparent)]
    Region(#[from] RegionError),

    /// Split/merge protocol failures
    #[error(transparent)]
    Partitioner(#[from] PartitionerError),

    /// Cluster membership failures
    #[error(transparent)]
    Membership(#[from] MembershipError),

    /// Invalid coordinates or box descriptors
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    /// Configuration loading and validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CoordinationError {
    /// Service unreachable or session not established (transient)
    #[error("Coordination service unavailable: {0}")]
    Unavailable(String),

    /// Target path vanished or was never written
    #[error("Coordination path not found: {path}")]
    NotFound { path: String },

    /// Persistent node creation collided with an existing node
    #[error("Coordination path already exists: {path}")]
    AlreadyExists { path: String },

    /// Leaf content could not be parsed
    #[error(transparent)]
    Malformed(#[from] MalformedRemoteState),
}

/// Unparsable leaf content. Readers log it and fall back to a sentinel value.
#[derive(Debug, thiserror::Error)]
#[error("Malformed remote state at {path}: {value:?} ({reason})")]
pub struct MalformedRemoteState {
    pub path: String,
    pub value: String,
    pub reason: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RegionError {
    /// Disallowed lifecycle transition (protocol violation by the caller)
    #[error("Invalid region state transition from {from} to {to}")]
    InvalidTransition { from: RegionState, to: RegionState },

    /// Region id unknown in the current tree snapshot
    #[error("Region {region_id} not found in group {group}")]
    NotFound { group: String, region_id: u64 },

    /// Child number already taken under the parent
    #[error("Child {child_number} already exists under region {parent_region_id}")]
    ChildExists {
        parent_region_id: u64,
        child_number: u64,
    },

    /// Child box escapes the parent box
    #[error("Box of region {region_id} is not covered by its parent")]
    BoxNotContained { region_id: u64 },

    /// Blocking wait exceeded its deadline
    #[error("Timeout after waiting {waited:?} for region {region_id}")]
    WaitTimeout { region_id: u64, waited: Duration },

    /// No tree has been published for the group yet
    #[error("Group {0} has no root region")]
    NoRootRegion(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PartitionerError {
    /// Region is not a leaf, in the wrong state, or the policy forbids it
    #[error("Region {region_id} is not splittable: {reason}")]
    NotSplittable { region_id: u64, reason: String },

    /// Merge sources do not form a valid sibling group
    #[error("Regions {region_ids:?} can not be merged: {reason}")]
    NotMergeable { region_ids: Vec<u64>, reason: String },

    /// Operation on a partitioner that has been shut down
    #[error("Space partitioner for group {0} is not active")]
    Inactive(String),

    /// No instances available for replica placement
    #[error("Unable to allocate {required} systems, only {available} available")]
    ResourceAllocation { required: usize, available: usize },

    /// Strategy produced children that do not partition the parent box
    #[error("Invalid split of region {region_id}: {reason}")]
    InvalidSplit { region_id: u64, reason: String },

    /// Unknown partitioner kind or malformed partitioner configuration
    #[error("Invalid partitioner configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, thiserror::Error)]
pub enum MembershipError {
    /// Session could not be opened to a peer
    #[error("Unable to open session to {address}: {reason}")]
    ConnectFailed { address: String, reason: String },

    /// Address string is not `host:port`
    #[error("Invalid instance address: {0}")]
    InvalidAddress(String),
}

#[derive(Debug, thiserror::Error)]
pub enum GeometryError {
    /// Dimension counts of two operands differ
    #[error("Dimension mismatch (expected: {expected}, actual: {actual})")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Interval with begin > end
    #[error("Invalid interval [{begin}, {end}]")]
    InvalidInterval { begin: f64, end: f64 },

    /// Split position outside of the interval
    #[error("Split position {position} is outside of dimension {dimension}")]
    SplitOutOfRange { position: f64, dimension: usize },

    /// Compact string could not be parsed
    #[error("Unable to parse box descriptor: {0}")]
    Parse(String),
}

// ============== Conversion Implementations ============== //
impl From<MalformedRemoteState> for Error {
    fn from(e: MalformedRemoteState) -> Self {
        Error::Coordination(CoordinationError::Malformed(e))
    }
}

impl Error {
    /// Transient coordination failures that a bounded retry may resolve
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Coordination(CoordinationError::Unavailable(_))
                | Error::Coordination(CoordinationError::NotFound { .. })
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Coordination(CoordinationError::NotFound { .. }))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Region(RegionError::WaitTimeout { .. }))
    }
}
