//! Core of a distributed multi-dimensional key-value store.
//!
//! The keyspace of a distribution group is a bounded n-dimensional space,
//! partitioned into a tree of regions. The authoritative tree lives in a
//! coordination service; every process keeps a local projection of it
//! ([`region::RegionSyncer`]), derives the regions it serves
//! ([`region::RegionIdMapper`]) and changes the partition through the two phase
//! split/merge protocol of a [`partitioner::SpacePartitioner`]. Cluster
//! membership is tracked by [`membership::MembershipManager`].

mod config;
pub(crate) mod constants;
mod context;
pub mod coordination;
mod errors;
pub mod geometry;
pub mod membership;
pub mod metrics;
pub mod partitioner;
pub mod region;

pub use config::*;
pub use context::*;
pub use errors::*;

pub use coordination::CoordinationClient;
pub use geometry::Hyperrectangle;
pub use geometry::Interval;
pub use membership::DiskSpace;
pub use membership::Instance;
pub use membership::InstanceAddr;
pub use membership::InstanceState;
pub use region::RegionState;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub(crate) mod test_utils;
