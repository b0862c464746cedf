//! Cluster membership: instance descriptors, the canonical live set, the
//! coordination observer feeding it and the per-instance connection table.
mod connection;
mod instance;
mod manager;
mod observer;

pub use connection::*;
pub use instance::*;
pub use manager::*;
pub use observer::*;

#[cfg(test)]
mod instance_test;
#[cfg(test)]
mod manager_test;
#[cfg(test)]
mod observer_test;
