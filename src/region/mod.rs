//! Region model of a distribution group: lifecycle states, the in-memory
//! region tree, its synchronisation with the coordination service and the
//! cache of regions served by this process.
mod id_mapper;
mod state;
mod syncer;
mod tree;

pub use id_mapper::*;
pub use state::*;
pub use syncer::*;
pub use tree::*;

#[cfg(test)]
mod tree_test;
