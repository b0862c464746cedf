//! n-dimensional boxes describing region extents and query windows.
mod hyperrectangle;
mod interval;

pub use hyperrectangle::*;
pub use interval::*;

#[cfg(test)]
mod hyperrectangle_test;
