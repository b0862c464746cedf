//! Helpers shared by the unit tests of every module
mod common;
mod fixture;

pub(crate) use common::*;
pub(crate) use fixture::*;
