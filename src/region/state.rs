use std::fmt;

use tracing::warn;

use crate::MalformedRemoteState;
use crate::RegionError;
use crate::Result;

/// Lifecycle of one region.
///
/// ```text
///  CREATING ──> ACTIVE <──> ACTIVE_FULL
///                 │  ^          │
///                 v  │          v
///              SPLITTING ───> SPLIT ──(merge complete)──> ACTIVE
///                 │
///  ACTIVE/FULL ──> MERGING ──(merge failed)──> ACTIVE
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionState {
    Creating,
    Active,
    ActiveFull,
    Splitting,
    Split,
    Merging,
}

pub const STATES_READ: [RegionState; 4] = [
    RegionState::Active,
    RegionState::ActiveFull,
    RegionState::Splitting,
    RegionState::Merging,
];

pub const STATES_WRITE: [RegionState; 2] = [RegionState::Active, RegionState::ActiveFull];

impl RegionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegionState::Creating => "creating",
            RegionState::Active => "active",
            RegionState::ActiveFull => "active-full",
            RegionState::Splitting => "splitting",
            RegionState::Split => "split",
            RegionState::Merging => "merging",
        }
    }

    pub fn parse(value: &str) -> std::result::Result<Self, String> {
        match value.trim() {
            "creating" => Ok(RegionState::Creating),
            "active" => Ok(RegionState::Active),
            "active-full" => Ok(RegionState::ActiveFull),
            "splitting" => Ok(RegionState::Splitting),
            "split" => Ok(RegionState::Split),
            "merging" => Ok(RegionState::Merging),
            other => Err(format!("unknown region state {other:?}")),
        }
    }

    /// Leaf content of `path`. Unknown values fall back to `Creating`, which
    /// is neither read nor write eligible.
    pub fn from_leaf(
        path: &str,
        value: &str,
    ) -> Self {
        match Self::parse(value) {
            Ok(state) => state,
            Err(reason) => {
                let e = MalformedRemoteState {
                    path: path.to_string(),
                    value: value.to_string(),
                    reason,
                };
                warn!("{}", e);
                RegionState::Creating
            }
        }
    }

    pub fn is_read_eligible(&self) -> bool {
        STATES_READ.contains(self)
    }

    pub fn is_write_eligible(&self) -> bool {
        STATES_WRITE.contains(self)
    }

    pub fn can_transition_to(
        &self,
        to: RegionState,
    ) -> bool {
        use RegionState::*;
        matches!(
            (self, to),
            (Creating, Active)
                | (Active, ActiveFull)
                | (ActiveFull, Active)
                | (Active, Splitting)
                | (ActiveFull, Splitting)
                | (Splitting, Split)
                | (Splitting, Active)
                | (Active, Merging)
                | (ActiveFull, Merging)
                | (Merging, Active)
                | (Split, Active)
        )
    }

    /// `Ok(false)` when already in `to` (tolerated no-op), `Ok(true)` when the
    /// transition must be applied.
    pub fn check_transition(
        &self,
        to: RegionState,
    ) -> Result<bool> {
        if *self == to {
            return Ok(false);
        }
        if self.can_transition_to(to) {
            Ok(true)
        } else {
            Err(RegionError::InvalidTransition { from: *self, to }.into())
        }
    }
}

impl fmt::Display for RegionState {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
