use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::constants::UNKNOWN_VERSION;
use crate::Error;
use crate::MembershipError;
use crate::Result;

/// `host:port` identity of one cluster instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceAddr {
    host: String,
    port: u16,
}

impl InstanceAddr {
    pub fn new(
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for InstanceAddr {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for InstanceAddr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| MembershipError::InvalidAddress(s.to_string()))?;
        if host.is_empty() {
            return Err(MembershipError::InvalidAddress(s.to_string()).into());
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| MembershipError::InvalidAddress(s.to_string()))?;
        Ok(Self::new(host, port))
    }
}

/// Liveness of an instance as published in its ephemeral leaf
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InstanceState {
    #[default]
    Unknown,
    Ready,
    Outdated,
    Failed,
}

impl InstanceState {
    /// Wire value of the ephemeral leaf. `Unknown` and `Failed` are never written.
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceState::Unknown => "unknown",
            InstanceState::Ready => "ready",
            InstanceState::Outdated => "outdated",
            InstanceState::Failed => "failed",
        }
    }

    /// Anything but `ready` or `outdated` means the instance is gone
    pub fn from_leaf(value: &str) -> Self {
        match value.trim() {
            "ready" => InstanceState::Ready,
            "outdated" => InstanceState::Outdated,
            _ => InstanceState::Failed,
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Free and total bytes of one storage directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiskSpace {
    pub free: u64,
    pub total: u64,
}

/// One storage/query serving process of the cluster.
///
/// Two descriptors with the same address but any other differing field are
/// considered changed by the membership diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    addr: InstanceAddr,
    version: String,
    cpu_cores: i32,
    memory: i64,
    storages: BTreeMap<PathBuf, DiskSpace>,
    state: InstanceState,
}

impl Instance {
    pub fn new(addr: InstanceAddr) -> Self {
        Self {
            addr,
            version: UNKNOWN_VERSION.to_string(),
            cpu_cores: -1,
            memory: -1,
            storages: BTreeMap::new(),
            state: InstanceState::Unknown,
        }
    }

    pub fn with_state(
        addr: InstanceAddr,
        state: InstanceState,
    ) -> Self {
        let mut instance = Self::new(addr);
        instance.state = state;
        instance
    }

    pub fn addr(&self) -> &InstanceAddr {
        &self.addr
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn set_version(
        &mut self,
        version: impl Into<String>,
    ) {
        self.version = version.into();
    }

    /// `-1` when unknown
    pub fn cpu_cores(&self) -> i32 {
        self.cpu_cores
    }

    pub fn set_cpu_cores(
        &mut self,
        cpu_cores: i32,
    ) {
        self.cpu_cores = cpu_cores;
    }

    /// Bytes, `-1` when unknown
    pub fn memory(&self) -> i64 {
        self.memory
    }

    pub fn set_memory(
        &mut self,
        memory: i64,
    ) {
        self.memory = memory;
    }

    pub fn state(&self) -> InstanceState {
        self.state
    }

    pub fn set_state(
        &mut self,
        state: InstanceState,
    ) {
        self.state = state;
    }

    pub fn storages(&self) -> &BTreeMap<PathBuf, DiskSpace> {
        &self.storages
    }

    pub fn add_storage(
        &mut self,
        path: impl Into<PathBuf>,
        space: DiskSpace,
    ) {
        self.storages.insert(path.into(), space);
    }

    pub fn number_of_storages(&self) -> usize {
        self.storages.len()
    }

    pub fn free_space(&self) -> u64 {
        self.storages.values().map(|s| s.free).sum()
    }

    pub fn total_space(&self) -> u64 {
        self.storages.values().map(|s| s.total).sum()
    }

    pub fn is_failed(&self) -> bool {
        self.state == InstanceState::Failed
    }
}

impl fmt::Display for Instance {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{} ({}, {})", self.addr, self.state, self.version)
    }
}
