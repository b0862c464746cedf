use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// How the in-memory coordinator delivers watch notifications
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// On the thread performing the write, after the store lock is released
    Inline,
    /// On a dedicated dispatcher thread, in write order
    #[default]
    Background,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CoordinationConfig {
    #[serde(default)]
    pub dispatch_mode: DispatchMode,

    /// Bound of the dispatcher queue. 0 means unbounded.
    #[serde(default = "default_dispatch_queue_size")]
    pub dispatch_queue_size: usize,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            dispatch_mode: DispatchMode::default(),
            dispatch_queue_size: default_dispatch_queue_size(),
        }
    }
}

impl CoordinationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.dispatch_mode == DispatchMode::Inline && self.dispatch_queue_size != 0 {
            return Err(Error::Config(ConfigError::Message(
                "dispatch_queue_size only applies to the background dispatch mode (set it to 0)"
                    .into(),
            )));
        }
        Ok(())
    }
}

fn default_dispatch_queue_size() -> usize {
    0
}
