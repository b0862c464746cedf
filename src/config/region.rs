use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RegionConfig {
    /// Default timeout of the mapper and syncer wait primitives (unit: milliseconds)
    #[serde(default = "default_wait_timeout_ms")]
    pub wait_timeout_ms: u64,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            wait_timeout_ms: default_wait_timeout_ms(),
        }
    }
}

impl RegionConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.wait_timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "wait_timeout_ms must be greater than 0".into(),
            )));
        }
        Ok(())
    }
}

fn default_wait_timeout_ms() -> u64 {
    30_000
}
