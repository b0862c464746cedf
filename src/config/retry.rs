use std::thread;
use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::warn;

use crate::Error;
use crate::Result;

/// Bounded retry with a fixed delay between attempts
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// Pause between two attempts (unit: milliseconds)
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
        }
    }
}

impl RetryPolicy {
    pub fn new(
        max_attempts: usize,
        delay_ms: u64,
    ) -> Self {
        Self {
            max_attempts,
            delay_ms,
        }
    }

    /// Single attempt, no pause. Useful for deterministic tests.
    pub fn no_retry() -> Self {
        Self::new(1, 0)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Runs `task` until it succeeds, fails with a non-retryable error, or the
    /// attempts are used up. The last error is returned on exhaustion.
    pub fn run<T, F>(
        &self,
        operation: &str,
        mut task: F,
    ) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match task() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    debug!(operation, attempt, "retrying after error: {}", e);
                    attempt += 1;
                    if self.delay_ms > 0 {
                        thread::sleep(self.delay());
                    }
                }
                Err(e) => {
                    if e.is_retryable() {
                        warn!(operation, attempts, "giving up after {} attempts: {}", attempts, e);
                    }
                    return Err(e);
                }
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::Config(ConfigError::Message(
                "max_attempts must be at least 1".into(),
            )));
        }
        Ok(())
    }
}

/// Retry policies per call site
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RetryPolicies {
    /// Syncer reads of not-yet-finalized region nodes
    #[serde(default = "default_coordination_read")]
    pub coordination_read: RetryPolicy,

    /// Mapper lookups that return no local region yet
    #[serde(default = "default_mapping_lookup")]
    pub mapping_lookup: RetryPolicy,
}

impl Default for RetryPolicies {
    fn default() -> Self {
        Self {
            coordination_read: default_coordination_read(),
            mapping_lookup: default_mapping_lookup(),
        }
    }
}

impl RetryPolicies {
    pub fn validate(&self) -> Result<()> {
        self.coordination_read.validate()?;
        self.mapping_lookup.validate()?;
        Ok(())
    }
}

fn default_max_attempts() -> usize {
    3
}
fn default_delay_ms() -> u64 {
    100
}
fn default_coordination_read() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 20,
        delay_ms: 100,
    }
}
fn default_mapping_lookup() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 10,
        delay_ms: 100,
    }
}
