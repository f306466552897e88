//! Configuration module
//!
//! Handles the pool's tunables, TOML configuration files, and CLI parsing.

pub mod cli;
pub mod toml;

use crate::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Pool protocol configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Sleep between receive probes, in seconds.
    ///
    /// The trade-off knob of the whole channel: smaller means faster
    /// wake-up after a message lands, larger means less idle polling.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: f64,

    /// Keep worker reports on the coordinator.
    #[serde(default = "default_retain_reports")]
    pub retain_reports: bool,

    /// Deadline for every receive, in seconds.
    ///
    /// `None` preserves the protocol's native semantics: a receive blocks
    /// until a matching message arrives, forever if none does. Setting a
    /// deadline turns a crashed or hung peer into an explicit error
    /// instead of a deadlock.
    #[serde(default)]
    pub receive_timeout_secs: Option<f64>,
}

fn default_poll_interval_secs() -> f64 {
    0.1
}

fn default_retain_reports() -> bool {
    true
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            retain_reports: default_retain_reports(),
            receive_timeout_secs: None,
        }
    }
}

impl PoolConfig {
    /// Receive poll interval as a duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.poll_interval_secs)
    }

    /// Receive deadline as a duration, if configured.
    pub fn receive_timeout(&self) -> Option<Duration> {
        self.receive_timeout_secs.map(Duration::from_secs_f64)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if !self.poll_interval_secs.is_finite() || self.poll_interval_secs <= 0.0 {
            anyhow::bail!(
                "poll_interval_secs must be positive and finite, got {}",
                self.poll_interval_secs
            );
        }

        if let Some(timeout) = self.receive_timeout_secs {
            if !timeout.is_finite() || timeout <= 0.0 {
                anyhow::bail!(
                    "receive_timeout_secs must be positive and finite, got {}",
                    timeout
                );
            }
            if timeout <= self.poll_interval_secs {
                anyhow::bail!(
                    "receive_timeout_secs ({}) must exceed poll_interval_secs ({})",
                    timeout,
                    self.poll_interval_secs
                );
            }
        }

        Ok(())
    }
}
