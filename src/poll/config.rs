use crate::core::{BootstrapError, Result};
use std::time::Duration;

/// Configuration for a bounded readiness poll.
///
/// Similar in spirit to a connection config: built once, validated, then
/// passed by reference to every wait.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Fixed wait between status queries.
    pub interval: Duration,

    /// Maximum total wall-clock time to wait for readiness.
    pub timeout: Duration,

    /// Human-readable label for diagnostics ("config server replica set", ...).
    pub description: String,
}

impl PollConfig {
    /// Create a poll configuration with the default cadence:
    /// one query per second, up to one minute.
    pub fn new(description: &str) -> Self {
        Self {
            interval: Duration::from_millis(1000),
            timeout: Duration::from_secs(60),
            description: description.to_string(),
        }
    }

    /// Set the wait between queries.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the total deadline.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replace the diagnostic label, keeping the cadence.
    pub fn describe(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    /// Check the invariants: both durations must be positive.
    ///
    /// A timeout shorter than the interval is legal but leaves room for only
    /// one effective attempt window.
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(BootstrapError::InvalidConfig(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(BootstrapError::InvalidConfig(
                "poll timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
