//! Driver configuration.
//!
//! Replaces the module parameters of a kernel driver with an explicit value
//! handed to [`crate::lifecycle::attach`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AttachError, AttachResult};

/// Smallest accepted heartbeat timeout in seconds.
pub const TIMEOUT_MIN_SECS: u32 = 1;

/// Largest accepted heartbeat timeout in seconds.
pub const TIMEOUT_MAX_SECS: u32 = 600;

/// Heartbeat timeout used when none is configured.
pub const TIMEOUT_DEFAULT_SECS: u32 = 30;

/// Default bound on the acknowledgment wait for ENABLE/DISABLE.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Whether `seconds` lies inside `[TIMEOUT_MIN_SECS, TIMEOUT_MAX_SECS]`.
#[must_use]
pub fn timeout_in_range(seconds: u32) -> bool {
    (TIMEOUT_MIN_SECS..=TIMEOUT_MAX_SECS).contains(&seconds)
}

/// Attach-time driver configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Heartbeat timeout override in seconds.
    ///
    /// `None` or `Some(0)` keeps the default. Out-of-range values are ignored
    /// with a warning.
    pub timeout_override: Option<u32>,

    /// Once started, the watchdog cannot be stopped by the subsystem.
    pub nowayout: bool,

    /// Bound on the ENABLE/DISABLE acknowledgment wait.
    ///
    /// `None` waits until the device answers or is detached.
    pub ack_timeout: Option<Duration>,

    /// Stop a running watchdog when it is unregistered on detach.
    pub stop_on_unregister: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            timeout_override: None,
            nowayout: false,
            ack_timeout: Some(DEFAULT_ACK_TIMEOUT),
            stop_on_unregister: true,
        }
    }
}

impl DriverConfig {
    /// Create a configuration builder.
    #[must_use]
    pub fn builder() -> DriverConfigBuilder {
        DriverConfigBuilder::default()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `ack_timeout` is zero.
    pub fn validate(&self) -> AttachResult<()> {
        if self.ack_timeout.is_some_and(|t| t.is_zero()) {
            return Err(AttachError::invalid_configuration(
                "ack_timeout must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Resolve the initial heartbeat timeout.
    ///
    /// Returns the override when it is in range, otherwise the default.
    #[must_use]
    pub fn initial_timeout(&self) -> u32 {
        match self.timeout_override {
            Some(seconds) if timeout_in_range(seconds) => seconds,
            Some(0) | None => TIMEOUT_DEFAULT_SECS,
            Some(seconds) => {
                tracing::warn!(
                    timeout = seconds,
                    default = TIMEOUT_DEFAULT_SECS,
                    "timeout override out of range, using default"
                );
                TIMEOUT_DEFAULT_SECS
            }
        }
    }
}

/// Builder for `DriverConfig`.
#[derive(Debug, Default)]
pub struct DriverConfigBuilder {
    config: DriverConfig,
}

impl DriverConfigBuilder {
    /// Set the heartbeat timeout override in seconds.
    #[must_use]
    pub fn timeout(mut self, seconds: u32) -> Self {
        self.config.timeout_override = Some(seconds);
        self
    }

    /// Set the nowayout flag.
    #[must_use]
    pub fn nowayout(mut self, nowayout: bool) -> Self {
        self.config.nowayout = nowayout;
        self
    }

    /// Set the acknowledgment wait bound.
    #[must_use]
    pub fn ack_timeout(mut self, timeout: Duration) -> Self {
        self.config.ack_timeout = Some(timeout);
        self
    }

    /// Wait for acknowledgments without a bound.
    #[must_use]
    pub fn unbounded_ack_wait(mut self) -> Self {
        self.config.ack_timeout = None;
        self
    }

    /// Enable or disable stop-on-unregister.
    #[must_use]
    pub fn stop_on_unregister(mut self, enabled: bool) -> Self {
        self.config.stop_on_unregister = enabled;
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> AttachResult<DriverConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
