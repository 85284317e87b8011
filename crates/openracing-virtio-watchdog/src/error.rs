//! Error types for the virtio watchdog driver.
//!
//! Errors are split by layer: the message channel, the request/response
//! protocol, the watchdog operations exposed upstream, and device attach.

use thiserror::Error;

/// Errors reported by the message channel adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// No descriptor slot was free for the outbound buffer.
    #[error("Event queue is full")]
    QueueFull,

    /// The channel was torn down.
    #[error("Event queue is unavailable")]
    Unavailable,

    /// The transport could not allocate the queue.
    #[error("Event queue allocation failed")]
    AllocationFailed,
}

/// Errors raised while sending a protocol event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Submitting to an idle queue failed. This is a driver bug, not a
    /// recoverable device condition.
    #[error("Queue invariant violated: {0}")]
    QueueInvariantViolation(ChannelError),

    /// The device did not acknowledge the request within the wait bound.
    #[error("Device did not acknowledge {event} within {timeout_ms}ms")]
    Timeout {
        /// Name of the event that went unacknowledged.
        event: &'static str,
        /// The wait bound in milliseconds.
        timeout_ms: u64,
    },

    /// The wait was cancelled because the device was detached.
    #[error("Device detached while waiting for acknowledgment")]
    Detached,

    /// Another request holds the queue. Only returned by non-blocking sends.
    #[error("Event queue is busy with another request")]
    Busy,
}

impl ProtocolError {
    /// Create a timeout error.
    #[must_use]
    pub fn timeout(event: &'static str, timeout: std::time::Duration) -> Self {
        Self::Timeout {
            event,
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Errors surfaced by the watchdog operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WatchdogError {
    /// The transport failed during start, stop or ping.
    #[error("Device unresponsive: {0}")]
    DeviceUnresponsive(#[from] ProtocolError),

    /// Requested timeout is outside the supported range.
    #[error("Invalid timeout {value}s (must be between {min}s and {max}s)")]
    InvalidTimeout {
        /// The rejected value in seconds.
        value: u32,
        /// Minimum accepted timeout.
        min: u32,
        /// Maximum accepted timeout.
        max: u32,
    },
}

impl WatchdogError {
    /// Create an invalid timeout error for the standard bounds.
    #[must_use]
    pub fn invalid_timeout(value: u32) -> Self {
        Self::InvalidTimeout {
            value,
            min: crate::config::TIMEOUT_MIN_SECS,
            max: crate::config::TIMEOUT_MAX_SECS,
        }
    }
}

/// Errors that abort device attach.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttachError {
    /// The device does not offer the required protocol version feature.
    #[error("Unsupported device: VIRTIO_F_VERSION_1 not offered")]
    UnsupportedDevice,

    /// The device configuration region cannot be accessed.
    #[error("Config access disabled")]
    ConfigAccessDisabled,

    /// The event queue could not be allocated.
    #[error("Failed to initialize event queue: {0}")]
    ResourceExhausted(ChannelError),

    /// The watchdog subsystem refused the registration.
    #[error("Watchdog registration failed: {0}")]
    RegistrationFailed(String),

    /// The driver configuration is invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl AttachError {
    /// Create a registration failed error.
    #[must_use]
    pub fn registration_failed(reason: impl Into<String>) -> Self {
        Self::RegistrationFailed(reason.into())
    }

    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_configuration(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration(reason.into())
    }
}

/// Rejection reported by the watchdog subsystem on registration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct RegistryError(pub String);

impl From<RegistryError> for AttachError {
    fn from(err: RegistryError) -> Self {
        Self::RegistrationFailed(err.0)
    }
}

/// A specialized `Result` type for channel operations.
pub type ChannelResult<T> = std::result::Result<T, ChannelError>;

/// A specialized `Result` type for protocol operations.
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;

/// A specialized `Result` type for watchdog operations.
pub type WatchdogResult<T> = std::result::Result<T, WatchdogError>;

/// A specialized `Result` type for attach.
pub type AttachResult<T> = std::result::Result<T, AttachError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_error_display() {
        assert_eq!(ChannelError::QueueFull.to_string(), "Event queue is full");
        assert_eq!(
            AttachError::ConfigAccessDisabled.to_string(),
            "Config access disabled"
        );

        let err = WatchdogError::invalid_timeout(601);
        assert_eq!(
            err.to_string(),
            "Invalid timeout 601s (must be between 1s and 600s)"
        );

        let err = ProtocolError::timeout("ENABLE", Duration::from_millis(250));
        assert_eq!(
            err.to_string(),
            "Device did not acknowledge ENABLE within 250ms"
        );
    }

    #[test]
    fn test_error_constructors() {
        let err = AttachError::registration_failed("no free minor");
        assert!(matches!(err, AttachError::RegistrationFailed(_)));
        assert!(err.to_string().contains("no free minor"));

        let err: AttachError = RegistryError("device busy".to_string()).into();
        assert_eq!(err, AttachError::registration_failed("device busy"));

        let err = AttachError::invalid_configuration("ack timeout is zero");
        assert!(matches!(err, AttachError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_protocol_error_converts_to_unresponsive() {
        let err: WatchdogError = ProtocolError::Detached.into();
        assert!(matches!(
            err,
            WatchdogError::DeviceUnresponsive(ProtocolError::Detached)
        ));
    }
}
