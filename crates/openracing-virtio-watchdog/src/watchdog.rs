//! Contract with the generic watchdog subsystem.
//!
//! The subsystem owns userspace semantics (the character device, nowayout
//! enforcement, magic close). Drivers hand it a [`WatchdogDescriptor`] and
//! an operation table implementing [`WatchdogOps`].

use std::sync::Weak;

use crate::config::{TIMEOUT_DEFAULT_SECS, TIMEOUT_MAX_SECS, TIMEOUT_MIN_SECS};
use crate::error::{RegistryError, WatchdogResult};
use crate::state::WatchdogStatus;

/// Capability flags advertised to the subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct WatchdogOptions(u32);

impl WatchdogOptions {
    /// The timeout can be changed at runtime.
    pub const SET_TIMEOUT: Self = Self(0x0080);
    /// Supports the magic close character to disarm.
    pub const MAGIC_CLOSE: Self = Self(0x0100);
    /// Keepalive pings are supported.
    pub const KEEPALIVE_PING: Self = Self(0x8000);

    /// No capabilities.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Raw flag bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Union of two flag sets.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Whether every flag in `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl core::ops::BitOr for WatchdogOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// Static identity and limits of a watchdog driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogInfo {
    /// Identity string reported to userspace.
    pub identity: &'static str,
    /// Capability flags.
    pub options: WatchdogOptions,
    /// Minimum timeout in seconds.
    pub min_timeout: u32,
    /// Maximum timeout in seconds.
    pub max_timeout: u32,
    /// Default timeout in seconds.
    pub default_timeout: u32,
}

/// Identity and limits of the virtio watchdog.
pub const VIRTIO_WATCHDOG_INFO: WatchdogInfo = WatchdogInfo {
    identity: "Virtio Watchdog",
    options: WatchdogOptions::SET_TIMEOUT
        .union(WatchdogOptions::KEEPALIVE_PING)
        .union(WatchdogOptions::MAGIC_CLOSE),
    min_timeout: TIMEOUT_MIN_SECS,
    max_timeout: TIMEOUT_MAX_SECS,
    default_timeout: TIMEOUT_DEFAULT_SECS,
};

/// Registration request handed to the subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchdogDescriptor {
    /// Identity and limits.
    pub info: WatchdogInfo,
    /// Initial timeout in seconds.
    pub timeout: u32,
    /// Once started, refuse to stop.
    pub nowayout: bool,
    /// Stop the watchdog on system reboot.
    pub stop_on_reboot: bool,
    /// Stop the watchdog when it is unregistered.
    pub stop_on_unregister: bool,
}

/// Operation table invoked by the subsystem.
///
/// Calls may arrive from several threads; implementations serialize
/// internally.
pub trait WatchdogOps: Send + Sync {
    /// Arm the watchdog. Blocks until the device acknowledged.
    ///
    /// # Errors
    ///
    /// Returns [`crate::WatchdogError::DeviceUnresponsive`] on transport
    /// failure.
    fn start(&self) -> WatchdogResult<()>;

    /// Disarm the watchdog. Blocks until the device acknowledged.
    ///
    /// # Errors
    ///
    /// Returns [`crate::WatchdogError::DeviceUnresponsive`] on transport
    /// failure.
    fn stop(&self) -> WatchdogResult<()>;

    /// Send a keepalive. Does not wait for the device.
    ///
    /// # Errors
    ///
    /// Returns [`crate::WatchdogError::DeviceUnresponsive`] if the
    /// heartbeat could not be queued.
    fn ping(&self) -> WatchdogResult<()>;

    /// Change the heartbeat timeout.
    ///
    /// # Errors
    ///
    /// Returns [`crate::WatchdogError::InvalidTimeout`] if `seconds` is out
    /// of range.
    fn set_timeout(&self, seconds: u32) -> WatchdogResult<()>;

    /// Current heartbeat timeout in seconds.
    fn timeout(&self) -> u32;

    /// Driver-side view of the watchdog status.
    fn status(&self) -> WatchdogStatus;

    /// Static identity and limits.
    fn info(&self) -> &WatchdogInfo;
}

/// Opaque handle for a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrationId(pub u32);

/// The generic watchdog subsystem.
///
/// The subsystem keeps only a weak reference to the operations; the
/// attached driver owns them.
pub trait WatchdogRegistry: Send + Sync {
    /// Expose a watchdog to userspace.
    ///
    /// # Errors
    ///
    /// Returns the subsystem's rejection reason.
    fn register(
        &self,
        descriptor: WatchdogDescriptor,
        ops: Weak<dyn WatchdogOps>,
    ) -> Result<RegistrationId, RegistryError>;

    /// Withdraw a watchdog.
    fn unregister(&self, id: RegistrationId);
}
