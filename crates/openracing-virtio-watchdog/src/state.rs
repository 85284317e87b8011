//! Watchdog state machine and metrics.
//!
//! Two states only: the device-side watchdog is either stopped or running.
//! The device is authoritative; this is the driver's view after the last
//! acknowledged transition.

use portable_atomic::{AtomicU32, AtomicU64, Ordering};

/// Watchdog operational status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum WatchdogStatus {
    /// Not armed. Initial state.
    #[default]
    Stopped = 0,
    /// Armed; the device expects heartbeats.
    Running = 1,
}

impl WatchdogStatus {
    /// Convert from raw u32 value.
    #[must_use]
    pub fn from_raw(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Stopped),
            1 => Some(Self::Running),
            _ => None,
        }
    }

    /// Convert to raw u32 value.
    #[must_use]
    pub fn to_raw(self) -> u32 {
        self as u32
    }

    /// Get the status as a string slice.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "Stopped",
            Self::Running => "Running",
        }
    }
}

impl core::fmt::Display for WatchdogStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Atomic watchdog state.
///
/// ```text
///            start()              start()
///  Stopped ──────────► Running ◄──────┐
///     ▲  ◄──────────    │  └──────────┘
///     │     stop()      │ ping()
///  stop()               ▼ (stays Running)
/// ```
///
/// Transitions are recorded only after the device acknowledged the
/// request, so a failed `start()`/`stop()` leaves the status untouched.
#[derive(Debug)]
pub struct WatchdogState {
    status: AtomicU32,
    timeout_secs: AtomicU32,
    start_count: AtomicU64,
    stop_count: AtomicU64,
    ping_count: AtomicU64,
    timeout_updates: AtomicU64,
}

impl WatchdogState {
    /// Create a stopped state with the given heartbeat timeout.
    #[must_use]
    pub fn new(timeout_secs: u32) -> Self {
        Self {
            status: AtomicU32::new(WatchdogStatus::Stopped.to_raw()),
            timeout_secs: AtomicU32::new(timeout_secs),
            start_count: AtomicU64::new(0),
            stop_count: AtomicU64::new(0),
            ping_count: AtomicU64::new(0),
            timeout_updates: AtomicU64::new(0),
        }
    }

    /// Get the current status.
    #[must_use]
    pub fn status(&self) -> WatchdogStatus {
        let raw = self.status.load(Ordering::Acquire);
        WatchdogStatus::from_raw(raw).unwrap_or_default()
    }

    /// Whether the status is `Running`.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status() == WatchdogStatus::Running
    }

    /// Record an acknowledged start. Returns the previous status.
    pub fn mark_running(&self) -> WatchdogStatus {
        self.start_count.fetch_add(1, Ordering::Relaxed);
        let previous = self
            .status
            .swap(WatchdogStatus::Running.to_raw(), Ordering::AcqRel);
        WatchdogStatus::from_raw(previous).unwrap_or_default()
    }

    /// Record an acknowledged stop. Returns the previous status.
    pub fn mark_stopped(&self) -> WatchdogStatus {
        self.stop_count.fetch_add(1, Ordering::Relaxed);
        let previous = self
            .status
            .swap(WatchdogStatus::Stopped.to_raw(), Ordering::AcqRel);
        WatchdogStatus::from_raw(previous).unwrap_or_default()
    }

    /// Record a submitted heartbeat.
    pub fn record_ping(&self) {
        self.ping_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Current heartbeat timeout in seconds.
    #[must_use]
    pub fn timeout_secs(&self) -> u32 {
        self.timeout_secs.load(Ordering::Acquire)
    }

    /// Store a new heartbeat timeout.
    pub fn set_timeout_secs(&self, seconds: u32) {
        self.timeout_secs.store(seconds, Ordering::Release);
        self.timeout_updates.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a metrics snapshot.
    #[must_use]
    pub fn metrics(&self) -> WatchdogMetrics {
        WatchdogMetrics {
            status: self.status(),
            timeout_secs: self.timeout_secs(),
            start_count: self.start_count.load(Ordering::Acquire),
            stop_count: self.stop_count.load(Ordering::Acquire),
            ping_count: self.ping_count.load(Ordering::Acquire),
            timeout_updates: self.timeout_updates.load(Ordering::Acquire),
            ..WatchdogMetrics::default()
        }
    }
}

impl Default for WatchdogState {
    fn default() -> Self {
        Self::new(crate::config::TIMEOUT_DEFAULT_SECS)
    }
}

/// Point-in-time snapshot of watchdog counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WatchdogMetrics {
    /// Status at snapshot time.
    pub status: WatchdogStatus,
    /// Heartbeat timeout at snapshot time.
    pub timeout_secs: u32,
    /// Acknowledged starts.
    pub start_count: u64,
    /// Acknowledged stops.
    pub stop_count: u64,
    /// Submitted heartbeats.
    pub ping_count: u64,
    /// Accepted timeout changes.
    pub timeout_updates: u64,
    /// Events submitted to the queue, all types.
    pub events_sent: u64,
    /// ENABLE/DISABLE requests the device acknowledged.
    pub events_acked: u64,
    /// Heartbeat buffers reclaimed after the device consumed them.
    pub heartbeats_reclaimed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let state = WatchdogState::new(30);
        assert_eq!(state.status(), WatchdogStatus::Stopped);
        assert!(!state.is_running());
        assert_eq!(state.timeout_secs(), 30);
    }

    #[test]
    fn test_transitions_report_previous() {
        let state = WatchdogState::default();

        assert_eq!(state.mark_running(), WatchdogStatus::Stopped);
        assert_eq!(state.mark_running(), WatchdogStatus::Running);
        assert!(state.is_running());

        assert_eq!(state.mark_stopped(), WatchdogStatus::Running);
        assert_eq!(state.mark_stopped(), WatchdogStatus::Stopped);
        assert_eq!(state.status(), WatchdogStatus::Stopped);
    }

    #[test]
    fn test_metrics_snapshot() {
        let state = WatchdogState::new(10);
        state.mark_running();
        state.record_ping();
        state.record_ping();
        state.set_timeout_secs(60);

        let metrics = state.metrics();
        assert_eq!(metrics.status, WatchdogStatus::Running);
        assert_eq!(metrics.timeout_secs, 60);
        assert_eq!(metrics.start_count, 1);
        assert_eq!(metrics.ping_count, 2);
        assert_eq!(metrics.timeout_updates, 1);
    }

    #[test]
    fn test_status_raw_roundtrip() {
        assert_eq!(WatchdogStatus::from_raw(1), Some(WatchdogStatus::Running));
        assert_eq!(WatchdogStatus::from_raw(7), None);
        assert_eq!(WatchdogStatus::Running.to_string(), "Running");
    }
}
