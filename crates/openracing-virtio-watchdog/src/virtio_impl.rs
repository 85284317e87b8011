//! Virtio watchdog operations.
//!
//! This module provides `VirtioWatchdog`, the [`WatchdogOps`] implementation
//! that turns subsystem calls into protocol events.

use std::sync::Arc;

use crate::channel::EventChannel;
use crate::config::timeout_in_range;
use crate::device::ConfigSpace;
use crate::driver::ProtocolDriver;
use crate::error::{WatchdogError, WatchdogResult};
use crate::event::EventType;
use crate::state::{WatchdogMetrics, WatchdogState, WatchdogStatus};
use crate::watchdog::{VIRTIO_WATCHDOG_INFO, WatchdogInfo, WatchdogOps};

/// Watchdog backed by a virtio event queue.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use openracing_virtio_watchdog::prelude::*;
/// use openracing_virtio_watchdog::mock::{AckPolicy, MockDevice, MockQueue};
///
/// let device = MockDevice::new();
/// let completion = Arc::new(Completion::new());
/// let queue = MockQueue::new(Arc::clone(&completion), ByteOrder::Little, AckPolicy::Immediate, 8);
/// let driver = ProtocolDriver::new(queue, completion, None);
/// let config = device.config_space().expect("config access");
/// let watchdog = VirtioWatchdog::new(driver, config, 30, false);
///
/// watchdog.start().expect("start");
/// watchdog.ping().expect("ping");
/// assert_eq!(watchdog.status(), WatchdogStatus::Running);
/// ```
pub struct VirtioWatchdog<C: EventChannel> {
    driver: ProtocolDriver<C>,
    state: WatchdogState,
    config_space: Arc<dyn ConfigSpace>,
    nowayout: bool,
}

impl<C: EventChannel> VirtioWatchdog<C> {
    /// Create a stopped watchdog with `timeout_secs` as its heartbeat
    /// timeout.
    #[must_use]
    pub fn new(
        driver: ProtocolDriver<C>,
        config_space: Arc<dyn ConfigSpace>,
        timeout_secs: u32,
        nowayout: bool,
    ) -> Self {
        Self {
            driver,
            state: WatchdogState::new(timeout_secs),
            config_space,
            nowayout,
        }
    }

    /// Send ENABLE and record `Running` once acknowledged.
    ///
    /// Idempotent: starting a running watchdog sends one more ENABLE.
    ///
    /// # Errors
    ///
    /// Returns [`WatchdogError::DeviceUnresponsive`] on transport failure;
    /// the status is left unchanged.
    pub fn start(&self) -> WatchdogResult<()> {
        self.driver.send_event(EventType::Enable)?;
        let previous = self.state.mark_running();
        tracing::debug!(previous = %previous, "watchdog started");
        Ok(())
    }

    /// Send DISABLE and record `Stopped` once acknowledged.
    ///
    /// The nowayout policy is enforced by the subsystem, not here.
    ///
    /// # Errors
    ///
    /// Returns [`WatchdogError::DeviceUnresponsive`] on transport failure;
    /// the status is left unchanged.
    pub fn stop(&self) -> WatchdogResult<()> {
        self.driver.send_event(EventType::Disable)?;
        let previous = self.state.mark_stopped();
        tracing::debug!(previous = %previous, "watchdog stopped");
        Ok(())
    }

    /// Send DISABLE unless another request is in flight.
    ///
    /// Used on teardown. The wait is always bounded.
    ///
    /// # Errors
    ///
    /// Returns [`WatchdogError::DeviceUnresponsive`] wrapping
    /// [`crate::ProtocolError::Busy`] if the queue is held, or any transport
    /// failure; the status is left unchanged.
    pub fn try_stop(&self) -> WatchdogResult<()> {
        self.driver.try_send_event(EventType::Disable)?;
        let previous = self.state.mark_stopped();
        tracing::debug!(previous = %previous, "watchdog stopped");
        Ok(())
    }

    /// Queue a heartbeat and return without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`WatchdogError::DeviceUnresponsive`] if the heartbeat could
    /// not be queued.
    pub fn ping(&self) -> WatchdogResult<()> {
        self.driver.send_event(EventType::Heartbeat)?;
        self.state.record_ping();
        Ok(())
    }

    /// Write a new heartbeat timeout to the device configuration region.
    ///
    /// The local value is updated without waiting for the device to confirm.
    ///
    /// # Errors
    ///
    /// Returns [`WatchdogError::InvalidTimeout`] if `seconds` is outside
    /// `[1, 600]`; nothing is written in that case.
    pub fn set_timeout(&self, seconds: u32) -> WatchdogResult<()> {
        if !timeout_in_range(seconds) {
            return Err(WatchdogError::invalid_timeout(seconds));
        }
        self.config_space.write_timeout(seconds);
        self.state.set_timeout_secs(seconds);
        tracing::debug!(timeout = seconds, "heartbeat timeout updated");
        Ok(())
    }

    /// Current heartbeat timeout in seconds.
    #[must_use]
    pub fn timeout(&self) -> u32 {
        self.state.timeout_secs()
    }

    /// Driver-side status.
    #[must_use]
    pub fn status(&self) -> WatchdogStatus {
        self.state.status()
    }

    /// Whether the status is `Running`.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Whether nowayout was requested at attach.
    #[must_use]
    pub fn nowayout(&self) -> bool {
        self.nowayout
    }

    /// The underlying protocol driver.
    #[must_use]
    pub fn driver(&self) -> &ProtocolDriver<C> {
        &self.driver
    }

    /// Snapshot of operation and protocol counters.
    #[must_use]
    pub fn metrics(&self) -> WatchdogMetrics {
        let stats = self.driver.stats();
        WatchdogMetrics {
            events_sent: stats.events_sent,
            events_acked: stats.events_acked,
            heartbeats_reclaimed: stats.heartbeats_reclaimed,
            ..self.state.metrics()
        }
    }
}

impl<C: EventChannel> WatchdogOps for VirtioWatchdog<C> {
    fn start(&self) -> WatchdogResult<()> {
        VirtioWatchdog::start(self)
    }

    fn stop(&self) -> WatchdogResult<()> {
        VirtioWatchdog::stop(self)
    }

    fn ping(&self) -> WatchdogResult<()> {
        VirtioWatchdog::ping(self)
    }

    fn set_timeout(&self, seconds: u32) -> WatchdogResult<()> {
        VirtioWatchdog::set_timeout(self, seconds)
    }

    fn timeout(&self) -> u32 {
        VirtioWatchdog::timeout(self)
    }

    fn status(&self) -> WatchdogStatus {
        VirtioWatchdog::status(self)
    }

    fn info(&self) -> &WatchdogInfo {
        &VIRTIO_WATCHDOG_INFO
    }
}

impl<C: EventChannel> core::fmt::Debug for VirtioWatchdog<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("VirtioWatchdog")
            .field("status", &self.state.status())
            .field("timeout_secs", &self.state.timeout_secs())
            .field("nowayout", &self.nowayout)
            .field("driver", &self.driver)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Completion;
    use crate::device::VirtioDevice;
    use crate::error::ProtocolError;
    use crate::event::ByteOrder;
    use crate::mock::{AckPolicy, MockDevice, MockQueue};
    use std::time::Duration;

    fn watchdog_with(policy: AckPolicy) -> (VirtioWatchdog<MockQueue>, MockDevice, MockQueue) {
        let device = MockDevice::new();
        let completion = Arc::new(Completion::new());
        let queue = MockQueue::new(Arc::clone(&completion), ByteOrder::Little, policy, 8);
        let driver = ProtocolDriver::new(
            queue.clone(),
            completion,
            Some(Duration::from_millis(100)),
        );
        let config = device
            .config_space()
            .expect("mock device exposes config space");
        (VirtioWatchdog::new(driver, config, 30, false), device, queue)
    }

    #[test]
    fn test_initial_state() {
        let (watchdog, _device, _queue) = watchdog_with(AckPolicy::Immediate);
        assert_eq!(watchdog.status(), WatchdogStatus::Stopped);
        assert_eq!(watchdog.timeout(), 30);
        assert!(!watchdog.nowayout());
    }

    #[test]
    fn test_start_stop() {
        let (watchdog, _device, queue) = watchdog_with(AckPolicy::Immediate);

        watchdog.start().expect("start should succeed");
        assert!(watchdog.is_running());

        watchdog.stop().expect("stop should succeed");
        assert_eq!(watchdog.status(), WatchdogStatus::Stopped);

        assert_eq!(
            queue.sent_events(),
            vec![EventType::Enable, EventType::Disable]
        );
    }

    #[test]
    fn test_failed_start_leaves_status() {
        let (watchdog, _device, _queue) = watchdog_with(AckPolicy::Never);

        let result = watchdog.start();
        assert!(matches!(
            result,
            Err(WatchdogError::DeviceUnresponsive(ProtocolError::Timeout { .. }))
        ));
        assert_eq!(watchdog.status(), WatchdogStatus::Stopped);
    }

    #[test]
    fn test_set_timeout_writes_config() {
        let (watchdog, device, _queue) = watchdog_with(AckPolicy::Immediate);

        watchdog.set_timeout(120).expect("in-range timeout");
        assert_eq!(watchdog.timeout(), 120);
        assert_eq!(device.config_timeout(), 120);

        let result = watchdog.set_timeout(0);
        assert!(matches!(result, Err(WatchdogError::InvalidTimeout { .. })));
        assert_eq!(watchdog.timeout(), 120);
        assert_eq!(device.config_writes(), vec![120]);
    }

    #[test]
    fn test_metrics_combine_driver_stats() {
        let (watchdog, _device, _queue) = watchdog_with(AckPolicy::Immediate);

        watchdog.start().expect("start");
        watchdog.ping().expect("ping");
        watchdog.ping().expect("ping");

        let metrics = watchdog.metrics();
        assert_eq!(metrics.start_count, 1);
        assert_eq!(metrics.ping_count, 2);
        assert_eq!(metrics.events_sent, 3);
        assert_eq!(metrics.events_acked, 1);
        assert_eq!(metrics.heartbeats_reclaimed, 1);
    }

    #[test]
    fn test_ops_table_info() {
        let (watchdog, _device, _queue) = watchdog_with(AckPolicy::Immediate);
        let ops: &dyn WatchdogOps = &watchdog;
        assert_eq!(ops.info().identity, "Virtio Watchdog");
        assert_eq!(ops.timeout(), 30);
    }
}
