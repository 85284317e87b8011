//! BDD tests for virtio watchdog scenarios.
//!
//! Feature: virtio_watchdog.feature

#![cfg(test)]

use openracing_virtio_watchdog::mock::{AckPolicy, MockDevice, MockRegistry};
use openracing_virtio_watchdog::prelude::*;
use std::sync::Arc;
use std::time::{Duration, Instant};

type TestResult = Result<(), Box<dyn std::error::Error>>;

mod lifecycle_scenarios {
    use super::*;

    /// Scenario: Device without the version feature is refused
    #[test]
    fn scenario_device_without_version_feature_is_refused() {
        let device = MockDevice::new().without_version_1();
        let registry = MockRegistry::new();

        let result = attach(device.clone(), Arc::new(registry.clone()), &DriverConfig::default());

        assert!(matches!(result, Err(AttachError::UnsupportedDevice)));
        assert_eq!(device.queue_allocations(), 0);
        assert_eq!(device.queues_deleted(), 0);
        assert_eq!(registry.registered_count(), 0);
    }

    /// Scenario: Attached watchdog starts stopped with the default timeout
    #[test]
    fn scenario_attached_watchdog_starts_stopped() -> TestResult {
        let attached = attach(MockDevice::new(), Arc::new(MockRegistry::new()), &DriverConfig::default())?;
        assert_eq!(attached.watchdog().status(), WatchdogStatus::Stopped);
        assert_eq!(attached.watchdog().timeout(), 30);
        Ok(())
    }

    /// Scenario: Timeout override is applied at attach
    #[test]
    fn scenario_timeout_override_is_applied() -> TestResult {
        let config = DriverConfig::builder().timeout(10).build()?;
        let attached = attach(MockDevice::new(), Arc::new(MockRegistry::new()), &config)?;
        assert_eq!(attached.watchdog().timeout(), 10);
        Ok(())
    }
}

mod protocol_scenarios {
    use super::*;

    /// Scenario: Start then stop waits for each acknowledgment
    #[test]
    fn scenario_start_then_stop_waits_for_each_ack() -> TestResult {
        let delay = Duration::from_millis(30);
        let device = MockDevice::new().with_ack_policy(AckPolicy::Delayed(delay));
        let attached = attach(device.clone(), Arc::new(MockRegistry::new()), &DriverConfig::default())?;
        let watchdog = attached.watchdog();

        let begin = Instant::now();
        watchdog.start()?;
        watchdog.stop()?;

        assert!(begin.elapsed() >= delay * 2);
        assert_eq!(watchdog.status(), WatchdogStatus::Stopped);
        Ok(())
    }

    /// Scenario: Ping is fire-and-forget
    #[test]
    fn scenario_ping_is_fire_and_forget() -> TestResult {
        let device = MockDevice::new().with_ack_policy(AckPolicy::Never);
        let attached = attach(device.clone(), Arc::new(MockRegistry::new()), &DriverConfig::default())?;

        attached.watchdog().ping()?;

        let queue = device.queue().ok_or("queue should be allocated")?;
        assert_eq!(queue.sent_events(), vec![EventType::Heartbeat]);
        assert_eq!(queue.pending_count(), 1);
        Ok(())
    }

    /// Scenario: Starting a running watchdog is idempotent
    #[test]
    fn scenario_start_when_running_is_idempotent() -> TestResult {
        let device = MockDevice::new();
        let attached = attach(device.clone(), Arc::new(MockRegistry::new()), &DriverConfig::default())?;
        let watchdog = attached.watchdog();
        watchdog.start()?;
        let queue = device.queue().ok_or("queue should be allocated")?;
        let before = queue.sent_events().len();

        watchdog.start()?;

        let sent = queue.sent_events();
        assert_eq!(sent.len(), before + 1);
        assert_eq!(sent.last(), Some(&EventType::Enable));
        assert_eq!(watchdog.status(), WatchdogStatus::Running);
        Ok(())
    }

    /// Scenario: Invalid timeout leaves state untouched
    #[test]
    fn scenario_invalid_timeout_leaves_state_untouched() -> TestResult {
        let device = MockDevice::new();
        let attached = attach(device.clone(), Arc::new(MockRegistry::new()), &DriverConfig::default())?;

        let result = attached.watchdog().set_timeout(0);

        assert!(matches!(result, Err(WatchdogError::InvalidTimeout { .. })));
        assert_eq!(attached.watchdog().timeout(), 30);
        assert!(device.config_writes().is_empty());
        Ok(())
    }

    /// Scenario: Unresponsive device surfaces an error on start
    #[test]
    fn scenario_unresponsive_device_fails_start() -> TestResult {
        let device = MockDevice::new().with_ack_policy(AckPolicy::Never);
        let config = DriverConfig::builder()
            .ack_timeout(Duration::from_millis(50))
            .build()?;
        let attached = attach(device, Arc::new(MockRegistry::new()), &config)?;

        let result = attached.watchdog().start();

        assert!(matches!(result, Err(WatchdogError::DeviceUnresponsive(_))));
        assert_eq!(attached.watchdog().status(), WatchdogStatus::Stopped);
        Ok(())
    }
}
