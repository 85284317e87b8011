//! Device attach and detach.
//!
//! Attach order: device id and feature gate, config access, queue allocation, driver
//! state, subsystem registration, device ready. Any failure after the queue
//! exists unwinds in the same order detach uses: reset the device, release
//! the queue, free the driver state.

use std::sync::Arc;

use crate::channel::Completion;
use crate::config::DriverConfig;
use crate::device::{EVENT_QUEUE_NAME, VIRTIO_F_VERSION_1, VIRTIO_ID_WATCHDOG, VirtioDevice};
use crate::driver::ProtocolDriver;
use crate::error::{AttachError, AttachResult, ProtocolError, WatchdogError};
use crate::virtio_impl::VirtioWatchdog;
use crate::watchdog::{
    RegistrationId, VIRTIO_WATCHDOG_INFO, WatchdogDescriptor, WatchdogOps, WatchdogRegistry,
};

/// A watchdog bound to a device and registered with the subsystem.
///
/// Dropping it detaches the device.
pub struct AttachedWatchdog<D: VirtioDevice> {
    device: D,
    watchdog: Arc<VirtioWatchdog<D::Queue>>,
    registry: Arc<dyn WatchdogRegistry>,
    registration: RegistrationId,
    stop_on_unregister: bool,
    detached: bool,
}

/// Bind the driver to `device` and register it with `registry`.
///
/// # Errors
///
/// - [`AttachError::InvalidConfiguration`] if `config` does not validate
/// - [`AttachError::UnsupportedDevice`] for a non-watchdog device id or
///   without `VIRTIO_F_VERSION_1`
/// - [`AttachError::ConfigAccessDisabled`] without a config region
/// - [`AttachError::ResourceExhausted`] if the event queue cannot be allocated
/// - [`AttachError::RegistrationFailed`] if the subsystem refuses the device
///
/// Nothing stays allocated on failure.
pub fn attach<D: VirtioDevice>(
    mut device: D,
    registry: Arc<dyn WatchdogRegistry>,
    config: &DriverConfig,
) -> AttachResult<AttachedWatchdog<D>> {
    config.validate()?;

    if device.device_id() != VIRTIO_ID_WATCHDOG {
        return Err(AttachError::UnsupportedDevice);
    }
    if !device.has_feature(VIRTIO_F_VERSION_1) {
        return Err(AttachError::UnsupportedDevice);
    }

    let Some(config_space) = device.config_space() else {
        tracing::error!("attach failure: config access disabled");
        return Err(AttachError::ConfigAccessDisabled);
    };

    let completion = Arc::new(Completion::new());
    let queue = device
        .find_single_queue(EVENT_QUEUE_NAME, Arc::clone(&completion))
        .map_err(|err| {
            tracing::error!(error = %err, "failed to initialize event queue");
            AttachError::ResourceExhausted(err)
        })?;

    let timeout = config.initial_timeout();
    let driver = ProtocolDriver::new(queue, completion, config.ack_timeout);
    let watchdog = Arc::new(VirtioWatchdog::new(
        driver,
        config_space,
        timeout,
        config.nowayout,
    ));

    let descriptor = WatchdogDescriptor {
        info: VIRTIO_WATCHDOG_INFO,
        timeout,
        nowayout: config.nowayout,
        stop_on_reboot: true,
        stop_on_unregister: config.stop_on_unregister,
    };
    let ops: Arc<dyn WatchdogOps> = watchdog.clone();
    let registration = match registry.register(descriptor, Arc::downgrade(&ops)) {
        Ok(id) => id,
        Err(err) => {
            tracing::error!(error = %err, "watchdog registration failed");
            release(&mut device, &watchdog);
            return Err(err.into());
        }
    };

    tracing::info!(
        heartbeat = timeout,
        nowayout = config.nowayout,
        "virtio watchdog initialized"
    );
    device.device_ready();

    Ok(AttachedWatchdog {
        device,
        watchdog,
        registry,
        registration,
        stop_on_unregister: config.stop_on_unregister,
        detached: false,
    })
}

/// Tear down an attached watchdog. Never fails; problems are logged.
pub fn detach<D: VirtioDevice>(attached: AttachedWatchdog<D>) {
    attached.detach();
}

/// Reset the device, release the queue, cancel waiters.
fn release<D: VirtioDevice>(device: &mut D, watchdog: &VirtioWatchdog<D::Queue>) {
    device.reset();
    drop(watchdog.driver().release());
    device.delete_queues();
}

impl<D: VirtioDevice> AttachedWatchdog<D> {
    /// The watchdog operations.
    #[must_use]
    pub fn watchdog(&self) -> &Arc<VirtioWatchdog<D::Queue>> {
        &self.watchdog
    }

    /// The registration handle given by the subsystem.
    #[must_use]
    pub fn registration(&self) -> RegistrationId {
        self.registration
    }

    /// The underlying device.
    #[must_use]
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Tear down the device. Equivalent to dropping it.
    pub fn detach(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if self.detached {
            return;
        }
        self.detached = true;
        tracing::info!(registration = self.registration.0, "removing virtio watchdog");

        if self.stop_on_unregister && self.watchdog.is_running() {
            match self.watchdog.try_stop() {
                Ok(()) => {}
                Err(WatchdogError::DeviceUnresponsive(ProtocolError::Busy)) => {
                    tracing::warn!("request in flight, skipping stop on unregister");
                }
                Err(err) => {
                    tracing::warn!(error = %err, "failed to stop watchdog on unregister");
                }
            }
        }
        self.registry.unregister(self.registration);

        release(&mut self.device, &self.watchdog);
    }
}

impl<D: VirtioDevice> Drop for AttachedWatchdog<D> {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl<D: VirtioDevice> core::fmt::Debug for AttachedWatchdog<D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AttachedWatchdog")
            .field("registration", &self.registration)
            .field("watchdog", &self.watchdog)
            .field("detached", &self.detached)
            .finish_non_exhaustive()
    }
}
