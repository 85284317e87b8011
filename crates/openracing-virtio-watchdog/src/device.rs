//! Transport-facing device contract.
//!
//! Device discovery, feature negotiation plumbing and queue setup belong to
//! the virtio transport. The driver only needs the narrow surface below.

use std::sync::Arc;

use crate::channel::{Completion, EventChannel};
use crate::error::ChannelResult;
use crate::event::ByteOrder;

/// Feature bit signalling a virtio 1.0 (non-legacy) device.
pub const VIRTIO_F_VERSION_1: u32 = 32;

/// Virtio device id assigned to the watchdog.
pub const VIRTIO_ID_WATCHDOG: u32 = 35;

/// Name of the single event queue.
pub const EVENT_QUEUE_NAME: &str = "event";

/// Out-of-band device configuration region.
///
/// Writes are serialized by the transport's configuration access path.
pub trait ConfigSpace: Send + Sync {
    /// Read the `timeout` field (seconds).
    fn read_timeout(&self) -> u32;

    /// Write the `timeout` field (seconds).
    fn write_timeout(&self, seconds: u32);
}

/// A virtio device as seen by this driver.
pub trait VirtioDevice: Send {
    /// Guest half of the event queue produced by [`VirtioDevice::find_single_queue`].
    type Queue: EventChannel + 'static;

    /// Virtio device id reported by the transport.
    fn device_id(&self) -> u32;

    /// Whether the negotiated feature set contains `bit`.
    fn has_feature(&self, bit: u32) -> bool;

    /// Handle to the configuration region, or `None` if config access is
    /// disabled for this device.
    fn config_space(&self) -> Option<Arc<dyn ConfigSpace>>;

    /// Byte order of multi-byte queue fields.
    fn byte_order(&self) -> ByteOrder {
        if self.has_feature(VIRTIO_F_VERSION_1) {
            ByteOrder::Little
        } else {
            legacy_byte_order()
        }
    }

    /// Allocate the single event queue and hook `completion` to its
    /// used-buffer callback.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue could not be allocated.
    fn find_single_queue(
        &mut self,
        name: &str,
        completion: Arc<Completion>,
    ) -> ChannelResult<Self::Queue>;

    /// Release every queue allocated on this device.
    fn delete_queues(&mut self);

    /// Reset the device, quiescing all in-flight queue activity.
    fn reset(&mut self);

    /// Mark the device ready (`DRIVER_OK`).
    fn device_ready(&mut self);
}

/// Legacy devices use guest-native byte order.
fn legacy_byte_order() -> ByteOrder {
    if cfg!(target_endian = "big") {
        ByteOrder::Big
    } else {
        ByteOrder::Little
    }
}
