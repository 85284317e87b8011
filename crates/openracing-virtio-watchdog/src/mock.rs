//! Mock transport for testing.
//!
//! [`MockDevice`] stands in for a virtio watchdog device, [`MockQueue`]
//! for its event queue and [`MockRegistry`] for the watchdog subsystem.
//! All of them are cheap handles over shared state, so a test can keep a
//! clone for inspection after handing one to the driver.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::channel::{Completion, EventChannel};
use crate::device::{ConfigSpace, VIRTIO_F_VERSION_1, VIRTIO_ID_WATCHDOG, VirtioDevice};
use crate::error::{ChannelError, ChannelResult, RegistryError};
use crate::event::{ByteOrder, EVENT_SIZE, EventType, WatchdogEvent};
use crate::watchdog::{RegistrationId, WatchdogDescriptor, WatchdogOps, WatchdogRegistry};

/// When the mock device consumes submitted buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckPolicy {
    /// Consume and signal completion inside `notify()`.
    Immediate,
    /// Consume on a background thread after the delay.
    Delayed(Duration),
    /// Never consume; the test drives [`MockQueue::consume_next`].
    Never,
}

#[derive(Debug)]
struct QueueInner {
    capacity: usize,
    available: VecDeque<[u8; EVENT_SIZE]>,
    used: VecDeque<WatchdogEvent>,
    wire_log: Vec<[u8; EVENT_SIZE]>,
    notify_count: u64,
    reclaimed: u64,
    quiesced: bool,
    torn_down: bool,
}

/// Mock event queue.
///
/// Buffers are stored in wire format on submit and decoded again when the
/// device side consumes them.
#[derive(Debug, Clone)]
pub struct MockQueue {
    inner: Arc<Mutex<QueueInner>>,
    completion: Arc<Completion>,
    order: ByteOrder,
    policy: AckPolicy,
}

impl MockQueue {
    /// Create a queue with `capacity` descriptors.
    #[must_use]
    pub fn new(
        completion: Arc<Completion>,
        order: ByteOrder,
        policy: AckPolicy,
        capacity: usize,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(QueueInner {
                capacity,
                available: VecDeque::new(),
                used: VecDeque::new(),
                wire_log: Vec::new(),
                notify_count: 0,
                reclaimed: 0,
                quiesced: false,
                torn_down: false,
            })),
            completion,
            order,
            policy,
        }
    }

    /// Device side: consume the oldest submitted buffer and raise the
    /// completion callback. Returns `false` if nothing was pending.
    pub fn consume_next(&self) -> bool {
        let consumed = {
            let mut inner = self.inner.lock();
            if inner.quiesced {
                return false;
            }
            match inner.available.pop_front() {
                Some(wire) => {
                    if let Some(event) = WatchdogEvent::decode(&wire, self.order) {
                        inner.used.push_back(event);
                    }
                    true
                }
                None => false,
            }
        };
        if consumed {
            self.completion.signal();
        }
        consumed
    }

    /// Device side: consume everything pending. Returns the count.
    pub fn consume_all(&self) -> usize {
        let mut count = 0;
        while self.consume_next() {
            count += 1;
        }
        count
    }

    /// Raise the completion callback without returning a buffer.
    pub fn fire_completion(&self) {
        self.completion.signal();
    }

    /// Stop the device side from consuming anything further.
    pub fn quiesce(&self) {
        self.inner.lock().quiesced = true;
    }

    /// Tear the queue down; later submits fail with `Unavailable`.
    pub fn tear_down(&self) {
        let mut inner = self.inner.lock();
        inner.torn_down = true;
        inner.available.clear();
        inner.used.clear();
    }

    /// Event types submitted so far, decoded from the wire log.
    #[must_use]
    pub fn sent_events(&self) -> Vec<EventType> {
        self.inner
            .lock()
            .wire_log
            .iter()
            .filter_map(|wire| WatchdogEvent::decode(wire, self.order))
            .map(|event| event.event_type())
            .collect()
    }

    /// Raw wire records submitted so far.
    #[must_use]
    pub fn wire_log(&self) -> Vec<[u8; EVENT_SIZE]> {
        self.inner.lock().wire_log.clone()
    }

    /// Number of `notify()` calls.
    #[must_use]
    pub fn notify_count(&self) -> u64 {
        self.inner.lock().notify_count
    }

    /// Buffers submitted but not consumed by the device.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.lock().available.len()
    }

    /// Buffers consumed by the device but not yet reclaimed.
    #[must_use]
    pub fn used_count(&self) -> usize {
        self.inner.lock().used.len()
    }

    /// Buffers handed back to the driver.
    #[must_use]
    pub fn reclaimed_count(&self) -> u64 {
        self.inner.lock().reclaimed
    }

    /// Whether [`MockQueue::tear_down`] ran.
    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.inner.lock().torn_down
    }
}

impl EventChannel for MockQueue {
    fn submit(&mut self, event: WatchdogEvent) -> ChannelResult<()> {
        let mut inner = self.inner.lock();
        if inner.torn_down {
            return Err(ChannelError::Unavailable);
        }
        if inner.available.len() + inner.used.len() >= inner.capacity {
            return Err(ChannelError::QueueFull);
        }
        let wire = event.encode(self.order);
        inner.wire_log.push(wire);
        inner.available.push_back(wire);
        Ok(())
    }

    fn notify(&mut self) {
        self.inner.lock().notify_count += 1;
        match self.policy {
            AckPolicy::Immediate => {
                self.consume_all();
            }
            AckPolicy::Delayed(delay) => {
                let queue = self.clone();
                thread::spawn(move || {
                    thread::sleep(delay);
                    queue.consume_all();
                });
            }
            AckPolicy::Never => {}
        }
    }

    fn try_reclaim(&mut self) -> Option<WatchdogEvent> {
        let mut inner = self.inner.lock();
        let event = inner.used.pop_front()?;
        inner.reclaimed += 1;
        Some(event)
    }
}

#[derive(Debug)]
struct DeviceInner {
    device_id: u32,
    version_1: bool,
    config_access: bool,
    fail_queue_alloc: bool,
    config_timeout: u32,
    config_writes: Vec<u32>,
    queue_allocations: u32,
    queues_deleted: u32,
    resets: u32,
    ready: bool,
    queue: Option<MockQueue>,
}

/// Mock virtio watchdog device.
#[derive(Debug, Clone)]
pub struct MockDevice {
    inner: Arc<Mutex<DeviceInner>>,
    policy: AckPolicy,
    capacity: usize,
}

impl MockDevice {
    /// A well-behaved virtio 1.0 device that acknowledges immediately.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(DeviceInner {
                device_id: VIRTIO_ID_WATCHDOG,
                version_1: true,
                config_access: true,
                fail_queue_alloc: false,
                config_timeout: 0,
                config_writes: Vec::new(),
                queue_allocations: 0,
                queues_deleted: 0,
                resets: 0,
                ready: false,
                queue: None,
            })),
            policy: AckPolicy::Immediate,
            capacity: 8,
        }
    }

    /// Report a different virtio device id.
    #[must_use]
    pub fn with_device_id(self, device_id: u32) -> Self {
        self.inner.lock().device_id = device_id;
        self
    }

    /// Do not offer `VIRTIO_F_VERSION_1`.
    #[must_use]
    pub fn without_version_1(self) -> Self {
        self.inner.lock().version_1 = false;
        self
    }

    /// Disable configuration region access.
    #[must_use]
    pub fn without_config_access(self) -> Self {
        self.inner.lock().config_access = false;
        self
    }

    /// Make queue allocation fail.
    #[must_use]
    pub fn failing_queue_allocation(self) -> Self {
        self.inner.lock().fail_queue_alloc = true;
        self
    }

    /// Set the acknowledgment policy of the queue allocated later.
    #[must_use]
    pub fn with_ack_policy(mut self, policy: AckPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the descriptor count of the queue allocated later.
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// The allocated event queue, if any.
    #[must_use]
    pub fn queue(&self) -> Option<MockQueue> {
        self.inner.lock().queue.clone()
    }

    /// Number of queue allocations performed.
    #[must_use]
    pub fn queue_allocations(&self) -> u32 {
        self.inner.lock().queue_allocations
    }

    /// Number of `delete_queues()` calls.
    #[must_use]
    pub fn queues_deleted(&self) -> u32 {
        self.inner.lock().queues_deleted
    }

    /// Number of device resets.
    #[must_use]
    pub fn resets(&self) -> u32 {
        self.inner.lock().resets
    }

    /// Whether the driver marked the device ready.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.inner.lock().ready
    }

    /// Current `timeout` config field.
    #[must_use]
    pub fn config_timeout(&self) -> u32 {
        self.inner.lock().config_timeout
    }

    /// Every value written to the `timeout` config field.
    #[must_use]
    pub fn config_writes(&self) -> Vec<u32> {
        self.inner.lock().config_writes.clone()
    }
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
struct MockConfigSpace {
    device: Arc<Mutex<DeviceInner>>,
}

impl ConfigSpace for MockConfigSpace {
    fn read_timeout(&self) -> u32 {
        self.device.lock().config_timeout
    }

    fn write_timeout(&self, seconds: u32) {
        let mut device = self.device.lock();
        device.config_timeout = seconds;
        device.config_writes.push(seconds);
    }
}

impl VirtioDevice for MockDevice {
    type Queue = MockQueue;

    fn device_id(&self) -> u32 {
        self.inner.lock().device_id
    }

    fn has_feature(&self, bit: u32) -> bool {
        bit == VIRTIO_F_VERSION_1 && self.inner.lock().version_1
    }

    fn config_space(&self) -> Option<Arc<dyn ConfigSpace>> {
        if !self.inner.lock().config_access {
            return None;
        }
        Some(Arc::new(MockConfigSpace {
            device: Arc::clone(&self.inner),
        }))
    }

    fn find_single_queue(
        &mut self,
        _name: &str,
        completion: Arc<Completion>,
    ) -> ChannelResult<MockQueue> {
        let order = self.byte_order();
        let mut inner = self.inner.lock();
        if inner.fail_queue_alloc {
            return Err(ChannelError::AllocationFailed);
        }
        inner.queue_allocations += 1;
        let queue = MockQueue::new(completion, order, self.policy, self.capacity);
        inner.queue = Some(queue.clone());
        Ok(queue)
    }

    fn delete_queues(&mut self) {
        let mut inner = self.inner.lock();
        inner.queues_deleted += 1;
        if let Some(queue) = inner.queue.take() {
            queue.tear_down();
        }
    }

    fn reset(&mut self) {
        let mut inner = self.inner.lock();
        inner.resets += 1;
        inner.ready = false;
        if let Some(queue) = &inner.queue {
            queue.quiesce();
        }
    }

    fn device_ready(&mut self) {
        self.inner.lock().ready = true;
    }
}

#[derive(Default)]
struct RegistryInner {
    next_id: u32,
    reject: Option<String>,
    entries: Vec<(RegistrationId, WatchdogDescriptor, Weak<dyn WatchdogOps>)>,
    unregistered: Vec<RegistrationId>,
}

/// Mock watchdog subsystem.
#[derive(Clone, Default)]
pub struct MockRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl MockRegistry {
    /// Create an accepting registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry that rejects every registration with `reason`.
    #[must_use]
    pub fn rejecting(reason: impl Into<String>) -> Self {
        let registry = Self::default();
        registry.inner.lock().reject = Some(reason.into());
        registry
    }

    /// Number of live registrations.
    #[must_use]
    pub fn registered_count(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Ids passed to `unregister`, in order.
    #[must_use]
    pub fn unregistered(&self) -> Vec<RegistrationId> {
        self.inner.lock().unregistered.clone()
    }

    /// Descriptor of a live registration.
    #[must_use]
    pub fn descriptor(&self, id: RegistrationId) -> Option<WatchdogDescriptor> {
        self.inner
            .lock()
            .entries
            .iter()
            .find(|(entry_id, _, _)| *entry_id == id)
            .map(|(_, descriptor, _)| descriptor.clone())
    }

    /// Resolve the operations of a registration, as the subsystem would
    /// when a userspace request arrives.
    #[must_use]
    pub fn ops(&self, id: RegistrationId) -> Option<Arc<dyn WatchdogOps>> {
        self.inner
            .lock()
            .entries
            .iter()
            .find(|(entry_id, _, _)| *entry_id == id)
            .and_then(|(_, _, ops)| ops.upgrade())
    }
}

impl core::fmt::Debug for MockRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("MockRegistry")
            .field("registered", &inner.entries.len())
            .field("unregistered", &inner.unregistered)
            .finish_non_exhaustive()
    }
}

impl WatchdogRegistry for MockRegistry {
    fn register(
        &self,
        descriptor: WatchdogDescriptor,
        ops: Weak<dyn WatchdogOps>,
    ) -> Result<RegistrationId, RegistryError> {
        let mut inner = self.inner.lock();
        if let Some(reason) = &inner.reject {
            return Err(RegistryError(reason.clone()));
        }
        let id = RegistrationId(inner.next_id);
        inner.next_id += 1;
        inner.entries.push((id, descriptor, ops));
        Ok(id)
    }

    fn unregister(&self, id: RegistrationId) {
        let mut inner = self.inner.lock();
        inner.entries.retain(|(entry_id, _, _)| *entry_id != id);
        inner.unregistered.push(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_capacity_counts_unreclaimed() {
        let completion = Arc::new(Completion::new());
        let mut queue = MockQueue::new(completion, ByteOrder::Little, AckPolicy::Never, 1);

        assert_eq!(queue.submit(WatchdogEvent::heartbeat()), Ok(()));
        assert!(queue.consume_next());
        assert_eq!(
            queue.submit(WatchdogEvent::heartbeat()),
            Err(ChannelError::QueueFull)
        );
        assert_eq!(queue.try_reclaim(), Some(WatchdogEvent::heartbeat()));
        assert_eq!(queue.submit(WatchdogEvent::heartbeat()), Ok(()));
    }

    #[test]
    fn test_torn_down_queue_is_unavailable() {
        let completion = Arc::new(Completion::new());
        let mut queue = MockQueue::new(completion, ByteOrder::Big, AckPolicy::Never, 4);
        queue.tear_down();
        assert_eq!(
            queue.submit(WatchdogEvent::heartbeat()),
            Err(ChannelError::Unavailable)
        );
    }

    #[test]
    fn test_quiesced_queue_stops_consuming() {
        let completion = Arc::new(Completion::new());
        let mut queue = MockQueue::new(
            Arc::clone(&completion),
            ByteOrder::Little,
            AckPolicy::Never,
            4,
        );
        assert_eq!(queue.submit(WatchdogEvent::heartbeat()), Ok(()));
        queue.quiesce();
        assert!(!queue.consume_next());
        assert_eq!(completion.signal_count(), 0);
    }

    #[test]
    fn test_device_config_space_records_writes() {
        let device = MockDevice::new();
        let config = device.config_space();
        assert!(config.is_some());
        if let Some(config) = config {
            config.write_timeout(45);
            assert_eq!(config.read_timeout(), 45);
        }
        assert_eq!(device.config_writes(), vec![45]);

        let device = MockDevice::new().without_config_access();
        assert!(device.config_space().is_none());
    }
}
