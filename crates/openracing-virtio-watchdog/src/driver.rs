//! Request/response protocol over the event queue.
//!
//! Every watchdog operation becomes exactly one [`WatchdogEvent`]. ENABLE
//! and DISABLE block until the device hands the buffer back; HEARTBEAT is
//! fire-and-forget and its buffer is reclaimed lazily on the next send.
//!
//! The "construct, submit, wait" sequence runs under the driver's own
//! mutex, so at most one acknowledged request is ever waited on even when
//! callers are not serialized by the watchdog subsystem.
//!
//! A request whose wait timed out stays in flight. The device returns
//! buffers in submission order, so the driver counts abandoned requests per
//! type and discards that many matching buffers before it accepts one as
//! the acknowledgment of a newer request.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use portable_atomic::{AtomicU64, Ordering};

use crate::channel::{Completion, EventChannel, WaitError};
use crate::config::DEFAULT_ACK_TIMEOUT;
use crate::error::{ProtocolError, ProtocolResult};
use crate::event::{EventType, WatchdogEvent};

/// Counters kept by the protocol driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DriverStats {
    /// Events submitted to the queue.
    pub events_sent: u64,
    /// ENABLE/DISABLE requests acknowledged by the device.
    pub events_acked: u64,
    /// Fire-and-forget heartbeat buffers taken back from the queue.
    pub heartbeats_reclaimed: u64,
}

/// Timed-out requests whose buffers the device has not returned yet.
#[derive(Debug, Default)]
struct Abandoned {
    enable: u32,
    disable: u32,
}

impl Abandoned {
    fn slot(&mut self, event_type: EventType) -> Option<&mut u32> {
        match event_type {
            EventType::Enable => Some(&mut self.enable),
            EventType::Disable => Some(&mut self.disable),
            EventType::Heartbeat => None,
        }
    }

    fn record(&mut self, event_type: EventType) -> u32 {
        self.slot(event_type).map_or(0, |count| {
            *count = count.saturating_add(1);
            *count
        })
    }

    fn outstanding(&self, event_type: EventType) -> u32 {
        match event_type {
            EventType::Enable => self.enable,
            EventType::Disable => self.disable,
            EventType::Heartbeat => 0,
        }
    }

    /// Consume one abandoned entry of `event_type`, if any.
    fn take(&mut self, event_type: EventType) -> bool {
        match self.slot(event_type) {
            Some(count) if *count > 0 => {
                *count = count.saturating_sub(1);
                true
            }
            _ => false,
        }
    }
}

struct QueueState<C> {
    channel: C,
    abandoned: Abandoned,
}

/// Protocol driver owning the event queue.
pub struct ProtocolDriver<C: EventChannel> {
    queue: Mutex<Option<QueueState<C>>>,
    completion: Arc<Completion>,
    ack_timeout: Option<Duration>,
    events_sent: AtomicU64,
    events_acked: AtomicU64,
    heartbeats_reclaimed: AtomicU64,
}

impl<C: EventChannel> ProtocolDriver<C> {
    /// Wrap `channel`. `completion` must be the signal the transport raises
    /// from this channel's used-buffer callback.
    #[must_use]
    pub fn new(channel: C, completion: Arc<Completion>, ack_timeout: Option<Duration>) -> Self {
        Self {
            queue: Mutex::new(Some(QueueState {
                channel,
                abandoned: Abandoned::default(),
            })),
            completion,
            ack_timeout,
            events_sent: AtomicU64::new(0),
            events_acked: AtomicU64::new(0),
            heartbeats_reclaimed: AtomicU64::new(0),
        }
    }

    /// Send one event to the device.
    ///
    /// Blocks for ENABLE and DISABLE until the device returns the buffer;
    /// returns as soon as the buffer is queued for HEARTBEAT.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::QueueInvariantViolation`] if the queue rejects the
    ///   buffer
    /// - [`ProtocolError::Timeout`] if the acknowledgment wait bound elapses
    /// - [`ProtocolError::Detached`] if the device was or is being torn down
    pub fn send_event(&self, event_type: EventType) -> ProtocolResult<()> {
        let mut guard = self.queue.lock();
        let Some(queue) = guard.as_mut() else {
            return Err(ProtocolError::Detached);
        };
        self.send_locked(queue, event_type, self.ack_timeout)
    }

    /// Like [`ProtocolDriver::send_event`], but gives up instead of queuing
    /// behind another caller, and never waits without a bound.
    ///
    /// An unbounded configuration falls back to [`DEFAULT_ACK_TIMEOUT`].
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Busy`] if another request holds the queue,
    /// otherwise the same errors as [`ProtocolDriver::send_event`].
    pub fn try_send_event(&self, event_type: EventType) -> ProtocolResult<()> {
        let Some(mut guard) = self.queue.try_lock() else {
            return Err(ProtocolError::Busy);
        };
        let Some(queue) = guard.as_mut() else {
            return Err(ProtocolError::Detached);
        };
        let bound = self.ack_timeout.unwrap_or(DEFAULT_ACK_TIMEOUT);
        self.send_locked(queue, event_type, Some(bound))
    }

    fn send_locked(
        &self,
        queue: &mut QueueState<C>,
        event_type: EventType,
        wait: Option<Duration>,
    ) -> ProtocolResult<()> {
        if self.completion.is_closed() {
            return Err(ProtocolError::Detached);
        }
        let event = WatchdogEvent::new(event_type);

        self.reclaim_completed(queue);

        // Only abandoned requests can still be in flight, so a slot exists.
        if let Err(err) = queue.channel.submit(event) {
            tracing::error!(
                event = %event_type,
                error = %err,
                "submit to idle event queue failed"
            );
            return Err(ProtocolError::QueueInvariantViolation(err));
        }
        queue.channel.notify();
        self.events_sent.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(event = %event_type, "event sent");

        if !event_type.requires_ack() {
            return Ok(());
        }

        let acked = self
            .completion
            .wait_for(wait, || self.reclaim_until(queue, event));
        match acked {
            Ok(()) => {
                self.events_acked.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(event = %event_type, "event acknowledged");
                Ok(())
            }
            Err(WaitError::TimedOut) => {
                let timeout = wait.unwrap_or_default();
                let outstanding = queue.abandoned.record(event_type);
                tracing::warn!(
                    event = %event_type,
                    timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    outstanding,
                    "device did not acknowledge event"
                );
                Err(ProtocolError::timeout(event_type.as_str(), timeout))
            }
            Err(WaitError::Closed) => Err(ProtocolError::Detached),
        }
    }

    /// Drain buffers the device already returned.
    fn reclaim_completed(&self, queue: &mut QueueState<C>) {
        while let Some(stale) = queue.channel.try_reclaim() {
            self.discard(&mut queue.abandoned, stale);
        }
    }

    /// Reclaim until the buffer submitted for `expected` comes back.
    /// Heartbeats and late buffers of abandoned requests are dropped.
    fn reclaim_until(&self, queue: &mut QueueState<C>, expected: WatchdogEvent) -> Option<()> {
        loop {
            let reclaimed = queue.channel.try_reclaim()?;
            if reclaimed == expected && queue.abandoned.outstanding(expected.event_type()) == 0 {
                return Some(());
            }
            self.discard(&mut queue.abandoned, reclaimed);
        }
    }

    fn discard(&self, abandoned: &mut Abandoned, event: WatchdogEvent) {
        let event_type = event.event_type();
        if event_type == EventType::Heartbeat {
            self.heartbeats_reclaimed.fetch_add(1, Ordering::Relaxed);
        } else if abandoned.take(event_type) {
            tracing::debug!(event = %event_type, "reclaimed late acknowledgment");
        } else {
            tracing::warn!(event = %event_type, "reclaimed unexpected buffer");
        }
    }

    /// The completion signal shared with the transport callback.
    #[must_use]
    pub fn completion(&self) -> &Arc<Completion> {
        &self.completion
    }

    /// The configured acknowledgment wait bound.
    #[must_use]
    pub fn ack_timeout(&self) -> Option<Duration> {
        self.ack_timeout
    }

    /// Whether the channel has been released.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.queue.lock().is_none()
    }

    /// Cancel pending waits and give the channel back.
    ///
    /// Waiters blocked in [`ProtocolDriver::send_event`] return
    /// [`ProtocolError::Detached`] first, releasing the channel lock.
    /// Returns `None` if the channel was already released.
    pub fn release(&self) -> Option<C> {
        self.completion.close();
        self.queue.lock().take().map(|queue| queue.channel)
    }

    /// Snapshot the driver counters.
    #[must_use]
    pub fn stats(&self) -> DriverStats {
        DriverStats {
            events_sent: self.events_sent.load(Ordering::Acquire),
            events_acked: self.events_acked.load(Ordering::Acquire),
            heartbeats_reclaimed: self.heartbeats_reclaimed.load(Ordering::Acquire),
        }
    }
}

impl<C: EventChannel> core::fmt::Debug for ProtocolDriver<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProtocolDriver")
            .field("ack_timeout", &self.ack_timeout)
            .field("completion", &self.completion)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
