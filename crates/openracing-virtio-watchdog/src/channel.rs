//! Message channel adapter contract.
//!
//! The driver talks to the device over a single asynchronous queue. The
//! transport implements [`EventChannel`] for the guest-side half and calls
//! [`Completion::signal`] from its used-buffer interrupt whenever the device
//! hands a buffer back.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::ChannelResult;
use crate::event::WatchdogEvent;

/// Guest-side half of the event queue.
///
/// Implementations are single-owner: the protocol driver serializes every
/// call. Only the completion callback runs concurrently, and it never
/// touches the channel itself.
pub trait EventChannel: Send {
    /// Enqueue one outbound buffer.
    ///
    /// # Errors
    ///
    /// - [`crate::ChannelError::QueueFull`] if no descriptor is free
    /// - [`crate::ChannelError::Unavailable`] if the queue was torn down
    fn submit(&mut self, event: WatchdogEvent) -> ChannelResult<()>;

    /// Tell the device that new buffers are available.
    fn notify(&mut self);

    /// Take back one buffer the device has finished with, if any.
    fn try_reclaim(&mut self) -> Option<WatchdogEvent>;
}

impl<C: EventChannel + ?Sized> EventChannel for Box<C> {
    fn submit(&mut self, event: WatchdogEvent) -> ChannelResult<()> {
        (**self).submit(event)
    }

    fn notify(&mut self) {
        (**self).notify();
    }

    fn try_reclaim(&mut self) -> Option<WatchdogEvent> {
        (**self).try_reclaim()
    }
}

#[derive(Debug, Default)]
struct CompletionState {
    /// Bumped on every used-buffer notification.
    signals: u64,
    closed: bool,
}

/// Outcome of a failed [`Completion::wait_for`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
    /// The bound elapsed first.
    TimedOut,
    /// The completion was closed by teardown.
    Closed,
}

/// Wake-up signal resolved by the transport's completion callback.
///
/// The callback side ([`Completion::signal`]) only bumps a counter and wakes
/// waiters. It never allocates and never blocks beyond the short internal
/// lock, which no waiter holds while touching the transport.
#[derive(Debug, Default)]
pub struct Completion {
    state: Mutex<CompletionState>,
    cond: Condvar,
}

impl Completion {
    /// Create an open completion.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Completion callback: the device returned a buffer.
    ///
    /// Safe to call any number of times from any thread. Extra calls wake
    /// waiters that then find nothing new and go back to sleep.
    pub fn signal(&self) {
        let mut state = self.state.lock();
        state.signals = state.signals.wrapping_add(1);
        drop(state);
        self.cond.notify_all();
    }

    /// Cancel all current and future waits. Used on device teardown.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.cond.notify_all();
    }

    /// Whether [`Completion::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of callback invocations seen so far.
    #[must_use]
    pub fn signal_count(&self) -> u64 {
        self.state.lock().signals
    }

    /// Block until `poll` yields a value.
    ///
    /// `poll` runs once up front and again after every signal, without the
    /// internal lock held. The signal count is sampled before each poll, so
    /// a signal raised while `poll` runs is never slept through.
    /// `timeout = None` waits until teardown.
    ///
    /// # Errors
    ///
    /// - [`WaitError::Closed`] once the completion is closed
    /// - [`WaitError::TimedOut`] if `timeout` elapses first
    pub fn wait_for<T>(
        &self,
        timeout: Option<Duration>,
        mut poll: impl FnMut() -> Option<T>,
    ) -> Result<T, WaitError> {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        loop {
            let seen = {
                let state = self.state.lock();
                if state.closed {
                    return Err(WaitError::Closed);
                }
                state.signals
            };
            if let Some(value) = poll() {
                return Ok(value);
            }

            let mut state = self.state.lock();
            while !state.closed && state.signals == seen {
                match deadline {
                    None => self.cond.wait(&mut state),
                    Some(deadline) => {
                        if self.cond.wait_until(&mut state, deadline).timed_out()
                            && !state.closed
                            && state.signals == seen
                        {
                            drop(state);
                            return poll().ok_or(WaitError::TimedOut);
                        }
                    }
                }
            }
        }
    }
}
