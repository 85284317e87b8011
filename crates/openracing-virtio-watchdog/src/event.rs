//! Watchdog event records carried on the event queue.
//!
//! Each request is a fixed 2-byte record holding a single 16-bit `type`
//! field. The byte order is negotiated by the transport: legacy devices use
//! little-endian, modern transports use their native order.

use serde::{Deserialize, Serialize};

/// Size of an encoded [`WatchdogEvent`] in bytes.
pub const EVENT_SIZE: usize = 2;

/// Kind of watchdog event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum EventType {
    /// Keepalive ping. Fire-and-forget.
    Heartbeat = 0,
    /// Arm the device-side watchdog.
    Enable = 1,
    /// Disarm the device-side watchdog.
    Disable = 2,
}

impl EventType {
    /// All event types, in code order.
    pub const ALL: [Self; 3] = [Self::Heartbeat, Self::Enable, Self::Disable];

    /// Convert from the raw wire code.
    #[must_use]
    pub fn from_raw(value: u16) -> Option<Self> {
        match value {
            0 => Some(Self::Heartbeat),
            1 => Some(Self::Enable),
            2 => Some(Self::Disable),
            _ => None,
        }
    }

    /// Convert to the raw wire code.
    #[must_use]
    pub fn to_raw(self) -> u16 {
        self as u16
    }

    /// Whether the sender waits for the device to return the buffer.
    #[must_use]
    pub fn requires_ack(self) -> bool {
        !matches!(self, Self::Heartbeat)
    }

    /// Get the event type as a string slice.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Heartbeat => "HEARTBEAT",
            Self::Enable => "ENABLE",
            Self::Disable => "DISABLE",
        }
    }
}

impl core::fmt::Display for EventType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Byte order of multi-byte fields on the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ByteOrder {
    /// Little-endian (legacy configuration path, and virtio 1.0 devices).
    #[default]
    Little,
    /// Big-endian transport.
    Big,
}

/// A single watchdog protocol message.
///
/// Immutable once built. Ownership moves into the channel on submit and
/// comes back through [`crate::channel::EventChannel::try_reclaim`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WatchdogEvent {
    event_type: EventType,
}

impl WatchdogEvent {
    /// Build an event of the given type.
    #[must_use]
    pub const fn new(event_type: EventType) -> Self {
        Self { event_type }
    }

    /// Shorthand for a heartbeat event.
    #[must_use]
    pub const fn heartbeat() -> Self {
        Self::new(EventType::Heartbeat)
    }

    /// The event type.
    #[must_use]
    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    /// Encode into the fixed wire record.
    #[must_use]
    pub fn encode(&self, order: ByteOrder) -> [u8; EVENT_SIZE] {
        let raw = self.event_type.to_raw();
        match order {
            ByteOrder::Little => raw.to_le_bytes(),
            ByteOrder::Big => raw.to_be_bytes(),
        }
    }

    /// Decode a wire record.
    ///
    /// Returns `None` if the slice has the wrong length or carries an
    /// unknown event code.
    #[must_use]
    pub fn decode(bytes: &[u8], order: ByteOrder) -> Option<Self> {
        let raw: [u8; EVENT_SIZE] = bytes.try_into().ok()?;
        let value = match order {
            ByteOrder::Little => u16::from_le_bytes(raw),
            ByteOrder::Big => u16::from_be_bytes(raw),
        };
        EventType::from_raw(value).map(Self::new)
    }
}

impl From<EventType> for WatchdogEvent {
    fn from(event_type: EventType) -> Self {
        Self::new(event_type)
    }
}
