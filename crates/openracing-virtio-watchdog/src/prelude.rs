//! Prelude for openracing-virtio-watchdog.
//!
//! This module re-exports the most commonly used types for convenient importing.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use openracing_virtio_watchdog::prelude::*;
//! use openracing_virtio_watchdog::mock::{MockDevice, MockRegistry};
//!
//! let attached = attach(MockDevice::new(), Arc::new(MockRegistry::new()), &DriverConfig::default())
//!     .expect("attach");
//! attached.watchdog().start().expect("start");
//! attached.watchdog().ping().expect("ping");
//! detach(attached);
//! ```

pub use crate::channel::{Completion, EventChannel};
pub use crate::config::{DriverConfig, DriverConfigBuilder};
pub use crate::device::{ConfigSpace, VirtioDevice};
pub use crate::driver::{DriverStats, ProtocolDriver};
pub use crate::error::{
    AttachError, AttachResult, ChannelError, ChannelResult, ProtocolError, ProtocolResult,
    RegistryError, WatchdogError, WatchdogResult,
};
pub use crate::event::{ByteOrder, EventType, WatchdogEvent};
pub use crate::lifecycle::{AttachedWatchdog, attach, detach};
pub use crate::state::{WatchdogMetrics, WatchdogState, WatchdogStatus};
pub use crate::virtio_impl::VirtioWatchdog;
pub use crate::watchdog::{
    RegistrationId, WatchdogDescriptor, WatchdogInfo, WatchdogOps, WatchdogOptions,
    WatchdogRegistry,
};
