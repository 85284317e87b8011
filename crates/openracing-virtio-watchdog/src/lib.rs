//! # openracing-virtio-watchdog
//!
//! Guest-side driver core for the paravirtualized (virtio) watchdog.
//!
//! When OpenRacing runs inside a virtual machine the hypervisor provides the
//! hardware watchdog. This crate speaks its protocol over a single event
//! queue and exposes the usual start/stop/ping/set-timeout operations to the
//! watchdog subsystem.
//!
//! ## Layers
//!
//! - [`channel`] - event queue contract and the completion signal
//! - [`driver`] - one event per operation, blocking rules, single in-flight request
//! - [`virtio_impl`] - `VirtioWatchdog`, the Stopped/Running facade
//! - [`lifecycle`] - attach/detach against a [`device::VirtioDevice`]
//!
//! ## Blocking Rules
//!
//! - `start()` / `stop()` block until the device returns the ENABLE/DISABLE
//!   buffer, bounded by [`DriverConfig::ack_timeout`]
//! - `ping()` queues a HEARTBEAT and returns immediately
//! - `set_timeout()` writes the configuration region and does not wait
//!
//! ## Protocol
//!
//! ```text
//! subsystem ──► VirtioWatchdog ──► ProtocolDriver ──submit/notify──► device
//!     ▲                                  ▲                              │
//!     └───────────── returns ◄─── Completion::signal() ◄── used buffer ─┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use openracing_virtio_watchdog::prelude::*;
//! use openracing_virtio_watchdog::mock::{MockDevice, MockRegistry};
//!
//! let config = DriverConfig::builder().timeout(60).build().expect("Valid config");
//! let attached = attach(MockDevice::new(), Arc::new(MockRegistry::new()), &config)
//!     .expect("Failed to attach");
//!
//! let watchdog = attached.watchdog();
//! watchdog.start().expect("Failed to start");
//! watchdog.ping().expect("Failed to ping");
//! assert_eq!(watchdog.status(), WatchdogStatus::Running);
//! assert_eq!(watchdog.timeout(), 60);
//!
//! detach(attached);
//! ```

#![deny(
    unsafe_op_in_unsafe_fn,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::panic,
    missing_docs,
    missing_debug_implementations
)]
#![warn(clippy::pedantic)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod channel;
pub mod config;
pub mod device;
pub mod driver;
pub mod error;
pub mod event;
pub mod lifecycle;
pub mod mock;
pub mod prelude;
pub mod state;
pub mod virtio_impl;
pub mod watchdog;

pub use channel::{Completion, EventChannel};
pub use config::{DriverConfig, DriverConfigBuilder};
pub use device::{ConfigSpace, VirtioDevice};
pub use driver::ProtocolDriver;
pub use error::{AttachError, ChannelError, ProtocolError, RegistryError, WatchdogError};
pub use event::{ByteOrder, EventType, WatchdogEvent};
pub use lifecycle::{AttachedWatchdog, attach, detach};
pub use state::{WatchdogMetrics, WatchdogStatus};
pub use virtio_impl::VirtioWatchdog;
pub use watchdog::{WatchdogInfo, WatchdogOps, WatchdogRegistry};
