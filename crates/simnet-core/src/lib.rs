//! # simnet core
//!
//! A pair of simulated Ethernet interfaces wired back to back. Whatever one
//! device transmits, the other receives, with interrupts simulated in-line
//! and a per-device packet pool standing in for DMA buffers.
//!
//! This crate provides:
//! - Packet pool with a bounded free list and rx_queue
//! - Device model with open/stop, transmit, receive and timeout recovery
//! - Interrupt-driven or polled receive delivery
//! - Optional lockup simulation to exercise the transmit watchdog
//! - Host stack boundary ([`HostStack`]) plus an in-memory capture stack
//! - Bring-up and teardown of the device pair
//!
//! ```
//! use simnet_core::{CaptureStack, DeviceRegistry, DriverConfig, NetDevice, TxStatus};
//! use std::sync::Arc;
//!
//! let stack = Arc::new(CaptureStack::new());
//! let registry = DeviceRegistry::bring_up(DriverConfig::default(), stack.clone()).unwrap();
//! let (a, b) = (&registry.devices()[0], &registry.devices()[1]);
//! a.open();
//! b.open();
//!
//! let mut frame = vec![0u8; 64];
//! a.create_header(&mut frame, simnet_core::ether::ETH_P_IP, None, None);
//! assert_eq!(a.start_xmit(frame.into()), TxStatus::Sent);
//!
//! let received = stack.take_received();
//! assert_eq!(received[0].dev_name(), Some("sim1"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod device;
pub mod error;
pub mod ether;
pub mod pool;
pub mod ratelimit;
pub mod registry;
pub mod stack;
pub mod stats;
pub mod watchdog;

pub use config::{DriverConfig, RxMode, Wiring};
pub use device::{Device, IfFlags, IfMap, IrqStatus, NetDevice, PoolStatus, TxStatus};
pub use error::{DriverError, Result, StackError};
pub use ether::MacAddress;
pub use registry::DeviceRegistry;
pub use stack::{CaptureStack, HostStack, IngressBuffer, TxBuffer};
pub use stats::{DeviceStats, NetStats};
pub use watchdog::Watchdog;
