//! Driver configuration
//!
//! Read once when the device pair is brought up. Every field has a default,
//! so an empty TOML table is a valid configuration.

use crate::error::{DriverError, Result};
use crate::ether::MacAddress;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How received frames reach the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RxMode {
    /// Each RX interrupt delivers one frame
    #[default]
    Interrupt,
    /// RX interrupts schedule a poll; the stack then drains up to `weight`
    /// frames per poll call
    Poll {
        /// Frames per poll the stack should request
        weight: usize,
    },
}

/// Which device receives a device's transmissions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Wiring {
    /// Device 0 sends to device 1 and vice versa
    #[default]
    Crossed,
    /// Each device receives its own transmissions
    Reflect,
}

/// Configuration for a device pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Suppress TX/RX completion interrupts to exercise timeout recovery
    pub lockup_simulated: bool,
    /// Ticks without a TX completion before the watchdog fires
    pub watchdog_timeout_ticks: u32,
    /// Length of one watchdog tick in milliseconds
    pub tick_interval_ms: u64,
    /// Packet pool capacity per device
    pub pool_size: usize,
    /// Receive delivery mode
    pub rx_mode: RxMode,
    /// Peer wiring
    pub wiring: Wiring,
    /// Link-layer address of device 0; device N adds N to the last octet
    pub mac_base: MacAddress,
    /// Interface name prefix; devices are named `<prefix>0` and `<prefix>1`
    pub name_prefix: String,
}

/// Default TX watchdog timeout, in ticks
pub const DEFAULT_TIMEOUT_TICKS: u32 = 5;
/// Default packet pool capacity
pub const DEFAULT_POOL_SIZE: usize = 8;
/// Default poll weight
pub const DEFAULT_POLL_WEIGHT: usize = 2;
/// Number of devices in a pair
pub const DEVICE_COUNT: usize = 2;

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            lockup_simulated: false,
            watchdog_timeout_ticks: DEFAULT_TIMEOUT_TICKS,
            tick_interval_ms: 10,
            pool_size: DEFAULT_POOL_SIZE,
            rx_mode: RxMode::Interrupt,
            wiring: Wiring::Crossed,
            mac_base: MacAddress::new([0x02, 0x53, 0x49, 0x4d, 0x4e, 0x30]),
            name_prefix: "sim".to_string(),
        }
    }
}

impl DriverConfig {
    /// Set lockup simulation
    #[must_use]
    pub fn with_lockup(mut self, lockup: bool) -> Self {
        self.lockup_simulated = lockup;
        self
    }

    /// Set the pool capacity
    #[must_use]
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Set the receive mode
    #[must_use]
    pub fn with_rx_mode(mut self, rx_mode: RxMode) -> Self {
        self.rx_mode = rx_mode;
        self
    }

    /// Set the peer wiring
    #[must_use]
    pub fn with_wiring(mut self, wiring: Wiring) -> Self {
        self.wiring = wiring;
        self
    }

    /// Watchdog timeout as a duration, saturating at `Duration::MAX`
    #[must_use]
    pub fn watchdog_timeout(&self) -> Duration {
        self.tick_interval().saturating_mul(self.watchdog_timeout_ticks)
    }

    /// One watchdog tick as a duration
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Check the configuration for values the driver cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::InvalidConfig`] describing the first problem
    /// found.
    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(DriverError::InvalidConfig(
                "pool_size must be at least 1".to_string(),
            ));
        }
        if self.watchdog_timeout_ticks == 0 {
            return Err(DriverError::InvalidConfig(
                "watchdog_timeout_ticks must be at least 1".to_string(),
            ));
        }
        if self.tick_interval_ms == 0 {
            return Err(DriverError::InvalidConfig(
                "tick_interval_ms must be at least 1".to_string(),
            ));
        }
        if self
            .tick_interval()
            .checked_mul(self.watchdog_timeout_ticks)
            .is_none()
        {
            return Err(DriverError::InvalidConfig(format!(
                "watchdog timeout of {} ticks of {} ms is out of range",
                self.watchdog_timeout_ticks, self.tick_interval_ms
            )));
        }
        if let RxMode::Poll { weight: 0 } = self.rx_mode {
            return Err(DriverError::InvalidConfig(
                "poll weight must be at least 1".to_string(),
            ));
        }
        if self.mac_base.is_multicast() {
            return Err(DriverError::InvalidConfig(format!(
                "mac_base {} is a group address",
                self.mac_base
            )));
        }
        if self
            .mac_base
            .with_last_octet_offset((DEVICE_COUNT - 1) as u8)
            .is_none()
        {
            return Err(DriverError::InvalidConfig(format!(
                "mac_base {} leaves no room for {} devices",
                self.mac_base, DEVICE_COUNT
            )));
        }
        if self.name_prefix.is_empty() {
            return Err(DriverError::InvalidConfig(
                "name_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
