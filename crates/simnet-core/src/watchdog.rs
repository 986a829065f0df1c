//! Transmit watchdog
//!
//! The host side of timeout detection. A running device whose queue has been
//! stopped for longer than the timeout since its last transmit is considered
//! stuck and gets its `tx_timeout` callback.

use crate::config::DriverConfig;
use crate::device::{Device, NetDevice};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Periodic stall detector
#[derive(Debug, Clone, Copy)]
pub struct Watchdog {
    timeout: Duration,
}

impl Watchdog {
    /// Fire after `timeout` without a completion
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Use the configured tick count and interval
    #[must_use]
    pub fn from_config(config: &DriverConfig) -> Self {
        Self::new(config.watchdog_timeout())
    }

    /// Configured timeout
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether `dev` looks stuck at `now`
    #[must_use]
    pub fn is_stalled(&self, dev: &Device, now: Instant) -> bool {
        dev.is_running()
            && dev.is_queue_stopped()
            && dev
                .last_tx()
                .is_some_and(|t| now.saturating_duration_since(t) >= self.timeout)
    }

    /// Run `tx_timeout` on every stalled device. Returns how many fired.
    pub fn check(&self, devices: &[Arc<Device>], now: Instant) -> usize {
        let mut fired = 0;
        for dev in devices {
            if self.is_stalled(dev, now) {
                tracing::debug!(device = dev.name(), timeout = ?self.timeout, "watchdog fired");
                dev.tx_timeout();
                fired += 1;
            }
        }
        fired
    }
}
