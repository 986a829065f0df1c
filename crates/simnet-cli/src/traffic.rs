//! Traffic generator
//!
//! Sends frames alternately from each device to its peer, services poll
//! requests and drains what the capture stack received. A sender whose queue
//! is stopped waits a tick at a time; with lockup simulated, the watchdog
//! task is what wakes it again.

use crate::config::TrafficConfig;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use simnet_core::config::DEFAULT_POLL_WEIGHT;
use simnet_core::ether::{ETH_HLEN, ETH_P_IP};
use simnet_core::{CaptureStack, DeviceRegistry, NetDevice, NetStats, TxStatus};
use std::time::{Duration, Instant};

/// Result of a traffic run
#[derive(Debug, Clone, Serialize)]
pub struct TrafficSummary {
    /// Frames the devices accepted
    pub sent: u64,
    /// Frames the devices refused as oversized
    pub dropped: u64,
    /// Frames the capture stack received
    pub delivered: u64,
    /// Bytes offered to the devices
    pub offered_bytes: u64,
    /// Wall time of the run
    pub elapsed_ms: u64,
    /// Per-device state at the end of the run
    pub devices: Vec<DeviceSummary>,
}

/// Per-device state
#[derive(Debug, Clone, Serialize)]
pub struct DeviceSummary {
    /// Interface name
    pub name: String,
    /// Link-layer address
    pub mac: String,
    /// Interface statistics
    pub stats: NetStats,
    /// Free pool buffers
    pub pool_available: usize,
    /// Pool capacity
    pub pool_capacity: usize,
}

impl DeviceSummary {
    /// Snapshot every device in `registry`
    pub fn collect(registry: &DeviceRegistry) -> Vec<Self> {
        registry
            .devices()
            .iter()
            .map(|dev| {
                let pool = dev.pool_status();
                Self {
                    name: dev.name().to_string(),
                    mac: dev.mac_address().to_string(),
                    stats: dev.get_stats(),
                    pool_available: pool.available,
                    pool_capacity: pool.capacity,
                }
            })
            .collect()
    }
}

/// Frame source
pub struct Generator {
    rng: SmallRng,
    min_size: usize,
    max_size: usize,
    interval: Duration,
    tick: Duration,
    sent: u64,
    dropped: u64,
    delivered: u64,
    offered_bytes: u64,
}

impl Generator {
    /// Build from the traffic section; `tick` is the wait used while a
    /// queue is stopped
    pub fn new(config: &TrafficConfig, tick: Duration) -> Self {
        let rng = match config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        Self {
            rng,
            min_size: config.min_size,
            max_size: config.max_size,
            interval: config.interval(),
            tick,
            sent: 0,
            dropped: 0,
            delivered: 0,
            offered_bytes: 0,
        }
    }

    /// Random frame for `dev` to send to its peer
    pub fn frame(&mut self, dev: &dyn NetDevice) -> Vec<u8> {
        let len = self.rng.gen_range(self.min_size..=self.max_size);
        let mut frame = vec![0u8; len];
        self.rng.fill(&mut frame[ETH_HLEN..]);
        dev.create_header(&mut frame, ETH_P_IP, None, None);
        frame
    }

    /// Send one frame from device `index`, waiting while its queue is
    /// stopped
    pub async fn send_one(&mut self, registry: &DeviceRegistry, stack: &CaptureStack, index: usize) {
        let Some(dev) = registry.get(index) else {
            return;
        };

        let mut waited = 0u32;
        while dev.is_queue_stopped() {
            if waited == 0 {
                tracing::debug!(device = dev.name(), "queue stopped, waiting");
            }
            waited += 1;
            tokio::time::sleep(self.tick).await;
        }

        let frame = self.frame(&**dev);
        self.offered_bytes += frame.len() as u64;
        match dev.start_xmit(frame.into()) {
            TxStatus::Sent => self.sent += 1,
            TxStatus::Dropped => self.dropped += 1,
        }

        service_polls(registry, stack);
        self.delivered += stack.take_received().len() as u64;

        if self.interval.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.interval).await;
        }
    }

    /// Send `frames` frames, alternating devices
    pub async fn run(&mut self, registry: &DeviceRegistry, stack: &CaptureStack, frames: u64) {
        let count = registry.devices().len() as u64;
        for n in 0..frames {
            self.send_one(registry, stack, (n % count) as usize).await;
        }
    }

    /// Summarize the run so far
    pub fn summary(&self, registry: &DeviceRegistry, started: Instant) -> TrafficSummary {
        TrafficSummary {
            sent: self.sent,
            dropped: self.dropped,
            delivered: self.delivered,
            offered_bytes: self.offered_bytes,
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            devices: DeviceSummary::collect(registry),
        }
    }
}

/// Answer pending poll requests until none are left
pub fn service_polls(registry: &DeviceRegistry, stack: &CaptureStack) -> usize {
    let mut total = 0;
    loop {
        let requests = stack.take_poll_requests();
        if requests.is_empty() {
            return total;
        }
        for name in requests {
            if let Some(dev) = registry.by_name(&name) {
                let weight = dev.poll_weight().unwrap_or(DEFAULT_POLL_WEIGHT);
                total += dev.poll(weight);
            }
        }
    }
}
