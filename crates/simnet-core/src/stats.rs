//! Per-device interface statistics
//!
//! Counters are atomics so a stats query never contends with the TX/RX
//! paths for the device lock. They only ever increase.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters owned by a device
#[derive(Debug, Default)]
pub struct DeviceStats {
    rx_packets: AtomicU64,
    tx_packets: AtomicU64,
    rx_bytes: AtomicU64,
    tx_bytes: AtomicU64,
    tx_errors: AtomicU64,
    rx_dropped: AtomicU64,
    tx_dropped: AtomicU64,
}

impl DeviceStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a frame handed to the stack
    pub fn record_rx(&self, bytes: usize) {
        self.rx_packets.fetch_add(1, Ordering::Relaxed);
        self.rx_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Record a completed transmission
    pub fn record_tx(&self, bytes: usize) {
        self.tx_packets.fetch_add(1, Ordering::Relaxed);
        self.tx_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Record `count` frames dropped on the receive side
    pub fn record_rx_dropped(&self, count: u64) {
        self.rx_dropped.fetch_add(count, Ordering::Relaxed);
    }

    /// Record a frame dropped on the transmit side
    pub fn record_tx_dropped(&self) {
        self.tx_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a transmit error (timeout)
    pub fn record_tx_error(&self) {
        self.tx_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of current statistics
    pub fn snapshot(&self) -> NetStats {
        NetStats {
            rx_packets: self.rx_packets.load(Ordering::Relaxed),
            tx_packets: self.tx_packets.load(Ordering::Relaxed),
            rx_bytes: self.rx_bytes.load(Ordering::Relaxed),
            tx_bytes: self.tx_bytes.load(Ordering::Relaxed),
            tx_errors: self.tx_errors.load(Ordering::Relaxed),
            rx_dropped: self.rx_dropped.load(Ordering::Relaxed),
            tx_dropped: self.tx_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of device statistics
///
/// Non-atomic copy for reporting. Individual counters are each consistent;
/// the set is not captured atomically as a whole.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NetStats {
    /// Frames delivered to the stack
    pub rx_packets: u64,
    /// Transmissions completed
    pub tx_packets: u64,
    /// Bytes delivered to the stack
    pub rx_bytes: u64,
    /// Bytes of completed transmissions
    pub tx_bytes: u64,
    /// Transmit errors (timeouts)
    pub tx_errors: u64,
    /// Frames dropped on receive (pool exhausted, allocation failure, reset)
    pub rx_dropped: u64,
    /// Frames dropped on transmit (oversized)
    pub tx_dropped: u64,
}

impl NetStats {
    /// Fraction of receive attempts that were dropped
    pub fn rx_drop_rate(&self) -> f64 {
        let total = self.rx_packets + self.rx_dropped;
        if total > 0 {
            self.rx_dropped as f64 / total as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_counters() {
        let stats = DeviceStats::new();
        stats.record_rx(60);
        stats.record_rx(100);
        stats.record_tx(1514);
        stats.record_rx_dropped(3);
        stats.record_tx_dropped();
        stats.record_tx_error();

        let snap = stats.snapshot();
        assert_eq!(snap.rx_packets, 2);
        assert_eq!(snap.rx_bytes, 160);
        assert_eq!(snap.tx_packets, 1);
        assert_eq!(snap.tx_bytes, 1514);
        assert_eq!(snap.rx_dropped, 3);
        assert_eq!(snap.tx_dropped, 1);
        assert_eq!(snap.tx_errors, 1);
    }

    #[test]
    fn test_drop_rate() {
        let snap = NetStats {
            rx_packets: 3,
            rx_dropped: 1,
            ..NetStats::default()
        };
        assert!((snap.rx_drop_rate() - 0.25).abs() < f64::EPSILON);
        assert_eq!(NetStats::default().rx_drop_rate(), 0.0);
    }

    #[test]
    fn test_snapshot_serializes() {
        let stats = DeviceStats::new();
        stats.record_tx(60);
        let json = serde_json::to_value(stats.snapshot()).unwrap();
        assert_eq!(json["tx_packets"], 1);
        assert_eq!(json["tx_bytes"], 60);
        assert_eq!(json["rx_dropped"], 0);
    }
}
