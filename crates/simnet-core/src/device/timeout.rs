//! Transmit timeout recovery

use super::{Device, IrqStatus};

impl Device {
    /// Recover from a transmission that never completed.
    ///
    /// Completes every in-flight buffer, replays the RX interrupts a lockup
    /// swallowed on the peer, counts a `tx_error`, resets the pool and wakes
    /// the queue. Frames still queued at the reset are freed with the pool
    /// and not counted anywhere. Calling this with nothing stalled changes
    /// no counter but `tx_errors`.
    pub fn recover_tx_timeout(&self) {
        let stalled = std::mem::take(&mut self.state.lock().stalled);
        let latency = self.last_tx().map(|t| t.elapsed());
        tracing::warn!(
            device = %self.name,
            ?latency,
            stalled,
            "transmit timeout"
        );

        self.raise(IrqStatus::TX);
        if stalled > 0 {
            if let Some(peer) = self.peer() {
                for _ in 0..stalled {
                    peer.kick_rx();
                }
            }
        }

        self.stats.record_tx_error();

        let discarded = self.state.lock().pool.reset();
        if discarded > 0 {
            tracing::debug!(device = %self.name, discarded, "pool reset discarded queued frames");
        }

        self.wake_queue();
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use crate::config::DriverConfig;
    use crate::device::NetDevice;

    #[test]
    fn test_timeout_after_lockup_recovers() {
        let (stack, a, b) = open_pair(DriverConfig::default().with_lockup(true));
        let f = frame(&a, &b, 100, 9);
        let _ = a.start_xmit(f.clone().into());
        assert!(a.is_queue_stopped());

        a.tx_timeout();

        assert!(!a.is_queue_stopped());
        assert!(!stack.is_queue_stopped("sim0"));
        assert_eq!(a.tx_in_flight(), 0);

        let stats = a.get_stats();
        assert_eq!(stats.tx_errors, 1);
        assert_eq!(stats.tx_packets, 1);
        assert_eq!(stats.tx_bytes, 100);

        // The parked frame still reaches the peer
        let got = stack.take_received();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].frame(), &f[..]);
        assert_eq!(b.get_stats().rx_packets, 1);
        assert_eq!(b.pool_status().queued, 0);

        let pool = a.pool_status();
        assert_eq!(pool.available, pool.capacity);
    }

    #[test]
    fn test_timeout_is_idempotent_for_completions() {
        let (_stack, a, b) = open_pair(DriverConfig::default().with_lockup(true));
        let _ = a.start_xmit(frame(&a, &b, 64, 0).into());

        a.tx_timeout();
        a.tx_timeout();

        let stats = a.get_stats();
        assert_eq!(stats.tx_packets, 1);
        assert_eq!(stats.tx_errors, 2);
        assert!(!a.is_queue_stopped());
    }

    #[test]
    fn test_timeout_frees_own_backlog_uncounted() {
        let (_stack, a, b) = open_pair(DriverConfig::default());
        a.set_rx_interrupts(false);
        let _ = b.start_xmit(frame(&b, &a, 64, 0).into());
        let _ = b.start_xmit(frame(&b, &a, 64, 1).into());
        assert_eq!(a.pool_status().queued, 2);
        let before = a.get_stats();

        a.tx_timeout();
        a.tx_timeout();

        let after = a.get_stats();
        assert_eq!(after.rx_dropped, before.rx_dropped);
        assert_eq!(after.rx_packets, before.rx_packets);
        assert_eq!(after.tx_errors, before.tx_errors + 2);
        assert_eq!(a.pool_status().queued, 0);
        assert_eq!(a.pool_status().available, 8);
    }

    #[test]
    fn test_replay_respects_disabled_rx() {
        let (stack, a, b) = open_pair(DriverConfig::default().with_lockup(true));
        b.set_rx_interrupts(false);
        let _ = a.start_xmit(frame(&a, &b, 64, 0).into());

        a.tx_timeout();

        assert!(stack.take_received().is_empty());
        assert_eq!(b.pool_status().queued, 1);
        assert_eq!(b.poll(4), 1);
        assert_eq!(stack.take_received().len(), 1);
    }
}
