//! Transmit path and the simulated wire

use super::{Device, InFlight, IrqStatus, NetDevice};
use crate::ether::{ETH_HLEN, ETH_ZLEN};
use crate::stack::TxBuffer;

/// Outcome of handing a frame to [`Device::transmit`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum TxStatus {
    /// Accepted; the buffer is released on TX completion
    Sent,
    /// Discarded and counted in `tx_dropped`; the buffer is already released
    Dropped,
}

impl Device {
    /// Transmit `skb` to the peer.
    ///
    /// Frames shorter than the Ethernet minimum go out zero-padded to 60
    /// bytes. The buffer stays with the device until the TX completion
    /// interrupt.
    pub fn transmit(&self, skb: TxBuffer) -> TxStatus {
        let max = self.mtu() + ETH_HLEN;
        if skb.len() > max {
            self.stats.record_tx_dropped();
            tracing::debug!(device = %self.name, len = skb.len(), max, "oversized frame dropped");
            return TxStatus::Dropped;
        }

        let mut shortpkt = [0u8; ETH_ZLEN];
        let wire: &[u8] = if skb.len() < ETH_ZLEN {
            shortpkt[..skb.len()].copy_from_slice(skb.data());
            &shortpkt
        } else {
            skb.data()
        };
        let wire_len = wire.len();

        self.touch_trans_start();

        // Put the frame on the wire before recording it as in flight; the
        // peer only sees it once the RX interrupt is raised below.
        let peer = self.peer();
        let delivered = match &peer {
            Some(peer) => peer.hw_receive(wire),
            None => {
                tracing::debug!(device = %self.name, "no peer, frame lost on the wire");
                None
            }
        };

        let lockup = self.config.lockup_simulated;
        {
            let mut st = self.state.lock();
            st.tx_packetlen = wire_len;
            st.tx_inflight.push_back(InFlight { skb, wire_len });
            if lockup && delivered.is_some() {
                st.stalled += 1;
            }
        }

        if lockup {
            tracing::debug!(device = %self.name, "simulating lockup, interrupts suppressed");
            self.stop_queue();
            return TxStatus::Sent;
        }

        if let (Some(peer), Some(true)) = (&peer, delivered) {
            peer.raise(IrqStatus::RX);
        }
        self.raise(IrqStatus::TX);
        TxStatus::Sent
    }

    /// Receive side of the wire: copy `frame` into a pool buffer and queue
    /// it. Returns `None` if the frame was dropped, otherwise whether RX
    /// interrupts are enabled. A device that is down drops everything.
    pub(super) fn hw_receive(&self, frame: &[u8]) -> Option<bool> {
        let mut st = self.state.lock();
        if !st.rx_enabled {
            drop(st);
            self.stats.record_rx_dropped(1);
            tracing::trace!(device = %self.name, "receive path down, frame dropped");
            return None;
        }
        let Some(mut pkt) = st.pool.acquire() else {
            drop(st);
            self.stats.record_rx_dropped(1);
            if self.rx_ratelimit.allow() {
                tracing::warn!(device = %self.name, "out of pool buffers, frame dropped");
            }
            return None;
        };
        if !pkt.fill(frame) {
            st.pool.release(pkt);
            drop(st);
            self.stats.record_rx_dropped(1);
            tracing::warn!(device = %self.name, len = frame.len(), "frame exceeds pool buffer");
            return None;
        }
        st.pool.enqueue_rx(pkt);
        Some(st.rx_int_enabled)
    }
}
