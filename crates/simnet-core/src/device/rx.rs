//! Receive path: handing frames to the host stack

use super::{Device, NetDevice};
use crate::ether::{self, NET_IP_ALIGN};
use crate::pool::Packet;
use crate::stack::Checksum;
use std::sync::Arc;

impl Device {
    /// Copy `pkt` into a stack buffer and submit it. Allocation failure
    /// drops the frame and counts it in `rx_dropped`.
    pub(super) fn deliver(&self, pkt: &Packet) {
        let len = pkt.len();
        let Some(mut skb) = self.stack.alloc_rx_buffer(len + NET_IP_ALIGN) else {
            if self.rx_ratelimit.allow() {
                tracing::warn!(device = %self.name, "low on mem - packet dropped");
            }
            self.stats.record_rx_dropped(1);
            return;
        };

        skb.reserve(NET_IP_ALIGN);
        skb.put(pkt.data());
        skb.set_device(Arc::clone(&self.name), self.index);
        let class = ether::classify(pkt.data(), self.mac_address());
        skb.set_protocol(class.protocol, class.pkt_type);
        skb.set_checksum(Checksum::Unnecessary);

        self.stats.record_rx(len);
        tracing::trace!(device = %self.name, len, protocol = class.protocol, "rx");
        self.stack.netif_rx(skb);
    }

    /// Deliver up to `budget` queued frames. Returns how many were taken off
    /// the rx_queue.
    ///
    /// A poll that uses its whole budget asks to be polled again. When the
    /// queue drains within the budget, receive interrupts are re-enabled
    /// (unless the device is down). If a frame slipped in while they were
    /// off, another poll is requested instead.
    pub fn poll(&self, budget: usize) -> usize {
        let mut done = 0;
        while done < budget {
            let Some(pkt) = self.state.lock().pool.pop_rx() else {
                break;
            };
            self.deliver(&pkt);
            self.state.lock().pool.release(pkt);
            done += 1;
        }

        let reschedule = done == budget || {
            let mut st = self.state.lock();
            if st.pool.queued() > 0 {
                true
            } else {
                if st.rx_enabled {
                    st.rx_int_enabled = true;
                }
                false
            }
        };
        if reschedule && budget > 0 {
            self.stack.schedule_poll(&self.name);
        }
        tracing::trace!(device = %self.name, budget, done, "poll");
        done
    }

    /// Frames per poll for polled receive, `None` in interrupt mode
    #[must_use]
    pub fn poll_weight(&self) -> Option<usize> {
        match self.config.rx_mode {
            crate::config::RxMode::Poll { weight } => Some(weight),
            crate::config::RxMode::Interrupt => None,
        }
    }
}
