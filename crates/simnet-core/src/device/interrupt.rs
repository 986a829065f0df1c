//! Simulated interrupt line
//!
//! The "hardware" raises an interrupt by OR-ing cause bits into the device's
//! status word and invoking the handler directly. The handler takes the
//! status and clears it under the device lock, so causes raised together or
//! back-to-back may be serviced by a single invocation. Coalescing never
//! loses work: a TX completion drains every in-flight buffer, and each RX
//! raise is counted so the handler pops one frame per raise.

use super::{Device, InFlight, is_polled};
use crate::pool::Packet;
use bitflags::bitflags;
use std::collections::VecDeque;

bitflags! {
    /// Pending interrupt causes
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct IrqStatus: u32 {
        /// A frame is waiting in the rx_queue
        const RX = 0x0001;
        /// The hardware finished transmitting
        const TX = 0x0002;
    }
}

impl Device {
    /// Raise interrupt `causes` and run the handler.
    pub fn raise(&self, causes: IrqStatus) {
        {
            let mut st = self.state.lock();
            st.status |= causes;
            if causes.contains(IrqStatus::RX) {
                st.rx_pending += 1;
            }
        }
        self.handle_interrupt();
    }

    /// Raise RX if receive interrupts are enabled
    pub(super) fn kick_rx(&self) {
        let enabled = self.state.lock().rx_int_enabled;
        if enabled {
            self.raise(IrqStatus::RX);
        }
    }

    pub(super) fn handle_interrupt(&self) {
        let mut schedule_poll = false;
        let (rx, completed): (Vec<Packet>, VecDeque<InFlight>) = {
            let mut st = self.state.lock();
            let status = std::mem::take(&mut st.status);

            let mut rx = Vec::new();
            if status.contains(IrqStatus::RX) {
                let pending = std::mem::take(&mut st.rx_pending);
                if is_polled(self.config.rx_mode) {
                    if st.rx_int_enabled {
                        st.rx_int_enabled = false;
                        schedule_poll = true;
                    }
                } else {
                    rx.extend(std::iter::from_fn(|| st.pool.pop_rx()).take(pending));
                }
            }

            let completed = if status.contains(IrqStatus::TX) {
                std::mem::take(&mut st.tx_inflight)
            } else {
                VecDeque::new()
            };
            for frame in &completed {
                self.stats.record_tx(frame.wire_len);
            }
            (rx, completed)
        };

        if !completed.is_empty() {
            tracing::trace!(device = %self.name, frames = completed.len(), "tx complete");
        }
        // Returns the buffers to the stack
        drop(completed);

        if schedule_poll {
            self.stack.schedule_poll(&self.name);
        }
        for pkt in rx {
            self.deliver(&pkt);
            self.state.lock().pool.release(pkt);
        }
    }
}
