//! Per-device packet pool
//!
//! Each device owns a fixed number of frame buffers, allocated once at setup
//! and recycled for the lifetime of the device. Buffers travel between three
//! places and are never in two of them at once:
//!
//! - the **free list**, waiting for the simulated hardware to fill them
//! - the **rx_queue**, holding frames received but not yet delivered upward
//! - **checked out** as a [`Packet`] value owned by whoever is filling or
//!   delivering it
//!
//! # Design
//!
//! - **Arena:** slots live in a `Vec` and are addressed by index. Each slot
//!   records its [`SlotState`] explicitly.
//! - **Index lists:** the free list is an index stack, the rx_queue an index
//!   FIFO. Both are sized to capacity at setup and never grow.
//! - **Bounded:** an empty free list makes [`PacketPool::acquire`] return
//!   `None`. Callers drop the frame; the pool never allocates on demand.
//! - **Epochs:** every teardown bumps the pool epoch. A packet checked out
//!   before the teardown is discarded when it comes back instead of being
//!   linked into the rebuilt pool.
//!
//! The pool has no lock of its own. It lives inside the device's private
//! state and every call happens with the device lock held.
//!
//! # Example
//!
//! ```
//! use simnet_core::pool::PacketPool;
//!
//! let mut pool = PacketPool::with_capacity(1514, 4);
//! assert_eq!(pool.available(), 4);
//!
//! let mut pkt = pool.acquire().unwrap();
//! assert!(pkt.fill(b"frame bytes"));
//! pool.enqueue_rx(pkt);
//! assert_eq!(pool.queued(), 1);
//!
//! let pkt = pool.pop_rx().unwrap();
//! assert_eq!(pkt.data(), b"frame bytes");
//! pool.release(pkt);
//! assert_eq!(pool.available(), 4);
//! ```

use crate::error::{DriverError, Result};
use std::collections::VecDeque;

/// Where a pool slot currently lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// On the free list
    Free,
    /// Waiting in the rx_queue
    Queued,
    /// Owned by a [`Packet`] value
    CheckedOut,
}

#[derive(Debug)]
struct Slot {
    state: SlotState,
    /// `None` while checked out; the buffer moves into the `Packet`
    buf: Option<Box<[u8]>>,
    len: usize,
}

/// A pool buffer checked out of a [`PacketPool`]
///
/// Dropping a `Packet` instead of handing it back with
/// [`PacketPool::release`] leaks its slot until the next pool reset.
#[derive(Debug)]
pub struct Packet {
    slot: usize,
    epoch: u64,
    data: Box<[u8]>,
    len: usize,
}

impl Packet {
    /// Copy `frame` into the buffer, replacing previous contents.
    ///
    /// Returns `false` (leaving the packet untouched) if the frame does not
    /// fit.
    pub fn fill(&mut self, frame: &[u8]) -> bool {
        let Some(dst) = self.data.get_mut(..frame.len()) else {
            return false;
        };
        dst.copy_from_slice(frame);
        self.len = frame.len();
        true
    }

    /// Frame bytes
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Frame length in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// No frame stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Buffer capacity in bytes
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Arena slot this buffer belongs to
    #[must_use]
    pub fn slot(&self) -> usize {
        self.slot
    }
}

/// Fixed-capacity arena of reusable frame buffers with a free list and an
/// rx_queue
pub struct PacketPool {
    slots: Vec<Slot>,
    free: Vec<usize>,
    rx_queue: VecDeque<usize>,
    buffer_size: usize,
    capacity: usize,
    epoch: u64,
}

impl PacketPool {
    /// Create a torn-down pool. Call [`setup`](Self::setup) before use.
    #[must_use]
    pub fn new(buffer_size: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            rx_queue: VecDeque::new(),
            buffer_size,
            capacity: 0,
            epoch: 0,
        }
    }

    /// Create a pool and pre-allocate `capacity` buffers
    #[must_use]
    pub fn with_capacity(buffer_size: usize, capacity: usize) -> Self {
        let mut pool = Self::new(buffer_size);
        pool.populate(capacity);
        pool
    }

    /// Pre-allocate `capacity` buffers onto the free list.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::PoolActive`] if the pool has not been torn down
    /// since the last setup.
    pub fn setup(&mut self, capacity: usize) -> Result<()> {
        if self.is_active() {
            return Err(DriverError::PoolActive);
        }
        self.populate(capacity);
        Ok(())
    }

    fn populate(&mut self, capacity: usize) {
        self.slots = (0..capacity)
            .map(|_| Slot {
                state: SlotState::Free,
                buf: Some(vec![0u8; self.buffer_size].into_boxed_slice()),
                len: 0,
            })
            .collect();
        // Reversed so the first acquire hands out slot 0
        self.free = (0..capacity).rev().collect();
        self.rx_queue = VecDeque::with_capacity(capacity);
        self.capacity = capacity;
    }

    /// Free every buffer, including frames still waiting in the rx_queue.
    ///
    /// Returns the number of queued frames that were discarded. Packets
    /// currently checked out become stale and are freed when released.
    pub fn teardown(&mut self) -> usize {
        let discarded = self.rx_queue.len();
        self.slots = Vec::new();
        self.free = Vec::new();
        self.rx_queue = VecDeque::new();
        self.epoch = self.epoch.wrapping_add(1);
        discarded
    }

    /// Tear down and rebuild at the configured capacity.
    ///
    /// Returns the number of queued frames that were discarded.
    pub fn reset(&mut self) -> usize {
        let discarded = self.teardown();
        self.populate(self.capacity);
        discarded
    }

    /// Take a buffer off the free list, or `None` if the pool is exhausted
    pub fn acquire(&mut self) -> Option<Packet> {
        let idx = self.free.pop()?;
        let slot = &mut self.slots[idx];
        debug_assert_eq!(slot.state, SlotState::Free);
        let data = slot.buf.take()?;
        slot.state = SlotState::CheckedOut;
        slot.len = 0;
        Some(Packet {
            slot: idx,
            epoch: self.epoch,
            data,
            len: 0,
        })
    }

    /// Return a buffer to the free list.
    ///
    /// Returns `false` if the packet predates the last teardown or its slot is
    /// not checked out, in which case its buffer is freed.
    pub fn release(&mut self, packet: Packet) -> bool {
        let Some(idx) = self.owned_slot(&packet) else {
            tracing::trace!(slot = packet.slot, "dropping stale pool buffer");
            return false;
        };
        let slot = &mut self.slots[idx];
        slot.buf = Some(packet.data);
        slot.len = 0;
        slot.state = SlotState::Free;
        self.free.push(idx);
        true
    }

    /// Append a filled buffer to the tail of the rx_queue.
    ///
    /// Returns `false` for a stale packet, which is freed instead.
    pub fn enqueue_rx(&mut self, packet: Packet) -> bool {
        let Some(idx) = self.owned_slot(&packet) else {
            tracing::trace!(slot = packet.slot, "dropping stale pool buffer");
            return false;
        };
        let slot = &mut self.slots[idx];
        slot.len = packet.len;
        slot.buf = Some(packet.data);
        slot.state = SlotState::Queued;
        self.rx_queue.push_back(idx);
        true
    }

    /// Take the frame at the head of the rx_queue
    pub fn pop_rx(&mut self) -> Option<Packet> {
        let idx = self.rx_queue.pop_front()?;
        let slot = &mut self.slots[idx];
        debug_assert_eq!(slot.state, SlotState::Queued);
        let data = slot.buf.take()?;
        slot.state = SlotState::CheckedOut;
        Some(Packet {
            slot: idx,
            epoch: self.epoch,
            data,
            len: slot.len,
        })
    }

    fn owned_slot(&self, packet: &Packet) -> Option<usize> {
        if packet.epoch != self.epoch {
            return None;
        }
        match self.slots.get(packet.slot) {
            Some(slot) if slot.state == SlotState::CheckedOut => Some(packet.slot),
            _ => None,
        }
    }

    /// State of slot `idx`, or `None` if out of range
    #[must_use]
    pub fn slot_state(&self, idx: usize) -> Option<SlotState> {
        self.slots.get(idx).map(|s| s.state)
    }

    /// Buffers on the free list
    #[must_use]
    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// Frames waiting in the rx_queue
    #[must_use]
    pub fn queued(&self) -> usize {
        self.rx_queue.len()
    }

    /// Buffers currently owned by `Packet` values
    #[must_use]
    pub fn checked_out(&self) -> usize {
        self.slots.len() - self.free.len() - self.rx_queue.len()
    }

    /// Configured number of buffers
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Size of each buffer in bytes
    #[must_use]
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Buffers are allocated (setup ran and no teardown since)
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.slots.is_empty()
    }
}

impl std::fmt::Debug for PacketPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketPool")
            .field("buffer_size", &self.buffer_size)
            .field("capacity", &self.capacity)
            .field("available", &self.available())
            .field("queued", &self.queued())
            .field("epoch", &self.epoch)
            .finish()
    }
}
