//! Simulated network devices
//!
//! A [`Device`] stands in for a NIC. Its "hardware" is the peer device: a
//! transmit copies the frame into a buffer from the peer's packet pool,
//! queues it on the peer's rx_queue and raises the completion interrupts
//! in-line. The pieces live in submodules:
//!
//! - `interrupt`: status bits and the interrupt handler
//! - `tx`: the transmit entry point and the simulated wire
//! - `rx`: delivery to the host stack, interrupt-driven or polled
//! - `timeout`: watchdog-triggered recovery
//!
//! # Locking
//!
//! Each device has one lock around its [`PrivateState`]. It covers the
//! interrupt status, the packet pool and rx_queue, and the in-flight
//! transmit buffers. It is never held while calling into the
//! [`HostStack`], and a thread never holds the locks of two devices at once.

mod interrupt;
mod rx;
mod timeout;
mod tx;

pub use interrupt::IrqStatus;
pub use tx::TxStatus;

use crate::config::{DriverConfig, RxMode};
use crate::error::{DriverError, Result};
use crate::ether::{self, ETH_DATA_LEN, ETH_FRAME_LEN, ETH_MIN_MTU, MacAddress};
use crate::pool::PacketPool;
use crate::ratelimit::RateLimit;
use crate::stack::{HostStack, TxBuffer};
use crate::stats::{DeviceStats, NetStats};
use bitflags::bitflags;
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::{Duration, Instant};

bitflags! {
    /// Interface flags visible to the stack
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct IfFlags: u32 {
        /// Administratively up
        const UP = 1 << 0;
        /// Broadcast address valid
        const BROADCAST = 1 << 1;
        /// Resources allocated, ready to pass traffic
        const RUNNING = 1 << 6;
        /// No address resolution needed
        const NOARP = 1 << 7;
        /// Supports multicast
        const MULTICAST = 1 << 12;
    }
}

/// Hardware resources a device claims to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IfMap {
    /// I/O base address
    pub base_addr: u64,
    /// Interrupt line
    pub irq: u8,
}

/// Capability interface the host stack drives a device through
pub trait NetDevice: Send + Sync {
    /// Interface name
    fn name(&self) -> &str;

    /// Current link-layer address
    fn mac_address(&self) -> MacAddress;

    /// Current MTU
    fn mtu(&self) -> usize;

    /// Current interface flags
    fn flags(&self) -> IfFlags;

    /// Bring the interface up: assign the address, enable receive, start the
    /// transmit queue
    fn open(&self);

    /// Bring the interface down: stop the transmit queue, disable receive
    fn stop(&self);

    /// Hand a frame to the device. The device owns the buffer from here on.
    fn start_xmit(&self, skb: TxBuffer) -> TxStatus;

    /// Watchdog callback: no TX completion within the timeout
    fn tx_timeout(&self);

    /// Statistics snapshot
    fn get_stats(&self) -> NetStats;

    /// Change the MTU
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::InvalidMtu`] outside 68..=1500.
    fn change_mtu(&self, new_mtu: usize) -> Result<()>;

    /// Change hardware resources
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Busy`] while the device is up and
    /// [`DriverError::Unsupported`] for a base address change.
    fn set_config(&self, map: IfMap) -> Result<()>;

    /// Device-specific control request
    ///
    /// # Errors
    ///
    /// Never fails for this driver; the signature matches devices that do.
    fn ioctl(&self, cmd: u32) -> Result<()>;

    /// Write an Ethernet header at the start of `buf`. `daddr` defaults to
    /// the peer's address and `saddr` to this device's address. Returns
    /// `false` if `buf` cannot hold a header.
    fn create_header(
        &self,
        buf: &mut [u8],
        ethertype: u16,
        daddr: Option<MacAddress>,
        saddr: Option<MacAddress>,
    ) -> bool;
}

#[derive(Debug)]
struct LinkState {
    mac: MacAddress,
    flags: IfFlags,
    mtu: usize,
    map: IfMap,
}

/// A transmit buffer waiting for its completion interrupt
#[derive(Debug)]
struct InFlight {
    skb: TxBuffer,
    wire_len: usize,
}

/// State guarded by the device lock
#[derive(Debug)]
pub(crate) struct PrivateState {
    status: IrqStatus,
    /// RX raises not yet serviced; coalesced raises still pop one frame each
    rx_pending: usize,
    pool: PacketPool,
    /// Receive path enabled (open); gates re-enabling interrupts after a poll
    rx_enabled: bool,
    rx_int_enabled: bool,
    tx_packetlen: usize,
    tx_inflight: VecDeque<InFlight>,
    /// Frames parked on the peer by a simulated lockup
    stalled: usize,
}

/// Pool occupancy snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Configured buffer count
    pub capacity: usize,
    /// Buffers on the free list
    pub available: usize,
    /// Frames waiting in the rx_queue
    pub queued: usize,
    /// Buffers checked out
    pub checked_out: usize,
}

/// One simulated network interface
pub struct Device {
    name: Arc<str>,
    index: usize,
    config: Arc<DriverConfig>,
    stack: Arc<dyn HostStack>,
    peer: OnceLock<Weak<Device>>,
    link: RwLock<LinkState>,
    state: Mutex<PrivateState>,
    stats: DeviceStats,
    queue_stopped: AtomicBool,
    created: Instant,
    /// Nanoseconds since `created` of the last transmit, plus one; zero means
    /// never
    trans_start: AtomicU64,
    rx_ratelimit: RateLimit,
}

impl Device {
    /// Create device `index` with its pool set up. The device is not wired
    /// to a peer yet; see [`Device::set_peer`].
    #[must_use]
    pub fn new(index: usize, config: Arc<DriverConfig>, stack: Arc<dyn HostStack>) -> Arc<Self> {
        let name: Arc<str> = format!("{}{}", config.name_prefix, index).into();
        let pool = PacketPool::with_capacity(ETH_FRAME_LEN, config.pool_size);
        tracing::debug!(device = %name, pool_size = config.pool_size, "device initialized");

        Arc::new(Self {
            name,
            index,
            stack,
            peer: OnceLock::new(),
            link: RwLock::new(LinkState {
                mac: MacAddress::default(),
                flags: IfFlags::BROADCAST | IfFlags::MULTICAST | IfFlags::NOARP,
                mtu: ETH_DATA_LEN,
                map: IfMap::default(),
            }),
            state: Mutex::new(PrivateState {
                status: IrqStatus::empty(),
                rx_pending: 0,
                pool,
                rx_enabled: false,
                rx_int_enabled: false,
                tx_packetlen: 0,
                tx_inflight: VecDeque::new(),
                stalled: 0,
            }),
            stats: DeviceStats::new(),
            queue_stopped: AtomicBool::new(true),
            created: Instant::now(),
            trans_start: AtomicU64::new(0),
            rx_ratelimit: RateLimit::default(),
            config,
        })
    }

    /// Wire this device's transmissions to `peer`. Only the first call has
    /// an effect.
    pub fn set_peer(&self, peer: &Arc<Device>) {
        if self.peer.set(Arc::downgrade(peer)).is_err() {
            tracing::warn!(device = %self.name, "peer already wired");
        }
    }

    /// The device receiving this device's transmissions
    #[must_use]
    pub fn peer(&self) -> Option<Arc<Device>> {
        self.peer.get().and_then(Weak::upgrade)
    }

    /// Position in the device pair
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Configuration the device was created with
    #[must_use]
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Live statistics counters
    #[must_use]
    pub fn stats(&self) -> &DeviceStats {
        &self.stats
    }

    /// Pool occupancy
    #[must_use]
    pub fn pool_status(&self) -> PoolStatus {
        let st = self.state.lock();
        PoolStatus {
            capacity: st.pool.capacity(),
            available: st.pool.available(),
            queued: st.pool.queued(),
            checked_out: st.pool.checked_out(),
        }
    }

    /// Transmit buffers still waiting for a completion
    #[must_use]
    pub fn tx_in_flight(&self) -> usize {
        self.state.lock().tx_inflight.len()
    }

    /// Wire length of the last frame handed to the simulated hardware
    #[must_use]
    pub fn last_tx_len(&self) -> usize {
        self.state.lock().tx_packetlen
    }

    /// Enable or disable receive interrupts
    pub fn set_rx_interrupts(&self, enabled: bool) {
        self.state.lock().rx_int_enabled = enabled;
    }

    /// Whether receive interrupts are enabled
    #[must_use]
    pub fn rx_interrupts_enabled(&self) -> bool {
        self.state.lock().rx_int_enabled
    }

    /// Whether the transmit queue is stopped
    #[must_use]
    pub fn is_queue_stopped(&self) -> bool {
        self.queue_stopped.load(Ordering::Acquire)
    }

    /// Whether the interface is up and running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.link
            .read()
            .flags
            .contains(IfFlags::UP | IfFlags::RUNNING)
    }

    /// Time of the last transmit, if any
    #[must_use]
    pub fn last_tx(&self) -> Option<Instant> {
        match self.trans_start.load(Ordering::Acquire) {
            0 => None,
            n => Some(self.created + Duration::from_nanos(n - 1)),
        }
    }

    fn touch_trans_start(&self) {
        let nanos = u64::try_from(self.created.elapsed().as_nanos()).unwrap_or(u64::MAX - 1);
        self.trans_start.store(nanos + 1, Ordering::Release);
    }

    fn stop_queue(&self) {
        self.queue_stopped.store(true, Ordering::Release);
        self.stack.stop_queue(&self.name);
    }

    fn wake_queue(&self) {
        self.queue_stopped.store(false, Ordering::Release);
        self.stack.wake_queue(&self.name);
    }

    /// Free every pool buffer. Used at unregister time.
    pub(crate) fn teardown_pool(&self) -> usize {
        self.state.lock().pool.teardown()
    }
}

impl NetDevice for Device {
    fn name(&self) -> &str {
        &self.name
    }

    fn mac_address(&self) -> MacAddress {
        self.link.read().mac
    }

    fn mtu(&self) -> usize {
        self.link.read().mtu
    }

    fn flags(&self) -> IfFlags {
        self.link.read().flags
    }

    fn open(&self) {
        let base = self.config.mac_base;
        let mac = u8::try_from(self.index)
            .ok()
            .and_then(|i| base.with_last_octet_offset(i))
            .unwrap_or(base);
        {
            let mut link = self.link.write();
            link.mac = mac;
            link.flags |= IfFlags::UP | IfFlags::RUNNING;
        }
        let backlog = {
            let mut st = self.state.lock();
            st.rx_enabled = true;
            st.rx_int_enabled = true;
            // Frames left queued while interrupts were masked get one
            // interrupt for the lot
            let backlog = st.pool.queued();
            if backlog > 0 {
                st.status |= IrqStatus::RX;
                st.rx_pending = st.rx_pending.max(backlog);
            }
            backlog
        };
        tracing::info!(device = %self.name, %mac, "device opened");
        if backlog > 0 {
            tracing::debug!(device = %self.name, backlog, "flushing receive backlog");
            self.handle_interrupt();
        }
        self.wake_queue();
    }

    fn stop(&self) {
        self.stop_queue();
        {
            let mut st = self.state.lock();
            st.rx_enabled = false;
            st.rx_int_enabled = false;
        }
        self.link.write().flags.remove(IfFlags::UP | IfFlags::RUNNING);
        tracing::info!(device = %self.name, "device stopped");
    }

    fn start_xmit(&self, skb: TxBuffer) -> TxStatus {
        self.transmit(skb)
    }

    fn tx_timeout(&self) {
        self.recover_tx_timeout();
    }

    fn get_stats(&self) -> NetStats {
        self.stats.snapshot()
    }

    fn change_mtu(&self, new_mtu: usize) -> Result<()> {
        if !(ETH_MIN_MTU..=ETH_DATA_LEN).contains(&new_mtu) {
            return Err(DriverError::InvalidMtu(new_mtu));
        }
        self.link.write().mtu = new_mtu;
        tracing::debug!(device = %self.name, mtu = new_mtu, "mtu changed");
        Ok(())
    }

    fn set_config(&self, map: IfMap) -> Result<()> {
        let mut link = self.link.write();
        if link.flags.contains(IfFlags::UP) {
            return Err(DriverError::Busy);
        }
        if map.base_addr != link.map.base_addr {
            tracing::warn!(device = %self.name, "can't change I/O address");
            return Err(DriverError::Unsupported("I/O base address change"));
        }
        if map.irq != link.map.irq {
            link.map.irq = map.irq;
            tracing::debug!(device = %self.name, irq = map.irq, "irq changed");
        }
        Ok(())
    }

    fn ioctl(&self, cmd: u32) -> Result<()> {
        tracing::debug!(device = %self.name, cmd = format_args!("{cmd:#x}"), "ioctl");
        Ok(())
    }

    fn create_header(
        &self,
        buf: &mut [u8],
        ethertype: u16,
        daddr: Option<MacAddress>,
        saddr: Option<MacAddress>,
    ) -> bool {
        let own = self.mac_address();
        let dest = daddr
            .or_else(|| self.peer().map(|p| p.mac_address()))
            .unwrap_or(own);
        ether::write_header(buf, dest, saddr.unwrap_or(own), ethertype)
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.name)
            .field("index", &self.index)
            .field("link", &*self.link.read())
            .field("queue_stopped", &self.is_queue_stopped())
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

/// Whether `mode` hands frames to the stack from a poll instead of the
/// interrupt handler
fn is_polled(mode: RxMode) -> bool {
    matches!(mode, RxMode::Poll { .. })
}
