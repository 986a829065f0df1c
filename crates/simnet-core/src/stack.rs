//! Boundary with the host networking stack
//!
//! The driver core never owns the stack. It reaches it through the
//! [`HostStack`] trait for registration, ingress submission and queue flow
//! control, and exchanges frames with it as [`TxBuffer`] (outbound, stack
//! owned until TX completion) and [`IngressBuffer`] (inbound, handed over on
//! delivery).
//!
//! [`CaptureStack`] is an in-memory host that records everything it is
//! given. The CLI runs on it and the tests inspect it.

use crate::device::NetDevice;
use crate::error::StackError;
use crate::ether::{ETH_HLEN, PacketType};
use crossbeam_queue::SegQueue;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Callback run when the driver releases a transmit buffer
pub type TxDestructor = Box<dyn FnOnce(usize) + Send>;

/// An outbound frame owned by the stack
///
/// The driver keeps the buffer until the simulated hardware reports the
/// transmission complete, then drops it. An attached destructor observes
/// that release with the frame length.
pub struct TxBuffer {
    data: Vec<u8>,
    destructor: Option<TxDestructor>,
}

impl TxBuffer {
    /// Wrap frame bytes
    #[must_use]
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            destructor: None,
        }
    }

    /// Wrap frame bytes and run `destructor` when the driver releases them
    #[must_use]
    pub fn with_destructor(data: Vec<u8>, destructor: impl FnOnce(usize) + Send + 'static) -> Self {
        Self {
            data,
            destructor: Some(Box::new(destructor)),
        }
    }

    /// Frame bytes
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Frame length
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Zero-length frame
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl From<Vec<u8>> for TxBuffer {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl Drop for TxBuffer {
    fn drop(&mut self) {
        if let Some(destructor) = self.destructor.take() {
            destructor(self.data.len());
        }
    }
}

impl fmt::Debug for TxBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxBuffer")
            .field("len", &self.data.len())
            .field("destructor", &self.destructor.is_some())
            .finish()
    }
}

/// Checksum state of a received frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Checksum {
    /// Not verified; the stack must check
    #[default]
    None,
    /// Already verified, the stack may skip checking
    Unnecessary,
}

/// A received frame in the stack's representation
pub struct IngressBuffer {
    buf: Vec<u8>,
    headroom: usize,
    dev_name: Option<Arc<str>>,
    ifindex: usize,
    protocol: u16,
    pkt_type: PacketType,
    ip_summed: Checksum,
}

impl IngressBuffer {
    /// Allocate a buffer able to hold `len` bytes, or `None` if the
    /// allocation fails
    #[must_use]
    pub fn try_alloc(len: usize) -> Option<Self> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(len).ok()?;
        Some(Self {
            buf,
            headroom: 0,
            dev_name: None,
            ifindex: 0,
            protocol: 0,
            pkt_type: PacketType::Host,
            ip_summed: Checksum::None,
        })
    }

    /// Reserve `len` bytes of headroom. Only valid on an empty buffer.
    pub fn reserve(&mut self, len: usize) {
        debug_assert_eq!(self.buf.len(), self.headroom, "reserve after put");
        self.buf.resize(self.buf.len() + len, 0);
        self.headroom += len;
    }

    /// Append bytes after any existing data
    pub fn put(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub(crate) fn set_device(&mut self, name: Arc<str>, ifindex: usize) {
        self.dev_name = Some(name);
        self.ifindex = ifindex;
    }

    pub(crate) fn set_protocol(&mut self, protocol: u16, pkt_type: PacketType) {
        self.protocol = protocol;
        self.pkt_type = pkt_type;
    }

    pub(crate) fn set_checksum(&mut self, ip_summed: Checksum) {
        self.ip_summed = ip_summed;
    }

    /// Whole frame, starting at the Ethernet header
    #[must_use]
    pub fn frame(&self) -> &[u8] {
        &self.buf[self.headroom..]
    }

    /// Bytes after the Ethernet header
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        self.frame().get(ETH_HLEN..).unwrap_or(&[])
    }

    /// Bytes reserved in front of the frame
    #[must_use]
    pub fn headroom(&self) -> usize {
        self.headroom
    }

    /// Frame length
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len() - self.headroom
    }

    /// No frame data
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Name of the receiving device
    #[must_use]
    pub fn dev_name(&self) -> Option<&str> {
        self.dev_name.as_deref()
    }

    /// Index of the receiving device
    #[must_use]
    pub fn ifindex(&self) -> usize {
        self.ifindex
    }

    /// Protocol derived from the Ethernet header
    #[must_use]
    pub fn protocol(&self) -> u16 {
        self.protocol
    }

    /// Addressing relative to the receiving device
    #[must_use]
    pub fn pkt_type(&self) -> PacketType {
        self.pkt_type
    }

    /// Checksum state
    #[must_use]
    pub fn ip_summed(&self) -> Checksum {
        self.ip_summed
    }
}

impl fmt::Debug for IngressBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngressBuffer")
            .field("dev", &self.dev_name)
            .field("len", &self.len())
            .field("headroom", &self.headroom)
            .field("protocol", &format_args!("{:#06x}", self.protocol))
            .field("pkt_type", &self.pkt_type)
            .field("ip_summed", &self.ip_summed)
            .finish()
    }
}

/// Services the host stack provides to the driver
///
/// The driver never holds a device lock while calling any of these methods,
/// so implementations may call back into the device.
pub trait HostStack: Send + Sync {
    /// Make a device visible to the stack
    ///
    /// # Errors
    ///
    /// Returns a [`StackError`] if the stack refuses the device.
    fn register(&self, dev: Arc<dyn NetDevice>) -> Result<(), StackError>;

    /// Remove a device registered earlier
    fn unregister(&self, name: &str);

    /// Ingress entry point. The stack takes ownership of the buffer.
    fn netif_rx(&self, skb: IngressBuffer);

    /// Stop calling the device's transmit entry point
    fn stop_queue(&self, name: &str);

    /// Resume calling the device's transmit entry point
    fn wake_queue(&self, name: &str);

    /// Request a receive poll of the device (polled RX mode)
    fn schedule_poll(&self, name: &str);

    /// Allocate an ingress buffer of `len` bytes
    fn alloc_rx_buffer(&self, len: usize) -> Option<IngressBuffer> {
        IngressBuffer::try_alloc(len)
    }
}

/// In-memory host stack that records what the driver hands it
#[derive(Default)]
pub struct CaptureStack {
    devices: Mutex<Vec<Arc<dyn NetDevice>>>,
    received: SegQueue<IngressBuffer>,
    received_total: AtomicUsize,
    stopped: Mutex<HashMap<String, bool>>,
    polls: SegQueue<String>,
    reject: Mutex<HashSet<String>>,
    failing_allocs: AtomicUsize,
}

impl CaptureStack {
    /// Create an empty stack
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse registration of the device called `name`
    pub fn reject_registration(&self, name: &str) {
        self.reject.lock().insert(name.to_string());
    }

    /// Fail the next `count` ingress allocations
    pub fn fail_allocations(&self, count: usize) {
        self.failing_allocs.store(count, Ordering::SeqCst);
    }

    /// Registered device called `name`
    #[must_use]
    pub fn device(&self, name: &str) -> Option<Arc<dyn NetDevice>> {
        self.devices.lock().iter().find(|d| d.name() == name).cloned()
    }

    /// Names of registered devices, in registration order
    #[must_use]
    pub fn registered(&self) -> Vec<String> {
        self.devices.lock().iter().map(|d| d.name().to_string()).collect()
    }

    /// Remove and return every buffer received so far
    pub fn take_received(&self) -> Vec<IngressBuffer> {
        std::iter::from_fn(|| self.received.pop()).collect()
    }

    /// Buffers received over the stack's lifetime
    #[must_use]
    pub fn received_total(&self) -> usize {
        self.received_total.load(Ordering::SeqCst)
    }

    /// Whether the stack was told to stop the device's queue. Unknown
    /// devices report `false`.
    #[must_use]
    pub fn is_queue_stopped(&self, name: &str) -> bool {
        self.stopped.lock().get(name).copied().unwrap_or(false)
    }

    /// Remove and return pending poll requests
    pub fn take_poll_requests(&self) -> Vec<String> {
        std::iter::from_fn(|| self.polls.pop()).collect()
    }
}

impl HostStack for CaptureStack {
    fn register(&self, dev: Arc<dyn NetDevice>) -> Result<(), StackError> {
        let name = dev.name().to_string();
        if self.reject.lock().contains(&name) {
            return Err(StackError::Rejected(name));
        }
        let mut devices = self.devices.lock();
        if devices.iter().any(|d| d.name() == name) {
            return Err(StackError::Duplicate(name));
        }
        devices.push(dev);
        Ok(())
    }

    fn unregister(&self, name: &str) {
        self.devices.lock().retain(|d| d.name() != name);
        self.stopped.lock().remove(name);
    }

    fn netif_rx(&self, skb: IngressBuffer) {
        self.received_total.fetch_add(1, Ordering::SeqCst);
        self.received.push(skb);
    }

    fn stop_queue(&self, name: &str) {
        self.stopped.lock().insert(name.to_string(), true);
    }

    fn wake_queue(&self, name: &str) {
        self.stopped.lock().insert(name.to_string(), false);
    }

    fn schedule_poll(&self, name: &str) {
        self.polls.push(name.to_string());
    }

    fn alloc_rx_buffer(&self, len: usize) -> Option<IngressBuffer> {
        let failing = self
            .failing_allocs
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return None;
        }
        IngressBuffer::try_alloc(len)
    }
}

impl fmt::Debug for CaptureStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureStack")
            .field("registered", &self.registered())
            .field("pending_rx", &self.received.len())
            .field("received_total", &self.received_total())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn test_tx_buffer_destructor_runs_once() {
        let freed = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&freed);
        let buf = TxBuffer::with_destructor(vec![0u8; 42], move |len| {
            f.fetch_add(len, Ordering::SeqCst);
        });
        assert_eq!(buf.len(), 42);
        drop(buf);
        assert_eq!(freed.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn test_tx_buffer_from_vec() {
        let buf: TxBuffer = vec![1, 2, 3].into();
        assert_eq!(buf.data(), &[1, 2, 3]);
        assert!(!buf.is_empty());
        assert!(format!("{buf:?}").contains("destructor: false"));
    }

    #[test]
    fn test_ingress_reserve_and_put() {
        let mut skb = IngressBuffer::try_alloc(64).unwrap();
        skb.reserve(2);
        skb.put(&[0xaa; ETH_HLEN]);
        skb.put(b"payload");

        assert_eq!(skb.headroom(), 2);
        assert_eq!(skb.len(), ETH_HLEN + 7);
        assert_eq!(skb.frame()[0], 0xaa);
        assert_eq!(skb.payload(), b"payload");
        assert_eq!(skb.ip_summed(), Checksum::None);
        assert!(skb.dev_name().is_none());
    }

    #[test]
    fn test_ingress_short_frame_has_empty_payload() {
        let mut skb = IngressBuffer::try_alloc(8).unwrap();
        skb.put(&[1, 2, 3]);
        assert!(skb.payload().is_empty());
    }

    #[test]
    fn test_capture_alloc_failures() {
        let stack = CaptureStack::new();
        stack.fail_allocations(2);
        assert!(stack.alloc_rx_buffer(10).is_none());
        assert!(stack.alloc_rx_buffer(10).is_none());
        assert!(stack.alloc_rx_buffer(10).is_some());
    }

    #[test]
    fn test_capture_queue_state() {
        let stack = CaptureStack::new();
        assert!(!stack.is_queue_stopped("sim0"));
        stack.stop_queue("sim0");
        assert!(stack.is_queue_stopped("sim0"));
        stack.wake_queue("sim0");
        assert!(!stack.is_queue_stopped("sim0"));
    }

    #[test]
    fn test_capture_received_and_polls() {
        let stack = CaptureStack::new();
        stack.netif_rx(IngressBuffer::try_alloc(4).unwrap());
        stack.netif_rx(IngressBuffer::try_alloc(4).unwrap());
        stack.schedule_poll("sim1");

        assert_eq!(stack.take_received().len(), 2);
        assert!(stack.take_received().is_empty());
        assert_eq!(stack.received_total(), 2);
        assert_eq!(stack.take_poll_requests(), vec!["sim1".to_string()]);
    }

    #[test]
    fn test_default_alloc_uses_try_alloc() {
        struct Minimal(AtomicBool);
        impl HostStack for Minimal {
            fn register(&self, _dev: Arc<dyn NetDevice>) -> Result<(), StackError> {
                Ok(())
            }
            fn unregister(&self, _name: &str) {}
            fn netif_rx(&self, _skb: IngressBuffer) {
                self.0.store(true, Ordering::SeqCst);
            }
            fn stop_queue(&self, _name: &str) {}
            fn wake_queue(&self, _name: &str) {}
            fn schedule_poll(&self, _name: &str) {}
        }

        let stack = Minimal(AtomicBool::new(false));
        let skb = stack.alloc_rx_buffer(128).unwrap();
        assert!(skb.is_empty());
        stack.netif_rx(skb);
        assert!(stack.0.load(Ordering::SeqCst));
    }
}
