//! Integration tests for the device pair
//!
//! Tests for:
//! - End-to-end delivery and byte accounting
//! - Minimum frame padding
//! - Address assignment at open
//! - Pool exhaustion on the receiver
//! - Timeout recovery with nothing pending
//! - Closing and reopening the receiver
//! - Registration failure and shutdown

use simnet_core::ether::{ETH_P_IP, ETH_ZLEN, PacketType};
use simnet_core::stack::Checksum;
use simnet_core::{
    CaptureStack, DeviceRegistry, DriverConfig, DriverError, NetDevice, NetStats, RxMode,
    TxBuffer, TxStatus,
};
use simnet_integration_tests::{Pair, frame_from};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[test]
fn test_n_frames_delivered_in_order() {
    let pair = Pair::open(DriverConfig::default());
    let (a, b) = (pair.a(), pair.b());
    let lengths = [60usize, 61, 100, 512, 1000, 1514, 64, 128];

    for (i, &len) in lengths.iter().enumerate() {
        assert_eq!(a.start_xmit(frame_from(a, len, i as u8).into()), TxStatus::Sent);
    }

    let received = pair.stack.take_received();
    assert_eq!(received.len(), lengths.len());
    for (i, (skb, &len)) in received.iter().zip(&lengths).enumerate() {
        assert_eq!(skb.len(), len);
        assert_eq!(skb.payload()[0], i as u8);
        assert_eq!(skb.dev_name(), Some("sim1"));
        assert_eq!(skb.protocol(), ETH_P_IP);
        assert_eq!(skb.pkt_type(), PacketType::Host);
        assert_eq!(skb.ip_summed(), Checksum::Unnecessary);
    }

    let total: u64 = lengths.iter().map(|&l| l as u64).sum();
    let rx = b.get_stats();
    assert_eq!(rx.rx_packets, lengths.len() as u64);
    assert_eq!(rx.rx_bytes, total);
    let tx = a.get_stats();
    assert_eq!(tx.tx_packets, lengths.len() as u64);
    assert_eq!(tx.tx_bytes, total);

    // Every buffer is back where it started
    assert_eq!(a.tx_in_flight(), 0);
    assert_eq!(b.pool_status().available, b.pool_status().capacity);
}

#[test]
fn test_both_directions() {
    let pair = Pair::open(DriverConfig::default());
    let (a, b) = (pair.a(), pair.b());

    let _ = a.start_xmit(frame_from(a, 100, 1).into());
    let _ = b.start_xmit(frame_from(b, 200, 2).into());

    let received = pair.stack.take_received();
    assert_eq!(received[0].dev_name(), Some("sim1"));
    assert_eq!(received[1].dev_name(), Some("sim0"));
    assert_eq!(a.get_stats().rx_bytes, 200);
    assert_eq!(b.get_stats().rx_bytes, 100);
}

#[test]
fn test_short_frame_zero_padded() {
    let pair = Pair::open(DriverConfig::default());
    let a = pair.a();
    let short = frame_from(a, 42, 0xee);

    assert_eq!(a.start_xmit(short.clone().into()), TxStatus::Sent);

    let received = pair.stack.take_received();
    let wire = received[0].frame();
    assert_eq!(wire.len(), ETH_ZLEN);
    assert_eq!(&wire[..42], &short[..]);
    assert!(wire[42..].iter().all(|&b| b == 0));
    assert_eq!(pair.b().get_stats().rx_bytes, ETH_ZLEN as u64);
}

#[test]
fn test_open_assigns_distinct_addresses() {
    let pair = Pair::registered(DriverConfig::default());
    for dev in pair.registry.devices() {
        dev.open();
    }

    let a = pair.a().mac_address().octets();
    let b = pair.b().mac_address().octets();
    assert_ne!(a, b);
    assert_eq!(a[..5], b[..5]);
    assert_eq!(b[5] - a[5], 1);
    assert!(!pair.a().mac_address().is_multicast());
}

#[test]
fn test_pool_exhaustion_drops_exactly_one() {
    let capacity = 4;
    let pair = Pair::open(DriverConfig::default().with_pool_size(capacity));
    let (a, b) = (pair.a(), pair.b());
    b.set_rx_interrupts(false);

    for _ in 0..capacity {
        let _ = a.start_xmit(frame_from(a, 64, 0).into());
    }
    assert_eq!(b.get_stats().rx_dropped, 0);
    assert_eq!(b.pool_status().available, 0);

    let _ = a.start_xmit(frame_from(a, 64, 0).into());
    assert_eq!(b.get_stats().rx_dropped, 1);
    assert_eq!(b.pool_status().queued, capacity);

    // Draining frees the pool again
    assert_eq!(b.poll(capacity + 1), capacity);
    assert_eq!(b.pool_status().available, capacity);
}

#[test]
fn test_alloc_failure_is_a_drop() {
    let pair = Pair::open(DriverConfig::default());
    let (a, b) = (pair.a(), pair.b());
    pair.stack.fail_allocations(2);

    for _ in 0..3 {
        let _ = a.start_xmit(frame_from(a, 64, 0).into());
    }

    assert_eq!(pair.stack.take_received().len(), 1);
    let stats = b.get_stats();
    assert_eq!(stats.rx_dropped, 2);
    assert_eq!(stats.rx_packets, 1);
    assert_eq!(b.pool_status().available, b.pool_status().capacity);
}

#[test]
fn test_timeout_with_nothing_pending() {
    let pair = Pair::open(DriverConfig::default());
    let a = pair.a();
    let _ = a.start_xmit(frame_from(a, 64, 0).into());
    let before = a.get_stats();

    a.tx_timeout();
    a.tx_timeout();

    let after = a.get_stats();
    assert_eq!(
        after,
        NetStats {
            tx_errors: before.tx_errors + 2,
            ..before
        }
    );
    assert!(!a.is_queue_stopped());
}

#[test]
fn test_reopened_receiver_keeps_receiving() {
    let pair = Pair::open(DriverConfig::default());
    let (a, b) = (pair.a(), pair.b());

    b.stop();
    for _ in 0..8 {
        assert_eq!(a.start_xmit(frame_from(a, 64, 0).into()), TxStatus::Sent);
    }
    assert_eq!(b.get_stats().rx_dropped, 8);
    assert_eq!(b.pool_status().queued, 0);

    b.open();
    for i in 0..20u8 {
        let _ = a.start_xmit(frame_from(a, 64, i).into());
    }

    let received = pair.stack.take_received();
    assert_eq!(received.len(), 20);
    assert_eq!(received[19].payload()[0], 19);
    let rx = b.get_stats();
    assert_eq!(rx.rx_packets, 20);
    assert_eq!(rx.rx_dropped, 8);
    assert_eq!(b.pool_status().available, b.pool_status().capacity);
}

#[test]
fn test_reopened_polled_receiver_drains_backlog() {
    let pair = Pair::open(DriverConfig::default().with_rx_mode(RxMode::Poll { weight: 4 }));
    let (a, b) = (pair.a(), pair.b());

    // Frames queued while the poll is pending survive a close
    for _ in 0..3 {
        let _ = a.start_xmit(frame_from(a, 64, 0).into());
    }
    b.stop();
    let _ = a.start_xmit(frame_from(a, 64, 0).into());
    pair.stack.take_poll_requests();

    b.open();
    assert_eq!(pair.stack.take_poll_requests(), vec!["sim1".to_string()]);
    assert_eq!(b.poll(4), 3);

    let _ = a.start_xmit(frame_from(a, 64, 0).into());
    assert_eq!(pair.stack.take_poll_requests(), vec!["sim1".to_string()]);
    assert_eq!(b.poll(4), 1);

    let rx = b.get_stats();
    assert_eq!(rx.rx_packets, 4);
    assert_eq!(rx.rx_dropped, 1);
}

#[test]
fn test_tx_buffers_released_on_completion() {
    let pair = Pair::open(DriverConfig::default());
    let a = pair.a();
    let freed = Arc::new(AtomicUsize::new(0));

    for len in [60, 70, 80] {
        let f = Arc::clone(&freed);
        let skb = TxBuffer::with_destructor(frame_from(a, len, 0), move |n| {
            f.fetch_add(n, Ordering::SeqCst);
        });
        let _ = a.start_xmit(skb);
    }
    assert_eq!(freed.load(Ordering::SeqCst), 210);
}

#[test]
fn test_oversized_frame_dropped() {
    let pair = Pair::open(DriverConfig::default());
    let a = pair.a();

    assert_eq!(a.start_xmit(vec![0u8; 1515].into()), TxStatus::Dropped);
    assert_eq!(a.get_stats().tx_dropped, 1);
    assert!(pair.stack.take_received().is_empty());
}

#[test]
fn test_registration_failure_leaves_nothing() {
    let stack = Arc::new(CaptureStack::new());
    stack.reject_registration("sim1");

    let err = DeviceRegistry::bring_up(DriverConfig::default(), stack.clone()).unwrap_err();
    assert!(matches!(err, DriverError::Registration { ref device, .. } if device == "sim1"));
    assert!(stack.registered().is_empty());
    assert!(stack.device("sim0").is_none());
}

#[test]
fn test_stack_sees_registered_devices() {
    let pair = Pair::registered(DriverConfig::default());
    let dev = pair.stack.device("sim0").unwrap();

    dev.open();
    assert!(pair.a().is_running());
    assert_eq!(dev.mac_address(), pair.a().mac_address());
}

#[test]
fn test_custom_prefix_and_base() {
    let config = DriverConfig {
        name_prefix: "veth".to_string(),
        mac_base: "02:00:00:00:01:00".parse().unwrap(),
        ..DriverConfig::default()
    };
    let pair = Pair::open(config);

    assert_eq!(pair.stack.registered(), vec!["veth0", "veth1"]);
    assert_eq!(pair.b().mac_address().to_string(), "02:00:00:00:01:01");
}

#[test]
fn test_shutdown_on_drop() {
    let stack;
    {
        let pair = Pair::open(DriverConfig::default());
        stack = Arc::clone(&pair.stack);
        assert_eq!(stack.registered().len(), 2);
    }
    assert!(stack.registered().is_empty());
}
