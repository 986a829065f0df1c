#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use simnet_core::{CaptureStack, DeviceRegistry, DriverConfig, NetDevice, RxMode};
use std::sync::Arc;

#[derive(Debug, Arbitrary)]
enum Op {
    Send { from_b: bool, frame: Vec<u8> },
    Timeout { on_b: bool },
    RxInts { on_b: bool, enabled: bool },
    Poll { on_b: bool, budget: u8 },
    Mtu { on_b: bool, mtu: u16 },
    Stop { on_b: bool },
    Open { on_b: bool },
    FailAlloc(u8),
}

#[derive(Debug, Arbitrary)]
struct Input {
    lockup: bool,
    pool_size: u8,
    poll_weight: Option<u8>,
    ops: Vec<Op>,
}

fuzz_target!(|input: Input| {
    let mut config = DriverConfig::default()
        .with_lockup(input.lockup)
        .with_pool_size(usize::from(input.pool_size % 16) + 1);
    if let Some(weight) = input.poll_weight {
        config = config.with_rx_mode(RxMode::Poll {
            weight: usize::from(weight % 8) + 1,
        });
    }

    let stack = Arc::new(CaptureStack::new());
    let Ok(registry) = DeviceRegistry::bring_up(config, stack.clone()) else {
        return;
    };
    for dev in registry.devices() {
        dev.open();
    }
    let dev = |b: bool| &registry.devices()[usize::from(b)];

    for op in input.ops.into_iter().take(256) {
        match op {
            Op::Send { from_b, mut frame } => {
                frame.truncate(2048);
                let _ = dev(from_b).start_xmit(frame.into());
            }
            Op::Timeout { on_b } => dev(on_b).tx_timeout(),
            Op::RxInts { on_b, enabled } => dev(on_b).set_rx_interrupts(enabled),
            Op::Poll { on_b, budget } => {
                let _ = dev(on_b).poll(usize::from(budget));
            }
            Op::Mtu { on_b, mtu } => {
                let _ = dev(on_b).change_mtu(usize::from(mtu));
            }
            Op::Stop { on_b } => dev(on_b).stop(),
            Op::Open { on_b } => dev(on_b).open(),
            Op::FailAlloc(n) => stack.fail_allocations(usize::from(n % 4)),
        }
        stack.take_received();
        stack.take_poll_requests();

        for d in registry.devices() {
            let pool = d.pool_status();
            assert_eq!(pool.available + pool.queued + pool.checked_out, pool.capacity);
        }
    }
});
