#![no_main]

use libfuzzer_sys::fuzz_target;
use simnet_core::ether::{MacAddress, classify};

fuzz_target!(|data: &[u8]| {
    let Some((dev, frame)) = data.split_first_chunk::<6>() else {
        return;
    };
    let c = classify(frame, MacAddress::new(*dev));
    let _ = c.protocol;
});
