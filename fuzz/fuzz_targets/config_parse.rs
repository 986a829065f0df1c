#![no_main]

use libfuzzer_sys::fuzz_target;
use simnet_core::DriverConfig;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(config) = toml::from_str::<DriverConfig>(text) {
        let _ = config.validate();
    }
});
