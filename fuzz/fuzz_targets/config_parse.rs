//! Fuzz target for TOML config parsing.
//!
//! Ensures that malformed TOML input doesn't cause panics.

#![no_main]

use libfuzzer_sys::fuzz_target;
use secretbus::Config;

fuzz_target!(|data: &[u8]| {
    // Only process valid UTF-8 strings
    if let Ok(s) = std::str::from_utf8(data) {
        // Parsing plus validation must never panic
        if let Ok(config) = Config::parse(s) {
            // Anything accepted must survive a write/read cycle
            let text = config.to_toml().expect("valid config serializes");
            let again = Config::parse(&text).expect("serialized config parses");
            assert_eq!(again, config);
        }
    }
});
