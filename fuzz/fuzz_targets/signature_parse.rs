//! Fuzz target for D-Bus signature parsing.
//!
//! Arbitrary strings must never panic the parser, and every accepted
//! signature must print back to the same text.

#![no_main]

use libfuzzer_sys::fuzz_target;
use secretbus::{Signature, Type};

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(sig) = Signature::parse(s) {
            assert_eq!(sig.to_string(), s);
            assert!(s.len() <= 255);
            for ty in sig.types() {
                assert_eq!(Type::parse(&ty.to_string()).ok().as_ref(), Some(ty));
            }
        }
        let _ = Type::parse(s);
    }
});
