//! Fuzz target for the interface descriptor builder.
//!
//! Feeds arbitrary member registrations through the builder; it must
//! reject bad input with an error, never a panic, and whatever it accepts
//! must be retrievable by name.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use secretbus::{Access, InterfaceDescriptor};

/// One builder call.
#[derive(Arbitrary, Debug)]
enum Member {
    Method { name: String, input: String, output: String },
    Property { name: String, ty: String, writable: bool },
    Signal { name: String, payload: String },
}

#[derive(Arbitrary, Debug)]
struct Input {
    interface: String,
    members: Vec<Member>,
}

fuzz_target!(|input: Input| {
    let Ok(mut builder) = InterfaceDescriptor::builder(&input.interface) else {
        return;
    };
    let mut accepted = Vec::new();

    for member in input.members {
        let (name, result) = match member {
            Member::Method { name, input, output } => {
                let r = builder.method(&name, &input, &output);
                (name, r)
            }
            Member::Property { name, ty, writable } => {
                let access = if writable { Access::ReadWrite } else { Access::Read };
                let r = builder.property(&name, &ty, access);
                (name, r)
            }
            Member::Signal { name, payload } => {
                let r = builder.signal(&name, &payload);
                (name, r)
            }
        };
        match result {
            Ok(next) => {
                builder = next;
                accepted.push(name);
            }
            // A failed registration consumes the builder.
            Err(_) => return,
        }
    }

    let descriptor = builder.build();
    for name in accepted {
        assert!(
            descriptor.method(&name).is_some()
                || descriptor.property(&name).is_some()
                || descriptor.signal(&name).is_some()
        );
    }
});
