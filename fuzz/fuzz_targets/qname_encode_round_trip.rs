#![no_main]
use libfuzzer_sys::fuzz_target;

use dns_wire::protocol::qname::{decode, encode, normalise, DecodedName};

fuzz_target!(|hostname: &str| {
    let octets = encode(hostname).unwrap();

    let mut expected = normalise(hostname);
    if !expected.is_empty() {
        expected.push('.');
    }

    assert_eq!(
        Ok(DecodedName::Complete {
            name: expected,
            len: octets.len(),
        }),
        decode(&octets)
    );
});
