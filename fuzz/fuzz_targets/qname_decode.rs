#![no_main]
use libfuzzer_sys::fuzz_target;

use dns_wire::protocol::qname::{decode, decode_with_resync, expand, DecodedName};

fuzz_target!(|data: &[u8]| {
    if let Ok(DecodedName::Complete { len, .. }) = decode(data) {
        assert!(len <= data.len());
    }

    let (octets, suffix) = data.split_at(data.len() / 2);
    let _ = decode_with_resync(octets, suffix);

    for offset in 0..data.len().min(16) {
        let _ = expand(data, offset);
    }
});
