#![no_main]
use libfuzzer_sys::fuzz_target;

use dns_wire::protocol::deserialise::parse_response;
use dns_wire::protocol::tracker::TransactionTracker;

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }

    // an empty hostname matches any question name
    let mut tracker = TransactionTracker::new();
    tracker.register(u16::from_be_bytes([data[0], data[1]]), "");

    if let Ok(Some(response)) = parse_response(data, &mut tracker) {
        assert!(!response.records.is_empty());
        assert!(tracker.is_empty());
    }
});
