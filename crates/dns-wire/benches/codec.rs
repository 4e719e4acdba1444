use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use std::net::Ipv4Addr;

use dns_wire::protocol::deserialise::parse_response;
use dns_wire::protocol::qname;
use dns_wire::protocol::serialise::{build_query, WritableBuffer};
use dns_wire::protocol::tracker::TransactionTracker;
use dns_wire::protocol::types::*;

#[allow(non_snake_case)]
fn bench__query(c: &mut Criterion) {
    let mut tracker = TransactionTracker::new();

    c.bench_function("serialise/query", |b| {
        b.iter(|| build_query(&mut tracker, black_box("www.example.com"), RecordType::A))
    });

    let long = format!("{}.example.com", "x".repeat(200));
    c.bench_function("serialise/query/long-label", |b| {
        b.iter(|| build_query(&mut tracker, black_box(&long), RecordType::A))
    });
}

#[allow(non_snake_case)]
fn bench__qname(c: &mut Criterion) {
    let octets = qname::encode("www.example.com").unwrap();
    c.bench_function("deserialise/qname", |b| {
        b.iter(|| qname::decode(black_box(&octets)))
    });

    let long = format!("{}.ab.de", "z".repeat(150));
    let octets = qname::encode(&long).unwrap();
    let suffix = qname::encode("ab.de").unwrap();
    c.bench_function("deserialise/qname/resync", |b| {
        b.iter(|| qname::decode_with_resync(black_box(&octets), &suffix))
    });
}

#[allow(non_snake_case)]
fn bench__response__small(c: &mut Criterion) {
    let message = response(1234, "www.example.com", 1);

    c.bench_function("deserialise/response/small", |b| {
        b.iter(|| {
            let mut tracker = TransactionTracker::new();
            tracker.register(1234, "www.example.com");
            parse_response(black_box(&message), &mut tracker)
        })
    });
}

#[allow(non_snake_case)]
fn bench__response__big(c: &mut Criterion) {
    let message = response(1234, "www.example.com", 32);

    c.bench_function("deserialise/response/big", |b| {
        b.iter(|| {
            let mut tracker = TransactionTracker::new();
            tracker.register(1234, "www.example.com");
            parse_response(black_box(&message), &mut tracker)
        })
    });
}

fn response(id: u16, hostname: &str, answers: u16) -> Vec<u8> {
    let mut buffer = WritableBuffer::default();
    let mut header = Header::recursive_query(id);
    header.is_response = true;
    header.recursion_available = true;

    WireHeader {
        header,
        qdcount: 1,
        ancount: answers,
        nscount: 0,
        arcount: 0,
    }
    .serialise(&mut buffer);
    buffer.write_octets(&qname::encode(hostname).unwrap());
    RecordType::A.serialise(&mut buffer);
    RecordClass::IN.serialise(&mut buffer);

    for i in 0..answers {
        buffer.write_octets(&[0b1100_0000, 12]);
        RecordType::A.serialise(&mut buffer);
        RecordClass::IN.serialise(&mut buffer);
        buffer.write_u32(300);
        buffer.write_u16(4);
        buffer.write_octets(&Ipv4Addr::new(10, 0, 0, (i % 256) as u8).octets());
    }

    buffer.octets.to_vec()
}

criterion_group!(
    benches,
    bench__query,
    bench__qname,
    bench__response__small,
    bench__response__big,
);
criterion_main!(benches);
