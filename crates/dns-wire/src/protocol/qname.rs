//! Conversion between presentation-format hostnames and the
//! length-prefixed labels of a QNAME.
//!
//! Labels longer than 63 octets cannot go on the wire as-is, so
//! `encode` chops them into 63-octet chunks.  `decode_with_resync`
//! undoes that, given the encoded suffix at which real label
//! boundaries start again.

use crate::protocol::deserialise::{ConsumableBuffer, Error as DecodeError};
use crate::protocol::serialise::Error as EncodeError;
use crate::protocol::types::LABEL_MAX_LEN;

/// Octet mask for the two high bits marking a compression pointer.
const POINTER_TAG: u8 = 0b1100_0000;

/// The result of decoding a QNAME without message context.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum DecodedName {
    /// The name ended with the root label.  `len` is the number of
    /// octets it occupies, terminator included.
    Complete { name: String, len: usize },

    /// A length octet over 63 was found: the rest of the name is
    /// compressed and needs the whole message to resolve.  `prefix`
    /// holds the labels read before that point.
    CompressedTail { prefix: String },
}

/// `"foo.bar"` -> `"\x03foo\x03bar\x00"`
///
/// Runs of more than 63 octets between dots are split into several
/// labels.  Empty runs (from leading, trailing, or doubled dots) are
/// dropped, so `"example.com."` and `"example.com"` encode the same.
///
/// # Errors
///
/// If the output buffer cannot be allocated.
pub fn encode(hostname: &str) -> Result<Vec<u8>, EncodeError> {
    let host = hostname.as_bytes();

    // the label octets plus a length octet per chunk can never exceed
    // this, so nothing below reallocates.
    let capacity = host.len() + host.len() / LABEL_MAX_LEN + 2;
    let mut octets = Vec::new();
    octets
        .try_reserve_exact(capacity)
        .map_err(|_| EncodeError::Encoding { len: capacity })?;

    for run in host.split(|octet| *octet == b'.') {
        for chunk in run.chunks(LABEL_MAX_LEN) {
            // chunks are at most 63 octets
            #[allow(clippy::cast_possible_truncation)]
            octets.push(chunk.len() as u8);
            octets.extend_from_slice(chunk);
        }
    }
    octets.push(0);

    Ok(octets)
}

/// The labels `encode` would put on the wire, joined by dots, with no
/// trailing dot.  This is the name a nameserver echoes back.
///
/// `"www..example.com."` -> `"www.example.com"`
pub fn normalise(hostname: &str) -> String {
    let mut name = Vec::with_capacity(hostname.len());

    for chunk in hostname
        .as_bytes()
        .split(|octet| *octet == b'.')
        .flat_map(|run| run.chunks(LABEL_MAX_LEN))
    {
        if !name.is_empty() {
            name.push(b'.');
        }
        name.extend_from_slice(chunk);
    }

    to_string(&name)
}

/// `"\x03foo\x03bar\x00"` -> `"foo.bar."`
///
/// # Errors
///
/// If a label, or the terminator, is missing from the buffer.
pub fn decode(octets: &[u8]) -> Result<DecodedName, DecodeError> {
    let mut buffer = ConsumableBuffer::new(octets);
    let mut name = Vec::with_capacity(octets.len());

    loop {
        let size = buffer.next_u8().ok_or(DecodeError::DomainTooShort)?;
        if size == 0 {
            break;
        }
        if usize::from(size) > LABEL_MAX_LEN {
            return Ok(DecodedName::CompressedTail {
                prefix: to_string(&name),
            });
        }

        let label = buffer
            .take(size.into())
            .ok_or(DecodeError::DomainTooShort)?;
        name.extend_from_slice(label);
        name.push(b'.');
    }

    Ok(DecodedName::Complete {
        name: to_string(&name),
        len: buffer.position(),
    })
}

/// `"\x03foo\x03bar\x02ab\x02de\x00"`, `"\x02ab\x02de\x00"` ->
/// `"foobar.ab.de"`
///
/// Labels are glued together with no separator until the octets
/// following a label are `encoded_domain`.  Every later label gets a
/// dot in front of it.  There is no trailing dot.
///
/// # Errors
///
/// If a label, or the terminator, is missing from the buffer.
pub fn decode_with_resync(
    octets: &[u8],
    encoded_domain: &[u8],
) -> Result<DecodedName, DecodeError> {
    let mut buffer = ConsumableBuffer::new(octets);
    let mut name = Vec::with_capacity(octets.len());
    let mut add_dot = false;

    loop {
        let size = buffer.next_u8().ok_or(DecodeError::DomainTooShort)?;
        if size == 0 {
            break;
        }
        if usize::from(size) > LABEL_MAX_LEN {
            return Ok(DecodedName::CompressedTail {
                prefix: to_string(&name),
            });
        }

        let label = buffer
            .take(size.into())
            .ok_or(DecodeError::DomainTooShort)?;
        if add_dot {
            name.push(b'.');
        }
        name.extend_from_slice(label);

        if buffer.remaining().starts_with(encoded_domain) {
            add_dot = true;
        }
    }

    Ok(DecodedName::Complete {
        name: to_string(&name),
        len: buffer.position(),
    })
}

/// Decode the possibly-compressed name at `offset` in `message`,
/// following pointers.  The result has a trailing dot.
///
/// A pointer must point to an earlier position than the labels it
/// continues (RFC 1035 section 4.1.4), which rules out loops.
///
/// # Errors
///
/// If the name runs off the end of the message, a pointer does not
/// point backwards, or a length octet uses the reserved `01` / `10`
/// tags.
pub fn expand(message: &[u8], offset: usize) -> Result<String, DecodeError> {
    let mut buffer = ConsumableBuffer::new(message).at_offset(offset);
    let mut start = offset;
    let mut name = Vec::with_capacity(message.len().saturating_sub(offset));

    loop {
        let size = buffer.next_u8().ok_or(DecodeError::DomainTooShort)?;

        if size == 0 {
            break;
        } else if usize::from(size) <= LABEL_MAX_LEN {
            let label = buffer
                .take(size.into())
                .ok_or(DecodeError::DomainTooShort)?;
            name.extend_from_slice(label);
            name.push(b'.');
        } else if size & POINTER_TAG == POINTER_TAG {
            let hi = size & !POINTER_TAG;
            let lo = buffer.next_u8().ok_or(DecodeError::DomainTooShort)?;
            let ptr = usize::from(u16::from_be_bytes([hi, lo]));

            if ptr >= start {
                return Err(DecodeError::DomainPointerInvalid);
            }

            start = ptr;
            buffer = buffer.at_offset(ptr);
        } else {
            return Err(DecodeError::DomainLabelInvalid);
        }
    }

    if name.is_empty() {
        name.push(b'.');
    }

    Ok(to_string(&name))
}

fn to_string(octets: &[u8]) -> String {
    String::from_utf8_lossy(octets).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::test_util::*;

    #[test]
    #[rustfmt::skip]
    fn encode_simple() {
        assert_eq!(
            vec![
                3, 119, 119, 119, // "www"
                7, 101, 120, 97, 109, 112, 108, 101, // "example"
                3, 99, 111, 109, 0, // "com"
            ],
            encode("www.example.com").unwrap(),
        );
    }

    #[test]
    fn encode_ignores_trailing_and_doubled_dots() {
        let expected = encode("www.example.com").unwrap();

        assert_eq!(expected, encode("www.example.com.").unwrap());
        assert_eq!(expected, encode("www..example.com").unwrap());
        assert_eq!(expected, encode(".www.example.com").unwrap());
    }

    #[test]
    fn encode_empty_is_root() {
        assert_eq!(vec![0], encode("").unwrap());
        assert_eq!(vec![0], encode(".").unwrap());
    }

    #[test]
    fn encode_splits_long_labels() {
        let long = "x".repeat(130);
        let octets = encode(&format!("{long}.example")).unwrap();

        let mut expected = Vec::new();
        expected.push(63);
        expected.extend_from_slice(&[b'x'; 63]);
        expected.push(63);
        expected.extend_from_slice(&[b'x'; 63]);
        expected.push(4);
        expected.extend_from_slice(b"xxxx");
        expected.push(7);
        expected.extend_from_slice(b"example");
        expected.push(0);

        assert_eq!(expected, octets);
    }

    #[test]
    fn encode_splits_long_final_label() {
        let octets = encode(&"y".repeat(64)).unwrap();

        assert_eq!(63, octets[0]);
        assert_eq!(1, octets[64]);
        assert_eq!(b'y', octets[65]);
        assert_eq!(0, octets[66]);
        assert_eq!(67, octets.len());
    }

    #[test]
    fn normalise_drops_empty_labels() {
        assert_eq!("example.com", normalise(".example.com"));
        assert_eq!("www.example.com", normalise("www..example.com"));
        assert_eq!("example.com", normalise("example.com."));
        assert_eq!("", normalise("."));
    }

    #[test]
    fn normalise_matches_decoded_wire_name() {
        let long = "q".repeat(100);
        for hostname in [format!("{long}..example"), ".a.b.".to_string()] {
            match decode(&encode(&hostname).unwrap()) {
                Ok(DecodedName::Complete { name, .. }) => {
                    assert_eq!(format!("{}.", normalise(&hostname)), name);
                }
                other => panic!("unexpected decode result {other:?}"),
            }
        }
    }

    #[test]
    fn decode_simple() {
        let octets = encode("www.example.com").unwrap();

        assert_eq!(
            Ok(DecodedName::Complete {
                name: "www.example.com.".to_string(),
                len: octets.len(),
            }),
            decode(&octets)
        );
    }

    #[test]
    fn decode_ignores_trailing_octets() {
        let mut octets = encode("example.com").unwrap();
        let len = octets.len();
        octets.extend_from_slice(&[0, 1, 0, 1]);

        assert_eq!(
            Ok(DecodedName::Complete {
                name: "example.com.".to_string(),
                len,
            }),
            decode(&octets)
        );
    }

    #[test]
    fn decode_roundtrip() {
        for _ in 0..100 {
            let hostname = arbitrary_hostname();
            let octets = encode(&hostname).unwrap();

            match decode(&octets) {
                Ok(DecodedName::Complete { name, len }) => {
                    assert_eq!(format!("{hostname}."), name);
                    assert_eq!(octets.len(), len);
                }
                other => panic!("unexpected decode result {other:?} for {hostname:?}"),
            }
        }
    }

    #[test]
    #[rustfmt::skip]
    fn decode_stops_at_pointer() {
        let octets = [
            3, 119, 119, 119, // "www"
            0b1100_0000, 12, // pointer
        ];

        assert_eq!(
            Ok(DecodedName::CompressedTail {
                prefix: "www.".to_string(),
            }),
            decode(&octets)
        );
    }

    #[test]
    fn decode_rejects_truncated_label() {
        let octets = encode("www.example.com").unwrap();

        for end in 0..octets.len() {
            assert_eq!(
                Err(DecodeError::DomainTooShort),
                decode(&octets[..end]),
                "truncated at {end}"
            );
        }
    }

    #[test]
    fn decode_with_resync_rejoins_split_labels() {
        let long = "z".repeat(150);
        let octets = encode(&format!("{long}.ab.de")).unwrap();
        let suffix = encode("ab.de").unwrap();

        match decode_with_resync(&octets, &suffix) {
            Ok(DecodedName::Complete { name, len }) => {
                assert_eq!(format!("{long}.ab.de"), name);
                assert_eq!(octets.len(), len);
            }
            other => panic!("unexpected decode result {other:?}"),
        }
    }

    #[test]
    #[rustfmt::skip]
    fn decode_with_resync_joins_until_suffix() {
        let octets = [
            3, 102, 111, 111, // "foo"
            3, 98, 97, 114, // "bar"
            2, 97, 98, // "ab"
            2, 100, 101, 0, // "de"
        ];
        let suffix = [2, 97, 98, 2, 100, 101, 0];

        assert_eq!(
            Ok(DecodedName::Complete {
                name: "foobar.ab.de".to_string(),
                len: octets.len(),
            }),
            decode_with_resync(&octets, &suffix)
        );
    }

    #[test]
    fn decode_with_resync_rejects_truncated_label() {
        let octets = encode("foo.bar").unwrap();

        assert_eq!(
            Err(DecodeError::DomainTooShort),
            decode_with_resync(&octets[..5], &[0])
        );
    }

    #[test]
    #[rustfmt::skip]
    fn expand_follows_pointers() {
        let message = [
            7, 101, 120, 97, 109, 112, 108, 101, // "example"
            3, 99, 111, 109, 0, // "com"
            3, 119, 119, 119, // "www"
            0b1100_0000, 0, // pointer to "example.com"
        ];

        assert_eq!(Ok("www.example.com.".to_string()), expand(&message, 13));
        assert_eq!(Ok("example.com.".to_string()), expand(&message, 0));
    }

    #[test]
    #[rustfmt::skip]
    fn expand_rejects_forward_and_self_pointers() {
        let self_pointer = [0b1100_0000, 0];
        let forward_pointer = [0b1100_0000, 2, 0];

        assert_eq!(Err(DecodeError::DomainPointerInvalid), expand(&self_pointer, 0));
        assert_eq!(Err(DecodeError::DomainPointerInvalid), expand(&forward_pointer, 0));
    }

    #[test]
    fn expand_rejects_reserved_label_tags() {
        assert_eq!(Err(DecodeError::DomainLabelInvalid), expand(&[0b0100_0000, 0], 0));
    }

    #[test]
    fn expand_rejects_truncated_pointer() {
        assert_eq!(Err(DecodeError::DomainTooShort), expand(&[0b1100_0000], 0));
    }
}
