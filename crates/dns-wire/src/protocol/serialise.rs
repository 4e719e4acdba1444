//! Serialisation of DNS queries to the wire format.  See the `types`
//! module for details of the format.

use bytes::{BufMut, BytesMut};

use crate::protocol::qname;
use crate::protocol::tracker::TransactionTracker;
use crate::protocol::types::*;

/// Build a recursive query for `hostname`, and remember which
/// transaction ID it went out with.
///
/// The name is encoded before an ID is taken from the tracker, so a
/// failure leaves the tracker untouched.  The tracker gets the name as
/// it goes on the wire, empty labels dropped, since that is what the
/// reply will carry.
///
/// # Errors
///
/// If the hostname cannot be encoded.
pub fn build_query(
    tracker: &mut TransactionTracker,
    hostname: &str,
    qtype: RecordType,
) -> Result<BytesMut, Error> {
    let encoded = qname::encode(hostname)?;

    let mut buffer =
        WritableBuffer::with_capacity(HEADER_LEN + encoded.len() + QUESTION_TRAILER_LEN);
    let id = tracker.next_id();

    Header::recursive_query(id).serialise(&mut buffer);
    buffer.write_u16(1); // qdcount
    buffer.write_u16(0); // ancount
    buffer.write_u16(0); // nscount
    buffer.write_u16(0); // arcount

    buffer.write_octets(&encoded);
    qtype.serialise(&mut buffer);
    RecordClass::IN.serialise(&mut buffer);

    tracker.register(id, &qname::normalise(hostname));

    Ok(buffer.octets)
}

impl Header {
    pub fn serialise(&self, buffer: &mut WritableBuffer) {
        // octet 1
        let flag_qr = if self.is_response { HEADER_MASK_QR } else { 0 };
        let field_opcode = HEADER_MASK_OPCODE & (u8::from(self.opcode) << HEADER_OFFSET_OPCODE);
        let flag_aa = if self.is_authoritative {
            HEADER_MASK_AA
        } else {
            0
        };
        let flag_tc = if self.is_truncated { HEADER_MASK_TC } else { 0 };
        let flag_rd = if self.recursion_desired {
            HEADER_MASK_RD
        } else {
            0
        };
        // octet 2
        let flag_ra = if self.recursion_available {
            HEADER_MASK_RA
        } else {
            0
        };
        let field_rcode = HEADER_MASK_RCODE & (u8::from(self.rcode) << HEADER_OFFSET_RCODE);

        buffer.write_u16(self.id);
        buffer.write_u8(flag_qr | field_opcode | flag_aa | flag_tc | flag_rd);
        buffer.write_u8(flag_ra | field_rcode);
    }
}

impl WireHeader {
    pub fn serialise(&self, buffer: &mut WritableBuffer) {
        self.header.serialise(buffer);
        buffer.write_u16(self.qdcount);
        buffer.write_u16(self.ancount);
        buffer.write_u16(self.nscount);
        buffer.write_u16(self.arcount);
    }
}

impl RecordType {
    pub fn serialise(self, buffer: &mut WritableBuffer) {
        buffer.write_u16(self.into());
    }
}

impl RecordClass {
    pub fn serialise(self, buffer: &mut WritableBuffer) {
        buffer.write_u16(self.into());
    }
}

/// Errors encountered when serialising a query.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Error {
    /// A buffer of this many octets could not be allocated.
    Encoding { len: usize },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Encoding { len } => {
                write!(f, "could not allocate {len} octets to encode hostname")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

/// A buffer which can be written to, for serialisation purposes.
pub struct WritableBuffer {
    pub octets: BytesMut,
}

impl Default for WritableBuffer {
    fn default() -> Self {
        Self {
            octets: BytesMut::with_capacity(512),
        }
    }
}

impl WritableBuffer {
    pub fn with_capacity(len: usize) -> Self {
        Self {
            octets: BytesMut::with_capacity(len),
        }
    }

    pub fn index(&self) -> usize {
        self.octets.len()
    }

    pub fn write_u8(&mut self, octet: u8) {
        self.octets.put_u8(octet);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.write_octets(&value.to_be_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.write_octets(&value.to_be_bytes());
    }

    pub fn write_octets(&mut self, octets: &[u8]) {
        self.octets.put_slice(octets);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[rustfmt::skip]
    fn build_query_a() {
        let mut tracker = TransactionTracker::new();
        let query = build_query(&mut tracker, "www.example.com", RecordType::A).unwrap();

        assert_eq!(
            vec![
                // ID
                0, 1,
                // flags: RD
                0b0000_0001, 0,
                // QDCOUNT, ANCOUNT, NSCOUNT, ARCOUNT
                0, 1, 0, 0, 0, 0, 0, 0,
                // QNAME
                3, 119, 119, 119, // "www"
                7, 101, 120, 97, 109, 112, 108, 101, // "example"
                3, 99, 111, 109, 0, // "com"
                // QTYPE
                0, 1,
                // QCLASS
                0, 1,
            ],
            query,
        );
    }

    #[test]
    fn build_query_aaaa() {
        let mut tracker = TransactionTracker::new();
        let query = build_query(&mut tracker, "example.com", RecordType::AAAA).unwrap();

        let len = query.len();
        assert_eq!(&[0u8, 28, 0, 1], &query[len - 4..]);
    }

    #[test]
    fn build_query_registers_hostname() {
        let mut tracker = TransactionTracker::new();
        let first = build_query(&mut tracker, "one.example", RecordType::A).unwrap();
        let second = build_query(&mut tracker, "two.example", RecordType::A).unwrap();

        let first_id = u16::from_be_bytes([first[0], first[1]]);
        let second_id = u16::from_be_bytes([second[0], second[1]]);

        assert_eq!(first_id.wrapping_add(1), second_id);
        assert_eq!(2, tracker.len());
        assert_eq!(
            Some("one.example".to_string()),
            tracker.resolve_and_remove(first_id, "one.example.")
        );
        assert_eq!(
            Some("two.example".to_string()),
            tracker.resolve_and_remove(second_id, "two.example.")
        );
    }

    #[test]
    fn build_query_registers_wire_name() {
        let mut tracker = TransactionTracker::new();
        let query = build_query(&mut tracker, "www..example.com.", RecordType::A).unwrap();
        let id = u16::from_be_bytes([query[0], query[1]]);

        assert_eq!(
            Some("www.example.com".to_string()),
            tracker.resolve_and_remove(id, "www.example.com.")
        );
    }

    #[test]
    fn header_serialise_flags() {
        let mut buffer = WritableBuffer::default();
        let header = Header {
            id: 0xbeef,
            is_response: true,
            opcode: Opcode::Status,
            is_authoritative: true,
            is_truncated: true,
            recursion_desired: true,
            recursion_available: true,
            rcode: Rcode::NameError,
        };
        header.serialise(&mut buffer);

        assert_eq!(
            vec![0xbe, 0xef, 0b1001_0111, 0b1000_0011],
            buffer.octets
        );
    }
}
