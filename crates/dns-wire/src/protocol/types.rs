use std::collections::BTreeMap;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Maximum length of a single label in a domain name.  A length
/// octet above this is a compression pointer, not a label.
pub const LABEL_MAX_LEN: usize = 63;

/// Size of the fixed message header.
pub const HEADER_LEN: usize = 12;

/// Size of the QTYPE and QCLASS fields following the QNAME.
pub const QUESTION_TRAILER_LEN: usize = 4;

/// Size of the TYPE, CLASS, TTL, and RDLENGTH fields of a resource
/// record.
pub const RR_FIXED_LEN: usize = 10;

/// Size of a compression pointer.
pub const POINTER_LEN: usize = 2;

/// Smallest response worth looking at: a header, a question trailer,
/// and some room for an answer.
pub const RESPONSE_MIN_LEN: usize = HEADER_LEN + QUESTION_TRAILER_LEN + 16;

/// Octet mask for the QR flag being set (response).
pub const HEADER_MASK_QR: u8 = 0b1000_0000;

/// Octet mask for the opcode field.
pub const HEADER_MASK_OPCODE: u8 = 0b0111_1000;

/// Offset for the opcode field.
pub const HEADER_OFFSET_OPCODE: usize = 3;

/// Octet mask for the AA flag being set (authoritative)
pub const HEADER_MASK_AA: u8 = 0b0000_0100;

/// Octet mask for the TC flag being set (truncated)
pub const HEADER_MASK_TC: u8 = 0b0000_0010;

/// Octet mask for the RD flag being set (desired)
pub const HEADER_MASK_RD: u8 = 0b0000_0001;

/// Octet mask for the RA flag being set (available)
pub const HEADER_MASK_RA: u8 = 0b1000_0000;

/// Octet mask for the rcode field.
pub const HEADER_MASK_RCODE: u8 = 0b0000_1111;

/// Offset for the rcode field.
pub const HEADER_OFFSET_RCODE: usize = 0;

/// Common header type for all messages.
///
/// ```text
///                                     1  1  1  1  1  1
///       0  1  2  3  4  5  6  7  8  9  0  1  2  3  4  5
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                      ID                       |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |QR|   Opcode  |AA|TC|RD|RA|   Z    |   RCODE   |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                    QDCOUNT                    |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                    ANCOUNT                    |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                    NSCOUNT                    |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                    ARCOUNT                    |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
/// ```
///
/// See section 4.1.1 of RFC 1035.
///
/// The counts live in `WireHeader`, as a query only ever carries one
/// question and a response is never rebuilt from this type.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Header {
    /// A 16 bit identifier assigned by the program that generates any
    /// kind of query.  This identifier is copied the corresponding
    /// reply and can be used by the requester to match up replies to
    /// outstanding queries.
    pub id: u16,

    /// Whether this message is a query (0), or a response (1).
    pub is_response: bool,

    /// Kind of query in this message.
    pub opcode: Opcode,

    /// Authoritative Answer.
    pub is_authoritative: bool,

    /// Truncation - specifies that this message was truncated due to
    /// length greater than that permitted on the transmission
    /// channel.
    pub is_truncated: bool,

    /// Recursion Desired - this bit may be set in a query and is
    /// copied into the response.  If RD is set, it directs the name
    /// server to pursue the query recursively.
    pub recursion_desired: bool,

    /// Recursion Available.
    pub recursion_available: bool,

    /// Response code.  Anything other than `NoError` is reported as
    /// a name error.
    pub rcode: Rcode,
}

impl Header {
    /// Header of a recursive standard query.
    pub fn recursive_query(id: u16) -> Self {
        Self {
            id,
            is_response: false,
            opcode: Opcode::Standard,
            is_authoritative: false,
            is_truncated: false,
            recursion_desired: true,
            recursion_available: false,
            rcode: Rcode::NoError,
        }
    }
}

/// A `Header` plus the section counts, as found on the wire.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct WireHeader {
    pub header: Header,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

/// What sort of query this is.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Opcode {
    Standard,
    Inverse,
    Status,
    Reserved(OpcodeReserved),
}

/// A struct with a private constructor, to ensure invalid `Opcode`s
/// cannot be created.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct OpcodeReserved(u8);

impl From<u8> for Opcode {
    fn from(octet: u8) -> Self {
        match octet & 0b0000_1111 {
            0 => Opcode::Standard,
            1 => Opcode::Inverse,
            2 => Opcode::Status,
            other => Opcode::Reserved(OpcodeReserved(other)),
        }
    }
}

impl From<Opcode> for u8 {
    fn from(value: Opcode) -> Self {
        match value {
            Opcode::Standard => 0,
            Opcode::Inverse => 1,
            Opcode::Status => 2,
            Opcode::Reserved(OpcodeReserved(octet)) => octet,
        }
    }
}

/// What sort of response this is.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Rcode {
    NoError,
    FormatError,
    ServerFailure,
    NameError,
    NotImplemented,
    Refused,
    Reserved(RcodeReserved),
}

/// A struct with a private constructor, to ensure invalid `Rcode`s
/// cannot be created.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RcodeReserved(u8);

impl From<u8> for Rcode {
    fn from(octet: u8) -> Self {
        match octet & 0b0000_1111 {
            0 => Rcode::NoError,
            1 => Rcode::FormatError,
            2 => Rcode::ServerFailure,
            3 => Rcode::NameError,
            4 => Rcode::NotImplemented,
            5 => Rcode::Refused,
            other => Rcode::Reserved(RcodeReserved(other)),
        }
    }
}

impl From<Rcode> for u8 {
    fn from(value: Rcode) -> Self {
        match value {
            Rcode::NoError => 0,
            Rcode::FormatError => 1,
            Rcode::ServerFailure => 2,
            Rcode::NameError => 3,
            Rcode::NotImplemented => 4,
            Rcode::Refused => 5,
            Rcode::Reserved(RcodeReserved(octet)) => octet,
        }
    }
}

/// Record types seen in answers.  Only `A`, `AAAA`, and `CNAME` carry
/// data we extract; the rest are named so they print nicely in logs.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum RecordType {
    A,
    NS,
    CNAME,
    SOA,
    PTR,
    MX,
    TXT,
    AAAA,
    SRV,
    Unknown(RecordTypeUnknown),
}

/// A struct with a private constructor, to ensure invalid `RecordType`s
/// cannot be created.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RecordTypeUnknown(u16);

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RecordType::A => write!(f, "A"),
            RecordType::NS => write!(f, "NS"),
            RecordType::CNAME => write!(f, "CNAME"),
            RecordType::SOA => write!(f, "SOA"),
            RecordType::PTR => write!(f, "PTR"),
            RecordType::MX => write!(f, "MX"),
            RecordType::TXT => write!(f, "TXT"),
            RecordType::AAAA => write!(f, "AAAA"),
            RecordType::SRV => write!(f, "SRV"),
            RecordType::Unknown(RecordTypeUnknown(n)) => write!(f, "TYPE{n}"),
        }
    }
}

impl From<u16> for RecordType {
    fn from(value: u16) -> Self {
        match value {
            1 => RecordType::A,
            2 => RecordType::NS,
            5 => RecordType::CNAME,
            6 => RecordType::SOA,
            12 => RecordType::PTR,
            15 => RecordType::MX,
            16 => RecordType::TXT,
            28 => RecordType::AAAA,
            33 => RecordType::SRV,
            _ => RecordType::Unknown(RecordTypeUnknown(value)),
        }
    }
}

impl From<RecordType> for u16 {
    fn from(value: RecordType) -> Self {
        match value {
            RecordType::A => 1,
            RecordType::NS => 2,
            RecordType::CNAME => 5,
            RecordType::SOA => 6,
            RecordType::PTR => 12,
            RecordType::MX => 15,
            RecordType::TXT => 16,
            RecordType::AAAA => 28,
            RecordType::SRV => 33,
            RecordType::Unknown(RecordTypeUnknown(value)) => value,
        }
    }
}

/// Record classes are used by resource records and by queries.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum RecordClass {
    IN,
    Unknown(RecordClassUnknown),
}

/// A struct with a private constructor, to ensure invalid
/// `RecordClass`es cannot be created.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RecordClassUnknown(u16);

impl fmt::Display for RecordClass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RecordClass::IN => write!(f, "IN"),
            RecordClass::Unknown(RecordClassUnknown(n)) => write!(f, "CLASS{n}"),
        }
    }
}

impl From<u16> for RecordClass {
    fn from(value: u16) -> Self {
        match value {
            1 => RecordClass::IN,
            _ => RecordClass::Unknown(RecordClassUnknown(value)),
        }
    }
}

impl From<RecordClass> for u16 {
    fn from(value: RecordClass) -> Self {
        match value {
            RecordClass::IN => 1,
            RecordClass::Unknown(RecordClassUnknown(value)) => value,
        }
    }
}

/// The descriptor an extracted value is filed under: TTL, class, and
/// type.  The name error pseudo-record has no type.
///
/// Displays as the middle columns of an output line, eg `300\tIN\tA`
/// or `0\tIN`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RecordKey {
    pub ttl: u32,
    pub rclass: RecordClass,
    pub rtype: Option<RecordType>,
}

impl RecordKey {
    pub fn name_error() -> Self {
        Self {
            ttl: 0,
            rclass: RecordClass::IN,
            rtype: None,
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}\t{}", self.ttl, self.rclass)?;
        if let Some(rtype) = self.rtype {
            write!(f, "\t{rtype}")?;
        }
        Ok(())
    }
}

/// A value extracted from an answer.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum RecordData {
    A(Ipv4Addr),
    AAAA(Ipv6Addr),
    CNAME(String),
    /// Synthesised when the response code is not `NoError`.
    NameError,
}

impl RecordData {
    pub fn is_address(&self) -> bool {
        matches!(self, RecordData::A(_) | RecordData::AAAA(_))
    }
}

impl fmt::Display for RecordData {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RecordData::A(address) => write!(f, "{address}"),
            RecordData::AAAA(address) => write!(f, "{address}"),
            RecordData::CNAME(name) => write!(f, "{name}"),
            RecordData::NameError => write!(f, "NXDOMAIN"),
        }
    }
}

/// Extracted values, grouped by descriptor.  Several records may
/// share a descriptor (eg, a round-robin A set): they are all kept,
/// in the order they appeared on the wire.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct RecordSet {
    entries: BTreeMap<RecordKey, Vec<RecordData>>,
    len: usize,
}

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: RecordKey, data: RecordData) {
        self.entries.entry(key).or_default().push(data);
        self.len += 1;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, key: &RecordKey) -> &[RecordData] {
        self.entries.get(key).map_or(&[], Vec::as_slice)
    }

    /// All values, ordered by descriptor.  TTLs compare as numbers, so
    /// `60` comes before `300`.
    pub fn iter(&self) -> impl Iterator<Item = (&RecordKey, &RecordData)> {
        self.entries
            .iter()
            .flat_map(|(key, values)| values.iter().map(move |value| (key, value)))
    }
}

/// A reply which has been matched to an outstanding query.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Response {
    /// The question name, as given in the reply, with a trailing dot.
    pub name: String,
    pub records: RecordSet,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u8_opcode_roundtrip() {
        for i in 0..15 {
            assert_eq!(u8::from(Opcode::from(i)), i);
        }
    }

    #[test]
    fn u8_rcode_roundtrip() {
        for i in 0..15 {
            assert_eq!(u8::from(Rcode::from(i)), i);
        }
    }

    #[test]
    fn u16_recordtype_roundtrip() {
        for i in 0..100 {
            assert_eq!(u16::from(RecordType::from(i)), i);
        }
    }

    #[test]
    fn u16_recordclass_roundtrip() {
        for i in 0..100 {
            assert_eq!(u16::from(RecordClass::from(i)), i);
        }
    }

    #[test]
    fn recordkey_display() {
        let key = RecordKey {
            ttl: 300,
            rclass: RecordClass::IN,
            rtype: Some(RecordType::A),
        };

        assert_eq!("300\tIN\tA", key.to_string());
        assert_eq!("0\tIN", RecordKey::name_error().to_string());
    }

    #[test]
    fn recordset_keeps_duplicates_in_insertion_order() {
        let key = RecordKey {
            ttl: 60,
            rclass: RecordClass::IN,
            rtype: Some(RecordType::A),
        };

        let mut records = RecordSet::new();
        records.insert(key, RecordData::A(Ipv4Addr::new(2, 2, 2, 2)));
        records.insert(key, RecordData::A(Ipv4Addr::new(1, 1, 1, 1)));

        assert_eq!(2, records.len());
        assert_eq!(
            &[
                RecordData::A(Ipv4Addr::new(2, 2, 2, 2)),
                RecordData::A(Ipv4Addr::new(1, 1, 1, 1)),
            ],
            records.get(&key)
        );
    }

    #[test]
    fn recordset_orders_by_key() {
        let cname = RecordKey {
            ttl: 300,
            rclass: RecordClass::IN,
            rtype: Some(RecordType::CNAME),
        };
        let a = RecordKey {
            ttl: 60,
            rclass: RecordClass::IN,
            rtype: Some(RecordType::A),
        };

        let mut records = RecordSet::new();
        records.insert(cname, RecordData::CNAME("www.example.net.".to_string()));
        records.insert(a, RecordData::A(Ipv4Addr::new(1, 1, 1, 1)));

        let keys = records.iter().map(|(k, _)| *k).collect::<Vec<_>>();
        assert_eq!(vec![a, cname], keys);
    }
}

#[cfg(any(feature = "test-util", test))]
#[allow(clippy::missing_panics_doc)]
pub mod test_util {
    use super::*;

    use rand::Rng;

    use crate::protocol::qname;
    use crate::protocol::serialise::WritableBuffer;

    /// A pointer to the question name, which always starts right
    /// after the header.
    const QUESTION_POINTER: [u8; 2] = [0b1100_0000, 12];

    const HOSTNAME_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789-";

    /// A random hostname of one to four labels, each between 1 and 63
    /// octets, with no trailing dot.
    pub fn arbitrary_hostname() -> String {
        let mut rng = rand::rng();
        let labels = rng.random_range(1..=4);

        (0..labels)
            .map(|_| {
                let len = rng.random_range(1..=LABEL_MAX_LEN);
                (0..len)
                    .map(|_| {
                        char::from(HOSTNAME_ALPHABET[rng.random_range(0..HOSTNAME_ALPHABET.len())])
                    })
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    pub fn arbitrary_octets(len: usize) -> Vec<u8> {
        let mut rng = rand::rng();
        (0..len).map(|_| rng.random()).collect()
    }

    /// Where an answer's owner name comes from.
    #[derive(Debug, Copy, Clone)]
    enum Owner {
        Question,
        LastCname,
    }

    #[derive(Debug, Clone)]
    struct Answer {
        owner: Owner,
        rtype: RecordType,
        ttl: u32,
        rdata: Vec<u8>,
    }

    /// Builds response datagrams the way a recursive nameserver
    /// would, for feeding to the parser.
    #[derive(Debug, Clone)]
    pub struct ResponseBuilder {
        id: u16,
        qname: Vec<u8>,
        qtype: RecordType,
        rcode: Rcode,
        compress_owners: bool,
        answers: Vec<Answer>,
        padding: usize,
    }

    impl ResponseBuilder {
        pub fn new(id: u16, hostname: &str) -> Self {
            Self::with_qname(id, qname::encode(hostname).unwrap(), RecordType::A)
        }

        /// A builder for a reply to `query`, echoing its ID, name, and
        /// type.  Returns `None` if `query` is not a well-formed query.
        pub fn answering(query: &[u8]) -> Option<Self> {
            let id = u16::from_be_bytes([*query.first()?, *query.get(1)?]);
            let question = query.get(HEADER_LEN..)?;
            let len = match qname::decode(question).ok()? {
                qname::DecodedName::Complete { len, .. } => len,
                qname::DecodedName::CompressedTail { .. } => return None,
            };
            let qtype = u16::from_be_bytes([*question.get(len)?, *question.get(len + 1)?]);

            Some(Self::with_qname(
                id,
                question[..len].to_vec(),
                RecordType::from(qtype),
            ))
        }

        fn with_qname(id: u16, qname: Vec<u8>, qtype: RecordType) -> Self {
            Self {
                id,
                qname,
                qtype,
                rcode: Rcode::NoError,
                compress_owners: true,
                answers: Vec::new(),
                padding: 0,
            }
        }

        pub fn qtype(mut self, qtype: RecordType) -> Self {
            self.qtype = qtype;
            self
        }

        pub fn rcode(mut self, rcode: Rcode) -> Self {
            self.rcode = rcode;
            self
        }

        /// Repeat the question name in full as the owner of each
        /// answer, rather than pointing back at it.
        pub fn uncompressed_owners(mut self) -> Self {
            self.compress_owners = false;
            self
        }

        /// Zero octets after the last answer.
        pub fn padding(mut self, len: usize) -> Self {
            self.padding = len;
            self
        }

        pub fn a(self, ttl: u32, address: Ipv4Addr) -> Self {
            self.raw(RecordType::A, ttl, &address.octets())
        }

        pub fn aaaa(self, ttl: u32, address: Ipv6Addr) -> Self {
            self.raw(RecordType::AAAA, ttl, &address.octets())
        }

        /// An A record owned by the target of the previous CNAME.
        pub fn a_at_cname(mut self, ttl: u32, address: Ipv4Addr) -> Self {
            self.answers.push(Answer {
                owner: Owner::LastCname,
                rtype: RecordType::A,
                ttl,
                rdata: address.octets().to_vec(),
            });
            self
        }

        /// A CNAME to `target`, written out in full.
        pub fn cname(self, ttl: u32, target: &str) -> Self {
            self.raw(RecordType::CNAME, ttl, &qname::encode(target).unwrap())
        }

        /// A CNAME to `label` prepended to the question name, written
        /// as one label and a pointer.
        pub fn compressed_cname(self, ttl: u32, label: &str) -> Self {
            let mut rdata = Vec::with_capacity(label.len() + 3);
            rdata.push(u8::try_from(label.len()).unwrap());
            rdata.extend_from_slice(label.as_bytes());
            rdata.extend_from_slice(&QUESTION_POINTER);
            self.raw(RecordType::CNAME, ttl, &rdata)
        }

        pub fn raw(mut self, rtype: RecordType, ttl: u32, rdata: &[u8]) -> Self {
            self.answers.push(Answer {
                owner: Owner::Question,
                rtype,
                ttl,
                rdata: rdata.to_vec(),
            });
            self
        }

        pub fn build(&self) -> Vec<u8> {
            let mut buffer = WritableBuffer::default();

            WireHeader {
                header: Header {
                    id: self.id,
                    is_response: true,
                    opcode: Opcode::Standard,
                    is_authoritative: false,
                    is_truncated: false,
                    recursion_desired: true,
                    recursion_available: true,
                    rcode: self.rcode,
                },
                qdcount: 1,
                ancount: u16::try_from(self.answers.len()).unwrap(),
                nscount: 0,
                arcount: 0,
            }
            .serialise(&mut buffer);

            buffer.write_octets(&self.qname);
            self.qtype.serialise(&mut buffer);
            RecordClass::IN.serialise(&mut buffer);

            let mut last_cname = None;
            for answer in &self.answers {
                match (answer.owner, last_cname) {
                    (Owner::LastCname, Some(offset)) => {
                        let pointer = 0b1100_0000_0000_0000 | u16::try_from(offset).unwrap();
                        buffer.write_u16(pointer);
                    }
                    _ if self.compress_owners => buffer.write_octets(&QUESTION_POINTER),
                    _ => buffer.write_octets(&self.qname),
                }

                answer.rtype.serialise(&mut buffer);
                RecordClass::IN.serialise(&mut buffer);
                buffer.write_u32(answer.ttl);
                buffer.write_u16(u16::try_from(answer.rdata.len()).unwrap());
                if answer.rtype == RecordType::CNAME {
                    last_cname = Some(buffer.index());
                }
                buffer.write_octets(&answer.rdata);
            }

            buffer.write_octets(&vec![0; self.padding]);

            buffer.octets.to_vec()
        }
    }
}
