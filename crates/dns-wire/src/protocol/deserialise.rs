//! Deserialisation of DNS responses from the network.  See the
//! `types` module for details of the format.

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::protocol::qname::{self, DecodedName};
use crate::protocol::tracker::TransactionTracker;
use crate::protocol::types::*;

/// Parse a response and match it up with an outstanding query.
///
/// Returns `Ok(None)` if the response does not belong to any query
/// in `tracker`: this is not an error, the response should just be
/// dropped.  A matched query is removed from `tracker` before the
/// answers are looked at, so a response is only ever accepted once.
///
/// Answers are walked on the assumption that each owner name is
/// either a compression pointer or a verbatim copy of the question
/// name, which is what recursive nameservers send.  Only `A`, `AAAA`,
/// and `CNAME` records are extracted; others are skipped.
///
/// # Errors
///
/// If the response is malformed, or contains no usable answers.
pub fn parse_response(
    octets: &[u8],
    tracker: &mut TransactionTracker,
) -> Result<Option<Response>, Error> {
    if octets.len() < RESPONSE_MIN_LEN {
        return Err(Error::MessageTooShort { len: octets.len() });
    }

    let mut buffer = ConsumableBuffer::new(octets);
    let wire_header = WireHeader::deserialise(&mut buffer)?;
    let id = wire_header.header.id;

    if wire_header.qdcount != 1 {
        return Err(Error::QuestionCount(wire_header.qdcount));
    }

    let (name, qname_len) = match qname::decode(buffer.remaining()) {
        Ok(DecodedName::Complete { name, len }) => (name, len),
        _ => return Err(Error::QuestionNameInvalid(id)),
    };

    if tracker.resolve_and_remove(id, &name).is_none() {
        return Ok(None);
    }

    let mut records = RecordSet::new();

    if wire_header.header.rcode != Rcode::NoError {
        records.insert(RecordKey::name_error(), RecordData::NameError);
        return Ok(Some(Response { name, records }));
    }

    buffer
        .take(qname_len + QUESTION_TRAILER_LEN)
        .ok_or(Error::ResourceRecordTooShort(id))?;
    if buffer.remaining().len() < RR_FIXED_LEN {
        return Err(Error::ResourceRecordTooShort(id));
    }

    for _ in 0..wire_header.ancount {
        let owner_len = if usize::from(buffer.peek_u8().ok_or(Error::ResourceRecordTooShort(id))?)
            > LABEL_MAX_LEN
        {
            POINTER_LEN
        } else {
            qname_len
        };
        buffer
            .take(owner_len)
            .ok_or(Error::ResourceRecordTooShort(id))?;

        let rtype = RecordType::from(buffer.next_u16().ok_or(Error::ResourceRecordTooShort(id))?);
        let rclass =
            RecordClass::from(buffer.next_u16().ok_or(Error::ResourceRecordTooShort(id))?);
        let ttl = buffer.next_u32().ok_or(Error::ResourceRecordTooShort(id))?;
        let rdlength = buffer.next_u16().ok_or(Error::ResourceRecordTooShort(id))?;

        let rdata_start = buffer.position();
        let rdata = buffer
            .take(rdlength.into())
            .ok_or(Error::ResourceRecordTooShort(id))?;

        let invalid = Error::ResourceRecordInvalid {
            id,
            rtype,
            rdlength,
        };

        let data = match rtype {
            RecordType::A => {
                let octets = <[u8; 4]>::try_from(rdata).map_err(|_| invalid)?;
                Some(RecordData::A(Ipv4Addr::from(octets)))
            }
            RecordType::AAAA => {
                let octets = <[u8; 16]>::try_from(rdata).map_err(|_| invalid)?;
                Some(RecordData::AAAA(Ipv6Addr::from(octets)))
            }
            RecordType::CNAME => {
                let cname = match qname::decode(rdata)? {
                    DecodedName::Complete { name, .. } => name,
                    DecodedName::CompressedTail { .. } => qname::expand(octets, rdata_start)?,
                };
                Some(RecordData::CNAME(cname))
            }
            _ => None,
        };

        if let Some(data) = data {
            let key = RecordKey {
                ttl,
                rclass,
                rtype: Some(rtype),
            };
            records.insert(key, data);
        }
    }

    if records.is_empty() {
        Err(Error::NoRecords(id))
    } else {
        Ok(Some(Response { name, records }))
    }
}

impl WireHeader {
    /// # Errors
    ///
    /// If the header is too short.
    pub fn deserialise(buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        let id = buffer.next_u16().ok_or(Error::HeaderTooShort)?;
        let flags1 = buffer.next_u8().ok_or(Error::HeaderTooShort)?;
        let flags2 = buffer.next_u8().ok_or(Error::HeaderTooShort)?;
        let qdcount = buffer.next_u16().ok_or(Error::HeaderTooShort)?;
        let ancount = buffer.next_u16().ok_or(Error::HeaderTooShort)?;
        let nscount = buffer.next_u16().ok_or(Error::HeaderTooShort)?;
        let arcount = buffer.next_u16().ok_or(Error::HeaderTooShort)?;

        Ok(Self {
            header: Header {
                id,
                is_response: flags1 & HEADER_MASK_QR != 0,
                opcode: Opcode::from((flags1 & HEADER_MASK_OPCODE) >> HEADER_OFFSET_OPCODE),
                is_authoritative: flags1 & HEADER_MASK_AA != 0,
                is_truncated: flags1 & HEADER_MASK_TC != 0,
                recursion_desired: flags1 & HEADER_MASK_RD != 0,
                recursion_available: flags2 & HEADER_MASK_RA != 0,
                rcode: Rcode::from((flags2 & HEADER_MASK_RCODE) >> HEADER_OFFSET_RCODE),
            },
            qdcount,
            ancount,
            nscount,
            arcount,
        })
    }
}

/// Errors encountered when parsing a response.  In all the errors
/// which have a `u16` parameter, that is the ID from the header.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Error {
    /// The datagram is too short to hold a header, a question, and
    /// an answer.
    MessageTooShort { len: usize },

    /// The header is missing one or more required fields.
    HeaderTooShort,

    /// The response does not have exactly one question.
    QuestionCount(u16),

    /// The question name is truncated or compressed.
    QuestionNameInvalid(u16),

    /// A domain is incomplete.
    DomainTooShort,

    /// A domain pointer points to or after the current name.
    DomainPointerInvalid,

    /// A domain label is longer than 63 octets, but not a pointer.
    DomainLabelInvalid,

    /// A resource record ends with an incomplete field.
    ResourceRecordTooShort(u16),

    /// A resource record's RDATA is the wrong size for its type.
    ResourceRecordInvalid {
        id: u16,
        rtype: RecordType,
        rdlength: u16,
    },

    /// None of the answers were of a type we extract.
    NoRecords(u16),
}

impl Error {
    pub fn id(self) -> Option<u16> {
        match self {
            Error::MessageTooShort { .. } => None,
            Error::HeaderTooShort => None,
            Error::QuestionCount(_) => None,
            Error::QuestionNameInvalid(id) => Some(id),
            Error::DomainTooShort => None,
            Error::DomainPointerInvalid => None,
            Error::DomainLabelInvalid => None,
            Error::ResourceRecordTooShort(id) => Some(id),
            Error::ResourceRecordInvalid { id, .. } => Some(id),
            Error::NoRecords(id) => Some(id),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::MessageTooShort { len } => write!(f, "response too short ({len} octets)"),
            Error::HeaderTooShort => write!(f, "header too short"),
            Error::QuestionCount(count) => write!(f, "expected 1 question, got {count}"),
            Error::QuestionNameInvalid(_) => write!(f, "question name is invalid"),
            Error::DomainTooShort => write!(f, "domain name is truncated"),
            Error::DomainPointerInvalid => write!(f, "domain name pointer does not point backwards"),
            Error::DomainLabelInvalid => write!(f, "domain name label has a reserved tag"),
            Error::ResourceRecordTooShort(_) => write!(f, "resource record is truncated"),
            Error::ResourceRecordInvalid {
                rtype, rdlength, ..
            } => write!(f, "{rtype} record has invalid RDLENGTH {rdlength}"),
            Error::NoRecords(_) => write!(f, "no A, AAAA, or CNAME records in answer"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

/// A buffer which will be consumed by the parsing process.
pub struct ConsumableBuffer<'a> {
    octets: &'a [u8],
    position: usize,
}

impl<'a> ConsumableBuffer<'a> {
    pub fn new(octets: &'a [u8]) -> Self {
        Self {
            octets,
            position: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Everything not yet consumed.
    pub fn remaining(&self) -> &'a [u8] {
        self.octets.get(self.position..).unwrap_or(&[])
    }

    pub fn peek_u8(&self) -> Option<u8> {
        self.octets.get(self.position).copied()
    }

    pub fn next_u8(&mut self) -> Option<u8> {
        if self.octets.len() > self.position {
            let a = self.octets[self.position];
            self.position += 1;
            Some(a)
        } else {
            None
        }
    }

    pub fn next_u16(&mut self) -> Option<u16> {
        if self.octets.len() > self.position + 1 {
            let a = self.octets[self.position];
            let b = self.octets[self.position + 1];
            self.position += 2;
            Some(u16::from_be_bytes([a, b]))
        } else {
            None
        }
    }

    pub fn next_u32(&mut self) -> Option<u32> {
        if self.octets.len() > self.position + 3 {
            let a = self.octets[self.position];
            let b = self.octets[self.position + 1];
            let c = self.octets[self.position + 2];
            let d = self.octets[self.position + 3];
            self.position += 4;
            Some(u32::from_be_bytes([a, b, c, d]))
        } else {
            None
        }
    }

    pub fn take(&mut self, size: usize) -> Option<&'a [u8]> {
        if self.octets.len() >= self.position + size {
            let slice = &self.octets[self.position..self.position + size];
            self.position += size;
            Some(slice)
        } else {
            None
        }
    }

    pub fn at_offset(&self, position: usize) -> ConsumableBuffer<'a> {
        Self {
            octets: self.octets,
            position,
        }
    }
}
