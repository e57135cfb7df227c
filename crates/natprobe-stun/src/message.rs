//! STUN message construction, parsing, and validation.
//!
//! A [`Message`] owns its wire bytes in a single buffer capped at the
//! maximum STUN datagram size. Decoding records a descriptor per attribute
//! (type, offset, length) and typed accessors decode values on demand;
//! attribute bytes are never duplicated out of the buffer.

use crate::attr::{self, Attribute};
use crate::error::{DecodeError, EncodeError};
use crate::{BINDING_REQUEST, FINGERPRINT_XOR, HEADER_SIZE, MAGIC_COOKIE, MAX_MESSAGE_SIZE};
use rand::RngCore;
use std::fmt;

/// 96-bit STUN transaction identifier.
///
/// Generated randomly per request and used only as an exact-equality lookup
/// key while the transaction is outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId([u8; 12]);

impl TransactionId {
    /// Generate a fresh random transaction ID
    #[must_use]
    pub fn random() -> Self {
        let mut bytes = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Wrap raw transaction-ID bytes
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    /// Raw transaction-ID bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Descriptor of one attribute record inside the message buffer
#[derive(Debug, Clone, Copy)]
struct RawAttribute {
    attr_type: u16,
    offset: usize,
    len: usize,
}

/// A decoded or under-construction STUN message.
///
/// The header occupies the first 20 bytes of the owned buffer; the
/// attribute section follows, each record padded to a 4-byte boundary, with
/// the header length field tracking the attribute section size.
#[derive(Debug, Clone)]
pub struct Message {
    buf: Vec<u8>,
    attrs: Vec<RawAttribute>,
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.buf == other.buf
    }
}

impl Eq for Message {}

impl Message {
    /// Create a message of the given type with a fresh random transaction ID
    #[must_use]
    pub fn new(message_type: u16) -> Self {
        Self::with_transaction_id(message_type, TransactionId::random())
    }

    /// Create a binding request
    #[must_use]
    pub fn request() -> Self {
        Self::new(BINDING_REQUEST)
    }

    /// Create a reply carrying the transaction ID of the request it answers
    #[must_use]
    pub fn reply(message_type: u16, transaction_id: TransactionId) -> Self {
        Self::with_transaction_id(message_type, transaction_id)
    }

    fn with_transaction_id(message_type: u16, transaction_id: TransactionId) -> Self {
        let mut buf = Vec::with_capacity(MAX_MESSAGE_SIZE);
        buf.extend_from_slice(&message_type.to_be_bytes());
        buf.extend_from_slice(&0u16.to_be_bytes());
        buf.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
        buf.extend_from_slice(transaction_id.as_bytes());
        Self {
            buf,
            attrs: Vec::new(),
        }
    }

    /// Structural validation of a received datagram.
    ///
    /// Accepts only buffers that carry a plausible STUN header: the two most
    /// significant bits clear (STUN demultiplexing rule), the magic cookie in
    /// place, and a declared attribute section that is 4-byte aligned and
    /// fits the maximum datagram size.
    #[must_use]
    pub fn is_valid(bytes: &[u8]) -> bool {
        if bytes.len() < HEADER_SIZE {
            return false;
        }
        if bytes[0] & 0b1100_0000 != 0 {
            return false;
        }
        if u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) != MAGIC_COOKIE {
            return false;
        }
        let declared = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;
        HEADER_SIZE + declared <= MAX_MESSAGE_SIZE && declared % 4 == 0
    }

    /// Verify the trailing FINGERPRINT attribute of a datagram, if present.
    ///
    /// Returns `true` when the datagram carries no trailing FINGERPRINT (there
    /// is nothing to check) or when the CRC-32 matches; `false` on mismatch or
    /// if the datagram cannot be parsed at all.
    #[must_use]
    pub fn fingerprint_matches(bytes: &[u8]) -> bool {
        let Ok(message) = Self::from_bytes(bytes) else {
            return false;
        };
        match message.attrs.last() {
            Some(raw) if raw.attr_type == attr::FINGERPRINT && raw.len == 4 => {
                let tlv_start = raw.offset - 4;
                let expected = crc32fast::hash(&message.buf[..tlv_start]) ^ FINGERPRINT_XOR;
                let value = message.value_of(raw);
                let carried = u32::from_be_bytes([value[0], value[1], value[2], value[3]]);
                expected == carried
            }
            _ => true,
        }
    }

    /// Parse a datagram into an owned message.
    ///
    /// Copies the datagram into the message's buffer and walks the attribute
    /// section with bounds checks, recording a descriptor per record. Bytes
    /// past the declared attribute section are ignored.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < HEADER_SIZE {
            return Err(DecodeError::TooShort {
                expected: HEADER_SIZE,
                actual: bytes.len(),
            });
        }
        if u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) != MAGIC_COOKIE {
            return Err(DecodeError::InvalidMagicCookie);
        }
        let declared = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;
        if HEADER_SIZE + declared > MAX_MESSAGE_SIZE {
            return Err(DecodeError::Oversized(declared));
        }
        if declared % 4 != 0 {
            return Err(DecodeError::Unaligned(declared));
        }
        if HEADER_SIZE + declared > bytes.len() {
            return Err(DecodeError::TooShort {
                expected: HEADER_SIZE + declared,
                actual: bytes.len(),
            });
        }

        let end = HEADER_SIZE + declared;
        let buf = bytes[..end].to_vec();
        let mut attrs = Vec::new();
        let mut offset = HEADER_SIZE;
        while offset < end {
            if offset + 4 > end {
                return Err(DecodeError::TruncatedAttribute { offset });
            }
            let attr_type = u16::from_be_bytes([buf[offset], buf[offset + 1]]);
            let len = u16::from_be_bytes([buf[offset + 2], buf[offset + 3]]) as usize;
            if offset + 4 + len > end {
                return Err(DecodeError::TruncatedAttribute { offset });
            }
            attrs.push(RawAttribute {
                attr_type,
                offset: offset + 4,
                len,
            });
            offset = (offset + 4 + len + 3) & !3;
        }

        Ok(Self { buf, attrs })
    }

    /// Message type field from the header
    #[must_use]
    pub fn message_type(&self) -> u16 {
        u16::from_be_bytes([self.buf[0], self.buf[1]])
    }

    /// Transaction ID from the header
    #[must_use]
    pub fn transaction_id(&self) -> TransactionId {
        let mut bytes = [0u8; 12];
        bytes.copy_from_slice(&self.buf[8..20]);
        TransactionId::from_bytes(bytes)
    }

    /// Complete wire bytes of the message
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Number of attribute records
    #[must_use]
    pub fn attribute_count(&self) -> usize {
        self.attrs.len()
    }

    /// Append an attribute, padding its value to a 4-byte boundary.
    ///
    /// Fails with [`EncodeError::BufferFull`] when the record would exceed
    /// the fixed datagram budget; the message is left unchanged in that case.
    pub fn append<A: Attribute>(&mut self, attribute: &A) -> Result<(), EncodeError> {
        let value = attribute.encode_value();
        let padded = (value.len() + 3) & !3;
        if self.buf.len() + 4 + padded > MAX_MESSAGE_SIZE {
            return Err(EncodeError::BufferFull);
        }

        let offset = self.buf.len() + 4;
        self.buf.extend_from_slice(&A::TYPE.to_be_bytes());
        self.buf.extend_from_slice(&(value.len() as u16).to_be_bytes());
        self.buf.extend_from_slice(&value);
        self.buf.resize(offset + padded, 0);
        self.attrs.push(RawAttribute {
            attr_type: A::TYPE,
            offset,
            len: value.len(),
        });
        self.set_length();
        Ok(())
    }

    /// Append a FINGERPRINT attribute covering everything before it.
    ///
    /// The header length field is set to count the FINGERPRINT record before
    /// the CRC-32 is computed, per the STUN fingerprint convention.
    pub fn append_fingerprint(&mut self) -> Result<(), EncodeError> {
        if self.buf.len() + 8 > MAX_MESSAGE_SIZE {
            return Err(EncodeError::BufferFull);
        }
        let final_len = (self.buf.len() - HEADER_SIZE + 8) as u16;
        self.buf[2..4].copy_from_slice(&final_len.to_be_bytes());
        let crc = crc32fast::hash(&self.buf) ^ FINGERPRINT_XOR;
        self.append(&attr::Fingerprint(crc))
    }

    /// Find the first attribute of type `A`
    #[must_use]
    pub fn find_one<A: Attribute>(&self) -> Option<A> {
        self.attrs
            .iter()
            .find(|raw| raw.attr_type == A::TYPE)
            .and_then(|raw| A::decode(self.value_of(raw)))
    }

    /// Find the first attributes of two distinct types in a single pass.
    ///
    /// Short-circuits once both slots are filled. Requesting the same type
    /// twice is rejected at compile time.
    #[must_use]
    pub fn find2<A: Attribute, B: Attribute>(&self) -> (Option<A>, Option<B>) {
        const {
            assert!(A::TYPE != B::TYPE, "requested attribute types must be distinct");
        }
        let mut a = None;
        let mut b = None;
        for raw in &self.attrs {
            if a.is_none() && raw.attr_type == A::TYPE {
                a = A::decode(self.value_of(raw));
            } else if b.is_none() && raw.attr_type == B::TYPE {
                b = B::decode(self.value_of(raw));
            }
            if a.is_some() && b.is_some() {
                break;
            }
        }
        (a, b)
    }

    /// Iterate over raw attribute records as `(type, value bytes)`
    pub fn raw_attributes(&self) -> impl Iterator<Item = (u16, &[u8])> {
        self.attrs.iter().map(|raw| (raw.attr_type, self.value_of(raw)))
    }

    fn value_of(&self, raw: &RawAttribute) -> &[u8] {
        &self.buf[raw.offset..raw.offset + raw.len]
    }

    fn set_length(&mut self) {
        let len = (self.buf.len() - HEADER_SIZE) as u16;
        self.buf[2..4].copy_from_slice(&len.to_be_bytes());
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "STUN message: type {:#06x}, length {}, transaction {}",
            self.message_type(),
            self.buf.len() - HEADER_SIZE,
            self.transaction_id()
        )?;
        for raw in &self.attrs {
            let value = self.value_of(raw);
            match raw.attr_type {
                attr::MAPPED_ADDRESS => match attr::MappedAddress::decode(value) {
                    Some(a) => writeln!(f, "  MAPPED-ADDRESS: {}", a.0)?,
                    None => writeln!(f, "  MAPPED-ADDRESS: <malformed>")?,
                },
                attr::XOR_MAPPED_ADDRESS => match attr::XorMappedAddress::decode(value) {
                    Some(a) => writeln!(f, "  XOR-MAPPED-ADDRESS: {}", a.0)?,
                    None => writeln!(f, "  XOR-MAPPED-ADDRESS: <malformed>")?,
                },
                attr::RESPONSE_ORIGIN => match attr::ResponseOrigin::decode(value) {
                    Some(a) => writeln!(f, "  RESPONSE-ORIGIN: {}", a.0)?,
                    None => writeln!(f, "  RESPONSE-ORIGIN: <malformed>")?,
                },
                attr::OTHER_ADDRESS => match attr::OtherAddress::decode(value) {
                    Some(a) => writeln!(f, "  OTHER-ADDRESS: {}", a.0)?,
                    None => writeln!(f, "  OTHER-ADDRESS: <malformed>")?,
                },
                attr::CHANGE_REQUEST => match attr::ChangeRequest::decode(value) {
                    Some(a) => writeln!(
                        f,
                        "  CHANGE-REQUEST: ip={} port={}",
                        a.change_ip(),
                        a.change_port()
                    )?,
                    None => writeln!(f, "  CHANGE-REQUEST: <malformed>")?,
                },
                attr::RESPONSE_PORT => match attr::ResponsePort::decode(value) {
                    Some(a) => writeln!(f, "  RESPONSE-PORT: {}", a.0)?,
                    None => writeln!(f, "  RESPONSE-PORT: <malformed>")?,
                },
                attr::ERROR_CODE => match attr::ErrorCode::decode(value) {
                    Some(a) => writeln!(
                        f,
                        "  ERROR-CODE: {:#06x} reason '{}'",
                        a.code(),
                        a.reason()
                    )?,
                    None => writeln!(f, "  ERROR-CODE: <malformed>")?,
                },
                attr::SOFTWARE => match attr::Software::decode(value) {
                    Some(a) => writeln!(f, "  SOFTWARE: {}", a.0)?,
                    None => writeln!(f, "  SOFTWARE: <malformed>")?,
                },
                attr::FINGERPRINT => match attr::Fingerprint::decode(value) {
                    Some(a) => writeln!(f, "  FINGERPRINT: {:#010x}", a.0)?,
                    None => writeln!(f, "  FINGERPRINT: <malformed>")?,
                },
                other => writeln!(
                    f,
                    "  unknown attribute {:#06x}: {} bytes",
                    other,
                    value.len()
                )?,
            }
        }
        Ok(())
    }
}
