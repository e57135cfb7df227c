//! STUN attribute types.
//!
//! Each attribute knows its 16-bit type code, how to decode itself from a
//! value slice, and how to encode its value bytes. Padding to the 4-byte
//! boundary is handled by the message, not by individual attributes.

use crate::MAGIC_COOKIE;
use std::net::{Ipv4Addr, SocketAddrV4};

/// MAPPED-ADDRESS type code
pub const MAPPED_ADDRESS: u16 = 0x0001;
/// CHANGE-REQUEST type code
pub const CHANGE_REQUEST: u16 = 0x0003;
/// ERROR-CODE type code
pub const ERROR_CODE: u16 = 0x0009;
/// XOR-MAPPED-ADDRESS type code
pub const XOR_MAPPED_ADDRESS: u16 = 0x0020;
/// RESPONSE-PORT type code
pub const RESPONSE_PORT: u16 = 0x0027;
/// SOFTWARE type code
pub const SOFTWARE: u16 = 0x8022;
/// FINGERPRINT type code
pub const FINGERPRINT: u16 = 0x8028;
/// RESPONSE-ORIGIN type code
pub const RESPONSE_ORIGIN: u16 = 0x802B;
/// OTHER-ADDRESS type code
pub const OTHER_ADDRESS: u16 = 0x802C;

/// IPv4 address family byte in address attribute bodies
const FAMILY_IPV4: u8 = 0x01;

/// A typed STUN attribute.
///
/// `decode` receives exactly the value bytes recorded for the attribute
/// (padding excluded) and returns `None` if they do not form a well-formed
/// value of this type.
pub trait Attribute: Sized {
    /// 16-bit attribute type code
    const TYPE: u16;

    /// Decode the attribute from its value bytes
    fn decode(value: &[u8]) -> Option<Self>;

    /// Encode the attribute value bytes (unpadded)
    fn encode_value(&self) -> Vec<u8>;
}

fn encode_address(addr: &SocketAddrV4, xor: bool) -> Vec<u8> {
    let mut port = addr.port();
    let mut ip = u32::from(*addr.ip());
    if xor {
        port ^= (MAGIC_COOKIE >> 16) as u16;
        ip ^= MAGIC_COOKIE;
    }
    let mut value = Vec::with_capacity(8);
    value.push(0);
    value.push(FAMILY_IPV4);
    value.extend_from_slice(&port.to_be_bytes());
    value.extend_from_slice(&ip.to_be_bytes());
    value
}

fn decode_address(value: &[u8], xor: bool) -> Option<SocketAddrV4> {
    if value.len() < 8 || value[1] != FAMILY_IPV4 {
        return None;
    }
    let mut port = u16::from_be_bytes([value[2], value[3]]);
    let mut ip = u32::from_be_bytes([value[4], value[5], value[6], value[7]]);
    if xor {
        port ^= (MAGIC_COOKIE >> 16) as u16;
        ip ^= MAGIC_COOKIE;
    }
    Some(SocketAddrV4::new(Ipv4Addr::from(ip), port))
}

/// MAPPED-ADDRESS: the sender's address as seen by the server, in the clear
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedAddress(pub SocketAddrV4);

impl Attribute for MappedAddress {
    const TYPE: u16 = MAPPED_ADDRESS;

    fn decode(value: &[u8]) -> Option<Self> {
        decode_address(value, false).map(Self)
    }

    fn encode_value(&self) -> Vec<u8> {
        encode_address(&self.0, false)
    }
}

/// XOR-MAPPED-ADDRESS: the mapped address obfuscated with the magic cookie
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XorMappedAddress(pub SocketAddrV4);

impl Attribute for XorMappedAddress {
    const TYPE: u16 = XOR_MAPPED_ADDRESS;

    fn decode(value: &[u8]) -> Option<Self> {
        decode_address(value, true).map(Self)
    }

    fn encode_value(&self) -> Vec<u8> {
        encode_address(&self.0, true)
    }
}

/// OTHER-ADDRESS: the server's alternate address/port for behavior tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OtherAddress(pub SocketAddrV4);

impl Attribute for OtherAddress {
    const TYPE: u16 = OTHER_ADDRESS;

    fn decode(value: &[u8]) -> Option<Self> {
        decode_address(value, false).map(Self)
    }

    fn encode_value(&self) -> Vec<u8> {
        encode_address(&self.0, false)
    }
}

/// RESPONSE-ORIGIN: the address the server sent its response from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseOrigin(pub SocketAddrV4);

impl Attribute for ResponseOrigin {
    const TYPE: u16 = RESPONSE_ORIGIN;

    fn decode(value: &[u8]) -> Option<Self> {
        decode_address(value, false).map(Self)
    }

    fn encode_value(&self) -> Vec<u8> {
        encode_address(&self.0, false)
    }
}

/// CHANGE-REQUEST: asks the server to respond from its alternate IP and/or port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeRequest {
    flags: u32,
}

impl ChangeRequest {
    /// Flag bit requesting a response from the alternate IP
    pub const CHANGE_IP: u32 = 0x04;
    /// Flag bit requesting a response from the alternate port
    pub const CHANGE_PORT: u32 = 0x02;

    /// Request a response from the alternate IP and alternate port
    #[must_use]
    pub fn ip_and_port() -> Self {
        Self {
            flags: Self::CHANGE_IP | Self::CHANGE_PORT,
        }
    }

    /// Request a response from the alternate port only
    #[must_use]
    pub fn port_only() -> Self {
        Self {
            flags: Self::CHANGE_PORT,
        }
    }

    /// Whether the change-IP flag is set
    #[must_use]
    pub fn change_ip(&self) -> bool {
        self.flags & Self::CHANGE_IP != 0
    }

    /// Whether the change-port flag is set
    #[must_use]
    pub fn change_port(&self) -> bool {
        self.flags & Self::CHANGE_PORT != 0
    }
}

impl Attribute for ChangeRequest {
    const TYPE: u16 = CHANGE_REQUEST;

    fn decode(value: &[u8]) -> Option<Self> {
        if value.len() < 4 {
            return None;
        }
        let flags = u32::from_be_bytes([value[0], value[1], value[2], value[3]]);
        Some(Self { flags })
    }

    fn encode_value(&self) -> Vec<u8> {
        self.flags.to_be_bytes().to_vec()
    }
}

/// RESPONSE-PORT: asks the server to send its response to an alternate port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponsePort(pub u16);

impl Attribute for ResponsePort {
    const TYPE: u16 = RESPONSE_PORT;

    fn decode(value: &[u8]) -> Option<Self> {
        if value.len() < 2 {
            return None;
        }
        Some(Self(u16::from_be_bytes([value[0], value[1]])))
    }

    fn encode_value(&self) -> Vec<u8> {
        self.0.to_be_bytes().to_vec()
    }
}

/// SOFTWARE: free-text description of the sending agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Software(pub String);

impl Attribute for Software {
    const TYPE: u16 = SOFTWARE;

    fn decode(value: &[u8]) -> Option<Self> {
        Some(Self(String::from_utf8_lossy(value).into_owned()))
    }

    fn encode_value(&self) -> Vec<u8> {
        self.0.as_bytes().to_vec()
    }
}

/// FINGERPRINT: CRC-32 of the preceding message bytes, XORed with 0x5354554E
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint(pub u32);

impl Attribute for Fingerprint {
    const TYPE: u16 = FINGERPRINT;

    fn decode(value: &[u8]) -> Option<Self> {
        if value.len() != 4 {
            return None;
        }
        Some(Self(u32::from_be_bytes([
            value[0], value[1], value[2], value[3],
        ])))
    }

    fn encode_value(&self) -> Vec<u8> {
        self.0.to_be_bytes().to_vec()
    }
}

/// ERROR-CODE: numeric code plus either reason text or, for error 420, the
/// list of 16-bit attribute codes the server did not understand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorCode {
    code: u16,
    detail: Vec<u8>,
}

impl ErrorCode {
    /// Build an error with a reason string
    #[must_use]
    pub fn new(code: u16, reason: &str) -> Self {
        Self {
            code,
            detail: reason.as_bytes().to_vec(),
        }
    }

    /// Build an error-420 response listing the offending attribute codes
    #[must_use]
    pub fn for_unknown_attributes(codes: &[u16]) -> Self {
        let mut detail = Vec::with_capacity(codes.len() * 2);
        for code in codes {
            detail.extend_from_slice(&code.to_be_bytes());
        }
        Self {
            code: crate::ERROR_UNKNOWN_ATTRIBUTE,
            detail,
        }
    }

    /// Numeric error code
    #[must_use]
    pub fn code(&self) -> u16 {
        self.code
    }

    /// Reason text (lossy UTF-8 of the detail bytes)
    #[must_use]
    pub fn reason(&self) -> String {
        String::from_utf8_lossy(&self.detail).into_owned()
    }

    /// Detail bytes read as a list of 16-bit attribute codes (error 420)
    #[must_use]
    pub fn unknown_attribute_codes(&self) -> Vec<u16> {
        self.detail
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect()
    }
}

impl Attribute for ErrorCode {
    const TYPE: u16 = ERROR_CODE;

    fn decode(value: &[u8]) -> Option<Self> {
        if value.len() < 4 {
            return None;
        }
        Some(Self {
            code: u16::from_be_bytes([value[2], value[3]]),
            detail: value[4..].to_vec(),
        })
    }

    fn encode_value(&self) -> Vec<u8> {
        let mut value = Vec::with_capacity(4 + self.detail.len());
        value.extend_from_slice(&[0, 0]);
        value.extend_from_slice(&self.code.to_be_bytes());
        value.extend_from_slice(&self.detail);
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xor_mapped_address_roundtrip() {
        let addr = SocketAddrV4::new(Ipv4Addr::new(192, 0, 2, 1), 32853);
        let encoded = XorMappedAddress(addr).encode_value();
        assert_eq!(encoded.len(), 8);
        assert_eq!(encoded[1], FAMILY_IPV4);

        let decoded = XorMappedAddress::decode(&encoded).unwrap();
        assert_eq!(decoded.0, addr);
    }

    #[test]
    fn xor_mapped_address_is_obfuscated() {
        let addr = SocketAddrV4::new(Ipv4Addr::new(203, 0, 113, 9), 4242);
        let plain = MappedAddress(addr).encode_value();
        let xored = XorMappedAddress(addr).encode_value();
        assert_ne!(plain[2..], xored[2..]);

        // XOR with the cookie's top bits recovers the clear port
        let x_port = u16::from_be_bytes([xored[2], xored[3]]);
        assert_eq!(x_port ^ (MAGIC_COOKIE >> 16) as u16, addr.port());
    }

    #[test]
    fn mapped_address_rejects_wrong_family() {
        let addr = SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 1);
        let mut encoded = MappedAddress(addr).encode_value();
        encoded[1] = 0x02;
        assert!(MappedAddress::decode(&encoded).is_none());
    }

    #[test]
    fn change_request_flags() {
        let both = ChangeRequest::ip_and_port();
        assert!(both.change_ip());
        assert!(both.change_port());
        assert_eq!(both.encode_value(), vec![0, 0, 0, 0x06]);

        let port = ChangeRequest::port_only();
        assert!(!port.change_ip());
        assert!(port.change_port());
        assert_eq!(port.encode_value(), vec![0, 0, 0, 0x02]);

        let decoded = ChangeRequest::decode(&[0, 0, 0, 0x04]).unwrap();
        assert!(decoded.change_ip());
        assert!(!decoded.change_port());
    }

    #[test]
    fn response_port_roundtrip() {
        let encoded = ResponsePort(61000).encode_value();
        assert_eq!(encoded.len(), 2);
        assert_eq!(ResponsePort::decode(&encoded).unwrap(), ResponsePort(61000));
    }

    #[test]
    fn error_code_reason() {
        let err = ErrorCode::new(0x0400, "Bad Request");
        let encoded = err.encode_value();
        assert_eq!(&encoded[..2], &[0, 0]);

        let decoded = ErrorCode::decode(&encoded).unwrap();
        assert_eq!(decoded.code(), 0x0400);
        assert_eq!(decoded.reason(), "Bad Request");
    }

    #[test]
    fn error_code_unknown_attributes() {
        let err = ErrorCode::for_unknown_attributes(&[RESPONSE_PORT, CHANGE_REQUEST]);
        let decoded = ErrorCode::decode(&err.encode_value()).unwrap();
        assert_eq!(decoded.code(), crate::ERROR_UNKNOWN_ATTRIBUTE);
        assert_eq!(
            decoded.unknown_attribute_codes(),
            vec![RESPONSE_PORT, CHANGE_REQUEST]
        );
    }

    #[test]
    fn fingerprint_requires_exact_length() {
        assert!(Fingerprint::decode(&[1, 2, 3]).is_none());
        assert!(Fingerprint::decode(&[1, 2, 3, 4, 5]).is_none());
        assert_eq!(
            Fingerprint::decode(&[0x12, 0x34, 0x56, 0x78]).unwrap(),
            Fingerprint(0x1234_5678)
        );
    }

    #[test]
    fn software_lossy_utf8() {
        let decoded = Software::decode(&[0x61, 0xFF, 0x62]).unwrap();
        assert_eq!(decoded.0, "a\u{FFFD}b");
    }
}
