//! # natprobe STUN codec
//!
//! Binary codec for the STUN message format (RFC 5389 framing) as exercised
//! by NAT behavior discovery.
//!
//! This crate provides:
//! - Message construction with a random 96-bit transaction ID
//! - Bounds-checked TLV attribute parsing over an owned buffer
//! - Structural validation of received datagrams
//! - CRC-32 FINGERPRINT computation and verification
//!
//! Attribute bytes are never copied out of the message buffer during
//! decoding; typed accessors decode on demand from recorded descriptors.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod attr;
pub mod error;
pub mod message;

pub use attr::{
    Attribute, ChangeRequest, ErrorCode, Fingerprint, MappedAddress, OtherAddress, ResponseOrigin,
    ResponsePort, Software, XorMappedAddress,
};
pub use error::{DecodeError, EncodeError};
pub use message::{Message, TransactionId};

/// Magic cookie carried in every STUN message header (network byte order)
pub const MAGIC_COOKIE: u32 = 0x2112_A442;

/// Fixed STUN header size in bytes
pub const HEADER_SIZE: usize = 20;

/// Maximum STUN datagram size in bytes
pub const MAX_MESSAGE_SIZE: usize = 548;

/// Binding request message type (method 0x001, request class)
pub const BINDING_REQUEST: u16 = 0x0001;

/// Binding success response message type
pub const BINDING_SUCCESS: u16 = 0x0101;

/// Binding error response message type
pub const BINDING_ERROR: u16 = 0x0111;

/// XOR constant applied to the FINGERPRINT CRC-32
pub const FINGERPRINT_XOR: u32 = 0x5354_554E;

/// ERROR-CODE value signalling an unknown attribute (error 420)
pub const ERROR_UNKNOWN_ATTRIBUTE: u16 = 0x0420;
