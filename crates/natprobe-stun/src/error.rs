//! Error types for the STUN codec.

use thiserror::Error;

/// Errors raised while appending attributes to a message
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    /// The attribute does not fit in the fixed message budget
    #[error("message buffer full: attribute does not fit in the 548-byte datagram budget")]
    BufferFull,
}

/// Errors raised while decoding a received datagram
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// Datagram shorter than required
    #[error("datagram too short: expected at least {expected} bytes, got {actual}")]
    TooShort {
        /// Minimum number of bytes required
        expected: usize,
        /// Bytes actually available
        actual: usize,
    },

    /// Header magic cookie mismatch
    #[error("invalid magic cookie")]
    InvalidMagicCookie,

    /// Declared attribute section exceeds the maximum datagram size
    #[error("declared attribute section of {0} bytes exceeds the maximum datagram size")]
    Oversized(usize),

    /// Declared attribute section is not 4-byte aligned
    #[error("declared attribute section of {0} bytes is not a multiple of 4")]
    Unaligned(usize),

    /// An attribute record runs past the end of the attribute section
    #[error("truncated attribute at offset {offset}")]
    TruncatedAttribute {
        /// Byte offset of the offending record
        offset: usize,
    },
}
