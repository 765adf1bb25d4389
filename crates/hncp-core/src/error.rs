//! Error types for HNCP core.

use thiserror::Error;

/// Errors produced while decoding TLV records.
///
/// Decoding errors are local to the record that caused them: records that
/// were already yielded by an iterator stay valid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TlvError {
    /// Fewer bytes remain than a TLV header needs.
    #[error("truncated header at offset {offset}: only {remaining} bytes remain")]
    TruncatedHeader { offset: usize, remaining: usize },

    /// The declared (padded) length runs past the end of the buffer.
    #[error("malformed record at offset {offset}: declared length {declared} exceeds {remaining} remaining bytes")]
    MalformedRecord {
        offset: usize,
        declared: usize,
        remaining: usize,
    },

    /// Sibling records are not in strictly ascending byte order.
    #[error("ordering violation at offset {offset}")]
    OrderingViolation { offset: usize },

    /// The record framed correctly but its payload does not match its type.
    #[error("invalid payload for type {ty}: {reason}")]
    InvalidPayload { ty: u16, reason: &'static str },

    /// A record of a different type was expected.
    #[error("unexpected record type: expected {expected}, got {got}")]
    UnexpectedType { expected: u16, got: u16 },

    /// A payload does not fit in the 16-bit length field.
    #[error("payload of {0} bytes does not fit in a TLV")]
    PayloadTooLarge(usize),
}

/// Errors produced while assembling an outbound buffer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// The encoded message would exceed the configured size limit.
    #[error("message of {len} bytes exceeds limit of {max} bytes")]
    MessageTooLarge { len: usize, max: usize },

    /// The buffer could not be allocated.
    #[error("out of memory reserving {0} bytes")]
    OutOfMemory(usize),

    #[error(transparent)]
    Tlv(#[from] TlvError),
}

/// Errors parsing identifiers and prefixes from text.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("invalid prefix: {0}")]
    Prefix(String),
}
