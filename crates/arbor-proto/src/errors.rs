//! Error types for the arbor wire format.
//!
//! All errors are structured, testable, and provide actionable information.

use thiserror::Error;

/// Protocol-level errors raised while framing or decoding packets.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    // Framing errors
    /// Remaining-length field used more than four bytes
    #[error("remaining length overflow: continuation chain longer than 4 bytes")]
    RemainingLengthOverflow,

    /// Declared payload does not fit the fixed frame buffer
    #[error("frame too large: {size} bytes exceeds capacity {max}")]
    FrameTooLarge {
        /// Declared payload size
        size: usize,
        /// Frame buffer capacity
        max: usize,
    },

    /// Destination buffer cannot hold the encoded frame
    #[error("buffer too small: need {needed} bytes, {available} available")]
    BufferTooSmall {
        /// Bytes required
        needed: usize,
        /// Bytes available in the destination
        available: usize,
    },

    /// Header byte names a reserved or unknown packet type
    #[error("invalid packet type: {0}")]
    InvalidPacketType(u8),

    // Packet errors
    /// Frame carries a different packet type than the accessor expects
    #[error("unexpected packet type: expected {expected}, got {actual}")]
    UnexpectedPacketType {
        /// Packet type the accessor decodes
        expected: &'static str,
        /// Packet type found in the header
        actual: &'static str,
    },

    /// A field is present but truncated or otherwise inconsistent
    #[error("malformed {field}")]
    Malformed {
        /// Name of the offending field
        field: &'static str,
    },

    /// A string field is not valid UTF-8
    #[error("invalid utf-8 in {field}")]
    InvalidUtf8 {
        /// Name of the offending field
        field: &'static str,
    },

    /// A field exceeds the length its prefix can express
    #[error("{field} too long: {len} bytes exceeds {max}")]
    FieldTooLong {
        /// Name of the offending field
        field: &'static str,
        /// Actual length
        len: usize,
        /// Maximum length
        max: usize,
    },

    /// QoS bits hold the reserved value 3
    #[error("invalid qos: {0}")]
    InvalidQos(u8),
}

/// Convenient Result type alias for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;
