//! Frame type combining the header byte and payload.
//!
//! A `Frame` is one complete, length-delimited unit read from or written to a
//! byte transport:
//! - 1 header byte (packet type nibble + flag nibble)
//! - the remaining-length field, derived from the payload on encode
//! - up to [`FRAME_CAPACITY`] payload bytes
//!
//! This is a pure data holder. For typed access see the [`packets`] module.
//!
//! [`packets`]: crate::packets

use bytes::BufMut;

use crate::{
    PacketType,
    errors::{ProtocolError, Result},
    flags::HeaderFlags,
    remaining_length,
};

/// Payload capacity of every frame buffer
pub const FRAME_CAPACITY: usize = 512;

/// Upper bound on the encoded size of any frame
pub const MAX_ENCODED_LEN: usize = 1 + remaining_length::MAX_LENGTH_BYTES + FRAME_CAPACITY;

/// Fixed-capacity protocol frame
///
/// # Invariants
///
/// - **Size Limit**: `payload.len() <= FRAME_CAPACITY`, enforced by the
///   `heapless::Vec` backing store. There is no way to construct an oversized
///   frame, so encoding never needs to re-check it.
///
/// - **Derived Length**: the remaining-length field is not stored. It is
///   computed from `payload.len()` on encode, so header and payload cannot
///   disagree.
///
/// # Security
///
/// A `Frame` guarantees structural validity only: a known-size payload behind
/// a header byte. It says nothing about whether the header names a valid
/// packet type or whether the payload parses; typed accessors check both.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    header: u8,
    payload: heapless::Vec<u8, FRAME_CAPACITY>,
}

impl Frame {
    /// Create a frame by copying `payload`.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::FrameTooLarge`] if `payload` exceeds
    /// [`FRAME_CAPACITY`].
    pub fn new(header: u8, payload: &[u8]) -> Result<Self> {
        let payload = heapless::Vec::from_slice(payload)
            .map_err(|()| ProtocolError::FrameTooLarge { size: payload.len(), max: FRAME_CAPACITY })?;
        Ok(Self { header, payload })
    }

    /// Create a frame with an empty payload.
    #[must_use]
    pub const fn empty(header: u8) -> Self {
        Self { header, payload: heapless::Vec::new() }
    }

    /// Raw header byte
    #[must_use]
    pub const fn header(&self) -> u8 {
        self.header
    }

    /// Overwrite the raw header byte
    pub fn set_header(&mut self, header: u8) {
        self.header = header;
    }

    /// Packet type named by the header byte
    pub fn packet_type(&self) -> Result<PacketType> {
        PacketType::from_header(self.header)
    }

    /// Flag nibble of the header byte
    #[must_use]
    pub const fn flags(&self) -> HeaderFlags {
        HeaderFlags::from_header(self.header)
    }

    /// Payload bytes
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Mutable payload buffer, bounded by [`FRAME_CAPACITY`]
    pub fn payload_mut(&mut self) -> &mut heapless::Vec<u8, FRAME_CAPACITY> {
        &mut self.payload
    }

    /// Append bytes to the payload.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::FrameTooLarge`] if the result would exceed
    /// [`FRAME_CAPACITY`]; the payload is left unchanged.
    pub fn extend_payload(&mut self, bytes: &[u8]) -> Result<()> {
        self.payload.extend_from_slice(bytes).map_err(|()| ProtocolError::FrameTooLarge {
            size: self.payload.len() + bytes.len(),
            max: FRAME_CAPACITY,
        })
    }

    /// Reset to the cleared state (header 0, no payload).
    pub fn clear(&mut self) {
        self.header = 0;
        self.payload.clear();
    }

    /// Number of bytes [`Frame::write_to`] will produce
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        1 + remaining_length::encoded_len(self.payload.len()) + self.payload.len()
    }

    /// Encode header, remaining length and payload into `dst`.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::BufferTooSmall`] if `dst` cannot take the whole frame.
    /// Nothing is written in that case.
    pub fn write_to(&self, dst: &mut impl BufMut) -> Result<()> {
        let needed = self.encoded_len();
        if dst.remaining_mut() < needed {
            return Err(ProtocolError::BufferTooSmall { needed, available: dst.remaining_mut() });
        }

        dst.put_u8(self.header);
        remaining_length::encode(self.payload.len(), dst)?;
        dst.put_slice(&self.payload);

        Ok(())
    }

    /// Decode one frame from the front of `bytes`.
    ///
    /// Returns the frame and the number of bytes consumed, or `Ok(None)` when
    /// `bytes` does not yet hold a complete frame. Streaming input should go
    /// through [`FrameDecoder`](crate::FrameDecoder) instead.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::RemainingLengthOverflow`] for a five-byte length
    /// - [`ProtocolError::FrameTooLarge`] when the declared length exceeds
    ///   [`FRAME_CAPACITY`]
    pub fn decode(bytes: &[u8]) -> Result<Option<(Self, usize)>> {
        let Some((&header, rest)) = bytes.split_first() else {
            return Ok(None);
        };
        let Some((len, len_bytes)) = remaining_length::decode(rest)? else {
            return Ok(None);
        };
        if len > FRAME_CAPACITY {
            return Err(ProtocolError::FrameTooLarge { size: len, max: FRAME_CAPACITY });
        }

        let start = 1 + len_bytes;
        let Some(payload) = bytes.get(start..start + len) else {
            return Ok(None);
        };

        Ok(Some((Self::new(header, payload)?, start + len)))
    }
}
