//! Variable-length "remaining length" field.
//!
//! Seven data bits per byte, least significant group first, high bit set on
//! every byte except the last. At most four bytes, so the largest value is
//! 268,435,455.

use bytes::BufMut;

use crate::errors::{ProtocolError, Result};

/// Largest value a four-byte field can carry
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

/// Maximum number of bytes in the field
pub const MAX_LENGTH_BYTES: usize = 4;

const CONTINUATION: u8 = 0x80;

/// Number of bytes needed to encode `value`.
pub fn encoded_len(value: usize) -> usize {
    match value {
        0..=127 => 1,
        128..=16_383 => 2,
        16_384..=2_097_151 => 3,
        _ => 4,
    }
}

/// Encode `value` into `dst`.
///
/// # Errors
///
/// [`ProtocolError::FrameTooLarge`] when `value` exceeds
/// [`MAX_REMAINING_LENGTH`].
pub fn encode(mut value: usize, dst: &mut impl BufMut) -> Result<()> {
    if value > MAX_REMAINING_LENGTH {
        return Err(ProtocolError::FrameTooLarge { size: value, max: MAX_REMAINING_LENGTH });
    }
    loop {
        #[allow(clippy::cast_possible_truncation)]
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value > 0 {
            byte |= CONTINUATION;
        }
        dst.put_u8(byte);
        if value == 0 {
            return Ok(());
        }
    }
}

/// Decode a complete field from the front of `bytes`.
///
/// Returns the value and the number of bytes consumed, or `Ok(None)` when
/// `bytes` ends mid-field.
///
/// # Errors
///
/// [`ProtocolError::RemainingLengthOverflow`] when the fourth byte still has
/// its continuation bit set.
pub fn decode(bytes: &[u8]) -> Result<Option<(usize, usize)>> {
    let mut accumulator = Accumulator::default();
    for (index, &byte) in bytes.iter().enumerate() {
        if let Some(value) = accumulator.push(byte)? {
            return Ok(Some((value, index + 1)));
        }
    }
    Ok(None)
}

/// Incremental decoder state, fed one byte at a time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Accumulator {
    value: usize,
    count: usize,
}

impl Accumulator {
    /// Feed one byte. `Ok(Some(value))` once the final byte has arrived.
    ///
    /// A byte arriving after four continuation bytes is consumed and rejected.
    pub(crate) fn push(&mut self, byte: u8) -> Result<Option<usize>> {
        if self.count == MAX_LENGTH_BYTES {
            return Err(ProtocolError::RemainingLengthOverflow);
        }
        self.value |= usize::from(byte & 0x7F) << (7 * self.count);
        self.count += 1;
        if byte & CONTINUATION == 0 {
            return Ok(Some(self.value));
        }
        Ok(None)
    }
}
