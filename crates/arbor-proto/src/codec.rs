//! Field readers and writers shared by the packet types.
//!
//! Readers check the remaining length before every access and advance the
//! slice past what they consumed. Writers append to a frame payload and fail
//! with [`ProtocolError::FrameTooLarge`] instead of truncating.

use bytes::Buf;

use crate::{
    Frame,
    errors::{ProtocolError, Result},
};

pub(crate) fn read_u8(buf: &mut &[u8], field: &'static str) -> Result<u8> {
    if buf.remaining() < 1 {
        return Err(ProtocolError::Malformed { field });
    }
    Ok(buf.get_u8())
}

pub(crate) fn read_u16(buf: &mut &[u8], field: &'static str) -> Result<u16> {
    if buf.remaining() < 2 {
        return Err(ProtocolError::Malformed { field });
    }
    Ok(buf.get_u16())
}

/// u16 length-prefixed byte string (MQTT "binary data")
pub(crate) fn read_bytes<'a>(buf: &mut &'a [u8], field: &'static str) -> Result<&'a [u8]> {
    let len = usize::from(read_u16(buf, field)?);
    take(buf, len, field)
}

/// u16 length-prefixed UTF-8 string
pub(crate) fn read_str<'a>(buf: &mut &'a [u8], field: &'static str) -> Result<&'a str> {
    let bytes = read_bytes(buf, field)?;
    std::str::from_utf8(bytes).map_err(|_| ProtocolError::InvalidUtf8 { field })
}

pub(crate) fn take<'a>(buf: &mut &'a [u8], len: usize, field: &'static str) -> Result<&'a [u8]> {
    if buf.len() < len {
        return Err(ProtocolError::Malformed { field });
    }
    let slice: &'a [u8] = *buf;
    let (head, tail) = slice.split_at(len);
    *buf = tail;
    Ok(head)
}

pub(crate) fn write_u8(frame: &mut Frame, value: u8) -> Result<()> {
    frame.extend_payload(&[value])
}

pub(crate) fn write_u16(frame: &mut Frame, value: u16) -> Result<()> {
    frame.extend_payload(&value.to_be_bytes())
}

pub(crate) fn write_bytes(frame: &mut Frame, bytes: &[u8], field: &'static str) -> Result<()> {
    let len = u16::try_from(bytes.len()).map_err(|_| ProtocolError::FieldTooLong {
        field,
        len: bytes.len(),
        max: usize::from(u16::MAX),
    })?;
    write_u16(frame, len)?;
    frame.extend_payload(bytes)
}

pub(crate) fn write_str(frame: &mut Frame, value: &str, field: &'static str) -> Result<()> {
    write_bytes(frame, value.as_bytes(), field)
}

/// Fail unless `frame` carries the expected packet type.
pub(crate) fn expect_type(frame: &Frame, expected: crate::PacketType) -> Result<()> {
    let actual = frame.packet_type()?;
    if actual != expected {
        return Err(ProtocolError::UnexpectedPacketType {
            expected: expected.name(),
            actual: actual.name(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_str_checks_prefix_against_remaining() {
        let mut buf: &[u8] = &[0x00, 0x05, b'a', b'b'];
        assert_eq!(read_str(&mut buf, "topic"), Err(ProtocolError::Malformed { field: "topic" }));
    }

    #[test]
    fn read_str_advances_past_field() {
        let mut buf: &[u8] = &[0x00, 0x02, b'h', b'i', 0xFF];
        assert_eq!(read_str(&mut buf, "topic"), Ok("hi"));
        assert_eq!(buf, &[0xFF]);
    }

    #[test]
    fn read_str_rejects_invalid_utf8() {
        let mut buf: &[u8] = &[0x00, 0x01, 0xFF];
        assert_eq!(read_str(&mut buf, "topic"), Err(ProtocolError::InvalidUtf8 { field: "topic" }));
    }
}
