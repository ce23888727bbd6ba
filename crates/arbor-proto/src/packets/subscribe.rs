//! SUBSCRIBE and SUBACK packets.

use crate::{
    Frame, PacketType,
    codec::{expect_type, read_str, read_u8, read_u16, write_str, write_u8, write_u16},
    errors::{ProtocolError, Result},
    flags::QoS,
};

/// Most topic filters accepted in one SUBSCRIBE
pub const MAX_SUBSCRIBE_FILTERS: usize = 8;

const SUBACK_FAILURE: u8 = 0x80;

/// Subscription request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscribe<'a> {
    /// Packet identifier echoed in the SUBACK
    pub packet_id: u16,
    /// Requested `(filter, maximum QoS)` pairs, never empty
    pub filters: heapless::Vec<(&'a str, QoS), MAX_SUBSCRIBE_FILTERS>,
}

impl<'a> Subscribe<'a> {
    /// Read a SUBSCRIBE from `frame`.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::Malformed`] for a missing packet id, an empty filter
    ///   list, or a truncated filter
    /// - [`ProtocolError::FieldTooLong`] for more than
    ///   [`MAX_SUBSCRIBE_FILTERS`] filters
    pub fn from_frame(frame: &'a Frame) -> Result<Self> {
        expect_type(frame, PacketType::Subscribe)?;
        let mut buf = frame.payload();
        let packet_id = read_u16(&mut buf, "packet id")?;

        let mut filters = heapless::Vec::new();
        while !buf.is_empty() {
            let filter = read_str(&mut buf, "topic filter")?;
            let qos = QoS::from_bits(read_u8(&mut buf, "requested qos")? & 0x03)?;
            filters.push((filter, qos)).map_err(|_| ProtocolError::FieldTooLong {
                field: "topic filters",
                len: MAX_SUBSCRIBE_FILTERS + 1,
                max: MAX_SUBSCRIBE_FILTERS,
            })?;
        }
        if filters.is_empty() {
            return Err(ProtocolError::Malformed { field: "topic filters" });
        }

        Ok(Self { packet_id, filters })
    }

    /// Encode into a new frame
    pub fn to_frame(&self) -> Result<Frame> {
        let mut frame = Frame::empty(PacketType::Subscribe.header_byte());
        write_u16(&mut frame, self.packet_id)?;
        for (filter, qos) in &self.filters {
            write_str(&mut frame, filter, "topic filter")?;
            write_u8(&mut frame, *qos as u8)?;
        }
        Ok(frame)
    }
}

/// Per-filter outcome reported in a SUBACK
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubAckReturn {
    /// Subscription accepted at this QoS
    Granted(QoS),
    /// Subscription refused
    Failure,
}

impl SubAckReturn {
    fn to_byte(self) -> u8 {
        match self {
            Self::Granted(qos) => qos as u8,
            Self::Failure => SUBACK_FAILURE,
        }
    }

    fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            SUBACK_FAILURE => Ok(Self::Failure),
            other => QoS::from_bits(other).map(Self::Granted),
        }
    }
}

/// Subscription acknowledgment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubAck {
    /// Packet identifier of the SUBSCRIBE being answered
    pub packet_id: u16,
    /// One entry per requested filter, in request order
    pub returns: heapless::Vec<SubAckReturn, MAX_SUBSCRIBE_FILTERS>,
}

impl SubAck {
    /// Read a SUBACK from `frame`
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        expect_type(frame, PacketType::SubAck)?;
        let mut buf = frame.payload();
        let packet_id = read_u16(&mut buf, "packet id")?;
        if buf.is_empty() || buf.len() > MAX_SUBSCRIBE_FILTERS {
            return Err(ProtocolError::Malformed { field: "suback returns" });
        }

        let mut returns = heapless::Vec::new();
        for &byte in buf {
            // Length checked above.
            let _ = returns.push(SubAckReturn::from_byte(byte)?);
        }
        Ok(Self { packet_id, returns })
    }

    /// Encode into a new frame
    pub fn to_frame(&self) -> Result<Frame> {
        let mut frame = Frame::empty(PacketType::SubAck.header_byte());
        write_u16(&mut frame, self.packet_id)?;
        for ret in &self.returns {
            write_u8(&mut frame, ret.to_byte())?;
        }
        Ok(frame)
    }
}
