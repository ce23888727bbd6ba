//! PUBLISH packet.
//!
//! Arbor carries all RPC traffic inside PUBLISH frames: the topic holds the
//! directional marker and destination path, the payload holds the RPC
//! envelope. Protocol-native clients publish plain topics.

use crate::{
    Frame, PacketType,
    codec::{expect_type, read_str, read_u16, write_str, write_u16},
    errors::{ProtocolError, Result},
    flags::{HeaderFlags, QoS},
};

/// Application message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Publish<'a> {
    /// Topic name
    pub topic: &'a str,
    /// Packet identifier, present iff `qos` is above [`QoS::AtMostOnce`]
    pub packet_id: Option<u16>,
    /// Application payload
    pub payload: &'a [u8],
    /// Delivery class
    pub qos: QoS,
    /// Retain flag
    pub retain: bool,
    /// Redelivery flag
    pub dup: bool,
}

impl<'a> Publish<'a> {
    /// QoS 0, non-retained publish
    #[must_use]
    pub const fn new(topic: &'a str, payload: &'a [u8]) -> Self {
        Self { topic, packet_id: None, payload, qos: QoS::AtMostOnce, retain: false, dup: false }
    }

    /// Read a PUBLISH from `frame`.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::InvalidQos`] for QoS bits `0b11`
    /// - [`ProtocolError::Malformed`] for a truncated topic or packet id
    pub fn from_frame(frame: &'a Frame) -> Result<Self> {
        expect_type(frame, PacketType::Publish)?;
        let flags = frame.flags();
        let qos = flags.qos()?;

        let mut buf = frame.payload();
        let topic = read_str(&mut buf, "topic")?;
        let packet_id = match qos {
            QoS::AtMostOnce => None,
            QoS::AtLeastOnce | QoS::ExactlyOnce => Some(read_u16(&mut buf, "packet id")?),
        };

        Ok(Self {
            topic,
            packet_id,
            payload: buf,
            qos,
            retain: flags.contains(HeaderFlags::RETAIN),
            dup: flags.contains(HeaderFlags::DUP),
        })
    }

    /// Encode into a new frame.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::Malformed`] when `qos` and `packet_id` disagree
    /// - [`ProtocolError::FrameTooLarge`] when topic and payload do not fit
    pub fn to_frame(&self) -> Result<Frame> {
        let mut flags = HeaderFlags::empty().with_qos(self.qos);
        flags.set(HeaderFlags::RETAIN, self.retain);
        flags.set(HeaderFlags::DUP, self.dup);

        let mut frame = Frame::empty(PacketType::Publish.header_byte() | flags.to_byte());
        write_str(&mut frame, self.topic, "topic")?;
        match (self.qos, self.packet_id) {
            (QoS::AtMostOnce, None) => {},
            (QoS::AtLeastOnce | QoS::ExactlyOnce, Some(id)) => write_u16(&mut frame, id)?,
            _ => return Err(ProtocolError::Malformed { field: "packet id" }),
        }
        frame.extend_payload(self.payload)?;
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qos0_publish_round_trip() {
        let publish = Publish::new("sensors/temp", b"21.5");
        let frame = publish.to_frame().unwrap();
        assert_eq!(frame.header(), 0x30);
        assert_eq!(Publish::from_frame(&frame), Ok(publish));
    }

    #[test]
    fn qos1_publish_carries_packet_id() {
        let publish = Publish {
            packet_id: Some(0x1234),
            qos: QoS::AtLeastOnce,
            retain: true,
            ..Publish::new("a", b"")
        };
        let frame = publish.to_frame().unwrap();
        assert_eq!(frame.header(), 0x33);
        assert_eq!(frame.payload(), &[0x00, 0x01, b'a', 0x12, 0x34]);
        assert_eq!(Publish::from_frame(&frame), Ok(publish));
    }

    #[test]
    fn packet_id_must_match_qos() {
        let publish = Publish { packet_id: Some(1), ..Publish::new("a", b"") };
        assert_eq!(publish.to_frame(), Err(ProtocolError::Malformed { field: "packet id" }));
    }

    #[test]
    fn truncated_packet_id_is_malformed() {
        let frame = Frame::new(0x32, &[0x00, 0x01, b'a', 0x12]).unwrap();
        assert_eq!(Publish::from_frame(&frame), Err(ProtocolError::Malformed { field: "packet id" }));
    }

    #[test]
    fn reserved_qos_is_rejected() {
        let frame = Frame::new(0x36, &[0x00, 0x01, b'a']).unwrap();
        assert_eq!(Publish::from_frame(&frame), Err(ProtocolError::InvalidQos(3)));
    }
}
