//! MQTT control packet types.
//!
//! The packet type occupies the high nibble of a frame's first byte. Values 0
//! and 15 are reserved in MQTT 3.1.1 and are rejected.

use crate::errors::{ProtocolError, Result};

/// Control packet type carried in the high nibble of the header byte.
///
/// # Representation
///
/// The `#[repr(u8)]` discriminants are the on-wire nibble values.
/// [`PacketType::from_header`] returns an error for reserved values rather
/// than panicking; callers decide whether to drop or log the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// Client request to connect
    Connect = 1,
    /// Connect acknowledgment
    ConnAck = 2,
    /// Publish message
    Publish = 3,
    /// Publish acknowledgment (QoS 1)
    PubAck = 4,
    /// Publish received (QoS 2, part 1)
    PubRec = 5,
    /// Publish release (QoS 2, part 2)
    PubRel = 6,
    /// Publish complete (QoS 2, part 3)
    PubComp = 7,
    /// Subscribe request
    Subscribe = 8,
    /// Subscribe acknowledgment
    SubAck = 9,
    /// Unsubscribe request
    Unsubscribe = 10,
    /// Unsubscribe acknowledgment
    UnsubAck = 11,
    /// Keepalive request
    PingReq = 12,
    /// Keepalive response
    PingResp = 13,
    /// Client is disconnecting
    Disconnect = 14,
}

impl PacketType {
    /// Decode the packet type from a full header byte.
    pub fn from_header(header: u8) -> Result<Self> {
        let nibble = header >> 4;
        Ok(match nibble {
            1 => Self::Connect,
            2 => Self::ConnAck,
            3 => Self::Publish,
            4 => Self::PubAck,
            5 => Self::PubRec,
            6 => Self::PubRel,
            7 => Self::PubComp,
            8 => Self::Subscribe,
            9 => Self::SubAck,
            10 => Self::Unsubscribe,
            11 => Self::UnsubAck,
            12 => Self::PingReq,
            13 => Self::PingResp,
            14 => Self::Disconnect,
            _ => return Err(ProtocolError::InvalidPacketType(nibble)),
        })
    }

    /// Header byte for this type with the flag bits MQTT 3.1.1 mandates.
    ///
    /// PUBLISH flags vary per message and are zero here; PUBREL, SUBSCRIBE and
    /// UNSUBSCRIBE must carry `0b0010`.
    pub fn header_byte(self) -> u8 {
        let flags = match self {
            Self::PubRel | Self::Subscribe | Self::Unsubscribe => 0x02,
            _ => 0x00,
        };
        ((self as u8) << 4) | flags
    }

    /// Short uppercase name, as used in logs and errors.
    pub fn name(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::ConnAck => "CONNACK",
            Self::Publish => "PUBLISH",
            Self::PubAck => "PUBACK",
            Self::PubRec => "PUBREC",
            Self::PubRel => "PUBREL",
            Self::PubComp => "PUBCOMP",
            Self::Subscribe => "SUBSCRIBE",
            Self::SubAck => "SUBACK",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::UnsubAck => "UNSUBACK",
            Self::PingReq => "PINGREQ",
            Self::PingResp => "PINGRESP",
            Self::Disconnect => "DISCONNECT",
        }
    }
}

impl std::fmt::Display for PacketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_byte_round_trips_through_from_header() {
        for nibble in 1u8..=14 {
            let packet_type = PacketType::from_header(nibble << 4).unwrap();
            assert_eq!(PacketType::from_header(packet_type.header_byte()).unwrap(), packet_type);
        }
    }

    #[test]
    fn reserved_nibbles_are_rejected() {
        assert_eq!(PacketType::from_header(0x00), Err(ProtocolError::InvalidPacketType(0)));
        assert_eq!(PacketType::from_header(0xF0), Err(ProtocolError::InvalidPacketType(15)));
    }

    #[test]
    fn subscribe_carries_mandatory_flags() {
        assert_eq!(PacketType::Subscribe.header_byte(), 0x82);
        assert_eq!(PacketType::PingReq.header_byte(), 0xC0);
        assert_eq!(PacketType::PingResp.header_byte(), 0xD0);
    }
}
