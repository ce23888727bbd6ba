//! Header and CONNECT flag bits.
//!
//! The low nibble of every header byte carries per-packet flags. Only PUBLISH
//! gives them meaning (DUP, QoS, RETAIN); other types use fixed values.

use bitflags::bitflags;

use crate::errors::{ProtocolError, Result};

bitflags! {
    /// Low-nibble flags of the fixed header (4 bits)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct HeaderFlags: u8 {
        /// Broker should retain this PUBLISH
        const RETAIN = 0b0000_0001;

        /// QoS bit 0
        const QOS_LOW = 0b0000_0010;

        /// QoS bit 1
        const QOS_HIGH = 0b0000_0100;

        /// Redelivery of an earlier PUBLISH
        const DUP = 0b0000_1000;
    }
}

impl HeaderFlags {
    /// Both QoS bits
    pub const QOS_MASK: Self = Self::QOS_LOW.union(Self::QOS_HIGH);

    /// Extract the flag nibble from a full header byte
    #[must_use]
    pub const fn from_header(header: u8) -> Self {
        Self::from_bits_truncate(header & 0x0F)
    }

    /// Convert to raw nibble value
    #[must_use]
    pub const fn to_byte(self) -> u8 {
        self.bits()
    }

    /// Delivery class encoded in the QoS bits
    pub fn qos(self) -> Result<QoS> {
        QoS::from_bits((self.bits() & Self::QOS_MASK.bits()) >> 1)
    }

    /// Replace the QoS bits
    #[must_use]
    pub fn with_qos(self, qos: QoS) -> Self {
        let cleared = self.difference(Self::QOS_MASK);
        cleared.union(Self::from_bits_truncate((qos as u8) << 1))
    }
}

impl Default for HeaderFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// MQTT delivery class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum QoS {
    /// Fire and forget
    #[default]
    AtMostOnce = 0,
    /// Acknowledged delivery
    AtLeastOnce = 1,
    /// Four-way handshake delivery
    ExactlyOnce = 2,
}

impl QoS {
    /// Parse a two-bit QoS value; 3 is reserved.
    pub fn from_bits(bits: u8) -> Result<Self> {
        match bits {
            0 => Ok(Self::AtMostOnce),
            1 => Ok(Self::AtLeastOnce),
            2 => Ok(Self::ExactlyOnce),
            other => Err(ProtocolError::InvalidQos(other)),
        }
    }
}

bitflags! {
    /// CONNECT variable-header flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ConnectFlags: u8 {
        /// Reserved, must be zero
        const RESERVED = 0b0000_0001;

        /// Discard any previous session
        const CLEAN_SESSION = 0b0000_0010;

        /// Will message present
        const WILL = 0b0000_0100;

        /// Will QoS bit 0
        const WILL_QOS_LOW = 0b0000_1000;

        /// Will QoS bit 1
        const WILL_QOS_HIGH = 0b0001_0000;

        /// Will message retained
        const WILL_RETAIN = 0b0010_0000;

        /// Password field present
        const PASSWORD = 0b0100_0000;

        /// Username field present
        const USERNAME = 0b1000_0000;
    }
}
