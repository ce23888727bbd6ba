//! Session management packets: CONNECT, CONNACK, PINGREQ, PINGRESP and
//! DISCONNECT.

use crate::{
    Frame, PacketType,
    codec::{
        expect_type, read_bytes, read_str, read_u8, read_u16, write_bytes, write_str, write_u8,
        write_u16,
    },
    errors::{ProtocolError, Result},
    flags::{ConnectFlags, QoS},
};

/// Protocol name carried by every MQTT 3.1.1 CONNECT
pub const PROTOCOL_NAME: &str = "MQTT";

/// Protocol level for MQTT 3.1.1
pub const PROTOCOL_LEVEL: u8 = 4;

/// Last-will message registered at connect time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Will<'a> {
    /// Topic the will is published to
    pub topic: &'a str,
    /// Will payload
    pub message: &'a [u8],
    /// Delivery class of the will
    pub qos: QoS,
    /// Whether the will is retained
    pub retain: bool,
}

/// Client connection request
///
/// The first packet a protocol-native client sends. The bridge hands
/// `client_id`, `username` and `password` to its authentication callback.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Connect<'a> {
    /// Protocol level requested by the client (4 for MQTT 3.1.1)
    pub protocol_level: u8,
    /// Client identifier, possibly empty
    pub client_id: &'a str,
    /// Username, present when the USERNAME flag is set
    pub username: Option<&'a str>,
    /// Password, present when the PASSWORD flag is set
    pub password: Option<&'a [u8]>,
    /// Will message, present when the WILL flag is set
    pub will: Option<Will<'a>>,
    /// Keepalive interval in seconds
    pub keep_alive: u16,
    /// Whether the client asked for a clean session
    pub clean_session: bool,
}

impl std::fmt::Debug for Connect<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connect")
            .field("protocol_level", &self.protocol_level)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &self.password.map(|pw| format!("<redacted {} bytes>", pw.len())))
            .field("will", &self.will)
            .field("keep_alive", &self.keep_alive)
            .field("clean_session", &self.clean_session)
            .finish()
    }
}

impl<'a> Connect<'a> {
    /// Minimal clean-session CONNECT with no credentials
    #[must_use]
    pub const fn new(client_id: &'a str) -> Self {
        Self {
            protocol_level: PROTOCOL_LEVEL,
            client_id,
            username: None,
            password: None,
            will: None,
            keep_alive: 60,
            clean_session: true,
        }
    }

    /// Attach credentials
    #[must_use]
    pub const fn with_credentials(mut self, username: &'a str, password: Option<&'a [u8]>) -> Self {
        self.username = Some(username);
        self.password = password;
        self
    }

    /// Read a CONNECT from `frame`.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::UnexpectedPacketType`] if `frame` is not a CONNECT
    /// - [`ProtocolError::Malformed`] for a wrong protocol name, reserved flag
    ///   bit, or any truncated field
    pub fn from_frame(frame: &'a Frame) -> Result<Self> {
        expect_type(frame, PacketType::Connect)?;
        let mut buf = frame.payload();

        if read_str(&mut buf, "protocol name")? != PROTOCOL_NAME {
            return Err(ProtocolError::Malformed { field: "protocol name" });
        }
        let protocol_level = read_u8(&mut buf, "protocol level")?;
        let flags = ConnectFlags::from_bits_retain(read_u8(&mut buf, "connect flags")?);
        if flags.contains(ConnectFlags::RESERVED) {
            return Err(ProtocolError::Malformed { field: "connect flags" });
        }
        let keep_alive = read_u16(&mut buf, "keep alive")?;

        let client_id = read_str(&mut buf, "client id")?;
        let will = if flags.contains(ConnectFlags::WILL) {
            let topic = read_str(&mut buf, "will topic")?;
            let message = read_bytes(&mut buf, "will message")?;
            let qos_bits = (flags.bits() >> 3) & 0x03;
            Some(Will {
                topic,
                message,
                qos: QoS::from_bits(qos_bits)?,
                retain: flags.contains(ConnectFlags::WILL_RETAIN),
            })
        } else {
            None
        };
        let username = if flags.contains(ConnectFlags::USERNAME) {
            Some(read_str(&mut buf, "username")?)
        } else {
            None
        };
        let password = if flags.contains(ConnectFlags::PASSWORD) {
            Some(read_bytes(&mut buf, "password")?)
        } else {
            None
        };

        Ok(Self {
            protocol_level,
            client_id,
            username,
            password,
            will,
            keep_alive,
            clean_session: flags.contains(ConnectFlags::CLEAN_SESSION),
        })
    }

    /// Encode into a new frame.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::FrameTooLarge`] if the fields do not fit one frame.
    pub fn to_frame(&self) -> Result<Frame> {
        let mut flags = ConnectFlags::empty();
        flags.set(ConnectFlags::CLEAN_SESSION, self.clean_session);
        flags.set(ConnectFlags::USERNAME, self.username.is_some());
        flags.set(ConnectFlags::PASSWORD, self.password.is_some());
        if let Some(will) = &self.will {
            flags |= ConnectFlags::WILL;
            flags |= ConnectFlags::from_bits_retain((will.qos as u8) << 3);
            flags.set(ConnectFlags::WILL_RETAIN, will.retain);
        }

        let mut frame = Frame::empty(PacketType::Connect.header_byte());
        write_str(&mut frame, PROTOCOL_NAME, "protocol name")?;
        write_u8(&mut frame, self.protocol_level)?;
        write_u8(&mut frame, flags.bits())?;
        write_u16(&mut frame, self.keep_alive)?;
        write_str(&mut frame, self.client_id, "client id")?;
        if let Some(will) = &self.will {
            write_str(&mut frame, will.topic, "will topic")?;
            write_bytes(&mut frame, will.message, "will message")?;
        }
        if let Some(username) = self.username {
            write_str(&mut frame, username, "username")?;
        }
        if let Some(password) = self.password {
            write_bytes(&mut frame, password, "password")?;
        }
        Ok(frame)
    }
}

/// CONNACK return code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectReturnCode {
    /// Connection accepted
    Accepted = 0,
    /// Server does not support the requested protocol level
    RefusedProtocolVersion = 1,
    /// Client identifier rejected (too long or otherwise invalid)
    RefusedIdentifierRejected = 2,
    /// Server unavailable
    RefusedServerUnavailable = 3,
    /// Username or password rejected
    RefusedBadUsernamePassword = 4,
    /// Client not authorized
    RefusedNotAuthorized = 5,
}

impl ConnectReturnCode {
    /// Parse a wire value
    pub fn from_u8(value: u8) -> Result<Self> {
        Ok(match value {
            0 => Self::Accepted,
            1 => Self::RefusedProtocolVersion,
            2 => Self::RefusedIdentifierRejected,
            3 => Self::RefusedServerUnavailable,
            4 => Self::RefusedBadUsernamePassword,
            5 => Self::RefusedNotAuthorized,
            _ => return Err(ProtocolError::Malformed { field: "connack return code" }),
        })
    }
}

/// Connect acknowledgment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnAck {
    /// Whether the server resumed a stored session
    pub session_present: bool,
    /// Outcome of the connect
    pub code: ConnectReturnCode,
}

impl ConnAck {
    /// Fresh-session acknowledgment with `code`
    #[must_use]
    pub const fn new(code: ConnectReturnCode) -> Self {
        Self { session_present: false, code }
    }

    /// Read a CONNACK from `frame`.
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        expect_type(frame, PacketType::ConnAck)?;
        let mut buf = frame.payload();
        let ack_flags = read_u8(&mut buf, "connack flags")?;
        if ack_flags & !0x01 != 0 {
            return Err(ProtocolError::Malformed { field: "connack flags" });
        }
        let code = ConnectReturnCode::from_u8(read_u8(&mut buf, "connack return code")?)?;
        Ok(Self { session_present: ack_flags & 0x01 != 0, code })
    }

    /// Encode into a new frame
    pub fn to_frame(&self) -> Result<Frame> {
        Frame::new(
            PacketType::ConnAck.header_byte(),
            &[u8::from(self.session_present), self.code as u8],
        )
    }
}

macro_rules! empty_packet {
    ($(#[$doc:meta])* $name:ident, $packet_type:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct $name;

        impl $name {
            /// Check that `frame` is this packet with an empty payload.
            pub fn from_frame(frame: &Frame) -> Result<Self> {
                expect_type(frame, $packet_type)?;
                if !frame.payload().is_empty() {
                    return Err(ProtocolError::Malformed { field: stringify!($name) });
                }
                Ok(Self)
            }

            /// Encode into a new frame
            pub fn to_frame(&self) -> Result<Frame> {
                Ok(Frame::empty($packet_type.header_byte()))
            }
        }
    };
}

empty_packet!(
    /// Keepalive request
    PingReq,
    PacketType::PingReq
);
empty_packet!(
    /// Keepalive response
    PingResp,
    PacketType::PingResp
);
empty_packet!(
    /// Client is closing the connection
    Disconnect,
    PacketType::Disconnect
);
