//! Typed views over MQTT control packets.
//!
//! Each packet type offers `to_frame()` to build a [`Frame`] and
//! `from_frame()` to read one back. Decoded packets borrow from the frame, so
//! a link can inspect a CONNECT or PUBLISH without copying its strings.
//!
//! # Failure Modes
//!
//! Accessors distinguish three outcomes:
//! - the field is present and well-formed: returned as-is
//! - an optional field is absent (its flag bit is clear): `None`
//! - a field is present but truncated or invalid: [`ProtocolError::Malformed`]
//!   or [`ProtocolError::InvalidUtf8`]
//!
//! Frames of the wrong type yield [`ProtocolError::UnexpectedPacketType`].
//!
//! [`Frame`]: crate::Frame
//! [`ProtocolError::Malformed`]: crate::ProtocolError::Malformed
//! [`ProtocolError::InvalidUtf8`]: crate::ProtocolError::InvalidUtf8
//! [`ProtocolError::UnexpectedPacketType`]: crate::ProtocolError::UnexpectedPacketType

pub mod publish;
pub mod session;
pub mod subscribe;

pub use publish::Publish;
pub use session::{ConnAck, Connect, ConnectReturnCode, Disconnect, PingReq, PingResp, Will};
pub use subscribe::{MAX_SUBSCRIBE_FILTERS, SubAck, SubAckReturn, Subscribe};
