//! # Arbor Protocol: Wire Format
//!
//! This crate implements the framing layer shared by every arbor link: the
//! MQTT 3.1.1 fixed header, the variable-length "remaining length" field, and
//! the handful of control packets an embedded node needs to speak to a broker
//! or to a protocol-native client.
//!
//! ## Protocol Design
//!
//! Every unit on the wire is a [`Frame`]:
//!
//! ```text
//! +--------+-----------------------+---------------------------+
//! | byte 0 | bytes 1..=4           | remaining_length bytes    |
//! | type + | remaining length      | payload                   |
//! | flags  | (7 bits/byte, LE grp) |                           |
//! +--------+-----------------------+---------------------------+
//! ```
//!
//! Frames are parsed incrementally by [`FrameDecoder`], one byte at a time, so
//! a link can feed it straight from a non-blocking transport without ever
//! buffering more than a single frame.
//!
//! ## Implementation Notes
//!
//! - **Fixed Memory**: payload storage is a `heapless::Vec` of
//!   [`FRAME_CAPACITY`] bytes. Nothing in this crate allocates; a frame that
//!   does not fit is rejected with [`ProtocolError::FrameTooLarge`].
//!
//! - **Borrowed Views**: typed packets ([`packets`]) borrow their strings and
//!   payloads from the frame they were read from. Constructing a packet and
//!   calling `to_frame()` copies into a fresh frame exactly once.
//!
//! - **Explicit Validation**: accessors check every length prefix before
//!   slicing. An absent optional field is `None`; a field that is present but
//!   truncated is [`ProtocolError::Malformed`]. The two are never conflated.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod decoder;
pub mod errors;
pub mod flags;
pub mod frame;
pub mod packet_type;
pub mod packets;
pub mod remaining_length;

mod codec;

pub use decoder::{DecoderState, FrameDecoder};
pub use errors::{ProtocolError, Result};
pub use flags::{ConnectFlags, HeaderFlags, QoS};
pub use frame::{FRAME_CAPACITY, Frame, MAX_ENCODED_LEN};
pub use packet_type::PacketType;
pub use remaining_length::MAX_REMAINING_LENGTH;
