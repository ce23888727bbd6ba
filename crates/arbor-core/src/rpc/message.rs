//! RPC messages on the wire.
//!
//! Every RPC message travels as an MQTT PUBLISH:
//!
//! ```text
//! topic:   marker + destination path        e.g. "->~/dev1/sensor"
//! payload: id       u16 big-endian
//!          method   u8 length + UTF-8       method or notification name
//!          source   u8 length + UTF-8       anchored path back to sender
//!          code     u8                      responses only
//!          params   remaining bytes
//! ```
//!
//! Requests and responses are always QoS 0. Notifications carry the QoS the
//! publisher asked for, with `id` as the PUBLISH packet identifier.

use std::fmt::Write;

use arbor_proto::{FRAME_CAPACITY, Frame, ProtocolError, QoS, packets::Publish};
use bytes::Buf;

use crate::{
    error::RpcError,
    limits::MAX_PATH_LEN,
    rpc::{
        Params, ReturnCode,
        path::{self, Anchor, PathString, TopicPath},
    },
};

/// Room for a marker or anchor plus a full path
const TOPIC_CAPACITY: usize = MAX_PATH_LEN + 8;

/// Which table handles a message on arrival
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Dispatched to the destination's method table
    Request,
    /// Matched against the originator's outstanding requests
    Response,
    /// Fanned out to subscribers at the global root
    Notification,
}

/// Owned, decoded RPC message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcMessage {
    /// Request, response or notification
    pub kind: MessageKind,
    /// Remaining destination path
    pub dest: TopicPath,
    /// Path back to the sender, accumulated while routing upward
    pub source: TopicPath,
    /// Correlation id
    pub id: u16,
    /// Method name, or notification name
    pub method: PathString,
    /// Outcome; [`ReturnCode::Success`] for non-responses
    pub code: ReturnCode,
    /// Delivery class
    pub qos: QoS,
    /// Parameters or notification data
    pub params: Params,
}

impl RpcMessage {
    /// Request for `method` at `dest`
    pub fn request(dest: TopicPath, method: &str, id: u16, params: Params) -> Result<Self, RpcError> {
        Ok(Self {
            kind: MessageKind::Request,
            dest,
            source: TopicPath::empty(Anchor::Global),
            id,
            method: bounded(method)?,
            code: ReturnCode::Success,
            qos: QoS::AtMostOnce,
            params,
        })
    }

    /// Notification named `name`, routed toward the global root
    pub fn notification(name: &str, id: u16, qos: QoS, params: Params) -> Result<Self, RpcError> {
        Ok(Self {
            kind: MessageKind::Notification,
            dest: TopicPath::empty(Anchor::Global),
            source: TopicPath::empty(Anchor::Global),
            id,
            method: bounded(name)?,
            code: ReturnCode::Success,
            qos,
            params,
        })
    }

    /// Response addressed back along this request's source path.
    ///
    /// Output params are dropped unless `code` is [`ReturnCode::Success`].
    #[must_use]
    pub fn response(&self, code: ReturnCode, params: Params) -> Self {
        Self {
            kind: MessageKind::Response,
            dest: self.source.clone(),
            source: TopicPath::empty(Anchor::Global),
            id: self.id,
            method: self.method.clone(),
            code,
            qos: QoS::AtMostOnce,
            params: if code.is_success() { params } else { Params::new() },
        }
    }

    /// Decode from a PUBLISH frame.
    ///
    /// # Errors
    ///
    /// - [`RpcError::NotRpc`] if the topic carries no marker
    /// - [`RpcError::Protocol`] for a frame that is not a valid PUBLISH or a
    ///   truncated envelope
    pub fn from_frame(frame: &Frame) -> Result<Self, RpcError> {
        let publish = Publish::from_frame(frame)?;
        let (kind, dest) = path::split_marker(publish.topic).ok_or(RpcError::NotRpc)?;
        let dest = TopicPath::parse(dest)?;

        let mut buf = publish.payload;
        if buf.remaining() < 2 {
            return Err(ProtocolError::Malformed { field: "id" }.into());
        }
        let id = buf.get_u16();
        let method = bounded(read_short_str(&mut buf, "method")?)?;
        let source = TopicPath::parse(read_short_str(&mut buf, "source")?)?;
        let code = match kind {
            MessageKind::Response => {
                if buf.remaining() < 1 {
                    return Err(ProtocolError::Malformed { field: "code" }.into());
                }
                ReturnCode::from_u8(buf.get_u8())
            },
            MessageKind::Request | MessageKind::Notification => ReturnCode::Success,
        };
        let params = Params::from_bytes(buf)?;

        Ok(Self { kind, dest, source, id, method, code, qos: publish.qos, params })
    }

    /// Encode as a PUBLISH frame.
    pub fn to_frame(&self) -> Result<Frame, RpcError> {
        let topic: heapless::String<TOPIC_CAPACITY> = path::topic_for(self.kind, &self.dest)?;

        let mut payload: heapless::Vec<u8, FRAME_CAPACITY> = heapless::Vec::new();
        payload.extend_from_slice(&self.id.to_be_bytes()).map_err(overflow)?;
        write_short_str(&mut payload, &self.method)?;

        let mut source: heapless::String<TOPIC_CAPACITY> = heapless::String::new();
        write!(source, "{}", self.source)
            .map_err(|_| RpcError::PathTooLong { len: TOPIC_CAPACITY + 1, max: MAX_PATH_LEN })?;
        write_short_str(&mut payload, &source)?;

        if self.kind == MessageKind::Response {
            payload.push(self.code as u8).map_err(overflow)?;
        }
        payload.extend_from_slice(self.params.as_bytes()).map_err(overflow)?;

        let publish = Publish {
            packet_id: (self.qos != QoS::AtMostOnce).then_some(self.id.max(1)),
            qos: self.qos,
            ..Publish::new(&topic, &payload)
        };
        Ok(publish.to_frame()?)
    }
}

fn bounded(text: &str) -> Result<PathString, RpcError> {
    let mut out = PathString::new();
    out.push_str(text).map_err(|()| RpcError::PathTooLong { len: text.len(), max: MAX_PATH_LEN })?;
    Ok(out)
}

fn read_short_str<'a>(buf: &mut &'a [u8], field: &'static str) -> Result<&'a str, RpcError> {
    if buf.remaining() < 1 {
        return Err(ProtocolError::Malformed { field }.into());
    }
    let len = usize::from(buf.get_u8());
    if buf.remaining() < len {
        return Err(ProtocolError::Malformed { field }.into());
    }
    let slice: &'a [u8] = *buf;
    let (text, rest) = slice.split_at(len);
    *buf = rest;
    std::str::from_utf8(text).map_err(|_| ProtocolError::InvalidUtf8 { field }.into())
}

fn write_short_str<const N: usize>(out: &mut heapless::Vec<u8, N>, text: &str) -> Result<(), RpcError> {
    let len = u8::try_from(text.len()).map_err(|_| RpcError::PathTooLong {
        len: text.len(),
        max: usize::from(u8::MAX),
    })?;
    out.push(len).map_err(overflow)?;
    out.extend_from_slice(text.as_bytes()).map_err(overflow)?;
    Ok(())
}

fn overflow<E>(_: E) -> RpcError {
    ProtocolError::FrameTooLarge { size: FRAME_CAPACITY + 1, max: FRAME_CAPACITY }.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> RpcMessage {
        let mut params = Params::new();
        params.push_str("arg").unwrap();
        let mut message =
            RpcMessage::request(TopicPath::parse("~/dev1").unwrap(), "ping", 7, params).unwrap();
        message.source = TopicPath::parse("gw").unwrap();
        message
    }

    #[test]
    fn request_wire_layout() {
        let frame = request().to_frame().unwrap();
        let publish = Publish::from_frame(&frame).unwrap();
        assert_eq!(publish.topic, "->~/dev1");
        assert_eq!(
            publish.payload,
            &[0x00, 0x07, 4, b'p', b'i', b'n', b'g', 2, b'g', b'w', 3, b'a', b'r', b'g']
        );
    }

    #[test]
    fn request_and_response_decode_back() {
        let request = request();
        assert_eq!(RpcMessage::from_frame(&request.to_frame().unwrap()).unwrap(), request);

        let response = request.response(ReturnCode::Success, Params::from_str_field("ok").unwrap());
        assert_eq!(response.dest.to_string(), "gw");
        assert_eq!(RpcMessage::from_frame(&response.to_frame().unwrap()).unwrap(), response);
    }

    #[test]
    fn failed_response_carries_no_params() {
        let params = Params::from_str_field("x").unwrap();
        let response = request().response(ReturnCode::InvalidParams, params);
        assert!(response.params.is_empty());
        assert_eq!(response.code, ReturnCode::InvalidParams);
    }

    #[test]
    fn notification_keeps_qos_and_anchor() {
        let data = Params::from_bytes(b"21").unwrap();
        let mut message = RpcMessage::notification("temp", 3, QoS::AtLeastOnce, data).unwrap();
        message.source = TopicPath::parse("~/../sensor").unwrap();

        let frame = message.to_frame().unwrap();
        assert_eq!(frame.header(), 0x32);
        let decoded = RpcMessage::from_frame(&frame).unwrap();
        assert_eq!(decoded.source.anchor(), Anchor::Remote);
        assert_eq!(decoded, message);
    }

    #[test]
    fn plain_topic_is_not_rpc() {
        let frame = Publish::new("sensors/temp", b"1").to_frame().unwrap();
        assert!(matches!(RpcMessage::from_frame(&frame), Err(RpcError::NotRpc)));
    }

    #[test]
    fn truncated_source_is_malformed() {
        let frame = Publish::new("->x", &[0, 1, 1, b'm', 9, b's']).to_frame().unwrap();
        assert!(matches!(
            RpcMessage::from_frame(&frame),
            Err(RpcError::Protocol(ProtocolError::Malformed { field: "source" }))
        ));
    }
}
