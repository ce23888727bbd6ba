//! MQTT client termination.
//!
//! A bridge is a tree node whose transport speaks plain MQTT to one client.
//! The client connects, subscribes to topic filters, and publishes:
//!
//! - `->path/method` publishes become requests from the bridge node; the
//!   response is published back on `<-path/method` with the return code as
//!   the first payload byte
//! - any other topic becomes a tree notification named after the topic
//!
//! Notifications that reach the global root are delivered to every bridge
//! whose client subscribed to `<source>/<name>`, at QoS 0.

use std::{fmt::Write, time::Instant};

use arbor_proto::{
    Frame, PacketType, QoS,
    packets::{
        ConnAck, Connect, ConnectReturnCode, PingResp, Publish, SubAck, SubAckReturn, Subscribe,
        session::PROTOCOL_LEVEL,
    },
};

use crate::{
    error::RpcError,
    limits::{MAX_CLIENT_ID_LEN, MAX_PARAMS_LEN, MAX_PATH_LEN, MAX_SUBSCRIPTIONS, MAX_TREE_ENTRIES},
    link::LinkParser,
    parser::FrameParser,
    pool::Message,
    rpc::{
        MessageKind, NodeId, NodeName, NodeTree, Params, ReturnCode, RpcMessage, RpcNode, TopicPath,
        node::Pending,
        path::{self, PathString},
        tree::{Entry, Hop, Role},
    },
    transport::ByteTransport,
};

/// Decides whether a client may connect: `(client_id, username, password)`
pub type AuthCallback = Box<dyn FnMut(&str, Option<&str>, Option<&[u8]>) -> bool>;

type ClientId = heapless::String<MAX_CLIENT_ID_LEN>;
type FanOutTopic = heapless::String<{ 2 * MAX_PATH_LEN + 1 }>;

/// Bridge configuration
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Longest accepted client identifier, capped at [`MAX_CLIENT_ID_LEN`]
    pub max_client_id_len: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self { max_client_id_len: 23 }
    }
}

impl BridgeConfig {
    fn client_id_limit(&self) -> usize {
        self.max_client_id_len.min(MAX_CLIENT_ID_LEN)
    }
}

struct Session {
    client_id: ClientId,
    subscriptions: heapless::Vec<PathString, MAX_SUBSCRIPTIONS>,
}

impl Session {
    /// Record `filter`; `false` if the table has no room for it.
    fn subscribe(&mut self, filter: &str) -> bool {
        if self.subscriptions.iter().any(|existing| existing == filter) {
            return true;
        }
        let mut stored = PathString::new();
        stored.push_str(filter).is_ok() && self.subscriptions.push(stored).is_ok()
    }

    fn wants(&self, topic: &str) -> bool {
        self.subscriptions.iter().any(|filter| topic_matches(filter, topic))
    }
}

pub(crate) struct NodeBridge {
    pub(crate) node: RpcNode,
    pub(crate) parser: LinkParser,
    auth: Option<AuthCallback>,
    config: BridgeConfig,
    session: Option<Session>,
}

/// Whether MQTT topic filter `filter` matches `topic`.
///
/// `+` matches exactly one level; a trailing `#` matches the parent level
/// and everything below it.
#[must_use]
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut levels = topic.split('/');
    for part in filter.split('/') {
        match part {
            "#" => return true,
            "+" => {
                if levels.next().is_none() {
                    return false;
                }
            },
            exact => {
                if levels.next() != Some(exact) {
                    return false;
                }
            },
        }
    }
    levels.next().is_none()
}

impl NodeTree {
    /// Add a bridge named `name` under `parent`, serving the client on
    /// `transport`.
    ///
    /// CONNECTs are discarded until [`NodeTree::set_authenticator`] is
    /// called.
    ///
    /// # Errors
    ///
    /// As for [`NodeTree::add_node`].
    pub fn add_bridge(
        &mut self,
        parent: NodeId,
        name: &str,
        transport: impl ByteTransport + 'static,
        config: BridgeConfig,
    ) -> Result<NodeId, RpcError> {
        let name = NodeName::new(name)?;
        let bridge = NodeBridge {
            node: RpcNode::new(),
            parser: FrameParser::new(Box::new(transport)),
            auth: None,
            config,
            session: None,
        };
        self.attach(parent, Some(name), Role::Bridge(bridge))
    }

    /// Install the callback that accepts or refuses CONNECTs on `bridge`.
    ///
    /// # Errors
    ///
    /// [`RpcError::WrongEntryKind`] if `bridge` is not a bridge.
    pub fn set_authenticator(
        &mut self,
        bridge: NodeId,
        auth: impl FnMut(&str, Option<&str>, Option<&[u8]>) -> bool + 'static,
    ) -> Result<(), RpcError> {
        let state = self
            .bridge_mut(bridge)
            .ok_or(RpcError::WrongEntryKind { id: bridge.0, expected: "bridge" })?;
        state.auth = Some(Box::new(auth));
        Ok(())
    }

    /// Client id of the connected session on `bridge`
    #[must_use]
    pub fn bridge_client(&self, bridge: NodeId) -> Option<&str> {
        self.bridge(bridge)?.session.as_ref().map(|session| session.client_id.as_str())
    }

    fn bridge(&self, id: NodeId) -> Option<&NodeBridge> {
        match &self.entries.get(id.0)?.role {
            Role::Bridge(bridge) => Some(bridge),
            Role::Node(_) | Role::Link(_) => None,
        }
    }

    fn bridge_mut(&mut self, id: NodeId) -> Option<&mut NodeBridge> {
        match &mut self.entries.get_mut(id.0)?.role {
            Role::Bridge(bridge) => Some(bridge),
            Role::Node(_) | Role::Link(_) => None,
        }
    }

    fn send_packet(&mut self, bridge: NodeId, frame: arbor_proto::Result<Frame>) {
        match frame {
            Ok(frame) => self.send_frame(bridge, frame),
            Err(err) => tracing::warn!(bridge = ?bridge, error = %err, "cannot encode packet"),
        }
    }

    pub(crate) fn on_bridge_frame(&mut self, bridge: NodeId, message: &Message, now: Instant) {
        let frame = message.frame();
        let packet_type = match frame.packet_type() {
            Ok(packet_type) => packet_type,
            Err(err) => {
                tracing::warn!(bridge = ?bridge, error = %err, "discarding frame");
                return;
            },
        };

        match packet_type {
            PacketType::Connect => self.on_connect(bridge, &frame),
            PacketType::PingReq => self.send_packet(bridge, PingResp.to_frame()),
            PacketType::Subscribe => self.on_subscribe(bridge, &frame),
            PacketType::Publish => self.on_publish(bridge, &frame, now),
            PacketType::Disconnect => {
                if let Some(state) = self.bridge_mut(bridge) {
                    if let Some(session) = state.session.take() {
                        tracing::info!(bridge = ?bridge, client = %session.client_id, "client disconnected");
                    }
                }
            },
            other => tracing::trace!(bridge = ?bridge, packet = %other, "ignoring packet"),
        }
    }

    fn on_connect(&mut self, bridge: NodeId, frame: &Frame) {
        let Some(state) = self.bridge_mut(bridge) else {
            return;
        };
        let Some(auth) = state.auth.as_mut() else {
            tracing::warn!(bridge = ?bridge, "no authenticator, discarding CONNECT");
            return;
        };
        let connect = match Connect::from_frame(frame) {
            Ok(connect) => connect,
            Err(err) => {
                tracing::warn!(bridge = ?bridge, error = %err, "malformed CONNECT");
                return;
            },
        };

        let code = if connect.protocol_level != PROTOCOL_LEVEL {
            ConnectReturnCode::RefusedProtocolVersion
        } else if connect.client_id.len() > state.config.client_id_limit() {
            ConnectReturnCode::RefusedIdentifierRejected
        } else if !auth(connect.client_id, connect.username, connect.password) {
            ConnectReturnCode::RefusedBadUsernamePassword
        } else {
            ConnectReturnCode::Accepted
        };

        if code == ConnectReturnCode::Accepted {
            let mut client_id = ClientId::new();
            // Bounded by the client id limit above.
            let _ = client_id.push_str(connect.client_id);
            tracing::info!(bridge = ?bridge, client = connect.client_id, "client connected");
            state.session = Some(Session { client_id, subscriptions: heapless::Vec::new() });
        } else {
            tracing::warn!(bridge = ?bridge, client = connect.client_id, ?code, "connection refused");
        }
        self.send_packet(bridge, ConnAck::new(code).to_frame());
    }

    fn on_subscribe(&mut self, bridge: NodeId, frame: &Frame) {
        let subscribe = match Subscribe::from_frame(frame) {
            Ok(subscribe) => subscribe,
            Err(err) => {
                tracing::warn!(bridge = ?bridge, error = %err, "malformed SUBSCRIBE");
                return;
            },
        };
        let Some(session) = self.bridge_mut(bridge).and_then(|state| state.session.as_mut()) else {
            tracing::warn!(bridge = ?bridge, "SUBSCRIBE without session");
            return;
        };

        let mut returns = heapless::Vec::new();
        for (filter, _) in &subscribe.filters {
            let granted = session.subscribe(filter);
            tracing::debug!(bridge = ?bridge, filter, granted, "subscription");
            let _ = returns.push(if granted {
                SubAckReturn::Granted(QoS::AtMostOnce)
            } else {
                SubAckReturn::Failure
            });
        }
        let ack = SubAck { packet_id: subscribe.packet_id, returns };
        self.send_packet(bridge, ack.to_frame());
    }

    fn on_publish(&mut self, bridge: NodeId, frame: &Frame, now: Instant) {
        let publish = match Publish::from_frame(frame) {
            Ok(publish) => publish,
            Err(err) => {
                tracing::warn!(bridge = ?bridge, error = %err, "malformed PUBLISH");
                return;
            },
        };
        if self.bridge_client(bridge).is_none() {
            tracing::warn!(bridge = ?bridge, topic = publish.topic, "PUBLISH without session");
            return;
        }

        match path::split_marker(publish.topic) {
            Some((MessageKind::Request, target)) => {
                self.inject_request(bridge, target, publish.payload, now);
            },
            Some(_) => {
                tracing::debug!(bridge = ?bridge, topic = publish.topic, "ignoring reserved topic");
            },
            None => self.inject_notification(bridge, &publish),
        }
    }

    fn inject_request(&mut self, bridge: NodeId, target: &str, payload: &[u8], now: Instant) {
        let mut reply = PathString::new();
        if write!(reply, "{}{target}", path::marker(MessageKind::Response)).is_err() {
            tracing::warn!(bridge = ?bridge, target, "request topic too long, dropping");
            return;
        }

        let (dest, method) = target.rsplit_once('/').unwrap_or(("", target));
        let request = TopicPath::parse(dest).and_then(|dest| {
            RpcMessage::request(dest, method, 0, Params::from_bytes(payload)?)
        });
        let mut request = match request {
            Ok(request) => request,
            Err(err) => {
                self.reply_to_client(bridge, &reply, err.return_code(), &Params::new());
                return;
            },
        };

        let deadline = now + self.config.request_timeout;
        let Some(state) = self.bridge_mut(bridge) else {
            return;
        };
        match state.node.begin_request(method, deadline, Pending::Client { topic: reply.clone() }) {
            Ok(id) => request.id = id,
            Err(err) => {
                tracing::warn!(bridge = ?bridge, error = %err, "client request rejected");
                self.reply_to_client(bridge, &reply, err.return_code(), &Params::new());
                return;
            },
        }
        self.route(Hop::Up(bridge, request));
    }

    fn inject_notification(&mut self, bridge: NodeId, publish: &Publish<'_>) {
        let notification = Params::from_bytes(publish.payload).and_then(|params| {
            let id = self.bridge_mut(bridge).map_or(0, |state| state.node.allocate_id());
            RpcMessage::notification(publish.topic, id, publish.qos, params)
        });
        match notification {
            Ok(notification) => self.route(Hop::Up(bridge, notification)),
            Err(err) => tracing::warn!(bridge = ?bridge, error = %err, "cannot forward PUBLISH"),
        }
    }

    /// Publish a response to the bridge's client as `[code, params...]`.
    pub(crate) fn reply_to_client(&mut self, bridge: NodeId, topic: &str, code: ReturnCode, params: &Params) {
        if self.bridge_client(bridge).is_none() {
            tracing::debug!(bridge = ?bridge, topic, "client gone, dropping response");
            return;
        }
        let mut payload: heapless::Vec<u8, { 1 + MAX_PARAMS_LEN }> = heapless::Vec::new();
        let _ = payload.push(code as u8);
        // Params never exceed MAX_PARAMS_LEN.
        let _ = payload.extend_from_slice(params.as_bytes());
        self.send_packet(bridge, Publish::new(topic, &payload).to_frame());
    }

    /// Deliver a notification that reached the global root to subscribed
    /// clients.
    pub(crate) fn fan_out(&mut self, notification: &RpcMessage) {
        let mut topic = FanOutTopic::new();
        let source = notification.source.segments();
        let written = if source.is_empty() {
            topic.push_str(&notification.method).map_err(|()| std::fmt::Error)
        } else {
            write!(topic, "{source}/{}", notification.method)
        };
        if written.is_err() {
            tracing::warn!(source, "notification topic too long, dropping");
            return;
        }

        let targets: heapless::Vec<NodeId, MAX_TREE_ENTRIES> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| match &entry.role {
                Role::Bridge(bridge) => bridge.session.as_ref().is_some_and(|s| s.wants(&topic)),
                Role::Node(_) | Role::Link(_) => false,
            })
            .map(|(index, _)| NodeId(index))
            .collect();
        if targets.is_empty() {
            tracing::trace!(topic = %topic, "no subscribers");
            return;
        }

        let frame = match Publish::new(&topic, notification.params.as_bytes()).to_frame() {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(topic = %topic, error = %err, "cannot encode notification");
                return;
            },
        };
        let shared = match self.pool.bind(frame) {
            Ok(shared) => shared,
            Err(err) => {
                tracing::warn!(topic = %topic, error = %err, "no slot for notification, dropping");
                return;
            },
        };

        for bridge in targets {
            let copy = shared.clone();
            let Some(parser) = self.entries.get_mut(bridge.0).and_then(Entry::parser_mut) else {
                continue;
            };
            if let Err(err) = parser.write_frame(&copy.frame()) {
                tracing::warn!(bridge = ?bridge, error = %err, "notification send failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, rc::Rc};

    use arbor_proto::packets::PingReq;

    use super::*;
    use crate::{
        pool::MessagePool,
        rpc::NodeConfig,
        transport::pipe::{PipeEnd, pipe},
    };

    struct Rig {
        tree: NodeTree,
        root: NodeId,
        bridge: NodeId,
        client: PipeEnd,
        auth_calls: Rc<Cell<u32>>,
    }

    fn rig() -> Rig {
        let (server, client) = pipe();
        let mut tree = NodeTree::new(MessagePool::new(4), NodeConfig::default());
        let root = tree.add_global_root("hub").unwrap();
        let bridge = tree.add_bridge(root, "mqtt", server, BridgeConfig::default()).unwrap();
        let auth_calls = Rc::new(Cell::new(0));
        let calls = Rc::clone(&auth_calls);
        tree.set_authenticator(bridge, move |_, _, password| {
            calls.set(calls.get() + 1);
            password != Some(b"wrong".as_slice())
        })
        .unwrap();
        Rig { tree, root, bridge, client, auth_calls }
    }

    impl Rig {
        fn send(&mut self, frame: arbor_proto::Result<Frame>) {
            let mut bytes = Vec::new();
            frame.unwrap().write_to(&mut bytes).unwrap();
            self.client.write_all(&bytes).unwrap();
            self.tree.tick(Instant::now());
        }

        fn received(&self) -> Vec<Frame> {
            let bytes = self.client.drain();
            let mut rest = bytes.as_slice();
            let mut frames = Vec::new();
            while let Some((frame, used)) = Frame::decode(rest).unwrap() {
                frames.push(frame);
                rest = &rest[used..];
            }
            frames
        }

        fn connect(&mut self, client_id: &str) {
            self.send(Connect::new(client_id).to_frame());
            let acks = self.received();
            assert_eq!(ConnAck::from_frame(&acks[0]).unwrap().code, ConnectReturnCode::Accepted);
        }
    }

    fn connack(frames: &[Frame]) -> ConnectReturnCode {
        assert_eq!(frames.len(), 1);
        ConnAck::from_frame(&frames[0]).unwrap().code
    }

    #[test]
    fn connect_outcomes() {
        let mut rig = rig();
        rig.send(Connect::new(&"x".repeat(24)).to_frame());
        assert_eq!(connack(&rig.received()), ConnectReturnCode::RefusedIdentifierRejected);
        assert_eq!(rig.auth_calls.get(), 0);

        rig.send(Connect::new("c1").with_credentials("u", Some(b"wrong".as_slice())).to_frame());
        assert_eq!(connack(&rig.received()), ConnectReturnCode::RefusedBadUsernamePassword);
        assert_eq!(rig.tree.bridge_client(rig.bridge), None);

        rig.send(Connect::new("c1").with_credentials("u", Some(b"ok".as_slice())).to_frame());
        assert_eq!(connack(&rig.received()), ConnectReturnCode::Accepted);
        assert_eq!(rig.tree.bridge_client(rig.bridge), Some("c1"));
        assert_eq!(rig.auth_calls.get(), 2);
    }

    #[test]
    fn connect_without_authenticator_is_discarded() {
        let (server, client) = pipe();
        let mut tree = NodeTree::new(MessagePool::new(4), NodeConfig::default());
        let root = tree.add_global_root("hub").unwrap();
        let bridge = tree.add_bridge(root, "mqtt", server, BridgeConfig::default()).unwrap();

        let mut bytes = Vec::new();
        Connect::new("c1").to_frame().unwrap().write_to(&mut bytes).unwrap();
        let mut client = client;
        client.write_all(&bytes).unwrap();
        tree.tick(Instant::now());

        assert!(client.drain().is_empty());
        assert_eq!(tree.bridge_client(bridge), None);
    }

    #[test]
    fn ping_gets_pong() {
        let mut rig = rig();
        rig.send(PingReq.to_frame());
        let frames = rig.received();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].packet_type().unwrap(), PacketType::PingResp);
    }

    #[test]
    fn subscribed_client_receives_matching_notifications() {
        let mut rig = rig();
        let dev1 = rig.tree.add_node(rig.root, "dev1").unwrap();
        rig.connect("c1");

        let mut filters = heapless::Vec::new();
        filters.push(("dev1/+", QoS::AtLeastOnce)).unwrap();
        rig.send(Subscribe { packet_id: 7, filters }.to_frame());
        let ack = SubAck::from_frame(&rig.received()[0]).unwrap();
        assert_eq!(ack.packet_id, 7);
        assert_eq!(ack.returns.as_slice(), &[SubAckReturn::Granted(QoS::AtMostOnce)]);

        rig.tree.publish_notification(dev1, "temp", QoS::AtLeastOnce, b"21").unwrap();
        rig.tree.publish_notification(rig.root, "other", QoS::AtMostOnce, b"x").unwrap();

        let frames = rig.received();
        assert_eq!(frames.len(), 1);
        let publish = Publish::from_frame(&frames[0]).unwrap();
        assert_eq!(publish.topic, "dev1/temp");
        assert_eq!(publish.payload, b"21");
        assert_eq!(publish.qos, QoS::AtMostOnce);
        assert_eq!(rig.tree.pool().available(), 4);
    }

    #[test]
    fn client_request_is_answered_on_reply_topic() {
        let mut rig = rig();
        let dev1 = rig.tree.add_node(rig.root, "dev1").unwrap();
        rig.tree
            .add_method(dev1, "ping", |_, out| {
                out.push_str("pong").unwrap();
                ReturnCode::Success
            })
            .unwrap();
        rig.connect("c1");

        rig.send(Publish::new("->dev1/ping", &[]).to_frame());
        let frames = rig.received();
        assert_eq!(frames.len(), 1);
        let reply = Publish::from_frame(&frames[0]).unwrap();
        assert_eq!(reply.topic, "<-dev1/ping");
        assert_eq!(reply.payload, &[0, 4, b'p', b'o', b'n', b'g']);

        rig.send(Publish::new("->nowhere/ping", &[]).to_frame());
        let reply_frames = rig.received();
        let reply = Publish::from_frame(&reply_frames[0]).unwrap();
        assert_eq!(reply.payload, &[ReturnCode::NodeDne as u8]);
        assert_eq!(rig.tree.outstanding_requests(rig.bridge), 0);
    }

    #[test]
    fn publish_before_connect_is_ignored() {
        let mut rig = rig();
        rig.send(Publish::new("->dev1/ping", &[]).to_frame());
        assert!(rig.received().is_empty());
    }

    #[test]
    fn filter_matching() {
        assert!(topic_matches("a/b", "a/b"));
        assert!(!topic_matches("a/b", "a/b/c"));
        assert!(topic_matches("a/+/c", "a/x/c"));
        assert!(!topic_matches("a/+", "a"));
        assert!(topic_matches("a/#", "a"));
        assert!(topic_matches("a/#", "a/b/c"));
        assert!(topic_matches("#", "anything/at/all"));
        assert!(!topic_matches("b/#", "a/b"));
    }
}
