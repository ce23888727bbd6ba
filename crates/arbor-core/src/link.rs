//! Links between trees.
//!
//! A link joins two trees over a byte transport. The device side owns a
//! *downstream* link, the top of its tree, whose only child is the device's
//! local root. The hub side attaches an *upstream* link as a child of one of
//! its nodes; it forwards whatever the device sends toward its parent.
//!
//! # Provisioning
//!
//! An upstream link starts unnamed. While its downstream peer is
//! unprovisioned, the peer periodically sends a link-manager request carrying
//! its local root name:
//!
//! ```text
//! device                                   hub
//!   | ->_linkMan  _getName ["leafA"]  -->   |  adopt "leafA" if free
//!   | <--  <-_linkMan  SUCCESS ["leafA"]    |
//! provisioned, listeners fire once
//! ```
//!
//! After provisioning the hub routes `leafA/...` paths across the link.

use std::time::{Duration, Instant};

use arbor_proto::Frame;

use crate::{
    error::{RpcError, SendError},
    limits::MAX_LINK_LISTENERS,
    parser::FrameParser,
    pool::{Message, MessagePool},
    rpc::{
        Anchor, MessageKind, NodeId, NodeName, NodeTree, Params, ReturnCode, RpcMessage, RpcNode,
        TopicPath,
        tree::{Entry, Hop, Role},
    },
    transport::ByteTransport,
};

/// Destination segment addressing the link manager
pub const LINK_MANAGER: &str = "_linkMan";

/// Link-manager method that proposes a name
pub const GET_NAME: &str = "_getName";

/// Correlation id of provisioning requests
pub const PROVISION_ID: u16 = 1234;

/// Called once when a link becomes provisioned
pub type LinkListener = Box<dyn FnMut()>;

pub(crate) type LinkParser = FrameParser<Box<dyn ByteTransport>>;

/// Which side of a link this is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRole {
    /// Hub side: child of a tree node, relays toward its parent
    Upstream,
    /// Device side: top of the tree, owns the local root
    Downstream,
}

/// Link configuration
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Delay between provisioning attempts while unprovisioned
    pub provision_interval: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self { provision_interval: Duration::from_secs(5) }
    }
}

pub(crate) struct NodeLink {
    role: LinkRole,
    pub(crate) parser: LinkParser,
    config: LinkConfig,
    provisioned: bool,
    last_attempt: Option<Instant>,
    listeners: heapless::Vec<LinkListener, MAX_LINK_LISTENERS>,
}

impl NodeLink {
    fn new(role: LinkRole, transport: Box<dyn ByteTransport>, config: LinkConfig) -> Self {
        Self {
            role,
            parser: FrameParser::new(transport),
            config,
            provisioned: false,
            last_attempt: None,
            listeners: heapless::Vec::new(),
        }
    }

    pub(crate) fn role(&self) -> LinkRole {
        self.role
    }

    fn provision_due(&self, now: Instant) -> bool {
        self.role == LinkRole::Downstream
            && !self.provisioned
            && self.last_attempt.is_none_or(|last| {
                now.saturating_duration_since(last) >= self.config.provision_interval
            })
    }

    fn fire_listeners(&mut self) {
        for listener in &mut self.listeners {
            listener();
        }
    }
}

impl Entry {
    pub(crate) fn parser_mut(&mut self) -> Option<&mut LinkParser> {
        match &mut self.role {
            Role::Link(link) => Some(&mut link.parser),
            Role::Bridge(bridge) => Some(&mut bridge.parser),
            Role::Node(_) => None,
        }
    }
}

/// Bind `frame` to a pool slot and write it.
pub(crate) fn send(pool: &MessagePool, parser: &mut LinkParser, frame: Frame) -> Result<(), SendError> {
    let message = pool.bind(frame)?;
    parser.write_frame(&message.frame())?;
    Ok(())
}

fn is_link_manager(dest: &TopicPath) -> bool {
    matches!(dest.first_segment(), Ok(Some(LINK_MANAGER)))
}

impl NodeTree {
    /// Attach the hub side of a link under `parent`.
    ///
    /// The link has no routing name until its peer provisions one.
    ///
    /// # Errors
    ///
    /// [`RpcError::WrongEntryKind`] if `parent` is not a node, or
    /// [`RpcError::TableFull`] if the parent or the tree is full.
    pub fn add_upstream_link(
        &mut self,
        parent: NodeId,
        transport: impl ByteTransport + 'static,
        config: LinkConfig,
    ) -> Result<NodeId, RpcError> {
        let link = NodeLink::new(LinkRole::Upstream, Box::new(transport), config);
        self.attach(parent, None, Role::Link(link))
    }

    /// Make a device-side link the top of this tree, owning a new local root
    /// named `local_root`.
    ///
    /// Returns the link and the local root.
    ///
    /// # Errors
    ///
    /// [`RpcError::RootExists`] if the tree already has a top-level entry.
    pub fn add_downstream_link(
        &mut self,
        transport: impl ByteTransport + 'static,
        local_root: &str,
        config: LinkConfig,
    ) -> Result<(NodeId, NodeId), RpcError> {
        let name = NodeName::new(local_root)?;
        self.ensure_no_root()?;
        if self.entries.capacity() - self.entries.len() < 2 {
            return Err(RpcError::TableFull { table: "tree" });
        }

        let link = NodeLink::new(LinkRole::Downstream, Box::new(transport), config);
        let link = self.push_entry(Entry::new(None, None, Role::Link(link)))?;
        let root = self.push_entry(Entry::new(Some(name), Some(link), Role::Node(RpcNode::new())))?;
        // A fresh entry has room for one child.
        let _ = self.entry_mut(link)?.children.push(root);
        Ok((link, root))
    }

    /// Register `listener` to run once when `link` becomes provisioned.
    ///
    /// # Errors
    ///
    /// [`RpcError::WrongEntryKind`] if `link` is not a link, or
    /// [`RpcError::TableFull`] after [`MAX_LINK_LISTENERS`] listeners.
    pub fn add_link_listener(
        &mut self,
        link: NodeId,
        listener: impl FnMut() + 'static,
    ) -> Result<(), RpcError> {
        let Role::Link(state) = &mut self.entry_mut(link)?.role else {
            return Err(RpcError::WrongEntryKind { id: link.0, expected: "link" });
        };
        state
            .listeners
            .push(Box::new(listener))
            .map_err(|_| RpcError::TableFull { table: "listener" })
    }

    /// Whether `link` can carry traffic.
    ///
    /// Upstream links always report `true`; their peer decides when to
    /// provision. `false` for entries that are not links.
    #[must_use]
    pub fn is_provisioned(&self, link: NodeId) -> bool {
        match self.entries.get(link.0).map(|entry| &entry.role) {
            Some(Role::Link(state)) => state.role == LinkRole::Upstream || state.provisioned,
            _ => false,
        }
    }

    /// Encode `message` and write it to the transport of `id`.
    pub(crate) fn write_message(&mut self, id: NodeId, message: &RpcMessage) {
        match message.to_frame() {
            Ok(frame) => self.send_frame(id, frame),
            Err(err) => tracing::warn!(entry = ?id, error = %err, "cannot encode message, dropping"),
        }
    }

    /// Write `frame` to the transport of `id`. Failures are logged and the
    /// frame is dropped.
    pub(crate) fn send_frame(&mut self, id: NodeId, frame: Frame) {
        let Some(parser) = self.entries.get_mut(id.0).and_then(Entry::parser_mut) else {
            return;
        };
        if let Err(err) = send(&self.pool, parser, frame) {
            tracing::warn!(entry = ?id, error = %err, "send failed, dropping message");
        }
    }

    pub(crate) fn transmit_up(&mut self, link: NodeId, mut message: RpcMessage) {
        if message.dest.anchor() == Anchor::Remote {
            message.dest.set_anchor(Anchor::Local);
        }
        tracing::trace!(link = ?link, dest = %message.dest, "relaying upstream");
        self.write_message(link, &message);
    }

    pub(crate) fn transmit_down(&mut self, link: NodeId, mut message: RpcMessage) {
        message.dest.set_anchor(Anchor::Local);
        match message.source.anchor() {
            Anchor::Local => message.source.set_anchor(Anchor::Remote),
            Anchor::Remote => {
                tracing::warn!(link = ?link, source = %message.source, "source already remote, dropping");
                return;
            },
            Anchor::Global => {},
        }
        tracing::trace!(link = ?link, dest = %message.dest, "relaying downstream");
        self.write_message(link, &message);
    }

    pub(crate) fn provision_links(&mut self, now: Instant) {
        for index in 0..self.entries.len() {
            let link = NodeId(index);
            let due = match &self.entries[index].role {
                Role::Link(state) => state.provision_due(now),
                Role::Node(_) | Role::Bridge(_) => false,
            };
            if !due {
                continue;
            }
            let Some(request) = self.provision_request(link) else {
                continue;
            };
            if let Role::Link(state) = &mut self.entries[index].role {
                state.last_attempt = Some(now);
            }
            tracing::debug!(link = ?link, "sending provisioning request");
            self.write_message(link, &request);
        }
    }

    fn provision_request(&self, link: NodeId) -> Option<RpcMessage> {
        let root = self.children(link).first().copied()?;
        let params = Params::from_str_field(self.name(root)?).ok()?;
        let dest = TopicPath::parse(LINK_MANAGER).ok()?;
        let mut request = RpcMessage::request(dest.clone(), GET_NAME, PROVISION_ID, params).ok()?;
        request.source = dest;
        Some(request)
    }

    pub(crate) fn poll_transports(&mut self, now: Instant) {
        for index in 0..self.entries.len() {
            let id = NodeId(index);
            let (frame, is_bridge) = match &mut self.entries[index].role {
                Role::Link(link) => (link.parser.poll(), false),
                Role::Bridge(bridge) => (bridge.parser.poll(), true),
                Role::Node(_) => continue,
            };
            let Some(frame) = frame else {
                continue;
            };
            let message = match self.pool.bind(frame) {
                Ok(message) => message,
                Err(err) => {
                    tracing::warn!(entry = ?id, error = %err, "no slot for incoming frame, dropping");
                    continue;
                },
            };
            if is_bridge {
                self.on_bridge_frame(id, &message, now);
            } else {
                self.on_link_frame(id, message);
            }
        }
    }

    fn on_link_frame(&mut self, link: NodeId, frame: Message) {
        let decoded = RpcMessage::from_frame(&frame.frame());
        drop(frame);
        let message = match decoded {
            Ok(message) => message,
            Err(err) => {
                tracing::warn!(link = ?link, error = %err, "discarding frame");
                return;
            },
        };

        let role = match self.entries.get(link.0).map(|entry| &entry.role) {
            Some(Role::Link(state)) => state.role,
            _ => return,
        };
        match role {
            LinkRole::Downstream => self.on_downstream_message(link, message),
            LinkRole::Upstream => self.on_upstream_message(link, message),
        }
    }

    fn on_downstream_message(&mut self, link: NodeId, message: RpcMessage) {
        if message.kind == MessageKind::Response && is_link_manager(&message.dest) {
            self.on_provision_response(link, &message);
            return;
        }
        let Some(root) = self.children(link).first().copied() else {
            return;
        };
        self.route(Hop::Down(root, message));
    }

    fn on_provision_response(&mut self, link: NodeId, response: &RpcMessage) {
        let Some(root) = self.children(link).first().copied() else {
            return;
        };
        if !response.code.is_success() {
            tracing::warn!(link = ?link, code = %response.code, "provisioning denied");
            return;
        }
        let name = response.params.str_field(0);
        if name != self.name(root) {
            tracing::debug!(link = ?link, name = ?name, "provisioning response for another node, ignoring");
            return;
        }

        let Some(Role::Link(state)) = self.entries.get_mut(link.0).map(|entry| &mut entry.role) else {
            return;
        };
        if state.provisioned {
            tracing::trace!(link = ?link, "already provisioned");
            return;
        }
        state.provisioned = true;
        tracing::info!(link = ?link, name = name.unwrap_or_default(), "link provisioned");
        state.fire_listeners();
    }

    fn on_upstream_message(&mut self, link: NodeId, message: RpcMessage) {
        if message.kind == MessageKind::Request
            && is_link_manager(&message.dest)
            && message.method.as_str() == GET_NAME
        {
            let requested = message.params.str_field(0).unwrap_or_default();
            let code = self.adopt_name(link, requested);
            let params = if code.is_success() {
                Params::from_str_field(requested).unwrap_or_default()
            } else {
                Params::new()
            };
            let response = message.response(code, params);
            self.write_message(link, &response);
            return;
        }

        if self.name(link).is_none() {
            tracing::debug!(link = ?link, "traffic on unprovisioned link, dropping");
            return;
        }
        self.route(Hop::Up(link, message));
    }

    fn adopt_name(&mut self, link: NodeId, requested: &str) -> ReturnCode {
        let Ok(name) = NodeName::new(requested) else {
            tracing::warn!(link = ?link, name = requested, "invalid link name");
            return ReturnCode::InvalidParams;
        };
        if self.name(link) == Some(requested) {
            return ReturnCode::Success;
        }
        let Some(parent) = self.parent(link) else {
            return ReturnCode::Internal;
        };
        if self.child_named(parent, requested).is_some() {
            tracing::warn!(link = ?link, name = requested, "link name taken");
            return ReturnCode::BadState;
        }

        let Some(entry) = self.entries.get_mut(link.0) else {
            return ReturnCode::Internal;
        };
        let first = entry.name.replace(name).is_none();
        tracing::info!(link = ?link, name = requested, "link named");
        if first {
            if let Role::Link(state) = &mut entry.role {
                state.fire_listeners();
            }
        }
        ReturnCode::Success
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;
    use crate::{rpc::NodeConfig, transport::pipe::pipe};

    struct Pair {
        hub: NodeTree,
        hub_root: NodeId,
        uplink: NodeId,
        device: NodeTree,
        downlink: NodeId,
        leaf: NodeId,
    }

    fn pair() -> Pair {
        let (hub_end, device_end) = pipe();
        let mut hub = NodeTree::new(MessagePool::new(4), NodeConfig::default());
        let hub_root = hub.add_global_root("hub").unwrap();
        let uplink = hub.add_upstream_link(hub_root, hub_end, LinkConfig::default()).unwrap();

        let mut device = NodeTree::new(MessagePool::new(4), NodeConfig::default());
        let (downlink, leaf) =
            device.add_downstream_link(device_end, "leafA", LinkConfig::default()).unwrap();
        Pair { hub, hub_root, uplink, device, downlink, leaf }
    }

    fn counter() -> (Rc<RefCell<u32>>, impl FnMut() + 'static) {
        let count = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&count);
        (count, move || *sink.borrow_mut() += 1)
    }

    #[test]
    fn provisioning_names_the_uplink_and_fires_listeners_once() {
        let mut p = pair();
        let (device_fired, listener) = counter();
        p.device.add_link_listener(p.downlink, listener).unwrap();
        let (hub_fired, listener) = counter();
        p.hub.add_link_listener(p.uplink, listener).unwrap();
        let now = Instant::now();

        assert!(!p.device.is_provisioned(p.downlink));
        p.device.tick(now);
        p.hub.tick(now);
        p.device.tick(now);

        assert!(p.device.is_provisioned(p.downlink));
        assert_eq!(p.hub.name(p.uplink), Some("leafA"));
        assert_eq!(p.hub.child_named(p.hub_root, "leafA"), Some(p.uplink));
        assert_eq!(*device_fired.borrow(), 1);
        assert_eq!(*hub_fired.borrow(), 1);

        // No further attempts once provisioned.
        p.device.tick(now + Duration::from_secs(10));
        assert_eq!(p.device.parser_stats(p.downlink).unwrap().frames_sent, 1);
        assert_eq!(*device_fired.borrow(), 1);
    }

    #[test]
    fn unanswered_provisioning_retries_on_interval() {
        let mut p = pair();
        let now = Instant::now();
        let sent = |tree: &NodeTree, link| tree.parser_stats(link).unwrap().frames_sent;

        p.device.tick(now);
        p.device.tick(now + Duration::from_millis(4999));
        assert_eq!(sent(&p.device, p.downlink), 1);

        p.device.tick(now + Duration::from_millis(5000));
        assert_eq!(sent(&p.device, p.downlink), 2);
        assert!(!p.device.is_provisioned(p.downlink));
    }

    #[test]
    fn taken_name_is_denied() {
        let mut p = pair();
        p.hub.add_node(p.hub_root, "leafA").unwrap();
        let now = Instant::now();

        p.device.tick(now);
        p.hub.tick(now);
        p.device.tick(now);

        assert!(!p.device.is_provisioned(p.downlink));
        assert_eq!(p.hub.name(p.uplink), None);
    }

    #[test]
    fn requests_cross_the_link_both_ways() {
        let mut p = pair();
        let now = Instant::now();
        p.device.tick(now);
        p.hub.tick(now);
        p.device.tick(now);

        let svc = p.hub.add_node(p.hub_root, "svc").unwrap();
        p.hub.add_method(svc, "time", |_, out| {
            out.push_str("noon").unwrap();
            ReturnCode::Success
        })
        .unwrap();
        p.device.add_method(p.leaf, "ping", |_, _| ReturnCode::Success).unwrap();

        let replies = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&replies);
        p.device
            .execute_method(p.leaf, "time", "~/../svc", Params::new(), now, move |code, params| {
                sink.borrow_mut().push((code, params.clone()));
            })
            .unwrap();
        p.hub.tick(now);
        p.device.tick(now);
        assert_eq!(
            *replies.borrow(),
            vec![(ReturnCode::Success, Params::from_str_field("noon").unwrap())]
        );

        let sink = Rc::clone(&replies);
        p.hub
            .execute_method(svc, "ping", "leafA", Params::new(), now, move |code, params| {
                sink.borrow_mut().push((code, params.clone()));
            })
            .unwrap();
        p.device.tick(now);
        p.hub.tick(now);
        assert_eq!(replies.borrow().len(), 2);
        assert_eq!(replies.borrow()[1].0, ReturnCode::Success);
        assert_eq!(p.hub.outstanding_requests(svc), 0);
    }

    #[test]
    fn second_root_is_rejected() {
        let (end, _) = pipe();
        let mut tree = NodeTree::new(MessagePool::default(), NodeConfig::default());
        tree.add_global_root("root").unwrap();
        assert!(matches!(
            tree.add_downstream_link(end, "leaf", LinkConfig::default()),
            Err(RpcError::RootExists)
        ));
    }
}
