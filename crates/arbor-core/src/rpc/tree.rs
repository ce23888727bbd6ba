//! Node tree arena and message routing.
//!
//! The tree owns every node, link and bridge. Entries refer to each other by
//! [`NodeId`], an index into the arena, so parents never own children and the
//! single-root rule is enforced at construction.
//!
//! # Routing
//!
//! A message moves one hop at a time. Going up, each node prepends its name to
//! the source path until the message reaches its turnaround:
//!
//! - the entry with no parent, for global paths and notifications
//! - the local root, for `~/` paths
//!
//! There it turns downward and each node consumes one destination segment
//! until the path is empty and the message is delivered. A downstream link
//! reached going up, or an upstream link reached going down, writes the
//! message to its transport instead.
//!
//! Routing is iterative and bounded by [`MAX_ROUTE_HOPS`], so a response
//! generated during delivery never recurses back into the tree.

use std::time::{Duration, Instant};

use arbor_proto::QoS;

use crate::{
    bridge::NodeBridge,
    error::RpcError,
    limits::{MAX_ROUTE_HOPS, MAX_SUBNODES, MAX_TREE_ENTRIES},
    link::{LinkRole, NodeLink},
    parser::ParserStats,
    pool::MessagePool,
    rpc::{
        Anchor, MessageKind, NodeName, Params, ReturnCode, RpcMessage, RpcNode, TopicPath,
        node::{Outstanding, Pending},
    },
};

/// Handle to an entry of a [`NodeTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Arena index
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Node tree configuration
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Deadline for a response after a request is issued
    pub request_timeout: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self { request_timeout: Duration::from_secs(2) }
    }
}

pub(crate) enum Role {
    Node(RpcNode),
    Link(NodeLink),
    Bridge(NodeBridge),
}

pub(crate) struct Entry {
    pub(crate) name: Option<NodeName>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: heapless::Vec<NodeId, MAX_SUBNODES>,
    pub(crate) role: Role,
}

impl Entry {
    pub(crate) fn new(name: Option<NodeName>, parent: Option<NodeId>, role: Role) -> Self {
        Self { name, parent, children: heapless::Vec::new(), role }
    }

    pub(crate) fn rpc_node_mut(&mut self) -> Option<&mut RpcNode> {
        match &mut self.role {
            Role::Node(node) => Some(node),
            Role::Bridge(bridge) => Some(&mut bridge.node),
            Role::Link(_) => None,
        }
    }

    fn rpc_node(&self) -> Option<&RpcNode> {
        match &self.role {
            Role::Node(node) => Some(node),
            Role::Bridge(bridge) => Some(&bridge.node),
            Role::Link(_) => None,
        }
    }

    pub(crate) fn is_downstream_link(&self) -> bool {
        matches!(&self.role, Role::Link(link) if link.role() == LinkRole::Downstream)
    }
}

/// One routing step
pub(crate) enum Hop {
    /// Message is at the entry, travelling toward the root
    Up(NodeId, RpcMessage),
    /// Message is at the entry, travelling toward its destination
    Down(NodeId, RpcMessage),
}

/// Arena of nodes, links and bridges with a shared message pool.
pub struct NodeTree {
    pub(crate) entries: heapless::Vec<Entry, MAX_TREE_ENTRIES>,
    pub(crate) pool: MessagePool,
    pub(crate) config: NodeConfig,
}

impl NodeTree {
    /// Empty tree drawing messages from `pool`
    #[must_use]
    pub fn new(pool: MessagePool, config: NodeConfig) -> Self {
        Self { entries: heapless::Vec::new(), pool, config }
    }

    /// Shared message pool
    #[must_use]
    pub fn pool(&self) -> &MessagePool {
        &self.pool
    }

    /// Tree configuration
    #[must_use]
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Add the global root.
    ///
    /// # Errors
    ///
    /// [`RpcError::RootExists`] if the tree already has a top-level entry, or
    /// a naming error for an invalid `name`.
    pub fn add_global_root(&mut self, name: &str) -> Result<NodeId, RpcError> {
        let name = NodeName::new(name)?;
        self.ensure_no_root()?;
        self.push_entry(Entry::new(Some(name), None, Role::Node(RpcNode::new())))
    }

    /// Add a plain node under `parent`.
    ///
    /// # Errors
    ///
    /// - naming errors for an invalid `name`
    /// - [`RpcError::DuplicateName`] if a sibling already uses `name`
    /// - [`RpcError::WrongEntryKind`] if `parent` is not a node
    /// - [`RpcError::TableFull`] if the parent or the tree is full
    pub fn add_node(&mut self, parent: NodeId, name: &str) -> Result<NodeId, RpcError> {
        let name = NodeName::new(name)?;
        self.attach(parent, Some(name), Role::Node(RpcNode::new()))
    }

    /// Register `handler` as method `name` of `node`.
    ///
    /// # Errors
    ///
    /// [`RpcError::WrongEntryKind`] for a link, otherwise see
    /// [`RpcNode::add_method`].
    pub fn add_method(
        &mut self,
        node: NodeId,
        name: &str,
        handler: impl FnMut(&Params, &mut Params) -> ReturnCode + 'static,
    ) -> Result<(), RpcError> {
        self.rpc_node_mut(node)?.add_method(name, Box::new(handler))
    }

    /// Issue a request for `method` at `path` on behalf of `node`.
    ///
    /// `callback` runs exactly once: with the response, or with
    /// [`ReturnCode::FailTimeout`] once `request_timeout` has passed since
    /// `now`. It may run before this returns when the destination is in the
    /// same tree.
    ///
    /// # Errors
    ///
    /// [`RpcError::OutstandingRequestsFull`] if `node` already has the
    /// maximum number of requests in flight; nothing is sent. Path and
    /// method errors are reported the same way.
    pub fn execute_method(
        &mut self,
        node: NodeId,
        method: &str,
        path: &str,
        params: Params,
        now: Instant,
        callback: impl FnOnce(ReturnCode, &Params) + 'static,
    ) -> Result<u16, RpcError> {
        let dest = TopicPath::parse(path)?;
        let mut request = RpcMessage::request(dest, method, 0, params)?;
        let deadline = now + self.config.request_timeout;
        request.id = self.rpc_node_mut(node)?.begin_request(
            method,
            deadline,
            Pending::Callback(Box::new(callback)),
        )?;

        let id = request.id;
        tracing::debug!(node = ?node, method, path, id, "request issued");
        self.route(Hop::Up(node, request));
        Ok(id)
    }

    /// Publish notification `name` carrying `data` from `node`.
    ///
    /// Notifications are fire-and-forget. They travel to the global root and
    /// fan out to every bridge client subscribed to `<source>/<name>`.
    ///
    /// # Errors
    ///
    /// [`RpcError::ParamsTooLong`] if `data` does not fit, or
    /// [`RpcError::WrongEntryKind`] for a link.
    pub fn publish_notification(
        &mut self,
        node: NodeId,
        name: &str,
        qos: QoS,
        data: &[u8],
    ) -> Result<(), RpcError> {
        let params = Params::from_bytes(data)?;
        let id = self.rpc_node_mut(node)?.allocate_id();
        let notification = RpcMessage::notification(name, id, qos, params)?;
        self.route(Hop::Up(node, notification));
        Ok(())
    }

    /// Advance the tree to `now`.
    ///
    /// Expired requests are failed first, then unprovisioned links retry,
    /// then every link and bridge handles at most one incoming frame.
    pub fn tick(&mut self, now: Instant) {
        self.expire_requests(now);
        self.provision_links(now);
        self.poll_transports(now);
    }

    /// Routing name of `id`; `None` for an unnamed link or unknown id
    #[must_use]
    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.entries.get(id.0)?.name.as_ref().map(NodeName::as_str)
    }

    /// Parent of `id`
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.entries.get(id.0)?.parent
    }

    /// Children of `id`, in insertion order
    #[must_use]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match self.entries.get(id.0) {
            Some(entry) => &entry.children,
            None => &[],
        }
    }

    /// Requests `id` is waiting on; zero for links and unknown ids
    #[must_use]
    pub fn outstanding_requests(&self, id: NodeId) -> usize {
        self.entries.get(id.0).and_then(Entry::rpc_node).map_or(0, RpcNode::outstanding_len)
    }

    /// Parser counters of a link or bridge
    #[must_use]
    pub fn parser_stats(&self, id: NodeId) -> Option<ParserStats> {
        match &self.entries.get(id.0)?.role {
            Role::Link(link) => Some(link.parser.stats()),
            Role::Bridge(bridge) => Some(bridge.parser.stats()),
            Role::Node(_) => None,
        }
    }

    pub(crate) fn entry(&self, id: NodeId) -> Result<&Entry, RpcError> {
        self.entries.get(id.0).ok_or(RpcError::UnknownNode(id.0))
    }

    pub(crate) fn entry_mut(&mut self, id: NodeId) -> Result<&mut Entry, RpcError> {
        self.entries.get_mut(id.0).ok_or(RpcError::UnknownNode(id.0))
    }

    fn rpc_node_mut(&mut self, id: NodeId) -> Result<&mut RpcNode, RpcError> {
        self.entry_mut(id)?
            .rpc_node_mut()
            .ok_or(RpcError::WrongEntryKind { id: id.0, expected: "node" })
    }

    pub(crate) fn ensure_no_root(&self) -> Result<(), RpcError> {
        if self.entries.iter().any(|entry| entry.parent.is_none()) {
            return Err(RpcError::RootExists);
        }
        Ok(())
    }

    pub(crate) fn push_entry(&mut self, entry: Entry) -> Result<NodeId, RpcError> {
        let id = NodeId(self.entries.len());
        self.entries.push(entry).map_err(|_| RpcError::TableFull { table: "tree" })?;
        Ok(id)
    }

    /// Add `role` as a child of the plain node `parent`.
    pub(crate) fn attach(
        &mut self,
        parent: NodeId,
        name: Option<NodeName>,
        role: Role,
    ) -> Result<NodeId, RpcError> {
        let entry = self.entry(parent)?;
        if !matches!(entry.role, Role::Node(_)) {
            return Err(RpcError::WrongEntryKind { id: parent.0, expected: "node" });
        }
        if entry.children.is_full() {
            return Err(RpcError::TableFull { table: "subnode" });
        }
        if let Some(name) = &name {
            if self.child_named(parent, name.as_str()).is_some() {
                return Err(RpcError::DuplicateName(name.as_str().to_owned()));
            }
        }

        let id = self.push_entry(Entry::new(name, Some(parent), role))?;
        // Capacity checked above.
        let _ = self.entry_mut(parent)?.children.push(id);
        Ok(id)
    }

    pub(crate) fn child_named(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.children(parent).iter().copied().find(|child| self.name(*child) == Some(name))
    }

    pub(crate) fn is_downstream_link(&self, id: NodeId) -> bool {
        self.entries.get(id.0).is_some_and(Entry::is_downstream_link)
    }

    /// Drive `hop` until the message is delivered, written or dropped.
    pub(crate) fn route(&mut self, hop: Hop) {
        let mut next = Some(hop);
        let mut hops = 0;
        while let Some(hop) = next.take() {
            hops += 1;
            if hops > MAX_ROUTE_HOPS {
                tracing::warn!(hops, "routing did not converge, dropping message");
                return;
            }
            next = match hop {
                Hop::Up(at, message) => self.step_up(at, message),
                Hop::Down(at, message) => self.step_down(at, message),
            };
        }
    }

    fn step_up(&mut self, at: NodeId, mut message: RpcMessage) -> Option<Hop> {
        let entry = self.entries.get(at.0)?;
        if entry.is_downstream_link() {
            self.transmit_up(at, message);
            return None;
        }

        let name = entry.name.clone();
        let parent = entry.parent;
        let below_link = parent.is_some_and(|parent| self.is_downstream_link(parent));
        let turnaround = match (message.kind, message.dest.anchor()) {
            (MessageKind::Notification, _) | (_, Anchor::Global) => parent.is_none(),
            (_, Anchor::Local) => parent.is_none() || below_link,
            (_, Anchor::Remote) => false,
        };

        if turnaround {
            if message.kind == MessageKind::Notification {
                self.fan_out(&message);
                return None;
            }
            let anchor = message.dest.anchor();
            message.source.set_anchor(anchor);
            return Some(Hop::Down(at, message));
        }

        let Some(parent) = parent else {
            tracing::warn!(dest = %message.dest, "no uplink for remote path, dropping message");
            return None;
        };
        if !below_link {
            let name = name?;
            if let Err(err) = message.source.prepend(name.as_str()) {
                tracing::warn!(node = %name, error = %err, "source path overflow, dropping message");
                return None;
            }
        }
        Some(Hop::Up(parent, message))
    }

    fn step_down(&mut self, at: NodeId, mut message: RpcMessage) -> Option<Hop> {
        let link_role = match &self.entries.get(at.0)?.role {
            Role::Link(link) => Some(link.role()),
            Role::Node(_) | Role::Bridge(_) => None,
        };
        match link_role {
            Some(LinkRole::Upstream) => {
                self.transmit_down(at, message);
                return None;
            },
            Some(LinkRole::Downstream) => {
                tracing::warn!(link = ?at, "downward message at downstream link, dropping");
                return None;
            },
            None => {},
        }

        if message.dest.is_empty() {
            return self.deliver(at, message);
        }

        let next = match message.dest.first_segment() {
            Ok(segment) => segment.and_then(|segment| self.child_named(at, segment)),
            Err(err) => return reject(at, &message, err.return_code()),
        };
        match next {
            Some(child) => {
                message.dest.strip_first();
                Some(Hop::Down(child, message))
            },
            None => reject(at, &message, ReturnCode::NodeDne),
        }
    }

    fn deliver(&mut self, at: NodeId, message: RpcMessage) -> Option<Hop> {
        let node = self.entries.get_mut(at.0)?.rpc_node_mut()?;
        match message.kind {
            MessageKind::Request => {
                let (code, out) = node.dispatch(&message.method, &message.params);
                tracing::trace!(node = ?at, method = %message.method, %code, "request handled");
                Some(Hop::Up(at, message.response(code, out)))
            },
            MessageKind::Response => {
                let Some(outstanding) = node.settle(message.id) else {
                    tracing::warn!(node = ?at, id = message.id, "response matches no request, dropping");
                    return None;
                };
                self.complete(at, outstanding, message.code, &message.params);
                None
            },
            MessageKind::Notification => {
                tracing::trace!(node = ?at, "notification below the root, dropping");
                None
            },
        }
    }

    fn complete(&mut self, at: NodeId, outstanding: Outstanding, code: ReturnCode, params: &Params) {
        match outstanding.pending {
            Pending::Callback(callback) => callback(code, params),
            Pending::Client { topic } => self.reply_to_client(at, &topic, code, params),
        }
    }

    fn expire_requests(&mut self, now: Instant) {
        for index in 0..self.entries.len() {
            let Some(node) = self.entries[index].rpc_node_mut() else {
                continue;
            };
            for outstanding in node.take_expired(now) {
                tracing::warn!(
                    node = ?NodeId(index),
                    id = outstanding.id,
                    method = %outstanding.method,
                    "request timed out"
                );
                self.complete(NodeId(index), outstanding, ReturnCode::FailTimeout, &Params::new());
            }
        }
    }
}

/// Answer an undeliverable request with `code`; other kinds are dropped.
fn reject(at: NodeId, message: &RpcMessage, code: ReturnCode) -> Option<Hop> {
    match message.kind {
        MessageKind::Request => {
            tracing::debug!(node = ?at, dest = %message.dest, %code, "request rejected");
            Some(Hop::Up(at, message.response(code, Params::new())))
        },
        MessageKind::Response | MessageKind::Notification => {
            tracing::warn!(node = ?at, dest = %message.dest, %code, "undeliverable message, dropping");
            None
        },
    }
}
