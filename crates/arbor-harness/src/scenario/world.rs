//! World state for scenario tests.
//!
//! A world is two trees joined by one simulated link:
//!
//! ```text
//!   hub tree                         device tree
//!   ────────                         ───────────
//!   hub (global root)                downlink
//!   ├── svc      echo                └── <local root>   ping
//!   ├── uplink ◀════ SimTransport ════▶  └── sensor     read
//!   └── mqtt     (optional bridge) ◀── client SimTransport
//! ```

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
    time::Duration,
};

use arbor_core::{
    Environment, Message, MessagePool, NodeId, NodeTree, Params, ReturnCode,
    bridge::BridgeConfig,
    link::LinkConfig,
    rpc::NodeConfig,
};
use arbor_proto::{Frame, QoS};

use crate::{SimEnv, SimTransport};

/// Upper bound on tick rounds in one settle
const MAX_SETTLE_ROUNDS: usize = 256;

/// Which tree a step acts on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// The tree holding the global root
    Hub,
    /// The tree below the downstream link
    Device,
}

/// Response observed by a request callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Outcome reported to the caller
    pub code: ReturnCode,
    /// Output params
    pub params: Params,
    /// Virtual time at which the callback ran
    pub at: Duration,
}

type Replies = Rc<RefCell<Vec<Reply>>>;

/// Everything a world is built from
#[derive(Debug, Clone)]
pub struct WorldConfig {
    /// Seed for every fault RNG
    pub seed: u64,
    /// Name the device asks to be provisioned as
    pub local_root: String,
    /// Slots in each tree's message pool
    pub pool_capacity: usize,
    /// Node settings for both trees
    pub node: NodeConfig,
    /// Link settings for both ends
    pub link: LinkConfig,
    /// Attach a bridge named `mqtt` under the hub root
    pub bridge: Option<BridgeConfig>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            local_root: "leafA".to_string(),
            pool_capacity: 8,
            node: NodeConfig::default(),
            link: LinkConfig::default(),
            bridge: None,
        }
    }
}

/// Global simulation state.
pub struct World {
    env: SimEnv,

    hub: NodeTree,
    hub_root: NodeId,
    service: NodeId,
    uplink: NodeId,
    bridge: Option<NodeId>,

    device: NodeTree,
    downlink: NodeId,
    local_root: NodeId,
    sensor: NodeId,

    hub_wire: SimTransport,
    device_wire: SimTransport,
    client: Option<SimTransport>,
    client_buf: Vec<u8>,
    client_frames: Vec<Frame>,

    hub_replies: Replies,
    device_replies: Replies,
    rejected: usize,
    hub_link_events: Rc<Cell<u32>>,
    device_link_events: Rc<Cell<u32>>,
    auth_calls: Rc<Cell<u32>>,
    held: Vec<Message>,
}

impl World {
    /// Build both trees and wire them together.
    ///
    /// Nothing is ticked; the device provisions on the first settle.
    pub fn new(config: &WorldConfig) -> Result<Self, String> {
        let env = SimEnv::new();
        let (hub_wire, device_wire) = SimTransport::pair(config.seed);

        let mut hub =
            NodeTree::new(MessagePool::new(config.pool_capacity), config.node.clone());
        let hub_root = hub.add_global_root("hub").map_err(|e| e.to_string())?;
        let service = hub.add_node(hub_root, "svc").map_err(|e| e.to_string())?;
        hub.add_method(service, "echo", |input, output| {
            *output = input.clone();
            ReturnCode::Success
        })
        .map_err(|e| e.to_string())?;
        let uplink = hub
            .add_upstream_link(hub_root, hub_wire.clone(), config.link.clone())
            .map_err(|e| e.to_string())?;

        let hub_link_events = Rc::new(Cell::new(0));
        let events = Rc::clone(&hub_link_events);
        hub.add_link_listener(uplink, move || events.set(events.get() + 1))
            .map_err(|e| e.to_string())?;

        let auth_calls = Rc::new(Cell::new(0));
        let (bridge, client) = match &config.bridge {
            Some(bridge_config) => {
                let (server, client) = SimTransport::pair(config.seed.wrapping_add(100));
                let bridge = hub
                    .add_bridge(hub_root, "mqtt", server, bridge_config.clone())
                    .map_err(|e| e.to_string())?;
                let calls = Rc::clone(&auth_calls);
                hub.set_authenticator(bridge, move |_, _, _| {
                    calls.set(calls.get() + 1);
                    true
                })
                .map_err(|e| e.to_string())?;
                (Some(bridge), Some(client))
            },
            None => (None, None),
        };

        let mut device =
            NodeTree::new(MessagePool::new(config.pool_capacity), config.node.clone());
        let (downlink, local_root) = device
            .add_downstream_link(device_wire.clone(), &config.local_root, config.link.clone())
            .map_err(|e| e.to_string())?;
        device
            .add_method(local_root, "ping", |_, output| match output.push_str("pong") {
                Ok(()) => ReturnCode::Success,
                Err(_) => ReturnCode::Internal,
            })
            .map_err(|e| e.to_string())?;
        let sensor = device.add_node(local_root, "sensor").map_err(|e| e.to_string())?;
        device
            .add_method(sensor, "read", |_, output| match output.push_str("42") {
                Ok(()) => ReturnCode::Success,
                Err(_) => ReturnCode::Internal,
            })
            .map_err(|e| e.to_string())?;

        let device_link_events = Rc::new(Cell::new(0));
        let events = Rc::clone(&device_link_events);
        device
            .add_link_listener(downlink, move || events.set(events.get() + 1))
            .map_err(|e| e.to_string())?;

        Ok(Self {
            env,
            hub,
            hub_root,
            service,
            uplink,
            bridge,
            device,
            downlink,
            local_root,
            sensor,
            hub_wire,
            device_wire,
            client,
            client_buf: Vec::new(),
            client_frames: Vec::new(),
            hub_replies: Replies::default(),
            device_replies: Replies::default(),
            rejected: 0,
            hub_link_events,
            device_link_events,
            auth_calls,
            held: Vec::new(),
        })
    }

    /// Tick both trees until no bytes are in flight.
    pub fn settle(&mut self) -> Result<(), String> {
        for _ in 0..MAX_SETTLE_ROUNDS {
            let now = self.env.now();
            self.device.tick(now);
            self.hub.tick(now);
            self.collect_client_frames();

            let client_idle = self.client.as_ref().is_none_or(|client| client.outbound() == 0);
            if self.hub_wire.pending() == 0 && self.device_wire.pending() == 0 && client_idle {
                return Ok(());
            }
        }
        Err(format!("world did not settle within {MAX_SETTLE_ROUNDS} rounds"))
    }

    /// Move the clock forward, then settle
    pub fn advance(&mut self, duration: Duration) -> Result<(), String> {
        self.env.advance(duration);
        self.settle()
    }

    /// Issue a request from `side` and record its reply.
    ///
    /// Hub requests come from `svc`, device requests from `sensor`. An empty
    /// `arg` sends no params. Requests the tree refuses to send count as
    /// rejected.
    pub fn request(&mut self, side: Side, method: &str, path: &str, arg: &str) {
        let params = if arg.is_empty() {
            Params::new()
        } else {
            match Params::from_str_field(arg) {
                Ok(params) => params,
                Err(err) => {
                    tracing::debug!(error = %err, "scenario request rejected");
                    self.rejected += 1;
                    return;
                },
            }
        };

        let env = self.env.clone();
        let now = env.now();
        let (tree, caller, replies) = match side {
            Side::Hub => (&mut self.hub, self.service, Rc::clone(&self.hub_replies)),
            Side::Device => (&mut self.device, self.sensor, Rc::clone(&self.device_replies)),
        };
        let issued = tree.execute_method(caller, method, path, params, now, move |code, params| {
            replies.borrow_mut().push(Reply { code, params: params.clone(), at: env.elapsed() });
        });
        if let Err(err) = issued {
            tracing::debug!(error = %err, "scenario request rejected");
            self.rejected += 1;
        }
    }

    /// Publish a QoS 0 notification from the device's `sensor` node
    pub fn notify(&mut self, name: &str, data: &[u8]) -> Result<(), String> {
        self.device
            .publish_notification(self.sensor, name, QoS::AtMostOnce, data)
            .map_err(|e| e.to_string())
    }

    /// Write `frame` from the bridge client
    pub fn client_send(&mut self, frame: &Frame) -> Result<(), String> {
        let client = self.client.as_ref().ok_or("scenario has no bridge")?;
        client.inject(&encode(frame)?);
        Ok(())
    }

    /// Deliver `frame` to the device as if the hub had sent it
    pub fn inject_to_device(&mut self, frame: &Frame) -> Result<(), String> {
        self.hub_wire.inject(&encode(frame)?);
        Ok(())
    }

    /// Wire carrying the writes of `side`
    pub fn wire(&self, side: Side) -> &SimTransport {
        match side {
            Side::Hub => &self.hub_wire,
            Side::Device => &self.device_wire,
        }
    }

    /// Take up to `count` message slots from the device pool
    pub fn hold_device_messages(&mut self, count: usize) {
        for _ in 0..count {
            match self.device.pool().acquire() {
                Ok(message) => self.held.push(message),
                Err(_) => break,
            }
        }
    }

    /// Return every held slot to its pool
    pub fn release_held(&mut self) {
        self.held.clear();
    }

    fn collect_client_frames(&mut self) {
        let Some(client) = &self.client else {
            return;
        };
        self.client_buf.extend(client.drain());
        loop {
            match Frame::decode(&self.client_buf) {
                Ok(Some((frame, used))) => {
                    self.client_frames.push(frame);
                    self.client_buf.drain(..used);
                },
                Ok(None) => return,
                Err(err) => {
                    tracing::warn!(error = %err, "undecodable bytes on client wire");
                    self.client_buf.clear();
                    return;
                },
            }
        }
    }

    /// Hub tree
    pub fn hub(&self) -> &NodeTree {
        &self.hub
    }

    /// Device tree
    pub fn device(&self) -> &NodeTree {
        &self.device
    }

    /// Simulated clock
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    /// Hub global root
    pub fn hub_root(&self) -> NodeId {
        self.hub_root
    }

    /// Hub `svc` node
    pub fn service(&self) -> NodeId {
        self.service
    }

    /// Hub end of the link
    pub fn uplink(&self) -> NodeId {
        self.uplink
    }

    /// Hub bridge, when configured
    pub fn bridge(&self) -> Option<NodeId> {
        self.bridge
    }

    /// Device end of the link
    pub fn downlink(&self) -> NodeId {
        self.downlink
    }

    /// Device local root
    pub fn local_root(&self) -> NodeId {
        self.local_root
    }

    /// Device `sensor` node
    pub fn sensor(&self) -> NodeId {
        self.sensor
    }

    /// Replies to requests issued from the hub
    pub fn hub_replies(&self) -> Vec<Reply> {
        self.hub_replies.borrow().clone()
    }

    /// Replies to requests issued from the device
    pub fn device_replies(&self) -> Vec<Reply> {
        self.device_replies.borrow().clone()
    }

    /// Requests the trees refused to send
    pub fn rejected_requests(&self) -> usize {
        self.rejected
    }

    /// Times the hub link listener ran
    pub fn hub_link_events(&self) -> u32 {
        self.hub_link_events.get()
    }

    /// Times the device link listener ran
    pub fn device_link_events(&self) -> u32 {
        self.device_link_events.get()
    }

    /// Times the bridge authenticator ran
    pub fn auth_calls(&self) -> u32 {
        self.auth_calls.get()
    }

    /// Frames the bridge sent to its client, in order
    pub fn client_frames(&self) -> &[Frame] {
        &self.client_frames
    }

    /// Slots currently held by the scenario
    pub fn held_messages(&self) -> usize {
        self.held.len()
    }
}

fn encode(frame: &Frame) -> Result<Vec<u8>, String> {
    let mut bytes = Vec::with_capacity(frame.encoded_len());
    frame.write_to(&mut bytes).map_err(|e| e.to_string())?;
    Ok(bytes)
}
