//! Arbor runtime core
//!
//! This crate contains the pure state-machine logic of the arbor messaging
//! substrate. It never touches a clock, a socket or a global: time arrives as
//! an `Instant` argument and bytes arrive through the [`ByteTransport`] trait.
//!
//! # Architecture
//!
//! ```text
//!   ByteTransport ──bytes──▶ FrameParser ──Frame──▶ MessagePool::bind
//!                                                        │
//!                                                        ▼
//!   ByteTransport ◀─bytes── FrameParser ◀─Frame── NodeTree routing
//!                                               (methods, links, bridges)
//! ```
//!
//! Everything lives in a [`NodeTree`](rpc::NodeTree): an arena of nodes,
//! links and bridges addressed by [`NodeId`](rpc::NodeId). A driver loop calls
//! [`NodeTree::tick`](rpc::NodeTree::tick) repeatedly; nothing blocks and
//! nothing is spawned.
//!
//! # Key Principles
//!
//! - Fixed memory: every table is a `heapless` container sized by
//!   [`limits`]. Exhaustion is an ordinary error value.
//! - Single context: [`Message`](pool::Message) handles are `!Send`, so the
//!   compiler keeps routing state on one thread.
//! - Non-fatal failures: parse errors, rejected logins, timeouts and pool
//!   exhaustion are logged through `tracing` and the tree keeps running.
//!
//! # Modules
//!
//! - [`pool`]: pooled, reference-counted messages
//! - [`parser`]: frame parser bound to a byte transport
//! - [`rpc`]: node tree, paths, params, request correlation
//! - [`link`]: links between trees and their provisioning handshake
//! - [`bridge`]: termination of protocol-native MQTT clients
//! - [`env`]: time source abstraction
//! - [`transport`]: byte transport abstraction
//! - [`error`]: error types

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod bridge;
pub mod env;
pub mod error;
pub mod limits;
pub mod link;
pub mod parser;
pub mod pool;
pub mod rpc;
pub mod transport;

pub use bridge::{AuthCallback, BridgeConfig};
pub use env::{Environment, SystemEnv};
pub use error::{RpcError, SendError, TransportError};
pub use link::{LinkConfig, LinkListener, LinkRole};
pub use parser::{FrameParser, ParserStats};
pub use pool::{Message, MessagePool, PoolExhausted};
pub use rpc::{NodeConfig, NodeId, NodeTree, Params, ReturnCode};
pub use transport::{ByteTransport, IoTransport};
