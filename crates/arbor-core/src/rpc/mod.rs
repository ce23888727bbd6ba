//! Topic-addressed RPC over a named node tree.
//!
//! Nodes are named, hold a bounded method table, and correlate the requests
//! they issue with the responses that come back. Messages are addressed by
//! topic paths:
//!
//! | marker | meaning      | handled by                    |
//! |--------|--------------|-------------------------------|
//! | `->`   | request      | destination's method table    |
//! | `<-`   | response     | originator's outstanding table|
//! | `^^`   | notification | fanned out at the global root |
//!
//! A path without an anchor is rooted at the global root (the unique entry
//! with no parent) and does not include the root's own name. A `~/` path is
//! rooted at the caller's local root, the node owned by the nearest downstream
//! link or the global root when there is no link.
//!
//! Results travel back as [`ReturnCode`]s inside response messages. Nothing
//! in the routing core panics or returns an error across a node boundary.

pub mod message;
pub mod name;
pub mod node;
pub mod params;
pub mod path;
pub mod tree;

pub use message::{MessageKind, RpcMessage};
pub use name::NodeName;
pub use node::{MethodHandler, ResponseCallback, RpcNode};
pub use params::Params;
pub use path::{Anchor, TopicPath};
pub use tree::{NodeConfig, NodeId, NodeTree};

/// Result of a method call, carried in every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReturnCode {
    /// Method ran and produced its output params
    Success = 0,
    /// Destination path could not be parsed
    MalformedPath = 1,
    /// No node at the destination path
    NodeDne = 2,
    /// Destination node has no such method
    MethodDne = 3,
    /// Method rejected its input params
    InvalidParams = 4,
    /// Method cannot run in the node's current state
    BadState = 5,
    /// No response arrived before the deadline
    FailTimeout = 6,
    /// Anything else
    Internal = 255,
}

impl ReturnCode {
    /// Parse a wire value; unknown values read as [`ReturnCode::Internal`].
    #[must_use]
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Success,
            1 => Self::MalformedPath,
            2 => Self::NodeDne,
            3 => Self::MethodDne,
            4 => Self::InvalidParams,
            5 => Self::BadState,
            6 => Self::FailTimeout,
            _ => Self::Internal,
        }
    }

    /// Whether this is [`ReturnCode::Success`]
    #[must_use]
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl std::fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Success => "SUCCESS",
            Self::MalformedPath => "MALFORMED_PATH",
            Self::NodeDne => "NODE_DNE",
            Self::MethodDne => "METHOD_DNE",
            Self::InvalidParams => "INVALID_PARAMS",
            Self::BadState => "BAD_STATE",
            Self::FailTimeout => "FAIL_TIMEOUT",
            Self::Internal => "INTERNAL",
        };
        f.write_str(name)
    }
}
