//! Error types for the arbor runtime.
//!
//! This module provides strongly-typed errors for the runtime's layers:
//! - [`TransportError`]: the byte transport failed or closed
//! - [`SendError`]: a frame could not be encoded or written
//! - [`RpcError`]: tree construction and request issuing failures
//!
//! None of these cross the routing core as a panic. Failures that happen while
//! routing are turned into response messages carrying a
//! [`ReturnCode`](crate::rpc::ReturnCode); the variants here are what the
//! *caller* of a tree operation sees.

use arbor_proto::ProtocolError;
use thiserror::Error;

use crate::{pool::PoolExhausted, rpc::ReturnCode};

/// Byte transport failures
#[derive(Error, Debug)]
pub enum TransportError {
    /// Peer closed the stream
    #[error("transport closed")]
    Closed,

    /// Underlying I/O error
    #[error("transport i/o: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure writing one frame to a transport
#[derive(Error, Debug)]
pub enum SendError {
    /// Frame encoding failed
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Transport rejected the write
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// No pool slot for the outgoing message
    #[error(transparent)]
    PoolExhausted(#[from] PoolExhausted),
}

/// Errors from building the node tree or issuing requests.
#[derive(Error, Debug)]
pub enum RpcError {
    /// Name is empty or contains a path separator
    #[error("invalid name {0:?}")]
    InvalidName(String),

    /// Name does not fit bounded storage
    #[error("name too long: {len} bytes exceeds {max}")]
    NameTooLong {
        /// Length of the rejected name
        len: usize,
        /// Storage bound
        max: usize,
    },

    /// Sibling or method with this name already exists
    #[error("duplicate name {0:?}")]
    DuplicateName(String),

    /// A fixed-capacity table has no free entry
    #[error("{table} table full")]
    TableFull {
        /// Which table overflowed
        table: &'static str,
    },

    /// Every outstanding-request slot of the issuing node is busy
    #[error("outstanding request table full")]
    OutstandingRequestsFull,

    /// Handle does not name an entry of this tree
    #[error("unknown node {0}")]
    UnknownNode(usize),

    /// Entry exists but cannot perform the operation
    #[error("entry {id} is not a {expected}")]
    WrongEntryKind {
        /// Entry index
        id: usize,
        /// Kind the operation requires
        expected: &'static str,
    },

    /// Tree already has a top-level entry
    #[error("tree already has a root")]
    RootExists,

    /// Path exceeds bounded storage
    #[error("path too long: {len} bytes exceeds {max}")]
    PathTooLong {
        /// Length of the rejected path
        len: usize,
        /// Storage bound
        max: usize,
    },

    /// Params exceed bounded storage or a field exceeds 255 bytes
    #[error("params too long: {len} bytes exceeds {max}")]
    ParamsTooLong {
        /// Length of the rejected data
        len: usize,
        /// Storage bound
        max: usize,
    },

    /// Frame is not an RPC message
    #[error("not an rpc message")]
    NotRpc,

    /// Wire format error
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Pool exhausted while building an outgoing message
    #[error(transparent)]
    PoolExhausted(#[from] PoolExhausted),
}

impl RpcError {
    /// Code reported along the response path for this failure
    #[must_use]
    pub fn return_code(&self) -> ReturnCode {
        match self {
            Self::PathTooLong { .. } | Self::InvalidName(_) | Self::NameTooLong { .. } => {
                ReturnCode::MalformedPath
            },
            Self::ParamsTooLong { .. } => ReturnCode::InvalidParams,
            Self::UnknownNode(_) => ReturnCode::NodeDne,
            _ => ReturnCode::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_outstanding_table_maps_to_internal() {
        assert_eq!(RpcError::OutstandingRequestsFull.return_code(), ReturnCode::Internal);
    }

    #[test]
    fn path_errors_map_to_malformed_path() {
        let err = RpcError::PathTooLong { len: 200, max: 128 };
        assert_eq!(err.return_code(), ReturnCode::MalformedPath);
    }

    #[test]
    fn error_messages_are_descriptive() {
        let err = RpcError::TableFull { table: "method" };
        assert_eq!(err.to_string(), "method table full");

        let err = RpcError::from(ProtocolError::Malformed { field: "source" });
        assert_eq!(err.to_string(), "malformed source");
    }
}
