//! Static bounds for every fixed-capacity table.
//!
//! All memory the runtime uses is sized by these constants. Raising one grows
//! the corresponding `heapless` container; nothing grows at runtime.

/// Children per tree node
pub const MAX_SUBNODES: usize = 4;

/// Methods registered on one node
pub const MAX_METHODS: usize = 8;

/// Bytes in a node name
pub const MAX_NAME_LEN: usize = 32;

/// Bytes in a method name
pub const MAX_METHOD_NAME_LEN: usize = 24;

/// Requests one node may have awaiting a response
pub const MAX_OUTSTANDING_REQUESTS: usize = 2;

/// Link-established listeners per link
pub const MAX_LINK_LISTENERS: usize = 2;

/// Bytes in a topic path, markers excluded
pub const MAX_PATH_LEN: usize = 128;

/// Bytes of method parameters or notification data
pub const MAX_PARAMS_LEN: usize = 128;

/// Nodes, links and bridges in one tree
pub const MAX_TREE_ENTRIES: usize = 16;

/// Topic filters one bridge client may hold
pub const MAX_SUBSCRIPTIONS: usize = 4;

/// Bytes of client identifier a bridge session can store
pub const MAX_CLIENT_ID_LEN: usize = 64;

/// Message slots in a pool built with [`MessagePool::default`](crate::MessagePool)
pub const DEFAULT_POOL_CAPACITY: usize = 8;

/// Routing steps before a message is assumed to be looping
pub const MAX_ROUTE_HOPS: usize = 4 * MAX_TREE_ENTRIES;
