//! Per-node method table and outstanding-request table.
//!
//! [`RpcNode`] holds no routing state; [`NodeTree`](super::NodeTree) owns the
//! topology and asks the node to dispatch a method or settle a response.
//!
//! # Correlation Ids
//!
//! Ids are allocated from a per-node wrapping counter, skipping zero and any id
//! still outstanding on this node. When every slot is busy a new request is
//! rejected immediately with [`RpcError::OutstandingRequestsFull`]; ids are
//! never reused while their request is pending.

use std::time::Instant;

use crate::{
    error::RpcError,
    limits::{MAX_METHOD_NAME_LEN, MAX_METHODS, MAX_OUTSTANDING_REQUESTS},
    rpc::{Params, ReturnCode, path::PathString},
};

/// Local method: reads input params, may write output params.
///
/// Output is only delivered when the handler returns [`ReturnCode::Success`].
pub type MethodHandler = Box<dyn FnMut(&Params, &mut Params) -> ReturnCode>;

/// Invoked once with the response code and output params, or with
/// [`ReturnCode::FailTimeout`] and empty params.
pub type ResponseCallback = Box<dyn FnOnce(ReturnCode, &Params)>;

type MethodName = heapless::String<MAX_METHOD_NAME_LEN>;

/// Who is waiting for a response
pub(crate) enum Pending {
    /// In-process caller
    Callback(ResponseCallback),
    /// Bridge client; the response is published back on `topic`
    Client { topic: PathString },
}

/// One request awaiting its response
pub(crate) struct Outstanding {
    pub(crate) id: u16,
    pub(crate) method: MethodName,
    pub(crate) deadline: Instant,
    pub(crate) pending: Pending,
}

/// Method and outstanding-request tables of one node.
#[derive(Default)]
pub struct RpcNode {
    methods: heapless::Vec<(MethodName, MethodHandler), MAX_METHODS>,
    outstanding: heapless::Vec<Outstanding, MAX_OUTSTANDING_REQUESTS>,
    next_id: u16,
}

impl RpcNode {
    /// Node with empty tables
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` as `name`.
    ///
    /// # Errors
    ///
    /// - [`RpcError::NameTooLong`] if `name` exceeds [`MAX_METHOD_NAME_LEN`]
    /// - [`RpcError::InvalidName`] if `name` is empty
    /// - [`RpcError::DuplicateName`] if `name` is already registered
    /// - [`RpcError::TableFull`] if [`MAX_METHODS`] are registered
    pub fn add_method(&mut self, name: &str, handler: MethodHandler) -> Result<(), RpcError> {
        if name.is_empty() {
            return Err(RpcError::InvalidName(name.to_owned()));
        }
        let method = method_name(name)?;
        if self.has_method(name) {
            return Err(RpcError::DuplicateName(name.to_owned()));
        }
        self.methods.push((method, handler)).map_err(|_| RpcError::TableFull { table: "method" })
    }

    /// Whether `name` is registered
    #[must_use]
    pub fn has_method(&self, name: &str) -> bool {
        self.methods.iter().any(|(method, _)| method == name)
    }

    /// Number of requests awaiting a response
    #[must_use]
    pub fn outstanding_len(&self) -> usize {
        self.outstanding.len()
    }

    /// Run `method` on `params`.
    ///
    /// Returns [`ReturnCode::MethodDne`] for an unknown method. Output params
    /// are cleared unless the handler succeeds.
    pub fn dispatch(&mut self, method: &str, params: &Params) -> (ReturnCode, Params) {
        let Some((_, handler)) = self.methods.iter_mut().find(|(name, _)| name == method) else {
            return (ReturnCode::MethodDne, Params::new());
        };
        let mut out = Params::new();
        let code = handler(params, &mut out);
        if !code.is_success() {
            out.clear();
        }
        (code, out)
    }

    /// Reserve an outstanding slot and return its correlation id.
    pub(crate) fn begin_request(
        &mut self,
        method: &str,
        deadline: Instant,
        pending: Pending,
    ) -> Result<u16, RpcError> {
        if self.outstanding.is_full() {
            return Err(RpcError::OutstandingRequestsFull);
        }
        let method = method_name(method)?;
        let id = self.allocate_id();
        // Fullness checked above.
        let _ = self.outstanding.push(Outstanding { id, method, deadline, pending });
        Ok(id)
    }

    /// Next id not in use by an outstanding request
    pub(crate) fn allocate_id(&mut self) -> u16 {
        loop {
            self.next_id = self.next_id.wrapping_add(1);
            let id = self.next_id;
            if id != 0 && !self.outstanding.iter().any(|entry| entry.id == id) {
                return id;
            }
        }
    }

    /// Remove and return the entry for `id`, if any.
    pub(crate) fn settle(&mut self, id: u16) -> Option<Outstanding> {
        let index = self.outstanding.iter().position(|entry| entry.id == id)?;
        Some(self.outstanding.swap_remove(index))
    }

    /// Remove and return every entry whose deadline is at or before `now`.
    pub(crate) fn take_expired(
        &mut self,
        now: Instant,
    ) -> heapless::Vec<Outstanding, MAX_OUTSTANDING_REQUESTS> {
        let mut expired = heapless::Vec::new();
        let mut index = 0;
        while index < self.outstanding.len() {
            if self.outstanding[index].deadline <= now {
                // Both vectors share one capacity.
                let _ = expired.push(self.outstanding.swap_remove(index));
            } else {
                index += 1;
            }
        }
        expired
    }
}

fn method_name(name: &str) -> Result<MethodName, RpcError> {
    let mut out = MethodName::new();
    out.push_str(name)
        .map_err(|()| RpcError::NameTooLong { len: name.len(), max: MAX_METHOD_NAME_LEN })?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn pending() -> Pending {
        Pending::Callback(Box::new(|_, _| {}))
    }

    #[test]
    fn dispatch_hits_registered_method() {
        let mut node = RpcNode::new();
        node.add_method(
            "echo",
            Box::new(|input, out| {
                *out = input.clone();
                ReturnCode::Success
            }),
        )
        .unwrap();

        let input = Params::from_str_field("hi").unwrap();
        assert_eq!(node.dispatch("echo", &input), (ReturnCode::Success, input));
        assert_eq!(node.dispatch("nope", &Params::new()), (ReturnCode::MethodDne, Params::new()));
    }

    #[test]
    fn failing_method_output_is_discarded() {
        let mut node = RpcNode::new();
        node.add_method(
            "picky",
            Box::new(|_, out| {
                out.push_str("partial").unwrap();
                ReturnCode::InvalidParams
            }),
        )
        .unwrap();

        assert_eq!(node.dispatch("picky", &Params::new()), (ReturnCode::InvalidParams, Params::new()));
    }

    #[test]
    fn method_table_rejects_duplicates_long_names_and_overflow() {
        let mut node = RpcNode::new();
        node.add_method("a", Box::new(|_, _| ReturnCode::Success)).unwrap();
        assert!(matches!(
            node.add_method("a", Box::new(|_, _| ReturnCode::Success)),
            Err(RpcError::DuplicateName(_))
        ));
        assert!(matches!(
            node.add_method(&"m".repeat(MAX_METHOD_NAME_LEN + 1), Box::new(|_, _| ReturnCode::Success)),
            Err(RpcError::NameTooLong { .. })
        ));

        for i in 1..MAX_METHODS {
            node.add_method(&format!("m{i}"), Box::new(|_, _| ReturnCode::Success)).unwrap();
        }
        assert!(matches!(
            node.add_method("extra", Box::new(|_, _| ReturnCode::Success)),
            Err(RpcError::TableFull { table: "method" })
        ));
    }

    #[test]
    fn full_table_rejects_without_reusing_ids() {
        let mut node = RpcNode::new();
        let deadline = Instant::now();
        let first = node.begin_request("m", deadline, pending()).unwrap();
        let second = node.begin_request("m", deadline, pending()).unwrap();
        assert_ne!(first, second);

        assert!(matches!(
            node.begin_request("m", deadline, pending()),
            Err(RpcError::OutstandingRequestsFull)
        ));
        assert_eq!(node.outstanding_len(), MAX_OUTSTANDING_REQUESTS);
    }

    #[test]
    fn allocation_skips_ids_in_use_across_wraparound() {
        let mut node = RpcNode::new();
        node.next_id = u16::MAX - 1;
        let held = node.begin_request("m", Instant::now(), pending()).unwrap();
        assert_eq!(held, u16::MAX);

        node.next_id = u16::MAX - 1;
        // u16::MAX is busy and 0 is never used
        assert_eq!(node.allocate_id(), 1);
    }

    #[test]
    fn expiry_is_inclusive_of_deadline() {
        let mut node = RpcNode::new();
        let start = Instant::now();
        let id = node.begin_request("m", start + Duration::from_secs(2), pending()).unwrap();

        assert!(node.take_expired(start + Duration::from_millis(1999)).is_empty());
        let expired = node.take_expired(start + Duration::from_secs(2));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, id);
        assert_eq!(node.outstanding_len(), 0);
        assert!(node.settle(id).is_none());
    }
}
