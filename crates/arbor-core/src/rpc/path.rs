//! Topic paths and directional markers.
//!
//! A path is a `/`-joined list of node names with an optional anchor prefix:
//!
//! - no prefix: rooted at the global root
//! - `~/`: rooted at the local root
//! - `~/../`: rooted at the local root of the tree on the far side of the
//!   link that owns this tree's local root
//!
//! Segments are validated lazily, one at a time, as routing consumes them. An
//! empty or oversized segment is reported as `MALFORMED_PATH` by the node that
//! reaches it, which keeps the failure on the response path.

use std::fmt::{self, Write};

use crate::{
    error::RpcError,
    limits::{MAX_NAME_LEN, MAX_PATH_LEN},
    rpc::MessageKind,
};

const LOCAL_PREFIX: &str = "~/";
const REMOTE_PREFIX: &str = "~/../";

/// Bounded storage for path text
pub type PathString = heapless::String<MAX_PATH_LEN>;

/// Where a path is rooted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Anchor {
    /// Global root
    #[default]
    Global,
    /// Local root of this tree
    Local,
    /// Local root of the tree across this tree's uplink
    Remote,
}

impl Anchor {
    fn prefix(self) -> &'static str {
        match self {
            Self::Global => "",
            Self::Local => LOCAL_PREFIX,
            Self::Remote => REMOTE_PREFIX,
        }
    }
}

/// Anchored, `/`-separated path of node names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicPath {
    anchor: Anchor,
    segments: PathString,
}

impl TopicPath {
    /// Parse an anchor prefix followed by segments.
    ///
    /// # Errors
    ///
    /// [`RpcError::PathTooLong`] if the segments exceed [`MAX_PATH_LEN`].
    pub fn parse(text: &str) -> Result<Self, RpcError> {
        let (anchor, rest) = if let Some(rest) = text.strip_prefix(REMOTE_PREFIX) {
            (Anchor::Remote, rest)
        } else if let Some(rest) = text.strip_prefix(LOCAL_PREFIX) {
            (Anchor::Local, rest)
        } else {
            (Anchor::Global, text)
        };

        let mut segments = PathString::new();
        segments
            .push_str(rest)
            .map_err(|()| RpcError::PathTooLong { len: rest.len(), max: MAX_PATH_LEN })?;
        Ok(Self { anchor, segments })
    }

    /// Empty path with `anchor`
    #[must_use]
    pub fn empty(anchor: Anchor) -> Self {
        Self { anchor, segments: PathString::new() }
    }

    /// Anchor of this path
    #[must_use]
    pub fn anchor(&self) -> Anchor {
        self.anchor
    }

    /// Replace the anchor, keeping segments
    pub fn set_anchor(&mut self, anchor: Anchor) {
        self.anchor = anchor;
    }

    /// Segment text without anchor
    #[must_use]
    pub fn segments(&self) -> &str {
        &self.segments
    }

    /// Whether no segments remain
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// First segment, validated.
    ///
    /// `Ok(None)` for an empty path.
    ///
    /// # Errors
    ///
    /// [`RpcError::InvalidName`] if the segment is empty (`a//b`, trailing
    /// `/`) and [`RpcError::NameTooLong`] if it exceeds [`MAX_NAME_LEN`].
    pub fn first_segment(&self) -> Result<Option<&str>, RpcError> {
        if self.segments.is_empty() {
            return Ok(None);
        }
        let first = self.segments.split('/').next().unwrap_or_default();
        if first.is_empty() {
            return Err(RpcError::InvalidName(self.segments.to_string()));
        }
        if first.len() > MAX_NAME_LEN {
            return Err(RpcError::NameTooLong { len: first.len(), max: MAX_NAME_LEN });
        }
        Ok(Some(first))
    }

    /// Remove the first segment and its separator
    pub fn strip_first(&mut self) {
        let rest = match self.segments.split_once('/') {
            Some((_, rest)) => rest,
            None => "",
        };
        let mut stripped = PathString::new();
        // `rest` is a suffix of the current value, so it fits.
        let _ = stripped.push_str(rest);
        self.segments = stripped;
    }

    /// Put `name` in front of the existing segments.
    ///
    /// # Errors
    ///
    /// [`RpcError::PathTooLong`] if the result exceeds [`MAX_PATH_LEN`].
    pub fn prepend(&mut self, name: &str) -> Result<(), RpcError> {
        let separator = !self.segments.is_empty();
        let len = name.len() + usize::from(separator) + self.segments.len();
        if len > MAX_PATH_LEN {
            return Err(RpcError::PathTooLong { len, max: MAX_PATH_LEN });
        }

        let mut joined = PathString::new();
        // Length checked above.
        let _ = joined.push_str(name);
        if separator {
            let _ = joined.push('/');
        }
        let _ = joined.push_str(&self.segments);
        self.segments = joined;
        Ok(())
    }

    /// Append `name` after the existing segments.
    ///
    /// # Errors
    ///
    /// [`RpcError::PathTooLong`] if the result exceeds [`MAX_PATH_LEN`].
    pub fn push(&mut self, name: &str) -> Result<(), RpcError> {
        let separator = !self.segments.is_empty();
        let len = self.segments.len() + usize::from(separator) + name.len();
        if len > MAX_PATH_LEN {
            return Err(RpcError::PathTooLong { len, max: MAX_PATH_LEN });
        }

        if separator {
            let _ = self.segments.push('/');
        }
        let _ = self.segments.push_str(name);
        Ok(())
    }
}

impl fmt::Display for TopicPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.anchor.prefix())?;
        f.write_str(&self.segments)
    }
}

/// Marker prefix for a message kind
#[must_use]
pub fn marker(kind: MessageKind) -> &'static str {
    match kind {
        MessageKind::Request => "->",
        MessageKind::Response => "<-",
        MessageKind::Notification => "^^",
    }
}

/// Split a topic into its message kind and the remaining path text.
///
/// `None` for topics without a marker, such as those published by
/// protocol-native clients.
#[must_use]
pub fn split_marker(topic: &str) -> Option<(MessageKind, &str)> {
    [MessageKind::Request, MessageKind::Response, MessageKind::Notification]
        .into_iter()
        .find_map(|kind| topic.strip_prefix(marker(kind)).map(|rest| (kind, rest)))
}

/// Render `marker + path` into a bounded topic buffer.
pub(crate) fn topic_for<const N: usize>(
    kind: MessageKind,
    path: &TopicPath,
) -> Result<heapless::String<N>, RpcError> {
    let mut topic = heapless::String::new();
    write!(topic, "{}{}", marker(kind), path)
        .map_err(|_| RpcError::PathTooLong { len: path.segments.len(), max: MAX_PATH_LEN })?;
    Ok(topic)
}
