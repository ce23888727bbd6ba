//! Bounded node names.

use std::fmt::{self, Write};

use crate::{error::RpcError, limits::MAX_NAME_LEN};

/// Node name: non-empty, at most [`MAX_NAME_LEN`] bytes, no `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeName(heapless::String<MAX_NAME_LEN>);

impl NodeName {
    /// Validate and copy `name`.
    ///
    /// # Errors
    ///
    /// - [`RpcError::NameTooLong`] if `name` exceeds [`MAX_NAME_LEN`] bytes
    /// - [`RpcError::InvalidName`] if `name` is empty or contains `/`
    pub fn new(name: &str) -> Result<Self, RpcError> {
        validate(name)?;
        let mut out = heapless::String::new();
        out.push_str(name).map_err(|()| RpcError::NameTooLong { len: name.len(), max: MAX_NAME_LEN })?;
        Ok(Self(out))
    }

    /// Build a name from format arguments, truncating on overflow.
    ///
    /// Output beyond [`MAX_NAME_LEN`] bytes is cut at the last whole
    /// character that fits, so `format_args!("sensor-{id}")` always yields a
    /// name rather than an error when it is too long. The truncated result
    /// must still be a valid name.
    ///
    /// ```
    /// use arbor_core::rpc::NodeName;
    ///
    /// let name = NodeName::format(format_args!("{}", "x".repeat(40))).unwrap();
    /// assert_eq!(name.as_str().len(), 32);
    /// ```
    pub fn format(args: fmt::Arguments<'_>) -> Result<Self, RpcError> {
        let mut out = Truncating(heapless::String::new());
        // Truncating never reports an error.
        let _ = out.write_fmt(args);
        validate(&out.0)?;
        Ok(Self(out.0))
    }

    /// Borrow as `&str`
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for NodeName {
    fn eq(&self, other: &str) -> bool {
        self.0.as_str() == other
    }
}

fn validate(name: &str) -> Result<(), RpcError> {
    if name.is_empty() || name.contains('/') {
        return Err(RpcError::InvalidName(name.to_owned()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(RpcError::NameTooLong { len: name.len(), max: MAX_NAME_LEN });
    }
    Ok(())
}

struct Truncating(heapless::String<MAX_NAME_LEN>);

impl Write for Truncating {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for ch in s.chars() {
            if self.0.push(ch).is_err() {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_simple_names() {
        let name = NodeName::new("dev1").unwrap();
        assert_eq!(name.as_str(), "dev1");
        assert!(name == *"dev1");
    }

    #[test]
    fn rejects_empty_and_separator() {
        assert!(matches!(NodeName::new(""), Err(RpcError::InvalidName(_))));
        assert!(matches!(NodeName::new("a/b"), Err(RpcError::InvalidName(_))));
    }

    #[test]
    fn new_is_strict_about_length() {
        let long = "n".repeat(MAX_NAME_LEN + 1);
        assert!(matches!(NodeName::new(&long), Err(RpcError::NameTooLong { len: 33, max: 32 })));
        assert!(NodeName::new(&long[..MAX_NAME_LEN]).is_ok());
    }

    #[test]
    fn format_truncates_at_char_boundary() {
        // 31 ASCII bytes followed by a two-byte character that does not fit
        let name = NodeName::format(format_args!("{}é", "a".repeat(31))).unwrap();
        assert_eq!(name.as_str(), "a".repeat(31));

        let id = 7;
        assert_eq!(NodeName::format(format_args!("sensor-{id}")).unwrap().as_str(), "sensor-7");
    }
}
