//! Method parameters.
//!
//! Params are a bounded byte region. Most methods treat it as a sequence of
//! fields, each a one-byte length followed by that many bytes; notifications
//! and bridge traffic carry it as opaque data.

use crate::{error::RpcError, limits::MAX_PARAMS_LEN};

/// Bounded, length-prefixed parameter buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    buf: heapless::Vec<u8, MAX_PARAMS_LEN>,
}

impl Params {
    /// Empty params
    #[must_use]
    pub const fn new() -> Self {
        Self { buf: heapless::Vec::new() }
    }

    /// Copy raw bytes.
    ///
    /// # Errors
    ///
    /// [`RpcError::ParamsTooLong`] if `bytes` exceeds [`MAX_PARAMS_LEN`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RpcError> {
        let buf = heapless::Vec::from_slice(bytes)
            .map_err(|()| RpcError::ParamsTooLong { len: bytes.len(), max: MAX_PARAMS_LEN })?;
        Ok(Self { buf })
    }

    /// Single-field params holding `value`
    pub fn from_str_field(value: &str) -> Result<Self, RpcError> {
        let mut params = Self::new();
        params.push_str(value)?;
        Ok(params)
    }

    /// Raw bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Length in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether no bytes are held
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Drop all bytes
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Append a length-prefixed field.
    ///
    /// # Errors
    ///
    /// [`RpcError::ParamsTooLong`] if the field exceeds 255 bytes or the
    /// buffer would overflow. Nothing is appended in that case.
    pub fn push_field(&mut self, field: &[u8]) -> Result<(), RpcError> {
        let len = self.buf.len() + 1 + field.len();
        let Ok(prefix) = u8::try_from(field.len()) else {
            return Err(RpcError::ParamsTooLong { len: field.len(), max: usize::from(u8::MAX) });
        };
        if len > MAX_PARAMS_LEN {
            return Err(RpcError::ParamsTooLong { len, max: MAX_PARAMS_LEN });
        }
        // Capacity checked above.
        let _ = self.buf.push(prefix);
        let _ = self.buf.extend_from_slice(field);
        Ok(())
    }

    /// Append a UTF-8 field
    pub fn push_str(&mut self, value: &str) -> Result<(), RpcError> {
        self.push_field(value.as_bytes())
    }

    /// Iterate fields. Stops at the first truncated field.
    pub fn fields(&self) -> Fields<'_> {
        Fields { rest: &self.buf }
    }

    /// Field at `index`
    #[must_use]
    pub fn field(&self, index: usize) -> Option<&[u8]> {
        self.fields().nth(index)
    }

    /// Field at `index` as UTF-8
    #[must_use]
    pub fn str_field(&self, index: usize) -> Option<&str> {
        self.field(index).and_then(|bytes| std::str::from_utf8(bytes).ok())
    }
}

/// Iterator over length-prefixed fields
#[derive(Debug, Clone)]
pub struct Fields<'a> {
    rest: &'a [u8],
}

impl<'a> Iterator for Fields<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        let (&len, tail) = self.rest.split_first()?;
        let len = usize::from(len);
        if tail.len() < len {
            self.rest = &[];
            return None;
        }
        let (field, rest) = tail.split_at(len);
        self.rest = rest;
        Some(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_round_trip() {
        let mut params = Params::new();
        params.push_str("leafA").unwrap();
        params.push_field(&[1, 2]).unwrap();
        params.push_field(&[]).unwrap();

        let fields: Vec<&[u8]> = params.fields().collect();
        assert_eq!(fields, vec![&b"leafA"[..], &[1, 2][..], &[][..]]);
        assert_eq!(params.str_field(0), Some("leafA"));
        assert_eq!(params.field(3), None);
    }

    #[test]
    fn truncated_field_ends_iteration() {
        let params = Params::from_bytes(&[1, b'a', 5, b'b']).unwrap();
        assert_eq!(params.fields().count(), 1);
    }

    #[test]
    fn overflow_leaves_params_unchanged() {
        let mut params = Params::from_bytes(&[0; MAX_PARAMS_LEN - 2]).unwrap();
        assert!(matches!(params.push_field(&[1, 2]), Err(RpcError::ParamsTooLong { .. })));
        assert_eq!(params.len(), MAX_PARAMS_LEN - 2);
        assert!(Params::from_bytes(&[0; MAX_PARAMS_LEN + 1]).is_err());
    }
}
