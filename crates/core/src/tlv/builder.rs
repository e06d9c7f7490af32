//! Typed TLV encoder

use bytes::{BufMut, BytesMut};
use tracing::debug;

use super::{Tlv, TlvTag, TlvValue};
use crate::{Error, Result};

/// Builds a command payload one item at a time
///
/// Items are written in append order, which is the wire schema of the
/// command being built.
#[derive(Debug, Clone, Default)]
pub struct TlvBuilder {
    buf: BytesMut,
}

impl TlvBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, tlv: Tlv) -> Result<&mut Self> {
        debug!(tlv = %tlv, "Encoded");
        self.buf.put_slice(&tlv.encode()?);
        Ok(self)
    }

    /// Append a typed value
    ///
    /// Fails with [`Error::TypeMismatch`] when `T` cannot represent the
    /// tag's declared value type. A `false` flag is encoded by omitting
    /// the tag, since the card reads presence as `true`.
    pub fn append<T: TlvValue>(&mut self, tag: TlvTag, value: T) -> Result<&mut Self> {
        if !T::accepts(tag.value_type()) {
            return Err(Error::TypeMismatch {
                tag,
                value_type: tag.value_type(),
            });
        }
        if value.is_omitted() {
            return Ok(self);
        }
        let bytes = value.encode_value(tag)?;
        self.push(Tlv::new(tag, bytes))
    }

    /// Append a value when present
    pub fn append_opt<T: TlvValue>(&mut self, tag: TlvTag, value: Option<T>) -> Result<&mut Self> {
        match value {
            Some(value) => self.append(tag, value),
            None => Ok(self),
        }
    }

    /// Append raw bytes under a byte-array tag
    pub fn append_bytes(&mut self, tag: TlvTag, value: &[u8]) -> Result<&mut Self> {
        self.append(tag, value.to_vec())
    }

    /// Append another builder's output as a nested block
    pub fn append_nested(&mut self, tag: TlvTag, nested: &Self) -> Result<&mut Self> {
        self.append(tag, nested.build())
    }

    /// Whether nothing has been appended
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Encoded payload
    pub fn build(&self) -> Vec<u8> {
        self.buf.to_vec()
    }
}
