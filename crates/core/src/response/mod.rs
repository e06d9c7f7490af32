//! Card response frames
//!
//! A response frame is the payload followed by a two byte status word. The
//! payload, when present, is always a TLV sequence.

pub mod status;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::tlv::Tlv;
use crate::{Error, Result};
use status::StatusWord;

/// Response received from the card
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseApdu {
    /// Response payload data, possibly empty
    data: Bytes,
    /// Status word
    status: StatusWord,
}

impl ResponseApdu {
    /// Create a new response with payload and status
    pub fn new(data: impl Into<Bytes>, status: impl Into<StatusWord>) -> Self {
        Self {
            data: data.into(),
            status: status.into(),
        }
    }

    /// Create a response carrying a TLV payload and `90 00`
    pub fn success(tlvs: &[Tlv]) -> Result<Self> {
        Ok(Self::new(
            Tlv::encode_all(tlvs)?,
            StatusWord::PROCESS_COMPLETED,
        ))
    }

    /// Parse response from raw bytes (including status word)
    pub fn from_bytes(raw: Bytes) -> Result<Self> {
        if raw.len() < 2 {
            return Err(Error::MalformedResponse("frame shorter than status word"));
        }

        let split = raw.len() - 2;
        let status = StatusWord::new(raw[split], raw[split + 1]);
        let data = raw.slice(..split);

        trace!(
            sw = %status,
            payload_len = data.len(),
            "Parsed response frame"
        );

        Ok(Self { data, status })
    }

    /// Get the status word
    pub const fn status_word(&self) -> StatusWord {
        self.status
    }

    /// Raw payload without the status word
    pub const fn data(&self) -> &Bytes {
        &self.data
    }

    /// Parse the payload as a TLV sequence
    ///
    /// Returns `Ok(None)` for an empty payload. A payload that does not parse
    /// is an error, never an empty result.
    pub fn tlv_data(&self) -> Result<Option<Vec<Tlv>>> {
        if self.data.is_empty() {
            return Ok(None);
        }
        Tlv::decode_all(&self.data).map(Some)
    }

    /// Serialize back to wire form
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.data.len() + 2);
        buf.put_slice(&self.data);
        buf.put_u8(self.status.sw1);
        buf.put_u8(self.status.sw2);
        buf.freeze()
    }
}

impl TryFrom<&[u8]> for ResponseApdu {
    type Error = Error;

    fn try_from(data: &[u8]) -> Result<Self> {
        Self::from_bytes(Bytes::copy_from_slice(data))
    }
}

impl From<ResponseApdu> for Bytes {
    fn from(response: ResponseApdu) -> Self {
        response.to_bytes()
    }
}
