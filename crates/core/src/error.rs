//! Core error type for codec and framing operations
//!
//! Every failure that can happen while building a request frame, parsing a
//! response frame or moving bytes over a transport is represented here.
//! `tangem-sdk` maps these onto its own, card-aware error taxonomy.

use crate::tlv::{TlvTag, TlvValueType};
use crate::transport::TransportError;

/// Core error type that encompasses all possible errors in the crate
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    //
    // TLV decoding errors
    //
    /// A TLV declared more value bytes than the buffer holds
    #[error("Truncated TLV for tag {tag:#04x}: declared {declared} bytes, {available} available")]
    Truncated {
        /// Raw tag byte of the truncated item
        tag: u8,
        /// Length declared in the TLV header
        declared: usize,
        /// Bytes actually remaining in the buffer
        available: usize,
    },

    /// The buffer ended inside a TLV header
    #[error("Truncated TLV header at offset {0}")]
    TruncatedHeader(usize),

    /// Tag byte that SIMPLE-TLV reserves (0x00 or 0xFF)
    #[error("Invalid tag byte {0:#04x}")]
    InvalidTag(u8),

    /// Error reported by the underlying TLV library
    #[error("TLV error: {0}")]
    Tlv(String),

    /// A mandatory tag is absent from the payload
    #[error("Missing mandatory tag {0}")]
    MissingTag(TlvTag),

    /// The requested Rust type does not match the declared value type of the tag
    #[error("Type mismatch for tag {tag}: tag holds {value_type}")]
    TypeMismatch {
        /// Tag being converted
        tag: TlvTag,
        /// Value type declared for the tag
        value_type: TlvValueType,
    },

    /// The tag was present but its value could not be converted
    #[error("Failed to decode tag {tag}: {reason}")]
    Decoding {
        /// Tag being decoded
        tag: TlvTag,
        /// What went wrong
        reason: &'static str,
    },

    /// The value could not be encoded for the tag
    #[error("Failed to encode tag {tag}: {reason}")]
    Encoding {
        /// Tag being encoded
        tag: TlvTag,
        /// What went wrong
        reason: &'static str,
    },

    //
    // Frame errors
    //
    /// Response frame shorter than a status word
    #[error("Malformed response: {0}")]
    MalformedResponse(&'static str),

    //
    // Transport errors
    //
    /// Error raised by the transport while moving bytes
    #[error(transparent)]
    Transport(#[from] TransportError),

    //
    // General errors
    //
    /// Context error with message and source error
    #[error("{context}: {source}")]
    Context {
        /// Contextual message
        context: String,
        /// Source error
        source: Box<Self>,
    },

    /// Generic dynamic error with string message
    #[error("{0}")]
    Message(String),
}

impl Error {
    /// Create a new error with context information
    pub fn with_context<S: Into<String>>(self, context: S) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create a new error with a dynamic message
    pub fn message<S: Into<String>>(message: S) -> Self {
        Self::Message(message.into())
    }

    /// Strip any context wrappers and return the innermost error
    pub fn root(&self) -> &Self {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether this error is a failure to parse bytes received from the card
    pub fn is_decoding(&self) -> bool {
        matches!(
            self.root(),
            Self::Truncated { .. }
                | Self::TruncatedHeader(_)
                | Self::InvalidTag(_)
                | Self::Tlv(_)
                | Self::MissingTag(_)
                | Self::TypeMismatch { .. }
                | Self::Decoding { .. }
                | Self::MalformedResponse(_)
        )
    }
}

impl From<iso7816_tlv::TlvError> for Error {
    fn from(error: iso7816_tlv::TlvError) -> Self {
        Self::Tlv(format!("{error:?}"))
    }
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for Result with core Errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context<S: Into<String>>(self, context: S) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context<S: Into<String>>(self, context: S) -> Self {
        self.map_err(|e| e.with_context(context))
    }
}
