//! Wire-level building blocks for talking to Tangem cards
//!
//! This crate provides the pieces every exchange with a card is made of:
//!
//! - the Tag-Length-Value codec used for every request and response payload
//!   ([`tlv`]), including the static tag table fixed by the card firmware
//! - outbound command frames and the instruction table ([`command`])
//! - inbound response frames and Tangem status words ([`response`])
//! - the synchronous [`CardTransport`] trait implemented by concrete readers
//!
//! Session handling, security delays and user-code prompts live in
//! `tangem-sdk`; this crate never blocks and holds no state.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

pub use bytes::{Bytes, BytesMut};

pub mod command;
pub mod response;
pub mod tlv;
pub mod transport;

mod error;
pub use error::{Error, Result, ResultExt};

pub use command::{CommandApdu, Instruction};
pub use response::ResponseApdu;
pub use response::status::StatusWord;
pub use tlv::{CardDate, Tlv, TlvBuilder, TlvDecoder, TlvList, TlvTag, TlvValue, TlvValueType};
pub use transport::{CardTransport, TransportError};

/// Prelude module containing commonly used traits and types
pub mod prelude {
    pub use crate::{
        Bytes, BytesMut, CardTransport, CommandApdu, Error, Instruction, ResponseApdu, Result,
        StatusWord, Tlv, TlvBuilder, TlvDecoder, TlvTag, TlvValue, TransportError,
    };
}
