//! Session engine and operations for Tangem NFC cards
//!
//! Built on the wire codec of `tangem-core`, this crate adds:
//!
//! - the [`CardSession`] engine: tag waits, preflight reads, card filters,
//!   security delays, user code prompts and reconnects after tag loss
//! - one [`Command`](command::Command) per card instruction
//!   ([`operations`]) and multi-command [`tasks`]
//! - the multi-card [`backup`] protocol and its resumable
//!   [`BackupService`](backup::BackupService)
//! - card attestation ([`attestation`])
//!
//! Readers plug in through [`CardReader`](reader::CardReader); every
//! operation is started from a [`CardManager`].
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

pub mod attestation;
pub mod backup;
pub mod command;
pub mod config;
pub mod crypto;
pub mod delegate;
pub mod environment;
pub mod operations;
pub mod reader;
pub mod session;
pub mod storage;
pub mod tasks;
pub mod types;

mod error;
pub use error::{Error, ErrorCategory, Result, ResultExt};

pub use config::Config;
pub use session::{CardManager, CardSession};

#[cfg(test)]
mod testing;

/// Prelude module containing commonly used traits and types
pub mod prelude {
    pub use crate::{
        CardManager, CardSession, Config, Error, Result,
        command::{CardSessionRunnable, Command},
        delegate::SessionViewDelegate,
        reader::CardReader,
        storage::SecureStorage,
        types::{Card, CardWallet, EllipticCurve, UserCodeType},
    };
}
