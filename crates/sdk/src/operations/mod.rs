//! Card commands
//!
//! One module per instruction family. Every command implements
//! [`Command`](crate::command::Command) and can be run on its own through
//! [`CardManager::start_session`](crate::CardManager::start_session) or
//! chained inside a task.

mod attest;
mod create_wallet;
mod files;
mod open_session;
mod purge_wallet;
mod read;
mod set_user_code;
mod sign;

use serde::{Deserialize, Serialize};

pub use attest::{AttestCardKeyCommand, AttestCardKeyResponse};
pub use create_wallet::{CreateWalletCommand, CreateWalletResponse};
pub use files::{
    ChangeFileSettingsCommand, DeleteFileCommand, FileDataMode, ReadFileCommand, WriteFileCommand,
    WriteFileResponse,
};
pub use open_session::{OpenSessionCommand, OpenSessionResponse};
pub use purge_wallet::PurgeWalletCommand;
pub use read::{
    ReadCommand, ReadMode, ReadWalletCommand, ReadWalletResponse, ReadWalletsListCommand,
    ReadWalletsListResponse,
};
pub use set_user_code::{SetUserCodeCommand, UserCodeChange};
pub use sign::{MAX_HASHES_PER_FRAME, SignHashesCommand, SignHashesResponse};

/// Response of commands that only echo the card id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessResponse {
    /// Card that executed the command
    pub card_id: String,
}
