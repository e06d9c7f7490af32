//! Operations made of several commands
//!
//! Tasks run inside one session and stop at the first failing command.

mod derive;
mod files;
mod purge_wallets;
mod scan;

pub use derive::{DeriveWalletPublicKeyTask, DeriveWalletPublicKeysTask};
pub use files::{
    ChangeFilesSettingsTask, DeleteFilesTask, ReadFilesTask, WriteFilesResponse, WriteFilesTask,
};
pub use purge_wallets::PurgeWalletsTask;
pub use scan::{ScanResponse, ScanTask};
