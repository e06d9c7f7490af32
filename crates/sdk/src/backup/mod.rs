//! Multi-card backup
//!
//! A backup binds one primary card to up to
//! [`Config::max_backup_cards`](crate::config::Config::max_backup_cards)
//! backup cards. The primary card hands out a linking key, every backup card
//! answers with its own linking key signed by its card key, the primary card
//! exports its wallets encrypted for each backup card and each backup card
//! imports them. All cards end up protected by one shared access code.
//!
//! [`BackupService`] drives the protocol across the sessions it needs and
//! keeps its progress in a [`BackupRepository`], so an interrupted backup can
//! be resumed.

mod data;
mod finalize;
mod linking;
mod repository;
mod reset;
mod service;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use data::{
    FinalizeReadBackupDataCommand, ReadBackupDataCommand, ReadBackupDataResponse,
    WriteBackupDataCommand, WriteBackupDataResponse,
};
pub use finalize::{FinalizeBackupCardTask, FinalizePrimaryCardTask};
pub use linking::{
    LinkBackupCardsCommand, LinkBackupCardsResponse, LinkPrimaryCardCommand,
    LinkPrimaryCardResponse, StartBackupCardLinkingCommand, StartBackupCardLinkingTask,
    StartPrimaryCardLinkingCommand,
};
pub use repository::BackupRepository;
pub use reset::{ResetBackupCommand, ResetBackupResponse};
pub use service::{BackupReport, BackupService, BackupState};

use crate::{
    Result, crypto,
    types::{EllipticCurve, FirmwareVersion, Issuer, UserCodeType},
};

/// Exchange material of the primary card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryCard {
    /// Card id
    pub card_id: String,
    /// Card public key
    pub card_public_key: Vec<u8>,
    /// Linking key handed to the backup cards
    pub linking_key: Vec<u8>,
    /// Wallets the backup cards must have room for
    pub existing_wallets_count: usize,
    /// HD wallet setting, which the backup cards must share
    pub is_hd_wallet_allowed: bool,
    /// Issuer, which the backup cards must share
    pub issuer: Issuer,
    /// Curves of the existing wallets
    pub wallet_curves: Vec<EllipticCurve>,
    /// Batch id
    pub batch_id: String,
    /// Firmware version
    pub firmware_version: FirmwareVersion,
}

/// Exchange material of a backup card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupCard {
    /// Card id
    pub card_id: String,
    /// Card public key
    pub card_public_key: Vec<u8>,
    /// Linking key of the backup card
    pub linking_key: Vec<u8>,
    /// Card key signature over `linking_key || card_id`
    pub attest_signature: Vec<u8>,
    /// Batch id
    pub batch_id: String,
    /// Firmware version
    pub firmware_version: FirmwareVersion,
}

impl BackupCard {
    /// Whether the linking key was signed by the card key
    ///
    /// The card id is signed in its binary form.
    pub fn verify_attestation(&self) -> Result<bool> {
        let Ok(card_id) = hex::decode(&self.card_id) else {
            return Ok(false);
        };
        let message = [self.linking_key.as_slice(), card_id.as_slice()].concat();
        crypto::verify(&self.card_public_key, &message, &self.attest_signature)
    }
}

/// Wallet material exported by the primary card for one backup card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedBackupData {
    /// Encrypted wallet
    pub data: Vec<u8>,
    /// Salt of the encryption key
    pub salt: Vec<u8>,
}

/// Progress of one backup card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlaveState {
    /// Added, not linked yet
    NoBackup,
    /// Linked; its data was read from the primary card
    Initialized,
    /// Data written, backup active on the card
    Finalized,
    /// Left out of the backup, with the error code
    Failed(u32),
}

/// A backup card and its progress
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupSlave {
    /// Exchange material
    pub card: BackupCard,
    /// Progress
    pub state: SlaveState,
    /// Wallet material read from the primary card
    pub data: Vec<EncryptedBackupData>,
}

impl BackupSlave {
    const fn new(card: BackupCard) -> Self {
        Self {
            card,
            state: SlaveState::NoBackup,
            data: Vec::new(),
        }
    }

    /// Whether the card takes part in the link
    pub const fn is_linked(&self) -> bool {
        !matches!(self.state, SlaveState::Failed(_))
    }
}

/// Everything a backup needs between sessions
///
/// Backup cards are kept in the order they were added: the position of a
/// card in that order is its slot in the link.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupSession {
    /// Primary card
    pub primary: Option<PrimaryCard>,
    /// Backup cards by card id
    pub slaves: BTreeMap<String, BackupSlave>,
    /// Card ids in the order they were added
    pub order: Vec<String>,
    /// New access code hash
    pub access_code: Option<[u8; 32]>,
    /// New passcode hash
    pub passcode: Option<[u8; 32]>,
    /// Signature of the primary card over the link
    pub attest_signature: Option<Vec<u8>>,
    /// The primary card confirmed its data was read
    pub primary_finalized: bool,
}

impl BackupSession {
    /// Backup cards in link order
    pub fn slaves(&self) -> impl Iterator<Item = &BackupSlave> {
        self.order.iter().filter_map(|id| self.slaves.get(id))
    }

    /// Backup cards taking part in the link, in link order
    pub fn linked_cards(&self) -> Vec<BackupCard> {
        self.slaves()
            .filter(|s| s.is_linked())
            .map(|s| s.card.clone())
            .collect()
    }

    fn add_slave(&mut self, card: BackupCard) {
        self.order.push(card.card_id.clone());
        self.slaves.insert(card.card_id.clone(), BackupSlave::new(card));
    }

    fn code_or_default(&self, kind: UserCodeType) -> [u8; 32] {
        let code = match kind {
            UserCodeType::AccessCode => self.access_code,
            UserCodeType::Passcode => self.passcode,
        };
        code.unwrap_or_else(|| crypto::sha256(kind.default_value().as_bytes()))
    }
}
