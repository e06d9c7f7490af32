use std::{collections::BTreeMap, sync::Arc};

use derive_more::Display;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::{
    BackupCard, BackupRepository, BackupSession, FinalizeBackupCardTask, FinalizePrimaryCardTask,
    PrimaryCard, SlaveState, StartBackupCardLinkingTask, StartPrimaryCardLinkingCommand,
};
use crate::{
    CardManager, Error, Result,
    crypto::sha256,
    types::{UserCode, UserCodeType},
};

/// Step of a backup
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackupState {
    /// Nothing read yet
    Preparing,
    /// Reading the primary card
    ReadingPrimaryCard,
    /// Primary card read, backup cards can be added
    AddingBackupCard,
    /// Backup cards added and the new codes chosen
    SettingAccessCode,
    /// Writing to the cards; codes can no longer change
    Finalizing,
    /// Every linked backup card is finalized
    Completed,
}

/// Outcome of a finished backup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupReport {
    /// Primary card id
    pub primary_card_id: String,
    /// Final state of each backup card
    pub backup_cards: BTreeMap<String, SlaveState>,
}

impl BackupReport {
    /// Backup cards holding the wallets
    pub fn finalized(&self) -> impl Iterator<Item = &str> {
        self.backup_cards
            .iter()
            .filter(|(_, state)| **state == SlaveState::Finalized)
            .map(|(id, _)| id.as_str())
    }

    /// Backup cards left out, with the error code
    pub fn failed(&self) -> impl Iterator<Item = (&str, u32)> {
        self.backup_cards.iter().filter_map(|(id, state)| match state {
            SlaveState::Failed(code) => Some((id.as_str(), *code)),
            _ => None,
        })
    }
}

/// Drives a backup from the first card read to the last card written
///
/// Each card operation starts its own session on the card manager. A backup
/// interrupted while writing to the cards is saved in the manager's storage
/// and picked up by the next service created over it.
#[derive(Debug)]
pub struct BackupService {
    manager: Arc<CardManager>,
    repository: BackupRepository,
    backup: BackupSession,
    state: BackupState,
}

impl BackupService {
    /// Service over `manager`, resuming a saved backup if there is one
    pub fn new(manager: Arc<CardManager>) -> Result<Self> {
        let repository = BackupRepository::new(manager.storage());
        let backup = repository.load()?.unwrap_or_default();
        let state = if backup.attest_signature.is_some() {
            BackupState::Finalizing
        } else if backup.primary.is_some() {
            BackupState::AddingBackupCard
        } else {
            BackupState::Preparing
        };
        if state == BackupState::Finalizing {
            info!("Resuming saved backup");
        }
        Ok(Self {
            manager,
            repository,
            backup,
            state,
        })
    }

    /// Current step
    pub const fn state(&self) -> BackupState {
        self.state
    }

    /// Material collected so far
    pub const fn session(&self) -> &BackupSession {
        &self.backup
    }

    /// Whether another backup card fits
    pub fn can_add_backup_cards(&self) -> bool {
        matches!(
            self.state,
            BackupState::AddingBackupCard | BackupState::SettingAccessCode
        ) && self.backup.slaves.len() < self.manager.config().max_backup_cards
    }

    fn handle_errors(&self) -> bool {
        self.manager.config().handle_errors
    }

    /// Read the primary card
    #[instrument(level = "debug", skip(self))]
    pub async fn read_primary_card(&mut self, card_id: Option<&str>) -> Result<PrimaryCard> {
        let previous = self.state;
        let can_read = previous == BackupState::Preparing
            || (previous == BackupState::AddingBackupCard && self.backup.slaves.is_empty());
        if !can_read {
            return Err(Error::BackupServiceInvalidState);
        }

        self.state = BackupState::ReadingPrimaryCard;
        let result = self
            .manager
            .start_session(&mut StartPrimaryCardLinkingCommand::new(), card_id)
            .await;
        match result {
            Ok(primary) => {
                debug!(card_id = %primary.card_id, "Primary card read");
                self.backup.primary = Some(primary.clone());
                self.state = BackupState::AddingBackupCard;
                Ok(primary)
            }
            Err(error) => {
                self.state = previous;
                Err(error)
            }
        }
    }

    /// Read and add a backup card
    #[instrument(level = "debug", skip(self))]
    pub async fn add_backup_card(&mut self) -> Result<BackupCard> {
        let primary = self.backup.primary.clone().ok_or(Error::MissingPrimaryCard)?;
        if !matches!(
            self.state,
            BackupState::AddingBackupCard | BackupState::SettingAccessCode
        ) {
            return Err(Error::BackupServiceInvalidState);
        }
        if self.handle_errors() && self.backup.slaves.len() >= self.manager.config().max_backup_cards
        {
            return Err(Error::TooMuchBackupCards);
        }

        let mut task = StartBackupCardLinkingTask::new(primary, self.backup.order.clone());
        let card = self.manager.start_session(&mut task, None).await?;
        debug!(card_id = %card.card_id, "Backup card added");
        self.backup.add_slave(card.clone());
        Ok(card)
    }

    /// Choose the access code shared by every card of the backup
    pub fn set_access_code(&mut self, code: &str) -> Result<()> {
        self.set_code(UserCodeType::AccessCode, code)
    }

    /// Choose the passcode shared by every card of the backup
    pub fn set_passcode(&mut self, code: &str) -> Result<()> {
        self.set_code(UserCodeType::Passcode, code)
    }

    fn set_code(&mut self, kind: UserCodeType, code: &str) -> Result<()> {
        let (required, cannot_change, cannot_be_default) = match kind {
            UserCodeType::AccessCode => (
                Error::AccessCodeRequired,
                Error::AccessCodeCannotBeChanged,
                Error::AccessCodeCannotBeDefault,
            ),
            UserCodeType::Passcode => (
                Error::PasscodeRequired,
                Error::PasscodeCannotBeChanged,
                Error::PasscodeCannotBeChanged,
            ),
        };

        if matches!(self.state, BackupState::Finalizing | BackupState::Completed) {
            return Err(cannot_change);
        }
        if self.handle_errors() {
            if code.is_empty() {
                return Err(required);
            }
            if UserCode::new(kind, code).is_default() {
                return Err(cannot_be_default);
            }
        }

        let hash = Some(sha256(code.as_bytes()));
        match kind {
            UserCodeType::AccessCode => self.backup.access_code = hash,
            UserCodeType::Passcode => self.backup.passcode = hash,
        }
        if self.state == BackupState::AddingBackupCard && !self.backup.slaves.is_empty() {
            self.state = BackupState::SettingAccessCode;
        }
        Ok(())
    }

    /// Write the backup to the primary card, then to each backup card
    ///
    /// Backup cards whose attestation fails are reported in the
    /// [`BackupReport`] instead of failing the backup. Any other error
    /// leaves the service in [`BackupState::Finalizing`]; calling again
    /// continues where it stopped.
    #[instrument(level = "debug", skip(self))]
    pub async fn proceed_backup(&mut self) -> Result<BackupReport> {
        self.check_ready()?;
        self.state = BackupState::Finalizing;

        let primary_id = self
            .backup
            .primary
            .as_ref()
            .map(|p| p.card_id.clone())
            .ok_or(Error::MissingPrimaryCard)?;

        if !self.backup.primary_finalized {
            let mut task = FinalizePrimaryCardTask::new(&mut self.backup, &self.repository);
            self.manager.start_session(&mut task, Some(&primary_id)).await?;
            info!(card_id = %primary_id, "Primary card finalized");
        }

        let pending: Vec<String> = self
            .backup
            .slaves()
            .filter(|s| s.state == SlaveState::Initialized)
            .map(|s| s.card.card_id.clone())
            .collect();
        for card_id in pending {
            let mut task = FinalizeBackupCardTask::new(&self.backup, &card_id)?;
            self.manager.start_session(&mut task, Some(&card_id)).await?;
            if let Some(slave) = self.backup.slaves.get_mut(&card_id) {
                slave.state = SlaveState::Finalized;
            }
            self.repository.save(&self.backup)?;
            info!(%card_id, "Backup card finalized");
        }

        let report = BackupReport {
            primary_card_id: primary_id,
            backup_cards: self
                .backup
                .slaves
                .iter()
                .map(|(id, slave)| (id.clone(), slave.state))
                .collect(),
        };
        for (card_id, code) in report.failed() {
            warn!(%card_id, code, "Backup card left out");
        }

        self.repository.clear()?;
        self.backup = BackupSession::default();
        self.state = BackupState::Completed;
        info!("Backup completed");
        Ok(report)
    }

    fn check_ready(&self) -> Result<()> {
        match self.state {
            BackupState::Finalizing => return Ok(()),
            BackupState::Preparing | BackupState::AddingBackupCard | BackupState::SettingAccessCode => {}
            BackupState::ReadingPrimaryCard | BackupState::Completed => {
                return Err(Error::BackupServiceInvalidState);
            }
        }
        if self.backup.primary.is_none() {
            return Err(Error::MissingPrimaryCard);
        }
        if self.handle_errors() {
            if self.backup.slaves.is_empty() {
                return Err(Error::EmptyBackupCards);
            }
            if self.backup.slaves.len() > self.manager.config().max_backup_cards {
                return Err(Error::TooMuchBackupCards);
            }
            if self.backup.access_code.is_none() && self.backup.passcode.is_none() {
                return Err(Error::AccessCodeOrPasscodeRequired);
            }
        }
        Ok(())
    }

    /// Forget the backup in progress
    ///
    /// Cards that were already written keep their state; use
    /// [`ResetBackupCommand`](super::ResetBackupCommand) on them.
    pub fn discard_saved_backup(&mut self) -> Result<()> {
        self.repository.clear()?;
        self.backup = BackupSession::default();
        self.state = BackupState::Preparing;
        info!("Backup discarded");
        Ok(())
    }
}
