use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use super::{
    BackupCard, BackupRepository, BackupSession, EncryptedBackupData, FinalizeReadBackupDataCommand,
    LinkBackupCardsCommand, LinkPrimaryCardCommand, PrimaryCard, ReadBackupDataCommand,
    SlaveState, WriteBackupDataCommand,
};
use crate::{
    Error, Result,
    command::{CardSessionRunnable, Command, require_card},
    operations::ReadWalletsListCommand,
    session::CardSession,
    types::{BackupRawStatus, Card, UserCode, UserCodeType},
};

/// Links the backup cards on the primary card and exports its wallets
///
/// Each backup card's attestation is checked first; a card that fails is
/// marked [`SlaveState::Failed`] and left out of the link while the others
/// go ahead. Progress is saved after every step so the task can resume.
#[derive(Debug)]
pub struct FinalizePrimaryCardTask<'a> {
    backup: &'a mut BackupSession,
    repository: &'a BackupRepository,
}

impl<'a> FinalizePrimaryCardTask<'a> {
    /// Finalize `backup` on its primary card, saving progress to `repository`
    pub const fn new(backup: &'a mut BackupSession, repository: &'a BackupRepository) -> Self {
        Self { backup, repository }
    }

    fn verify_backup_cards(&mut self) {
        for slave in self.backup.slaves.values_mut() {
            if slave.state != SlaveState::NoBackup {
                continue;
            }
            let error = match slave.card.verify_attestation() {
                Ok(true) => continue,
                Ok(false) => Error::CardVerificationFailed,
                Err(error) => error,
            };
            warn!(card_id = %slave.card.card_id, %error, "Backup card attestation failed");
            slave.state = SlaveState::Failed(error.code());
        }
    }

    /// The card was linked but the signature got lost: it already uses the
    /// new codes wherever codes were set
    fn adopt_codes_of_linked_card(&self, session: &mut CardSession) -> Result<()> {
        let card = require_card(session.environment())?;
        let access_code_set = card.is_access_code_set != Some(false);
        let passcode_set = card.is_passcode_set == Some(true);

        let environment = session.environment_mut();
        if access_code_set {
            environment.set_user_code(UserCode::from_hash(
                UserCodeType::AccessCode,
                self.backup.code_or_default(UserCodeType::AccessCode),
            ));
        }
        if passcode_set {
            environment.set_user_code(UserCode::from_hash(
                UserCodeType::Passcode,
                self.backup.code_or_default(UserCodeType::Passcode),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl CardSessionRunnable for FinalizePrimaryCardTask<'_> {
    type Output = Card;

    #[instrument(level = "debug", skip_all)]
    async fn execute(&mut self, session: &mut CardSession) -> Result<Card> {
        let status = require_card(session.environment())?
            .backup_status
            .ok_or(Error::BackupFailedFirmware)?;
        let access_code = self.backup.code_or_default(UserCodeType::AccessCode);
        let passcode = self.backup.code_or_default(UserCodeType::Passcode);

        if self.backup.attest_signature.is_none() {
            if !status.can_backup() {
                self.adopt_codes_of_linked_card(session)?;
            }
            self.verify_backup_cards();
            let cards = self.backup.linked_cards();
            if cards.is_empty() {
                return Err(Error::EmptyBackupCards);
            }

            let linked = LinkBackupCardsCommand::new(cards, access_code, passcode)
                .run(session)
                .await?;
            self.backup.attest_signature = Some(linked.attest_signature);
            self.backup.primary_finalized = false;
            self.repository.save(self.backup)?;
        }

        let pending: Vec<String> = self
            .backup
            .slaves()
            .filter(|s| s.state == SlaveState::NoBackup)
            .map(|s| s.card.card_id.clone())
            .collect();
        for card_id in pending {
            let slave = self
                .backup
                .slaves
                .get_mut(&card_id)
                .ok_or(Error::NoBackupCardForIndex)?;
            let response = ReadBackupDataCommand::new(slave.card.linking_key.clone(), access_code)
                .run(session)
                .await?;
            slave.data = response.data;
            slave.state = SlaveState::Initialized;
            debug!(%card_id, "Backup data read");
            self.repository.save(self.backup)?;
        }

        if !self.backup.primary_finalized {
            match FinalizeReadBackupDataCommand::new(access_code).run(session).await {
                Ok(_) => {}
                // Finalized earlier, the response was lost
                Err(Error::InvalidState) => debug!("Backup data read was already finalized"),
                Err(error) => return Err(error),
            }
            self.backup.primary_finalized = true;
            self.repository.save(self.backup)?;
        }

        Ok(require_card(session.environment())?.clone())
    }
}

/// Links one backup card to the primary card and imports its wallets
#[derive(Debug, Clone)]
pub struct FinalizeBackupCardTask {
    primary: PrimaryCard,
    backup_cards: Vec<BackupCard>,
    data: Vec<EncryptedBackupData>,
    attest_signature: Vec<u8>,
    access_code: [u8; 32],
    passcode: [u8; 32],
}

impl FinalizeBackupCardTask {
    /// Finalize the backup card `card_id` of `backup`
    pub fn new(backup: &BackupSession, card_id: &str) -> Result<Self> {
        let primary = backup.primary.clone().ok_or(Error::MissingPrimaryCard)?;
        let attest_signature = backup
            .attest_signature
            .clone()
            .ok_or(Error::MissingPrimaryAttestSignature)?;
        let slave = backup.slaves.get(card_id).ok_or(Error::NoBackupCardForIndex)?;
        if slave.data.is_empty() {
            return Err(Error::NoBackupDataForCard);
        }

        Ok(Self {
            primary,
            backup_cards: backup.linked_cards(),
            data: slave.data.clone(),
            attest_signature,
            access_code: backup.code_or_default(UserCodeType::AccessCode),
            passcode: backup.code_or_default(UserCodeType::Passcode),
        })
    }
}

#[async_trait]
impl CardSessionRunnable for FinalizeBackupCardTask {
    type Output = Card;

    #[instrument(level = "debug", skip_all)]
    async fn execute(&mut self, session: &mut CardSession) -> Result<Card> {
        let status = require_card(session.environment())?.backup_status;
        if status.is_some_and(|s| s.can_backup()) {
            LinkPrimaryCardCommand::new(
                self.primary.clone(),
                self.backup_cards.clone(),
                self.attest_signature.clone(),
                self.access_code,
                self.passcode,
            )
            .run(session)
            .await?;
        }

        let written = WriteBackupDataCommand::new(self.data.clone(), self.access_code, self.passcode)
            .run(session)
            .await?;
        if written.backup_status != BackupRawStatus::Active {
            warn!(status = %written.backup_status, "Backup card did not activate");
            return Err(Error::UnknownError);
        }

        ReadWalletsListCommand::new().execute(session).await?;
        Ok(require_card(session.environment())?.clone())
    }
}
