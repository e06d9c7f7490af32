use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tangem_core::{CommandApdu, Instruction, ResponseApdu, TlvBuilder, TlvTag};
use tracing::info;

use crate::{
    Error, Result,
    command::{Command, require_card, response_decoder},
    environment::SessionEnvironment,
    session::CardSession,
    types::{BackupRawStatus, BackupStatus, Card, FirmwareVersion, SettingsMask},
};

/// Card state after a backup reset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetBackupResponse {
    /// Card id
    pub card_id: String,
    /// Raw backup status, `NoBackup` on success
    pub backup_status: BackupRawStatus,
    /// Settings after the reset
    pub settings_mask: SettingsMask,
    /// The access code is back to its default
    pub is_default_access_code: bool,
    /// The passcode is back to its default
    pub is_default_passcode: bool,
}

/// Drops the backup link of a card
///
/// Only allowed while none of the card's wallets is backed up.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResetBackupCommand;

impl ResetBackupCommand {
    /// New command
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Command for ResetBackupCommand {
    type Response = ResetBackupResponse;

    fn requires_passcode(&self) -> bool {
        true
    }

    fn perform_pre_check(&self, card: &Card) -> Result<()> {
        if card.firmware_version < FirmwareVersion::BACKUP_AVAILABLE {
            return Err(Error::BackupFailedFirmware);
        }
        if !card.backup_status.is_some_and(|s| s.is_active()) {
            return Err(Error::NoActiveBackup);
        }
        if card.wallets.iter().any(|w| w.has_backup) {
            return Err(Error::ResetBackupFailedHasBackedUpWallets);
        }
        Ok(())
    }

    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu> {
        let card = require_card(environment)?;
        let mut builder = TlvBuilder::new();
        builder
            .append(TlvTag::CardId, card.card_id.clone())?
            .append_opt(TlvTag::Pin, environment.access_code_hash())?
            .append_opt(TlvTag::Pin2, environment.passcode_hash())?;
        Ok(CommandApdu::new(Instruction::BackupReset, builder.build()))
    }

    fn deserialize(
        &self,
        _environment: &SessionEnvironment,
        response: &ResponseApdu,
    ) -> Result<ResetBackupResponse> {
        let decoder = response_decoder(response)?;
        Ok(ResetBackupResponse {
            card_id: decoder.decode(TlvTag::CardId)?,
            backup_status: decoder.decode(TlvTag::BackupStatus)?,
            settings_mask: decoder.decode(TlvTag::SettingsMask)?,
            is_default_access_code: decoder.decode(TlvTag::PinIsDefault)?,
            is_default_passcode: decoder.decode(TlvTag::Pin2IsDefault)?,
        })
    }

    async fn run(&mut self, session: &mut CardSession) -> Result<ResetBackupResponse> {
        let response = session.transceive(&*self).await?;
        if response.backup_status != BackupRawStatus::NoBackup {
            return Err(Error::UnknownError);
        }

        let card = session
            .environment_mut()
            .card
            .as_mut()
            .ok_or(Error::MissingPreflightRead)?;
        card.backup_status = Some(BackupStatus::NoBackup);
        card.is_access_code_set = Some(!response.is_default_access_code);
        card.is_passcode_set = Some(!response.is_default_passcode);
        card.settings.mask = response.settings_mask;
        info!(card_id = %card.card_id, "Backup reset");
        Ok(response)
    }
}
