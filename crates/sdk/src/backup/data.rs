use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tangem_core::{CommandApdu, Instruction, ResponseApdu, TlvBuilder, TlvTag};
use tracing::{debug, trace};

use super::EncryptedBackupData;
use crate::{
    Error, Result,
    command::{Command, require_card, response_decoder},
    environment::SessionEnvironment,
    operations::SuccessResponse,
    session::CardSession,
    types::{BackupRawStatus, BackupStatus, Card, FirmwareVersion},
};

fn check_linked(card: &Card) -> Result<()> {
    if card.firmware_version < FirmwareVersion::BACKUP_AVAILABLE {
        return Err(Error::BackupFailedFirmware);
    }
    if !card.settings.is_backup_allowed() {
        return Err(Error::BackupNotAllowed);
    }
    match card.backup_status {
        None | Some(BackupStatus::NoBackup) => Err(Error::BackupFailedCardNotLinked),
        Some(_) => Ok(()),
    }
}

/// Wallet material the primary card exported for one backup card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadBackupDataResponse {
    /// Card id
    pub card_id: String,
    /// One entry per wallet
    pub data: Vec<EncryptedBackupData>,
}

/// One exported wallet
#[derive(Debug)]
struct BackupDataPage {
    card_id: String,
    data: EncryptedBackupData,
    wallet_index: u32,
}

/// Reads the wallets of the primary card, encrypted for one backup card
///
/// The card returns one wallet per frame and the command repeats until the
/// last wallet slot has been exported.
#[derive(Debug, Clone)]
pub struct ReadBackupDataCommand {
    backup_linking_key: Vec<u8>,
    access_code: [u8; 32],
}

impl ReadBackupDataCommand {
    /// Export for the backup card owning `backup_linking_key`
    pub fn new(backup_linking_key: impl Into<Vec<u8>>, access_code: [u8; 32]) -> Self {
        Self {
            backup_linking_key: backup_linking_key.into(),
            access_code,
        }
    }

    fn request(&self) -> ReadBackupPage<'_> {
        ReadBackupPage(self)
    }
}

#[derive(Debug)]
struct ReadBackupPage<'a>(&'a ReadBackupDataCommand);

impl Command for ReadBackupPage<'_> {
    type Response = BackupDataPage;

    fn perform_pre_check(&self, card: &Card) -> Result<()> {
        check_linked(card)?;
        if card.wallets.is_empty() {
            return Err(Error::BackupFailedEmptyWallets);
        }
        Ok(())
    }

    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu> {
        let card = require_card(environment)?;
        let mut builder = TlvBuilder::new();
        builder
            .append(TlvTag::CardId, card.card_id.clone())?
            .append_bytes(TlvTag::Pin, &self.0.access_code)?
            .append_bytes(TlvTag::BackupCardLinkingKey, &self.0.backup_linking_key)?;
        Ok(CommandApdu::new(Instruction::ReadBackupData, builder.build()))
    }

    fn deserialize(&self, _environment: &SessionEnvironment, response: &ResponseApdu) -> Result<BackupDataPage> {
        let decoder = response_decoder(response)?;
        Ok(BackupDataPage {
            card_id: decoder.decode(TlvTag::CardId)?,
            data: EncryptedBackupData {
                data: decoder.decode(TlvTag::IssuerData)?,
                salt: decoder.decode(TlvTag::Salt)?,
            },
            wallet_index: decoder.decode(TlvTag::WalletIndex)?,
        })
    }
}

#[async_trait]
impl Command for ReadBackupDataCommand {
    type Response = ReadBackupDataResponse;

    fn perform_pre_check(&self, card: &Card) -> Result<()> {
        self.request().perform_pre_check(card)
    }

    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu> {
        self.request().serialize(environment)
    }

    fn deserialize(
        &self,
        environment: &SessionEnvironment,
        response: &ResponseApdu,
    ) -> Result<ReadBackupDataResponse> {
        let page = self.request().deserialize(environment, response)?;
        Ok(ReadBackupDataResponse {
            card_id: page.card_id,
            data: vec![page.data],
        })
    }

    async fn run(&mut self, session: &mut CardSession) -> Result<ReadBackupDataResponse> {
        let last_slot = u32::from(require_card(session.environment())?.settings.max_wallets_count)
            .saturating_sub(1);

        let first = session.transceive(&self.request()).await?;
        trace!(wallet_index = first.wallet_index, "Backup data read");
        let card_id = first.card_id;
        let mut last_index = first.wallet_index;
        let mut data = vec![first.data];
        while last_index < last_slot {
            let page = session.transceive(&self.request()).await?;
            trace!(wallet_index = page.wallet_index, "Backup data read");
            last_index = page.wallet_index;
            data.push(page.data);
        }

        if let Some(card) = session.environment_mut().card.as_mut() {
            if let Some(BackupStatus::CardLinked { cards_count }) = card.backup_status {
                card.backup_status = Some(BackupStatus::Active { cards_count });
                for wallet in &mut card.wallets {
                    wallet.has_backup = true;
                }
            }
        }
        debug!(wallets = data.len(), "Backup data exported");
        Ok(ReadBackupDataResponse { card_id, data })
    }
}

/// Tells the primary card that every backup card got its data
#[derive(Debug, Clone)]
pub struct FinalizeReadBackupDataCommand {
    access_code: [u8; 32],
}

impl FinalizeReadBackupDataCommand {
    /// Confirm under the new access code
    pub const fn new(access_code: [u8; 32]) -> Self {
        Self { access_code }
    }
}

impl Command for FinalizeReadBackupDataCommand {
    type Response = SuccessResponse;

    fn perform_pre_check(&self, card: &Card) -> Result<()> {
        check_linked(card)
    }

    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu> {
        let card = require_card(environment)?;
        let mut builder = TlvBuilder::new();
        builder
            .append(TlvTag::CardId, card.card_id.clone())?
            .append_bytes(TlvTag::Pin, &self.access_code)?;
        Ok(CommandApdu::new(Instruction::FinalizeReadBackupData, builder.build()))
    }

    fn deserialize(&self, _environment: &SessionEnvironment, response: &ResponseApdu) -> Result<SuccessResponse> {
        let decoder = response_decoder(response)?;
        Ok(SuccessResponse {
            card_id: decoder.decode(TlvTag::CardId)?,
        })
    }
}

/// Backup status after the data was imported
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteBackupDataResponse {
    /// Card id
    pub card_id: String,
    /// Raw backup status
    pub backup_status: BackupRawStatus,
}

/// Imports the wallets of the primary card into a backup card, one per frame
#[derive(Debug, Clone)]
pub struct WriteBackupDataCommand {
    data: Vec<EncryptedBackupData>,
    access_code: [u8; 32],
    passcode: [u8; 32],
    index: usize,
}

impl WriteBackupDataCommand {
    /// Import `data` under the new user codes
    pub const fn new(data: Vec<EncryptedBackupData>, access_code: [u8; 32], passcode: [u8; 32]) -> Self {
        Self {
            data,
            access_code,
            passcode,
            index: 0,
        }
    }
}

#[async_trait]
impl Command for WriteBackupDataCommand {
    type Response = WriteBackupDataResponse;

    fn perform_pre_check(&self, card: &Card) -> Result<()> {
        check_linked(card)?;
        if !card.wallets.is_empty() {
            return Err(Error::BackupFailedNotEmptyWallets(card.card_id.clone()));
        }
        Ok(())
    }

    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu> {
        let card = require_card(environment)?;
        let item = self.data.get(self.index).ok_or(Error::NoBackupDataForCard)?;
        let mut builder = TlvBuilder::new();
        builder
            .append(TlvTag::CardId, card.card_id.clone())?
            .append_bytes(TlvTag::Pin, &self.access_code)?
            .append_bytes(TlvTag::Pin2, &self.passcode)?
            .append_bytes(TlvTag::Salt, &item.salt)?
            .append_bytes(TlvTag::IssuerData, &item.data)?;
        Ok(CommandApdu::new(Instruction::WriteBackupData, builder.build()))
    }

    fn deserialize(
        &self,
        _environment: &SessionEnvironment,
        response: &ResponseApdu,
    ) -> Result<WriteBackupDataResponse> {
        let decoder = response_decoder(response)?;
        Ok(WriteBackupDataResponse {
            card_id: decoder.decode(TlvTag::CardId)?,
            backup_status: decoder.decode(TlvTag::BackupStatus)?,
        })
    }

    async fn run(&mut self, session: &mut CardSession) -> Result<WriteBackupDataResponse> {
        if self.data.is_empty() {
            return Err(Error::NoBackupDataForCard);
        }

        let mut response = None;
        for index in 0..self.data.len() {
            self.index = index;
            response = Some(session.transceive(&*self).await?);
            trace!(index, "Backup data written");
        }
        let response = response.ok_or(Error::NoBackupDataForCard)?;

        if let Some(card) = session.environment_mut().card.as_mut() {
            if let Some(BackupStatus::CardLinked { cards_count }) = card.backup_status {
                card.backup_status = Some(BackupStatus::from_raw(response.backup_status, cards_count));
            }
        }
        Ok(response)
    }
}
