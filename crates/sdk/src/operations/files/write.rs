use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tangem_core::{CommandApdu, Instruction, ResponseApdu, TlvBuilder, TlvTag};
use tracing::{debug, instrument};

use super::{FileDataMode, check_files_available, wallet_slot};
use crate::{
    Error, Result,
    command::{Command, require_card, response_decoder},
    crypto::sha256,
    environment::SessionEnvironment,
    session::CardSession,
    types::{Card, FileToWrite, FirmwareVersion},
};

/// Bytes written per frame
pub(crate) const CHUNK_SIZE: usize = 900;
/// Largest file a card accepts
pub(crate) const MAX_FILE_SIZE: usize = 48 * 1024;

const USER_FILES_AVAILABLE: FirmwareVersion = FirmwareVersion::new(3, 34);

/// Result of a file write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteFileResponse {
    /// Card id
    pub card_id: String,
    /// Slot the file was written to
    pub file_index: Option<u8>,
}

/// Writes one file, protected by the passcode
///
/// The write is a three step exchange: the card reserves a slot, the data is
/// sent in chunks of 900 bytes and the card commits it after checking its
/// SHA-256 hash.
#[derive(Debug, Clone)]
pub struct WriteFileCommand {
    file: FileToWrite,
    mode: FileDataMode,
    offset: usize,
    file_index: u8,
    wallet_index: Option<u32>,
}

impl WriteFileCommand {
    /// Write `file`
    pub const fn new(file: FileToWrite) -> Self {
        Self {
            file,
            mode: FileDataMode::InitiateWritingFile,
            offset: 0,
            file_index: 0,
            wallet_index: None,
        }
    }

    fn chunk(&self) -> &[u8] {
        let end = (self.offset + CHUNK_SIZE).min(self.file.data.len());
        self.file.data.get(self.offset..end).unwrap_or_default()
    }
}

#[async_trait]
impl Command for WriteFileCommand {
    type Response = WriteFileResponse;

    fn requires_passcode(&self) -> bool {
        true
    }

    fn perform_pre_check(&self, card: &Card) -> Result<()> {
        check_files_available(card)?;
        if card.firmware_version < USER_FILES_AVAILABLE {
            return Err(Error::NotSupportedFirmwareVersion);
        }
        let has_settings = self.file.visibility.is_some() || self.file.wallet_public_key.is_some();
        if has_settings && card.firmware_version < FirmwareVersion::MULTI_WALLET_AVAILABLE {
            return Err(Error::FileSettingsUnsupported);
        }
        if self.file.data.len() > MAX_FILE_SIZE {
            return Err(Error::DataSizeTooLarge);
        }
        Ok(())
    }

    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu> {
        let card = require_card(environment)?;
        let mut builder = TlvBuilder::new();
        builder
            .append(TlvTag::CardId, card.card_id.clone())?
            .append_opt(TlvTag::Pin, environment.access_code_hash())?
            .append(TlvTag::InteractionMode, self.mode)?;

        match self.mode {
            FileDataMode::InitiateWritingFile => {
                let size = u16::try_from(self.file.data.len()).map_err(|_| Error::DataSizeTooLarge)?;
                builder
                    .append(TlvTag::Size, size)?
                    .append_opt(TlvTag::Pin2, environment.passcode_hash())?
                    .append_opt(TlvTag::WalletIndex, self.wallet_index)?
                    .append_opt(
                        TlvTag::FileSettings,
                        self.file
                            .visibility
                            .map(|v| v.serialize_value(card.firmware_version)),
                    )?;
            }
            FileDataMode::WriteFile => {
                let offset = u16::try_from(self.offset).map_err(|_| Error::DataSizeTooLarge)?;
                builder
                    .append_bytes(TlvTag::IssuerData, self.chunk())?
                    .append(TlvTag::Offset, offset)?
                    .append(TlvTag::FileIndex, self.file_index)?;
            }
            FileDataMode::ConfirmWritingFile => {
                builder
                    .append(TlvTag::FileIndex, self.file_index)?
                    .append(TlvTag::CodeHash, sha256(&self.file.data).to_vec())?
                    .append_opt(TlvTag::Pin2, environment.passcode_hash())?;
            }
            mode => {
                return Err(Error::SerializeCommandError(format!(
                    "{mode:?} is not a write step"
                )));
            }
        }
        Ok(CommandApdu::new(Instruction::WriteFileData, builder.build()))
    }

    fn deserialize(
        &self,
        _environment: &SessionEnvironment,
        response: &ResponseApdu,
    ) -> Result<WriteFileResponse> {
        let decoder = response_decoder(response)?;
        Ok(WriteFileResponse {
            card_id: decoder.decode(TlvTag::CardId)?,
            file_index: decoder.decode_optional(TlvTag::FileIndex)?,
        })
    }

    #[instrument(level = "debug", skip_all, fields(size = self.file.data.len()))]
    async fn run(&mut self, session: &mut CardSession) -> Result<WriteFileResponse> {
        let card = require_card(session.environment())?;
        self.wallet_index = wallet_slot(card, self.file.wallet_public_key.as_deref())?;
        self.mode = FileDataMode::InitiateWritingFile;
        self.offset = 0;

        let initiated = session.transceive(&*self).await?;
        self.file_index = initiated.file_index.unwrap_or_default();
        debug!(file_index = self.file_index, "File slot reserved");

        self.mode = FileDataMode::WriteFile;
        while self.offset < self.file.data.len() {
            session.transceive(&*self).await?;
            self.offset += CHUNK_SIZE;
            debug!(
                written = self.offset.min(self.file.data.len()),
                "File chunk written"
            );
        }

        self.mode = FileDataMode::ConfirmWritingFile;
        let confirmed = session.transceive(&*self).await?;
        Ok(WriteFileResponse {
            card_id: confirmed.card_id,
            file_index: Some(self.file_index),
        })
    }
}
