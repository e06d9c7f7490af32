use async_trait::async_trait;
use tangem_core::{CommandApdu, Instruction, ResponseApdu, TlvBuilder, TlvTag};
use tracing::trace;

use super::wallet_slot;
use crate::{
    Error, Result,
    command::{Command, require_card, response_decoder},
    environment::SessionEnvironment,
    session::CardSession,
    types::{Card, File, FileSettings, FirmwareVersion},
};

/// One page of a file
#[derive(Debug, Clone, Default)]
struct FilePage {
    data: Vec<u8>,
    size: Option<u16>,
    file_index: Option<u8>,
    settings: Option<FileSettings>,
    wallet_index: Option<u8>,
}

/// Reads one file, page by page
///
/// Private files need the passcode or a security delay; enable
/// [`read_private_files`](Self::read_private_files) to read them.
#[derive(Debug, Clone)]
pub struct ReadFileCommand {
    file_index: u8,
    wallet_public_key: Option<Vec<u8>>,
    read_private: bool,
    wallet_index: Option<u32>,
    offset: usize,
}

impl ReadFileCommand {
    /// Read the file in slot `file_index`
    pub const fn new(file_index: u8) -> Self {
        Self {
            file_index,
            wallet_public_key: None,
            read_private: false,
            wallet_index: None,
            offset: 0,
        }
    }

    /// Only read files attached to this wallet
    pub fn with_wallet(mut self, public_key: impl Into<Vec<u8>>) -> Self {
        self.wallet_public_key = Some(public_key.into());
        self
    }

    /// Send the user codes so private files are returned too
    pub const fn read_private_files(mut self, read_private: bool) -> Self {
        self.read_private = read_private;
        self
    }

    /// Read a single page at the current offset
    async fn read_page(&self, session: &mut CardSession) -> Result<FilePage> {
        session.transceive(&PageRequest(self)).await
    }
}

/// The command at its current offset, decoded as a page
#[derive(Debug)]
struct PageRequest<'a>(&'a ReadFileCommand);

#[async_trait]
impl Command for PageRequest<'_> {
    type Response = FilePage;

    fn requires_passcode(&self) -> bool {
        self.0.read_private
    }

    fn perform_pre_check(&self, card: &Card) -> Result<()> {
        if card.firmware_version < FirmwareVersion::FILES_AVAILABLE {
            return Err(Error::NotSupportedFirmwareVersion);
        }
        Ok(())
    }

    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu> {
        let command = self.0;
        let card = require_card(environment)?;
        let offset = u16::try_from(command.offset)
            .map_err(|_| Error::SerializeCommandError("offset out of range".into()))?;

        let mut builder = TlvBuilder::new();
        builder
            .append(TlvTag::CardId, card.card_id.clone())?
            .append(TlvTag::FileIndex, command.file_index)?
            .append_opt(TlvTag::WalletIndex, command.wallet_index)?
            .append(TlvTag::Offset, offset)?;

        if command.read_private {
            builder
                .append_opt(TlvTag::Pin, environment.access_code_hash())?
                .append_opt(TlvTag::Pin2, environment.passcode_hash())?;
        } else if card.firmware_version < FirmwareVersion::MULTI_WALLET_AVAILABLE {
            builder.append_opt(TlvTag::Pin, environment.access_code_hash())?;
        }
        Ok(CommandApdu::new(Instruction::ReadFileData, builder.build()))
    }

    fn deserialize(&self, _environment: &SessionEnvironment, response: &ResponseApdu) -> Result<FilePage> {
        let decoder = response_decoder(response)?;
        Ok(FilePage {
            data: decoder.decode_optional(TlvTag::IssuerData)?.unwrap_or_default(),
            size: decoder.decode_optional(TlvTag::Size)?,
            file_index: decoder.decode_optional(TlvTag::FileIndex)?,
            settings: decoder
                .decode_optional::<Vec<u8>>(TlvTag::FileSettings)?
                .map(|raw| FileSettings::from_bytes(&raw))
                .transpose()?,
            wallet_index: decoder.decode_optional(TlvTag::WalletIndex)?,
        })
    }
}

#[async_trait]
impl Command for ReadFileCommand {
    type Response = File;

    fn requires_passcode(&self) -> bool {
        self.read_private
    }

    fn perform_pre_check(&self, card: &Card) -> Result<()> {
        PageRequest(self).perform_pre_check(card)
    }

    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu> {
        PageRequest(self).serialize(environment)
    }

    fn deserialize(&self, environment: &SessionEnvironment, response: &ResponseApdu) -> Result<File> {
        let page = PageRequest(self).deserialize(environment, response)?;
        Ok(File {
            index: page.file_index.unwrap_or(self.file_index),
            data: page.data,
            settings: page.settings,
            wallet_index: page.wallet_index,
        })
    }

    async fn run(&mut self, session: &mut CardSession) -> Result<File> {
        let card = require_card(session.environment())?;
        self.wallet_index = wallet_slot(card, self.wallet_public_key.as_deref())?;
        self.offset = 0;

        let mut file = File {
            index: self.file_index,
            data: Vec::new(),
            settings: None,
            wallet_index: None,
        };
        loop {
            let page = self.read_page(session).await?;
            trace!(offset = self.offset, len = page.data.len(), "File page read");
            file.index = page.file_index.unwrap_or(file.index);
            file.settings = page.settings.or(file.settings);
            file.wallet_index = page.wallet_index.or(file.wallet_index);
            let empty_page = page.data.is_empty();
            file.data.extend(page.data);
            self.offset = file.data.len();

            let Some(size) = page.size else { break };
            if file.data.len() >= usize::from(size) {
                break;
            }
            if empty_page {
                return Err(Error::InvalidResponse(format!(
                    "file {} stopped at {} of {size} bytes",
                    self.file_index,
                    file.data.len()
                )));
            }
        }
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use tangem_core::{StatusWord, Tlv, TlvDecoder};

    use super::*;
    use crate::{
        CardManager,
        testing::{self, CardFixture, MockReader, ScriptedDelegate},
        types::FileVisibility,
    };

    fn page(data: &[u8], size: u16) -> Vec<Tlv> {
        let mut tlvs = testing::card_id_response();
        tlvs.push(Tlv::new(TlvTag::Size, size.to_be_bytes().to_vec()));
        tlvs.push(Tlv::new(TlvTag::IssuerData, data.to_vec()));
        tlvs.push(Tlv::new(TlvTag::FileIndex, vec![2]));
        tlvs.push(Tlv::new(TlvTag::FileSettings, vec![0x01]));
        tlvs
    }

    #[tokio::test]
    async fn test_pages_until_size() {
        let reader = MockReader::new();
        testing::script_full_read(&reader, &CardFixture::new("4.52r", 1), &[]);
        reader.respond_tlvs(&page(&[1, 2, 3], 6));
        reader.respond_tlvs(&page(&[4, 5, 6], 6));

        let manager = CardManager::new(reader.clone(), ScriptedDelegate::shared());
        let file = manager
            .start_session(&mut ReadFileCommand::new(2), None)
            .await
            .unwrap();
        assert_eq!(file.data, [1, 2, 3, 4, 5, 6]);
        assert_eq!(file.index, 2);
        assert_eq!(file.settings.map(|s| s.visibility), Some(FileVisibility::Public));

        let second = TlvDecoder::from_bytes(reader.sent()[3].data()).unwrap();
        assert_eq!(second.decode::<u16>(TlvTag::Offset).unwrap(), 3);
        assert!(!second.contains(TlvTag::Pin2));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let reader = MockReader::new();
        testing::script_full_read(&reader, &CardFixture::new("4.52r", 1), &[]);
        reader.respond_status(StatusWord::FILE_NOT_FOUND);

        let manager = CardManager::new(reader, ScriptedDelegate::shared());
        assert_eq!(
            manager
                .start_session(&mut ReadFileCommand::new(0), None)
                .await
                .unwrap_err(),
            Error::FileNotFound
        );
    }

    #[tokio::test]
    async fn test_stalled_read() {
        let reader = MockReader::new();
        testing::script_full_read(&reader, &CardFixture::new("4.52r", 1), &[]);
        reader.respond_tlvs(&page(&[], 6));

        let manager = CardManager::new(reader, ScriptedDelegate::shared());
        let error = manager
            .start_session(&mut ReadFileCommand::new(2), None)
            .await
            .unwrap_err();
        assert!(matches!(error, Error::InvalidResponse(_)));
    }
}
