use async_trait::async_trait;
use tangem_core::{CommandApdu, Instruction, ResponseApdu, TlvBuilder, TlvTag};

use super::{FileDataMode, check_files_available};
use crate::{
    Result,
    command::{Command, require_card, response_decoder},
    environment::SessionEnvironment,
    operations::SuccessResponse,
    types::{Card, FileVisibility},
};

/// Changes who may read a file
#[derive(Debug, Clone, Copy)]
pub struct ChangeFileSettingsCommand {
    file_index: u8,
    visibility: FileVisibility,
}

impl ChangeFileSettingsCommand {
    /// Give the file in slot `file_index` a new visibility
    pub const fn new(file_index: u8, visibility: FileVisibility) -> Self {
        Self {
            file_index,
            visibility,
        }
    }
}

#[async_trait]
impl Command for ChangeFileSettingsCommand {
    type Response = SuccessResponse;

    fn requires_passcode(&self) -> bool {
        true
    }

    fn perform_pre_check(&self, card: &Card) -> Result<()> {
        check_files_available(card)
    }

    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu> {
        let card = require_card(environment)?;
        let mut builder = TlvBuilder::new();
        builder
            .append(TlvTag::CardId, card.card_id.clone())?
            .append_opt(TlvTag::Pin, environment.access_code_hash())?
            .append_opt(TlvTag::Pin2, environment.passcode_hash())?
            .append(TlvTag::InteractionMode, FileDataMode::ChangeFileSettings)?
            .append(TlvTag::FileIndex, self.file_index)?
            .append(
                TlvTag::FileSettings,
                self.visibility.serialize_value(card.firmware_version),
            )?;
        Ok(CommandApdu::new(Instruction::WriteFileData, builder.build()))
    }

    fn deserialize(
        &self,
        _environment: &SessionEnvironment,
        response: &ResponseApdu,
    ) -> Result<SuccessResponse> {
        Ok(SuccessResponse {
            card_id: response_decoder(response)?.decode(TlvTag::CardId)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;
    use tangem_core::TlvDecoder;

    use super::*;
    use crate::{environment::SessionEnvironment, testing};

    #[test]
    fn test_settings_follow_firmware() {
        let mut environment = SessionEnvironment::new(Default::default());
        environment.card =
            Some(Card::decode(&TlvDecoder::new(testing::card_tlvs("4.52r", 1))).unwrap());

        let apdu = ChangeFileSettingsCommand::new(1, FileVisibility::Public)
            .serialize(&environment)
            .unwrap();
        let request = TlvDecoder::from_bytes(apdu.data()).unwrap();
        assert_eq!(request.decode::<Vec<u8>>(TlvTag::FileSettings).unwrap(), hex!("01"));
        assert_eq!(
            request.decode::<FileDataMode>(TlvTag::InteractionMode).unwrap(),
            FileDataMode::ChangeFileSettings
        );
    }
}
