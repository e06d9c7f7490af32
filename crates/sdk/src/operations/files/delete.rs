use async_trait::async_trait;
use tangem_core::{CommandApdu, Instruction, ResponseApdu, TlvBuilder, TlvTag};

use super::{FileDataMode, check_files_available};
use crate::{
    Result,
    command::{Command, require_card, response_decoder},
    environment::SessionEnvironment,
    operations::SuccessResponse,
    types::Card,
};

/// Deletes the file in one slot
///
/// The card compacts its file table after a delete, so the slots after the
/// deleted one move down by one.
#[derive(Debug, Clone, Copy)]
pub struct DeleteFileCommand {
    file_index: u8,
}

impl DeleteFileCommand {
    /// Delete the file in slot `file_index`
    pub const fn new(file_index: u8) -> Self {
        Self { file_index }
    }
}

#[async_trait]
impl Command for DeleteFileCommand {
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
            .append(TlvTag::InteractionMode, FileDataMode::DeleteFile)?
            .append(TlvTag::FileIndex, self.file_index)?;
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
