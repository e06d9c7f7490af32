//! File storage commands
//!
//! Files live in numbered slots on cards running firmware 3.29 or newer. All
//! file instructions except reads go through `WriteFileData` and select the
//! action with a [`FileDataMode`].

mod delete;
mod read;
mod settings;
mod write;

use tangem_core::{TlvTag, TlvValue, TlvValueType};

pub use delete::DeleteFileCommand;
pub use read::ReadFileCommand;
pub use settings::ChangeFileSettingsCommand;
pub use write::{WriteFileCommand, WriteFileResponse};

use crate::{
    Error, Result,
    types::{Card, FirmwareVersion},
};

/// Action of a `WriteFileData` instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FileDataMode {
    /// Reserve a slot and announce the size
    InitiateWritingFile = 0x01,
    /// Write one chunk
    WriteFile = 0x02,
    /// Commit the written data
    ConfirmWritingFile = 0x03,
    /// Delete a file
    DeleteFile = 0x05,
    /// Replace the settings of a file
    ChangeFileSettings = 0x06,
}

impl TlvValue for FileDataMode {
    fn accepts(value_type: TlvValueType) -> bool {
        value_type == TlvValueType::InteractionMode
    }

    fn encode_value(&self, _tag: TlvTag) -> tangem_core::Result<Vec<u8>> {
        Ok(vec![*self as u8])
    }

    fn decode_value(tag: TlvTag, bytes: &[u8]) -> tangem_core::Result<Self> {
        match u8::decode_value(tag, bytes)? {
            0x01 => Ok(Self::InitiateWritingFile),
            0x02 => Ok(Self::WriteFile),
            0x03 => Ok(Self::ConfirmWritingFile),
            0x05 => Ok(Self::DeleteFile),
            0x06 => Ok(Self::ChangeFileSettings),
            _ => Err(tangem_core::Error::Decoding {
                tag,
                reason: "unknown file data mode",
            }),
        }
    }
}

/// Rejects cards that cannot store files
fn check_files_available(card: &Card) -> Result<()> {
    if card.firmware_version < FirmwareVersion::FILES_AVAILABLE {
        return Err(Error::NotSupportedFirmwareVersion);
    }
    if !card.settings.is_files_allowed() {
        return Err(Error::FilesDisabled);
    }
    Ok(())
}

/// Slot of the wallet a file is attached to
fn wallet_slot(card: &Card, public_key: Option<&[u8]>) -> Result<Option<u32>> {
    public_key
        .map(|key| card.wallet(key).map(|w| w.index).ok_or(Error::WalletNotFound))
        .transpose()
}

#[cfg(test)]
mod tests {
    use tangem_core::TlvBuilder;

    use super::*;

    #[test]
    fn test_mode_bytes() {
        let mut builder = TlvBuilder::new();
        builder
            .append(TlvTag::InteractionMode, FileDataMode::DeleteFile)
            .unwrap();
        assert_eq!(builder.build(), [0x23, 0x01, 0x05]);
        assert_eq!(
            FileDataMode::decode_value(TlvTag::InteractionMode, &[0x06]).unwrap(),
            FileDataMode::ChangeFileSettings
        );
        assert!(FileDataMode::decode_value(TlvTag::InteractionMode, &[0x04]).is_err());
    }
}
