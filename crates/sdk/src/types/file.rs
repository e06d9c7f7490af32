use serde::{Deserialize, Serialize};

use super::FirmwareVersion;
use crate::{Error, Result};

const RAW_PUBLIC: u8 = 0x01;
const RAW_PERMANENT: u8 = 0x10;

/// Who may read a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileVisibility {
    /// Readable without any code
    Public,
    /// Readable with the passcode or after the security delay
    Private,
}

impl FileVisibility {
    /// Raw settings as sent to a card running `firmware`
    pub fn serialize_value(self, firmware: FirmwareVersion) -> Vec<u8> {
        let raw = match self {
            Self::Public => RAW_PUBLIC,
            Self::Private => 0x00,
        };
        if firmware < FirmwareVersion::MULTI_WALLET_AVAILABLE {
            vec![0x00, raw]
        } else {
            vec![raw]
        }
    }
}

/// Settings of a stored file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileSettings {
    /// The file cannot be deleted
    pub is_permanent: bool,
    /// Read permission
    pub visibility: FileVisibility,
}

impl FileSettings {
    /// Decode the raw settings reported by the card
    ///
    /// Old firmware sends two bytes and has no permanent files.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let significant = *bytes
            .last()
            .ok_or_else(|| Error::DecodingFailed("empty file settings".into()))?;

        if bytes.len() == 2 {
            return Ok(Self {
                is_permanent: false,
                visibility: if significant == RAW_PUBLIC {
                    FileVisibility::Public
                } else {
                    FileVisibility::Private
                },
            });
        }

        Ok(Self {
            is_permanent: significant & RAW_PERMANENT != 0,
            visibility: if significant & RAW_PUBLIC != 0 {
                FileVisibility::Public
            } else {
                FileVisibility::Private
            },
        })
    }
}

/// A file read from the card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    /// Slot index
    pub index: u8,
    /// Contents
    pub data: Vec<u8>,
    /// Settings, when reported
    pub settings: Option<FileSettings>,
    /// Wallet the file is attached to
    pub wallet_index: Option<u8>,
}

/// A file the user wants to store
///
/// Writes are protected by the passcode or the security delay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileToWrite {
    /// Contents
    pub data: Vec<u8>,
    /// Read permission, multi-wallet firmware only
    pub visibility: Option<FileVisibility>,
    /// Wallet to attach the file to, multi-wallet firmware only
    pub wallet_public_key: Option<Vec<u8>>,
}

impl FileToWrite {
    /// Private file not attached to a wallet
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            visibility: None,
            wallet_public_key: None,
        }
    }

    /// Set the read permission
    pub const fn with_visibility(mut self, visibility: FileVisibility) -> Self {
        self.visibility = Some(visibility);
        self
    }

    /// Attach the file to a wallet
    pub fn with_wallet(mut self, public_key: impl Into<Vec<u8>>) -> Self {
        self.wallet_public_key = Some(public_key.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_by_firmware() {
        let v3 = FirmwareVersion::new(3, 34);
        let v4 = FirmwareVersion::new(4, 52);
        assert_eq!(FileVisibility::Public.serialize_value(v3), vec![0x00, 0x01]);
        assert_eq!(FileVisibility::Public.serialize_value(v4), vec![0x01]);
        assert_eq!(FileVisibility::Private.serialize_value(v4), vec![0x00]);
    }

    #[test]
    fn test_decode_settings() {
        let settings = FileSettings::from_bytes(&[0x11]).unwrap();
        assert!(settings.is_permanent);
        assert_eq!(settings.visibility, FileVisibility::Public);

        let legacy = FileSettings::from_bytes(&[0x00, 0x01]).unwrap();
        assert!(!legacy.is_permanent);
        assert_eq!(legacy.visibility, FileVisibility::Public);

        assert_eq!(
            FileSettings::from_bytes(&[0x00]).unwrap().visibility,
            FileVisibility::Private
        );
        assert!(FileSettings::from_bytes(&[]).is_err());
    }
}
