//! Card snapshot decoded from a read response

use derive_more::Display;
use serde::{Deserialize, Serialize};
use tangem_core::{CardDate, TlvDecoder, TlvTag, TlvValue, TlvValueType};

use super::{CardWallet, EllipticCurve, FirmwareVersion};
use crate::{Error, Result};

fn decoding_error(tag: TlvTag, reason: &'static str) -> tangem_core::Error {
    tangem_core::Error::Decoding { tag, reason }
}

/// Card life cycle status
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CardStatus {
    /// Never personalized
    NotPersonalized = 0,
    /// No wallet
    Empty = 1,
    /// Wallet created
    Loaded = 2,
    /// Wallet purged
    Purged = 3,
}

impl TlvValue for CardStatus {
    fn accepts(value_type: TlvValueType) -> bool {
        value_type == TlvValueType::Status
    }

    fn encode_value(&self, _tag: TlvTag) -> tangem_core::Result<Vec<u8>> {
        Ok(vec![*self as u8])
    }

    fn decode_value(tag: TlvTag, bytes: &[u8]) -> tangem_core::Result<Self> {
        match u8::decode_value(tag, bytes)? {
            0 => Ok(Self::NotPersonalized),
            1 => Ok(Self::Empty),
            2 => Ok(Self::Loaded),
            3 => Ok(Self::Purged),
            _ => Err(decoding_error(tag, "unknown card status")),
        }
    }
}

/// Card settings bit mask
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SettingsMask(pub u32);

impl SettingsMask {
    /// Card can be reused after purge
    pub const IS_REUSABLE: u32 = 0x0001;
    /// Card must be activated
    pub const USE_ACTIVATION: u32 = 0x0002;
    /// Wallets cannot be purged
    pub const PERMANENT_WALLET: u32 = 0x0004;
    /// Access code may be changed
    pub const ALLOW_SET_PIN1: u32 = 0x0010;
    /// Passcode may be changed
    pub const ALLOW_SET_PIN2: u32 = 0x0020;
    /// CVC is checked
    pub const USE_CVC: u32 = 0x0040;
    /// Default access code is not accepted
    pub const PROHIBIT_DEFAULT_PIN1: u32 = 0x0080;
    /// Unencrypted commands are accepted
    pub const ALLOW_UNENCRYPTED: u32 = 0x1000;
    /// Fast encryption is accepted
    pub const ALLOW_FAST_ENCRYPTION: u32 = 0x2000;
    /// Security delay is skipped for a linked terminal
    pub const SKIP_SECURITY_DELAY_IF_VALIDATED_BY_LINKED_TERMINAL: u32 = 0x0008_0000;
    /// HD wallets are enabled
    pub const ALLOW_HD_WALLETS: u32 = 0x0020_0000;
    /// Backup is enabled
    pub const ALLOW_BACKUP: u32 = 0x0040_0000;
    /// Key import is enabled
    pub const ALLOW_KEYS_IMPORT: u32 = 0x0080_0000;
    /// Files are disabled
    pub const DISABLE_FILES: u32 = 0x0400_0000;

    /// Whether every bit of `flag` is set
    pub const fn contains(self, flag: u32) -> bool {
        self.0 & flag == flag
    }
}

impl TlvValue for SettingsMask {
    fn accepts(value_type: TlvValueType) -> bool {
        value_type == TlvValueType::SettingsMask
    }

    fn encode_value(&self, _tag: TlvTag) -> tangem_core::Result<Vec<u8>> {
        Ok(self.0.to_be_bytes().to_vec())
    }

    fn decode_value(tag: TlvTag, bytes: &[u8]) -> tangem_core::Result<Self> {
        u32::decode_value(tag, bytes).map(Self)
    }
}

/// Signing methods supported by a card, as a bit set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SigningMethod(pub u8);

impl SigningMethod {
    /// Sign hashes
    pub const SIGN_HASH: u8 = 0;
    /// Sign raw transactions
    pub const SIGN_RAW: u8 = 1;
    /// Sign hashes validated by the issuer
    pub const SIGN_HASH_SIGNED_BY_ISSUER: u8 = 2;
    /// Sign raw transactions validated by the issuer
    pub const SIGN_RAW_SIGNED_BY_ISSUER: u8 = 3;
    /// Sign hashes validated by the issuer and update issuer data
    pub const SIGN_HASH_SIGNED_BY_ISSUER_AND_UPDATE_ISSUER_DATA: u8 = 4;
    /// Sign raw transactions validated by the issuer and update issuer data
    pub const SIGN_RAW_SIGNED_BY_ISSUER_AND_UPDATE_ISSUER_DATA: u8 = 5;
    /// Sign in POS mode
    pub const SIGN_POS: u8 = 6;

    /// Set containing a single method
    pub const fn single(method: u8) -> Self {
        Self(1 << method)
    }

    /// Whether `method` is in the set
    pub const fn contains(self, method: u8) -> bool {
        self.0 & (1 << method) != 0
    }
}

impl TlvValue for SigningMethod {
    fn accepts(value_type: TlvValueType) -> bool {
        value_type == TlvValueType::SigningMethod
    }

    // One method travels as its number, several as 0x80 | bits
    fn encode_value(&self, _tag: TlvTag) -> tangem_core::Result<Vec<u8>> {
        if self.0.count_ones() == 1 {
            Ok(vec![self.0.trailing_zeros() as u8])
        } else {
            Ok(vec![0x80 | self.0])
        }
    }

    fn decode_value(tag: TlvTag, bytes: &[u8]) -> tangem_core::Result<Self> {
        let raw = u8::decode_value(tag, bytes)?;
        if raw & 0x80 != 0 {
            Ok(Self(raw & 0x7F))
        } else if raw <= Self::SIGN_POS {
            Ok(Self::single(raw))
        } else {
            Err(decoding_error(tag, "unknown signing method"))
        }
    }
}

/// Raw backup status byte reported by the card
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum BackupRawStatus {
    /// Not part of a backup set
    NoBackup = 0,
    /// Linked, wallets not yet transferred
    CardLinked = 1,
    /// Backup completed
    Active = 2,
}

impl TlvValue for BackupRawStatus {
    fn accepts(value_type: TlvValueType) -> bool {
        value_type == TlvValueType::BackupStatus
    }

    fn encode_value(&self, _tag: TlvTag) -> tangem_core::Result<Vec<u8>> {
        Ok(vec![*self as u8])
    }

    fn decode_value(tag: TlvTag, bytes: &[u8]) -> tangem_core::Result<Self> {
        match u8::decode_value(tag, bytes)? {
            0 => Ok(Self::NoBackup),
            1 => Ok(Self::CardLinked),
            2 => Ok(Self::Active),
            _ => Err(decoding_error(tag, "unknown backup status")),
        }
    }
}

/// Backup status with the number of linked cards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackupStatus {
    /// Not part of a backup set
    NoBackup,
    /// Linked, wallets not yet transferred
    CardLinked {
        /// Number of backup cards
        cards_count: u8,
    },
    /// Backup completed
    Active {
        /// Number of backup cards
        cards_count: u8,
    },
}

impl BackupStatus {
    /// Build from the raw status and card count
    pub const fn from_raw(raw: BackupRawStatus, cards_count: u8) -> Self {
        match raw {
            BackupRawStatus::NoBackup => Self::NoBackup,
            BackupRawStatus::CardLinked => Self::CardLinked { cards_count },
            BackupRawStatus::Active => Self::Active { cards_count },
        }
    }

    /// Whether a new backup can be started
    pub const fn can_backup(&self) -> bool {
        matches!(self, Self::NoBackup)
    }

    /// Whether the backup is completed
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }
}

/// Relation between the card and this terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkedTerminalStatus {
    /// Linked to this terminal
    Current,
    /// Not linked
    None,
}

/// Manufacturer information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manufacturer {
    /// Manufacturer name
    pub name: String,
    /// Manufacture date, `YYYY-MM-DD`
    pub manufacture_date: String,
    /// Manufacturer signature over the card id
    pub signature: Option<Vec<u8>>,
}

/// Issuer information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issuer {
    /// Issuer name
    pub name: String,
    /// Issuer public key
    pub public_key: Vec<u8>,
}

/// Card settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardSettings {
    /// Security delay in milliseconds
    pub security_delay: u32,
    /// Number of wallet slots
    pub max_wallets_count: u8,
    /// Raw settings mask
    pub mask: SettingsMask,
    /// Default signing methods
    pub signing_methods: SigningMethod,
    /// Default curve
    pub default_curve: Option<EllipticCurve>,
}

impl CardSettings {
    /// Access code may be changed
    pub const fn is_setting_access_code_allowed(&self) -> bool {
        self.mask.contains(SettingsMask::ALLOW_SET_PIN1)
    }

    /// Passcode may be changed
    pub const fn is_setting_passcode_allowed(&self) -> bool {
        self.mask.contains(SettingsMask::ALLOW_SET_PIN2)
    }

    /// Access code may be reset to the default value
    pub const fn is_removing_access_code_allowed(&self) -> bool {
        !self.mask.contains(SettingsMask::PROHIBIT_DEFAULT_PIN1)
    }

    /// Linked terminals are honoured
    pub const fn is_linked_terminal_enabled(&self) -> bool {
        self.mask
            .contains(SettingsMask::SKIP_SECURITY_DELAY_IF_VALIDATED_BY_LINKED_TERMINAL)
    }

    /// Wallets cannot be purged
    pub const fn is_permanent_wallet(&self) -> bool {
        self.mask.contains(SettingsMask::PERMANENT_WALLET)
    }

    /// Files may be written
    pub const fn is_files_allowed(&self) -> bool {
        !self.mask.contains(SettingsMask::DISABLE_FILES)
    }

    /// HD wallets are enabled
    pub const fn is_hd_wallet_allowed(&self) -> bool {
        self.mask.contains(SettingsMask::ALLOW_HD_WALLETS)
    }

    /// Backup is enabled
    pub const fn is_backup_allowed(&self) -> bool {
        self.mask.contains(SettingsMask::ALLOW_BACKUP)
    }
}

/// Card identity and capability snapshot
///
/// Built from a read response and replaced as a whole by the next read; the
/// only in-place refreshes are the wallet list and card-reported state after
/// backup and wallet commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    /// Card identifier
    pub card_id: String,
    /// Batch identifier
    pub batch_id: String,
    /// Card public key
    pub card_public_key: Vec<u8>,
    /// Firmware version
    pub firmware_version: FirmwareVersion,
    /// Life cycle status
    pub status: CardStatus,
    /// Manufacturer
    pub manufacturer: Manufacturer,
    /// Issuer
    pub issuer: Issuer,
    /// Settings
    pub settings: CardSettings,
    /// Linked terminal status
    pub linked_terminal_status: LinkedTerminalStatus,
    /// Whether a non default access code is set, when reported
    pub is_access_code_set: Option<bool>,
    /// Whether a non default passcode is set, when reported
    pub is_passcode_set: Option<bool>,
    /// Curves the card can create wallets on
    pub supported_curves: Vec<EllipticCurve>,
    /// Wallets, sorted by index
    pub wallets: Vec<CardWallet>,
    /// Backup status, for firmware with backup support
    pub backup_status: Option<BackupStatus>,
    /// Card health
    pub health: Option<u16>,
    /// Remaining signatures of single wallet cards
    pub remaining_signatures: Option<u32>,
}

impl Card {
    /// Decode a card from a read response payload
    pub(crate) fn decode(decoder: &TlvDecoder) -> Result<Self> {
        let status: CardStatus = decoder.decode(TlvTag::Status)?;
        match status {
            CardStatus::NotPersonalized => return Err(Error::NotPersonalized),
            CardStatus::Purged => return Err(Error::WalletIsPurged),
            _ => {}
        }
        if decoder.decode::<bool>(TlvTag::IsActivated)? {
            return Err(Error::NotActivated);
        }

        let card_data = decoder
            .decode_nested_optional(TlvTag::CardData)?
            .filter(|d| !d.tlvs().is_empty())
            .ok_or_else(|| Error::DeserializeApduFailed("missing card data".into()))?;

        let firmware_version: FirmwareVersion =
            decoder.decode::<String>(TlvTag::Firmware)?.parse()?;
        let mask: SettingsMask = decoder.decode(TlvTag::SettingsMask)?;
        let default_curve: Option<EllipticCurve> = decoder.decode_optional(TlvTag::CurveId)?;

        let is_passcode_set = if firmware_version >= FirmwareVersion::IS_PASSCODE_STATUS_AVAILABLE
        {
            Some(!decoder.decode::<bool>(TlvTag::Pin2IsDefault)?)
        } else {
            None
        };
        let is_access_code_set =
            if firmware_version >= FirmwareVersion::IS_ACCESS_CODE_STATUS_AVAILABLE {
                Some(!decoder.decode::<bool>(TlvTag::PinIsDefault)?)
            } else {
                None
            };

        let supported_curves = if firmware_version < FirmwareVersion::MULTI_WALLET_AVAILABLE {
            default_curve.into_iter().collect()
        } else {
            EllipticCurve::ALL.to_vec()
        };

        let settings = CardSettings {
            security_delay: decoder
                .decode_optional::<u16>(TlvTag::PauseBeforePin2)?
                .map_or(0, |d| u32::from(d) * 10),
            max_wallets_count: decoder.decode_optional(TlvTag::WalletsCount)?.unwrap_or(1),
            mask,
            signing_methods: decoder.decode(TlvTag::SigningMethod)?,
            default_curve,
        };

        let mut wallets = Vec::new();
        let mut remaining_signatures = None;
        if firmware_version < FirmwareVersion::MULTI_WALLET_AVAILABLE
            && status == CardStatus::Loaded
        {
            remaining_signatures = decoder
                .decode_optional::<u16>(TlvTag::WalletRemainingSignatures)?
                .map(u32::from);
            let curve = default_curve.ok_or_else(|| {
                Error::DecodingFailedMissingTag(TlvTag::CurveId.to_string())
            })?;
            wallets.push(CardWallet::legacy(
                decoder.decode(TlvTag::WalletPublicKey)?,
                curve,
                settings.is_permanent_wallet(),
                decoder.decode_optional(TlvTag::WalletSignedHashes)?,
                remaining_signatures,
            ));
        }

        let backup_status = if firmware_version >= FirmwareVersion::BACKUP_AVAILABLE {
            let raw: BackupRawStatus = decoder.decode(TlvTag::BackupStatus)?;
            let count = decoder.decode_optional(TlvTag::BackupCount)?.unwrap_or(0);
            Some(BackupStatus::from_raw(raw, count))
        } else {
            None
        };

        let date: CardDate = card_data.decode(TlvTag::ManufactureDateTime)?;

        Ok(Self {
            card_id: decoder.decode(TlvTag::CardId)?,
            batch_id: card_data.decode(TlvTag::BatchId)?,
            card_public_key: decoder.decode(TlvTag::CardPublicKey)?,
            firmware_version,
            status,
            manufacturer: Manufacturer {
                name: decoder.decode(TlvTag::ManufacturerName)?,
                manufacture_date: date.to_string(),
                signature: card_data.decode_optional(TlvTag::CardIdManufacturerSignature)?,
            },
            issuer: Issuer {
                name: card_data.decode(TlvTag::IssuerName)?,
                public_key: decoder.decode(TlvTag::IssuerPublicKey)?,
            },
            settings,
            linked_terminal_status: if decoder.decode::<bool>(TlvTag::TerminalIsLinked)? {
                LinkedTerminalStatus::Current
            } else {
                LinkedTerminalStatus::None
            },
            is_access_code_set,
            is_passcode_set,
            supported_curves,
            wallets,
            backup_status,
            health: decoder.decode_optional(TlvTag::Health)?,
            remaining_signatures,
        })
    }

    /// Replace the wallet list, keeping it sorted by index
    pub fn set_wallets(&mut self, mut wallets: Vec<CardWallet>) {
        wallets.sort_by_key(|w| w.index);
        self.wallets = wallets;
    }

    /// Insert or replace a wallet by index
    pub fn upsert_wallet(&mut self, wallet: CardWallet) {
        self.wallets.retain(|w| w.index != wallet.index);
        self.wallets.push(wallet);
        self.wallets.sort_by_key(|w| w.index);
    }

    /// Wallet with the given public key
    pub fn wallet(&self, public_key: &[u8]) -> Option<&CardWallet> {
        self.wallets.iter().find(|w| w.public_key == public_key)
    }

    /// Mutable wallet with the given public key
    pub fn wallet_mut(&mut self, public_key: &[u8]) -> Option<&mut CardWallet> {
        self.wallets.iter_mut().find(|w| w.public_key == public_key)
    }

    /// Remove the wallet with the given public key
    pub fn remove_wallet(&mut self, public_key: &[u8]) {
        self.wallets.retain(|w| w.public_key != public_key);
    }
}
