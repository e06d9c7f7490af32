use serde::{Deserialize, Serialize};
use tangem_core::{TlvDecoder, TlvTag, TlvValue, TlvValueType};

use super::{DerivationPath, EllipticCurve, ExtendedPublicKey, SettingsMask};
use crate::Result;

const BACKED_UP_FLAG: u8 = 0x80;

/// Status of a wallet slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WalletStatus {
    /// Slot is free
    Empty,
    /// Slot holds a key
    Loaded,
    /// Key was purged
    Purged,
}

/// Wallet status byte, the high bit marks a backed up wallet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RawWalletStatus {
    pub(crate) status: WalletStatus,
    pub(crate) has_backup: bool,
}

impl TlvValue for RawWalletStatus {
    fn accepts(value_type: TlvValueType) -> bool {
        value_type == TlvValueType::Status
    }

    fn encode_value(&self, _tag: TlvTag) -> tangem_core::Result<Vec<u8>> {
        let code = match self.status {
            WalletStatus::Empty => 1,
            WalletStatus::Loaded => 2,
            WalletStatus::Purged => 3,
        };
        Ok(vec![if self.has_backup { code | BACKED_UP_FLAG } else { code }])
    }

    fn decode_value(tag: TlvTag, bytes: &[u8]) -> tangem_core::Result<Self> {
        let raw = u8::decode_value(tag, bytes)?;
        let status = match raw & !BACKED_UP_FLAG {
            1 => WalletStatus::Empty,
            2 => WalletStatus::Loaded,
            3 => WalletStatus::Purged,
            _ => {
                return Err(tangem_core::Error::Decoding {
                    tag,
                    reason: "unknown wallet status",
                });
            }
        };
        Ok(Self {
            status,
            has_backup: raw & BACKED_UP_FLAG != 0,
        })
    }
}

/// Wallet settings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WalletSettings {
    /// The wallet cannot be purged
    pub is_permanent: bool,
}

/// One key slot on the card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardWallet {
    /// Slot index
    pub index: u32,
    /// Slot status
    pub status: WalletStatus,
    /// Curve of the key
    pub curve: EllipticCurve,
    /// Public key
    pub public_key: Vec<u8>,
    /// HD chain code
    pub chain_code: Option<Vec<u8>>,
    /// Settings
    pub settings: WalletSettings,
    /// Number of hashes signed so far
    pub total_signed_hashes: Option<u32>,
    /// Remaining signatures, when limited
    pub remaining_signatures: Option<u32>,
    /// Wallet is part of a completed backup
    pub has_backup: bool,
    /// Keys derived in this or an earlier session
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub derived_keys: Vec<ExtendedPublicKey>,
}

impl CardWallet {
    /// Wallet of a single wallet card, described by the card itself
    pub(crate) fn legacy(
        public_key: Vec<u8>,
        curve: EllipticCurve,
        is_permanent: bool,
        total_signed_hashes: Option<u16>,
        remaining_signatures: Option<u32>,
    ) -> Self {
        Self {
            index: 0,
            status: WalletStatus::Loaded,
            curve,
            public_key,
            chain_code: None,
            settings: WalletSettings { is_permanent },
            total_signed_hashes: total_signed_hashes.map(u32::from),
            remaining_signatures,
            has_backup: false,
            derived_keys: Vec::new(),
        }
    }

    /// Decode a nested wallet block
    ///
    /// Returns `None` for a free or purged slot.
    pub(crate) fn decode(decoder: &TlvDecoder, card_is_permanent: bool) -> Result<Option<Self>> {
        let raw: RawWalletStatus = decoder.decode(TlvTag::Status)?;
        if raw.status != WalletStatus::Loaded {
            return Ok(None);
        }

        let index: u8 = decoder.decode(TlvTag::WalletIndex)?;
        let is_permanent = decoder
            .decode_optional::<SettingsMask>(TlvTag::SettingsMask)?
            .map_or(card_is_permanent, |mask| {
                mask.contains(SettingsMask::PERMANENT_WALLET)
            });

        Ok(Some(Self {
            index: u32::from(index),
            status: raw.status,
            curve: decoder.decode(TlvTag::CurveId)?,
            public_key: decoder.decode(TlvTag::WalletPublicKey)?,
            chain_code: decoder.decode_optional(TlvTag::WalletHdChain)?,
            settings: WalletSettings { is_permanent },
            total_signed_hashes: decoder
                .decode_optional::<u16>(TlvTag::WalletSignedHashes)?
                .map(u32::from),
            remaining_signatures: decoder
                .decode_optional::<u16>(TlvTag::WalletRemainingSignatures)?
                .map(u32::from),
            has_backup: raw.has_backup,
            derived_keys: Vec::new(),
        }))
    }

    /// Derived key for `path`, if already known
    pub fn derived_key(&self, path: &DerivationPath) -> Option<&ExtendedPublicKey> {
        self.derived_keys.iter().find(|key| &key.derivation_path == path)
    }

    /// Remember a derived key, replacing an older one for the same path
    pub fn add_derived_key(&mut self, key: ExtendedPublicKey) {
        self.derived_keys.retain(|k| k.derivation_path != key.derivation_path);
        self.derived_keys.push(key);
    }
}

/// Address of the wallet a command targets
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WalletIndex {
    /// Slot index
    Index(u32),
    /// Wallet public key
    PublicKey(Vec<u8>),
}

impl WalletIndex {
    /// Find the addressed wallet on a card snapshot
    pub fn find<'a>(&self, wallets: &'a [CardWallet]) -> Option<&'a CardWallet> {
        match self {
            Self::Index(index) => wallets.iter().find(|w| w.index == *index),
            Self::PublicKey(key) => wallets.iter().find(|w| &w.public_key == key),
        }
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;

    fn wallet_block(status: u8, index: u8) -> TlvDecoder {
        let mut bytes = vec![0x02, 0x01, status, 0x65, 0x01, index];
        bytes.extend(hex!("0509 736563703235366B31 6003 04AABB"));
        TlvDecoder::from_bytes(&bytes).unwrap()
    }

    #[test]
    fn test_decode_loaded_and_backed_up() {
        let wallet = CardWallet::decode(&wallet_block(0x82, 3), false)
            .unwrap()
            .unwrap();
        assert_eq!(wallet.index, 3);
        assert_eq!(wallet.curve, EllipticCurve::Secp256k1);
        assert_eq!(wallet.public_key, hex!("04AABB"));
        assert!(wallet.has_backup);
        assert!(!wallet.settings.is_permanent);
    }

    #[test]
    fn test_empty_slot_is_skipped() {
        assert_eq!(CardWallet::decode(&wallet_block(0x01, 1), true).unwrap(), None);
    }

    #[test]
    fn test_derived_keys_are_replaced_per_path() {
        let mut wallet = CardWallet::decode(&wallet_block(0x02, 0), false)
            .unwrap()
            .unwrap();
        let path: DerivationPath = "m/44'/0'/0'/0/0".parse().unwrap();
        let key = |byte: u8| ExtendedPublicKey {
            derivation_path: path.clone(),
            public_key: vec![0x02, byte],
            chain_code: vec![byte; 32],
        };

        wallet.add_derived_key(key(1));
        wallet.add_derived_key(key(2));
        assert_eq!(wallet.derived_keys.len(), 1);
        assert_eq!(wallet.derived_key(&path).map(|k| k.public_key[1]), Some(2));
        assert!(wallet.derived_key(&DerivationPath::default()).is_none());
    }

    #[test]
    fn test_wallet_index_lookup() {
        let wallets = [CardWallet::decode(&wallet_block(0x02, 3), false)
            .unwrap()
            .unwrap()];
        assert_eq!(WalletIndex::Index(3).find(&wallets).map(|w| w.index), Some(3));
        assert!(WalletIndex::Index(1).find(&wallets).is_none());
        assert!(
            WalletIndex::PublicKey(hex!("04AABB").to_vec())
                .find(&wallets)
                .is_some()
        );
    }
}
