use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::{
    Error, Result,
    command::{CardSessionRunnable, Command, require_card},
    operations::ReadWalletCommand,
    session::CardSession,
    types::{DerivationPath, EllipticCurve, ExtendedPublicKey},
};

/// Derive one child key and remember it on the wallet of the card snapshot
async fn derive(
    session: &mut CardSession,
    wallet_public_key: &[u8],
    path: &DerivationPath,
) -> Result<ExtendedPublicKey> {
    let wallet = require_card(session.environment())?
        .wallet(wallet_public_key)
        .ok_or(Error::WalletNotFound)?;
    if !matches!(wallet.curve, EllipticCurve::Secp256k1 | EllipticCurve::Ed25519) {
        return Err(Error::UnsupportedCurve);
    }

    let response = ReadWalletCommand::new(wallet_public_key.to_vec())
        .with_derivation_path(path.clone())
        .run(session)
        .await?;
    let chain_code = response
        .wallet
        .chain_code
        .ok_or_else(|| Error::InvalidResponse("derived key without chain code".into()))?;
    let key = ExtendedPublicKey {
        derivation_path: path.clone(),
        public_key: response.wallet.public_key,
        chain_code,
    };
    debug!(path = %path, "Public key derived");

    if let Some(wallet) = session
        .environment_mut()
        .card
        .as_mut()
        .and_then(|card| card.wallet_mut(wallet_public_key))
    {
        wallet.add_derived_key(key.clone());
    }
    Ok(key)
}

/// Derives a public child key of a wallet (BIP-32 private parent to public child)
///
/// Only secp256k1 and ed25519 wallets derive keys.
#[derive(Debug, Clone)]
pub struct DeriveWalletPublicKeyTask {
    wallet_public_key: Vec<u8>,
    derivation_path: DerivationPath,
}

impl DeriveWalletPublicKeyTask {
    /// Derive the key at `derivation_path` of the wallet holding `wallet_public_key`
    pub const fn new(wallet_public_key: Vec<u8>, derivation_path: DerivationPath) -> Self {
        Self {
            wallet_public_key,
            derivation_path,
        }
    }
}

#[async_trait]
impl CardSessionRunnable for DeriveWalletPublicKeyTask {
    type Output = ExtendedPublicKey;

    #[instrument(level = "debug", skip_all, fields(path = %self.derivation_path))]
    async fn execute(&mut self, session: &mut CardSession) -> Result<ExtendedPublicKey> {
        derive(session, &self.wallet_public_key, &self.derivation_path).await
    }
}

/// Derives several keys of one wallet in a single session
///
/// Repeated paths are derived once. Keys come back in the order of their first
/// appearance.
#[derive(Debug, Clone)]
pub struct DeriveWalletPublicKeysTask {
    wallet_public_key: Vec<u8>,
    derivation_paths: Vec<DerivationPath>,
}

impl DeriveWalletPublicKeysTask {
    /// Derive every path of the wallet holding `wallet_public_key`
    pub const fn new(wallet_public_key: Vec<u8>, derivation_paths: Vec<DerivationPath>) -> Self {
        Self {
            wallet_public_key,
            derivation_paths,
        }
    }
}

#[async_trait]
impl CardSessionRunnable for DeriveWalletPublicKeysTask {
    type Output = Vec<ExtendedPublicKey>;

    #[instrument(level = "debug", skip_all, fields(paths = self.derivation_paths.len()))]
    async fn execute(&mut self, session: &mut CardSession) -> Result<Vec<ExtendedPublicKey>> {
        let mut keys: Vec<ExtendedPublicKey> = Vec::with_capacity(self.derivation_paths.len());
        for path in &self.derivation_paths {
            if keys.iter().any(|key| &key.derivation_path == path) {
                continue;
            }
            keys.push(derive(session, &self.wallet_public_key, path).await?);
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use tangem_core::{Tlv, TlvDecoder, TlvTag};

    use super::*;
    use crate::{
        CardManager,
        operations::ReadMode,
        testing::{self, CardFixture, MockReader, ScriptedDelegate},
    };

    const CHAIN_CODE: [u8; 32] = [0xCC; 32];

    fn path(s: &str) -> DerivationPath {
        s.parse().unwrap()
    }

    fn derived_key(n: u8) -> Vec<u8> {
        let mut key = vec![0x02];
        key.extend([n; 32]);
        key
    }

    fn derived_wallet(n: u8, chain_code: bool) -> Vec<Tlv> {
        let mut tlvs = testing::card_id_response();
        tlvs.extend([
            Tlv::new(TlvTag::Status, vec![0x02]),
            Tlv::new(TlvTag::WalletIndex, vec![0x00]),
            Tlv::new(TlvTag::CurveId, b"secp256k1".to_vec()),
            Tlv::new(TlvTag::WalletPublicKey, derived_key(n)),
        ]);
        if chain_code {
            tlvs.push(Tlv::new(TlvTag::WalletHdChain, CHAIN_CODE.to_vec()));
        }
        tlvs
    }

    /// Derives keys, then reports what the session cached on the wallet
    #[derive(Debug)]
    struct DeriveAndInspect(DeriveWalletPublicKeysTask);

    #[async_trait]
    impl CardSessionRunnable for DeriveAndInspect {
        type Output = (Vec<ExtendedPublicKey>, Vec<ExtendedPublicKey>);

        async fn execute(&mut self, session: &mut CardSession) -> Result<Self::Output> {
            let keys = self.0.execute(session).await?;
            let cached = require_card(session.environment())?
                .wallet(&testing::wallet_key(0))
                .map(|w| w.derived_keys.clone())
                .unwrap_or_default();
            Ok((keys, cached))
        }
    }

    #[tokio::test]
    async fn test_derived_key_is_returned_and_cached() {
        let reader = MockReader::new();
        testing::script_full_read(&reader, &CardFixture::new("4.52r", 2), &[0]);
        reader.respond_tlvs(&derived_wallet(1, true));

        let manager = CardManager::new(reader.clone(), ScriptedDelegate::shared());
        let mut task = DeriveWalletPublicKeyTask::new(testing::wallet_key(0), path("m/44'/0'/0'/0/0"));
        let key = manager.start_session(&mut task, None).await.unwrap();
        assert_eq!(key.public_key, derived_key(1));
        assert_eq!(key.chain_code, CHAIN_CODE);
        assert_eq!(key.derivation_path, path("m/44'/0'/0'/0/0"));

        let request = TlvDecoder::from_bytes(reader.sent()[2].data()).unwrap();
        assert_eq!(
            request.decode::<ReadMode>(TlvTag::InteractionMode).unwrap(),
            ReadMode::Wallet
        );
        assert_eq!(
            request.decode::<Vec<u8>>(TlvTag::WalletPublicKey).unwrap(),
            testing::wallet_key(0)
        );
        assert_eq!(
            request.decode::<DerivationPath>(TlvTag::WalletHdPath).unwrap(),
            path("m/44'/0'/0'/0/0")
        );
    }

    #[tokio::test]
    async fn test_several_paths_in_one_session() {
        let reader = MockReader::new();
        testing::script_full_read(&reader, &CardFixture::new("4.52r", 2), &[0]);
        reader.respond_tlvs(&derived_wallet(1, true));
        reader.respond_tlvs(&derived_wallet(2, true));

        let paths = vec![path("m/44'/0'/0'/0/0"), path("m/44'/60'/0'/0/0"), path("m/44'/0'/0'/0/0")];
        let task = DeriveWalletPublicKeysTask::new(testing::wallet_key(0), paths);
        let manager = CardManager::new(reader.clone(), ScriptedDelegate::shared());
        let (keys, cached) = manager
            .start_session(&mut DeriveAndInspect(task), None)
            .await
            .unwrap();

        assert_eq!(keys.len(), 2);
        assert_eq!(keys[1].public_key, derived_key(2));
        assert_eq!(cached, keys);
        assert_eq!(reader.sent().len(), 4);
    }

    #[tokio::test]
    async fn test_missing_chain_code() {
        let reader = MockReader::new();
        testing::script_full_read(&reader, &CardFixture::new("4.52r", 1), &[0]);
        reader.respond_tlvs(&derived_wallet(1, false));

        let manager = CardManager::new(reader, ScriptedDelegate::shared());
        let mut task = DeriveWalletPublicKeyTask::new(testing::wallet_key(0), path("m/0"));
        assert!(matches!(
            manager.start_session(&mut task, None).await.unwrap_err(),
            Error::InvalidResponse(_)
        ));
    }

    #[tokio::test]
    async fn test_curve_without_derivation() {
        let card = CardFixture::new("4.52r", 1);
        let wallet = Tlv::encode_all(&[
            Tlv::new(TlvTag::Status, vec![0x02]),
            Tlv::new(TlvTag::WalletIndex, vec![0x00]),
            Tlv::new(TlvTag::CurveId, b"secp256r1".to_vec()),
            Tlv::new(TlvTag::WalletPublicKey, testing::wallet_key(0)),
        ])
        .unwrap();
        let mut page = testing::card_id_response();
        page.push(Tlv::new(TlvTag::CardWallet, wallet));

        let reader = MockReader::new();
        reader.respond_card(&card).respond_tlvs(&page);
        let manager = CardManager::new(reader.clone(), ScriptedDelegate::shared());
        let mut task = DeriveWalletPublicKeyTask::new(testing::wallet_key(0), path("m/0"));
        assert_eq!(
            manager.start_session(&mut task, None).await.unwrap_err(),
            Error::UnsupportedCurve
        );
        assert_eq!(reader.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_firmware_without_hd_wallets() {
        let reader = MockReader::new();
        testing::script_full_read(&reader, &CardFixture::new("4.12r", 1), &[0]);

        let manager = CardManager::new(reader.clone(), ScriptedDelegate::shared());
        let mut task = DeriveWalletPublicKeyTask::new(testing::wallet_key(0), path("m/0"));
        assert_eq!(
            manager.start_session(&mut task, None).await.unwrap_err(),
            Error::NotSupportedFirmwareVersion
        );
        assert_eq!(reader.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_wallet() {
        let reader = MockReader::new();
        testing::script_full_read(&reader, &CardFixture::new("4.52r", 1), &[0]);

        let manager = CardManager::new(reader, ScriptedDelegate::shared());
        let mut task = DeriveWalletPublicKeyTask::new(testing::wallet_key(5), path("m/0"));
        assert_eq!(
            manager.start_session(&mut task, None).await.unwrap_err(),
            Error::WalletNotFound
        );
    }
}
