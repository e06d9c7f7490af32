use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tangem_core::{CommandApdu, Instruction, ResponseApdu, TlvBuilder, TlvTag};
use tracing::{debug, instrument};

use crate::{
    Error, Result,
    command::{Command, require_card, response_decoder},
    environment::SessionEnvironment,
    session::CardSession,
    types::{Card, DerivationPath, EllipticCurve, FirmwareVersion, SigningMethod},
};

/// Hashes the card accepts in one frame
pub const MAX_HASHES_PER_FRAME: usize = 10;

/// Signatures over the requested hashes, in request order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignHashesResponse {
    /// Card id
    pub card_id: String,
    /// One signature per hash
    pub signatures: Vec<Vec<u8>>,
    /// Hashes signed by the wallet so far, when reported
    pub total_signed_hashes: Option<u32>,
}

/// Signs hashes with a wallet key
///
/// Hashes are sent in chunks of [`MAX_HASHES_PER_FRAME`]; the card returns
/// the chunk's signatures concatenated and they are split evenly.
#[derive(Debug, Clone)]
pub struct SignHashesCommand {
    hashes: Vec<Vec<u8>>,
    wallet_public_key: Vec<u8>,
    derivation_path: Option<DerivationPath>,
    chunk: usize,
}

impl SignHashesCommand {
    /// Sign `hashes` with the wallet holding `wallet_public_key`
    pub fn new(hashes: Vec<Vec<u8>>, wallet_public_key: Vec<u8>) -> Self {
        Self {
            hashes,
            wallet_public_key,
            derivation_path: None,
            chunk: 0,
        }
    }

    /// Sign with a key derived from the wallet
    pub fn with_derivation_path(mut self, path: DerivationPath) -> Self {
        self.derivation_path = Some(path);
        self
    }

    fn current_chunk(&self) -> Result<&[Vec<u8>]> {
        self.hashes
            .chunks(MAX_HASHES_PER_FRAME)
            .nth(self.chunk)
            .ok_or(Error::EmptyHashes)
    }

    fn chunk_count(&self) -> usize {
        self.hashes.len().div_ceil(MAX_HASHES_PER_FRAME)
    }

    fn check_hashes(&self) -> Result<()> {
        let first = self.hashes.first().ok_or(Error::EmptyHashes)?;
        if first.is_empty() {
            return Err(Error::EmptyHashes);
        }
        if self.hashes.iter().any(|h| h.len() != first.len()) {
            return Err(Error::HashSizeMustBeEqual);
        }
        Ok(())
    }

    fn uses_terminal_signature(card: &Card) -> bool {
        card.settings.is_linked_terminal_enabled()
            && card.firmware_version < FirmwareVersion::HD_WALLET_AVAILABLE
    }
}

#[async_trait]
impl Command for SignHashesCommand {
    type Response = SignHashesResponse;

    fn requires_passcode(&self) -> bool {
        true
    }

    fn perform_pre_check(&self, card: &Card) -> Result<()> {
        let wallet = card
            .wallet(&self.wallet_public_key)
            .ok_or(Error::WalletNotFound)?;
        if self.derivation_path.is_some() {
            if card.firmware_version < FirmwareVersion::HD_WALLET_AVAILABLE {
                return Err(Error::NotSupportedFirmwareVersion);
            }
            if wallet.curve == EllipticCurve::Secp256r1 {
                return Err(Error::UnsupportedCurve);
            }
        }
        if wallet.remaining_signatures == Some(0) {
            return Err(Error::NoRemainingSignatures);
        }
        if !card.settings.signing_methods.contains(SigningMethod::SIGN_HASH) {
            return Err(Error::SignHashesNotAvailable);
        }
        Ok(())
    }

    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu> {
        let card = require_card(environment)?;
        let wallet = card
            .wallet(&self.wallet_public_key)
            .ok_or(Error::WalletNotFound)?;
        let chunk = self.current_chunk()?;
        let hash_size = chunk[0].len();
        let size_bytes = match u8::try_from(hash_size) {
            Ok(size) => vec![size],
            Err(_) => u16::try_from(hash_size)
                .map_err(|_| Error::SerializeCommandError("hash too long".into()))?
                .to_be_bytes()
                .to_vec(),
        };
        let flattened = chunk.concat();

        let mut builder = TlvBuilder::new();
        builder
            .append_opt(TlvTag::Pin, environment.access_code_hash())?
            .append_opt(TlvTag::Pin2, environment.passcode_hash())?
            .append(TlvTag::CardId, card.card_id.clone())?
            .append(TlvTag::TransactionOutHashSize, size_bytes)?
            .append_bytes(TlvTag::TransactionOutHash, &flattened)?
            .append_opt(TlvTag::Cvc, environment.cvc.clone())?
            .append(TlvTag::WalletIndex, wallet.index)?;

        if let Some(keys) = environment
            .terminal_keys
            .as_ref()
            .filter(|_| Self::uses_terminal_signature(card))
        {
            builder
                .append(TlvTag::TerminalTransactionSignature, keys.sign(&flattened)?)?
                .append_bytes(TlvTag::TerminalPublicKey, keys.public_key())?;
        }
        builder.append_opt(TlvTag::WalletHdPath, self.derivation_path.clone())?;
        Ok(CommandApdu::new(Instruction::Sign, builder.build()))
    }

    fn deserialize(
        &self,
        _environment: &SessionEnvironment,
        response: &ResponseApdu,
    ) -> Result<SignHashesResponse> {
        let decoder = response_decoder(response)?;
        let count = self.current_chunk()?.len();
        let blob: Vec<u8> = decoder.decode(TlvTag::WalletSignature)?;
        if blob.is_empty() || blob.len() % count != 0 {
            return Err(Error::InvalidResponse(format!(
                "{} signature bytes for {count} hashes",
                blob.len()
            )));
        }

        Ok(SignHashesResponse {
            card_id: decoder.decode(TlvTag::CardId)?,
            signatures: blob.chunks(blob.len() / count).map(<[u8]>::to_vec).collect(),
            total_signed_hashes: decoder
                .decode_optional::<u16>(TlvTag::WalletSignedHashes)?
                .map(u32::from),
        })
    }

    #[instrument(level = "debug", skip_all, fields(hashes = self.hashes.len()))]
    async fn run(&mut self, session: &mut CardSession) -> Result<SignHashesResponse> {
        self.check_hashes()?;
        require_card(session.environment())?;

        let mut signatures = Vec::with_capacity(self.hashes.len());
        let mut last = None;
        for chunk in 0..self.chunk_count() {
            self.chunk = chunk;
            debug!(chunk = chunk + 1, of = self.chunk_count(), "Signing chunk");
            let response = session.transceive(&*self).await?;
            signatures.extend(response.signatures.iter().cloned());
            last = Some(response);
        }
        let last = last.ok_or(Error::EmptyHashes)?;

        if let Some(card) = session.environment_mut().card.as_mut() {
            if let Some(mut wallet) = card.wallet(&self.wallet_public_key).cloned() {
                wallet.total_signed_hashes = last.total_signed_hashes.or(wallet.total_signed_hashes);
                let signed = u32::try_from(signatures.len()).unwrap_or(u32::MAX);
                wallet.remaining_signatures =
                    wallet.remaining_signatures.map(|r| r.saturating_sub(signed));
                card.upsert_wallet(wallet);
            }
        }

        Ok(SignHashesResponse {
            card_id: last.card_id,
            signatures,
            total_signed_hashes: last.total_signed_hashes,
        })
    }
}

#[cfg(test)]
mod tests {
    use tangem_core::{Tlv, TlvDecoder};

    use super::*;
    use crate::{
        CardManager,
        testing::{self, CardFixture, MockReader, ScriptedDelegate},
    };

    fn signature_response(count: usize, first: u8) -> Vec<Tlv> {
        let blob: Vec<u8> = (0..count)
            .flat_map(|i| [first + i as u8; 64])
            .collect();
        let mut tlvs = testing::card_id_response();
        tlvs.push(Tlv::new(TlvTag::WalletSignature, blob));
        tlvs.push(Tlv::new(TlvTag::WalletSignedHashes, vec![0x00, count as u8]));
        tlvs
    }

    #[tokio::test]
    async fn test_chunks_of_ten() {
        let reader = MockReader::new();
        testing::script_full_read(&reader, &CardFixture::new("4.52r", 1), &[0]);
        reader.respond_tlvs(&signature_response(10, 0));
        reader.respond_tlvs(&signature_response(2, 10));

        let hashes: Vec<Vec<u8>> = (0..12u8).map(|i| vec![i; 32]).collect();
        let mut command = SignHashesCommand::new(hashes, testing::wallet_key(0));
        let manager = CardManager::new(reader.clone(), ScriptedDelegate::shared());
        let response = manager.start_session(&mut command, None).await.unwrap();

        assert_eq!(response.signatures.len(), 12);
        for (i, signature) in response.signatures.iter().enumerate() {
            assert_eq!(signature, &vec![i as u8; 64]);
        }
        assert_eq!(response.total_signed_hashes, Some(2));

        let sent = reader.sent();
        assert_eq!(sent.len(), 4);
        let second = TlvDecoder::from_bytes(sent[3].data()).unwrap();
        let hashes: Vec<u8> = second.decode(TlvTag::TransactionOutHash).unwrap();
        assert_eq!(hashes.len(), 64);
        let size: Vec<u8> = second.decode(TlvTag::TransactionOutHashSize).unwrap();
        assert_eq!(size, [32]);
    }

    #[tokio::test]
    async fn test_hash_sizes_must_match() {
        let reader = MockReader::new();
        testing::script_full_read(&reader, &CardFixture::new("4.52r", 1), &[0]);

        let mut command =
            SignHashesCommand::new(vec![vec![1; 32], vec![2; 20]], testing::wallet_key(0));
        let manager = CardManager::new(reader.clone(), ScriptedDelegate::shared());
        assert_eq!(
            manager.start_session(&mut command, None).await.unwrap_err(),
            Error::HashSizeMustBeEqual
        );
        assert_eq!(reader.sent().len(), 2);
    }

    #[test]
    fn test_uneven_signature_blob() {
        let command = SignHashesCommand::new(vec![vec![0; 32]; 3], testing::wallet_key(0));
        let mut tlvs = testing::card_id_response();
        tlvs.push(Tlv::new(TlvTag::WalletSignature, vec![0xAA; 100]));
        let response = ResponseApdu::success(&tlvs).unwrap();
        let environment = SessionEnvironment::new(Default::default());

        assert!(matches!(
            command.deserialize(&environment, &response),
            Err(Error::InvalidResponse(_))
        ));
    }
}
