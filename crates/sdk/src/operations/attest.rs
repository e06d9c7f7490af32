use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tangem_core::{CommandApdu, Instruction, ResponseApdu, TlvBuilder, TlvTag};
use tracing::{debug, warn};

use crate::{
    Error, Result,
    command::{Command, require_card, response_decoder},
    crypto,
    environment::SessionEnvironment,
    session::CardSession,
};

const CHALLENGE_LEN: usize = 16;

/// Card signature over a challenge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestCardKeyResponse {
    /// Card id
    pub card_id: String,
    /// Salt chosen by the card
    pub salt: Vec<u8>,
    /// Signature over `challenge || salt`
    pub card_signature: Vec<u8>,
    /// Challenge sent to the card
    pub challenge: Vec<u8>,
}

impl AttestCardKeyResponse {
    /// Whether the signature was made by `card_public_key`
    pub fn verify(&self, card_public_key: &[u8]) -> Result<bool> {
        let message = [self.challenge.as_slice(), self.salt.as_slice()].concat();
        crypto::verify(card_public_key, &message, &self.card_signature)
    }
}

/// Proves the card holds the private half of its card key
#[derive(Debug, Clone, Default)]
pub struct AttestCardKeyCommand {
    challenge: Option<Vec<u8>>,
}

impl AttestCardKeyCommand {
    /// Attest with a random challenge
    pub const fn new() -> Self {
        Self { challenge: None }
    }

    /// Attest with a fixed challenge
    pub const fn with_challenge(challenge: Vec<u8>) -> Self {
        Self {
            challenge: Some(challenge),
        }
    }
}

#[async_trait]
impl Command for AttestCardKeyCommand {
    type Response = AttestCardKeyResponse;

    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu> {
        let card = require_card(environment)?;
        let challenge = self
            .challenge
            .as_ref()
            .ok_or_else(|| Error::SerializeCommandError("missing challenge".into()))?;

        let mut builder = TlvBuilder::new();
        builder
            .append_opt(TlvTag::Pin, environment.access_code_hash())?
            .append(TlvTag::CardId, card.card_id.clone())?
            .append_bytes(TlvTag::Challenge, challenge)?;
        Ok(CommandApdu::new(Instruction::AttestCardKey, builder.build()))
    }

    fn deserialize(
        &self,
        _environment: &SessionEnvironment,
        response: &ResponseApdu,
    ) -> Result<AttestCardKeyResponse> {
        let decoder = response_decoder(response)?;
        Ok(AttestCardKeyResponse {
            card_id: decoder.decode(TlvTag::CardId)?,
            salt: decoder.decode(TlvTag::Salt)?,
            card_signature: decoder.decode(TlvTag::CardSignature)?,
            challenge: self.challenge.clone().unwrap_or_default(),
        })
    }

    async fn run(&mut self, session: &mut CardSession) -> Result<AttestCardKeyResponse> {
        let card_public_key = require_card(session.environment())?.card_public_key.clone();
        if self.challenge.is_none() {
            self.challenge = Some(crypto::random_bytes(CHALLENGE_LEN));
        }

        let response = session.transceive(&*self).await?;
        if !response.verify(&card_public_key)? {
            warn!(card_id = %response.card_id, "Card key attestation failed");
            return Err(Error::CardVerificationFailed);
        }
        debug!("Card key verified");
        Ok(response)
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

    const CHALLENGE: [u8; 16] = [0x5A; 16];
    const SALT: [u8; 16] = [0x17; 16];

    fn attest_response(card: &CardFixture) -> Vec<Tlv> {
        let signature = card.key.sign(&[CHALLENGE, SALT].concat()).unwrap();
        let mut tlvs = testing::card_id_response();
        tlvs.push(Tlv::new(TlvTag::Salt, SALT.to_vec()));
        tlvs.push(Tlv::new(TlvTag::CardSignature, signature));
        tlvs
    }

    #[tokio::test]
    async fn test_signature_is_verified() {
        let card = CardFixture::new("4.52r", 1);
        let reader = MockReader::new();
        testing::script_full_read(&reader, &card, &[]);
        reader.respond_tlvs(&attest_response(&card));

        let manager = CardManager::new(reader.clone(), ScriptedDelegate::shared());
        let mut command = AttestCardKeyCommand::with_challenge(CHALLENGE.to_vec());
        let response = manager.start_session(&mut command, None).await.unwrap();
        assert_eq!(response.salt, SALT);

        let request = TlvDecoder::from_bytes(reader.sent()[2].data()).unwrap();
        assert_eq!(request.decode::<Vec<u8>>(TlvTag::Challenge).unwrap(), CHALLENGE);
    }

    #[tokio::test]
    async fn test_foreign_key_fails_verification() {
        let card = CardFixture::new("4.52r", 1);
        let impostor = CardFixture::new("4.52r", 1).with_id(testing::CARD_ID, testing::fixture_key(7));
        let reader = MockReader::new();
        testing::script_full_read(&reader, &card, &[]);
        reader.respond_tlvs(&attest_response(&impostor));

        let manager = CardManager::new(reader, ScriptedDelegate::shared());
        let mut command = AttestCardKeyCommand::with_challenge(CHALLENGE.to_vec());
        assert_eq!(
            manager.start_session(&mut command, None).await.unwrap_err(),
            Error::CardVerificationFailed
        );
    }
}
