use async_trait::async_trait;
use tangem_core::{CommandApdu, Instruction, ResponseApdu, TlvBuilder, TlvTag};
use tracing::debug;

use super::SuccessResponse;
use crate::{
    Error, Result,
    command::{Command, require_card, response_decoder},
    environment::SessionEnvironment,
    session::CardSession,
    types::{Card, WalletIndex},
};

/// Deletes a wallet from the card
#[derive(Debug, Clone)]
pub struct PurgeWalletCommand {
    wallet: WalletIndex,
}

impl PurgeWalletCommand {
    /// Purge the addressed wallet
    pub const fn new(wallet: WalletIndex) -> Self {
        Self { wallet }
    }

    fn slot(&self, card: &Card) -> Result<u32> {
        self.wallet
            .find(&card.wallets)
            .map(|w| w.index)
            .ok_or(Error::WalletNotFound)
    }
}

#[async_trait]
impl Command for PurgeWalletCommand {
    type Response = SuccessResponse;

    fn requires_passcode(&self) -> bool {
        true
    }

    fn perform_pre_check(&self, card: &Card) -> Result<()> {
        let wallet = self.wallet.find(&card.wallets).ok_or(Error::WalletNotFound)?;
        if wallet.settings.is_permanent {
            return Err(Error::PurgeWalletProhibited);
        }
        Ok(())
    }

    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu> {
        let card = require_card(environment)?;
        let mut builder = TlvBuilder::new();
        builder
            .append_opt(TlvTag::Pin, environment.access_code_hash())?
            .append_opt(TlvTag::Pin2, environment.passcode_hash())?
            .append(TlvTag::CardId, card.card_id.clone())?
            .append(TlvTag::WalletIndex, self.slot(card)?)?;
        Ok(CommandApdu::new(Instruction::PurgeWallet, builder.build()))
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

    async fn run(&mut self, session: &mut CardSession) -> Result<SuccessResponse> {
        let response = session.transceive(&*self).await?;
        if let Some(card) = session.environment_mut().card.as_mut() {
            if let Some(key) = self.wallet.find(&card.wallets).map(|w| w.public_key.clone()) {
                debug!(wallet = ?self.wallet, "Wallet purged");
                card.remove_wallet(&key);
            }
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        CardManager,
        testing::{self, CardFixture, MockReader, ScriptedDelegate},
    };

    #[tokio::test]
    async fn test_purge_by_public_key() {
        let reader = MockReader::new();
        testing::script_full_read(&reader, &CardFixture::new("4.52r", 2), &[0, 1]);
        reader.respond_tlvs(&testing::card_id_response());

        let manager = CardManager::new(reader.clone(), ScriptedDelegate::shared());
        let mut command = PurgeWalletCommand::new(WalletIndex::PublicKey(testing::wallet_key(1)));
        let response = manager.start_session(&mut command, None).await.unwrap();
        assert_eq!(response.card_id, testing::CARD_ID);

        let request = tangem_core::TlvDecoder::from_bytes(reader.sent()[2].data()).unwrap();
        assert_eq!(request.decode::<u8>(TlvTag::WalletIndex).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unknown_wallet_is_rejected_before_sending() {
        let reader = MockReader::new();
        testing::script_full_read(&reader, &CardFixture::new("4.52r", 2), &[0]);

        let manager = CardManager::new(reader.clone(), ScriptedDelegate::shared());
        let mut command = PurgeWalletCommand::new(WalletIndex::Index(1));
        assert_eq!(
            manager.start_session(&mut command, None).await.unwrap_err(),
            Error::WalletNotFound
        );
        assert_eq!(reader.sent().len(), 2);
    }
}
