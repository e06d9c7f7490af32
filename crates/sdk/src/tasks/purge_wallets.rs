use async_trait::async_trait;
use tracing::instrument;

use crate::{
    Result,
    command::{CardSessionRunnable, Command, require_card},
    operations::{PurgeWalletCommand, SuccessResponse},
    session::CardSession,
    types::WalletIndex,
};

/// Purges several wallets in one session
///
/// Stops at the first wallet that cannot be purged; the wallets purged before
/// it stay purged.
#[derive(Debug, Clone)]
pub struct PurgeWalletsTask {
    wallets: Vec<WalletIndex>,
}

impl PurgeWalletsTask {
    /// Purge `wallets` in order
    pub const fn new(wallets: Vec<WalletIndex>) -> Self {
        Self { wallets }
    }
}

#[async_trait]
impl CardSessionRunnable for PurgeWalletsTask {
    type Output = SuccessResponse;

    #[instrument(level = "debug", skip_all, fields(wallets = self.wallets.len()))]
    async fn execute(&mut self, session: &mut CardSession) -> Result<SuccessResponse> {
        for wallet in &self.wallets {
            PurgeWalletCommand::new(wallet.clone()).run(session).await?;
        }
        Ok(SuccessResponse {
            card_id: require_card(session.environment())?.card_id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        CardManager, Error,
        testing::{self, CardFixture, MockReader, ScriptedDelegate},
    };

    #[tokio::test]
    async fn test_purges_in_order_and_updates_snapshot() {
        let reader = MockReader::new();
        testing::script_full_read(&reader, &CardFixture::new("4.52r", 3), &[0, 1, 2]);
        reader.respond_tlvs(&testing::card_id_response());
        reader.respond_tlvs(&testing::card_id_response());

        let manager = CardManager::new(reader.clone(), ScriptedDelegate::shared());
        let mut task = PurgeWalletsTask::new(vec![
            WalletIndex::Index(2),
            WalletIndex::PublicKey(testing::wallet_key(0)),
        ]);
        manager.start_session(&mut task, None).await.unwrap();
        assert_eq!(reader.sent().len(), 4);
    }

    #[tokio::test]
    async fn test_second_purge_of_same_wallet_is_rejected() {
        let reader = MockReader::new();
        testing::script_full_read(&reader, &CardFixture::new("4.52r", 2), &[0, 1]);
        reader.respond_tlvs(&testing::card_id_response());

        let manager = CardManager::new(reader.clone(), ScriptedDelegate::shared());
        let mut task = PurgeWalletsTask::new(vec![WalletIndex::Index(1), WalletIndex::Index(1)]);
        assert_eq!(
            manager.start_session(&mut task, None).await.unwrap_err(),
            Error::WalletNotFound
        );
        assert_eq!(reader.sent().len(), 3);
    }
}
