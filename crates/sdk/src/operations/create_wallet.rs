use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tangem_core::{CommandApdu, Instruction, ResponseApdu, TlvBuilder, TlvTag};
use tracing::debug;

use crate::{
    Error, Result,
    command::{Command, require_card, response_decoder},
    environment::SessionEnvironment,
    session::CardSession,
    types::{
        Card, CardWallet, EllipticCurve, FirmwareVersion, SettingsMask, SigningMethod,
        WalletSettings, WalletStatus,
    },
};

/// Wallet created on the card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateWalletResponse {
    /// Card id
    pub card_id: String,
    /// The new wallet
    pub wallet: CardWallet,
}

/// Creates a wallet in the first free slot
#[derive(Debug, Clone)]
pub struct CreateWalletCommand {
    curve: EllipticCurve,
    is_permanent: bool,
    wallet_index: Option<u32>,
}

impl CreateWalletCommand {
    /// Wallet on `curve`
    pub const fn new(curve: EllipticCurve) -> Self {
        Self {
            curve,
            is_permanent: false,
            wallet_index: None,
        }
    }

    /// Make the wallet impossible to purge
    pub const fn permanent(mut self, is_permanent: bool) -> Self {
        self.is_permanent = is_permanent;
        self
    }

    fn free_index(card: &Card) -> Result<u32> {
        let capacity = u32::from(card.settings.max_wallets_count);
        (0..capacity)
            .find(|index| card.wallets.iter().all(|w| w.index != *index))
            .ok_or(if capacity == 1 {
                Error::WalletAlreadyCreated
            } else {
                Error::MaxNumberOfWalletsCreated
            })
    }
}

#[async_trait]
impl Command for CreateWalletCommand {
    type Response = CreateWalletResponse;

    fn requires_passcode(&self) -> bool {
        true
    }

    fn perform_pre_check(&self, card: &Card) -> Result<()> {
        if !card.supported_curves.contains(&self.curve) {
            return Err(Error::UnsupportedCurve);
        }
        if card.firmware_version < FirmwareVersion::MULTI_WALLET_AVAILABLE
            && self.is_permanent != card.settings.is_permanent_wallet()
        {
            return Err(Error::WalletCannotBeCreated);
        }
        Ok(())
    }

    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu> {
        let card = require_card(environment)?;
        let index = self
            .wallet_index
            .ok_or_else(|| Error::SerializeCommandError("wallet slot not chosen".into()))?;

        let mut builder = TlvBuilder::new();
        builder
            .append_opt(TlvTag::Pin, environment.access_code_hash())?
            .append_opt(TlvTag::Pin2, environment.passcode_hash())?
            .append(TlvTag::CardId, card.card_id.clone())?
            .append(TlvTag::WalletIndex, index)?
            .append_opt(TlvTag::Cvc, environment.cvc.clone())?;

        if card.firmware_version >= FirmwareVersion::MULTI_WALLET_AVAILABLE {
            let mut mask = SettingsMask::IS_REUSABLE;
            if self.is_permanent {
                mask |= SettingsMask::PERMANENT_WALLET;
            }
            builder
                .append(TlvTag::SettingsMask, SettingsMask(mask))?
                .append(TlvTag::CurveId, self.curve)?
                .append(
                    TlvTag::SigningMethod,
                    SigningMethod::single(SigningMethod::SIGN_HASH),
                )?;
        }
        Ok(CommandApdu::new(Instruction::CreateWallet, builder.build()))
    }

    fn deserialize(
        &self,
        environment: &SessionEnvironment,
        response: &ResponseApdu,
    ) -> Result<CreateWalletResponse> {
        let decoder = response_decoder(response)?;
        let index = match decoder.decode_optional::<u8>(TlvTag::WalletIndex)? {
            Some(index) => u32::from(index),
            None => self.wallet_index.ok_or(Error::MissingPreflightRead)?,
        };
        let remaining_signatures = environment.card.as_ref().and_then(|c| c.remaining_signatures);

        Ok(CreateWalletResponse {
            card_id: decoder.decode(TlvTag::CardId)?,
            wallet: CardWallet {
                index,
                status: WalletStatus::Loaded,
                curve: self.curve,
                public_key: decoder.decode(TlvTag::WalletPublicKey)?,
                chain_code: decoder.decode_optional(TlvTag::WalletHdChain)?,
                settings: WalletSettings {
                    is_permanent: self.is_permanent,
                },
                total_signed_hashes: Some(0),
                remaining_signatures,
                has_backup: false,
                derived_keys: Vec::new(),
            },
        })
    }

    // Cards with a default passcode answer a repeated create with invalid params
    fn map_error(&self, card: Option<&Card>, error: Error) -> Error {
        match (error, card) {
            (Error::InvalidParams, Some(card))
                if card.firmware_version >= FirmwareVersion::IS_PASSCODE_STATUS_AVAILABLE
                    && card.is_passcode_set == Some(false) =>
            {
                Error::WalletAlreadyCreated
            }
            (error, _) => error,
        }
    }

    async fn run(&mut self, session: &mut CardSession) -> Result<CreateWalletResponse> {
        let index = Self::free_index(require_card(session.environment())?)?;
        self.wallet_index = Some(index);
        debug!(index, curve = %self.curve, "Creating wallet");

        let response = session.transceive(&*self).await?;
        if let Some(card) = session.environment_mut().card.as_mut() {
            card.upsert_wallet(response.wallet.clone());
        }
        Ok(response)
    }
}
