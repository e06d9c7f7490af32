use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tangem_core::{CommandApdu, Instruction, ResponseApdu, TlvBuilder, TlvTag, TlvValue, TlvValueType};
use tracing::{debug, instrument};

use crate::{
    Error, Result,
    command::{CardSessionRunnable, Command, PreflightReadMode, require_card, response_decoder},
    environment::SessionEnvironment,
    session::CardSession,
    types::{Card, CardWallet, DerivationPath, FirmwareVersion},
};

/// What a `Read` instruction returns, sent under `InteractionMode`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReadMode {
    /// Card data
    Card = 0x01,
    /// A single wallet
    Wallet = 0x02,
    /// A page of the wallet list
    WalletsList = 0x03,
}

impl TlvValue for ReadMode {
    fn accepts(value_type: TlvValueType) -> bool {
        value_type == TlvValueType::InteractionMode
    }

    fn encode_value(&self, _tag: TlvTag) -> tangem_core::Result<Vec<u8>> {
        Ok(vec![*self as u8])
    }

    fn decode_value(tag: TlvTag, bytes: &[u8]) -> tangem_core::Result<Self> {
        match u8::decode_value(tag, bytes)? {
            0x01 => Ok(Self::Card),
            0x02 => Ok(Self::Wallet),
            0x03 => Ok(Self::WalletsList),
            _ => Err(tangem_core::Error::Decoding {
                tag,
                reason: "unknown read mode",
            }),
        }
    }
}

fn terminal_public_key(environment: &SessionEnvironment) -> Option<Vec<u8>> {
    environment
        .terminal_keys
        .as_ref()
        .map(|keys| keys.public_key().to_vec())
}

/// Reads the card data and installs it in the session environment
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadCommand;

impl ReadCommand {
    /// New read command
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Command for ReadCommand {
    type Response = Card;

    fn preflight_read_mode(&self) -> PreflightReadMode {
        PreflightReadMode::None
    }

    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu> {
        let mut builder = TlvBuilder::new();
        builder
            .append_opt(TlvTag::Pin, environment.access_code_hash())?
            .append_opt(TlvTag::TerminalPublicKey, terminal_public_key(environment))?;
        Ok(CommandApdu::new(Instruction::Read, builder.build()))
    }

    fn deserialize(&self, _environment: &SessionEnvironment, response: &ResponseApdu) -> Result<Card> {
        Card::decode(&response_decoder(response)?)
    }

    // The card answers a wrong access code on read with invalid params
    fn map_error(&self, _card: Option<&Card>, error: Error) -> Error {
        match error {
            Error::InvalidParams => Error::AccessCodeRequired,
            other => other,
        }
    }

    async fn run(&mut self, session: &mut CardSession) -> Result<Card> {
        let card = session.transceive(&*self).await?;
        debug!(card_id = %card.card_id, firmware = %card.firmware_version, "Card read");
        session.environment_mut().card = Some(card.clone());
        Ok(card)
    }
}

/// One wallet as reported by the card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadWalletResponse {
    /// Card id
    pub card_id: String,
    /// The wallet; with a derivation path its key and chain code are the derived ones
    pub wallet: CardWallet,
}

/// Reads a single wallet, optionally deriving a child key from it
#[derive(Debug, Clone)]
pub struct ReadWalletCommand {
    wallet_public_key: Vec<u8>,
    derivation_path: Option<DerivationPath>,
}

impl ReadWalletCommand {
    /// Read the wallet holding `wallet_public_key`
    pub const fn new(wallet_public_key: Vec<u8>) -> Self {
        Self {
            wallet_public_key,
            derivation_path: None,
        }
    }

    /// Ask the card for the key derived along `path` instead
    pub fn with_derivation_path(mut self, path: DerivationPath) -> Self {
        self.derivation_path = Some(path);
        self
    }
}

#[async_trait]
impl Command for ReadWalletCommand {
    type Response = ReadWalletResponse;

    fn preflight_read_mode(&self) -> PreflightReadMode {
        PreflightReadMode::ReadCardOnly
    }

    fn perform_pre_check(&self, card: &Card) -> Result<()> {
        if self.derivation_path.is_some()
            && card.firmware_version < FirmwareVersion::HD_WALLET_AVAILABLE
        {
            return Err(Error::NotSupportedFirmwareVersion);
        }
        Ok(())
    }

    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu> {
        let card = require_card(environment)?;
        let mut builder = TlvBuilder::new();
        builder
            .append_opt(TlvTag::Pin, environment.access_code_hash())?
            .append(TlvTag::CardId, card.card_id.clone())?
            .append(TlvTag::InteractionMode, ReadMode::Wallet)?
            .append_bytes(TlvTag::WalletPublicKey, &self.wallet_public_key)?
            .append_opt(TlvTag::WalletHdPath, self.derivation_path.clone())?;
        Ok(CommandApdu::new(Instruction::Read, builder.build()))
    }

    fn deserialize(
        &self,
        environment: &SessionEnvironment,
        response: &ResponseApdu,
    ) -> Result<ReadWalletResponse> {
        let is_permanent = require_card(environment)?.settings.is_permanent_wallet();
        let decoder = response_decoder(response)?;
        let wallet = match CardWallet::decode(&decoder, is_permanent) {
            Ok(Some(wallet)) => wallet,
            Ok(None) => return Err(Error::WalletNotFound),
            Err(error) => {
                debug!(%error, "Undecodable wallet block");
                return Err(Error::WalletNotFound);
            }
        };
        Ok(ReadWalletResponse {
            card_id: decoder.decode(TlvTag::CardId)?,
            wallet,
        })
    }

    async fn run(&mut self, session: &mut CardSession) -> Result<ReadWalletResponse> {
        let response = session.transceive(&*self).await?;
        debug!(
            index = response.wallet.index,
            derived = self.derivation_path.is_some(),
            "Wallet read"
        );
        if self.derivation_path.is_none() {
            if let Some(card) = session.environment_mut().card.as_mut() {
                let mut wallet = response.wallet.clone();
                if let Some(known) = card.wallet(&wallet.public_key) {
                    wallet.derived_keys = known.derived_keys.clone();
                }
                card.upsert_wallet(wallet);
            }
        }
        Ok(response)
    }
}

/// Wallets of a multi-wallet card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadWalletsListResponse {
    /// Card id
    pub card_id: String,
    /// Loaded wallets, sorted by index
    pub wallets: Vec<CardWallet>,
}

/// One page of wallet slots
#[derive(Debug)]
struct WalletsPage {
    wallets: Vec<CardWallet>,
    slots: u32,
}

/// `Read` of the wallet list starting at a slot cursor
#[derive(Debug)]
struct ReadWalletsPageCommand {
    cursor: u32,
}

impl Command for ReadWalletsPageCommand {
    type Response = WalletsPage;

    fn preflight_read_mode(&self) -> PreflightReadMode {
        PreflightReadMode::ReadCardOnly
    }

    fn perform_pre_check(&self, card: &Card) -> Result<()> {
        if card.firmware_version < FirmwareVersion::MULTI_WALLET_AVAILABLE {
            return Err(Error::NotSupportedFirmwareVersion);
        }
        Ok(())
    }

    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu> {
        let card = require_card(environment)?;
        let mut builder = TlvBuilder::new();
        builder
            .append_opt(TlvTag::Pin, environment.access_code_hash())?
            .append(TlvTag::CardId, card.card_id.clone())?
            .append(TlvTag::InteractionMode, ReadMode::WalletsList)?
            .append_opt(TlvTag::TerminalPublicKey, terminal_public_key(environment))?;
        if self.cursor > 0 {
            builder.append(TlvTag::WalletIndex, self.cursor)?;
        }
        Ok(CommandApdu::new(Instruction::Read, builder.build()))
    }

    fn deserialize(
        &self,
        environment: &SessionEnvironment,
        response: &ResponseApdu,
    ) -> Result<WalletsPage> {
        let is_permanent = require_card(environment)?.settings.is_permanent_wallet();
        let decoder = response_decoder(response)?;
        let blocks = decoder.decode_nested_array(TlvTag::CardWallet)?;

        let mut wallets = Vec::with_capacity(blocks.len());
        for block in &blocks {
            if let Some(wallet) = CardWallet::decode(block, is_permanent)? {
                wallets.push(wallet);
            }
        }
        Ok(WalletsPage {
            wallets,
            slots: u32::try_from(blocks.len()).map_err(|_| {
                Error::InvalidResponse("too many wallet blocks".into())
            })?,
        })
    }
}

/// Reads every wallet slot of a multi-wallet card, page by page
///
/// The card returns as many slots as fit in a frame; the next page starts at
/// the number of slots received so far. The list is complete when the
/// cursor reaches the card's wallet capacity or a page comes back empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadWalletsListCommand;

impl ReadWalletsListCommand {
    /// New wallet list read
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CardSessionRunnable for ReadWalletsListCommand {
    type Output = ReadWalletsListResponse;

    fn preflight_read_mode(&self) -> PreflightReadMode {
        PreflightReadMode::ReadCardOnly
    }

    #[instrument(level = "debug", skip_all)]
    async fn execute(&mut self, session: &mut CardSession) -> Result<ReadWalletsListResponse> {
        let card = require_card(session.environment())?;
        let capacity = u32::from(card.settings.max_wallets_count);
        let card_id = card.card_id.clone();
        let mut page = ReadWalletsPageCommand { cursor: 0 };
        let mut wallets = BTreeMap::new();

        loop {
            let response = session.transceive(&page).await?;
            if response.slots == 0 {
                if page.cursor == 0 {
                    return Err(Error::CardWithMaxZeroWallets);
                }
                break;
            }

            page.cursor += response.slots;
            for wallet in response.wallets {
                wallets.insert(wallet.index, wallet);
            }
            debug!(received = page.cursor, capacity, "Wallet page read");
            if page.cursor >= capacity {
                break;
            }
        }

        let wallets: Vec<CardWallet> = wallets.into_values().collect();
        let card = session
            .environment_mut()
            .card
            .as_mut()
            .ok_or(Error::MissingPreflightRead)?;
        card.set_wallets(wallets.clone());

        Ok(ReadWalletsListResponse { card_id, wallets })
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;
    use tangem_core::{StatusWord, Tlv};

    use super::*;
    use crate::{
        CardManager,
        testing::{self, MockReader, ScriptedDelegate, wallet_page},
        types::UserCodeType,
    };

    #[test]
    fn test_read_frame_with_default_access_code() {
        let environment = SessionEnvironment::new(Default::default());
        let apdu = ReadCommand::new().serialize(&environment).unwrap();

        let mut expected = hex!("00F20000 000022 1020").to_vec();
        expected.extend(hex!(
            "91B4D142823F7D20C5F08DF69122DE43F35F057A988D9619F6D3138485C9A203"
        ));
        assert_eq!(apdu.to_bytes().as_ref(), expected.as_slice());
    }

    #[test]
    fn test_invalid_params_means_access_code() {
        let error = ReadCommand::new().map_error(None, Error::InvalidParams);
        assert_eq!(error, Error::AccessCodeRequired);
        assert_eq!(
            ReadCommand::new().map_error(None, Error::InvalidState),
            Error::InvalidState
        );
    }

    #[test]
    fn test_read_mode_value() {
        let mut builder = TlvBuilder::new();
        builder
            .append(TlvTag::InteractionMode, ReadMode::WalletsList)
            .unwrap();
        assert_eq!(builder.build(), hex!("230103"));
        assert!(builder.append(TlvTag::WalletIndex, ReadMode::Card).is_err());
    }

    async fn read_list(reader: &MockReader) -> Result<ReadWalletsListResponse> {
        let manager = CardManager::new(reader.clone(), ScriptedDelegate::shared());
        manager
            .start_session(&mut ReadWalletsListCommand::new(), None)
            .await
    }

    #[tokio::test]
    async fn test_pages_until_capacity() {
        let reader = MockReader::new();
        reader.respond_tlvs(&testing::card_tlvs("4.52r", 5));
        reader.respond_tlvs(&wallet_page(&[0, 1]));
        reader.respond_tlvs(&wallet_page(&[2]));
        // Slot 3 is repeated by the card and must not be duplicated
        reader.respond_tlvs(&wallet_page(&[3, 3]));

        let response = read_list(&reader).await.unwrap();
        let indices: Vec<u32> = response.wallets.iter().map(|w| w.index).collect();
        assert_eq!(indices, [0, 1, 2, 3]);
        assert_eq!(response.card_id, testing::CARD_ID);

        let sent = reader.sent();
        assert_eq!(sent.len(), 4);
        let cursors: Vec<Option<u8>> = sent[1..]
            .iter()
            .map(|apdu| {
                tangem_core::TlvDecoder::from_bytes(apdu.data())
                    .unwrap()
                    .decode_optional(TlvTag::WalletIndex)
                    .unwrap()
            })
            .collect();
        assert_eq!(cursors, [None, Some(2), Some(3)]);
    }

    #[tokio::test]
    async fn test_stops_on_empty_page() {
        let reader = MockReader::new();
        reader.respond_tlvs(&testing::card_tlvs("4.52r", 20));
        reader.respond_tlvs(&wallet_page(&[0, 1, 2]));
        reader.respond_tlvs(&wallet_page(&[]));

        let response = read_list(&reader).await.unwrap();
        assert_eq!(response.wallets.len(), 3);
        assert_eq!(reader.sent().len(), 3);
    }

    #[tokio::test]
    async fn test_zero_wallets_on_first_page() {
        let reader = MockReader::new();
        reader.respond_tlvs(&testing::card_tlvs("4.52r", 5));
        reader.respond_tlvs(&wallet_page(&[]));

        assert_eq!(
            read_list(&reader).await.unwrap_err(),
            Error::CardWithMaxZeroWallets
        );
    }

    #[tokio::test]
    async fn test_wrong_access_code_prompts() {
        let reader = MockReader::new();
        reader.respond_status(StatusWord::INVALID_PARAMS);
        reader.respond_tlvs(&testing::card_tlvs("4.52r", 1));
        let delegate = ScriptedDelegate::with_codes(["123456"]);
        let manager = CardManager::new(reader.clone(), delegate.clone());

        let card = manager
            .start_session(&mut ReadCommand::new(), None)
            .await
            .unwrap();
        assert_eq!(card.card_id, testing::CARD_ID);
        assert_eq!(
            delegate.prompts(),
            [(UserCodeType::AccessCode, true)],
            "one prompt, flagged as first attempt"
        );

        let retried = Tlv::decode_all(reader.sent()[1].data()).unwrap();
        assert_eq!(
            retried[0].value(),
            crate::crypto::sha256(b"123456").as_slice()
        );
    }
}
