use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tangem_core::{CommandApdu, Instruction, ResponseApdu, TlvBuilder, TlvTag};
use tracing::{debug, instrument};

use super::{BackupCard, PrimaryCard};
use crate::{
    Error, Result,
    command::{CardSessionRunnable, Command, require_card, response_decoder},
    environment::SessionEnvironment,
    session::CardSession,
    types::{BackupRawStatus, BackupStatus, Card, FirmwareVersion, UserCode, UserCodeType},
};

/// Checks shared by every command of the backup family
fn check_backup_available(card: &Card) -> Result<()> {
    if card.firmware_version < FirmwareVersion::BACKUP_AVAILABLE {
        return Err(Error::BackupFailedFirmware);
    }
    if !card.settings.is_backup_allowed() {
        return Err(Error::BackupNotAllowed);
    }
    Ok(())
}

/// Store the codes the card switched to and mirror them on the snapshot
fn adopt_new_codes(environment: &mut SessionEnvironment, access_code: [u8; 32], passcode: [u8; 32]) {
    let access_code = UserCode::from_hash(UserCodeType::AccessCode, access_code);
    let passcode = UserCode::from_hash(UserCodeType::Passcode, passcode);
    if let Some(card) = environment.card.as_mut() {
        card.is_access_code_set = Some(!access_code.is_default());
        card.is_passcode_set = Some(!passcode.is_default());
    }
    environment.set_user_code(access_code);
    environment.set_user_code(passcode);
}

fn link_count(cards: &[BackupCard]) -> Result<u8> {
    u8::try_from(cards.len()).map_err(|_| Error::TooMuchBackupCards)
}

/// Obtains the linking key of the primary card
#[derive(Debug, Clone, Copy, Default)]
pub struct StartPrimaryCardLinkingCommand;

impl StartPrimaryCardLinkingCommand {
    /// New command
    pub const fn new() -> Self {
        Self
    }
}

impl Command for StartPrimaryCardLinkingCommand {
    type Response = PrimaryCard;

    fn perform_pre_check(&self, card: &Card) -> Result<()> {
        check_backup_available(card)?;
        match card.backup_status {
            Some(status) if !status.can_backup() => return Err(Error::BackupFailedAlreadyCreated),
            None => return Err(Error::BackupFailedFirmware),
            _ => {}
        }
        if card.wallets.is_empty() {
            return Err(Error::BackupFailedEmptyWallets);
        }
        Ok(())
    }

    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu> {
        let card = require_card(environment)?;
        let mut builder = TlvBuilder::new();
        builder
            .append_opt(TlvTag::Pin, environment.access_code_hash())?
            .append(TlvTag::CardId, card.card_id.clone())?;
        Ok(CommandApdu::new(Instruction::StartPrimaryCardLinking, builder.build()))
    }

    fn deserialize(&self, environment: &SessionEnvironment, response: &ResponseApdu) -> Result<PrimaryCard> {
        let card = require_card(environment)?;
        let decoder = response_decoder(response)?;

        let mut wallet_curves: Vec<_> = card.wallets.iter().map(|w| w.curve).collect();
        wallet_curves.sort_unstable();
        wallet_curves.dedup();

        Ok(PrimaryCard {
            card_id: decoder.decode(TlvTag::CardId)?,
            card_public_key: card.card_public_key.clone(),
            linking_key: decoder.decode(TlvTag::PrimaryCardLinkingKey)?,
            existing_wallets_count: card.wallets.len(),
            is_hd_wallet_allowed: card.settings.is_hd_wallet_allowed(),
            issuer: card.issuer.clone(),
            wallet_curves,
            batch_id: card.batch_id.clone(),
            firmware_version: card.firmware_version,
        })
    }
}

/// Obtains the linking key of a backup card, signed by its card key
#[derive(Debug, Clone)]
pub struct StartBackupCardLinkingCommand {
    primary_linking_key: Vec<u8>,
}

impl StartBackupCardLinkingCommand {
    /// Link to the primary card owning `primary_linking_key`
    pub fn new(primary_linking_key: impl Into<Vec<u8>>) -> Self {
        Self {
            primary_linking_key: primary_linking_key.into(),
        }
    }
}

impl Command for StartBackupCardLinkingCommand {
    type Response = BackupCard;

    fn perform_pre_check(&self, card: &Card) -> Result<()> {
        check_backup_available(card)?;
        if !card.wallets.is_empty() {
            return Err(Error::BackupFailedNotEmptyWallets(card.card_id.clone()));
        }
        Ok(())
    }

    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu> {
        let card = require_card(environment)?;
        let mut builder = TlvBuilder::new();
        builder
            .append_opt(TlvTag::Pin, environment.access_code_hash())?
            .append(TlvTag::CardId, card.card_id.clone())?
            .append_bytes(TlvTag::PrimaryCardLinkingKey, &self.primary_linking_key)?;
        Ok(CommandApdu::new(Instruction::StartBackupCardLinking, builder.build()))
    }

    fn deserialize(&self, environment: &SessionEnvironment, response: &ResponseApdu) -> Result<BackupCard> {
        let card = require_card(environment)?;
        let decoder = response_decoder(response)?;
        Ok(BackupCard {
            card_id: decoder.decode(TlvTag::CardId)?,
            card_public_key: card.card_public_key.clone(),
            linking_key: decoder.decode(TlvTag::BackupCardLinkingKey)?,
            attest_signature: decoder.decode(TlvTag::CardSignature)?,
            batch_id: card.batch_id.clone(),
            firmware_version: card.firmware_version,
        })
    }
}

/// Checks that a card can back up the primary card, then links it
#[derive(Debug, Clone)]
pub struct StartBackupCardLinkingTask {
    primary: PrimaryCard,
    added: Vec<String>,
}

impl StartBackupCardLinkingTask {
    /// Link a backup card to `primary`, refusing the cards in `added`
    pub const fn new(primary: PrimaryCard, added: Vec<String>) -> Self {
        Self { primary, added }
    }

    fn check_compatibility(&self, card: &Card) -> Result<()> {
        if card.issuer.public_key != self.primary.issuer.public_key {
            return Err(Error::BackupFailedWrongIssuer);
        }
        if !self
            .primary
            .wallet_curves
            .iter()
            .all(|curve| card.supported_curves.contains(curve))
        {
            return Err(Error::BackupFailedNotEnoughCurves);
        }
        if self.primary.existing_wallets_count > usize::from(card.settings.max_wallets_count) {
            return Err(Error::BackupFailedNotEnoughWallets);
        }
        if card.card_id.eq_ignore_ascii_case(&self.primary.card_id) {
            return Err(Error::BackupCardRequired);
        }
        if self
            .added
            .iter()
            .any(|id| id.eq_ignore_ascii_case(&card.card_id))
        {
            return Err(Error::BackupCardAlreadyAdded);
        }
        Ok(())
    }
}

#[async_trait]
impl CardSessionRunnable for StartBackupCardLinkingTask {
    type Output = BackupCard;

    #[instrument(level = "debug", skip_all)]
    async fn execute(&mut self, session: &mut CardSession) -> Result<BackupCard> {
        self.check_compatibility(require_card(session.environment())?)?;
        StartBackupCardLinkingCommand::new(self.primary.linking_key.clone())
            .run(session)
            .await
    }
}

/// Primary card signature over the link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkBackupCardsResponse {
    /// Card id
    pub card_id: String,
    /// Signature handed to every backup card
    pub attest_signature: Vec<u8>,
}

/// Links the backup cards to the primary card and sets the new user codes
#[derive(Debug, Clone)]
pub struct LinkBackupCardsCommand {
    backup_cards: Vec<BackupCard>,
    access_code: [u8; 32],
    passcode: [u8; 32],
}

impl LinkBackupCardsCommand {
    /// Link `backup_cards`, in slot order, under the given code hashes
    pub const fn new(backup_cards: Vec<BackupCard>, access_code: [u8; 32], passcode: [u8; 32]) -> Self {
        Self {
            backup_cards,
            access_code,
            passcode,
        }
    }
}

#[async_trait]
impl Command for LinkBackupCardsCommand {
    type Response = LinkBackupCardsResponse;

    fn requires_passcode(&self) -> bool {
        true
    }

    fn perform_pre_check(&self, card: &Card) -> Result<()> {
        check_backup_available(card)?;
        if card.wallets.is_empty() {
            return Err(Error::BackupFailedEmptyWallets);
        }
        if self.backup_cards.is_empty() {
            return Err(Error::EmptyBackupCards);
        }
        Ok(())
    }

    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu> {
        let card = require_card(environment)?;
        let mut builder = TlvBuilder::new();
        builder
            .append(TlvTag::CardId, card.card_id.clone())?
            .append_opt(TlvTag::Pin, environment.access_code_hash())?
            .append_opt(TlvTag::Pin2, environment.passcode_hash())?
            .append(TlvTag::BackupCount, link_count(&self.backup_cards)?)?
            .append_bytes(TlvTag::NewPin, &self.access_code)?
            .append_bytes(TlvTag::NewPin2, &self.passcode)?;

        for (slot, backup_card) in self.backup_cards.iter().enumerate() {
            let mut link = TlvBuilder::new();
            link.append(TlvTag::FileIndex, u8::try_from(slot).map_err(|_| Error::TooMuchBackupCards)?)?
                .append_bytes(TlvTag::BackupCardLinkingKey, &backup_card.linking_key)?
                .append_bytes(TlvTag::BackupCardPublicKey, &backup_card.card_public_key)?
                .append_bytes(TlvTag::CardSignature, &backup_card.attest_signature)?;
            builder.append_nested(TlvTag::BackupCardLink, &link)?;
        }
        Ok(CommandApdu::new(Instruction::LinkBackupCards, builder.build()))
    }

    fn deserialize(
        &self,
        _environment: &SessionEnvironment,
        response: &ResponseApdu,
    ) -> Result<LinkBackupCardsResponse> {
        let decoder = response_decoder(response)?;
        Ok(LinkBackupCardsResponse {
            card_id: decoder.decode(TlvTag::CardId)?,
            attest_signature: decoder.decode(TlvTag::BackupAttestSignature)?,
        })
    }

    async fn run(&mut self, session: &mut CardSession) -> Result<LinkBackupCardsResponse> {
        let response = session.transceive(&*self).await?;
        let count = link_count(&self.backup_cards)?;

        let environment = session.environment_mut();
        adopt_new_codes(environment, self.access_code, self.passcode);
        if let Some(card) = environment.card.as_mut() {
            card.backup_status = Some(BackupStatus::CardLinked { cards_count: count });
        }
        debug!(count, "Backup cards linked");
        Ok(response)
    }
}

/// Backup status reported by a backup card after linking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkPrimaryCardResponse {
    /// Card id
    pub card_id: String,
    /// Raw backup status
    pub backup_status: BackupRawStatus,
}

/// Links a backup card to the primary card and sets the new user codes
#[derive(Debug, Clone)]
pub struct LinkPrimaryCardCommand {
    primary: PrimaryCard,
    backup_cards: Vec<BackupCard>,
    attest_signature: Vec<u8>,
    access_code: [u8; 32],
    passcode: [u8; 32],
}

impl LinkPrimaryCardCommand {
    /// Link to `primary` as one of `backup_cards`
    pub const fn new(
        primary: PrimaryCard,
        backup_cards: Vec<BackupCard>,
        attest_signature: Vec<u8>,
        access_code: [u8; 32],
        passcode: [u8; 32],
    ) -> Self {
        Self {
            primary,
            backup_cards,
            attest_signature,
            access_code,
            passcode,
        }
    }
}

#[async_trait]
impl Command for LinkPrimaryCardCommand {
    type Response = LinkPrimaryCardResponse;

    fn perform_pre_check(&self, card: &Card) -> Result<()> {
        check_backup_available(card)?;
        if !card.wallets.is_empty() {
            return Err(Error::BackupFailedNotEmptyWallets(card.card_id.clone()));
        }
        Ok(())
    }

    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu> {
        let card = require_card(environment)?;
        let mut builder = TlvBuilder::new();
        builder
            .append(TlvTag::CardId, card.card_id.clone())?
            .append_opt(TlvTag::Pin, environment.access_code_hash())?
            .append_opt(TlvTag::Pin2, environment.passcode_hash())?
            .append_bytes(TlvTag::PrimaryCardLinkingKey, &self.primary.linking_key)?
            .append_bytes(TlvTag::BackupAttestSignature, &self.attest_signature)?
            .append_bytes(TlvTag::NewPin, &self.access_code)?
            .append_bytes(TlvTag::NewPin2, &self.passcode)?;

        for (slot, backup_card) in self.backup_cards.iter().enumerate() {
            let mut link = TlvBuilder::new();
            link.append(TlvTag::FileIndex, u8::try_from(slot).map_err(|_| Error::TooMuchBackupCards)?)?
                .append_bytes(TlvTag::BackupCardLinkingKey, &backup_card.linking_key)?;
            builder.append_nested(TlvTag::BackupCardLink, &link)?;
        }
        Ok(CommandApdu::new(Instruction::LinkPrimaryCard, builder.build()))
    }

    fn deserialize(
        &self,
        _environment: &SessionEnvironment,
        response: &ResponseApdu,
    ) -> Result<LinkPrimaryCardResponse> {
        let decoder = response_decoder(response)?;
        Ok(LinkPrimaryCardResponse {
            card_id: decoder.decode(TlvTag::CardId)?,
            backup_status: decoder.decode(TlvTag::BackupStatus)?,
        })
    }

    // A card asking for a code here already switched to the new codes: the
    // link went through but its response was lost.
    fn map_error(&self, _card: Option<&Card>, error: Error) -> Error {
        if error.is_user_code_required() {
            Error::BackupFailedCardNotLinked
        } else {
            error
        }
    }

    async fn run(&mut self, session: &mut CardSession) -> Result<LinkPrimaryCardResponse> {
        let response = match session.transceive(&*self).await {
            Ok(response) => response,
            Err(Error::BackupFailedCardNotLinked) => {
                debug!("Card already holds the new codes, assuming it is linked");
                LinkPrimaryCardResponse {
                    card_id: require_card(session.environment())?.card_id.clone(),
                    backup_status: BackupRawStatus::CardLinked,
                }
            }
            Err(error) => return Err(error),
        };

        let count = link_count(&self.backup_cards)?;
        let environment = session.environment_mut();
        adopt_new_codes(environment, self.access_code, self.passcode);
        if let Some(card) = environment.card.as_mut() {
            card.backup_status = Some(BackupStatus::from_raw(response.backup_status, count));
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use tangem_core::{Tlv, TlvDecoder};

    use super::*;
    use crate::{
        CardManager,
        backup::fixtures::{self, id_response},
        crypto::sha256,
        testing::{self, CardFixture, MockReader, ScriptedDelegate},
    };

    const PRIMARY_ID: &str = "AC01000000000001";
    const BACKUP_ID: &str = "AC01000000000002";

    fn primary_fixture() -> CardFixture {
        CardFixture::new("4.52r", 4).with_id(PRIMARY_ID, testing::fixture_key(2))
    }

    fn backup_fixture() -> CardFixture {
        CardFixture::new("4.52r", 4).with_id(BACKUP_ID, testing::fixture_key(3))
    }

    fn primary_card() -> PrimaryCard {
        let fixture = primary_fixture();
        PrimaryCard {
            card_id: PRIMARY_ID.into(),
            card_public_key: fixture.key.public_key().to_vec(),
            linking_key: fixtures::linking_key(0),
            existing_wallets_count: 2,
            is_hd_wallet_allowed: false,
            issuer: crate::types::Issuer {
                name: "TANGEM SDK".into(),
                public_key: testing::ISSUER_KEY.to_vec(),
            },
            wallet_curves: vec![crate::types::EllipticCurve::Secp256k1],
            batch_id: "0008".into(),
            firmware_version: FirmwareVersion::BACKUP_AVAILABLE,
        }
    }

    #[tokio::test]
    async fn test_primary_card_material() {
        let card = primary_fixture();
        let reader = MockReader::new();
        testing::script_full_read(&reader, &card, &[0, 1]);
        let mut response = id_response(PRIMARY_ID);
        response.push(Tlv::new(TlvTag::PrimaryCardLinkingKey, fixtures::linking_key(0)));
        reader.respond_tlvs(&response);

        let manager = CardManager::new(reader.clone(), ScriptedDelegate::shared());
        let primary = manager
            .start_session(&mut StartPrimaryCardLinkingCommand::new(), Some(PRIMARY_ID))
            .await
            .unwrap();
        assert_eq!(primary.existing_wallets_count, 2);
        assert_eq!(primary.wallet_curves.len(), 1);
        assert_eq!(primary.card_public_key, card.key.public_key());
        assert_eq!(primary.issuer.public_key, testing::ISSUER_KEY);
        assert_eq!(reader.sent_ins()[2], 0xE8);
    }

    #[tokio::test]
    async fn test_primary_without_wallets_is_refused() {
        let reader = MockReader::new();
        testing::script_full_read(&reader, &primary_fixture(), &[]);

        let manager = CardManager::new(reader.clone(), ScriptedDelegate::shared());
        let error = manager
            .start_session(&mut StartPrimaryCardLinkingCommand::new(), None)
            .await
            .unwrap_err();
        assert_eq!(error, Error::BackupFailedEmptyWallets);
        assert_eq!(reader.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_backup_card_checks() {
        let cases = [
            (
                {
                    let mut card = backup_fixture();
                    card.issuer_key = vec![0x04, 0x01];
                    card
                },
                Vec::new(),
                Error::BackupFailedWrongIssuer,
            ),
            (
                CardFixture::new("4.52r", 1).with_id(BACKUP_ID, testing::fixture_key(3)),
                Vec::new(),
                Error::BackupFailedNotEnoughWallets,
            ),
            (
                primary_fixture(),
                Vec::new(),
                Error::BackupCardRequired,
            ),
            (
                backup_fixture(),
                vec![BACKUP_ID.to_lowercase()],
                Error::BackupCardAlreadyAdded,
            ),
        ];

        for (card, added, expected) in cases {
            let reader = MockReader::new();
            testing::script_full_read(&reader, &card, &[]);
            let mut task = StartBackupCardLinkingTask::new(primary_card(), added);
            let manager = CardManager::new(reader.clone(), ScriptedDelegate::shared());
            assert_eq!(manager.start_session(&mut task, None).await.unwrap_err(), expected);
            assert_eq!(reader.pending(), 0, "{expected:?}");
        }
    }

    #[tokio::test]
    async fn test_backup_card_linking() {
        let card = backup_fixture();
        let reader = MockReader::new();
        testing::script_full_read(&reader, &card, &[]);
        let linking_key = fixtures::linking_key(1);
        let mut response = id_response(BACKUP_ID);
        response.push(Tlv::new(TlvTag::BackupCardLinkingKey, linking_key.clone()));
        response.push(Tlv::new(
            TlvTag::CardSignature,
            fixtures::attest(&card.key, &linking_key, BACKUP_ID),
        ));
        reader.respond_tlvs(&response);

        let manager = CardManager::new(reader.clone(), ScriptedDelegate::shared());
        let mut task = StartBackupCardLinkingTask::new(primary_card(), Vec::new());
        let backup = manager.start_session(&mut task, None).await.unwrap();
        assert!(backup.verify_attestation().unwrap());

        let request = TlvDecoder::from_bytes(reader.sent()[2].data()).unwrap();
        assert_eq!(
            request.decode::<Vec<u8>>(TlvTag::PrimaryCardLinkingKey).unwrap(),
            fixtures::linking_key(0)
        );
    }

    #[tokio::test]
    async fn test_link_backup_cards_frame() {
        let reader = MockReader::new();
        testing::script_full_read(&reader, &primary_fixture(), &[0]);
        let mut response = id_response(PRIMARY_ID);
        response.push(Tlv::new(TlvTag::BackupAttestSignature, vec![0xAA; 64]));
        reader.respond_tlvs(&response);

        let backups = vec![fixtures::backup_card(&backup_fixture(), 1)];
        let access_code = sha256(b"123456");
        let mut command = LinkBackupCardsCommand::new(backups.clone(), access_code, sha256(b"000"));
        let manager = CardManager::new(reader.clone(), ScriptedDelegate::shared());
        let linked = manager.start_session(&mut command, None).await.unwrap();
        assert_eq!(linked.attest_signature, [0xAA; 64]);

        let request = TlvDecoder::from_bytes(reader.sent()[2].data()).unwrap();
        assert_eq!(request.decode::<u8>(TlvTag::BackupCount).unwrap(), 1);
        assert_eq!(request.decode::<Vec<u8>>(TlvTag::NewPin).unwrap(), access_code);
        let links = request.decode_nested_array(TlvTag::BackupCardLink).unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].decode::<u8>(TlvTag::FileIndex).unwrap(), 0);
        assert_eq!(
            links[0].decode::<Vec<u8>>(TlvTag::CardSignature).unwrap(),
            backups[0].attest_signature
        );
    }

    #[test]
    fn test_lost_link_response_counts_as_linked() {
        let command = LinkPrimaryCardCommand::new(
            primary_card(),
            Vec::new(),
            Vec::new(),
            sha256(b"123456"),
            sha256(b"000"),
        );
        assert_eq!(
            command.map_error(None, Error::AccessCodeRequired),
            Error::BackupFailedCardNotLinked
        );
        assert_eq!(command.map_error(None, Error::InvalidState), Error::InvalidState);
    }
}
