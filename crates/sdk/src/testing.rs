//! Scripted reader, delegate and card fixtures shared by the tests

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use hex_literal::hex;
use parking_lot::Mutex;
use tangem_core::{CommandApdu, ResponseApdu, StatusWord, Tlv, TlvTag};

use crate::{
    Error, Result,
    crypto::KeyPair,
    delegate::{SessionViewDelegate, WrongCardKind},
    reader::CardReader,
    types::UserCodeType,
};

pub(crate) const CARD_ID: &str = "CB79000000018201";
pub(crate) const ISSUER_KEY: [u8; 4] = hex!("04ABCDEF");

type Responder = Box<dyn FnOnce(&CommandApdu) -> Result<ResponseApdu> + Send>;

/// Scripted answer to the next frame
enum Scripted {
    Fixed(Result<ResponseApdu>),
    Computed(Responder),
}

impl std::fmt::Debug for Scripted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fixed(response) => f.debug_tuple("Fixed").field(response).finish(),
            Self::Computed(_) => f.write_str("Computed"),
        }
    }
}

#[derive(Debug, Default)]
struct ReaderState {
    responses: VecDeque<Scripted>,
    sent: Vec<CommandApdu>,
    acquired: usize,
    released: usize,
}

/// Reader that answers from a script and records every frame
#[derive(Debug, Clone, Default)]
pub(crate) struct MockReader {
    state: Arc<Mutex<ReaderState>>,
    hold_tag: Arc<AtomicBool>,
}

impl MockReader {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn respond(&self, response: Result<ResponseApdu>) -> &Self {
        self.state.lock().responses.push_back(Scripted::Fixed(response));
        self
    }

    /// Answer the next frame with a response built from the request
    pub(crate) fn respond_with<F>(&self, responder: F) -> &Self
    where
        F: FnOnce(&CommandApdu) -> Result<ResponseApdu> + Send + 'static,
    {
        self.state
            .lock()
            .responses
            .push_back(Scripted::Computed(Box::new(responder)));
        self
    }

    pub(crate) fn respond_tlvs(&self, tlvs: &[Tlv]) -> &Self {
        self.respond(Ok(ResponseApdu::success(tlvs).unwrap()))
    }

    pub(crate) fn respond_status(&self, status: StatusWord) -> &Self {
        self.respond(Ok(ResponseApdu::new(Vec::new(), status)))
    }

    pub(crate) fn respond_card(&self, card: &CardFixture) -> &Self {
        self.respond_tlvs(&card.tlvs())
    }

    /// Make the tag never appear
    pub(crate) fn hold_tag(&self, hold: bool) {
        self.hold_tag.store(hold, Ordering::SeqCst);
    }

    pub(crate) fn sent(&self) -> Vec<CommandApdu> {
        self.state.lock().sent.clone()
    }

    pub(crate) fn sent_ins(&self) -> Vec<u8> {
        self.state.lock().sent.iter().map(CommandApdu::instruction).collect()
    }

    pub(crate) fn pending(&self) -> usize {
        self.state.lock().responses.len()
    }

    pub(crate) fn acquired(&self) -> usize {
        self.state.lock().acquired
    }

    pub(crate) fn released(&self) -> usize {
        self.state.lock().released
    }
}

#[async_trait]
impl CardReader for MockReader {
    async fn acquire(&mut self) -> Result<()> {
        self.state.lock().acquired += 1;
        Ok(())
    }

    fn release(&mut self) {
        self.state.lock().released += 1;
    }

    async fn wait_for_tag(&mut self) -> Result<()> {
        if self.hold_tag.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn transmit(&mut self, command: &CommandApdu) -> Result<ResponseApdu> {
        let mut state = self.state.lock();
        state.sent.push(command.clone());
        match state.responses.pop_front() {
            Some(Scripted::Fixed(response)) => response,
            Some(Scripted::Computed(responder)) => responder(command),
            None => Err(Error::Underlying("script exhausted".into())),
        }
    }
}

/// Everything a delegate was told, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DelegateEvent {
    SessionStarted,
    SecurityDelay(u32, u32),
    TagConnected,
    TagLost,
    UserCode(UserCodeType, bool),
    WrongCard(WrongCardKind),
    Stopped(Option<u32>),
    Dismissed,
}

/// Delegate answering prompts from a list and recording events
#[derive(Debug, Default)]
pub(crate) struct ScriptedDelegate {
    codes: Mutex<VecDeque<Option<String>>>,
    events: Mutex<Vec<DelegateEvent>>,
}

impl ScriptedDelegate {
    pub(crate) fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn with_codes<I, S>(codes: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_answers(codes.into_iter().map(|c| Some(c.into())))
    }

    pub(crate) fn with_answers(answers: impl IntoIterator<Item = Option<String>>) -> Arc<Self> {
        Arc::new(Self {
            codes: Mutex::new(answers.into_iter().collect()),
            events: Mutex::default(),
        })
    }

    pub(crate) fn events(&self) -> Vec<DelegateEvent> {
        self.events.lock().clone()
    }

    pub(crate) fn prompts(&self) -> Vec<(UserCodeType, bool)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                DelegateEvent::UserCode(kind, first) => Some((kind, first)),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn count(&self, event: &DelegateEvent) -> usize {
        self.events.lock().iter().filter(|e| *e == event).count()
    }

    fn record(&self, event: DelegateEvent) {
        self.events.lock().push(event);
    }
}

#[async_trait]
impl SessionViewDelegate for ScriptedDelegate {
    async fn on_session_started(&self) {
        self.record(DelegateEvent::SessionStarted);
    }

    async fn on_security_delay(&self, remaining_ms: u32, total_ms: u32) {
        self.record(DelegateEvent::SecurityDelay(remaining_ms, total_ms));
    }

    async fn on_tag_connected(&self) {
        self.record(DelegateEvent::TagConnected);
    }

    async fn on_tag_lost(&self) {
        self.record(DelegateEvent::TagLost);
    }

    async fn request_user_code(
        &self,
        kind: UserCodeType,
        is_first_attempt: bool,
        _card_id: Option<&str>,
    ) -> Option<String> {
        self.record(DelegateEvent::UserCode(kind, is_first_attempt));
        self.codes.lock().pop_front().flatten()
    }

    async fn on_wrong_card(&self, kind: WrongCardKind) {
        self.record(DelegateEvent::WrongCard(kind));
    }

    async fn on_session_stopped(&self, error: Option<&Error>) {
        self.record(DelegateEvent::Stopped(error.map(Error::code)));
    }

    async fn dismiss(&self) {
        self.record(DelegateEvent::Dismissed);
    }
}

/// Deterministic key for fixture `n`
pub(crate) fn fixture_key(n: u8) -> KeyPair {
    KeyPair::from_private_key(&[n.max(1); 32]).unwrap()
}

fn nested(tag: TlvTag, items: &[Tlv]) -> Tlv {
    Tlv::new(tag, Tlv::encode_all(items).unwrap())
}

/// Read response of a personalized card
#[derive(Debug, Clone)]
pub(crate) struct CardFixture {
    pub(crate) card_id: String,
    pub(crate) firmware: String,
    pub(crate) max_wallets: u8,
    pub(crate) key: KeyPair,
    pub(crate) mask: u32,
    pub(crate) backup_status: u8,
    pub(crate) passcode_is_default: bool,
    pub(crate) issuer_key: Vec<u8>,
}

impl CardFixture {
    pub(crate) fn new(firmware: &str, max_wallets: u8) -> Self {
        Self {
            card_id: CARD_ID.to_owned(),
            firmware: firmware.to_owned(),
            max_wallets,
            key: fixture_key(1),
            // reusable, both codes changeable, backup allowed
            mask: 0x0040_0031,
            backup_status: 0,
            passcode_is_default: true,
            issuer_key: ISSUER_KEY.to_vec(),
        }
    }

    pub(crate) fn with_id(mut self, card_id: &str, key: KeyPair) -> Self {
        self.card_id = card_id.to_owned();
        self.key = key;
        self
    }

    pub(crate) fn tlvs(&self) -> Vec<Tlv> {
        let mut tlvs = vec![
            Tlv::new(TlvTag::CardId, hex::decode(&self.card_id).unwrap()),
            Tlv::new(TlvTag::ManufacturerName, b"TANGEM".to_vec()),
            Tlv::new(TlvTag::Status, vec![0x02]),
            Tlv::new(TlvTag::Firmware, self.firmware.as_bytes().to_vec()),
            Tlv::new(TlvTag::CardPublicKey, self.key.public_key().to_vec()),
            Tlv::new(TlvTag::SettingsMask, self.mask.to_be_bytes().to_vec()),
            Tlv::new(TlvTag::IssuerPublicKey, self.issuer_key.clone()),
            Tlv::new(TlvTag::CurveId, b"secp256k1".to_vec()),
            Tlv::new(TlvTag::SigningMethod, vec![0x00]),
            Tlv::new(TlvTag::PauseBeforePin2, vec![0x00, 0x64]),
            Tlv::new(TlvTag::WalletsCount, vec![self.max_wallets]),
            Tlv::new(TlvTag::BackupStatus, vec![self.backup_status]),
            nested(
                TlvTag::CardData,
                &[
                    Tlv::new(TlvTag::BatchId, hex!("0008").to_vec()),
                    Tlv::new(TlvTag::ManufactureDateTime, hex!("07E5030F").to_vec()),
                    Tlv::new(TlvTag::IssuerName, b"TANGEM SDK".to_vec()),
                ],
            ),
        ];
        if self.passcode_is_default {
            tlvs.push(Tlv::new(TlvTag::Pin2IsDefault, vec![0x01]));
        }
        tlvs
    }
}

/// Read response of the default fixture card
pub(crate) fn card_tlvs(firmware: &str, max_wallets: u8) -> Vec<Tlv> {
    CardFixture::new(firmware, max_wallets).tlvs()
}

/// Public key of the fixture wallet at `index`
pub(crate) fn wallet_key(index: u8) -> Vec<u8> {
    fixture_key(index + 10).public_key().to_vec()
}

/// Wallet block of a loaded secp256k1 wallet
pub(crate) fn wallet_block(index: u8) -> Tlv {
    nested(
        TlvTag::CardWallet,
        &[
            Tlv::new(TlvTag::Status, vec![0x02]),
            Tlv::new(TlvTag::WalletIndex, vec![index]),
            Tlv::new(TlvTag::CurveId, b"secp256k1".to_vec()),
            Tlv::new(TlvTag::WalletPublicKey, wallet_key(index)),
        ],
    )
}

/// Wallet list page holding the given slots
pub(crate) fn wallet_page(indices: &[u8]) -> Vec<Tlv> {
    let mut tlvs = vec![Tlv::new(TlvTag::CardId, hex::decode(CARD_ID).unwrap())];
    tlvs.extend(indices.iter().copied().map(wallet_block));
    tlvs
}

/// Response carrying only the card id
pub(crate) fn card_id_response() -> Vec<Tlv> {
    vec![Tlv::new(TlvTag::CardId, hex::decode(CARD_ID).unwrap())]
}

/// Block of a free wallet slot
pub(crate) fn empty_slot(index: u8) -> Tlv {
    nested(
        TlvTag::CardWallet,
        &[
            Tlv::new(TlvTag::Status, vec![0x01]),
            Tlv::new(TlvTag::WalletIndex, vec![index]),
        ],
    )
}

/// Script a full preflight read of a card with the given wallets
///
/// The wallet list comes back in one page covering every slot.
pub(crate) fn script_full_read(reader: &MockReader, card: &CardFixture, wallets: &[u8]) {
    reader.respond_card(card);
    let mut page = vec![Tlv::new(TlvTag::CardId, hex::decode(&card.card_id).unwrap())];
    page.extend((0..card.max_wallets).map(|index| {
        if wallets.contains(&index) {
            wallet_block(index)
        } else {
            empty_slot(index)
        }
    }));
    reader.respond_tlvs(&page);
}
