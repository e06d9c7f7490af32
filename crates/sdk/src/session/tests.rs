use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use tangem_core::{CommandApdu, ResponseApdu, StatusWord, Tlv, TlvDecoder, TlvTag};

use super::encryption;
use crate::{
    CardManager, Error, Result,
    config::{Config, EncryptionMode},
    crypto::{self, SessionKey},
    delegate::WrongCardKind,
    operations::ReadCommand,
    testing::{self, DelegateEvent, MockReader, ScriptedDelegate},
    types::UserCodeType,
};

fn pause(remaining: u16) -> ResponseApdu {
    let data = Tlv::encode_all(&[Tlv::new(TlvTag::Pause, remaining.to_be_bytes().to_vec())])
        .unwrap();
    ResponseApdu::new(data, StatusWord::NEED_PAUSE)
}

fn manager(reader: &MockReader, delegate: Arc<ScriptedDelegate>) -> CardManager {
    CardManager::new(reader.clone(), delegate)
}

#[tokio::test]
async fn test_security_delay_is_reported() {
    let reader = MockReader::new();
    reader
        .respond(Ok(pause(200)))
        .respond(Ok(pause(100)))
        .respond_tlvs(&testing::card_tlvs("4.52r", 2));
    let delegate = ScriptedDelegate::shared();

    let card = manager(&reader, delegate.clone())
        .start_session(&mut ReadCommand::new(), None)
        .await
        .unwrap();
    assert_eq!(card.card_id, testing::CARD_ID);
    assert_eq!(reader.sent().len(), 3);
    assert_eq!(delegate.count(&DelegateEvent::SecurityDelay(2000, 0)), 1);
    assert_eq!(delegate.count(&DelegateEvent::SecurityDelay(1000, 0)), 1);
}

#[tokio::test]
async fn test_stalled_security_delay_fails() {
    let reader = MockReader::new();
    reader
        .respond(Ok(pause(100)))
        .respond(Ok(pause(100)))
        .respond(Ok(pause(100)));
    let manager = CardManager::new(reader.clone(), ScriptedDelegate::shared())
        .with_config(Config::default().with_security_delay_stall_limit(1));

    let error = manager
        .start_session(&mut ReadCommand::new(), None)
        .await
        .unwrap_err();
    assert!(matches!(error, Error::InvalidResponse(_)));
    assert_eq!(reader.pending(), 0);
}

#[tokio::test]
async fn test_access_code_prompt_retries_command() {
    let reader = MockReader::new();
    reader
        .respond_status(StatusWord::INVALID_ACCESS_CODE)
        .respond_tlvs(&testing::card_tlvs("4.52r", 2));
    let delegate = ScriptedDelegate::with_codes(["123456"]);

    manager(&reader, delegate.clone())
        .start_session(&mut ReadCommand::new(), None)
        .await
        .unwrap();
    assert_eq!(delegate.prompts(), [(UserCodeType::AccessCode, true)]);

    let sent = reader.sent();
    let pin = |index: usize| {
        TlvDecoder::from_bytes(sent[index].data())
            .unwrap()
            .decode::<Vec<u8>>(TlvTag::Pin)
            .unwrap()
    };
    assert_eq!(pin(0), crate::crypto::sha256(b"000000"));
    assert_eq!(pin(1), crate::crypto::sha256(b"123456"));
}

#[tokio::test]
async fn test_user_code_prompts_are_capped() {
    let reader = MockReader::new();
    for _ in 0..3 {
        reader.respond_status(StatusWord::INVALID_ACCESS_CODE);
    }
    let delegate = ScriptedDelegate::with_codes(["111111", "222222"]);
    let manager = CardManager::new(reader.clone(), delegate.clone())
        .with_config(Config::default().with_max_user_code_attempts(2));

    let error = manager
        .start_session(&mut ReadCommand::new(), None)
        .await
        .unwrap_err();
    assert_eq!(error, Error::AccessCodeRequired);
    assert_eq!(
        delegate.prompts(),
        [(UserCodeType::AccessCode, true), (UserCodeType::AccessCode, false)]
    );
}

#[tokio::test]
async fn test_declined_prompt_cancels_quietly() {
    let reader = MockReader::new();
    reader.respond_status(StatusWord::INVALID_ACCESS_CODE);
    let delegate = ScriptedDelegate::with_answers([None]);

    let error = manager(&reader, delegate.clone())
        .start_session(&mut ReadCommand::new(), None)
        .await
        .unwrap_err();
    assert_eq!(error, Error::UserCancelled);
    assert_eq!(delegate.count(&DelegateEvent::Stopped(None)), 1);
}

#[tokio::test]
async fn test_wrong_card_is_rejected() {
    let reader = MockReader::new();
    reader.respond_tlvs(&testing::card_tlvs("4.52r", 2));
    let delegate = ScriptedDelegate::shared();

    let error = manager(&reader, delegate.clone())
        .start_session(&mut crate::operations::ReadWalletsListCommand::new(), Some("AC01000000000001"))
        .await
        .unwrap_err();
    assert_eq!(error, Error::WrongCardNumber("AC01000000000001".into()));
    assert_eq!(delegate.count(&DelegateEvent::WrongCard(WrongCardKind::WrongCardId)), 1);
    assert_eq!(
        delegate.count(&DelegateEvent::Stopped(Some(error.code()))),
        1
    );
    // nothing beyond the card read went out
    assert_eq!(reader.sent().len(), 1);
}

#[tokio::test]
async fn test_session_finishes_once() {
    let reader = MockReader::new();
    reader.respond_tlvs(&testing::card_tlvs("4.52r", 2));
    let delegate = ScriptedDelegate::shared();

    manager(&reader, delegate.clone())
        .start_session(&mut ReadCommand::new(), None)
        .await
        .unwrap();
    assert_eq!(
        delegate.events(),
        [
            DelegateEvent::SessionStarted,
            DelegateEvent::TagConnected,
            DelegateEvent::Stopped(None),
            DelegateEvent::Dismissed,
        ]
    );
    assert_eq!((reader.acquired(), reader.released()), (1, 1));
}

#[tokio::test]
async fn test_second_session_is_busy() {
    let reader = MockReader::new();
    reader.hold_tag(true);
    let manager = Arc::new(manager(&reader, ScriptedDelegate::shared()));

    let first = tokio::spawn({
        let manager = Arc::clone(&manager);
        async move { manager.start_session(&mut ReadCommand::new(), None).await }
    });
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }

    let error = manager
        .start_session(&mut ReadCommand::new(), None)
        .await
        .unwrap_err();
    assert_eq!(error, Error::Busy);

    manager.cancel();
    assert_eq!(first.await.unwrap().unwrap_err(), Error::UserCancelled);
    assert_eq!((reader.acquired(), reader.released()), (1, 1));
}

#[tokio::test]
async fn test_tag_loss_resends_frame() {
    let reader = MockReader::new();
    reader
        .respond(Err(Error::TagLost))
        .respond_tlvs(&testing::card_tlvs("4.52r", 2));
    let delegate = ScriptedDelegate::shared();

    manager(&reader, delegate.clone())
        .start_session(&mut ReadCommand::new(), None)
        .await
        .unwrap();
    assert_eq!(reader.sent().len(), 2);
    assert_eq!(reader.sent()[0], reader.sent()[1]);
    assert_eq!(delegate.count(&DelegateEvent::TagLost), 1);
    assert_eq!(delegate.count(&DelegateEvent::TagConnected), 2);
}

#[tokio::test(start_paused = true)]
async fn test_tag_must_return_in_time() {
    let reader = MockReader::new();
    let held = reader.clone();
    reader.respond_with(move |_| {
        held.hold_tag(true);
        Err(Error::TagLost)
    });
    let manager = CardManager::new(reader.clone(), ScriptedDelegate::shared())
        .with_config(Config::default().with_tag_reconnect_timeout(Duration::from_secs(5)));

    let error = manager
        .start_session(&mut ReadCommand::new(), None)
        .await
        .unwrap_err();
    assert_eq!(error, Error::TagLost);
    assert_eq!(reader.sent().len(), 1);
}

fn assert_send<T: Send>(_: &T) {}

#[test]
fn test_session_future_is_send() {
    let manager = manager(&MockReader::new(), ScriptedDelegate::shared());
    let mut command = ReadCommand::new();
    let session = manager.start_session(&mut command, None);
    assert_send(&session);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_session_releases_reader() {
    let reader = MockReader::new();
    reader.hold_tag(true);
    let manager = manager(&reader, ScriptedDelegate::shared());

    let abandoned = tokio::time::timeout(
        Duration::from_millis(50),
        manager.start_session(&mut ReadCommand::new(), None),
    )
    .await;
    assert!(abandoned.is_err());
    assert_eq!((reader.acquired(), reader.released()), (1, 1));

    reader.hold_tag(false);
    reader.respond_tlvs(&testing::card_tlvs("4.52r", 2));
    let card = manager
        .start_session(&mut ReadCommand::new(), None)
        .await
        .unwrap();
    assert_eq!(card.card_id, testing::CARD_ID);
    assert_eq!((reader.acquired(), reader.released()), (2, 2));
}

const UID: [u8; 12] = [0x0B; 12];
const FAST_KEY_B: [u8; 16] = [0x22; 16];

type SharedKey = Arc<Mutex<Option<SessionKey>>>;

/// Card side of a fast handshake, keeping the derived key
fn open_fast_session(key: &SharedKey) -> impl FnOnce(&CommandApdu) -> Result<ResponseApdu> + use<> {
    let key = Arc::clone(key);
    move |apdu| {
        assert_eq!(apdu.p1(), EncryptionMode::Fast.code());
        let key_a: Vec<u8> = TlvDecoder::from_bytes(apdu.data())
            .unwrap()
            .decode(TlvTag::SessionKeyA)
            .unwrap();
        let secret = [key_a, FAST_KEY_B.to_vec()].concat();
        *key.lock() = Some(SessionKey::derive(&secret, &crypto::sha256(b"000000"), &UID));
        Ok(ResponseApdu::success(&[
            Tlv::new(TlvTag::SessionKeyB, FAST_KEY_B.to_vec()),
            Tlv::new(TlvTag::Uid, UID.to_vec()),
        ])
        .unwrap())
    }
}

/// Card side of an encrypted read
fn encrypted_card(key: &SharedKey) -> impl FnOnce(&CommandApdu) -> Result<ResponseApdu> + use<> {
    let key = Arc::clone(key);
    move |apdu| {
        let key = key.lock().clone().unwrap();
        assert_eq!(apdu.p1(), EncryptionMode::Fast.code());
        let request = encryption::open(&key, apdu.data()).unwrap();
        let pin: Vec<u8> = TlvDecoder::from_bytes(&request).unwrap().decode(TlvTag::Pin).unwrap();
        assert_eq!(pin, crypto::sha256(b"000000"));

        let card = Tlv::encode_all(&testing::card_tlvs("4.52r", 2)).unwrap();
        Ok(ResponseApdu::new(
            encryption::seal(&key, &card).unwrap(),
            StatusWord::PROCESS_COMPLETED,
        ))
    }
}

fn frames(reader: &MockReader) -> Vec<(u8, u8)> {
    reader.sent().iter().map(|apdu| (apdu.instruction(), apdu.p1())).collect()
}

#[tokio::test]
async fn test_card_demanding_encryption_gets_fast_session() {
    let reader = MockReader::new();
    let key = SharedKey::default();
    reader
        .respond_status(StatusWord::NEED_ENCRYPTION)
        .respond_with(open_fast_session(&key))
        .respond_with(encrypted_card(&key));

    let card = manager(&reader, ScriptedDelegate::shared())
        .start_session(&mut ReadCommand::new(), None)
        .await
        .unwrap();
    assert_eq!(card.card_id, testing::CARD_ID);
    assert_eq!(frames(&reader), [(0xF2, 0x00), (0xFF, 0x01), (0xF2, 0x01)]);
}

#[tokio::test]
async fn test_encryption_steps_up_until_strong() {
    let reader = MockReader::new();
    let card_key = testing::fixture_key(5);
    reader
        .respond_status(StatusWord::NEED_ENCRYPTION)
        .respond_tlvs(&[
            Tlv::new(TlvTag::SessionKeyB, FAST_KEY_B.to_vec()),
            Tlv::new(TlvTag::Uid, UID.to_vec()),
        ])
        .respond_status(StatusWord::NEED_ENCRYPTION)
        .respond_tlvs(&[
            Tlv::new(TlvTag::SessionKeyB, card_key.public_key().to_vec()),
            Tlv::new(TlvTag::Uid, UID.to_vec()),
        ])
        .respond_status(StatusWord::NEED_ENCRYPTION);

    let error = manager(&reader, ScriptedDelegate::shared())
        .start_session(&mut ReadCommand::new(), None)
        .await
        .unwrap_err();
    assert_eq!(error, Error::NeedEncryption);
    assert_eq!(
        frames(&reader),
        [(0xF2, 0x00), (0xFF, 0x01), (0xF2, 0x01), (0xFF, 0x02), (0xF2, 0x02)]
    );
    assert_eq!(reader.pending(), 0);
}

#[tokio::test]
async fn test_lost_tag_reopens_encrypted_session() {
    let reader = MockReader::new();
    let key = SharedKey::default();
    reader
        .respond_with(open_fast_session(&key))
        .respond(Err(Error::TagLost))
        .respond_with(open_fast_session(&key))
        .respond_with(encrypted_card(&key));
    let delegate = ScriptedDelegate::shared();
    let manager = CardManager::new(reader.clone(), delegate.clone())
        .with_config(Config::default().with_encryption_mode(EncryptionMode::Fast));

    let card = manager
        .start_session(&mut ReadCommand::new(), None)
        .await
        .unwrap();
    assert_eq!(card.card_id, testing::CARD_ID);
    assert_eq!(
        frames(&reader),
        [(0xFF, 0x01), (0xF2, 0x01), (0xFF, 0x01), (0xF2, 0x01)]
    );
    assert_eq!(delegate.count(&DelegateEvent::TagLost), 1);
}
