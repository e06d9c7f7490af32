//! Payload encryption of an open session
//!
//! Before encryption a payload is framed as `len (2, BE) || crc16 (2) || data`.
//! The instruction stays readable and `P1` names the mode. Frames shorter than
//! one cipher block, such as bare status words, are never encrypted.

use tangem_core::{CommandApdu, ResponseApdu};

use crate::{
    Error, Result,
    config::EncryptionMode,
    crypto::{self, SessionKey},
};

const BLOCK_LEN: usize = 16;
const HEADER_LEN: usize = 4;

/// Frame and encrypt a payload
pub(crate) fn seal(key: &SessionKey, data: &[u8]) -> Result<Vec<u8>> {
    let len = u16::try_from(data.len())
        .map_err(|_| Error::SerializeCommandError("payload too long to encrypt".into()))?;
    let mut framed = Vec::with_capacity(HEADER_LEN + data.len());
    framed.extend_from_slice(&len.to_be_bytes());
    framed.extend_from_slice(&crypto::crc16(data));
    framed.extend_from_slice(data);
    key.encrypt(&framed)
}

/// Decrypt a payload and check its frame
pub(crate) fn open(key: &SessionKey, data: &[u8]) -> Result<Vec<u8>> {
    let framed = key.decrypt(data)?;
    if framed.len() < HEADER_LEN {
        return Err(Error::InvalidResponse("encrypted frame too short".into()));
    }
    let len = usize::from(u16::from_be_bytes([framed[0], framed[1]]));
    if len > framed.len() - HEADER_LEN {
        return Err(Error::InvalidResponse(format!(
            "encrypted frame claims {len} bytes, holds {}",
            framed.len() - HEADER_LEN
        )));
    }
    let payload = &framed[HEADER_LEN..HEADER_LEN + len];
    if crypto::crc16(payload) != framed[2..HEADER_LEN] {
        return Err(Error::InvalidResponse("encrypted frame checksum mismatch".into()));
    }
    Ok(payload.to_vec())
}

/// Encrypt the payload of a plain command
///
/// Frames that already carry a `P1` (the session handshake) are sent as is.
pub(crate) fn encrypt_command(
    apdu: &CommandApdu,
    mode: EncryptionMode,
    key: Option<&SessionKey>,
) -> Result<CommandApdu> {
    match key {
        Some(key) if apdu.p1() == 0 => Ok(CommandApdu::new(apdu.ins(), seal(key, apdu.data())?)
            .with_p1(mode.code())
            .with_le(apdu.le())),
        _ => Ok(apdu.clone()),
    }
}

/// Decrypt a response payload, keeping its status word
pub(crate) fn decrypt_response(
    response: ResponseApdu,
    key: Option<&SessionKey>,
) -> Result<ResponseApdu> {
    match key {
        Some(key) if response.data().len() >= BLOCK_LEN => Ok(ResponseApdu::new(
            open(key, response.data())?,
            response.status_word(),
        )),
        _ => Ok(response),
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;
    use tangem_core::{Instruction, StatusWord};

    use super::*;

    fn key() -> SessionKey {
        SessionKey::derive(&[0x42; 32], &crypto::sha256(b"000000"), &[0x0B; 12])
    }

    #[test]
    fn test_command_is_framed_and_encrypted() {
        let key = key();
        let plain = CommandApdu::new(Instruction::Read, hex!("0108CB79000000018201").to_vec());
        let encrypted = encrypt_command(&plain, EncryptionMode::Fast, Some(&key)).unwrap();

        assert_eq!(encrypted.ins(), Instruction::Read);
        assert_eq!(encrypted.p1(), 0x01);
        assert_eq!(encrypted.data().len(), 16);

        let framed = key.decrypt(encrypted.data()).unwrap();
        assert_eq!(&framed[..2], &[0x00, 0x0A]);
        assert_eq!(framed[2..4], crypto::crc16(plain.data()));
        assert_eq!(open(&key, encrypted.data()).unwrap(), plain.data().as_ref());
    }

    #[test]
    fn test_plain_frames_pass_through() {
        let key = key();
        let handshake = CommandApdu::new(Instruction::OpenSession, vec![0x1A, 0x01, 0x00]).with_p1(2);
        assert_eq!(
            encrypt_command(&handshake, EncryptionMode::Fast, Some(&key)).unwrap(),
            handshake
        );

        let plain = CommandApdu::new(Instruction::Read, vec![0x01]);
        assert_eq!(encrypt_command(&plain, EncryptionMode::None, None).unwrap(), plain);

        let status = ResponseApdu::new(Vec::new(), StatusWord::NEED_ENCRYPTION);
        assert_eq!(decrypt_response(status.clone(), Some(&key)).unwrap(), status);
    }

    #[test]
    fn test_response_keeps_status_word() {
        let key = key();
        let sealed = seal(&key, &hex!("0108CB79000000018201")).unwrap();
        let response = ResponseApdu::new(sealed, StatusWord::PROCESS_COMPLETED);

        let decrypted = decrypt_response(response, Some(&key)).unwrap();
        assert_eq!(decrypted.data().as_ref(), &hex!("0108CB79000000018201"));
        assert!(decrypted.status_word().is_success());
    }

    #[test]
    fn test_corrupted_frames_are_rejected() {
        let key = key();

        let mut framed = vec![0x00, 0x03];
        framed.extend_from_slice(&crypto::crc16(b"abd"));
        framed.extend_from_slice(b"abc");
        let bad_crc = key.encrypt(&framed).unwrap();
        assert!(matches!(open(&key, &bad_crc), Err(Error::InvalidResponse(_))));

        let mut framed = vec![0x00, 0x20];
        framed.extend_from_slice(&crypto::crc16(b"abc"));
        framed.extend_from_slice(b"abc");
        let bad_len = key.encrypt(&framed).unwrap();
        assert!(matches!(open(&key, &bad_len), Err(Error::InvalidResponse(_))));

        let other = SessionKey::derive(&[0x43; 32], &crypto::sha256(b"000000"), &[0x0B; 12]);
        assert!(open(&other, &seal(&key, b"abc").unwrap()).is_err());
    }
}
