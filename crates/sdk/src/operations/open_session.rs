use serde::{Deserialize, Serialize};
use tangem_core::{CommandApdu, Instruction, ResponseApdu, TlvBuilder, TlvTag};
use zeroize::Zeroize;

use crate::{
    Error, Result,
    command::{Command, PreflightReadMode, response_decoder},
    config::EncryptionMode,
    crypto::{self, KeyPair, SessionKey},
    environment::SessionEnvironment,
};

const FAST_KEY_LEN: usize = 16;

/// Card half of the session key exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenSessionResponse {
    /// Random half (fast mode) or ephemeral public key (strong mode)
    pub session_key_b: Vec<u8>,
    /// Card uid, salts the access code
    pub uid: Vec<u8>,
}

/// Opens an encrypted session in the given mode
///
/// Sent in the clear with `P1` set to the mode. The session engine runs it
/// on its own when the card asks for encryption.
#[derive(Debug, Clone)]
pub struct OpenSessionCommand {
    mode: EncryptionMode,
    session_key_a: Vec<u8>,
    ephemeral: Option<KeyPair>,
}

impl OpenSessionCommand {
    /// Fresh key material for `mode`
    pub fn new(mode: EncryptionMode) -> Result<Self> {
        match mode {
            EncryptionMode::None => Err(Error::CryptoUtilsError(
                "no session to open without encryption".into(),
            )),
            EncryptionMode::Fast => Ok(Self {
                mode,
                session_key_a: crypto::random_bytes(FAST_KEY_LEN),
                ephemeral: None,
            }),
            EncryptionMode::Strong => {
                let ephemeral = KeyPair::generate();
                Ok(Self {
                    mode,
                    session_key_a: ephemeral.public_key().to_vec(),
                    ephemeral: Some(ephemeral),
                })
            }
        }
    }

    /// Mode requested from the card
    pub const fn mode(&self) -> EncryptionMode {
        self.mode
    }

    /// Derive the session key from the card's answer
    pub fn session_key(
        &self,
        response: &OpenSessionResponse,
        access_code_hash: &[u8],
    ) -> Result<SessionKey> {
        let mut secret = match &self.ephemeral {
            Some(keys) => crypto::ecdh(keys.private_key_bytes(), &response.session_key_b)?.to_vec(),
            None => [self.session_key_a.as_slice(), &response.session_key_b].concat(),
        };
        let key = SessionKey::derive(&secret, access_code_hash, &response.uid);
        secret.zeroize();
        Ok(key)
    }
}

impl Command for OpenSessionCommand {
    type Response = OpenSessionResponse;

    fn preflight_read_mode(&self) -> PreflightReadMode {
        PreflightReadMode::None
    }

    fn serialize(&self, _environment: &SessionEnvironment) -> Result<CommandApdu> {
        let mut builder = TlvBuilder::new();
        builder.append_bytes(TlvTag::SessionKeyA, &self.session_key_a)?;
        Ok(CommandApdu::new(Instruction::OpenSession, builder.build()).with_p1(self.mode.code()))
    }

    fn deserialize(
        &self,
        _environment: &SessionEnvironment,
        response: &ResponseApdu,
    ) -> Result<OpenSessionResponse> {
        let decoder = response_decoder(response)?;
        Ok(OpenSessionResponse {
            session_key_b: decoder.decode(TlvTag::SessionKeyB)?,
            uid: decoder.decode(TlvTag::Uid)?,
        })
    }
}
