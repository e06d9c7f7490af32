//! State shared by the commands of one session

use crate::{
    config::{Config, EncryptionMode},
    crypto::{self, KeyPair, SessionKey},
    types::{Card, UserCode, UserCodeType},
};

/// Per session state read by command serializers
///
/// Owned by exactly one [`CardSession`](crate::CardSession). Only the read
/// family of commands replaces [`SessionEnvironment::card`].
#[derive(Debug, Clone)]
pub struct SessionEnvironment {
    /// Configuration of the card manager
    pub config: Config,
    /// Last card snapshot
    pub card: Option<Card>,
    /// Access code sent with every command
    pub access_code: UserCode,
    /// Passcode sent with protected commands
    pub passcode: UserCode,
    /// Linked terminal keys, when enabled
    pub terminal_keys: Option<KeyPair>,
    /// Card verification code
    pub cvc: Option<Vec<u8>>,
    /// Current encryption mode
    pub encryption_mode: EncryptionMode,
    /// Key of the encrypted session, once opened
    pub encryption_key: Option<SessionKey>,
}

impl SessionEnvironment {
    /// Environment with the configured default codes
    pub fn new(config: Config) -> Self {
        let access_code = UserCode::new(
            UserCodeType::AccessCode,
            config.default_code(UserCodeType::AccessCode),
        );
        let passcode = UserCode::new(
            UserCodeType::Passcode,
            config.default_code(UserCodeType::Passcode),
        );
        let encryption_mode = config.encryption_mode;
        Self {
            config,
            card: None,
            access_code,
            passcode,
            terminal_keys: None,
            cvc: None,
            encryption_mode,
            encryption_key: None,
        }
    }

    /// Code of the given kind
    pub const fn user_code(&self, kind: UserCodeType) -> &UserCode {
        match kind {
            UserCodeType::AccessCode => &self.access_code,
            UserCodeType::Passcode => &self.passcode,
        }
    }

    /// Replace the code of the given kind
    ///
    /// A new access code drops the session key derived from the old one.
    pub fn set_user_code(&mut self, code: UserCode) {
        match code.kind() {
            UserCodeType::AccessCode => {
                self.encryption_key = None;
                self.access_code = code;
            }
            UserCodeType::Passcode => self.passcode = code,
        }
    }

    /// Whether the code differs from the configured default
    pub fn is_user_code_set(&self, kind: UserCodeType) -> bool {
        let code = self.user_code(kind);
        code.is_set() && *code != UserCode::new(kind, self.config.default_code(kind))
    }

    /// Card id of the current snapshot
    pub fn card_id(&self) -> Option<&str> {
        self.card.as_ref().map(|c| c.card_id.as_str())
    }

    /// Access code digest
    pub fn access_code_hash(&self) -> Option<Vec<u8>> {
        self.access_code.value().map(|v| v.to_vec())
    }

    /// Access code digest fed into session key derivation
    ///
    /// Falls back to the factory code when no code is known yet.
    pub fn protocol_access_code(&self) -> [u8; 32] {
        match self.access_code.value() {
            Some(value) => *value,
            None => crypto::sha256(self.config.default_code(UserCodeType::AccessCode).as_bytes()),
        }
    }

    /// Passcode digest
    pub fn passcode_hash(&self) -> Option<Vec<u8>> {
        self.passcode.value().map(|v| v.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_not_set() {
        let mut env = SessionEnvironment::new(Config::default());
        assert!(!env.is_user_code_set(UserCodeType::AccessCode));
        assert!(!env.is_user_code_set(UserCodeType::Passcode));

        env.set_user_code(UserCode::new(UserCodeType::Passcode, "1234"));
        assert!(env.is_user_code_set(UserCodeType::Passcode));
        assert!(!env.is_user_code_set(UserCodeType::AccessCode));

        env.set_user_code(UserCode::unset(UserCodeType::AccessCode));
        assert!(!env.is_user_code_set(UserCodeType::AccessCode));
        assert_eq!(env.access_code_hash(), None);
    }

    #[test]
    fn test_new_access_code_drops_session_key() {
        let mut env = SessionEnvironment::new(Config::default());
        let factory = env.protocol_access_code();
        env.encryption_key = Some(SessionKey::derive(&[1; 32], &factory, &[2; 12]));

        env.set_user_code(UserCode::new(UserCodeType::Passcode, "1234"));
        assert!(env.encryption_key.is_some());

        env.set_user_code(UserCode::unset(UserCodeType::AccessCode));
        assert!(env.encryption_key.is_none());
        assert_eq!(env.protocol_access_code(), factory);
    }
}
