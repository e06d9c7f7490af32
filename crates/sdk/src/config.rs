//! SDK configuration

use std::time::Duration;

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::types::{CardIdDisplayFormat, DEFAULT_ACCESS_CODE, DEFAULT_PASSCODE, UserCodeType};

/// When user codes are asked for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserCodeRequestPolicy {
    /// Only when the card asks for a code
    #[default]
    Default,
    /// Before the first command of every session
    Always(UserCodeType),
}

/// How cards are attested during a scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttestationMode {
    /// Card key challenge only
    #[default]
    Offline,
    /// Card key challenge plus the online attestation service
    Online,
}

/// Encryption of command and response payloads
///
/// Sessions start with the configured mode and step up one level every time
/// the card answers that it needs encryption.
#[derive(Debug, Display, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EncryptionMode {
    /// Plain frames
    #[default]
    None,
    /// Session key from random halves exchanged in the clear
    Fast,
    /// Session key from an ECDH exchange
    Strong,
}

impl EncryptionMode {
    /// Value carried in `P1` of encrypted frames
    pub const fn code(self) -> u8 {
        match self {
            Self::None => 0x00,
            Self::Fast => 0x01,
            Self::Strong => 0x02,
        }
    }

    /// Next stronger mode
    pub const fn step_up(self) -> Option<Self> {
        match self {
            Self::None => Some(Self::Fast),
            Self::Fast => Some(Self::Strong),
            Self::Strong => None,
        }
    }
}

/// Configuration shared by every session of a card manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Run command pre-checks and remap card errors
    pub handle_errors: bool,
    /// Maximum user code prompts per command
    pub max_user_code_attempts: u8,
    /// How long to wait for the tag to come back after it was lost
    pub tag_reconnect_timeout: Duration,
    /// Security delay reports that may fail to count down in a row
    pub security_delay_stall_limit: u32,
    /// How card ids are shown
    pub card_id_display_format: CardIdDisplayFormat,
    /// When user codes are asked for
    pub user_code_request_policy: UserCodeRequestPolicy,
    /// Send the terminal public key with reads
    pub linked_terminal: bool,
    /// Remember entered access codes per card
    pub save_user_codes: bool,
    /// Attestation performed by scans
    pub attestation_mode: AttestationMode,
    /// Encryption mode sessions start with
    pub encryption_mode: EncryptionMode,
    /// Maximum number of backup cards
    pub max_backup_cards: usize,
    /// Factory access code
    pub default_access_code: String,
    /// Factory passcode
    pub default_passcode: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            handle_errors: true,
            max_user_code_attempts: 3,
            tag_reconnect_timeout: Duration::from_secs(30),
            security_delay_stall_limit: 3,
            card_id_display_format: CardIdDisplayFormat::Full,
            user_code_request_policy: UserCodeRequestPolicy::Default,
            linked_terminal: false,
            save_user_codes: false,
            attestation_mode: AttestationMode::Offline,
            encryption_mode: EncryptionMode::None,
            max_backup_cards: 2,
            default_access_code: DEFAULT_ACCESS_CODE.to_owned(),
            default_passcode: DEFAULT_PASSCODE.to_owned(),
        }
    }
}

impl Config {
    /// Enable or disable pre-checks and error remapping
    pub const fn with_handle_errors(mut self, handle_errors: bool) -> Self {
        self.handle_errors = handle_errors;
        self
    }

    /// Set the user code prompt cap
    pub const fn with_max_user_code_attempts(mut self, attempts: u8) -> Self {
        self.max_user_code_attempts = attempts;
        self
    }

    /// Set the tag reconnect timeout
    pub const fn with_tag_reconnect_timeout(mut self, timeout: Duration) -> Self {
        self.tag_reconnect_timeout = timeout;
        self
    }

    /// Set how many stalled security delay reports are tolerated
    pub const fn with_security_delay_stall_limit(mut self, limit: u32) -> Self {
        self.security_delay_stall_limit = limit;
        self
    }

    /// Set the card id display format
    pub fn with_card_id_display_format(mut self, format: CardIdDisplayFormat) -> Self {
        self.card_id_display_format = format;
        self
    }

    /// Set the user code request policy
    pub const fn with_user_code_request_policy(mut self, policy: UserCodeRequestPolicy) -> Self {
        self.user_code_request_policy = policy;
        self
    }

    /// Enable or disable the linked terminal
    pub const fn with_linked_terminal(mut self, linked: bool) -> Self {
        self.linked_terminal = linked;
        self
    }

    /// Enable or disable saving user codes
    pub const fn with_save_user_codes(mut self, save: bool) -> Self {
        self.save_user_codes = save;
        self
    }

    /// Set the attestation mode
    pub const fn with_attestation_mode(mut self, mode: AttestationMode) -> Self {
        self.attestation_mode = mode;
        self
    }

    /// Set the encryption mode sessions start with
    pub const fn with_encryption_mode(mut self, mode: EncryptionMode) -> Self {
        self.encryption_mode = mode;
        self
    }

    /// Set the maximum number of backup cards
    pub const fn with_max_backup_cards(mut self, count: usize) -> Self {
        self.max_backup_cards = count;
        self
    }

    /// Factory value of a user code
    pub fn default_code(&self, kind: UserCodeType) -> &str {
        match kind {
            UserCodeType::AccessCode => &self.default_access_code,
            UserCodeType::Passcode => &self.default_passcode,
        }
    }
}
