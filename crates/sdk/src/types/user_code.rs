use std::fmt;

use derive_more::Display;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Factory access code
pub const DEFAULT_ACCESS_CODE: &str = "000000";
/// Factory passcode
pub const DEFAULT_PASSCODE: &str = "000";

/// Which user code is meant
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserCodeType {
    /// Access code, protects every command
    #[display("access code")]
    AccessCode,
    /// Passcode, protects signing and file writes
    #[display("passcode")]
    Passcode,
}

impl UserCodeType {
    /// Factory default value
    pub const fn default_value(self) -> &'static str {
        match self {
            Self::AccessCode => DEFAULT_ACCESS_CODE,
            Self::Passcode => DEFAULT_PASSCODE,
        }
    }

    pub(crate) const fn storage_name(self) -> &'static str {
        match self {
            Self::AccessCode => "access_code",
            Self::Passcode => "passcode",
        }
    }
}

/// A user code as sent to the card
///
/// Only the SHA-256 digest of the code is kept. The digest is wiped when the
/// value is dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct UserCode {
    #[zeroize(skip)]
    kind: UserCodeType,
    value: Option<[u8; 32]>,
}

impl UserCode {
    /// Hash a code entered by the user
    pub fn new(kind: UserCodeType, code: &str) -> Self {
        Self::from_hash(kind, Sha256::digest(code.as_bytes()).into())
    }

    /// Code that was already hashed
    pub const fn from_hash(kind: UserCodeType, hash: [u8; 32]) -> Self {
        Self {
            kind,
            value: Some(hash),
        }
    }

    /// Factory default code
    pub fn default_for(kind: UserCodeType) -> Self {
        Self::new(kind, kind.default_value())
    }

    /// Code that is not known yet
    pub const fn unset(kind: UserCodeType) -> Self {
        Self { kind, value: None }
    }

    /// Kind of the code
    pub const fn kind(&self) -> UserCodeType {
        self.kind
    }

    /// Digest sent to the card, when known
    pub const fn value(&self) -> Option<&[u8; 32]> {
        self.value.as_ref()
    }

    /// Whether the digest is known
    pub const fn is_set(&self) -> bool {
        self.value.is_some()
    }

    /// Whether this is the factory default code
    pub fn is_default(&self) -> bool {
        self.value.is_some() && *self == Self::default_for(self.kind)
    }
}

impl fmt::Debug for UserCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserCode")
            .field("kind", &self.kind)
            .field("value", &self.value.map(|_| "******"))
            .finish()
    }
}
