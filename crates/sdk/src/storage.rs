//! Host storage for user codes, terminal keys and interrupted backups

use std::{collections::HashMap, fmt, sync::Arc};

use parking_lot::Mutex;
use tracing::debug;

use crate::{
    Result,
    crypto::KeyPair,
    types::{UserCode, UserCodeType},
};

/// Key value store provided by the host
///
/// Implementations are expected to keep values encrypted at rest.
pub trait SecureStorage: Send + Sync + fmt::Debug {
    /// Value stored under `key`
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any previous value
    fn store(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Remove `key`
    fn delete(&self, key: &str) -> Result<()>;
}

/// Storage that lives as long as the process
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    values: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryStorage {
    /// Empty storage
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecureStorage for InMemoryStorage {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn store(&self, key: &str, value: &[u8]) -> Result<()> {
        self.values.lock().insert(key.to_owned(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.values.lock().remove(key);
        Ok(())
    }
}

/// Remembers user code hashes per card
#[derive(Debug, Clone)]
pub struct UserCodeRepository {
    storage: Arc<dyn SecureStorage>,
}

impl UserCodeRepository {
    /// Repository over `storage`
    pub fn new(storage: Arc<dyn SecureStorage>) -> Self {
        Self { storage }
    }

    fn key(kind: UserCodeType, card_id: &str) -> String {
        format!("user_code.{}.{}", kind.storage_name(), card_id.to_uppercase())
    }

    /// Saved code for a card
    pub fn get(&self, kind: UserCodeType, card_id: &str) -> Result<Option<UserCode>> {
        let Some(bytes) = self.storage.get(&Self::key(kind, card_id))? else {
            return Ok(None);
        };
        Ok(<[u8; 32]>::try_from(bytes.as_slice())
            .ok()
            .map(|hash| UserCode::from_hash(kind, hash)))
    }

    /// Save a code for a card
    pub fn save(&self, code: &UserCode, card_id: &str) -> Result<()> {
        match code.value() {
            Some(hash) => {
                debug!(kind = %code.kind(), "Saving user code");
                self.storage.store(&Self::key(code.kind(), card_id), hash)
            }
            None => Ok(()),
        }
    }

    /// Forget the code of a card
    pub fn delete(&self, kind: UserCodeType, card_id: &str) -> Result<()> {
        self.storage.delete(&Self::key(kind, card_id))
    }
}

/// Keys that identify this terminal to cards with the linked terminal setting
#[derive(Debug, Clone)]
pub struct TerminalKeysService {
    storage: Arc<dyn SecureStorage>,
}

impl TerminalKeysService {
    const KEY: &'static str = "terminal_keys";

    /// Service over `storage`
    pub fn new(storage: Arc<dyn SecureStorage>) -> Self {
        Self { storage }
    }

    /// Stored key pair, generated and stored on first use
    pub fn get_or_create(&self) -> Result<KeyPair> {
        if let Some(bytes) = self.storage.get(Self::KEY)? {
            if let Ok(keys) = KeyPair::from_private_key(&bytes) {
                return Ok(keys);
            }
            debug!("Stored terminal key is invalid, generating a new one");
        }

        let keys = KeyPair::generate();
        self.storage.store(Self::KEY, keys.private_key_bytes())?;
        Ok(keys)
    }
}
