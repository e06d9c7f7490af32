use std::sync::Arc;

use tracing::{debug, warn};

use super::BackupSession;
use crate::{Result, storage::SecureStorage};

/// Keeps an unfinished backup in host storage
///
/// The session is stored as JSON once it holds something that cannot be
/// asked from the cards again: the link signature of the primary card or
/// exported wallet material.
#[derive(Debug, Clone)]
pub struct BackupRepository {
    storage: Arc<dyn SecureStorage>,
}

impl BackupRepository {
    const KEY: &'static str = "backup_session";

    /// Repository over `storage`
    pub fn new(storage: Arc<dyn SecureStorage>) -> Self {
        Self { storage }
    }

    /// Saved session, if any
    ///
    /// A session that no longer decodes is dropped.
    pub fn load(&self) -> Result<Option<BackupSession>> {
        let Some(bytes) = self.storage.get(Self::KEY)? else {
            return Ok(None);
        };
        match serde_json::from_slice(&bytes) {
            Ok(session) => Ok(Some(session)),
            Err(error) => {
                warn!(%error, "Discarding unreadable backup session");
                self.clear()?;
                Ok(None)
            }
        }
    }

    /// Save `session` when it holds card material
    pub fn save(&self, session: &BackupSession) -> Result<()> {
        let worth_saving = session.attest_signature.is_some()
            || session.slaves.values().any(|s| !s.data.is_empty());
        if !worth_saving {
            return Ok(());
        }
        debug!("Saving backup session");
        self.storage.store(Self::KEY, &serde_json::to_vec(session)?)
    }

    /// Forget the saved session
    pub fn clear(&self) -> Result<()> {
        self.storage.delete(Self::KEY)
    }
}
