use std::{fmt, sync::Arc};

use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use super::{CancelHandle, CardSession, PreflightReadFilter};
use crate::{
    Error, Result,
    command::CardSessionRunnable,
    config::Config,
    delegate::SessionViewDelegate,
    environment::SessionEnvironment,
    reader::CardReader,
    storage::{InMemoryStorage, SecureStorage, TerminalKeysService, UserCodeRepository},
};

/// Forgets the cancel handle of a session when its future ends or is dropped
struct CurrentSession<'a>(&'a Mutex<Option<CancelHandle>>);

impl Drop for CurrentSession<'_> {
    fn drop(&mut self) {
        self.0.lock().take();
    }
}

/// Entry point for running operations on cards
///
/// Holds the shared reader. Only one session can use it at a time; starting
/// a second one while the first is running fails with [`Error::Busy`].
pub struct CardManager {
    reader: Arc<tokio::sync::Mutex<Box<dyn CardReader>>>,
    delegate: Arc<dyn SessionViewDelegate>,
    storage: Arc<dyn SecureStorage>,
    config: Config,
    current: Mutex<Option<CancelHandle>>,
}

impl fmt::Debug for CardManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardManager")
            .field("config", &self.config)
            .field("storage", &self.storage)
            .finish_non_exhaustive()
    }
}

impl CardManager {
    /// Manager over a reader, keeping state in memory
    pub fn new(reader: impl CardReader + 'static, delegate: Arc<dyn SessionViewDelegate>) -> Self {
        Self {
            reader: Arc::new(tokio::sync::Mutex::new(Box::new(reader) as Box<dyn CardReader>)),
            delegate,
            storage: Arc::new(InMemoryStorage::new()),
            config: Config::default(),
            current: Mutex::new(None),
        }
    }

    /// Use a custom configuration
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Use host storage for user codes, terminal keys and backups
    pub fn with_storage(mut self, storage: Arc<dyn SecureStorage>) -> Self {
        self.storage = storage;
        self
    }

    /// Configuration
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Mutable configuration, applied to the next session
    pub const fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// Host storage
    pub fn storage(&self) -> Arc<dyn SecureStorage> {
        Arc::clone(&self.storage)
    }

    /// Cancel the running session, if any
    pub fn cancel(&self) {
        if let Some(handle) = self.current.lock().as_ref() {
            info!("Cancelling session");
            handle.cancel();
        }
    }

    /// Run an operation in a new session
    ///
    /// When `card_id` is given, any other card is rejected with
    /// [`Error::WrongCardNumber`] before the operation starts.
    pub async fn start_session<R>(&self, runnable: &mut R, card_id: Option<&str>) -> Result<R::Output>
    where
        R: CardSessionRunnable,
    {
        self.start_session_with_filters(runnable, card_id, Vec::new())
            .await
    }

    /// Run an operation with additional preflight read filters
    #[instrument(level = "debug", skip(self, runnable, filters))]
    pub async fn start_session_with_filters<R>(
        &self,
        runnable: &mut R,
        card_id: Option<&str>,
        filters: Vec<Box<dyn PreflightReadFilter>>,
    ) -> Result<R::Output>
    where
        R: CardSessionRunnable,
    {
        let guard = Arc::clone(&self.reader).try_lock_owned().map_err(|_| {
            warn!("Reader is used by another session");
            Error::Busy
        })?;
        let environment = self.environment()?;

        let cancel = CancelHandle::new();
        *self.current.lock() = Some(cancel.clone());
        let _current = CurrentSession(&self.current);
        let user_codes = self
            .config
            .save_user_codes
            .then(|| UserCodeRepository::new(Arc::clone(&self.storage)));

        let mut session = CardSession::new(guard, Arc::clone(&self.delegate), environment, cancel)
            .with_expected_card(card_id.map(str::to_owned))
            .with_filters(filters)
            .with_user_codes(user_codes);

        debug!("Session started");
        let result = session.run(runnable).await;
        session.finish(result.as_ref().err()).await;
        result
    }

    fn environment(&self) -> Result<SessionEnvironment> {
        let mut environment = SessionEnvironment::new(self.config.clone());
        if self.config.linked_terminal {
            environment.terminal_keys =
                Some(TerminalKeysService::new(Arc::clone(&self.storage)).get_or_create()?);
        }
        Ok(environment)
    }
}
