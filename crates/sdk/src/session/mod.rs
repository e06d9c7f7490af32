//! Card session engine
//!
//! A [`CardSession`] owns the reader for the duration of one operation. It
//! waits for the tag, reads the card, applies filters and then drives the
//! commands of the operation through [`CardSession::transceive`], which takes
//! care of security delays, user code prompts, tag loss and payload encryption.

mod cancel;
mod encryption;
mod filter;
mod manager;

use std::{fmt, sync::Arc};

use derive_more::Display;
use tangem_core::{CommandApdu, Instruction, ResponseApdu, TlvDecoder, TlvTag};
use tokio::sync::OwnedMutexGuard;
use tracing::{Level, debug, info, instrument, trace, warn};

pub use cancel::CancelHandle;
pub use filter::{CardIdFilter, FirmwareFilter, PreflightReadFilter};
pub use manager::CardManager;

use crate::{
    Error, Result,
    command::{CardSessionRunnable, Command, PreflightReadMode},
    config::{EncryptionMode, UserCodeRequestPolicy},
    delegate::{SessionViewDelegate, WrongCardKind},
    environment::SessionEnvironment,
    operations::{OpenSessionCommand, ReadCommand, ReadWalletsListCommand},
    reader::CardReader,
    storage::UserCodeRepository,
    types::{FirmwareVersion, UserCode, UserCodeType},
};

/// How a session ended
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionOutcome {
    /// The operation completed
    Success,
    /// The user cancelled
    Cancelled,
    /// The operation failed
    Error,
}

/// Life cycle of a session
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Created, not started
    Inactive,
    /// Waiting for the tag and reading the card
    Preparing,
    /// Exchanging commands
    Active,
    /// Tag lost, waiting for it to return
    Paused,
    /// Finished
    #[display("Stopped({_0})")]
    Stopped(SessionOutcome),
}

/// One exclusive session with a card
pub struct CardSession {
    reader: OwnedMutexGuard<Box<dyn CardReader>>,
    delegate: Arc<dyn SessionViewDelegate>,
    environment: SessionEnvironment,
    state: SessionState,
    cancel: CancelHandle,
    expected_card_id: Option<String>,
    filters: Vec<Box<dyn PreflightReadFilter>>,
    user_codes: Option<UserCodeRepository>,
    released: bool,
}

impl fmt::Debug for CardSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardSession")
            .field("state", &self.state)
            .field("card_id", &self.environment.card_id())
            .finish_non_exhaustive()
    }
}

impl Drop for CardSession {
    fn drop(&mut self) {
        if !self.released {
            debug!(state = %self.state, "Session dropped before finishing");
            self.release_reader();
        }
    }
}

impl CardSession {
    pub(crate) fn new(
        reader: OwnedMutexGuard<Box<dyn CardReader>>,
        delegate: Arc<dyn SessionViewDelegate>,
        environment: SessionEnvironment,
        cancel: CancelHandle,
    ) -> Self {
        Self {
            reader,
            delegate,
            environment,
            state: SessionState::Inactive,
            cancel,
            expected_card_id: None,
            filters: Vec::new(),
            user_codes: None,
            released: false,
        }
    }

    pub(crate) fn with_expected_card(mut self, card_id: Option<String>) -> Self {
        if let Some(card_id) = &card_id {
            self.filters.push(Box::new(CardIdFilter::new(card_id.clone())));
        }
        self.expected_card_id = card_id;
        self
    }

    pub(crate) fn with_filters(mut self, filters: Vec<Box<dyn PreflightReadFilter>>) -> Self {
        self.filters.extend(filters);
        self
    }

    pub(crate) fn with_user_codes(mut self, repository: Option<UserCodeRepository>) -> Self {
        self.user_codes = repository;
        self
    }

    /// Current state
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Session environment
    pub const fn environment(&self) -> &SessionEnvironment {
        &self.environment
    }

    /// Mutable session environment
    pub const fn environment_mut(&mut self) -> &mut SessionEnvironment {
        &mut self.environment
    }

    /// Handle that cancels this session
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// View delegate of the session
    pub fn delegate(&self) -> &Arc<dyn SessionViewDelegate> {
        &self.delegate
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "Session state changed");
            self.state = state;
        }
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(Error::UserCancelled)
        } else {
            Ok(())
        }
    }

    /// Run an operation from the first tag wait to its result
    pub(crate) async fn run<R>(&mut self, runnable: &mut R) -> Result<R::Output>
    where
        R: CardSessionRunnable + ?Sized,
    {
        self.set_state(SessionState::Preparing);
        self.reader.acquire().await?;
        self.delegate.on_session_started().await;

        self.apply_user_code_policy().await?;
        self.wait_for_tag().await?;
        self.delegate.on_tag_connected().await;
        self.set_state(SessionState::Active);

        self.preflight_read(runnable.preflight_read_mode()).await?;
        let output = runnable.execute(self).await?;
        self.save_user_codes();
        Ok(output)
    }

    /// Release the reader and report the outcome
    pub(crate) async fn finish(&mut self, error: Option<&Error>) {
        let outcome = match error {
            None => SessionOutcome::Success,
            Some(e) if e.is_user_cancelled() => SessionOutcome::Cancelled,
            Some(_) => SessionOutcome::Error,
        };
        self.set_state(SessionState::Stopped(outcome));
        self.release_reader();

        let reported = error.filter(|e| !e.is_user_cancelled());
        self.delegate.on_session_stopped(reported).await;
        self.delegate.dismiss().await;
        info!(%outcome, "Session finished");
    }

    fn release_reader(&mut self) {
        if !self.released {
            self.released = true;
            self.reader.release();
        }
    }

    async fn apply_user_code_policy(&mut self) -> Result<()> {
        if let Some(card_id) = self.expected_card_id.clone() {
            self.load_saved_codes(&card_id);
        }
        match self.environment.config.user_code_request_policy {
            UserCodeRequestPolicy::Default => Ok(()),
            UserCodeRequestPolicy::Always(kind) => {
                debug!(%kind, "Requesting user code before the first command");
                let mut prompts = 0;
                self.request_user_code(kind, &mut prompts).await
            }
        }
    }

    async fn wait_for_tag(&mut self) -> Result<()> {
        let cancel = self.cancel.clone();
        tokio::select! {
            _ = cancel.cancelled() => Err(Error::UserCancelled),
            result = self.reader.wait_for_tag() => result,
        }
    }

    async fn wait_for_tag_return(&mut self) -> Result<()> {
        let timeout = self.environment.config.tag_reconnect_timeout;
        let cancel = self.cancel.clone();
        tokio::select! {
            _ = cancel.cancelled() => Err(Error::UserCancelled),
            result = tokio::time::timeout(timeout, self.reader.wait_for_tag()) => {
                result.map_err(|_| {
                    warn!(?timeout, "Tag did not return in time");
                    Error::TagLost
                })?
            }
        }
    }

    /// Read the card and apply the filters
    #[instrument(level = "trace", skip(self))]
    pub(crate) async fn preflight_read(&mut self, mode: PreflightReadMode) -> Result<()> {
        if mode == PreflightReadMode::None {
            return Ok(());
        }

        let card = ReadCommand::new().run(self).await?;
        if let Err(error) = self.check_filters(|f, env| f.on_card_read(&card, env)) {
            self.report_wrong_card(&error).await;
            return Err(error);
        }
        self.load_saved_codes(&card.card_id);

        if mode == PreflightReadMode::FullCardRead
            && card.firmware_version >= FirmwareVersion::MULTI_WALLET_AVAILABLE
        {
            ReadWalletsListCommand::new().execute(self).await?;
            let card = self.environment.card.clone().ok_or(Error::MissingPreflightRead)?;
            if let Err(error) = self.check_filters(|f, env| f.on_full_card_read(&card, env)) {
                self.report_wrong_card(&error).await;
                return Err(error);
            }
        }
        Ok(())
    }

    fn check_filters<F>(&self, check: F) -> Result<()>
    where
        F: Fn(&dyn PreflightReadFilter, &SessionEnvironment) -> Result<()>,
    {
        self.filters
            .iter()
            .try_for_each(|filter| check(filter.as_ref(), &self.environment))
    }

    async fn report_wrong_card(&mut self, error: &Error) {
        let kind = match error.root() {
            Error::WrongCardNumber(_) => WrongCardKind::WrongCardId,
            Error::WrongCardType => WrongCardKind::WrongCardType,
            _ => return,
        };
        self.delegate.on_wrong_card(kind).await;
    }

    fn load_saved_codes(&mut self, card_id: &str) {
        let Some(repository) = &self.user_codes else {
            return;
        };
        for kind in [UserCodeType::AccessCode, UserCodeType::Passcode] {
            if self.environment.is_user_code_set(kind) {
                continue;
            }
            match repository.get(kind, card_id) {
                Ok(Some(code)) => {
                    debug!(%kind, "Using saved user code");
                    self.environment.set_user_code(code);
                }
                Ok(None) => {}
                Err(error) => warn!(%error, "Failed to load saved user code"),
            }
        }
    }

    fn save_user_codes(&self) {
        let (Some(repository), Some(card)) = (&self.user_codes, &self.environment.card) else {
            return;
        };
        for kind in [UserCodeType::AccessCode, UserCodeType::Passcode] {
            if !self.environment.is_user_code_set(kind) {
                continue;
            }
            if let Err(error) = repository.save(self.environment.user_code(kind), &card.card_id) {
                warn!(%error, "Failed to save user code");
            }
        }
    }

    /// Send one frame, waiting for the tag to return when it is lost
    pub async fn send(&mut self, apdu: &CommandApdu) -> Result<ResponseApdu> {
        loop {
            if let Some(response) = self.try_send(apdu).await? {
                return Ok(response);
            }
            debug!("Tag returned, resending frame");
        }
    }

    /// Send one frame; `None` once a lost tag has returned
    ///
    /// The card forgets its encrypted session when it leaves the field, so the
    /// session key is dropped with it.
    async fn try_send(&mut self, apdu: &CommandApdu) -> Result<Option<ResponseApdu>> {
        self.check_cancelled()?;
        match self.reader.transmit(apdu).await {
            Err(Error::TagLost) => {
                self.environment.encryption_key = None;
                self.set_state(SessionState::Paused);
                self.delegate.on_tag_lost().await;
                self.wait_for_tag_return().await?;
                self.delegate.on_tag_connected().await;
                self.set_state(SessionState::Active);
                Ok(None)
            }
            other => other.map(Some),
        }
    }

    /// Send a plain frame, stepping up the encryption while the card asks for it
    async fn transceive_apdu(&mut self, apdu: &CommandApdu) -> Result<ResponseApdu> {
        loop {
            if apdu.ins() != Instruction::OpenSession {
                self.establish_encryption().await?;
            }
            match self.exchange(apdu).await {
                Ok(Some(response)) => return Ok(response),
                Ok(None) => debug!("Encrypted session lost with the tag, reopening"),
                Err(Error::NeedEncryption) => self.step_up_encryption()?,
                Err(error) => return Err(error),
            }
        }
    }

    /// Open an encrypted session unless the mode is plain or a key is set
    async fn establish_encryption(&mut self) -> Result<()> {
        let mode = self.environment.encryption_mode;
        if mode == EncryptionMode::None || self.environment.encryption_key.is_some() {
            return Ok(());
        }

        debug!(%mode, "Opening encrypted session");
        let command = OpenSessionCommand::new(mode)?;
        let apdu = command.serialize(&self.environment)?;
        let response = self.exchange(&apdu).await?.ok_or(Error::TagLost)?;
        let response = command.deserialize(&self.environment, &response)?;
        let access_code = self.environment.protocol_access_code();
        self.environment.encryption_key = Some(command.session_key(&response, &access_code)?);
        debug!(%mode, "Encrypted session opened");
        Ok(())
    }

    fn step_up_encryption(&mut self) -> Result<()> {
        let current = self.environment.encryption_mode;
        let Some(next) = current.step_up() else {
            warn!(mode = %current, "Card refuses the strongest encryption");
            return Err(Error::NeedEncryption);
        };
        info!(from = %current, to = %next, "Card requires stronger encryption");
        self.environment.encryption_mode = next;
        self.environment.encryption_key = None;
        Ok(())
    }

    /// Send a frame until the card stops answering with a security delay
    ///
    /// Payloads are encrypted with the session key when one is set. Returns
    /// `None` when that key was lost with the tag. Non-success status words
    /// are returned as errors.
    async fn exchange(&mut self, apdu: &CommandApdu) -> Result<Option<ResponseApdu>> {
        let stall_limit = self.environment.config.security_delay_stall_limit;
        let mut last_remaining: Option<u32> = None;
        let mut stalls = 0;

        loop {
            let key = self.environment.encryption_key.clone();
            let frame =
                encryption::encrypt_command(apdu, self.environment.encryption_mode, key.as_ref())?;
            let Some(response) = self.try_send(&frame).await? else {
                if key.is_some() {
                    return Ok(None);
                }
                debug!("Tag returned, resending frame");
                continue;
            };
            let response = encryption::decrypt_response(response, key.as_ref())?;
            let status = response.status_word();
            let level = status.tracing_level();
            if level == Level::WARN {
                warn!(%status, "Response status");
            } else if level == Level::INFO {
                info!(%status, "Response status");
            } else if level == Level::DEBUG {
                debug!(%status, "Response status");
            } else {
                trace!(%status, "Response status");
            }

            if status.is_success() {
                return Ok(Some(response));
            }
            if !status.is_need_pause() {
                return Err(Error::from(status));
            }

            let remaining = security_delay_remaining(&response)?;
            let counting_down = match (remaining, last_remaining) {
                (Some(now), Some(before)) => now < before,
                (Some(_), None) => true,
                (None, _) => false,
            };
            if counting_down {
                stalls = 0;
            } else {
                stalls += 1;
                if stalls > stall_limit {
                    return Err(Error::InvalidResponse(
                        "security delay is not counting down".into(),
                    ));
                }
            }
            last_remaining = remaining.or(last_remaining);

            if let Some(remaining) = remaining {
                let total = self
                    .environment
                    .card
                    .as_ref()
                    .map_or(0, |c| c.settings.security_delay);
                self.delegate.on_security_delay(remaining, total).await;
            }
        }
    }

    /// Send a command and decode its response
    ///
    /// Runs the pre-check, handles security delays and asks for user codes
    /// when the card demands them.
    #[instrument(level = "trace", skip(self, command), fields(command = ?command))]
    pub async fn transceive<C>(&mut self, command: &C) -> Result<C::Response>
    where
        C: Command + ?Sized,
    {
        if command.preflight_read_mode() != PreflightReadMode::None
            && self.environment.card.is_none()
        {
            return Err(Error::MissingPreflightRead);
        }
        let handle_errors = self.environment.config.handle_errors;
        if handle_errors {
            if let Some(card) = &self.environment.card {
                command.perform_pre_check(card)?;
            }
        }

        let mut prompts = 0;
        if command.requires_passcode() && !self.environment.passcode.is_set() {
            self.request_user_code(UserCodeType::Passcode, &mut prompts).await?;
        }

        loop {
            let apdu = command.serialize(&self.environment)?;
            let error = match self.transceive_apdu(&apdu).await {
                Ok(response) => return command.deserialize(&self.environment, &response),
                Err(error) => error,
            };

            if matches!(error, Error::ExtendedLengthNotSupported)
                && self.environment.terminal_keys.is_some()
            {
                debug!("Retrying without the terminal key");
                self.environment.terminal_keys = None;
                continue;
            }
            if !handle_errors {
                return Err(error);
            }

            let error = command.map_error(self.environment.card.as_ref(), error);
            let Some(kind) = self.user_code_for(command, &error) else {
                return Err(error);
            };
            if prompts >= self.environment.config.max_user_code_attempts {
                warn!(%kind, prompts, "User code attempts exhausted");
                return Err(error);
            }
            self.request_user_code(kind, &mut prompts).await?;
        }
    }

    fn user_code_for<C>(&self, command: &C, error: &Error) -> Option<UserCodeType>
    where
        C: Command + ?Sized,
    {
        match error {
            Error::AccessCodeRequired => Some(UserCodeType::AccessCode),
            Error::PasscodeRequired => Some(UserCodeType::Passcode),
            Error::InvalidParams if command.requires_passcode() => {
                let card_has_default_passcode = self
                    .environment
                    .card
                    .as_ref()
                    .is_some_and(|c| c.is_passcode_set == Some(false));
                if card_has_default_passcode
                    && !self.environment.is_user_code_set(UserCodeType::Passcode)
                {
                    None
                } else {
                    Some(UserCodeType::Passcode)
                }
            }
            _ => None,
        }
    }

    /// Ask the delegate for a code and store its hash in the environment
    async fn request_user_code(&mut self, kind: UserCodeType, prompts: &mut u8) -> Result<()> {
        let is_first_attempt = *prompts == 0 && !self.environment.is_user_code_set(kind);
        *prompts += 1;
        self.environment.set_user_code(UserCode::unset(kind));

        let card_id = self
            .environment
            .card_id()
            .or(self.expected_card_id.as_deref())
            .and_then(|id| self.environment.config.card_id_display_format.format(id));
        debug!(%kind, is_first_attempt, "Requesting user code");

        let delegate = Arc::clone(&self.delegate);
        let cancel = self.cancel.clone();
        let code = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::UserCancelled),
            code = delegate.request_user_code(kind, is_first_attempt, card_id.as_deref()) => code,
        };

        match code {
            Some(code) => {
                self.environment.set_user_code(UserCode::new(kind, &code));
                Ok(())
            }
            None => Err(Error::UserCancelled),
        }
    }
}

/// Remaining security delay in milliseconds, if reported
fn security_delay_remaining(response: &ResponseApdu) -> Result<Option<u32>> {
    let decoder = TlvDecoder::from_bytes(response.data())?;
    Ok(decoder
        .decode_optional::<u16>(TlvTag::Pause)?
        .map(|pause| u32::from(pause) * 10))
}

#[cfg(test)]
mod tests;
