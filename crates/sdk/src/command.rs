//! Command contract shared by every card operation

use std::fmt;

use async_trait::async_trait;
use tangem_core::{CommandApdu, ResponseApdu, TlvDecoder};

use crate::{Error, Result, environment::SessionEnvironment, session::CardSession, types::Card};

/// Card read the session performs before running an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreflightReadMode {
    /// No read
    None,
    /// Card data without wallets
    ReadCardOnly,
    /// Card data and the wallet list
    FullCardRead,
}

/// A single card command
///
/// A command describes its request and response payloads; the session engine
/// handles security delays, user code prompts and tag loss around it.
#[async_trait]
pub trait Command: Send + Sync + fmt::Debug {
    /// Decoded response
    type Response: Send;

    /// Read the session performs before the command
    fn preflight_read_mode(&self) -> PreflightReadMode {
        PreflightReadMode::FullCardRead
    }

    /// Whether the card will ask for the passcode
    fn requires_passcode(&self) -> bool {
        false
    }

    /// Reject the command before anything is sent
    ///
    /// Only evaluated when error handling is enabled in the configuration.
    fn perform_pre_check(&self, _card: &Card) -> Result<()> {
        Ok(())
    }

    /// Build the request frame
    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu>;

    /// Decode a successful response
    fn deserialize(
        &self,
        environment: &SessionEnvironment,
        response: &ResponseApdu,
    ) -> Result<Self::Response>;

    /// Translate a card error into a more specific one
    fn map_error(&self, _card: Option<&Card>, error: Error) -> Error {
        error
    }

    /// Run the command in a session
    ///
    /// Sends the command once by default. Commands made of several frames or
    /// with post-processing override this.
    async fn run(&mut self, session: &mut CardSession) -> Result<Self::Response> {
        session.transceive(&*self).await
    }
}

/// Anything that can run inside a card session
#[async_trait]
pub trait CardSessionRunnable: Send {
    /// Result of the operation
    type Output: Send;

    /// Read the session performs before the operation
    fn preflight_read_mode(&self) -> PreflightReadMode {
        PreflightReadMode::FullCardRead
    }

    /// Run the operation
    async fn execute(&mut self, session: &mut CardSession) -> Result<Self::Output>;
}

#[async_trait]
impl<C: Command> CardSessionRunnable for C {
    type Output = C::Response;

    fn preflight_read_mode(&self) -> PreflightReadMode {
        Command::preflight_read_mode(self)
    }

    async fn execute(&mut self, session: &mut CardSession) -> Result<Self::Output> {
        Command::run(self, session).await
    }
}

/// Decoder over a response payload, failing on an empty one
pub(crate) fn response_decoder(response: &ResponseApdu) -> Result<TlvDecoder> {
    TlvDecoder::from_response(response).map_err(|e| Error::DeserializeApduFailed(e.to_string()))
}

/// Card snapshot required by a command
pub(crate) fn require_card(environment: &SessionEnvironment) -> Result<&Card> {
    environment.card.as_ref().ok_or(Error::MissingPreflightRead)
}
