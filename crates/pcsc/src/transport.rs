//! PC/SC transport implementation

use std::{ffi::CString, fmt, time::Duration};

use bytes::Bytes;
use pcsc::{Card, Context, Disposition, ReaderState, State};
use tangem_core::CardTransport;
use tracing::{debug, trace};

use crate::{
    config::PcscConfig,
    error::PcscError,
};

/// Transport over one PC/SC reader
///
/// The card connection is opened lazily on the first frame and dropped on
/// [`reset`](CardTransport::reset), so the transport survives tags coming and
/// going between sessions.
pub struct PcscTransport {
    context: Context,
    card: Option<Card>,
    reader_name: CString,
    config: PcscConfig,
}

impl fmt::Debug for PcscTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PcscTransport")
            .field("reader_name", &self.reader_name)
            .field("has_card", &self.card.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl PcscTransport {
    pub(crate) fn new(
        context: Context,
        reader_name: &str,
        config: PcscConfig,
    ) -> Result<Self, PcscError> {
        let reader_name = CString::new(reader_name)
            .map_err(|_| PcscError::ReaderNotFound(reader_name.to_owned()))?;
        Ok(Self {
            context,
            card: None,
            reader_name,
            config,
        })
    }

    /// Get the reader name
    pub fn reader_name(&self) -> String {
        self.reader_name.to_string_lossy().into_owned()
    }

    /// Get the ATR of the connected card
    pub fn atr(&self) -> Result<Vec<u8>, PcscError> {
        let card = self.card.as_ref().ok_or_else(|| PcscError::NoCard(self.reader_name()))?;
        Ok(card.get_attribute_owned(pcsc::Attribute::AtrString)?)
    }

    fn connect_card(&mut self) -> Result<(), PcscError> {
        if self.card.is_some() {
            return Ok(());
        }
        match self.context.connect(
            &self.reader_name,
            self.config.share_mode.into(),
            self.config.protocols,
        ) {
            Ok(card) => {
                debug!(reader = %self.reader_name(), "Connected to card");
                self.card = Some(card);
                Ok(())
            }
            Err(pcsc::Error::NoSmartcard | pcsc::Error::RemovedCard) => {
                Err(PcscError::NoCard(self.reader_name()))
            }
            Err(pcsc::Error::UnknownReader) => Err(PcscError::ReaderNotFound(self.reader_name())),
            Err(e) => Err(e.into()),
        }
    }

    fn exchange(&mut self, command: &[u8]) -> Result<Bytes, PcscError> {
        let transactions = self.config.transactions;
        let card = self
            .card
            .as_mut()
            .ok_or_else(|| PcscError::NoCard(self.reader_name.to_string_lossy().into_owned()))?;

        let mut buffer = vec![0u8; pcsc::MAX_BUFFER_SIZE_EXTENDED];
        let response = if transactions {
            let transaction = card.transaction()?;
            Bytes::copy_from_slice(transaction.transmit(command, &mut buffer)?)
        } else {
            Bytes::copy_from_slice(card.transmit(command, &mut buffer)?)
        };
        Ok(response)
    }

    fn transmit_command(&mut self, command: &[u8]) -> Result<Bytes, PcscError> {
        self.connect_card()?;
        match self.exchange(command) {
            Err(PcscError::Pcsc(e @ (pcsc::Error::ResetCard | pcsc::Error::RemovedCard))) => {
                self.card = None;
                if e == pcsc::Error::ResetCard && self.config.auto_reconnect {
                    debug!("Card was reset, reconnecting");
                    self.connect_card()?;
                    return self.exchange(command);
                }
                Err(PcscError::CardRemoved)
            }
            other => other,
        }
    }
}

impl CardTransport for PcscTransport {
    type Error = PcscError;

    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, PcscError> {
        self.transmit_command(command)
    }

    /// Whether a tag is in the reader's field
    fn is_connected(&self) -> bool {
        let mut states = [ReaderState::new(self.reader_name.clone(), State::UNAWARE)];
        match self.context.get_status_change(Some(Duration::ZERO), &mut states) {
            Ok(()) => {
                let state = states[0].event_state();
                state.contains(State::PRESENT) && !state.contains(State::MUTE)
            }
            Err(error) => {
                trace!(%error, "Reader status unavailable");
                false
            }
        }
    }

    fn reset(&mut self) -> Result<(), PcscError> {
        if let Some(card) = self.card.take() {
            card.disconnect(Disposition::ResetCard)
                .map_err(|(_, error)| PcscError::from(error))?;
        }
        Ok(())
    }
}

impl Drop for PcscTransport {
    fn drop(&mut self) {
        if let Some(card) = self.card.take() {
            if let Err((_, error)) = card.disconnect(Disposition::LeaveCard) {
                debug!(%error, "Failed to disconnect card");
            }
        }
    }
}
