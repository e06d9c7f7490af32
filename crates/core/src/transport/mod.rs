//! Transport traits for moving frames between the host and a card
//!
//! A transport is the lowest layer: it carries raw command bytes to the card
//! and raw response bytes back, without knowing about TLV payloads, status
//! words or sessions.

pub mod error;

use std::fmt;

use bytes::Bytes;
pub use error::TransportError;
use tracing::{debug, trace};

use crate::{CommandApdu, ResponseApdu};

/// Synchronous link to a card in the field
///
/// Implementations only move bytes. Security delays, user codes and tag
/// reconnection are handled by the session on top.
pub trait CardTransport: Send + fmt::Debug {
    /// Error type returned by the transport
    type Error: Into<crate::Error> + fmt::Debug;

    /// Send one frame and return the card's answer, logging both at `trace`
    fn transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, Self::Error> {
        trace!(frame = %hex::encode(command), "-> card");
        match self.do_transmit_raw(command) {
            Ok(response) => {
                trace!(frame = %hex::encode(&response), "<- card");
                Ok(response)
            }
            Err(error) => {
                debug!(?error, len = command.len(), "Frame not delivered");
                Err(error)
            }
        }
    }

    /// Move the bytes; called by [`transmit_raw`](Self::transmit_raw)
    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, Self::Error>;

    /// Serialize a command, send it and parse the response frame
    fn transmit(&mut self, command: &CommandApdu) -> crate::Result<ResponseApdu> {
        let response = self.transmit_raw(&command.to_bytes()).map_err(Into::into)?;
        ResponseApdu::from_bytes(response)
    }

    /// Whether a tag is currently in the field
    fn is_connected(&self) -> bool;

    /// Drop the current tag connection; the next frame reconnects
    fn reset(&mut self) -> Result<(), Self::Error>;
}

/// Transport replaying a fixed script of card answers
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct MockTransport {
    script: std::collections::VecDeque<Result<Bytes, TransportError>>,
    pub(crate) sent: Vec<Bytes>,
}

#[cfg(test)]
impl MockTransport {
    pub(crate) fn answer(mut self, frame: &'static [u8]) -> Self {
        self.script.push_back(Ok(Bytes::from_static(frame)));
        self
    }

    pub(crate) fn fail(mut self, error: TransportError) -> Self {
        self.script.push_back(Err(error));
        self
    }
}

#[cfg(test)]
impl CardTransport for MockTransport {
    type Error = TransportError;

    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, Self::Error> {
        let step = self.script.pop_front().unwrap_or(Err(TransportError::TagLost));
        if step.is_ok() {
            self.sent.push(Bytes::copy_from_slice(command));
        }
        step
    }

    fn is_connected(&self) -> bool {
        matches!(self.script.front(), Some(Ok(_)))
    }

    fn reset(&mut self) -> Result<(), Self::Error> {
        self.sent.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;
    use crate::{Error, Instruction, StatusWord};

    #[test]
    fn test_transmit_parses_frame() {
        let mut transport = MockTransport::default().answer(&hex!("0101AA9000"));
        let command = CommandApdu::new(Instruction::Read, vec![0x01]);

        let response = transport.transmit(&command).unwrap();
        assert_eq!(response.status_word(), StatusWord::PROCESS_COMPLETED);
        assert_eq!(response.data().as_ref(), &hex!("0101AA"));
        assert_eq!(transport.sent[0].as_ref(), &hex!("00F20000000001 01"));
    }

    #[test]
    fn test_lost_tag_surfaces_as_transport_error() {
        let mut transport = MockTransport::default()
            .fail(TransportError::TagLost)
            .answer(&hex!("9000"));
        let command = CommandApdu::new(Instruction::Read, Vec::new());

        assert!(!transport.is_connected());
        let error = transport.transmit(&command).unwrap_err();
        assert_eq!(error, Error::Transport(TransportError::TagLost));
        assert!(transport.sent.is_empty());

        assert!(transport.is_connected());
        assert!(transport.transmit(&command).unwrap().status_word().is_success());
    }
}
