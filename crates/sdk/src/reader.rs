//! Card readers as seen by the session engine

use std::{fmt, time::Duration};

use async_trait::async_trait;
use tangem_core::{CardTransport, CommandApdu, ResponseApdu};
use tracing::{debug, instrument, trace};

use crate::{Error, Result};

/// A reader that can carry one session at a time
///
/// The session engine acquires the reader when a session starts and releases
/// it exactly once when the session ends.
#[async_trait]
pub trait CardReader: Send + fmt::Debug {
    /// Prepare the reader for a session
    async fn acquire(&mut self) -> Result<()>;

    /// Give the reader back after a session
    ///
    /// Also called when a session future is dropped, so it must not block.
    fn release(&mut self);

    /// Wait until a tag is in the field
    async fn wait_for_tag(&mut self) -> Result<()>;

    /// Send a command frame and wait for the response frame
    ///
    /// Fails with [`Error::TagLost`] when the tag left the field.
    async fn transmit(&mut self, command: &CommandApdu) -> Result<ResponseApdu>;
}

/// Adapts a synchronous [`CardTransport`] to [`CardReader`]
///
/// Tag presence is polled with [`CardTransport::is_connected`].
#[derive(Debug)]
pub struct TransportReader<T: CardTransport> {
    transport: T,
    poll_interval: Duration,
}

impl<T: CardTransport> TransportReader<T> {
    /// Wrap a transport
    pub const fn new(transport: T) -> Self {
        Self {
            transport,
            poll_interval: Duration::from_millis(100),
        }
    }

    /// Set how often tag presence is checked
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Underlying transport
    pub const fn transport(&self) -> &T {
        &self.transport
    }
}

#[async_trait]
impl<T: CardTransport> CardReader for TransportReader<T> {
    async fn acquire(&mut self) -> Result<()> {
        debug!("Acquiring transport");
        Ok(())
    }

    fn release(&mut self) {
        if let Err(e) = self.transport.reset() {
            debug!(error = ?e, "Failed to reset transport on release");
        }
    }

    async fn wait_for_tag(&mut self) -> Result<()> {
        while !self.transport.is_connected() {
            trace!("Waiting for tag");
            tokio::time::sleep(self.poll_interval).await;
        }
        Ok(())
    }

    #[instrument(level = "trace", skip(self, command), fields(ins = command.instruction()))]
    async fn transmit(&mut self, command: &CommandApdu) -> Result<ResponseApdu> {
        self.transport.transmit(command).map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;
    use tangem_core::{Bytes, Instruction, TransportError};

    use super::*;

    #[derive(Debug)]
    struct FlakyTransport {
        connected_after: usize,
        polls: std::sync::atomic::AtomicUsize,
    }

    impl CardTransport for FlakyTransport {
        type Error = TransportError;

        fn do_transmit_raw(&mut self, _command: &[u8]) -> std::result::Result<Bytes, Self::Error> {
            if self.is_connected() {
                Ok(Bytes::from_static(&hex!("0101AA9000")))
            } else {
                Err(TransportError::TagLost)
            }
        }

        fn is_connected(&self) -> bool {
            let polls = self
                .polls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            polls >= self.connected_after
        }

        fn reset(&mut self) -> std::result::Result<(), Self::Error> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_tag_then_transmits() {
        let mut reader = TransportReader::new(FlakyTransport {
            connected_after: 3,
            polls: Default::default(),
        });
        reader.wait_for_tag().await.unwrap();

        let response = reader
            .transmit(&CommandApdu::new(Instruction::Read, Vec::new()))
            .await
            .unwrap();
        assert!(response.status_word().is_success());
    }

    #[tokio::test]
    async fn test_tag_loss_is_reported() {
        let mut reader = TransportReader::new(FlakyTransport {
            connected_after: usize::MAX,
            polls: Default::default(),
        });
        let error = reader
            .transmit(&CommandApdu::new(Instruction::Read, Vec::new()))
            .await
            .unwrap_err();
        assert_eq!(error, Error::TagLost);
    }
}
