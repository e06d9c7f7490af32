//! Errors raised while moving frames to and from the card

use thiserror::Error;

/// Failure of the physical link, as opposed to an error reported by the card
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The reader refused the connection
    #[error("Could not connect to the card")]
    Connection,

    /// The card left the field while a frame was in flight
    #[error("Tag lost")]
    TagLost,

    /// The frame was sent but no answer came back
    #[error("Frame transmission failed")]
    Transmission,

    /// The reader itself is unavailable
    #[error("Reader unavailable")]
    Device,

    /// The answer did not fit the receive buffer
    #[error("Response exceeds the receive buffer")]
    BufferTooSmall,

    /// Raw driver status code
    #[error("Reader driver error {0:#x}")]
    Driver(i32),

    /// The reader gave up waiting for the card
    #[error("Reader timed out")]
    Timeout,

    /// The host aborted the exchange
    #[error("Exchange cancelled")]
    Cancelled,
}

impl TransportError {
    /// Whether the session may recover by waiting for the card to come back
    pub const fn is_tag_lost(&self) -> bool {
        matches!(self, Self::TagLost)
    }
}
