//! Error types for the PC/SC transport

use tangem_core::TransportError;
use thiserror::Error;

/// PC/SC-specific errors
#[derive(Debug, Error)]
pub enum PcscError {
    /// PC/SC error
    #[error("PC/SC error: {0}")]
    Pcsc(#[from] pcsc::Error),

    /// No readers available
    #[error("No readers available")]
    NoReadersAvailable,

    /// Reader not found
    #[error("Reader not found: {0}")]
    ReaderNotFound(String),

    /// No card present in reader
    #[error("No card present in reader: {0}")]
    NoCard(String),

    /// Card was reset
    #[error("Card was reset")]
    CardReset,

    /// Card was removed
    #[error("Card was removed")]
    CardRemoved,
}

impl From<PcscError> for TransportError {
    fn from(error: PcscError) -> Self {
        match error {
            PcscError::NoCard(_)
            | PcscError::CardRemoved
            | PcscError::Pcsc(pcsc::Error::RemovedCard | pcsc::Error::NoSmartcard) => {
                Self::TagLost
            }
            PcscError::CardReset | PcscError::Pcsc(pcsc::Error::ResetCard) => Self::Connection,
            PcscError::Pcsc(pcsc::Error::Timeout) => Self::Timeout,
            PcscError::Pcsc(pcsc::Error::Cancelled) => Self::Cancelled,
            PcscError::Pcsc(pcsc::Error::InsufficientBuffer) => Self::BufferTooSmall,
            PcscError::Pcsc(e) => Self::Driver(e as i32),
            PcscError::NoReadersAvailable | PcscError::ReaderNotFound(_) => Self::Device,
        }
    }
}

impl From<PcscError> for tangem_core::Error {
    fn from(error: PcscError) -> Self {
        Self::Transport(error.into())
    }
}
