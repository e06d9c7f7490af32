//! Connection settings for contactless readers

use pcsc::{Protocols, ShareMode as PcscShareMode};

/// Whether other applications may talk to the tag while we hold it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareMode {
    /// Only this process
    Exclusive,
    /// Other processes may connect between frames
    Shared,
    /// Talk to the reader without a tag (reader escape commands)
    Direct,
}

impl From<ShareMode> for PcscShareMode {
    fn from(mode: ShareMode) -> Self {
        match mode {
            ShareMode::Exclusive => Self::Exclusive,
            ShareMode::Shared => Self::Shared,
            ShareMode::Direct => Self::Direct,
        }
    }
}

/// Settings used when connecting to a tag
#[derive(Debug, Clone)]
pub struct PcscConfig {
    /// Sharing mode
    pub share_mode: ShareMode,
    /// Contactless readers present NFC tags as T=1 cards
    pub protocols: Protocols,
    /// Reconnect and resend once when the reader reports a reset tag
    pub auto_reconnect: bool,
    /// Wrap every frame in its own PC/SC transaction
    pub transactions: bool,
}

impl Default for PcscConfig {
    fn default() -> Self {
        Self {
            share_mode: ShareMode::Shared,
            protocols: Protocols::T1,
            auto_reconnect: true,
            transactions: true,
        }
    }
}

impl PcscConfig {
    /// Set the sharing mode
    pub const fn with_share_mode(mut self, mode: ShareMode) -> Self {
        self.share_mode = mode;
        self
    }

    /// Accept other protocols, e.g. `Protocols::ANY` for contact readers
    pub const fn with_protocols(mut self, protocols: Protocols) -> Self {
        self.protocols = protocols;
        self
    }

    /// Set whether a reset tag is reconnected transparently
    pub const fn with_auto_reconnect(mut self, auto_reconnect: bool) -> Self {
        self.auto_reconnect = auto_reconnect;
        self
    }

    /// Set whether frames run inside PC/SC transactions
    pub const fn with_transactions(mut self, transactions: bool) -> Self {
        self.transactions = transactions;
        self
    }
}
