//! Host callbacks for session progress and prompts

use std::fmt;

use async_trait::async_trait;
use derive_more::Display;
use tracing::{info, warn};

use crate::{Error, types::UserCodeType};

/// Why the tapped card was rejected
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WrongCardKind {
    /// Card id differs from the expected one
    WrongCardId,
    /// Card does not fit the requested operation
    WrongCardType,
}

/// Receives session progress and answers prompts
///
/// Every method except [`request_user_code`](Self::request_user_code) only
/// informs the host.
#[async_trait]
pub trait SessionViewDelegate: Send + Sync + fmt::Debug {
    /// A session started and is waiting for a tag
    async fn on_session_started(&self) {}

    /// The card enforces a security delay
    async fn on_security_delay(&self, _remaining_ms: u32, _total_ms: u32) {}

    /// A tag entered the field
    async fn on_tag_connected(&self) {}

    /// The tag left the field, the session waits for it to return
    async fn on_tag_lost(&self) {}

    /// Ask the user for a code
    ///
    /// `is_first_attempt` is false when the card rejected the previous code.
    /// Returning `None` cancels the session.
    async fn request_user_code(
        &self,
        kind: UserCodeType,
        is_first_attempt: bool,
        card_id: Option<&str>,
    ) -> Option<String>;

    /// The tapped card was rejected
    async fn on_wrong_card(&self, _kind: WrongCardKind) {}

    /// The session ended, with its error if it failed
    async fn on_session_stopped(&self, _error: Option<&Error>) {}

    /// Hide any session UI
    async fn dismiss(&self) {}
}

/// Delegate that logs progress and declines every prompt
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingViewDelegate;

#[async_trait]
impl SessionViewDelegate for LoggingViewDelegate {
    async fn on_session_started(&self) {
        info!("Hold the card near the reader");
    }

    async fn on_security_delay(&self, remaining_ms: u32, total_ms: u32) {
        info!(remaining_ms, total_ms, "Security delay");
    }

    async fn on_tag_connected(&self) {
        info!("Card connected");
    }

    async fn on_tag_lost(&self) {
        warn!("Card lost, hold it near the reader again");
    }

    async fn request_user_code(
        &self,
        kind: UserCodeType,
        _is_first_attempt: bool,
        _card_id: Option<&str>,
    ) -> Option<String> {
        warn!(%kind, "User code requested but no prompt is available");
        None
    }

    async fn on_wrong_card(&self, kind: WrongCardKind) {
        warn!(%kind, "Wrong card");
    }

    async fn on_session_stopped(&self, error: Option<&Error>) {
        match error {
            Some(error) => warn!(%error, code = error.code(), "Session failed"),
            None => info!("Session completed"),
        }
    }
}
