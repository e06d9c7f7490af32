//! Online card attestation collaborator

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Outcome of a card attestation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationReport {
    /// The card key was accepted
    pub card_key_verified: bool,
    /// The manufacturer confirmed the card, `None` when not asked
    pub online_verified: Option<bool>,
    /// Artwork identifier returned by the service
    pub artwork: Option<String>,
}

impl AttestationReport {
    /// Whether every performed check passed
    pub fn is_verified(&self) -> bool {
        self.card_key_verified && self.online_verified != Some(false)
    }
}

/// Manufacturer service that confirms a card key is genuine
#[async_trait]
pub trait OnlineAttestation: Send + Sync + fmt::Debug {
    /// Verify that `public_key` belongs to the card `card_id`
    async fn verify(&self, card_id: &str, public_key: &[u8]) -> Result<OnlineVerdict>;
}

/// Answer of the online service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlineVerdict {
    /// The card key is known to the manufacturer
    pub verified: bool,
    /// Artwork identifier
    pub artwork: Option<String>,
}
