use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::{
    Error, Result,
    attestation::{AttestationReport, OnlineAttestation},
    command::{CardSessionRunnable, Command, require_card},
    config::AttestationMode,
    operations::AttestCardKeyCommand,
    session::CardSession,
    types::Card,
};

/// Card snapshot with its attestation outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResponse {
    /// The card, with its wallet list
    pub card: Card,
    /// Attestation outcome
    pub attestation: AttestationReport,
}

/// Reads a card and checks that it is genuine
///
/// The card key is always challenged. With [`AttestationMode::Online`] the
/// manufacturer service is asked as well.
#[derive(Debug, Clone, Default)]
pub struct ScanTask {
    online: Option<Arc<dyn OnlineAttestation>>,
}

impl ScanTask {
    /// Scan with offline attestation only
    pub const fn new() -> Self {
        Self { online: None }
    }

    /// Service used when the configuration asks for online attestation
    pub fn with_online_attestation(mut self, service: Arc<dyn OnlineAttestation>) -> Self {
        self.online = Some(service);
        self
    }
}

#[async_trait]
impl CardSessionRunnable for ScanTask {
    type Output = ScanResponse;

    #[instrument(level = "debug", skip_all)]
    async fn execute(&mut self, session: &mut CardSession) -> Result<ScanResponse> {
        let mut report = AttestationReport::default();

        match AttestCardKeyCommand::new().run(session).await {
            Ok(_) => report.card_key_verified = true,
            Err(Error::CardVerificationFailed) => warn!("Card key is not genuine"),
            Err(error) => return Err(error),
        }

        let card = require_card(session.environment())?.clone();
        if session.environment().config.attestation_mode == AttestationMode::Online {
            match &self.online {
                Some(service) => {
                    let verdict = service.verify(&card.card_id, &card.card_public_key).await?;
                    report.online_verified = Some(verdict.verified);
                    report.artwork = verdict.artwork;
                }
                None => warn!("Online attestation requested without a service"),
            }
        }

        info!(
            card_id = %card.card_id,
            verified = report.is_verified(),
            "Card scanned"
        );
        Ok(ScanResponse {
            card,
            attestation: report,
        })
    }
}
