use std::fmt;

use crate::{
    Error, Result,
    environment::SessionEnvironment,
    types::{Card, FirmwareVersion},
};

/// Check applied to the card read at the start of a session
///
/// A failing filter stops the session before any application command is
/// sent.
pub trait PreflightReadFilter: Send + Sync + fmt::Debug {
    /// Called after the card data was read
    fn on_card_read(&self, card: &Card, environment: &SessionEnvironment) -> Result<()>;

    /// Called after the wallet list was read, for full reads only
    fn on_full_card_read(&self, _card: &Card, _environment: &SessionEnvironment) -> Result<()> {
        Ok(())
    }
}

/// Accepts only the card with the given id
#[derive(Debug, Clone)]
pub struct CardIdFilter {
    expected: String,
}

impl CardIdFilter {
    /// Filter for `card_id`
    pub fn new(card_id: impl Into<String>) -> Self {
        Self {
            expected: card_id.into(),
        }
    }
}

impl PreflightReadFilter for CardIdFilter {
    fn on_card_read(&self, card: &Card, _environment: &SessionEnvironment) -> Result<()> {
        if card.card_id.eq_ignore_ascii_case(&self.expected) {
            Ok(())
        } else {
            Err(Error::WrongCardNumber(self.expected.clone()))
        }
    }
}

/// Accepts only cards whose firmware lies within a range
#[derive(Debug, Clone)]
pub struct FirmwareFilter {
    min: FirmwareVersion,
    max: Option<FirmwareVersion>,
}

impl FirmwareFilter {
    /// Filter for firmware at least `min`
    pub const fn at_least(min: FirmwareVersion) -> Self {
        Self { min, max: None }
    }

    /// Also reject firmware above `max`
    pub const fn with_max(mut self, max: FirmwareVersion) -> Self {
        self.max = Some(max);
        self
    }
}

impl PreflightReadFilter for FirmwareFilter {
    fn on_card_read(&self, card: &Card, _environment: &SessionEnvironment) -> Result<()> {
        let version = card.firmware_version;
        if version < self.min || self.max.is_some_and(|max| version > max) {
            return Err(Error::WrongCardType);
        }
        Ok(())
    }
}
