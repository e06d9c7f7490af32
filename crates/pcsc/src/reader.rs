//! Reader representation for PC/SC devices

use pcsc::{ReaderState, State};

/// A PC/SC reader and what is in its field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcscReader {
    name: String,
    has_card: bool,
    atr: Option<Vec<u8>>,
}

impl PcscReader {
    /// Create a new reader
    pub const fn new(name: String, has_card: bool, atr: Option<Vec<u8>>) -> Self {
        Self {
            name,
            has_card,
            atr,
        }
    }

    /// Get the reader name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if a card is present in the reader
    pub const fn has_card(&self) -> bool {
        self.has_card
    }

    /// Get the ATR of the card if present
    pub fn atr(&self) -> Option<&[u8]> {
        self.atr.as_deref()
    }

    /// Whether the card ATR equals `pattern` on the bits set in `mask`
    pub fn atr_matches(&self, pattern: &[u8], mask: Option<&[u8]>) -> bool {
        let Some(atr) = self.atr() else {
            return false;
        };
        if atr.len() != pattern.len() {
            return false;
        }
        match mask {
            Some(mask) if mask.len() == atr.len() => atr
                .iter()
                .zip(pattern)
                .zip(mask)
                .all(|((a, p), m)| a & m == p & m),
            Some(_) => false,
            None => atr == pattern,
        }
    }

    pub(crate) fn from_reader_state(reader_state: &ReaderState) -> Self {
        let has_card = reader_state.event_state().contains(State::PRESENT)
            && !reader_state.event_state().contains(State::EMPTY);
        let atr = has_card.then(|| reader_state.atr().to_vec());

        Self {
            name: reader_state.name().to_string_lossy().into_owned(),
            has_card,
            atr,
        }
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;

    #[test]
    fn test_atr_mask() {
        let reader = PcscReader::new(
            "ACS ACR122U".into(),
            true,
            Some(hex!("3B8F8001804F0CA000000306030001000000006A").to_vec()),
        );
        let pattern = hex!("3B8F8001804F0CA0000003060300FF000000006A");
        let mut mask = [0xFF; 20];
        mask[14] = 0x00;

        assert!(reader.atr_matches(&pattern, Some(&mask)));
        assert!(!reader.atr_matches(&pattern, None));
        assert!(!reader.atr_matches(&pattern, Some(&mask[..4])));
        assert!(!PcscReader::new("empty".into(), false, None).atr_matches(&pattern, None));
    }
}
