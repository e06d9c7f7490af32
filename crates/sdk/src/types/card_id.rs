use serde::{Deserialize, Serialize};

/// How a card id is shown in prompts and messages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CardIdDisplayFormat {
    /// Never shown
    None,
    /// Every digit, in groups of four
    #[default]
    Full,
    /// The last `n` digits
    Last(usize),
    /// The last `n` digits after a mask
    LastMasked {
        /// Digits to show
        numbers: usize,
        /// Text shown before the digits
        mask: String,
    },
    /// The last `n` digits before the Luhn check digit
    LastLuhn(usize),
}

impl CardIdDisplayFormat {
    /// Format a card id, `None` when it must not be shown
    pub fn format(&self, card_id: &str) -> Option<String> {
        let id = card_id.trim();
        match self {
            Self::None => None,
            Self::Full => Some(
                id.as_bytes()
                    .chunks(4)
                    .map(String::from_utf8_lossy)
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
            Self::Last(numbers) => Some(suffix(id, *numbers).to_owned()),
            Self::LastMasked { numbers, mask } => Some(format!("{mask}{}", suffix(id, *numbers))),
            Self::LastLuhn(numbers) => {
                let without_check = &id[..id.len().saturating_sub(1)];
                Some(suffix(without_check, *numbers).to_owned())
            }
        }
    }
}

fn suffix(id: &str, numbers: usize) -> &str {
    &id[id.len().saturating_sub(numbers)..]
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "CB79000000018201";

    #[test]
    fn test_formats() {
        assert_eq!(CardIdDisplayFormat::None.format(ID), None);
        assert_eq!(
            CardIdDisplayFormat::Full.format(ID).unwrap(),
            "CB79 0000 0001 8201"
        );
        assert_eq!(CardIdDisplayFormat::Last(4).format(ID).unwrap(), "8201");
        assert_eq!(
            CardIdDisplayFormat::LastMasked {
                numbers: 4,
                mask: " * * * ".into()
            }
            .format(ID)
            .unwrap(),
            " * * * 8201"
        );
        assert_eq!(CardIdDisplayFormat::LastLuhn(4).format(ID).unwrap(), "1820");
        assert_eq!(CardIdDisplayFormat::Last(40).format("AB").unwrap(), "AB");
    }
}
