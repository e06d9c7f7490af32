//! Display utilities for the Tangem CLI

use std::fmt::Display;

use colored::Colorize;
use tangem_sdk::{
    backup::BackupReport,
    types::{Card, CardWallet},
};

/// A formatted section title
#[derive(Debug)]
pub struct SectionTitle(pub &'static str);

impl Display for SectionTitle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "\n{}", self.0.bold().underline())
    }
}

/// Format a section header
pub const fn section_title(title: &'static str) -> SectionTitle {
    SectionTitle(title)
}

/// Format a success message
pub fn success(message: &str) -> String {
    format!("✅ {}", message.green().bold())
}

/// Format a warning message
pub fn warning(message: &str) -> String {
    format!("⚠️  {}", message.yellow().bold())
}

/// Format an info message
pub fn info(message: &str) -> String {
    format!("ℹ️  {}", message.blue())
}

/// Format a key-value block
pub fn key_value_box(title: &str, items: Vec<(&str, String)>) -> String {
    let mut result = format!("{}", title.bold().underline());
    for (key, value) in items {
        result.push_str(&format!("\n  {}: {}", key.bold(), value));
    }
    result
}

fn flag(value: Option<bool>) -> String {
    value.map_or_else(|| "unknown".into(), |v| if v { "yes" } else { "no" }.into())
}

/// Card summary
pub fn card(card: &Card) -> String {
    let curves: Vec<String> = card.supported_curves.iter().map(ToString::to_string).collect();
    key_value_box(
        "Card",
        vec![
            ("Card ID", card.card_id.clone()),
            ("Batch", card.batch_id.clone()),
            ("Firmware", card.firmware_version.to_string()),
            ("Issuer", card.issuer.name.clone()),
            ("Card key", hex::encode(&card.card_public_key)),
            ("Curves", curves.join(", ")),
            ("Wallet slots", card.settings.max_wallets_count.to_string()),
            ("Access code set", flag(card.is_access_code_set)),
            ("Passcode set", flag(card.is_passcode_set)),
            (
                "Backup",
                card.backup_status
                    .map_or_else(|| "not supported".into(), |s| format!("{s:?}")),
            ),
        ],
    )
}

/// One line per wallet
pub fn wallets(wallets: &[CardWallet]) -> String {
    if wallets.is_empty() {
        return info("No wallets");
    }
    wallets
        .iter()
        .map(|w| {
            let backup = if w.has_backup { " (backed up)" } else { "" };
            format!(
                "  #{} {} {}{}",
                w.index,
                w.curve.to_string().cyan(),
                hex::encode(&w.public_key),
                backup
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Outcome of a backup
pub fn backup_report(report: &BackupReport) -> String {
    let mut items = vec![("Primary card", report.primary_card_id.clone())];
    for card_id in report.finalized() {
        items.push(("Backup card", card_id.green().to_string()));
    }
    for (card_id, code) in report.failed() {
        items.push(("Left out", format!("{} (error {code})", card_id.red())));
    }
    key_value_box("Backup", items)
}
