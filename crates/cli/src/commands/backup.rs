use std::sync::Arc;

use anyhow::Result;
use tangem_sdk::{
    CardManager,
    backup::{BackupService, BackupState},
};

use crate::utils::{display, session::default_input_request};

async fn ask(prompt: &'static str) -> Result<String> {
    Ok(tokio::task::spawn_blocking(move || default_input_request(prompt)).await??)
}

/// Run a backup from the primary card to `count` backup cards
///
/// A backup interrupted while writing is resumed from host storage when the
/// manager keeps one; `discard` forgets it instead.
pub async fn backup_command(
    manager: Arc<CardManager>,
    count: usize,
    access_code: Option<String>,
    discard: bool,
) -> Result<()> {
    let mut service = BackupService::new(Arc::clone(&manager))?;
    if discard {
        service.discard_saved_backup()?;
    }

    if service.state() == BackupState::Preparing {
        println!("{}", display::section_title("Primary card"));
        let primary = service.read_primary_card(None).await?;
        println!(
            "{}",
            display::success(&format!(
                "Primary card {} with {} wallets",
                primary.card_id, primary.existing_wallets_count
            ))
        );
    }

    while service.session().slaves.len() < count && service.can_add_backup_cards() {
        println!("{}", display::section_title("Backup card"));
        ask("Remove the primary card, then press enter").await?;
        let card = service.add_backup_card().await?;
        println!("{}", display::success(&format!("Backup card {} added", card.card_id)));
    }

    if service.state() != BackupState::Finalizing {
        let code = match access_code {
            Some(code) => code,
            None => ask("New access code for all cards").await?,
        };
        service.set_access_code(&code)?;
    }

    println!("{}", display::section_title("Writing"));
    println!(
        "{}",
        display::info("Tap the primary card first, then each backup card when asked")
    );
    let report = service.proceed_backup().await?;
    println!("{}", display::backup_report(&report));
    Ok(())
}
