use anyhow::Result;
use tangem_sdk::{
    CardManager,
    backup::ResetBackupCommand,
    operations::{SetUserCodeCommand, UserCodeChange},
    tasks::ScanTask,
};

use crate::utils::display;

/// Scan a card and show it
pub async fn scan_command(manager: &CardManager, json: bool) -> Result<()> {
    let response = manager.start_session(&mut ScanTask::new(), None).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    println!("{}", display::card(&response.card));
    println!("{}", display::section_title("Wallets"));
    println!("{}", display::wallets(&response.card.wallets));

    if response.attestation.is_verified() {
        println!("{}", display::success("Card is genuine"));
    } else {
        println!("{}", display::warning("Card attestation failed"));
    }
    Ok(())
}

/// Change or reset the card's user codes
pub async fn set_user_code_command(
    manager: &CardManager,
    card_id: Option<&str>,
    access_code: Option<String>,
    passcode: Option<String>,
    reset: bool,
) -> Result<()> {
    let mut command = match (access_code, passcode) {
        _ if reset => SetUserCodeCommand::reset_user_codes(),
        (Some(access_code), Some(passcode)) => SetUserCodeCommand::change(
            UserCodeChange::Value(access_code),
            UserCodeChange::Value(passcode),
        ),
        (None, Some(passcode)) => SetUserCodeCommand::change_passcode(Some(passcode)),
        (access_code, None) => SetUserCodeCommand::change_access_code(access_code),
    };

    manager.start_session(&mut command, card_id).await?;
    println!("{}", display::success("User codes updated"));
    Ok(())
}

/// Drop the backup link of a card
pub async fn reset_backup_command(manager: &CardManager, card_id: Option<&str>) -> Result<()> {
    let response = manager
        .start_session(&mut ResetBackupCommand::new(), card_id)
        .await?;
    println!(
        "{}",
        display::success(&format!("Backup reset on card {}", response.card_id))
    );
    Ok(())
}
