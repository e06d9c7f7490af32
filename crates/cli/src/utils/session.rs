//! Session plumbing for the Tangem CLI

use std::{
    io::{self, Write},
    sync::Arc,
};

use anyhow::Result;
use async_trait::async_trait;
use colored::Colorize;
use tangem_sdk::{
    CardManager, Config, Error,
    delegate::{LoggingViewDelegate, SessionViewDelegate, WrongCardKind},
    reader::TransportReader,
    types::UserCodeType,
};
use tangem_transport_pcsc::PcscDeviceManager;
use tracing::debug;

use super::{display, reader};

/// Read one line from stdin after printing `prompt`
pub fn default_input_request(prompt: &str) -> io::Result<String> {
    print!("{prompt}: ");
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

/// Delegate that talks to the terminal
#[derive(Debug, Default)]
pub struct TerminalDelegate;

#[async_trait]
impl SessionViewDelegate for TerminalDelegate {
    async fn on_session_started(&self) {
        println!("{}", display::info("Tap the card on the reader"));
    }

    async fn on_security_delay(&self, remaining_ms: u32, _total_ms: u32) {
        println!("Security delay: {:.1}s", f64::from(remaining_ms) / 1000.0);
    }

    async fn on_tag_lost(&self) {
        println!("{}", display::warning("Card lost, tap it again"));
    }

    async fn request_user_code(
        &self,
        kind: UserCodeType,
        is_first_attempt: bool,
        card_id: Option<&str>,
    ) -> Option<String> {
        if !is_first_attempt {
            println!("{}", format!("Wrong {kind}").red());
        }
        let prompt = match card_id {
            Some(card_id) => format!("Enter {kind} for card {card_id}"),
            None => format!("Enter {kind}"),
        };
        let answer = tokio::task::spawn_blocking(move || default_input_request(&prompt)).await;
        match answer {
            Ok(Ok(code)) if !code.is_empty() => Some(code),
            Ok(Ok(_)) => None,
            Ok(Err(error)) => {
                debug!(%error, "Failed to read user code");
                None
            }
            Err(error) => {
                debug!(%error, "User code prompt aborted");
                None
            }
        }
    }

    async fn on_wrong_card(&self, kind: WrongCardKind) {
        let message = match kind {
            WrongCardKind::WrongCardId => "This is not the expected card",
            WrongCardKind::WrongCardType => "This card cannot run the operation",
        };
        println!("{}", display::warning(message));
    }

    async fn on_session_stopped(&self, error: Option<&Error>) {
        if let Some(error) = error {
            debug!(code = error.code(), %error, "Session failed");
        }
    }
}

/// Card manager on the chosen reader
///
/// In batch mode prompts are declined and progress goes to the log only.
pub fn open_manager(
    devices: &PcscDeviceManager,
    reader_name: Option<&str>,
    config: Config,
    batch: bool,
) -> Result<CardManager> {
    let reader = reader::pick_reader(devices, reader_name)?;
    tracing::info!("Using reader: {}", reader.name());

    let transport = devices.open_reader(reader.name())?;
    let delegate: Arc<dyn SessionViewDelegate> = if batch {
        Arc::new(LoggingViewDelegate)
    } else {
        Arc::new(TerminalDelegate)
    };
    Ok(CardManager::new(TransportReader::new(transport), delegate).with_config(config))
}
