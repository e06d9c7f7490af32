//! Command-line interface for Tangem cards on PC/SC readers

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tangem_sdk::{Config, storage::SecureStorage};
use tangem_transport_pcsc::PcscDeviceManager;
use tracing_subscriber::EnvFilter;

mod commands;
mod storage;
mod utils;

use commands::*;
use utils::{WalletArgs, reader, session};

#[derive(Parser)]
#[command(version, about = "Tangem card CLI for PC/SC contactless readers")]
struct Cli {
    /// Reader name (defaults to the first reader with a card)
    #[arg(short, long, global = true)]
    reader: Option<String>,

    /// Only accept the card with this id
    #[arg(long, global = true)]
    card_id: Option<String>,

    /// SDK configuration file in JSON
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Never prompt; missing codes fail the command
    #[arg(long, global = true)]
    batch: bool,

    /// Debug level output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available readers
    List,

    /// Read the card, its wallets and check that it is genuine
    Scan {
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create a wallet
    CreateWallet {
        /// Curve of the new wallet
        #[arg(long, default_value = "secp256k1")]
        curve: String,
    },

    /// Purge a wallet
    PurgeWallet {
        #[command(flatten)]
        wallet: WalletArgs,
    },

    /// Sign hashes with a wallet
    Sign {
        /// Hashes to sign, in hex
        #[arg(required = true)]
        hashes: Vec<String>,

        #[command(flatten)]
        wallet: WalletArgs,

        /// HD derivation path (e.g. m/44'/0'/0'/0/0)
        #[arg(long)]
        path: Option<String>,
    },

    /// Derive public keys of an HD wallet
    Derive {
        /// Wallet public key in hex
        #[arg(long)]
        public_key: String,

        /// Derivation paths (e.g. m/44'/0'/0'/0/0)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Change the access code or passcode
    SetUserCode {
        /// New access code (asked for when neither code is given)
        #[arg(long)]
        access_code: Option<String>,

        /// New passcode
        #[arg(long)]
        passcode: Option<String>,

        /// Restore both factory codes
        #[arg(long, conflicts_with_all = ["access_code", "passcode"])]
        reset: bool,
    },

    /// Read files
    ReadFiles {
        /// Slots to read (all when empty)
        indices: Vec<u8>,

        /// Also read private files
        #[arg(long)]
        private: bool,
    },

    /// Write a file
    WriteFile {
        /// Path to the file, or its contents in hex
        data: String,

        /// Make the file readable without codes
        #[arg(long)]
        public: bool,
    },

    /// Delete files
    DeleteFiles {
        /// Slots to delete (all when empty)
        indices: Vec<u8>,
    },

    /// Back up the wallets of a primary card to backup cards
    Backup {
        /// Number of backup cards
        #[arg(long, default_value_t = 1)]
        count: usize,

        /// New access code for all cards
        #[arg(long)]
        access_code: Option<String>,

        /// Forget an interrupted backup and start over
        #[arg(long)]
        discard: bool,
    },

    /// Drop the backup link of a card
    ResetBackup,

    /// Decode a TLV payload
    Tlv {
        /// Payload in hex
        payload: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match &cli.command {
        Commands::Tlv { payload } => return decode_tlv_command(payload),
        Commands::List => return reader::list_readers(&PcscDeviceManager::new()?),
        _ => {}
    }

    let config = match &cli.config {
        Some(path) => {
            let json = std::fs::read(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_slice(&json).context("invalid configuration")?
        }
        None => Config::default(),
    };
    let storage: Arc<dyn SecureStorage> = Arc::new(storage::FileStorage::open_default()?);
    let devices = PcscDeviceManager::new()?;
    let manager = session::open_manager(&devices, cli.reader.as_deref(), config, cli.batch)?;
    let manager = Arc::new(manager.with_storage(storage));
    let card_id = cli.card_id.as_deref();

    match cli.command {
        Commands::List | Commands::Tlv { .. } => unreachable!("handled above"),
        Commands::Scan { json } => scan_command(&manager, json).await?,
        Commands::CreateWallet { curve } => create_wallet_command(&manager, card_id, &curve).await?,
        Commands::PurgeWallet { wallet } => purge_wallet_command(&manager, card_id, &wallet).await?,
        Commands::Sign {
            hashes,
            wallet,
            path,
        } => sign_command(&manager, card_id, &hashes, &wallet, path.as_deref()).await?,
        Commands::Derive { public_key, paths } => {
            derive_command(&manager, card_id, &public_key, &paths).await?
        }
        Commands::SetUserCode {
            access_code,
            passcode,
            reset,
        } => set_user_code_command(&manager, card_id, access_code, passcode, reset).await?,
        Commands::ReadFiles { indices, private } => {
            read_files_command(&manager, card_id, indices, private).await?
        }
        Commands::WriteFile { data, public } => {
            write_file_command(&manager, card_id, &data, public).await?
        }
        Commands::DeleteFiles { indices } => delete_files_command(&manager, card_id, indices).await?,
        Commands::Backup {
            count,
            access_code,
            discard,
        } => backup_command(Arc::clone(&manager), count, access_code, discard).await?,
        Commands::ResetBackup => reset_backup_command(&manager, card_id).await?,
    }

    Ok(())
}

fn setup_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(true)
        .init();
}
