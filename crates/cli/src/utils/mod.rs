//! Utility functions and types for the Tangem CLI

pub mod display;
pub mod reader;
pub mod session;

use anyhow::{Context, Result};
use clap::Args;
use tangem_sdk::types::{DerivationPath, WalletIndex};

/// Arguments selecting a wallet
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct WalletArgs {
    /// Wallet public key in hex
    #[arg(long)]
    pub public_key: Option<String>,

    /// Wallet slot index
    #[arg(long)]
    pub index: Option<u32>,
}

impl WalletArgs {
    /// The addressed wallet
    pub fn wallet_index(&self) -> Result<WalletIndex> {
        match (&self.public_key, self.index) {
            (Some(key), _) => Ok(WalletIndex::PublicKey(parse_hex(key)?)),
            (None, Some(index)) => Ok(WalletIndex::Index(index)),
            (None, None) => anyhow::bail!("either --public-key or --index is required"),
        }
    }
}

/// Decode a hex argument, allowing a `0x` prefix and spaces
pub fn parse_hex(value: &str) -> Result<Vec<u8>> {
    let cleaned: String = value
        .trim_start_matches("0x")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    hex::decode(&cleaned).with_context(|| format!("invalid hex: {value}"))
}

/// Parse an optional derivation path argument
pub fn parse_path(path: Option<&str>) -> Result<Option<DerivationPath>> {
    path.map(|p| p.parse().with_context(|| format!("invalid derivation path: {p}")))
        .transpose()
}
