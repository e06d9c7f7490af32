use anyhow::{Context, Result, anyhow};
use tangem_sdk::{
    CardManager,
    operations::{CreateWalletCommand, PurgeWalletCommand, SignHashesCommand},
    tasks::DeriveWalletPublicKeysTask,
    types::{DerivationPath, EllipticCurve, WalletIndex},
};

use crate::utils::{self, WalletArgs, display};

/// Create a wallet on the given curve
pub async fn create_wallet_command(
    manager: &CardManager,
    card_id: Option<&str>,
    curve: &str,
) -> Result<()> {
    let curve: EllipticCurve = curve.parse()?;
    let response = manager
        .start_session(&mut CreateWalletCommand::new(curve), card_id)
        .await?;

    println!("{}", display::success("Wallet created"));
    println!("{}", display::wallets(std::slice::from_ref(&response.wallet)));
    Ok(())
}

/// Purge a wallet
pub async fn purge_wallet_command(
    manager: &CardManager,
    card_id: Option<&str>,
    wallet: &WalletArgs,
) -> Result<()> {
    let mut command = PurgeWalletCommand::new(wallet.wallet_index()?);
    manager.start_session(&mut command, card_id).await?;
    println!("{}", display::success("Wallet purged"));
    Ok(())
}

/// Sign hashes with a wallet
pub async fn sign_command(
    manager: &CardManager,
    card_id: Option<&str>,
    hashes: &[String],
    wallet: &WalletArgs,
    path: Option<&str>,
) -> Result<()> {
    let hashes = hashes
        .iter()
        .map(|h| utils::parse_hex(h))
        .collect::<Result<Vec<_>>>()?;
    let public_key = match wallet.wallet_index()? {
        WalletIndex::PublicKey(key) => key,
        WalletIndex::Index(_) => return Err(anyhow!("signing needs --public-key")),
    };

    let mut command = SignHashesCommand::new(hashes, public_key);
    if let Some(path) = utils::parse_path(path)? {
        command = command.with_derivation_path(path);
    }
    let response = manager.start_session(&mut command, card_id).await?;

    println!("{}", display::section_title("Signatures"));
    for signature in &response.signatures {
        println!("  {}", hex::encode(signature));
    }
    if let Some(total) = response.total_signed_hashes {
        println!("{}", display::info(&format!("Wallet signed {total} hashes so far")));
    }
    Ok(())
}

/// Derive public keys of a wallet
pub async fn derive_command(
    manager: &CardManager,
    card_id: Option<&str>,
    public_key: &str,
    paths: &[String],
) -> Result<()> {
    let public_key = utils::parse_hex(public_key)?;
    let paths = paths
        .iter()
        .map(|p| {
            p.parse::<DerivationPath>()
                .with_context(|| format!("invalid derivation path: {p}"))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut task = DeriveWalletPublicKeysTask::new(public_key, paths);
    let keys = manager.start_session(&mut task, card_id).await?;

    println!("{}", display::section_title("Derived keys"));
    for key in &keys {
        println!("  {}", key.derivation_path);
        println!("    public key: {}", hex::encode(&key.public_key));
        println!("    chain code: {}", hex::encode(&key.chain_code));
    }
    Ok(())
}
