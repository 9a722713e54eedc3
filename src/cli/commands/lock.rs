//! Lock and unlock commands

use anyhow::{Context, Result, bail};

use super::{connect, read_secret_line};
use crate::cli::args::LockArgs;

/// Execute the lock command
pub async fn lock(args: LockArgs) -> Result<()> {
    let passphrase = read_secret_line("Enter lock password: ")?;
    if passphrase.is_empty() {
        bail!("Refusing to lock with an empty password");
    }
    let mut client = connect(&args.agent).await?;
    client
        .lock(passphrase.as_bytes())
        .await
        .context("Failed to lock agent")?;
    eprintln!("Agent locked.");
    Ok(())
}

/// Execute the unlock command
pub async fn unlock(args: LockArgs) -> Result<()> {
    let passphrase = read_secret_line("Enter lock password: ")?;
    let mut client = connect(&args.agent).await?;
    client
        .unlock(passphrase.as_bytes())
        .await
        .context("Failed to unlock agent")?;
    eprintln!("Agent unlocked.");
    Ok(())
}
