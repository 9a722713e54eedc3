//! Remove and remove-all commands

use anyhow::{Context, Result};
use std::path::Path;

use super::connect;
use crate::cli::args::{RemoveAllArgs, RemoveArgs};
use crate::key::{Key, SshVersion};

/// Public key from a `.pub` file, a `-cert.pub` file or a private key file
pub fn load_public_key(path: &Path) -> Result<Key> {
    let blob = if let Ok(public) = ssh_key::PublicKey::read_openssh_file(path) {
        public.to_bytes()?
    } else if let Ok(cert) = ssh_key::Certificate::read_file(path) {
        cert.to_bytes()?
    } else {
        ssh_key::PrivateKey::read_openssh_file(path)
            .with_context(|| format!("Not an OpenSSH key file: {}", path.display()))?
            .public_key()
            .to_bytes()?
    };
    Ok(Key::decode_ssh2_public_blob(&blob)?)
}

/// Execute the remove command
pub async fn execute(args: RemoveArgs) -> Result<()> {
    let mut client = connect(&args.agent).await?;
    for path in &args.files {
        let key = load_public_key(path)?;
        client
            .remove_key(&key)
            .await
            .with_context(|| format!("Failed to remove {}", path.display()))?;
        eprintln!("Identity removed: {}", path.display());
    }
    Ok(())
}

/// Execute the remove-all command
pub async fn execute_all(args: RemoveAllArgs) -> Result<()> {
    let version = if args.ssh1 {
        SshVersion::Ssh1
    } else {
        SshVersion::Ssh2
    };
    let mut client = connect(&args.agent).await?;
    client
        .remove_all_keys(version)
        .await
        .context("Failed to remove identities")?;
    eprintln!("All {} identities removed.", version);
    Ok(())
}
