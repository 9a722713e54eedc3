//! List command - show the keys an agent holds

use anyhow::{Context, Result};
use serde_json::json;

use super::connect;
use crate::cli::args::ListArgs;
use crate::key::{Key, SshVersion};

/// One `ssh-add -l` style line
pub fn format_key(key: &Key) -> String {
    format!(
        "{} {} {} ({})",
        key.bits(),
        key.sha256_fingerprint(),
        key.comment(),
        key.identifier()
    )
}

fn key_json(key: &Key) -> serde_json::Value {
    json!({
        "type": key.identifier(),
        "bits": key.bits(),
        "fingerprint": key.sha256_fingerprint(),
        "md5": key.fingerprint().to_string(),
        "comment": key.comment(),
        "certificate": key.certificate().is_some(),
    })
}

/// Execute the list command
pub async fn execute(args: ListArgs) -> Result<()> {
    let version = if args.ssh1 {
        SshVersion::Ssh1
    } else {
        SshVersion::Ssh2
    };
    let mut client = connect(&args.agent).await?;
    let keys = client
        .list_keys(version)
        .await
        .context("Failed to list keys")?;

    match args.format.as_str() {
        "json" => {
            let listed: Vec<_> = keys.iter().map(key_json).collect();
            println!("{}", serde_json::to_string_pretty(&listed)?);
        }
        _ if keys.is_empty() => println!("The agent has no {} identities.", version),
        _ => {
            for key in &keys {
                println!("{}", format_key(key));
            }
        }
    }
    Ok(())
}
