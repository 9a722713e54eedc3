//! Add command - load OpenSSH private keys into an agent

use anyhow::{Context, Result};
use std::path::Path;

use super::{connect, read_secret_line};
use crate::cli::args::AddArgs;
use crate::config::parse_lifetime;
use crate::key::{Constraint, Key};

/// Read an OpenSSH private key file, asking for its passphrase on stdin
/// when it is encrypted
pub fn load_private_key(path: &Path) -> Result<Key> {
    let private = ssh_key::PrivateKey::read_openssh_file(path)
        .with_context(|| format!("Failed to read private key {}", path.display()))?;

    let private = if private.is_encrypted() {
        let passphrase = read_secret_line(&format!("Enter passphrase for {}: ", path.display()))?;
        private
            .decrypt(passphrase.as_bytes())
            .with_context(|| format!("Failed to decrypt {}", path.display()))?
    } else {
        private
    };

    let comment = match private.comment() {
        "" => path.display().to_string(),
        comment => comment.to_string(),
    };
    Ok(Key::from_keypair_data(private.key_data(), comment)?)
}

fn constraints(args: &AddArgs) -> Result<Vec<Constraint>> {
    let mut constraints = Vec::new();
    if let Some(lifetime) = &args.lifetime {
        constraints.push(Constraint::Lifetime(parse_lifetime(lifetime)?));
    }
    if args.confirm {
        constraints.push(Constraint::Confirm);
    }
    Ok(constraints)
}

/// Execute the add command
pub async fn execute(args: AddArgs) -> Result<()> {
    let constraints = constraints(&args)?;
    let mut client = connect(&args.agent).await?;

    for path in &args.files {
        let key = load_private_key(path)?;
        client
            .add_key_with_constraints(&key, &constraints)
            .await
            .with_context(|| format!("Agent refused {}", path.display()))?;
        eprintln!("Identity added: {} ({})", path.display(), key.comment());
        for constraint in &constraints {
            eprintln!("  {}", constraint);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::args::AgentArgs;
    use rand::rngs::OsRng;
    use ssh_key::{Algorithm, LineEnding, PrivateKey};
    use std::path::PathBuf;

    #[test]
    fn test_load_private_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("id_ed25519");
        let mut private = PrivateKey::random(&mut OsRng, Algorithm::Ed25519).unwrap();
        private.set_comment("test@keyhold");
        private.write_openssh_file(&path, LineEnding::LF).unwrap();

        let key = load_private_key(&path).unwrap();
        assert_eq!(key.comment(), "test@keyhold");
        assert!(key.has_private());
        assert_eq!(key.identifier(), "ssh-ed25519");
        assert_eq!(
            key.encode_public_blob(),
            private.public_key().to_bytes().unwrap()
        );
    }

    #[test]
    fn test_missing_file() {
        assert!(load_private_key(Path::new("/nonexistent/id_ed25519")).is_err());
    }

    #[test]
    fn test_constraints_from_args() {
        let args = AddArgs {
            agent: AgentArgs { socket: None },
            files: vec![PathBuf::from("k")],
            confirm: true,
            lifetime: Some("10m".to_string()),
        };
        assert_eq!(
            constraints(&args).unwrap(),
            vec![Constraint::Lifetime(600), Constraint::Confirm]
        );
    }
}
