//! Command implementations for the keyhold CLI

pub mod add;
pub mod completion;
pub mod config;
pub mod list;
pub mod lock;
pub mod remove;
pub mod run;
pub mod version;

use crate::agent::{AgentClient, AgentConnection, AgentSocket};
use crate::cli::args::AgentArgs;
use anyhow::{Context, Result};
use std::io::{BufRead, IsTerminal};
use zeroize::Zeroizing;

/// Connect to the agent named on the command line or by `SSH_AUTH_SOCK`
pub(crate) async fn connect(args: &AgentArgs) -> Result<AgentClient<AgentConnection>> {
    let socket = match &args.socket {
        Some(path) => AgentSocket::new(path),
        None => AgentSocket::from_env()?,
    };
    let connection = socket
        .connect()
        .await
        .with_context(|| format!("Cannot reach agent at {}", socket.socket_path().display()))?;
    Ok(AgentClient::new(connection))
}

/// Read a passphrase: hidden prompt on a terminal, one line from piped stdin
pub(crate) fn read_secret_line(prompt: &str) -> Result<Zeroizing<String>> {
    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        let secret = rpassword::prompt_password(prompt).context("Failed to read passphrase")?;
        return Ok(Zeroizing::new(secret));
    }
    eprint!("{}", prompt);
    read_piped_secret(stdin.lock())
}

fn read_piped_secret(mut input: impl BufRead) -> Result<Zeroizing<String>> {
    let mut line = Zeroizing::new(String::new());
    input
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    let trimmed = line.trim_end_matches(['\r', '\n']).len();
    line.truncate(trimmed);
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_piped_secret_strips_line_ending() {
        let secret = read_piped_secret(Cursor::new("hunter2\r\nnext line\n")).unwrap();
        assert_eq!(secret.as_str(), "hunter2");
    }

    #[test]
    fn test_read_piped_secret_empty_input() {
        let secret = read_piped_secret(Cursor::new("")).unwrap();
        assert!(secret.is_empty());
    }
}
