//! Injected policy hooks: use confirmation and peer authentication

use crate::error::{Error, Result};
use crate::key::Key;
use std::fmt;
use std::process::{Command, Stdio};
use tracing::{debug, warn};

/// Key operation that needs the user's approval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Sign,
    /// SSH-1 challenge decryption
    Challenge,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Sign => write!(f, "sign"),
            Operation::Challenge => write!(f, "challenge"),
        }
    }
}

/// Asks the user whether a key carrying the confirm constraint may be used.
///
/// May block for as long as the user takes to answer; the dispatcher calls
/// it without holding the key store lock.
pub trait ConfirmHook: Send + Sync {
    fn confirm(&self, key: &Key, operation: Operation) -> bool;
}

impl<F> ConfirmHook for F
where
    F: Fn(&Key, Operation) -> bool + Send + Sync,
{
    fn confirm(&self, key: &Key, operation: Operation) -> bool {
        self(key, operation)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl ConfirmHook for AllowAll {
    fn confirm(&self, _key: &Key, _operation: Operation) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAll;

impl ConfirmHook for DenyAll {
    fn confirm(&self, _key: &Key, _operation: Operation) -> bool {
        false
    }
}

/// Runs an external program and approves when it exits successfully.
///
/// The program gets `KEYHOLD_OPERATION`, `KEYHOLD_FINGERPRINT`,
/// `KEYHOLD_COMMENT` and `KEYHOLD_KEY_TYPE` in its environment.
#[derive(Debug, Clone)]
pub struct CommandConfirm {
    program: String,
    args: Vec<String>,
}

impl CommandConfirm {
    /// Parse a shell-style command line
    pub fn parse(command: &str) -> Result<Self> {
        let mut words = shlex::split(command)
            .ok_or_else(|| Error::Config(format!("Cannot parse confirm command: {}", command)))?
            .into_iter();
        let program = words
            .next()
            .ok_or_else(|| Error::Config("Confirm command is empty".to_string()))?;
        Ok(Self {
            program,
            args: words.collect(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl ConfirmHook for CommandConfirm {
    fn confirm(&self, key: &Key, operation: Operation) -> bool {
        let status = Command::new(&self.program)
            .args(&self.args)
            .env("KEYHOLD_OPERATION", operation.to_string())
            .env("KEYHOLD_FINGERPRINT", key.sha256_fingerprint())
            .env("KEYHOLD_COMMENT", key.comment())
            .env("KEYHOLD_KEY_TYPE", key.identifier())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .status();
        match status {
            Ok(status) => {
                debug!(program = %self.program, %status, "Confirm command finished");
                status.success()
            }
            Err(e) => {
                warn!(program = %self.program, error = %e, "Failed to run confirm command");
                false
            }
        }
    }
}

/// Identity of the process on the other end of a local socket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerCredentials {
    pub uid: u32,
    pub gid: u32,
    pub pid: Option<i32>,
}

/// Decides whether a connecting peer may talk to the agent at all
pub trait PeerAuthenticator: Send + Sync {
    fn authorize(&self, peer: &PeerCredentials) -> bool;
}

/// Accepts only peers running as the given user
#[derive(Debug, Clone, Copy)]
pub struct SameUser {
    uid: u32,
}

impl SameUser {
    pub fn new(uid: u32) -> Self {
        Self { uid }
    }

    /// Restrict to the user this process runs as
    #[cfg(unix)]
    pub fn current() -> Self {
        // SAFETY: getuid has no preconditions and cannot fail
        Self::new(unsafe { libc::getuid() })
    }
}

impl PeerAuthenticator for SameUser {
    fn authorize(&self, peer: &PeerCredentials) -> bool {
        peer.uid == self.uid
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAnyPeer;

impl PeerAuthenticator for AllowAnyPeer {
    fn authorize(&self, _peer: &PeerCredentials) -> bool {
        true
    }
}
