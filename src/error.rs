//! Error types for keyhold

use thiserror::Error;

/// Main error type for keyhold
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed length prefix, message type or truncated buffer
    #[error("Framing error: {0}")]
    Framing(String),

    #[error("Unsupported SSH version: {0}")]
    UnsupportedVersion(String),

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The peer answered SSH_AGENT_FAILURE, or a local precondition
    /// (locked store, unknown key, wrong passphrase) prevented success
    #[error("Agent failure: {0}")]
    AgentFailure(String),

    #[error("Constraint rejected: {0}")]
    ConstraintRejected(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("SSH key error: {0}")]
    SshKey(#[from] ssh_key::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Agent not available: {0}")]
    AgentNotAvailable(String),

    #[error("Socket error: {0}")]
    Socket(String),

    #[error("{0}")]
    Other(String),
}

impl From<rsa::Error> for Error {
    fn from(e: rsa::Error) -> Self {
        Error::Crypto(e.to_string())
    }
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;
