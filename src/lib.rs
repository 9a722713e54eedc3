//! keyhold - SSH agent protocol engine
//!
//! Speaks both generations of the SSH agent protocol: the SSH-1 RSA
//! identity messages and the SSH-2 messages for RSA, DSA, ECDSA, Ed25519
//! and OpenSSH certificates. The same key model and codec back an
//! in-memory agent ([`agent::Dispatcher`], [`agent::Server`]) and a client
//! ([`agent::AgentClient`]) for talking to any compatible agent.

pub mod agent;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod error;
pub mod key;
pub mod logging;
pub mod protocol;
pub mod session;
pub mod store;
pub mod utils;

pub use error::{Error, Result};

/// Package version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name
pub const NAME: &str = env!("CARGO_PKG_NAME");
