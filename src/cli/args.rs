//! Argument structures for CLI commands

use clap::Args;
use std::path::PathBuf;

/// Arguments for the `run` command
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Socket to listen on (overrides the config file)
    #[arg(short, long, value_name = "PATH")]
    pub socket: Option<PathBuf>,

    /// Path to JSONL audit log file
    #[arg(long, value_name = "PATH")]
    pub log: Option<PathBuf>,

    /// Lifetime for keys added without one, e.g. "8h"
    #[arg(short = 't', long, value_name = "DURATION")]
    pub lifetime: Option<String>,

    /// Accept connections from any local user
    #[arg(long)]
    pub allow_other_users: bool,
}

/// Which agent a client command talks to
#[derive(Args, Debug, Clone)]
pub struct AgentArgs {
    /// Agent socket
    #[arg(short = 'a', long = "agent", env = "SSH_AUTH_SOCK", value_name = "PATH")]
    pub socket: Option<PathBuf>,
}

/// Arguments for the `list` command
#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    #[command(flatten)]
    pub agent: AgentArgs,

    /// List SSH-1 RSA keys instead of SSH-2 keys
    #[arg(long)]
    pub ssh1: bool,

    /// Output format
    #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
    pub format: String,
}

/// Arguments for the `add` command
#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    #[command(flatten)]
    pub agent: AgentArgs,

    /// OpenSSH private key files
    #[arg(required = true, value_name = "FILE")]
    pub files: Vec<PathBuf>,

    /// Require confirmation before each use of the key
    #[arg(short, long)]
    pub confirm: bool,

    /// Remove the key after this long, e.g. "30m"
    #[arg(short = 't', long, value_name = "DURATION")]
    pub lifetime: Option<String>,
}

/// Arguments for the `remove` command
#[derive(Args, Debug, Clone)]
pub struct RemoveArgs {
    #[command(flatten)]
    pub agent: AgentArgs,

    /// OpenSSH public (or private) key files
    #[arg(required = true, value_name = "FILE")]
    pub files: Vec<PathBuf>,
}

/// Arguments for the `remove-all` command
#[derive(Args, Debug, Clone)]
pub struct RemoveAllArgs {
    #[command(flatten)]
    pub agent: AgentArgs,

    /// Remove SSH-1 RSA keys instead of SSH-2 keys
    #[arg(long)]
    pub ssh1: bool,
}

/// Arguments for the `lock` and `unlock` commands
#[derive(Args, Debug, Clone)]
pub struct LockArgs {
    #[command(flatten)]
    pub agent: AgentArgs,
}

/// Arguments for the `config` command
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Validate the configuration only
    #[arg(long)]
    pub validate: bool,

    /// Show the default configuration
    #[arg(long, conflicts_with = "validate")]
    pub show_default: bool,

    /// Show the search locations
    #[arg(long)]
    pub paths: bool,

    /// Output format
    #[arg(short, long, default_value = "toml", value_parser = ["toml", "json"])]
    pub format: String,
}

/// Arguments for the `completion` command
#[derive(Args, Debug, Clone)]
pub struct CompletionArgs {
    /// Target shell
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}
