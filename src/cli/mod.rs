//! Command-line interface for keyhold

pub mod args;
pub mod commands;
pub mod exit_code;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use args::{
    AddArgs, CompletionArgs, ConfigArgs, ListArgs, LockArgs, RemoveAllArgs, RemoveArgs, RunArgs,
};

/// SSH agent with an in-memory key store
#[derive(Parser, Debug)]
#[command(name = "keyhold")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file path
    #[arg(long, global = true, env = "KEYHOLD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the agent in the foreground
    Run(RunArgs),

    /// List keys held by the agent
    List(ListArgs),

    /// Add private keys to the agent
    Add(AddArgs),

    /// Remove keys from the agent
    Remove(RemoveArgs),

    /// Remove every key from the agent
    RemoveAll(RemoveAllArgs),

    /// Lock the agent with a passphrase read from stdin
    Lock(LockArgs),

    /// Unlock the agent with a passphrase read from stdin
    Unlock(LockArgs),

    /// Show or validate configuration
    Config(ConfigArgs),

    /// Show version information
    Version,

    /// Generate shell completions
    Completion(CompletionArgs),
}
