//! Run command - serve the agent in the foreground

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::agent::{AllowAnyPeer, Dispatcher, Server};
use crate::cli::args::RunArgs;
use crate::config::{ConfigFile, ExpandedConfig, parse_lifetime};
use crate::logging::JsonlWriter;
use crate::store::KeyStore;

/// Merge command-line overrides into the loaded configuration
fn resolve(args: &RunArgs, config_path: Option<PathBuf>) -> Result<ExpandedConfig> {
    let file = ConfigFile::load(config_path.as_deref()).context("Failed to load configuration")?;
    let mut config = file
        .config
        .expand()
        .context("Invalid configuration")?;

    if let Some(socket) = &args.socket {
        config.socket = socket.clone();
    }
    if let Some(log) = &args.log {
        config.log_path = Some(log.clone());
    }
    if let Some(lifetime) = &args.lifetime {
        config.default_lifetime = Some(parse_lifetime(lifetime)?);
    }
    if args.allow_other_users {
        config.require_same_user = false;
    }
    Ok(config)
}

fn build_dispatcher(config: &ExpandedConfig) -> Result<Dispatcher> {
    let mut dispatcher = Dispatcher::new(KeyStore::shared())
        .with_confirm(config.confirm.build_hook()?)
        .with_default_lifetime(config.default_lifetime);

    if let Some(log_path) = &config.log_path {
        if let Some(parent) = log_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let writer = JsonlWriter::new(log_path)
            .with_context(|| format!("Failed to open audit log {}", log_path.display()))?;
        info!(log = %log_path.display(), "JSONL audit logging enabled");
        dispatcher = dispatcher.with_audit(Arc::new(writer));
    }
    Ok(dispatcher)
}

/// Execute the run command
pub async fn execute(args: RunArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = resolve(&args, config_path)?;
    let dispatcher = Arc::new(build_dispatcher(&config)?);

    let mut server = Server::new(&config.socket, dispatcher);
    if !config.require_same_user {
        warn!("Accepting connections from every local user");
        server = server.with_authenticator(Arc::new(AllowAnyPeer));
    }
    server.bind().await?;

    // ssh-agent style export line
    println!(
        "SSH_AUTH_SOCK={}; export SSH_AUTH_SOCK;",
        config.socket.display()
    );
    info!(
        socket = %config.socket.display(),
        default_lifetime = ?config.default_lifetime,
        "Agent started. Press Ctrl+C to stop."
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
        }
        let _ = shutdown_tx.send(true);
    });

    server.run(shutdown_rx).await?;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}
