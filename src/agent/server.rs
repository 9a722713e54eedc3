//! Unix socket server in front of a [`Dispatcher`]
//!
//! Accepts connections, checks the peer's credentials and then answers
//! frames in order until the client disconnects.

use super::Dispatcher;
use super::hooks::{PeerAuthenticator, SameUser};
use crate::error::{Error, Result};
use crate::logging::LogEvent;
use crate::protocol::{AgentCodec, AgentMessage, FrameLength};
use crate::utils::socket;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

/// Agent server bound to one Unix socket
pub struct Server {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    dispatcher: Arc<Dispatcher>,
    authenticator: Arc<dyn PeerAuthenticator>,
    next_client: AtomicU64,
}

impl Server {
    /// Server that only admits peers running as the current user
    pub fn new<P: AsRef<Path>>(socket_path: P, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
            listener: None,
            dispatcher,
            authenticator: Arc::new(SameUser::current()),
            next_client: AtomicU64::new(1),
        }
    }

    pub fn with_authenticator(mut self, authenticator: Arc<dyn PeerAuthenticator>) -> Self {
        self.authenticator = authenticator;
        self
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Create the socket, replacing a stale one, and restrict it to the owner
    pub async fn bind(&mut self) -> Result<()> {
        socket::prepare_socket_path(&self.socket_path)?;

        let listener = UnixListener::bind(&self.socket_path).map_err(|e| {
            Error::Socket(format!(
                "Failed to bind to socket at {}: {}",
                self.socket_path.display(),
                e
            ))
        })?;
        socket::set_owner_only(&self.socket_path)?;

        info!(path = %self.socket_path.display(), "Agent listening");
        self.record(LogEvent::server_start(self.socket_display()));
        self.listener = Some(listener);
        Ok(())
    }

    /// Accept connections until `shutdown_rx` turns true
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) -> Result<()> {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| Error::Socket("Server is not bound".to_string()))?;

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Received shutdown signal, stopping server");
                        break;
                    }
                }

                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, _addr)) => self.spawn_connection(stream),
                        Err(e) => error!(error = %e, "Failed to accept connection"),
                    }
                }
            }
        }

        self.record(LogEvent::server_stop(self.socket_display()));
        Ok(())
    }

    fn spawn_connection(&self, stream: UnixStream) {
        let client_id = format!("client-{}", self.next_client.fetch_add(1, Ordering::Relaxed));
        let socket_display = self.socket_display();

        let peer = match socket::peer_credentials(&stream) {
            Ok(peer) => peer,
            Err(e) => {
                warn!(client_id = %client_id, error = %e, "Rejecting client");
                self.record(LogEvent::client_rejected(socket_display, e.to_string()));
                return;
            }
        };
        if !self.authenticator.authorize(&peer) {
            warn!(client_id = %client_id, uid = peer.uid, pid = ?peer.pid, "Rejecting client from another user");
            self.record(
                LogEvent::client_rejected(socket_display, format!("uid {}", peer.uid))
                    .with_client_id(client_id)
                    .with_peer_pid(peer.pid),
            );
            return;
        }

        trace!(client_id = %client_id, pid = ?peer.pid, "Accepted client connection");
        self.record(
            LogEvent::client_connect(socket_display.clone(), client_id.clone()).with_peer_pid(peer.pid),
        );

        let dispatcher = Arc::clone(&self.dispatcher);
        tokio::spawn(async move {
            let outcome = serve_stream(stream, Arc::clone(&dispatcher)).await;
            if let Err(e) = &outcome {
                debug!(client_id = %client_id, error = %e, "Connection ended with error");
            }
            if let Some(audit) = dispatcher.audit() {
                if let Err(e) = outcome {
                    audit.record(&LogEvent::error(e.to_string()).with_client_id(client_id.clone()));
                }
                audit.record(
                    &LogEvent::client_disconnect(socket_display, client_id).with_peer_pid(peer.pid),
                );
            }
        });
    }

    fn record(&self, event: LogEvent) {
        if let Some(audit) = self.dispatcher.audit() {
            audit.record(&event);
        }
    }

    fn socket_display(&self) -> String {
        self.socket_path.display().to_string()
    }

    fn cleanup(&self) {
        if self.listener.is_none() {
            return;
        }
        match std::fs::remove_file(&self.socket_path) {
            Ok(()) => debug!(path = %self.socket_path.display(), "Removed socket file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %self.socket_path.display(),
                error = %e,
                "Failed to remove socket file during cleanup"
            ),
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Answer requests on one connection until EOF.
///
/// A zero-length frame gets FAILURE and the loop goes on. An oversized
/// frame gets FAILURE and ends the connection since its body cannot be
/// skipped reliably.
pub async fn serve_stream<S>(mut stream: S, dispatcher: Arc<Dispatcher>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let failure = AgentMessage::failure().encode();
    loop {
        let Some(len) = AgentCodec::read_length(&mut stream).await? else {
            return Ok(());
        };
        let frame = match FrameLength::of(len) {
            FrameLength::Empty => {
                debug!("Zero-length frame");
                AgentCodec::write_frame(&mut stream, &failure).await?;
                continue;
            }
            FrameLength::Oversized(n) => {
                AgentCodec::write_frame(&mut stream, &failure).await?;
                return Err(Error::Framing(format!("Message too large: {} bytes", n)));
            }
            FrameLength::Body(n) => AgentCodec::read_body(&mut stream, n).await?,
        };

        let dispatcher = Arc::clone(&dispatcher);
        let reply = tokio::task::spawn_blocking(move || dispatcher.dispatch_bytes(&frame))
            .await
            .map_err(|e| Error::Other(format!("Dispatch task failed: {}", e)))?;
        AgentCodec::write_frame(&mut stream, &reply).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::hooks::AllowAnyPeer;
    use crate::protocol::MAX_MESSAGE_SIZE;
    use crate::store::KeyStore;
    use tempfile::tempdir;
    use tokio_test::io::Builder;

    const LIST: [u8; 5] = [0, 0, 0, 1, 11];
    const EMPTY_LIST: [u8; 9] = [0, 0, 0, 5, 12, 0, 0, 0, 0];
    const FAILURE: [u8; 5] = [0, 0, 0, 1, 5];

    fn dispatcher() -> Arc<Dispatcher> {
        Arc::new(Dispatcher::new(KeyStore::shared()))
    }

    #[tokio::test]
    async fn test_serve_sequential_requests() {
        let stream = Builder::new()
            .read(&LIST)
            .write(&EMPTY_LIST)
            .read(&LIST)
            .write(&EMPTY_LIST)
            .build();
        serve_stream(stream, dispatcher()).await.unwrap();
    }

    #[tokio::test]
    async fn test_zero_length_frame_keeps_connection() {
        let stream = Builder::new()
            .read(&[0, 0, 0, 0])
            .write(&FAILURE)
            .read(&LIST)
            .write(&EMPTY_LIST)
            .build();
        serve_stream(stream, dispatcher()).await.unwrap();
    }

    #[tokio::test]
    async fn test_oversized_frame_closes_connection() {
        let stream = Builder::new()
            .read(&(MAX_MESSAGE_SIZE + 1).to_be_bytes())
            .write(&FAILURE)
            .build();
        let err = serve_stream(stream, dispatcher()).await.unwrap_err();
        assert!(matches!(err, Error::Framing(_)));
    }

    #[tokio::test]
    async fn test_unknown_type_gets_failure() {
        let stream = Builder::new()
            .read(&[0, 0, 0, 1, 99])
            .write(&FAILURE)
            .build();
        serve_stream(stream, dispatcher()).await.unwrap();
    }

    #[tokio::test]
    async fn test_bind_sets_permissions_and_cleans_up() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("agent.sock");
        std::fs::write(&socket_path, b"stale").unwrap();

        {
            let mut server = Server::new(&socket_path, dispatcher())
                .with_authenticator(Arc::new(AllowAnyPeer));
            server.bind().await.unwrap();
            let mode = std::fs::metadata(&socket_path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
        assert!(!socket_path.exists());
    }

    #[tokio::test]
    async fn test_run_without_bind() {
        let server = Server::new("/tmp/keyhold-unbound.sock", dispatcher());
        let (_tx, rx) = watch::channel(false);
        assert!(matches!(server.run(rx).await, Err(Error::Socket(_))));
    }
}
