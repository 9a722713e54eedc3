//! Request/reply transports used by [`AgentClient`](super::AgentClient)
//!
//! - `AgentSocket` / `AgentConnection`: a running agent behind a Unix socket
//! - `LocalTransport`: an in-process [`Dispatcher`]

use super::Dispatcher;
use crate::error::{Error, Result};
use crate::protocol::AgentCodec;
use bytes::Bytes;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UnixStream;
use tracing::{debug, trace};

/// Carries one framed request to an agent and returns its framed reply
pub trait Transport: Send {
    /// `request` and the returned reply both include the length prefix
    fn send(&mut self, request: Bytes) -> impl Future<Output = Result<Bytes>> + Send;
}

/// Transport that answers from a dispatcher in the same process
#[derive(Clone)]
pub struct LocalTransport {
    dispatcher: Arc<Dispatcher>,
}

impl LocalTransport {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }
}

impl Transport for LocalTransport {
    fn send(&mut self, request: Bytes) -> impl Future<Output = Result<Bytes>> + Send {
        std::future::ready(Ok(self.dispatcher.dispatch_bytes(&request)))
    }
}

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Address of an agent listening on a Unix socket
#[derive(Debug, Clone)]
pub struct AgentSocket {
    socket_path: PathBuf,
}

impl AgentSocket {
    pub fn new<P: AsRef<Path>>(socket_path: P) -> Self {
        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
        }
    }

    /// Agent named by `SSH_AUTH_SOCK`
    pub fn from_env() -> Result<Self> {
        let socket_path = std::env::var("SSH_AUTH_SOCK").map_err(|_| {
            Error::AgentNotAvailable("SSH_AUTH_SOCK environment variable not set".to_string())
        })?;

        let path = PathBuf::from(&socket_path);
        if !path.exists() {
            return Err(Error::AgentNotAvailable(format!(
                "SSH agent socket does not exist: {}",
                socket_path
            )));
        }

        debug!(socket_path = %socket_path, "Using agent from SSH_AUTH_SOCK");
        Ok(Self::new(path))
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub async fn connect(&self) -> Result<AgentConnection> {
        let stream = tokio::time::timeout(CONNECT_TIMEOUT, UnixStream::connect(&self.socket_path))
            .await
            .map_err(|_| {
                Error::AgentNotAvailable(format!(
                    "Connection to agent at {} timed out after {:?}",
                    self.socket_path.display(),
                    CONNECT_TIMEOUT
                ))
            })?
            .map_err(|e| {
                Error::AgentNotAvailable(format!(
                    "Failed to connect to agent at {}: {}",
                    self.socket_path.display(),
                    e
                ))
            })?;

        trace!(socket_path = %self.socket_path.display(), "Connected to agent");
        Ok(AgentConnection { stream })
    }
}

/// Open connection to an agent; requests are answered in order
#[derive(Debug)]
pub struct AgentConnection {
    stream: UnixStream,
}

impl AgentConnection {
    pub fn from_stream(stream: UnixStream) -> Self {
        Self { stream }
    }
}

impl Transport for AgentConnection {
    fn send(&mut self, request: Bytes) -> impl Future<Output = Result<Bytes>> + Send {
        async move {
            let (mut reader, mut writer) = self.stream.split();
            AgentCodec::write_frame(&mut writer, &request).await?;
            let reply = AgentCodec::read_frame(&mut reader)
                .await?
                .ok_or_else(|| Error::Protocol("Agent closed connection unexpectedly".to_string()))?;
            trace!(len = reply.len(), "Received reply from agent");
            Ok(reply)
        }
    }
}
