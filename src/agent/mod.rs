//! Agent roles built on the protocol codec and the key store
//!
//! - `Dispatcher`: answers requests against a [`KeyStore`](crate::store::KeyStore)
//! - `AgentClient`: issues requests through a `Transport`
//! - `Server`: serves a dispatcher on a Unix socket
//!
//! Policy is injected through the [`ConfirmHook`] and [`PeerAuthenticator`]
//! capabilities; key changes are published as [`KeyEvent`]s.

mod client;
mod dispatcher;
mod events;
mod hooks;
mod server;
mod transport;

pub use client::AgentClient;
pub use dispatcher::Dispatcher;
pub use events::{KeyEvent, KeyEvents};
pub use hooks::{
    AllowAll, AllowAnyPeer, CommandConfirm, ConfirmHook, DenyAll, Operation, PeerAuthenticator,
    PeerCredentials, SameUser,
};
pub use server::{Server, serve_stream};
pub use transport::{AgentConnection, AgentSocket, LocalTransport, Transport};
