//! SSH Agent Protocol implementation
//!
//! This module implements the SSH agent protocol wire format as described in:
//! https://datatracker.ietf.org/doc/html/draft-miller-ssh-agent
//! plus the legacy SSH-1 messages still spoken by PuTTY-family clients.

pub mod blob;
pub mod codec;
pub mod message;

pub use blob::{BlobBuilder, BlobParser, Header};
pub use codec::{AgentCodec, FrameLength};
pub use message::{AgentMessage, MAX_MESSAGE_SIZE, MessageType};
