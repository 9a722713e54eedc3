//! Agent client: builds requests, sends them through a [`Transport`] and
//! interprets the replies

use super::events::KeyEvents;
use super::transport::Transport;
use crate::crypto::{CryptoProvider, SoftwareCrypto};
use crate::error::{Error, Result};
use crate::key::{Constraint, Key, KeyData, SshVersion};
use crate::protocol::{AgentMessage, BlobBuilder, MessageType};
use crate::session::SessionId;
use std::sync::Arc;
use tracing::{debug, warn};

/// Only response type defined for SSH-1 challenges
const SSH1_RESPONSE_TYPE_MD5: u32 = 1;

/// Length of an SSH-1 challenge response
const SSH1_RESPONSE_LEN: usize = 16;

pub struct AgentClient<T: Transport> {
    transport: T,
    session: SessionId,
    crypto: Arc<dyn CryptoProvider>,
    events: KeyEvents,
}

impl<T: Transport> AgentClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            session: SessionId::for_current_process(),
            crypto: Arc::new(SoftwareCrypto),
            events: KeyEvents::new(),
        }
    }

    /// Session id sent with SSH-1 challenges
    pub fn with_session(mut self, session: SessionId) -> Self {
        self.session = session;
        self
    }

    pub fn with_crypto(mut self, crypto: Arc<dyn CryptoProvider>) -> Self {
        self.crypto = crypto;
        self
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    /// Notifications for keys this client added or removed
    pub fn events(&self) -> &KeyEvents {
        &self.events
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    async fn call(&mut self, request: AgentMessage) -> Result<AgentMessage> {
        debug!(msg_type = request.msg_type.as_str(), "Sending request");
        let reply = self.transport.send(request.encode()).await?;
        let reply = AgentMessage::from_frame(&reply)?;
        debug!(msg_type = reply.msg_type.as_str(), "Received reply");
        Ok(reply)
    }

    async fn call_expect_success(&mut self, request: AgentMessage) -> Result<()> {
        self.call(request).await?.expect_type(MessageType::Success)
    }

    /// Keys the agent holds for one protocol generation, public parts only
    pub async fn list_keys(&mut self, version: SshVersion) -> Result<Vec<Key>> {
        let (request, answer) = match version {
            SshVersion::Ssh1 => (
                MessageType::Ssh1RequestRsaIdentities,
                MessageType::Ssh1RsaIdentitiesAnswer,
            ),
            SshVersion::Ssh2 => (MessageType::RequestIdentities, MessageType::IdentitiesAnswer),
        };
        let reply = self.call(AgentMessage::new(request, Default::default())).await?;
        reply.expect_type(answer)?;

        let mut p = reply.parser();
        let count = p.read_u32()?;
        let mut keys = Vec::new();
        for _ in 0..count {
            match version {
                SshVersion::Ssh1 => {
                    let mut key = Key::decode_ssh1_public(&mut p)?;
                    key.set_comment(p.read_string()?);
                    keys.push(key);
                }
                SshVersion::Ssh2 => {
                    let blob = p.read_blob()?;
                    let comment = p.read_string()?;
                    match Key::decode_ssh2_public_blob(blob) {
                        Ok(mut key) => {
                            key.set_comment(comment);
                            keys.push(key);
                        }
                        Err(e) => warn!(comment = %comment, error = %e, "Skipping undecodable key"),
                    }
                }
            }
        }
        Ok(keys)
    }

    /// Add a key together with the constraints it carries
    pub async fn add_key(&mut self, key: &Key) -> Result<()> {
        let constraints = key.constraints().to_vec();
        self.add_key_with_constraints(key, &constraints).await
    }

    /// Add a key with exactly `constraints`; those stored on the key are ignored
    pub async fn add_key_with_constraints(
        &mut self,
        key: &Key,
        constraints: &[Constraint],
    ) -> Result<()> {
        let mut b = BlobBuilder::new();
        b.add_bytes(&key.encode_private_blob()?);
        b.add_string(key.comment());
        for constraint in constraints {
            constraint.encode(&mut b);
        }
        let msg_type = match (key.version(), constraints.is_empty()) {
            (SshVersion::Ssh1, true) => MessageType::Ssh1AddRsaIdentity,
            (SshVersion::Ssh1, false) => MessageType::Ssh1AddRsaIdConstrained,
            (SshVersion::Ssh2, true) => MessageType::AddIdentity,
            (SshVersion::Ssh2, false) => MessageType::AddIdConstrained,
        };

        self.call_expect_success(AgentMessage::new(msg_type, b.freeze()))
            .await?;
        self.events.added(key);
        Ok(())
    }

    pub async fn remove_key(&mut self, key: &Key) -> Result<()> {
        let mut b = BlobBuilder::new();
        let msg_type = match key.version() {
            SshVersion::Ssh1 => {
                b.add_bytes(&key.encode_public_blob());
                MessageType::Ssh1RemoveRsaIdentity
            }
            SshVersion::Ssh2 => {
                b.add_blob(&key.encode_public_blob());
                MessageType::RemoveIdentity
            }
        };

        self.call_expect_success(AgentMessage::new(msg_type, b.freeze()))
            .await?;
        self.events.removed(key);
        Ok(())
    }

    pub async fn remove_all_keys(&mut self, version: SshVersion) -> Result<()> {
        // The reply does not say what was removed, so ask first
        let listed = if self.events.has_subscribers() {
            self.list_keys(version).await?
        } else {
            Vec::new()
        };

        let msg_type = match version {
            SshVersion::Ssh1 => MessageType::Ssh1RemoveAllRsaIdentities,
            SshVersion::Ssh2 => MessageType::RemoveAllIdentities,
        };
        self.call_expect_success(AgentMessage::new(msg_type, Default::default()))
            .await?;
        for key in &listed {
            self.events.removed(key);
        }
        Ok(())
    }

    /// Sign `data` (SSH-2) or answer a challenge over `data` (SSH-1).
    ///
    /// SSH-2 returns the encoded signature blob; SSH-1 returns the 16-byte
    /// challenge response.
    pub async fn sign_request(&mut self, key: &Key, data: &[u8]) -> Result<Vec<u8>> {
        self.sign_request_with_flags(key, data, 0).await
    }

    pub async fn sign_request_with_flags(
        &mut self,
        key: &Key,
        data: &[u8],
        flags: u32,
    ) -> Result<Vec<u8>> {
        match key.data() {
            KeyData::Ssh1Rsa { public, .. } => {
                let challenge = self.crypto.encrypt_public(public, data)?;
                let mut b = BlobBuilder::new();
                b.add_bytes(&key.encode_public_blob());
                b.add_ssh1_bigint(&challenge);
                b.add_bytes(self.session.as_bytes());
                b.add_u32(SSH1_RESPONSE_TYPE_MD5);

                let reply = self
                    .call(AgentMessage::new(MessageType::Ssh1RsaChallenge, b.freeze()))
                    .await?;
                reply.expect_type(MessageType::Ssh1RsaResponse)?;
                Ok(reply.parser().read_bytes(SSH1_RESPONSE_LEN)?.to_vec())
            }
            _ => {
                let mut b = BlobBuilder::new();
                b.add_blob(&key.encode_public_blob());
                b.add_blob(data);
                b.add_u32(flags);

                let reply = self
                    .call(AgentMessage::new(MessageType::SignRequest, b.freeze()))
                    .await?;
                reply.expect_type(MessageType::SignResponse)?;
                let signature = reply.parser().read_blob()?.to_vec();
                if signature.is_empty() {
                    return Err(Error::Protocol("Agent returned an empty signature".to_string()));
                }
                Ok(signature)
            }
        }
    }

    pub async fn lock(&mut self, passphrase: &[u8]) -> Result<()> {
        self.passphrase_request(MessageType::Lock, passphrase).await
    }

    pub async fn unlock(&mut self, passphrase: &[u8]) -> Result<()> {
        self.passphrase_request(MessageType::Unlock, passphrase).await
    }

    async fn passphrase_request(&mut self, msg_type: MessageType, passphrase: &[u8]) -> Result<()> {
        let mut b = BlobBuilder::new();
        b.add_blob(passphrase);
        self.call_expect_success(AgentMessage::new(msg_type, b.freeze()))
            .await
    }
}
