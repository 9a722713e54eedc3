//! Server-side request dispatcher
//!
//! Turns one request frame into exactly one reply frame. The dispatcher
//! is synchronous and keeps no per-connection state; every error is caught
//! here and answered with SSH_AGENT_FAILURE.

use super::events::KeyEvents;
use super::hooks::{ConfirmHook, DenyAll, Operation};
use crate::crypto::{CryptoProvider, SoftwareCrypto};
use crate::error::{Error, Result};
use crate::key::{Constraint, Fingerprint, Key, SshVersion, constraint};
use crate::logging::{Decision, JsonlWriter, LogEvent, LogEventKind};
use crate::protocol::{AgentMessage, BlobBuilder, BlobParser, MessageType};
use crate::session::SessionId;
use crate::store::{KeyStore, SharedKeyStore};
use bytes::Bytes;
use std::sync::{Arc, MutexGuard};
use tracing::{debug, info, trace};

/// Only response type defined for SSH-1 challenges (MD5 of plaintext and session id)
const SSH1_RESPONSE_TYPE_MD5: u32 = 1;

/// Answers agent requests against a shared key store
pub struct Dispatcher {
    store: SharedKeyStore,
    crypto: Arc<dyn CryptoProvider>,
    confirm: Arc<dyn ConfirmHook>,
    events: KeyEvents,
    default_lifetime: Option<u32>,
    audit: Option<Arc<JsonlWriter>>,
}

impl Dispatcher {
    /// Dispatcher with software crypto and a confirm hook that always declines
    pub fn new(store: SharedKeyStore) -> Self {
        Self {
            store,
            crypto: Arc::new(SoftwareCrypto),
            confirm: Arc::new(DenyAll),
            events: KeyEvents::new(),
            default_lifetime: None,
            audit: None,
        }
    }

    pub fn with_crypto(mut self, crypto: Arc<dyn CryptoProvider>) -> Self {
        self.crypto = crypto;
        self
    }

    pub fn with_confirm(mut self, confirm: Arc<dyn ConfirmHook>) -> Self {
        self.confirm = confirm;
        self
    }

    pub fn with_events(mut self, events: KeyEvents) -> Self {
        self.events = events;
        self
    }

    /// Lifetime in seconds applied to keys added without one
    pub fn with_default_lifetime(mut self, secs: Option<u32>) -> Self {
        self.default_lifetime = secs;
        self
    }

    pub fn with_audit(mut self, writer: Arc<JsonlWriter>) -> Self {
        self.audit = Some(writer);
        self
    }

    pub fn store(&self) -> &SharedKeyStore {
        &self.store
    }

    pub fn events(&self) -> &KeyEvents {
        &self.events
    }

    pub fn audit(&self) -> Option<&Arc<JsonlWriter>> {
        self.audit.as_ref()
    }

    /// Answer one complete frame (length prefix included). Never fails.
    pub fn dispatch_bytes(&self, frame: &[u8]) -> Bytes {
        let reply = match AgentMessage::from_frame(frame) {
            Ok(request) => self.dispatch(&request),
            Err(e) => {
                debug!(error = %e, "Malformed request frame");
                AgentMessage::failure()
            }
        };
        reply.encode()
    }

    /// Answer one decoded request. Never fails.
    pub fn dispatch(&self, request: &AgentMessage) -> AgentMessage {
        trace!(msg_type = request.msg_type.as_str(), "Dispatching request");
        match self.handle(request) {
            Ok(reply) => reply,
            Err(e) => {
                debug!(msg_type = request.msg_type.as_str(), error = %e, "Request failed");
                AgentMessage::failure()
            }
        }
    }

    fn handle(&self, request: &AgentMessage) -> Result<AgentMessage> {
        let mut p = request.parser();
        match request.msg_type {
            MessageType::Ssh1RequestRsaIdentities => self.request_identities(SshVersion::Ssh1),
            MessageType::RequestIdentities => self.request_identities(SshVersion::Ssh2),
            MessageType::Ssh1RsaChallenge => self.rsa_challenge(&mut p),
            MessageType::SignRequest => self.sign_request(&mut p),
            MessageType::Ssh1AddRsaIdentity => self.add_identity(SshVersion::Ssh1, false, &mut p),
            MessageType::Ssh1AddRsaIdConstrained => {
                self.add_identity(SshVersion::Ssh1, true, &mut p)
            }
            MessageType::AddIdentity => self.add_identity(SshVersion::Ssh2, false, &mut p),
            MessageType::AddIdConstrained => self.add_identity(SshVersion::Ssh2, true, &mut p),
            MessageType::Ssh1RemoveRsaIdentity => self.remove_identity(SshVersion::Ssh1, &mut p),
            MessageType::RemoveIdentity => self.remove_identity(SshVersion::Ssh2, &mut p),
            MessageType::Ssh1RemoveAllRsaIdentities => self.remove_all(SshVersion::Ssh1),
            MessageType::RemoveAllIdentities => self.remove_all(SshVersion::Ssh2),
            MessageType::Lock => self.lock(&mut p),
            MessageType::Unlock => self.unlock(&mut p),
            other => Err(Error::Protocol(format!(
                "Unsupported request {} ({})",
                other.as_str(),
                u8::from(other)
            ))),
        }
    }

    fn lock_store(&self) -> Result<MutexGuard<'_, KeyStore>> {
        self.store
            .lock()
            .map_err(|_| Error::Other("Key store lock poisoned".to_string()))
    }

    fn record(&self, event: LogEvent) {
        if let Some(audit) = &self.audit {
            audit.record(&event);
        }
    }

    fn check_confirm(&self, key: &Key, operation: Operation) -> Result<()> {
        if !constraint::requires_confirm(key.constraints()) {
            return Ok(());
        }
        // Store lock is not held here; the hook may block on the user
        if self.confirm.confirm(key, operation) {
            Ok(())
        } else {
            Err(Error::ConstraintRejected(format!(
                "{} with {} declined",
                operation,
                key.sha256_fingerprint()
            )))
        }
    }

    fn request_identities(&self, version: SshVersion) -> Result<AgentMessage> {
        let keys = self.lock_store()?.list(version)?;

        let mut b = BlobBuilder::new();
        b.add_u32(keys.len() as u32);
        for key in &keys {
            match version {
                SshVersion::Ssh1 => b.add_bytes(&key.encode_public_blob()),
                SshVersion::Ssh2 => b.add_blob(&key.encode_public_blob()),
            }
            b.add_string(key.comment());
        }
        debug!(%version, count = keys.len(), "Listing identities");
        self.record(LogEvent::new(LogEventKind::IdentitiesRequest).with_key_count(keys.len()));

        let reply_type = match version {
            SshVersion::Ssh1 => MessageType::Ssh1RsaIdentitiesAnswer,
            SshVersion::Ssh2 => MessageType::IdentitiesAnswer,
        };
        Ok(AgentMessage::new(reply_type, b.freeze()))
    }

    fn sign_request(&self, p: &mut BlobParser<'_>) -> Result<AgentMessage> {
        let key_blob = p.read_blob()?;
        let data = p.read_blob()?;
        let flags = if p.is_empty() { 0 } else { p.read_u32()? };

        let key = self.lock_store()?.get(&Fingerprint::of(key_blob))?;
        let outcome = self
            .check_confirm(&key, Operation::Sign)
            .and_then(|()| self.crypto.sign(key.data(), flags, data));

        self.record(use_event(LogEventKind::SignRequest, &key, &outcome));
        let signature = outcome?;
        info!(
            fingerprint = %key.sha256_fingerprint(),
            algorithm = %signature.algorithm,
            "Signed request"
        );

        let mut b = BlobBuilder::new();
        b.add_blob(&signature.encode());
        Ok(AgentMessage::new(MessageType::SignResponse, b.freeze()))
    }

    fn rsa_challenge(&self, p: &mut BlobParser<'_>) -> Result<AgentMessage> {
        let public = Key::decode_ssh1_public(p)?;
        let challenge = p.read_ssh1_bigint()?;
        let session_id: [u8; 16] = p
            .read_bytes(16)?
            .try_into()
            .map_err(|_| Error::Framing("Session id must be 16 bytes".to_string()))?;
        let response_type = p.read_u32()?;
        if response_type != SSH1_RESPONSE_TYPE_MD5 {
            return Err(Error::UnsupportedVersion(format!(
                "SSH-1 response type {}",
                response_type
            )));
        }

        let key = self.lock_store()?.get(&public.fingerprint())?;
        let outcome = self
            .check_confirm(&key, Operation::Challenge)
            .and_then(|()| self.crypto.decrypt_private(key.data(), challenge))
            .and_then(|plaintext| {
                SessionId::from_bytes(session_id).challenge_response(&plaintext)
            });

        self.record(use_event(LogEventKind::ChallengeRequest, &key, &outcome));
        let response = outcome?;

        let mut b = BlobBuilder::new();
        b.add_bytes(&response);
        Ok(AgentMessage::new(MessageType::Ssh1RsaResponse, b.freeze()))
    }

    fn add_identity(
        &self,
        version: SshVersion,
        constrained: bool,
        p: &mut BlobParser<'_>,
    ) -> Result<AgentMessage> {
        let mut key = match version {
            SshVersion::Ssh1 => Key::decode_ssh1_private(p)?,
            SshVersion::Ssh2 => Key::decode_ssh2_private(p)?,
        };
        key.set_comment(p.read_string()?);

        let mut constraints = if constrained {
            Constraint::decode_all(p)?
        } else {
            Vec::new()
        };
        if let (None, Some(secs)) = (constraint::lifetime(&constraints), self.default_lifetime) {
            constraints.push(Constraint::Lifetime(secs));
        }
        let key = key.with_constraints(constraints);

        self.lock_store()?.add(key.clone())?;
        info!(
            fingerprint = %key.sha256_fingerprint(),
            comment = key.comment(),
            key_type = %key.identifier(),
            "Key added"
        );
        self.record(LogEvent::key_added(&key));
        self.events.added(&key);
        Ok(AgentMessage::success())
    }

    fn remove_identity(&self, version: SshVersion, p: &mut BlobParser<'_>) -> Result<AgentMessage> {
        let fingerprint = match version {
            SshVersion::Ssh1 => Key::decode_ssh1_public(p)?.fingerprint(),
            SshVersion::Ssh2 => Fingerprint::of(p.read_blob()?),
        };

        let removed = self.lock_store()?.remove(&fingerprint)?;
        info!(fingerprint = %removed.sha256_fingerprint(), "Key removed");
        self.record(LogEvent::key_removed(&removed));
        self.events.removed(&removed);
        Ok(AgentMessage::success())
    }

    fn remove_all(&self, version: SshVersion) -> Result<AgentMessage> {
        let removed = self.lock_store()?.remove_all(version)?;
        info!(%version, count = removed.len(), "All keys removed");
        for key in &removed {
            self.record(LogEvent::key_removed(key));
            self.events.removed(key);
        }
        Ok(AgentMessage::success())
    }

    fn lock(&self, p: &mut BlobParser<'_>) -> Result<AgentMessage> {
        let passphrase = zeroize::Zeroizing::new(p.read_blob()?.to_vec());
        let outcome = self.lock_store()?.lock(&passphrase);
        self.record(gate_event(LogEventKind::Lock, &outcome));
        outcome?;
        info!("Agent locked");
        Ok(AgentMessage::success())
    }

    fn unlock(&self, p: &mut BlobParser<'_>) -> Result<AgentMessage> {
        let passphrase = zeroize::Zeroizing::new(p.read_blob()?.to_vec());
        let outcome = self.lock_store()?.unlock(&passphrase);
        self.record(gate_event(LogEventKind::Unlock, &outcome));
        outcome?;
        info!("Agent unlocked");
        Ok(AgentMessage::success())
    }
}

fn use_event<T>(kind: LogEventKind, key: &Key, outcome: &Result<T>) -> LogEvent {
    let event = LogEvent::new(kind)
        .with_key(key)
        .with_decision(Decision::from_success(outcome.is_ok()));
    match outcome {
        Ok(_) => event,
        Err(e) => event.with_reason(e.to_string()),
    }
}

fn gate_event(kind: LogEventKind, outcome: &Result<()>) -> LogEvent {
    let event = LogEvent::new(kind).with_decision(Decision::from_success(outcome.is_ok()));
    match outcome {
        Ok(()) => event,
        Err(e) => event.with_reason(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::events::KeyEvent;
    use crate::crypto::tests::{ed25519_key_data, rsa_key_data};
    use crate::crypto::{SSH_AGENT_RSA_SHA2_512, SignatureBlob};
    use crate::key::KeyData;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(KeyStore::shared())
    }

    fn request(msg_type: MessageType, body: BlobBuilder) -> AgentMessage {
        AgentMessage::new(msg_type, body.freeze())
    }

    fn add_request(key: &Key, comment: &str, constraints: &[Constraint]) -> AgentMessage {
        let mut b = BlobBuilder::new();
        b.add_bytes(&key.encode_private_blob().unwrap());
        b.add_string(comment);
        for c in constraints {
            c.encode(&mut b);
        }
        let msg_type = match (key.version(), constraints.is_empty()) {
            (SshVersion::Ssh1, true) => MessageType::Ssh1AddRsaIdentity,
            (SshVersion::Ssh1, false) => MessageType::Ssh1AddRsaIdConstrained,
            (SshVersion::Ssh2, true) => MessageType::AddIdentity,
            (SshVersion::Ssh2, false) => MessageType::AddIdConstrained,
        };
        request(msg_type, b)
    }

    fn sign_request(key: &Key, data: &[u8], flags: u32) -> AgentMessage {
        let mut b = BlobBuilder::new();
        b.add_blob(&key.encode_public_blob());
        b.add_blob(data);
        b.add_u32(flags);
        request(MessageType::SignRequest, b)
    }

    fn list(d: &Dispatcher) -> AgentMessage {
        d.dispatch(&AgentMessage::new(MessageType::RequestIdentities, Bytes::new()))
    }

    #[test]
    fn test_list_empty() {
        let reply = list(&dispatcher());
        assert_eq!(reply.msg_type, MessageType::IdentitiesAnswer);
        assert_eq!(&reply.payload[..], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_add_then_list() {
        let d = dispatcher();
        let key = Key::new(ed25519_key_data(1), "");
        let reply = d.dispatch(&add_request(&key, "work laptop", &[]));
        assert_eq!(reply.msg_type, MessageType::Success);

        let reply = list(&d);
        let mut p = reply.parser();
        assert_eq!(p.read_u32().unwrap(), 1);
        assert_eq!(p.read_blob().unwrap(), key.encode_public_blob().as_slice());
        assert_eq!(p.read_string().unwrap(), "work laptop");
        assert!(p.is_empty());
    }

    #[test]
    fn test_sign_and_verify() {
        let d = dispatcher();
        let key = Key::new(ed25519_key_data(2), "k");
        d.dispatch(&add_request(&key, "k", &[]));

        let reply = d.dispatch(&sign_request(&key, b"challenge", 0));
        assert_eq!(reply.msg_type, MessageType::SignResponse);
        let sig = SignatureBlob::decode(reply.parser().read_blob().unwrap()).unwrap();
        assert_eq!(sig.algorithm, "ssh-ed25519");
        SoftwareCrypto.verify(key.data(), b"challenge", &sig).unwrap();
    }

    #[test]
    fn test_rsa_sign_honours_flags() {
        let d = dispatcher();
        let key = Key::new(rsa_key_data(1024, false), "rsa");
        d.dispatch(&add_request(&key, "rsa", &[]));

        let reply = d.dispatch(&sign_request(&key, b"data", SSH_AGENT_RSA_SHA2_512));
        let sig = SignatureBlob::decode(reply.parser().read_blob().unwrap()).unwrap();
        assert_eq!(sig.algorithm, "rsa-sha2-512");
        SoftwareCrypto.verify(key.data(), b"data", &sig).unwrap();
    }

    #[test]
    fn test_sign_unknown_key() {
        let d = dispatcher();
        let key = Key::new(ed25519_key_data(3), "absent");
        let reply = d.dispatch(&sign_request(&key, b"x", 0));
        assert_eq!(reply.msg_type, MessageType::Failure);
    }

    #[test]
    fn test_confirm_constraint() {
        let key = Key::new(ed25519_key_data(4), "guarded");

        let denied = dispatcher();
        denied.dispatch(&add_request(&key, "guarded", &[Constraint::Confirm]));
        let reply = denied.dispatch(&sign_request(&key, b"x", 0));
        assert_eq!(reply.msg_type, MessageType::Failure);

        let allowed = dispatcher().with_confirm(Arc::new(|k: &Key, op: Operation| {
            k.comment() == "guarded" && op == Operation::Sign
        }));
        allowed.dispatch(&add_request(&key, "guarded", &[Constraint::Confirm]));
        let reply = allowed.dispatch(&sign_request(&key, b"x", 0));
        assert_eq!(reply.msg_type, MessageType::SignResponse);
    }

    #[test]
    fn test_default_lifetime_applies() {
        let d = dispatcher().with_default_lifetime(Some(0));
        let key = Key::new(ed25519_key_data(5), "short");
        assert_eq!(d.dispatch(&add_request(&key, "short", &[])).msg_type, MessageType::Success);
        // expired on the next access
        assert_eq!(&list(&d).payload[..], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_explicit_lifetime_wins_over_default() {
        let d = dispatcher().with_default_lifetime(Some(0));
        let key = Key::new(ed25519_key_data(6), "long");
        d.dispatch(&add_request(&key, "long", &[Constraint::Lifetime(3600)]));
        assert_eq!(list(&d).parser().read_u32().unwrap(), 1);
    }

    #[test]
    fn test_unknown_constraint_rejected() {
        let d = dispatcher();
        let key = Key::new(ed25519_key_data(7), "");
        let mut b = BlobBuilder::new();
        b.add_bytes(&key.encode_private_blob().unwrap());
        b.add_string("c");
        b.add_u8(0xee);
        let reply = d.dispatch(&request(MessageType::AddIdConstrained, b));
        assert_eq!(reply.msg_type, MessageType::Failure);
        assert_eq!(&list(&d).payload[..], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_remove_and_events() {
        let d = dispatcher();
        let mut rx = d.events().subscribe();
        let key = Key::new(ed25519_key_data(8), "");
        d.dispatch(&add_request(&key, "evented", &[]));

        let mut b = BlobBuilder::new();
        b.add_blob(&key.encode_public_blob());
        let remove = request(MessageType::RemoveIdentity, b);
        assert_eq!(d.dispatch(&remove).msg_type, MessageType::Success);
        // unknown key
        assert_eq!(d.dispatch(&remove).msg_type, MessageType::Failure);

        match rx.try_recv().unwrap() {
            KeyEvent::Added(k) => assert_eq!(k.comment(), "evented"),
            other => panic!("unexpected event {:?}", other),
        }
        assert!(matches!(rx.try_recv().unwrap(), KeyEvent::Removed(_)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_remove_all_fires_per_key() {
        let d = dispatcher();
        let mut rx = d.events().subscribe();
        for seed in 10..13 {
            d.dispatch(&add_request(&Key::new(ed25519_key_data(seed), ""), "k", &[]));
        }
        let reply = d.dispatch(&AgentMessage::new(MessageType::RemoveAllIdentities, Bytes::new()));
        assert_eq!(reply.msg_type, MessageType::Success);

        let removed = std::iter::from_fn(|| rx.try_recv().ok())
            .filter(|e| matches!(e, KeyEvent::Removed(_)))
            .count();
        assert_eq!(removed, 3);
        assert_eq!(&list(&d).payload[..], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_ssh1_add_list_challenge() {
        let d = dispatcher();
        let key = Key::new(rsa_key_data(1024, true), "");
        assert_eq!(d.dispatch(&add_request(&key, "v1", &[])).msg_type, MessageType::Success);

        let reply = d.dispatch(&AgentMessage::new(
            MessageType::Ssh1RequestRsaIdentities,
            Bytes::new(),
        ));
        assert_eq!(reply.msg_type, MessageType::Ssh1RsaIdentitiesAnswer);
        let mut p = reply.parser();
        assert_eq!(p.read_u32().unwrap(), 1);
        let listed = Key::decode_ssh1_public(&mut p).unwrap();
        assert_eq!(p.read_string().unwrap(), "v1");
        assert_eq!(listed.fingerprint(), key.fingerprint());

        let KeyData::Ssh1Rsa { public, .. } = key.data() else {
            unreachable!()
        };
        let plaintext = [0x11u8; 32];
        let encrypted = SoftwareCrypto.encrypt_public(public, &plaintext).unwrap();
        let session = SessionId::derive("host", 1);

        let mut b = BlobBuilder::new();
        b.add_bytes(&key.encode_public_blob());
        b.add_ssh1_bigint(&encrypted);
        b.add_bytes(session.as_bytes());
        b.add_u32(1);
        let reply = d.dispatch(&request(MessageType::Ssh1RsaChallenge, b));
        assert_eq!(reply.msg_type, MessageType::Ssh1RsaResponse);
        assert_eq!(
            &reply.payload[..],
            &session.challenge_response(&plaintext).unwrap()
        );
    }

    #[test]
    fn test_ssh1_challenge_bad_response_type() {
        let d = dispatcher();
        let key = Key::new(rsa_key_data(1024, true), "");
        d.dispatch(&add_request(&key, "v1", &[]));

        let mut b = BlobBuilder::new();
        b.add_bytes(&key.encode_public_blob());
        b.add_ssh1_bigint(&[1, 2, 3]);
        b.add_bytes(&[0; 16]);
        b.add_u32(0);
        let reply = d.dispatch(&request(MessageType::Ssh1RsaChallenge, b));
        assert_eq!(reply.msg_type, MessageType::Failure);
    }

    #[test]
    fn test_lock_unlock() {
        let d = dispatcher();
        let key = Key::new(ed25519_key_data(20), "");
        d.dispatch(&add_request(&key, "k", &[]));

        let passphrase = |msg_type, pass: &[u8]| {
            let mut b = BlobBuilder::new();
            b.add_blob(pass);
            request(msg_type, b)
        };
        assert_eq!(d.dispatch(&passphrase(MessageType::Lock, b"pw")).msg_type, MessageType::Success);
        assert_eq!(list(&d).msg_type, MessageType::Failure);
        assert_eq!(d.dispatch(&sign_request(&key, b"x", 0)).msg_type, MessageType::Failure);
        assert_eq!(d.dispatch(&passphrase(MessageType::Unlock, b"nope")).msg_type, MessageType::Failure);
        assert_eq!(d.dispatch(&passphrase(MessageType::Unlock, b"pw")).msg_type, MessageType::Success);
        assert_eq!(list(&d).msg_type, MessageType::IdentitiesAnswer);
    }

    #[test]
    fn test_unsupported_requests() {
        let d = dispatcher();
        for msg_type in [
            MessageType::AddSmartcardKey,
            MessageType::RemoveSmartcardKey,
            MessageType::AddSmartcardKeyConstrained,
            MessageType::Extension,
            MessageType::Unknown,
        ] {
            let reply = d.dispatch(&AgentMessage::new(msg_type, Bytes::new()));
            assert_eq!(reply.msg_type, MessageType::Failure);
        }
    }

    #[test]
    fn test_dispatch_bytes_malformed() {
        let d = dispatcher();
        assert_eq!(&d.dispatch_bytes(&[0, 0, 0, 9, 11])[..], &[0, 0, 0, 1, 5]);
        assert_eq!(&d.dispatch_bytes(&[0, 0])[..], &[0, 0, 0, 1, 5]);
        assert_eq!(
            &d.dispatch_bytes(&[0, 0, 0, 1, 11])[..],
            &[0, 0, 0, 5, 12, 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_truncated_add_is_failure() {
        let d = dispatcher();
        let key = Key::new(ed25519_key_data(21), "");
        let blob = key.encode_private_blob().unwrap();
        let mut b = BlobBuilder::new();
        b.add_bytes(&blob[..blob.len() - 10]);
        let reply = d.dispatch(&request(MessageType::AddIdentity, b));
        assert_eq!(reply.msg_type, MessageType::Failure);
    }
}
