//! In-memory key store with lock gate and lifetime expiry

use crate::error::{Error, Result};
use crate::key::{Fingerprint, Key, SshVersion, constraint};
use sha2::{Digest, Sha256};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;
use zeroize::Zeroizing;

/// Store shared between connections
pub type SharedKeyStore = Arc<Mutex<KeyStore>>;

struct Entry {
    key: Key,
    fingerprint: Fingerprint,
    expires_at: Option<Instant>,
}

/// Insertion-ordered key collection.
///
/// While locked, every operation except [`KeyStore::unlock`] fails with
/// [`Error::AgentFailure`]. Expired keys are dropped lazily on each access.
#[derive(Default)]
pub struct KeyStore {
    entries: Vec<Entry>,
    lock: Option<Zeroizing<[u8; 32]>>,
}

fn locked() -> Error {
    Error::AgentFailure("Agent is locked".to_string())
}

fn passphrase_digest(passphrase: &[u8]) -> Zeroizing<[u8; 32]> {
    Zeroizing::new(Sha256::digest(passphrase).into())
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedKeyStore {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_some()
    }

    fn ensure_unlocked(&self) -> Result<()> {
        if self.is_locked() {
            return Err(locked());
        }
        Ok(())
    }

    /// Drop every key whose lifetime ended at or before `now`
    pub fn purge_expired_at(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| match entry.expires_at {
            Some(at) if at <= now => {
                debug!(fingerprint = %entry.fingerprint, "Key lifetime expired");
                false
            }
            _ => true,
        });
        before - self.entries.len()
    }

    fn purge_expired(&mut self) {
        self.purge_expired_at(Instant::now());
    }

    /// Add a key holding private material, replacing any key with the same
    /// fingerprint
    pub fn add(&mut self, key: Key) -> Result<Fingerprint> {
        self.ensure_unlocked()?;
        if !key.has_private() {
            return Err(Error::AgentFailure(
                "Refusing to store a key without private material".to_string(),
            ));
        }
        self.purge_expired();

        let fingerprint = key.fingerprint();
        let expires_at = constraint::lifetime(key.constraints())
            .map(|secs| Instant::now() + Duration::from_secs(u64::from(secs)));
        let entry = Entry {
            key,
            fingerprint,
            expires_at,
        };
        match self.entries.iter_mut().find(|e| e.fingerprint == fingerprint) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
        Ok(fingerprint)
    }

    /// Remove a key, returning its public part
    pub fn remove(&mut self, fingerprint: &Fingerprint) -> Result<Key> {
        self.ensure_unlocked()?;
        self.purge_expired();
        let pos = self
            .entries
            .iter()
            .position(|e| e.fingerprint == *fingerprint)
            .ok_or_else(|| Error::AgentFailure(format!("Key {} not found", fingerprint)))?;
        Ok(self.entries.remove(pos).key.public_only())
    }

    /// Remove every key of one protocol generation, returning their public parts
    pub fn remove_all(&mut self, version: SshVersion) -> Result<Vec<Key>> {
        self.ensure_unlocked()?;
        self.purge_expired();
        let (removed, kept) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|e| e.key.version() == version);
        self.entries = kept;
        Ok(removed
            .into_iter()
            .map(|e: Entry| e.key.public_only())
            .collect())
    }

    /// Public parts of every key of one protocol generation, in insertion order
    pub fn list(&mut self, version: SshVersion) -> Result<Vec<Key>> {
        self.ensure_unlocked()?;
        self.purge_expired();
        Ok(self
            .entries
            .iter()
            .filter(|e| e.key.version() == version)
            .map(|e| e.key.public_only())
            .collect())
    }

    /// Full copy of a stored key, private material included
    pub fn get(&mut self, fingerprint: &Fingerprint) -> Result<Key> {
        self.ensure_unlocked()?;
        self.purge_expired();
        self.entries
            .iter()
            .find(|e| e.fingerprint == *fingerprint)
            .map(|e| e.key.clone())
            .ok_or_else(|| Error::AgentFailure(format!("Key {} not found", fingerprint)))
    }

    pub fn lock(&mut self, passphrase: &[u8]) -> Result<()> {
        self.ensure_unlocked()?;
        self.lock = Some(passphrase_digest(passphrase));
        Ok(())
    }

    pub fn unlock(&mut self, passphrase: &[u8]) -> Result<()> {
        match &self.lock {
            None => Err(Error::AgentFailure("Agent is not locked".to_string())),
            Some(digest) if **digest == *passphrase_digest(passphrase) => {
                self.lock = None;
                Ok(())
            }
            Some(_) => Err(Error::AgentFailure("Incorrect passphrase".to_string())),
        }
    }

    /// Number of stored keys, expired ones included until the next access
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
