//! Key added / removed notifications

use crate::key::Key;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 64;

/// Change to the set of keys held by an agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyEvent {
    /// Public part of the key that was added
    Added(Key),
    /// Public part of the key that was removed
    Removed(Key),
}

impl KeyEvent {
    pub fn key(&self) -> &Key {
        match self {
            KeyEvent::Added(key) | KeyEvent::Removed(key) => key,
        }
    }
}

/// Outbound channel for [`KeyEvent`]s.
///
/// Cloning yields another handle to the same channel. Events sent while
/// nobody is subscribed are dropped.
#[derive(Debug, Clone)]
pub struct KeyEvents {
    tx: broadcast::Sender<KeyEvent>,
}

impl KeyEvents {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<KeyEvent> {
        self.tx.subscribe()
    }

    pub fn has_subscribers(&self) -> bool {
        self.tx.receiver_count() > 0
    }

    pub fn emit(&self, event: KeyEvent) {
        // Err only means there are no receivers
        let _ = self.tx.send(event);
    }

    pub fn added(&self, key: &Key) {
        self.emit(KeyEvent::Added(key.public_only()));
    }

    pub fn removed(&self, key: &Key) {
        self.emit(KeyEvent::Removed(key.public_only()));
    }
}

impl Default for KeyEvents {
    fn default() -> Self {
        Self::new()
    }
}
