//! JSONL (JSON Lines) audit log
//!
//! One JSON object per line, one line per security-relevant agent event.

use crate::key::Key;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

/// Audit event kinds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogEventKind {
    ServerStart,
    ServerStop,
    ClientConnect,
    ClientDisconnect,
    /// Peer failed the credential check
    ClientRejected,
    IdentitiesRequest,
    SignRequest,
    /// SSH-1 RSA challenge
    ChallengeRequest,
    KeyAdded,
    KeyRemoved,
    Lock,
    Unlock,
    Error,
}

impl std::fmt::Display for LogEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LogEventKind::ServerStart => "server_start",
            LogEventKind::ServerStop => "server_stop",
            LogEventKind::ClientConnect => "client_connect",
            LogEventKind::ClientDisconnect => "client_disconnect",
            LogEventKind::ClientRejected => "client_rejected",
            LogEventKind::IdentitiesRequest => "identities_request",
            LogEventKind::SignRequest => "sign_request",
            LogEventKind::ChallengeRequest => "challenge_request",
            LogEventKind::KeyAdded => "key_added",
            LogEventKind::KeyRemoved => "key_removed",
            LogEventKind::Lock => "lock",
            LogEventKind::Unlock => "unlock",
            LogEventKind::Error => "error",
        };
        f.write_str(name)
    }
}

/// Outcome of a request that uses or changes keys
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allowed,
    Denied,
}

impl Decision {
    pub fn from_success(ok: bool) -> Self {
        if ok { Decision::Allowed } else { Decision::Denied }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Allowed => write!(f, "allowed"),
            Decision::Denied => write!(f, "denied"),
        }
    }
}

/// A structured audit event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,

    pub kind: LogEventKind,

    /// Listening socket path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub socket: Option<String>,

    /// Connection identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Peer process id, when the platform reports it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer_pid: Option<i32>,

    /// Key fingerprint (SHA256 display form)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    /// Key type identifier, e.g. "ssh-ed25519"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Number of keys returned by a listing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_count: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LogEvent {
    pub fn new(kind: LogEventKind) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            socket: None,
            client_id: None,
            peer_pid: None,
            fingerprint: None,
            comment: None,
            key_type: None,
            decision: None,
            reason: None,
            key_count: None,
            error: None,
        }
    }

    pub fn with_socket(mut self, socket: impl Into<String>) -> Self {
        self.socket = Some(socket.into());
        self
    }

    pub fn with_client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = Some(id.into());
        self
    }

    pub fn with_peer_pid(mut self, pid: Option<i32>) -> Self {
        self.peer_pid = pid;
        self
    }

    /// Fill fingerprint, comment and key type from a key
    pub fn with_key(mut self, key: &Key) -> Self {
        self.fingerprint = Some(key.sha256_fingerprint());
        self.comment = Some(key.comment().to_string());
        self.key_type = Some(key.identifier());
        self
    }

    pub fn with_decision(mut self, decision: Decision) -> Self {
        self.decision = Some(decision);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_key_count(mut self, count: usize) -> Self {
        self.key_count = Some(u32::try_from(count).unwrap_or(u32::MAX));
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn server_start(socket: impl Into<String>) -> Self {
        Self::new(LogEventKind::ServerStart).with_socket(socket)
    }

    pub fn server_stop(socket: impl Into<String>) -> Self {
        Self::new(LogEventKind::ServerStop).with_socket(socket)
    }

    pub fn client_connect(socket: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self::new(LogEventKind::ClientConnect)
            .with_socket(socket)
            .with_client_id(client_id)
    }

    pub fn client_disconnect(socket: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self::new(LogEventKind::ClientDisconnect)
            .with_socket(socket)
            .with_client_id(client_id)
    }

    pub fn client_rejected(socket: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(LogEventKind::ClientRejected)
            .with_socket(socket)
            .with_decision(Decision::Denied)
            .with_reason(reason)
    }

    pub fn key_added(key: &Key) -> Self {
        Self::new(LogEventKind::KeyAdded).with_key(key)
    }

    pub fn key_removed(key: &Key) -> Self {
        Self::new(LogEventKind::KeyRemoved).with_key(key)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogEventKind::Error).with_error(message)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Append-only JSONL file writer, safe to share between threads
pub struct JsonlWriter {
    writer: Mutex<BufWriter<File>>,
}

impl JsonlWriter {
    /// Open `path` for appending, creating it (mode 0600 on unix) if missing
    pub fn new<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let mut options = OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let file = options.open(path)?;

        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Write one event and flush it
    pub fn write(&self, event: &LogEvent) -> std::io::Result<()> {
        let json = event.to_json().map_err(std::io::Error::other)?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| std::io::Error::other("Lock poisoned"))?;
        writeln!(writer, "{}", json)?;
        writer.flush()
    }

    /// Write an event, downgrading failures to a warning
    pub fn record(&self, event: &LogEvent) {
        if let Err(e) = self.write(event) {
            tracing::warn!(kind = %event.kind, error = %e, "Failed to write audit event");
        }
    }

    pub fn flush(&self) -> std::io::Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| std::io::Error::other("Lock poisoned"))?;
        writer.flush()
    }
}

impl Drop for JsonlWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::tests::ed25519_key_data;
    use std::io::{BufRead, BufReader};
    use tempfile::NamedTempFile;

    #[test]
    fn test_key_event_fields() {
        let key = Key::new(ed25519_key_data(1), "alice@laptop");
        let event = LogEvent::key_added(&key);

        assert_eq!(event.kind, LogEventKind::KeyAdded);
        assert_eq!(event.comment.as_deref(), Some("alice@laptop"));
        assert_eq!(event.key_type.as_deref(), Some("ssh-ed25519"));
        assert!(event.fingerprint.as_deref().unwrap().starts_with("SHA256:"));
    }

    #[test]
    fn test_serialize_skips_empty_fields() {
        let json = LogEvent::server_start("/tmp/agent.sock").to_json().unwrap();
        assert!(json.contains("\"kind\":\"server_start\""));
        assert!(json.contains("\"socket\":\"/tmp/agent.sock\""));
        assert!(!json.contains("fingerprint"));
    }

    #[test]
    fn test_roundtrip_with_decision() {
        let event = LogEvent::new(LogEventKind::SignRequest)
            .with_decision(Decision::Denied)
            .with_reason("confirmation declined");
        let parsed: LogEvent = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(parsed.kind, LogEventKind::SignRequest);
        assert_eq!(parsed.decision, Some(Decision::Denied));
        assert_eq!(parsed.reason.as_deref(), Some("confirmation declined"));
    }

    #[test]
    fn test_jsonl_writer() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_path_buf();

        {
            let writer = JsonlWriter::new(&path).unwrap();
            writer.write(&LogEvent::server_start("/tmp/a.sock")).unwrap();
            writer.record(&LogEvent::client_rejected("/tmp/a.sock", "uid 1001"));
        }

        let reader = BufReader::new(File::open(&path).unwrap());
        let lines: Vec<String> = reader.lines().map(|l| l.unwrap()).collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"kind\":\"server_start\""));
        assert!(lines[1].contains("\"kind\":\"client_rejected\""));
        assert!(lines[1].contains("\"decision\":\"denied\""));
    }

    #[test]
    fn test_display() {
        assert_eq!(LogEventKind::ChallengeRequest.to_string(), "challenge_request");
        assert_eq!(Decision::from_success(true).to_string(), "allowed");
        assert_eq!(Decision::from_success(false), Decision::Denied);
    }
}
