//! Per-process session identifier used by SSH-1 challenge-response

use crate::error::{Error, Result};
use md5::{Digest, Md5};
use std::fmt;

/// 16-byte MD5 of the host name followed by the decimal process id.
///
/// Computed once at startup and handed to whoever answers or issues SSH-1
/// challenges.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SessionId([u8; 16]);

impl SessionId {
    pub fn derive(hostname: &str, pid: u32) -> Self {
        let mut hasher = Md5::new();
        hasher.update(hostname.as_bytes());
        hasher.update(pid.to_string().as_bytes());
        Self(hasher.finalize().into())
    }

    pub fn for_current_process() -> Self {
        Self::derive(&hostname(), std::process::id())
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Response to a decrypted SSH-1 challenge: MD5 of the 32-byte
    /// plaintext followed by the session id
    pub fn challenge_response(&self, plaintext: &[u8]) -> Result<[u8; 16]> {
        if plaintext.len() > 32 {
            return Err(Error::Crypto(format!(
                "Challenge plaintext is {} bytes, expected at most 32",
                plaintext.len()
            )));
        }
        let mut buf = [0u8; 32];
        buf[32 - plaintext.len()..].copy_from_slice(plaintext);

        let mut hasher = Md5::new();
        hasher.update(buf);
        hasher.update(self.0);
        Ok(hasher.finalize().into())
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId(")?;
        for b in self.0 {
            write!(f, "{:02x}", b)?;
        }
        write!(f, ")")
    }
}

#[cfg(unix)]
fn hostname() -> String {
    let mut buf = [0u8; 256];
    // SAFETY: buf is valid for buf.len() bytes and gethostname writes at most that many
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if rc == 0 {
        let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        return String::from_utf8_lossy(&buf[..end]).into_owned();
    }
    std::env::var("HOSTNAME").unwrap_or_default()
}

#[cfg(not(unix))]
fn hostname() -> String {
    std::env::var("COMPUTERNAME").unwrap_or_default()
}
