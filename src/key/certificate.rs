//! OpenSSH certificates (`*-cert-v01@openssh.com`)

use super::algorithm::{Algorithm, split_cert_identifier};
use super::material::KeyData;
use crate::error::{Error, Result};
use crate::protocol::blob::BlobParser;

/// Whether a certificate authenticates a user or a host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertType {
    User,
    Host,
}

impl CertType {
    fn from_code(code: u32) -> Result<Self> {
        match code {
            1 => Ok(CertType::User),
            2 => Ok(CertType::Host),
            other => Err(Error::Framing(format!("Unknown certificate type {}", other))),
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            CertType::User => 1,
            CertType::Host => 2,
        }
    }
}

/// Parsed certificate.
///
/// The agent never re-signs certificates, so the original blob is kept and
/// served back verbatim as the key's public blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    blob: Vec<u8>,
    pub nonce: Vec<u8>,
    pub serial: u64,
    pub cert_type: CertType,
    pub key_id: String,
    pub principals: Vec<String>,
    pub valid_after: u64,
    pub valid_before: u64,
    pub critical_options: Vec<u8>,
    pub extensions: Vec<u8>,
    pub signature_key: Vec<u8>,
    pub signature: Vec<u8>,
}

impl Certificate {
    /// Parse a certificate blob, returning it together with the certified
    /// public key
    pub fn decode(blob: &[u8]) -> Result<(Certificate, KeyData)> {
        let mut p = BlobParser::new(blob);
        let id = p.read_string()?;
        let (base, is_cert) = split_cert_identifier(&id);
        if !is_cert {
            return Err(Error::Framing(format!("{} is not a certificate key type", id)));
        }
        let alg = Algorithm::from_identifier(base)?;

        let nonce = p.read_blob()?.to_vec();
        let key = KeyData::decode_public_fields(alg, &mut p)?;
        let serial = p.read_u64()?;
        let cert_type = CertType::from_code(p.read_u32()?)?;
        let key_id = p.read_string()?;

        let mut principals = Vec::new();
        let mut packed = BlobParser::new(p.read_blob()?);
        while !packed.is_empty() {
            principals.push(packed.read_string()?);
        }

        let valid_after = p.read_u64()?;
        let valid_before = p.read_u64()?;
        let critical_options = p.read_blob()?.to_vec();
        let extensions = p.read_blob()?.to_vec();
        let _reserved = p.read_blob()?;
        let signature_key = p.read_blob()?.to_vec();
        let signature = p.read_blob()?.to_vec();
        if !p.is_empty() {
            return Err(Error::Framing(format!(
                "{} trailing bytes after certificate",
                p.remaining()
            )));
        }

        let cert = Certificate {
            blob: blob.to_vec(),
            nonce,
            serial,
            cert_type,
            key_id,
            principals,
            valid_after,
            valid_before,
            critical_options,
            extensions,
            signature_key,
            signature,
        };
        Ok((cert, key))
    }

    /// The certificate exactly as received
    pub fn as_bytes(&self) -> &[u8] {
        &self.blob
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::protocol::blob::BlobBuilder;

    /// Unsigned Ed25519 user certificate with two principals
    pub(crate) fn sample_ed25519_cert(public: &[u8; 32]) -> Vec<u8> {
        let mut principals = BlobBuilder::new();
        principals.add_string("alice");
        principals.add_string("deploy");

        let mut b = BlobBuilder::new();
        b.add_string("ssh-ed25519-cert-v01@openssh.com");
        b.add_blob(&[0xab; 32]);
        b.add_blob(public);
        b.add_u64(42);
        b.add_u32(1);
        b.add_string("alice@example");
        b.add_blob(principals.as_slice());
        b.add_u64(0);
        b.add_u64(u64::MAX);
        b.add_blob(&[]);
        b.add_blob(&[]);
        b.add_blob(&[]);
        b.add_blob(b"ca-key");
        b.add_blob(b"ca-signature");
        b.as_slice().to_vec()
    }

    #[test]
    fn test_decode_certificate() {
        let blob = sample_ed25519_cert(&[7; 32]);
        let (cert, key) = Certificate::decode(&blob).unwrap();

        assert_eq!(cert.serial, 42);
        assert_eq!(cert.cert_type, CertType::User);
        assert_eq!(cert.key_id, "alice@example");
        assert_eq!(cert.principals, vec!["alice", "deploy"]);
        assert_eq!(cert.valid_before, u64::MAX);
        assert_eq!(cert.as_bytes(), blob.as_slice());
        assert_eq!(key.algorithm(), Algorithm::Ed25519);
        assert!(!key.has_private());
    }

    #[test]
    fn test_reject_plain_key_type() {
        let mut b = BlobBuilder::new();
        b.add_string("ssh-ed25519");
        b.add_blob(&[7; 32]);
        assert!(matches!(
            Certificate::decode(b.as_slice()),
            Err(Error::Framing(_))
        ));
    }

    #[test]
    fn test_reject_truncated_certificate() {
        let blob = sample_ed25519_cert(&[7; 32]);
        assert!(Certificate::decode(&blob[..blob.len() - 3]).is_err());
    }

    #[test]
    fn test_reject_unknown_cert_type() {
        let mut blob = sample_ed25519_cert(&[7; 32]);
        // cert type follows identifier(4+32), nonce(4+32), key(4+32), serial(8)
        let offset = 36 + 36 + 36 + 8;
        blob[offset + 3] = 9;
        let err = Certificate::decode(&blob).unwrap_err();
        assert!(err.to_string().contains("certificate type"));
    }
}
