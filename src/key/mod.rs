//! Key model: algorithm-tagged key material, certificates and constraints
//!
//! A [`Key`] owns its [`KeyData`] and knows how to produce the normative
//! public and private blob encodings for both protocol generations.

pub mod algorithm;
pub mod certificate;
pub mod constraint;
pub mod material;

pub use algorithm::{Algorithm, CERT_SUFFIX, EcdsaCurve, SshVersion};
pub use certificate::{CertType, Certificate};
pub use constraint::Constraint;
pub use material::{KeyData, Mpint};

use crate::error::{Error, Result};
use crate::protocol::blob::{BlobBuilder, BlobParser};
use base64::Engine;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use md5::{Digest, Md5};
use sha2::Sha256;
use ssh_encoding::Encode;
use ssh_key::private::KeypairData;
use std::fmt;

/// MD5 digest of a key's public blob, the lookup key on the wire
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 16]);

impl Fingerprint {
    pub fn of(public_blob: &[u8]) -> Self {
        Self(Md5::digest(public_blob).into())
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MD5")?;
        for b in self.0 {
            write!(f, ":{:02x}", b)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// A key together with its comment, certificate and constraints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    data: KeyData,
    comment: String,
    certificate: Option<Certificate>,
    constraints: Vec<Constraint>,
}

impl Key {
    pub fn new(data: KeyData, comment: impl Into<String>) -> Self {
        Self {
            data,
            comment: comment.into(),
            certificate: None,
            constraints: Vec::new(),
        }
    }

    pub fn with_constraints(mut self, constraints: Vec<Constraint>) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn set_comment(&mut self, comment: impl Into<String>) {
        self.comment = comment.into();
    }

    pub fn data(&self) -> &KeyData {
        &self.data
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn certificate(&self) -> Option<&Certificate> {
        self.certificate.as_ref()
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn algorithm(&self) -> Algorithm {
        self.data.algorithm()
    }

    pub fn version(&self) -> SshVersion {
        self.algorithm().version()
    }

    pub fn bits(&self) -> u32 {
        self.data.bits()
    }

    pub fn has_private(&self) -> bool {
        self.data.has_private()
    }

    /// Key type identifier as sent on the wire
    pub fn identifier(&self) -> String {
        match (&self.certificate, self.algorithm().cert_identifier()) {
            (Some(_), Some(cert_id)) => cert_id,
            _ => self.algorithm().identifier().to_string(),
        }
    }

    /// Public blob used in listings, sign requests and fingerprints
    pub fn encode_public_blob(&self) -> Vec<u8> {
        if let Some(cert) = &self.certificate {
            return cert.as_bytes().to_vec();
        }
        let mut b = BlobBuilder::new();
        if self.version() == SshVersion::Ssh2 {
            b.add_string(self.algorithm().identifier());
        }
        self.data.encode_public_fields(&mut b);
        b.as_slice().to_vec()
    }

    /// Private key body of an add-identity request, comment excluded
    pub fn encode_private_blob(&self) -> Result<Vec<u8>> {
        let mut b = BlobBuilder::new();
        match (&self.certificate, self.version()) {
            (_, SshVersion::Ssh1) => self.data.encode_private_fields(&mut b)?,
            (Some(cert), SshVersion::Ssh2) => {
                b.add_string(&self.identifier());
                b.add_blob(cert.as_bytes());
                self.data.encode_cert_private_fields(&mut b)?;
            }
            (None, SshVersion::Ssh2) => {
                b.add_string(self.algorithm().identifier());
                self.data.encode_private_fields(&mut b)?;
            }
        }
        Ok(b.as_slice().to_vec())
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&self.encode_public_blob())
    }

    /// OpenSSH style `SHA256:<base64>` fingerprint for display
    pub fn sha256_fingerprint(&self) -> String {
        let digest = Sha256::digest(self.encode_public_blob());
        format!("SHA256:{}", STANDARD_NO_PAD.encode(digest))
    }

    /// Copy suitable for handing to a peer: no private parameters, no constraints
    pub fn public_only(&self) -> Key {
        Key {
            data: self.data.public_only(),
            comment: self.comment.clone(),
            certificate: self.certificate.clone(),
            constraints: Vec::new(),
        }
    }

    /// Decode a complete SSH-2 public key blob (plain or certificate)
    pub fn decode_ssh2_public_blob(blob: &[u8]) -> Result<Key> {
        let mut p = BlobParser::new(blob);
        let id = p.read_string()?;
        let (base, is_cert) = algorithm::split_cert_identifier(&id);
        if is_cert {
            let (cert, data) = Certificate::decode(blob)?;
            return Ok(Key {
                certificate: Some(cert),
                ..Key::new(data, "")
            });
        }

        let alg = Algorithm::from_identifier(base)?;
        let data = KeyData::decode_public_fields(alg, &mut p)?;
        if !p.is_empty() {
            return Err(Error::Framing(format!(
                "{} trailing bytes after {} public key",
                p.remaining(),
                alg
            )));
        }
        Ok(Key::new(data, ""))
    }

    /// Decode an SSH-1 public key (bits, exponent, modulus)
    pub fn decode_ssh1_public(p: &mut BlobParser<'_>) -> Result<Key> {
        let data = KeyData::decode_public_fields(Algorithm::Ssh1Rsa, p)?;
        Ok(Key::new(data, ""))
    }

    /// Decode the private key body of an SSH-2 add-identity request.
    ///
    /// The comment that follows is left in the parser.
    pub fn decode_ssh2_private(p: &mut BlobParser<'_>) -> Result<Key> {
        let id = p.read_string()?;
        let (base, is_cert) = algorithm::split_cert_identifier(&id);
        if is_cert {
            let (cert, public) = Certificate::decode(p.read_blob()?)?;
            if Algorithm::from_identifier(base)? != public.algorithm() {
                return Err(Error::Framing(format!(
                    "Certificate does not match key type {}",
                    id
                )));
            }
            let data = KeyData::decode_cert_private_fields(public, p)?;
            return Ok(Key {
                certificate: Some(cert),
                ..Key::new(data, "")
            });
        }

        let alg = Algorithm::from_identifier(base)?;
        let data = KeyData::decode_private_fields(alg, p)?;
        Ok(Key::new(data, ""))
    }

    /// Decode the private key body of an SSH-1 add-identity request.
    ///
    /// The comment that follows is left in the parser.
    pub fn decode_ssh1_private(p: &mut BlobParser<'_>) -> Result<Key> {
        let data = KeyData::decode_private_fields(Algorithm::Ssh1Rsa, p)?;
        Ok(Key::new(data, ""))
    }

    /// Convert an `ssh-key` keypair, such as one loaded from an OpenSSH
    /// private key file
    pub fn from_keypair_data(keypair: &KeypairData, comment: impl Into<String>) -> Result<Key> {
        let mut encoded = Vec::new();
        keypair
            .encode(&mut encoded)
            .map_err(ssh_key::Error::from)?;
        let mut p = BlobParser::new(&encoded);
        let mut key = Key::decode_ssh2_private(&mut p)?;
        key.set_comment(comment);
        Ok(key)
    }
}
