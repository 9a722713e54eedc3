//! Cryptographic capability used by the dispatcher and client
//!
//! The protocol engine never touches primitives directly; it goes through a
//! [`CryptoProvider`]. [`SoftwareCrypto`] is the default implementation:
//! RSA is handled by the `rsa` crate (so SHA-1/SHA-2 variants and the SSH-1
//! PKCS#1 challenge are available), everything else by `ssh-key`.

use crate::error::{Error, Result};
use crate::key::material::{KeyData, RsaPrivate, RsaPublic};
use crate::protocol::blob::{BlobBuilder, BlobParser};
use rand::rngs::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, Pkcs1v15Encrypt, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use signature::{Signer, Verifier};
use ssh_encoding::Decode;
use zeroize::Zeroizing;

/// Sign request flag asking for an `rsa-sha2-256` signature
pub const SSH_AGENT_RSA_SHA2_256: u32 = 0x02;
/// Sign request flag asking for an `rsa-sha2-512` signature
pub const SSH_AGENT_RSA_SHA2_512: u32 = 0x04;

/// Signature as carried in a sign response: algorithm name plus raw bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureBlob {
    pub algorithm: String,
    pub data: Vec<u8>,
}

impl SignatureBlob {
    pub fn encode(&self) -> Vec<u8> {
        let mut b = BlobBuilder::new();
        b.add_string(&self.algorithm);
        b.add_blob(&self.data);
        b.as_slice().to_vec()
    }

    pub fn decode(blob: &[u8]) -> Result<Self> {
        let mut p = BlobParser::new(blob);
        let algorithm = p.read_string()?;
        let data = p.read_blob()?.to_vec();
        Ok(Self { algorithm, data })
    }
}

/// Primitive operations the protocol engine needs
pub trait CryptoProvider: Send + Sync {
    /// Sign `data` with the private half of `key`; `flags` selects RSA hash variants
    fn sign(&self, key: &KeyData, flags: u32, data: &[u8]) -> Result<SignatureBlob>;

    /// Check `signature` over `data` against the public half of `key`
    fn verify(&self, key: &KeyData, data: &[u8], signature: &SignatureBlob) -> Result<()>;

    /// PKCS#1 v1.5 encryption, used to build SSH-1 challenges
    fn encrypt_public(&self, key: &RsaPublic, data: &[u8]) -> Result<Vec<u8>>;

    /// PKCS#1 v1.5 decryption with an RSA private key
    fn decrypt_private(&self, key: &KeyData, ciphertext: &[u8]) -> Result<Vec<u8>>;
}

/// Pure-software provider
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftwareCrypto;

#[derive(Clone, Copy)]
enum RsaHash {
    Sha1,
    Sha256,
    Sha512,
}

impl RsaHash {
    fn from_flags(flags: u32) -> Self {
        if flags & SSH_AGENT_RSA_SHA2_256 != 0 {
            RsaHash::Sha256
        } else if flags & SSH_AGENT_RSA_SHA2_512 != 0 {
            RsaHash::Sha512
        } else {
            RsaHash::Sha1
        }
    }

    fn from_name(name: &str) -> Result<Self> {
        match name {
            "ssh-rsa" => Ok(RsaHash::Sha1),
            "rsa-sha2-256" => Ok(RsaHash::Sha256),
            "rsa-sha2-512" => Ok(RsaHash::Sha512),
            other => Err(Error::UnsupportedAlgorithm(other.to_string())),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            RsaHash::Sha1 => "ssh-rsa",
            RsaHash::Sha256 => "rsa-sha2-256",
            RsaHash::Sha512 => "rsa-sha2-512",
        }
    }

    fn scheme_and_digest(&self, data: &[u8]) -> (Pkcs1v15Sign, Vec<u8>) {
        match self {
            RsaHash::Sha1 => (Pkcs1v15Sign::new::<Sha1>(), Sha1::digest(data).to_vec()),
            RsaHash::Sha256 => (Pkcs1v15Sign::new::<Sha256>(), Sha256::digest(data).to_vec()),
            RsaHash::Sha512 => (Pkcs1v15Sign::new::<Sha512>(), Sha512::digest(data).to_vec()),
        }
    }
}

fn biguint(m: &crate::key::Mpint) -> BigUint {
    BigUint::from_bytes_be(m.as_bytes())
}

fn rsa_public_key(public: &RsaPublic) -> Result<RsaPublicKey> {
    Ok(RsaPublicKey::new(biguint(&public.n), biguint(&public.e))?)
}

fn rsa_private_key(public: &RsaPublic, private: &RsaPrivate) -> Result<RsaPrivateKey> {
    Ok(RsaPrivateKey::from_components(
        biguint(&public.n),
        biguint(&public.e),
        biguint(&private.d),
        vec![biguint(&private.p), biguint(&private.q)],
    )?)
}

fn missing_private() -> Error {
    Error::Crypto("Key has no private key material".to_string())
}

/// Rebuild an `ssh-key` keypair from our private encoding
fn ssh_key_keypair(key: &KeyData) -> Result<ssh_key::private::KeypairData> {
    let mut b = BlobBuilder::new();
    b.add_string(key.algorithm().identifier());
    match key {
        // ssh-key reads the scalar at the curve's full width
        KeyData::Ecdsa {
            public,
            private: Some(private),
        } => {
            key.encode_public_fields(&mut b);
            let d = Zeroizing::new(private.d.to_padded(public.curve.scalar_len()));
            b.add_blob(&d);
        }
        _ => key.encode_private_fields(&mut b)?,
    }
    let mut reader = b.as_slice();
    Ok(ssh_key::private::KeypairData::decode(&mut reader)?)
}

fn ssh_key_public(key: &KeyData) -> Result<ssh_key::public::KeyData> {
    let mut b = BlobBuilder::new();
    b.add_string(key.algorithm().identifier());
    key.encode_public_fields(&mut b);
    let mut reader = b.as_slice();
    Ok(ssh_key::public::KeyData::decode(&mut reader)?)
}

impl CryptoProvider for SoftwareCrypto {
    fn sign(&self, key: &KeyData, flags: u32, data: &[u8]) -> Result<SignatureBlob> {
        match key {
            KeyData::Ssh1Rsa { .. } => Err(Error::UnsupportedVersion(
                "SSH-1 keys only answer challenges".to_string(),
            )),
            KeyData::Rsa { public, private } => {
                let private = private.as_ref().ok_or_else(missing_private)?;
                let rsa_key = rsa_private_key(public, private)?;
                let hash = RsaHash::from_flags(flags);
                let (scheme, digest) = hash.scheme_and_digest(data);
                Ok(SignatureBlob {
                    algorithm: hash.name().to_string(),
                    data: rsa_key.sign(scheme, &digest)?,
                })
            }
            KeyData::Dsa { .. } | KeyData::Ecdsa { .. } | KeyData::Ed25519 { .. } => {
                if !key.has_private() {
                    return Err(missing_private());
                }
                let keypair = ssh_key_keypair(key)?;
                let sig: ssh_key::Signature = keypair
                    .try_sign(data)
                    .map_err(|e| Error::Crypto(e.to_string()))?;
                Ok(SignatureBlob {
                    algorithm: sig.algorithm().as_str().to_string(),
                    data: sig.as_bytes().to_vec(),
                })
            }
        }
    }

    fn verify(&self, key: &KeyData, data: &[u8], signature: &SignatureBlob) -> Result<()> {
        match key {
            KeyData::Ssh1Rsa { .. } => Err(Error::UnsupportedVersion(
                "SSH-1 keys do not produce signatures".to_string(),
            )),
            KeyData::Rsa { public, .. } => {
                let hash = RsaHash::from_name(&signature.algorithm)?;
                let (scheme, digest) = hash.scheme_and_digest(data);
                rsa_public_key(public)?.verify(scheme, &digest, &signature.data)?;
                Ok(())
            }
            KeyData::Dsa { .. } | KeyData::Ecdsa { .. } | KeyData::Ed25519 { .. } => {
                let public = ssh_key_public(key)?;
                let algorithm = ssh_key::Algorithm::new(&signature.algorithm)?;
                let sig = ssh_key::Signature::new(algorithm, signature.data.clone())?;
                public
                    .verify(data, &sig)
                    .map_err(|e| Error::Crypto(e.to_string()))
            }
        }
    }

    fn encrypt_public(&self, key: &RsaPublic, data: &[u8]) -> Result<Vec<u8>> {
        Ok(rsa_public_key(key)?.encrypt(&mut OsRng, Pkcs1v15Encrypt, data)?)
    }

    fn decrypt_private(&self, key: &KeyData, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let (public, private) = match key {
            KeyData::Ssh1Rsa { public, private } | KeyData::Rsa { public, private } => {
                (public, private.as_ref().ok_or_else(missing_private)?)
            }
            other => {
                return Err(Error::UnsupportedAlgorithm(format!(
                    "{} keys cannot decrypt",
                    other.algorithm()
                )));
            }
        };
        let rsa_key = rsa_private_key(public, private)?;
        let size = rsa_key.size();
        if ciphertext.len() > size {
            return Err(Error::Crypto(format!(
                "Ciphertext of {} bytes exceeds modulus size {}",
                ciphertext.len(),
                size
            )));
        }
        // Challenges arrive as minimal big integers; PKCS#1 wants full width
        let mut padded = vec![0u8; size - ciphertext.len()];
        padded.extend_from_slice(ciphertext);
        Ok(rsa_key.decrypt(Pkcs1v15Encrypt, &padded)?)
    }
}
