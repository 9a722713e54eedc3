//! Algorithm-specific key parameters and their wire encodings

use super::algorithm::{Algorithm, EcdsaCurve};
use crate::error::{Error, Result};
use crate::protocol::blob::{BlobBuilder, BlobParser, bit_length, trim_leading_zeros};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Unsigned big integer stored as a minimal big-endian magnitude
#[derive(Clone, Default, PartialEq, Eq, Hash, Zeroize)]
pub struct Mpint(Vec<u8>);

impl Mpint {
    pub fn from_be_bytes(bytes: &[u8]) -> Self {
        Self(trim_leading_zeros(bytes).to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn bits(&self) -> u32 {
        bit_length(&self.0)
    }

    /// Magnitude left-padded with zeros to `len` bytes
    pub fn to_padded(&self, len: usize) -> Vec<u8> {
        let mut out = vec![0u8; len.saturating_sub(self.0.len())];
        out.extend_from_slice(&self.0);
        out
    }
}

impl fmt::Debug for Mpint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mpint(")?;
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        write!(f, ")")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaPublic {
    pub e: Mpint,
    pub n: Mpint,
}

#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct RsaPrivate {
    pub d: Mpint,
    /// q^-1 mod p
    pub iqmp: Mpint,
    pub p: Mpint,
    pub q: Mpint,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DsaPublic {
    pub p: Mpint,
    pub q: Mpint,
    pub g: Mpint,
    pub y: Mpint,
}

#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct DsaPrivate {
    pub x: Mpint,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcdsaPublic {
    pub curve: EcdsaCurve,
    /// SEC1 encoded curve point
    pub point: Vec<u8>,
}

#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct EcdsaPrivate {
    pub d: Mpint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ed25519Public(pub [u8; 32]);

/// Seed followed by the public key, as OpenSSH stores it
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Ed25519Private(pub [u8; 64]);

macro_rules! redacted_debug {
    ($($ty:ty),*) => {
        $(impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($ty)).finish_non_exhaustive()
            }
        })*
    };
}

redacted_debug!(RsaPrivate, DsaPrivate, EcdsaPrivate, Ed25519Private);

/// Key parameters, one variant per supported key kind.
///
/// Private parameters are present only on the side holding the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyData {
    Ssh1Rsa {
        public: RsaPublic,
        private: Option<RsaPrivate>,
    },
    Rsa {
        public: RsaPublic,
        private: Option<RsaPrivate>,
    },
    Dsa {
        public: DsaPublic,
        private: Option<DsaPrivate>,
    },
    Ecdsa {
        public: EcdsaPublic,
        private: Option<EcdsaPrivate>,
    },
    Ed25519 {
        public: Ed25519Public,
        private: Option<Ed25519Private>,
    },
}

fn no_private(alg: Algorithm) -> Error {
    Error::Protocol(format!("{} key has no private key material", alg))
}

impl KeyData {
    pub fn algorithm(&self) -> Algorithm {
        match self {
            KeyData::Ssh1Rsa { .. } => Algorithm::Ssh1Rsa,
            KeyData::Rsa { .. } => Algorithm::Rsa,
            KeyData::Dsa { .. } => Algorithm::Dsa,
            KeyData::Ecdsa { public, .. } => Algorithm::Ecdsa(public.curve),
            KeyData::Ed25519 { .. } => Algorithm::Ed25519,
        }
    }

    pub fn has_private(&self) -> bool {
        match self {
            KeyData::Ssh1Rsa { private, .. } | KeyData::Rsa { private, .. } => private.is_some(),
            KeyData::Dsa { private, .. } => private.is_some(),
            KeyData::Ecdsa { private, .. } => private.is_some(),
            KeyData::Ed25519 { private, .. } => private.is_some(),
        }
    }

    /// Key strength in bits
    pub fn bits(&self) -> u32 {
        match self {
            KeyData::Ssh1Rsa { public, .. } | KeyData::Rsa { public, .. } => public.n.bits(),
            KeyData::Dsa { public, .. } => public.p.bits(),
            KeyData::Ecdsa { public, .. } => public.curve.bits(),
            KeyData::Ed25519 { .. } => 256,
        }
    }

    /// Copy of the key without private parameters
    pub fn public_only(&self) -> KeyData {
        match self {
            KeyData::Ssh1Rsa { public, .. } => KeyData::Ssh1Rsa {
                public: public.clone(),
                private: None,
            },
            KeyData::Rsa { public, .. } => KeyData::Rsa {
                public: public.clone(),
                private: None,
            },
            KeyData::Dsa { public, .. } => KeyData::Dsa {
                public: public.clone(),
                private: None,
            },
            KeyData::Ecdsa { public, .. } => KeyData::Ecdsa {
                public: public.clone(),
                private: None,
            },
            KeyData::Ed25519 { public, .. } => KeyData::Ed25519 {
                public: *public,
                private: None,
            },
        }
    }

    /// Public fields following the algorithm identifier (SSH-2), or the
    /// whole public key body (SSH-1)
    pub fn encode_public_fields(&self, b: &mut BlobBuilder) {
        match self {
            KeyData::Ssh1Rsa { public, .. } => {
                b.add_u32(public.n.bits());
                b.add_ssh1_bigint(public.e.as_bytes());
                b.add_ssh1_bigint(public.n.as_bytes());
            }
            KeyData::Rsa { public, .. } => {
                b.add_mpint(public.e.as_bytes());
                b.add_mpint(public.n.as_bytes());
            }
            KeyData::Dsa { public, .. } => {
                b.add_mpint(public.p.as_bytes());
                b.add_mpint(public.q.as_bytes());
                b.add_mpint(public.g.as_bytes());
                b.add_mpint(public.y.as_bytes());
            }
            KeyData::Ecdsa { public, .. } => {
                b.add_string(public.curve.identifier());
                b.add_blob(&public.point);
            }
            KeyData::Ed25519 { public, .. } => {
                b.add_blob(&public.0);
            }
        }
    }

    /// Private key body as sent in an add-identity request
    pub fn encode_private_fields(&self, b: &mut BlobBuilder) -> Result<()> {
        match self {
            KeyData::Ssh1Rsa { public, private } => {
                let private = private.as_ref().ok_or_else(|| no_private(Algorithm::Ssh1Rsa))?;
                b.add_u32(public.n.bits());
                b.add_ssh1_bigint(public.n.as_bytes());
                b.add_ssh1_bigint(public.e.as_bytes());
                b.add_ssh1_bigint(private.d.as_bytes());
                b.add_ssh1_bigint(private.iqmp.as_bytes());
                b.add_ssh1_bigint(private.q.as_bytes());
                b.add_ssh1_bigint(private.p.as_bytes());
            }
            KeyData::Rsa { public, private } => {
                let private = private.as_ref().ok_or_else(|| no_private(Algorithm::Rsa))?;
                b.add_mpint(public.n.as_bytes());
                b.add_mpint(public.e.as_bytes());
                b.add_mpint(private.d.as_bytes());
                b.add_mpint(private.iqmp.as_bytes());
                b.add_mpint(private.p.as_bytes());
                b.add_mpint(private.q.as_bytes());
            }
            KeyData::Dsa { private, .. } => {
                let private = private.as_ref().ok_or_else(|| no_private(Algorithm::Dsa))?;
                self.encode_public_fields(b);
                b.add_mpint(private.x.as_bytes());
            }
            KeyData::Ecdsa { public, private } => {
                let private = private
                    .as_ref()
                    .ok_or_else(|| no_private(Algorithm::Ecdsa(public.curve)))?;
                self.encode_public_fields(b);
                b.add_mpint(private.d.as_bytes());
            }
            KeyData::Ed25519 { public, private } => {
                let private = private.as_ref().ok_or_else(|| no_private(Algorithm::Ed25519))?;
                b.add_blob(&public.0);
                b.add_blob(&private.0);
            }
        }
        Ok(())
    }

    /// Private-only fields that follow the certificate in a certificate
    /// add-identity request
    pub fn encode_cert_private_fields(&self, b: &mut BlobBuilder) -> Result<()> {
        match self {
            KeyData::Ssh1Rsa { .. } => {
                return Err(Error::UnsupportedVersion(
                    "SSH-1 keys cannot carry certificates".to_string(),
                ));
            }
            KeyData::Rsa { private, .. } => {
                let private = private.as_ref().ok_or_else(|| no_private(Algorithm::Rsa))?;
                b.add_mpint(private.d.as_bytes());
                b.add_mpint(private.iqmp.as_bytes());
                b.add_mpint(private.p.as_bytes());
                b.add_mpint(private.q.as_bytes());
            }
            KeyData::Dsa { private, .. } => {
                let private = private.as_ref().ok_or_else(|| no_private(Algorithm::Dsa))?;
                b.add_mpint(private.x.as_bytes());
            }
            KeyData::Ecdsa { public, private } => {
                let private = private
                    .as_ref()
                    .ok_or_else(|| no_private(Algorithm::Ecdsa(public.curve)))?;
                b.add_mpint(private.d.as_bytes());
            }
            KeyData::Ed25519 { public, private } => {
                let private = private.as_ref().ok_or_else(|| no_private(Algorithm::Ed25519))?;
                b.add_blob(&public.0);
                b.add_blob(&private.0);
            }
        }
        Ok(())
    }

    /// Decode the public fields of a key whose identifier was already read
    pub fn decode_public_fields(alg: Algorithm, p: &mut BlobParser<'_>) -> Result<KeyData> {
        let data = match alg {
            Algorithm::Ssh1Rsa => {
                let _bits = p.read_u32()?;
                let e = Mpint::from_be_bytes(p.read_ssh1_bigint()?);
                let n = Mpint::from_be_bytes(p.read_ssh1_bigint()?);
                KeyData::Ssh1Rsa {
                    public: RsaPublic { e, n },
                    private: None,
                }
            }
            Algorithm::Rsa => {
                let e = Mpint::from_be_bytes(p.read_mpint()?);
                let n = Mpint::from_be_bytes(p.read_mpint()?);
                KeyData::Rsa {
                    public: RsaPublic { e, n },
                    private: None,
                }
            }
            Algorithm::Dsa => KeyData::Dsa {
                public: read_dsa_public(p)?,
                private: None,
            },
            Algorithm::Ecdsa(curve) => KeyData::Ecdsa {
                public: read_ecdsa_public(curve, p)?,
                private: None,
            },
            Algorithm::Ed25519 => KeyData::Ed25519 {
                public: read_ed25519_public(p)?,
                private: None,
            },
        };
        Ok(data)
    }

    /// Decode a private key body whose identifier was already read
    pub fn decode_private_fields(alg: Algorithm, p: &mut BlobParser<'_>) -> Result<KeyData> {
        let data = match alg {
            Algorithm::Ssh1Rsa => {
                let _bits = p.read_u32()?;
                let n = Mpint::from_be_bytes(p.read_ssh1_bigint()?);
                let e = Mpint::from_be_bytes(p.read_ssh1_bigint()?);
                let d = Mpint::from_be_bytes(p.read_ssh1_bigint()?);
                let iqmp = Mpint::from_be_bytes(p.read_ssh1_bigint()?);
                let q = Mpint::from_be_bytes(p.read_ssh1_bigint()?);
                let pp = Mpint::from_be_bytes(p.read_ssh1_bigint()?);
                KeyData::Ssh1Rsa {
                    public: RsaPublic { e, n },
                    private: Some(RsaPrivate { d, iqmp, p: pp, q }),
                }
            }
            Algorithm::Rsa => {
                let n = Mpint::from_be_bytes(p.read_mpint()?);
                let e = Mpint::from_be_bytes(p.read_mpint()?);
                KeyData::Rsa {
                    public: RsaPublic { e, n },
                    private: Some(read_rsa_private(p)?),
                }
            }
            Algorithm::Dsa => {
                let public = read_dsa_public(p)?;
                let x = Mpint::from_be_bytes(p.read_mpint()?);
                KeyData::Dsa {
                    public,
                    private: Some(DsaPrivate { x }),
                }
            }
            Algorithm::Ecdsa(curve) => {
                let public = read_ecdsa_public(curve, p)?;
                let d = Mpint::from_be_bytes(p.read_mpint()?);
                KeyData::Ecdsa {
                    public,
                    private: Some(EcdsaPrivate { d }),
                }
            }
            Algorithm::Ed25519 => {
                let public = read_ed25519_public(p)?;
                let private = read_ed25519_private(&public, p)?;
                KeyData::Ed25519 {
                    public,
                    private: Some(private),
                }
            }
        };
        Ok(data)
    }

    /// Attach private fields read after a certificate to the certified key
    pub fn decode_cert_private_fields(public: KeyData, p: &mut BlobParser<'_>) -> Result<KeyData> {
        let data = match public {
            KeyData::Ssh1Rsa { .. } => {
                return Err(Error::UnsupportedVersion(
                    "SSH-1 keys cannot carry certificates".to_string(),
                ));
            }
            KeyData::Rsa { public, .. } => KeyData::Rsa {
                public,
                private: Some(read_rsa_private(p)?),
            },
            KeyData::Dsa { public, .. } => KeyData::Dsa {
                public,
                private: Some(DsaPrivate {
                    x: Mpint::from_be_bytes(p.read_mpint()?),
                }),
            },
            KeyData::Ecdsa { public, .. } => KeyData::Ecdsa {
                public,
                private: Some(EcdsaPrivate {
                    d: Mpint::from_be_bytes(p.read_mpint()?),
                }),
            },
            KeyData::Ed25519 { public, .. } => {
                let embedded = read_ed25519_public(p)?;
                if embedded != public {
                    return Err(Error::Framing(
                        "Ed25519 key does not match its certificate".to_string(),
                    ));
                }
                let private = read_ed25519_private(&public, p)?;
                KeyData::Ed25519 {
                    public,
                    private: Some(private),
                }
            }
        };
        Ok(data)
    }
}

fn read_rsa_private(p: &mut BlobParser<'_>) -> Result<RsaPrivate> {
    let d = Mpint::from_be_bytes(p.read_mpint()?);
    let iqmp = Mpint::from_be_bytes(p.read_mpint()?);
    let pp = Mpint::from_be_bytes(p.read_mpint()?);
    let q = Mpint::from_be_bytes(p.read_mpint()?);
    Ok(RsaPrivate { d, iqmp, p: pp, q })
}

fn read_dsa_public(p: &mut BlobParser<'_>) -> Result<DsaPublic> {
    Ok(DsaPublic {
        p: Mpint::from_be_bytes(p.read_mpint()?),
        q: Mpint::from_be_bytes(p.read_mpint()?),
        g: Mpint::from_be_bytes(p.read_mpint()?),
        y: Mpint::from_be_bytes(p.read_mpint()?),
    })
}

fn read_ecdsa_public(curve: EcdsaCurve, p: &mut BlobParser<'_>) -> Result<EcdsaPublic> {
    let name = p.read_string()?;
    if name != curve.identifier() {
        return Err(Error::Framing(format!(
            "Curve {} does not match key type {}",
            name,
            Algorithm::Ecdsa(curve)
        )));
    }
    let point = p.read_blob()?;
    if point.first() != Some(&0x04) {
        return Err(Error::Framing(
            "ECDSA point is not in uncompressed form".to_string(),
        ));
    }
    Ok(EcdsaPublic {
        curve,
        point: point.to_vec(),
    })
}

fn read_ed25519_public(p: &mut BlobParser<'_>) -> Result<Ed25519Public> {
    let data = p.read_blob()?;
    let key: [u8; 32] = data.try_into().map_err(|_| {
        Error::Framing(format!("Ed25519 public key must be 32 bytes, got {}", data.len()))
    })?;
    Ok(Ed25519Public(key))
}

fn read_ed25519_private(public: &Ed25519Public, p: &mut BlobParser<'_>) -> Result<Ed25519Private> {
    let data = p.read_blob()?;
    let key: [u8; 64] = data.try_into().map_err(|_| {
        Error::Framing(format!("Ed25519 private key must be 64 bytes, got {}", data.len()))
    })?;
    if key[32..] != public.0 {
        return Err(Error::Framing(
            "Ed25519 private key does not match public key".to_string(),
        ));
    }
    Ok(Ed25519Private(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mp(bytes: &[u8]) -> Mpint {
        Mpint::from_be_bytes(bytes)
    }

    #[test]
    fn test_mpint_normalizes() {
        let m = mp(&[0, 0, 0x12, 0x34]);
        assert_eq!(m.as_bytes(), &[0x12, 0x34]);
        assert_eq!(m.bits(), 13);
        assert_eq!(m.to_padded(4), vec![0, 0, 0x12, 0x34]);
    }

    #[test]
    fn test_private_debug_is_redacted() {
        let private = RsaPrivate {
            d: mp(&[0xde, 0xad]),
            iqmp: mp(&[1]),
            p: mp(&[2]),
            q: mp(&[3]),
        };
        let out = format!("{:?}", private);
        assert!(!out.contains("dead"));
        assert!(out.contains("RsaPrivate"));
    }

    #[test]
    fn test_dsa_private_field_order() {
        let data = KeyData::Dsa {
            public: DsaPublic {
                p: mp(&[1]),
                q: mp(&[2]),
                g: mp(&[3]),
                y: mp(&[4]),
            },
            private: Some(DsaPrivate { x: mp(&[5]) }),
        };
        let mut b = BlobBuilder::new();
        data.encode_private_fields(&mut b).unwrap();
        assert_eq!(
            b.as_slice(),
            &[0, 0, 0, 1, 1, 0, 0, 0, 1, 2, 0, 0, 0, 1, 3, 0, 0, 0, 1, 4, 0, 0, 0, 1, 5]
        );

        let mut p = BlobParser::new(b.as_slice());
        let decoded = KeyData::decode_private_fields(Algorithm::Dsa, &mut p).unwrap();
        assert_eq!(decoded, data);
        assert!(p.is_empty());
    }

    #[test]
    fn test_rsa_public_puts_exponent_first() {
        let data = KeyData::Rsa {
            public: RsaPublic {
                e: mp(&[0x01, 0x00, 0x01]),
                n: mp(&[0xc5, 0x01]),
            },
            private: None,
        };
        let mut b = BlobBuilder::new();
        data.encode_public_fields(&mut b);
        assert_eq!(
            b.as_slice(),
            &[0, 0, 0, 3, 1, 0, 1, 0, 0, 0, 3, 0, 0xc5, 0x01]
        );
    }

    #[test]
    fn test_encode_private_without_material() {
        let data = KeyData::Ed25519 {
            public: Ed25519Public([9; 32]),
            private: None,
        };
        let mut b = BlobBuilder::new();
        assert!(data.encode_private_fields(&mut b).is_err());
    }

    #[test]
    fn test_ed25519_private_mismatch() {
        let mut b = BlobBuilder::new();
        b.add_blob(&[1; 32]);
        b.add_blob(&[2; 64]);
        let mut p = BlobParser::new(b.as_slice());
        let err = KeyData::decode_private_fields(Algorithm::Ed25519, &mut p).unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }

    #[test]
    fn test_ecdsa_curve_mismatch() {
        let mut b = BlobBuilder::new();
        b.add_string("nistp384");
        b.add_blob(&[4, 1, 2]);
        let mut p = BlobParser::new(b.as_slice());
        let result = KeyData::decode_public_fields(Algorithm::Ecdsa(EcdsaCurve::NistP256), &mut p);
        assert!(matches!(result, Err(Error::Framing(_))));
    }

    #[test]
    fn test_public_only_strips_private() {
        let data = KeyData::Ed25519 {
            public: Ed25519Public([3; 32]),
            private: Some(Ed25519Private([3; 64])),
        };
        assert!(data.has_private());
        let public = data.public_only();
        assert!(!public.has_private());
        assert_eq!(public.algorithm(), Algorithm::Ed25519);
    }
}
