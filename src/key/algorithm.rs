//! Public key algorithm identifiers

use crate::error::{Error, Result};
use std::fmt;

/// Suffix marking an OpenSSH certificate key type
pub const CERT_SUFFIX: &str = "-cert-v01@openssh.com";

const ECDSA_PREFIX: &str = "ecdsa-sha2-";

/// Protocol generation a key belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SshVersion {
    Ssh1,
    Ssh2,
}

impl fmt::Display for SshVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SshVersion::Ssh1 => write!(f, "SSH-1"),
            SshVersion::Ssh2 => write!(f, "SSH-2"),
        }
    }
}

/// NIST curves usable with ECDSA keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EcdsaCurve {
    NistP256,
    NistP384,
    NistP521,
}

impl EcdsaCurve {
    /// Curve name as it appears inside key blobs
    pub fn identifier(&self) -> &'static str {
        match self {
            EcdsaCurve::NistP256 => "nistp256",
            EcdsaCurve::NistP384 => "nistp384",
            EcdsaCurve::NistP521 => "nistp521",
        }
    }

    pub fn from_identifier(name: &str) -> Result<Self> {
        match name {
            "nistp256" => Ok(EcdsaCurve::NistP256),
            "nistp384" => Ok(EcdsaCurve::NistP384),
            "nistp521" => Ok(EcdsaCurve::NistP521),
            other => Err(Error::UnsupportedAlgorithm(format!("ECDSA curve {}", other))),
        }
    }

    /// Size of the curve order in bits
    pub fn bits(&self) -> u32 {
        match self {
            EcdsaCurve::NistP256 => 256,
            EcdsaCurve::NistP384 => 384,
            EcdsaCurve::NistP521 => 521,
        }
    }

    /// Byte width of a private scalar on this curve
    pub fn scalar_len(&self) -> usize {
        (self.bits() as usize).div_ceil(8)
    }
}

/// Key algorithm tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    /// Legacy SSH-1 RSA
    Ssh1Rsa,
    Rsa,
    Dsa,
    Ecdsa(EcdsaCurve),
    Ed25519,
}

impl Algorithm {
    /// Wire identifier of the key type
    pub fn identifier(&self) -> &'static str {
        match self {
            Algorithm::Ssh1Rsa => "rsa1",
            Algorithm::Rsa => "ssh-rsa",
            Algorithm::Dsa => "ssh-dss",
            Algorithm::Ecdsa(EcdsaCurve::NistP256) => "ecdsa-sha2-nistp256",
            Algorithm::Ecdsa(EcdsaCurve::NistP384) => "ecdsa-sha2-nistp384",
            Algorithm::Ecdsa(EcdsaCurve::NistP521) => "ecdsa-sha2-nistp521",
            Algorithm::Ed25519 => "ssh-ed25519",
        }
    }

    /// Identifier of the matching OpenSSH certificate type
    pub fn cert_identifier(&self) -> Option<String> {
        match self {
            Algorithm::Ssh1Rsa => None,
            other => Some(format!("{}{}", other.identifier(), CERT_SUFFIX)),
        }
    }

    /// Parse an SSH-2 key type identifier
    pub fn from_identifier(id: &str) -> Result<Self> {
        match id {
            "ssh-rsa" => Ok(Algorithm::Rsa),
            "ssh-dss" => Ok(Algorithm::Dsa),
            "ssh-ed25519" => Ok(Algorithm::Ed25519),
            _ => match id.strip_prefix(ECDSA_PREFIX) {
                Some(curve) => EcdsaCurve::from_identifier(curve).map(Algorithm::Ecdsa),
                None => Err(Error::UnsupportedAlgorithm(id.to_string())),
            },
        }
    }

    pub fn version(&self) -> SshVersion {
        match self {
            Algorithm::Ssh1Rsa => SshVersion::Ssh1,
            _ => SshVersion::Ssh2,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

/// Split a key type identifier into its base identifier and a certificate flag
pub fn split_cert_identifier(id: &str) -> (&str, bool) {
    match id.strip_suffix(CERT_SUFFIX) {
        Some(base) => (base, true),
        None => (id, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_roundtrip() {
        let algorithms = [
            Algorithm::Rsa,
            Algorithm::Dsa,
            Algorithm::Ecdsa(EcdsaCurve::NistP256),
            Algorithm::Ecdsa(EcdsaCurve::NistP384),
            Algorithm::Ecdsa(EcdsaCurve::NistP521),
            Algorithm::Ed25519,
        ];
        for alg in algorithms {
            assert_eq!(Algorithm::from_identifier(alg.identifier()).unwrap(), alg);
        }
    }

    #[test]
    fn test_unknown_identifier() {
        let err = Algorithm::from_identifier("ssh-foo").unwrap_err();
        assert!(matches!(err, Error::UnsupportedAlgorithm(_)));
        assert!(Algorithm::from_identifier("ecdsa-sha2-nistp999").is_err());
    }

    #[test]
    fn test_split_cert_identifier() {
        assert_eq!(
            split_cert_identifier("ssh-ed25519-cert-v01@openssh.com"),
            ("ssh-ed25519", true)
        );
        assert_eq!(split_cert_identifier("ssh-rsa"), ("ssh-rsa", false));
        assert_eq!(
            Algorithm::Dsa.cert_identifier().as_deref(),
            Some("ssh-dss-cert-v01@openssh.com")
        );
        assert!(Algorithm::Ssh1Rsa.cert_identifier().is_none());
    }

    #[test]
    fn test_version() {
        assert_eq!(Algorithm::Ssh1Rsa.version(), SshVersion::Ssh1);
        assert_eq!(Algorithm::Ed25519.version(), SshVersion::Ssh2);
    }

    #[test]
    fn test_scalar_len() {
        assert_eq!(EcdsaCurve::NistP256.scalar_len(), 32);
        assert_eq!(EcdsaCurve::NistP384.scalar_len(), 48);
        assert_eq!(EcdsaCurve::NistP521.scalar_len(), 66);
    }
}
