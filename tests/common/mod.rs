//! Key fixtures shared by the integration tests

#![allow(dead_code)]

use keyhold::key::material::{Mpint, RsaPrivate, RsaPublic};
use keyhold::key::{Key, KeyData};
use keyhold::protocol::{AgentMessage, BlobBuilder, MessageType};
use rand::rngs::OsRng;
use rsa::RsaPrivateKey;
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use ssh_key::private::{Ed25519Keypair, KeypairData};

pub fn ed25519_key(seed: u8, comment: &str) -> Key {
    let keypair = Ed25519Keypair::from_seed(&[seed; 32]);
    Key::from_keypair_data(&KeypairData::Ed25519(keypair), comment).unwrap()
}

pub fn ecdsa_key(curve: ssh_key::EcdsaCurve, comment: &str) -> Key {
    let private =
        ssh_key::PrivateKey::random(&mut OsRng, ssh_key::Algorithm::Ecdsa { curve }).unwrap();
    Key::from_keypair_data(private.key_data(), comment).unwrap()
}

/// P-384 or P-521 key whose private scalar is shorter than the curve width
pub fn short_scalar_ecdsa_key(curve: ssh_key::EcdsaCurve, comment: &str) -> Key {
    for _ in 0..4096 {
        let key = ecdsa_key(curve, comment);
        if let KeyData::Ecdsa {
            public,
            private: Some(private),
        } = key.data()
            && private.d.as_bytes().len() < public.curve.scalar_len()
        {
            return key;
        }
    }
    panic!("no short scalar found for {:?}", curve);
}

pub fn dsa_key(comment: &str) -> Key {
    let private = ssh_key::PrivateKey::random(&mut OsRng, ssh_key::Algorithm::Dsa).unwrap();
    Key::from_keypair_data(private.key_data(), comment).unwrap()
}

/// Returns the keyhold key and the `rsa` crate key it was built from
pub fn rsa_key(bits: usize, ssh1: bool, comment: &str) -> (Key, RsaPrivateKey) {
    let rsa = RsaPrivateKey::new(&mut OsRng, bits).unwrap();
    let primes = rsa.primes();
    let public = RsaPublic {
        e: Mpint::from_be_bytes(&rsa.e().to_bytes_be()),
        n: Mpint::from_be_bytes(&rsa.n().to_bytes_be()),
    };
    let private = Some(RsaPrivate {
        d: Mpint::from_be_bytes(&rsa.d().to_bytes_be()),
        iqmp: Mpint::from_be_bytes(&rsa.crt_coefficient().unwrap().to_bytes_be()),
        p: Mpint::from_be_bytes(&primes[0].to_bytes_be()),
        q: Mpint::from_be_bytes(&primes[1].to_bytes_be()),
    });
    let data = if ssh1 {
        KeyData::Ssh1Rsa { public, private }
    } else {
        KeyData::Rsa { public, private }
    };
    (Key::new(data, comment), rsa)
}

pub fn add_identity(key: &Key) -> AgentMessage {
    let mut b = BlobBuilder::new();
    b.add_bytes(&key.encode_private_blob().unwrap());
    b.add_string(key.comment());
    let msg_type = match key.version() {
        keyhold::key::SshVersion::Ssh1 => MessageType::Ssh1AddRsaIdentity,
        keyhold::key::SshVersion::Ssh2 => MessageType::AddIdentity,
    };
    AgentMessage::new(msg_type, b.freeze())
}

pub fn sign_request(key: &Key, data: &[u8], flags: u32) -> AgentMessage {
    let mut b = BlobBuilder::new();
    b.add_blob(&key.encode_public_blob());
    b.add_blob(data);
    b.add_u32(flags);
    AgentMessage::new(MessageType::SignRequest, b.freeze())
}

pub fn request_identities() -> AgentMessage {
    AgentMessage::new(MessageType::RequestIdentities, Default::default())
}

pub fn passphrase(msg_type: MessageType, passphrase: &[u8]) -> AgentMessage {
    let mut b = BlobBuilder::new();
    b.add_blob(passphrase);
    AgentMessage::new(msg_type, b.freeze())
}
