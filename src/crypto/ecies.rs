//! ECIES as used by the RLPx handshake (secp256k1, concat-KDF/SHA-256,
//! AES-128-CTR, HMAC-SHA-256).
//!
//! Message layout: `R (65, uncompressed) || iv (16) || ciphertext || tag (32)`.
//! The tag covers `iv || ciphertext || shared_mac`, where `shared_mac` is the
//! 2-byte size prefix for EIP-8 messages and empty for legacy ones.

use aes::cipher::{generic_array::GenericArray, KeyIvInit, StreamCipher};
use alloy_primitives::B256;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use secp256k1::{PublicKey, SecretKey, SECP256K1};
use sha2::{Digest, Sha256};
use thiserror::Error;

type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;
type HmacSha256 = Hmac<Sha256>;

/// Bytes ECIES adds on top of the plaintext.
pub const ECIES_OVERHEAD: usize = 65 + 16 + 32;

/// Handshake and frame-crypto failures. Each carries a distinguishing `code()`.
#[derive(Error, Debug)]
pub enum EciesError {
    #[error("invalid remote node id")]
    InvalidRemoteId,

    #[error("secp256k1: {0}")]
    Secp256k1(#[from] secp256k1::Error),

    #[error("message too short: {0} bytes")]
    TooShort(usize),

    #[error("message too large: {0} bytes")]
    TooLarge(usize),

    #[error("invalid mac key")]
    InvalidMacKey,

    #[error("ecies tag check failed")]
    TagCheckFailed,

    #[error("frame header tag check failed")]
    TagCheckHeaderFailed,

    #[error("frame body tag check failed")]
    TagCheckBodyFailed,

    #[error("invalid ack: {0}")]
    InvalidAck(&'static str),

    #[error("ack received before auth was sent")]
    AuthNotSent,
}

impl EciesError {
    pub fn code(&self) -> &'static str {
        match self {
            EciesError::InvalidRemoteId => "INVALID_REMOTE_ID",
            EciesError::Secp256k1(_) => "SECP256K1",
            EciesError::TooShort(_) => "TOO_SHORT",
            EciesError::TooLarge(_) => "TOO_LARGE",
            EciesError::InvalidMacKey => "INVALID_MAC_KEY",
            EciesError::TagCheckFailed => "TAG_CHECK_FAILED",
            EciesError::TagCheckHeaderFailed => "TAG_CHECK_HEADER_FAILED",
            EciesError::TagCheckBodyFailed => "TAG_CHECK_BODY_FAILED",
            EciesError::InvalidAck(_) => "INVALID_ACK",
            EciesError::AuthNotSent => "AUTH_NOT_SENT",
        }
    }
}

/// X coordinate of the ECDH shared point (RLPx does not hash it).
pub fn ecdh_x(public: &PublicKey, secret: &SecretKey) -> B256 {
    let point = secp256k1::ecdh::shared_secret_point(public, secret);
    B256::from_slice(&point[..32])
}

/// Concat-KDF with a single SHA-256 round, split into (AES key, MAC key).
fn kdf(shared: &B256) -> ([u8; 16], [u8; 32]) {
    let mut hasher = Sha256::new();
    hasher.update(1u32.to_be_bytes());
    hasher.update(shared);
    let key = hasher.finalize();

    let mut enc_key = [0u8; 16];
    enc_key.copy_from_slice(&key[..16]);
    let mut mac_key = [0u8; 32];
    mac_key.copy_from_slice(&Sha256::digest(&key[16..32]));
    (enc_key, mac_key)
}

fn tag(
    mac_key: &[u8; 32],
    iv: &[u8],
    ciphertext: &[u8],
    shared_mac: &[u8],
) -> Result<HmacSha256, EciesError> {
    let mut mac =
        <HmacSha256 as Mac>::new_from_slice(mac_key).map_err(|_| EciesError::InvalidMacKey)?;
    mac.update(iv);
    mac.update(ciphertext);
    mac.update(shared_mac);
    Ok(mac)
}

pub fn encrypt(
    remote: &PublicKey,
    plaintext: &[u8],
    shared_mac: &[u8],
) -> Result<Vec<u8>, EciesError> {
    let ephemeral = SecretKey::new(&mut OsRng);
    let (enc_key, mac_key) = kdf(&ecdh_x(remote, &ephemeral));

    let mut iv = [0u8; 16];
    OsRng.fill_bytes(&mut iv);

    let mut out = Vec::with_capacity(ECIES_OVERHEAD + plaintext.len());
    let ephemeral_public = PublicKey::from_secret_key(SECP256K1, &ephemeral);
    out.extend_from_slice(&ephemeral_public.serialize_uncompressed());
    out.extend_from_slice(&iv);
    let start = out.len();
    out.extend_from_slice(plaintext);
    Aes128Ctr::new(GenericArray::from_slice(&enc_key), GenericArray::from_slice(&iv))
        .apply_keystream(&mut out[start..]);

    let mac = tag(&mac_key, &iv, &out[start..], shared_mac)?;
    out.extend_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

pub fn decrypt(secret: &SecretKey, data: &[u8], shared_mac: &[u8]) -> Result<Vec<u8>, EciesError> {
    if data.len() < ECIES_OVERHEAD {
        return Err(EciesError::TooShort(data.len()));
    }
    let (pubkey, rest) = data.split_at(65);
    let (iv, rest) = rest.split_at(16);
    let (ciphertext, expected) = rest.split_at(rest.len() - 32);

    let remote = PublicKey::from_slice(pubkey)?;
    let (enc_key, mac_key) = kdf(&ecdh_x(&remote, secret));
    tag(&mac_key, iv, ciphertext, shared_mac)?
        .verify_slice(expected)
        .map_err(|_| EciesError::TagCheckFailed)?;

    let mut plain = ciphertext.to_vec();
    Aes128Ctr::new(GenericArray::from_slice(&enc_key), GenericArray::from_slice(iv))
        .apply_keystream(&mut plain);
    Ok(plain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::{id2pk, NodeKey};

    #[test]
    fn test_decrypts_with_matching_shared_mac() {
        let key = NodeKey::generate();
        let pk = id2pk(&key.id()).unwrap();
        let sealed = encrypt(&pk, b"hello rlpx", &[0x01, 0x2c]).unwrap();
        assert_eq!(sealed.len(), ECIES_OVERHEAD + 10);
        assert_eq!(decrypt(key.secret(), &sealed, &[0x01, 0x2c]).unwrap(), b"hello rlpx");
    }

    #[test]
    fn test_wrong_shared_mac_fails_tag_check() {
        let key = NodeKey::generate();
        let pk = id2pk(&key.id()).unwrap();
        let sealed = encrypt(&pk, b"payload", &[0x00, 0x01]).unwrap();
        let err = decrypt(key.secret(), &sealed, &[]).unwrap_err();
        assert_eq!(err.code(), "TAG_CHECK_FAILED");
    }

    #[test]
    fn test_wrong_recipient_fails() {
        let key = NodeKey::generate();
        let other = NodeKey::generate();
        let sealed = encrypt(&id2pk(&key.id()).unwrap(), b"payload", &[]).unwrap();
        assert!(matches!(decrypt(other.secret(), &sealed, &[]), Err(EciesError::TagCheckFailed)));
    }

    #[test]
    fn test_short_input() {
        let key = NodeKey::generate();
        assert!(matches!(decrypt(key.secret(), &[4u8; 100], &[]), Err(EciesError::TooShort(100))));
    }
}
